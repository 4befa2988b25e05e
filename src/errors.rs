// Error types for pitwall

use crate::telemetry::StreamEvent;
use snafu::Snafu;
use std::{io, sync::mpsc::SendError};

#[derive(Debug, Snafu)]
pub enum PitwallError {
    // Errors while reading and broadcasting stream events
    #[snafu(display("Frame source not started"))]
    SourceNotStarted,
    #[snafu(display("Error broadcasting stream event"))]
    StreamBroadcastError {
        source: Box<SendError<StreamEvent>>,
    },

    // Config management errors
    #[snafu(display("Could not find application data directory to save config file"))]
    NoConfigDir,
    #[snafu(display("Error reading or writing config file"))]
    ConfigIOError { source: io::Error },
    #[snafu(display("Error serializing config file"))]
    ConfigSerializeError { source: serde_json::Error },

    // Replay errors
    #[snafu(display("Invalid replay file: {path}"))]
    InvalidReplayFile { path: String },
    #[snafu(display("Error loading replay file: {source}"))]
    ReplayLoaderError { source: io::Error },

    // User input validation errors
    #[snafu(display("Invalid user input: {field} - {reason}"))]
    InvalidUserInput { field: String, reason: String },
}

impl From<SendError<StreamEvent>> for PitwallError {
    fn from(value: SendError<StreamEvent>) -> Self {
        PitwallError::StreamBroadcastError {
            source: Box::new(value),
        }
    }
}
