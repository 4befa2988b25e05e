use std::{fs::File, io, io::BufReader, path::PathBuf};

use log::{debug, warn};
use serde_jsonlines::JsonLinesIter;

use crate::PitwallError;

use super::{ConnectionStatus, StreamEvent, StreamMessage};

/// Something that delivers already-parsed stream events, one at a time.
pub trait FrameSource {
    fn start(&mut self) -> Result<(), PitwallError>;

    /// Returns the next event, or `None` once the source is exhausted.
    fn next_event(&mut self) -> Result<Option<StreamEvent>, PitwallError>;
}

enum ReplayState {
    Idle,
    Starting(JsonLinesIter<BufReader<File>, StreamMessage>),
    Streaming(JsonLinesIter<BufReader<File>, StreamMessage>),
    Finished,
}

/// Replays a JSON-lines recording with one [`StreamMessage`] per line.
///
/// The source announces `Connected` before the first message and
/// `Disconnected` after the last one. Lines that cannot be parsed are skipped.
pub struct ReplayFileSource {
    path: PathBuf,
    state: ReplayState,
    skipped_lines: usize,
}

impl ReplayFileSource {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            state: ReplayState::Idle,
            skipped_lines: 0,
        }
    }

    /// Number of lines dropped because they were not valid stream messages
    pub fn skipped_lines(&self) -> usize {
        self.skipped_lines
    }
}

impl FrameSource for ReplayFileSource {
    fn start(&mut self) -> Result<(), PitwallError> {
        if !self.path.is_file() {
            return Err(PitwallError::InvalidReplayFile {
                path: format!("{:?}", self.path),
            });
        }
        let lines = serde_jsonlines::json_lines(&self.path)
            .map_err(|e| PitwallError::ReplayLoaderError { source: e })?;
        debug!("Replaying {:?}", self.path);
        self.state = ReplayState::Starting(lines);
        self.skipped_lines = 0;
        Ok(())
    }

    fn next_event(&mut self) -> Result<Option<StreamEvent>, PitwallError> {
        match std::mem::replace(&mut self.state, ReplayState::Finished) {
            ReplayState::Idle => {
                self.state = ReplayState::Idle;
                Err(PitwallError::SourceNotStarted)
            }
            ReplayState::Starting(lines) => {
                self.state = ReplayState::Streaming(lines);
                Ok(Some(StreamEvent::ConnectionStatus(
                    ConnectionStatus::Connected,
                )))
            }
            ReplayState::Streaming(mut lines) => loop {
                match lines.next() {
                    Some(Ok(message)) => {
                        self.state = ReplayState::Streaming(lines);
                        return Ok(Some(StreamEvent::Message(Box::new(message))));
                    }
                    Some(Err(e))
                        if matches!(
                            e.kind(),
                            io::ErrorKind::InvalidData | io::ErrorKind::UnexpectedEof
                        ) =>
                    {
                        self.skipped_lines += 1;
                        warn!("Skipping malformed line in {:?}: {}", self.path, e);
                    }
                    Some(Err(e)) => return Err(PitwallError::ReplayLoaderError { source: e }),
                    None => {
                        debug!(
                            "Finished replaying {:?}, skipped {} lines",
                            self.path, self.skipped_lines
                        );
                        return Ok(Some(StreamEvent::ConnectionStatus(
                            ConnectionStatus::Disconnected,
                        )));
                    }
                }
            },
            ReplayState::Finished => Ok(None),
        }
    }
}
