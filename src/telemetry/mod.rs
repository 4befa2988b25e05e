pub(crate) mod collector;
pub(crate) mod producer;

use std::collections::BTreeMap;

pub use collector::{Pacing, collect_frames};
pub use producer::{FrameSource, ReplayFileSource};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Reads a number, or a string holding one. Any other value is "no reading".
fn lenient_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        _ => None,
    })
}

/// Lap numbers may arrive as `3` or `3.0`. Fractional laps are unknown.
fn lenient_lap<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
    Ok(lenient_f64(deserializer)?
        .filter(|lap| lap.fract() == 0. && lap.abs() < i64::MAX as f64)
        .map(|lap| lap as i64))
}

/// Raw per-driver fields as they arrive on the stream. Any of them may be
/// missing or `null`.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RawDriver {
    /// Speed in km/h
    #[serde(deserialize_with = "lenient_f64")]
    pub speed: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub gear: Option<f64>,
    /// Throttle, 0-100
    #[serde(deserialize_with = "lenient_f64")]
    pub throttle: Option<f64>,
    /// Brake as a 0-1 fraction
    #[serde(deserialize_with = "lenient_f64")]
    pub brake: Option<f64>,
    /// Meters travelled since the start of the session
    #[serde(deserialize_with = "lenient_f64")]
    pub dist: Option<f64>,
    #[serde(deserialize_with = "lenient_lap")]
    pub lap: Option<i64>,
}

impl RawDriver {
    /// Normalizes the raw reading into a [`Sample`]. Absent numbers mean "no
    /// reading" and become 0, the brake fraction is scaled to a percentage.
    pub fn to_sample(&self, session_time: f64) -> Sample {
        Sample {
            session_time,
            speed: self.speed.unwrap_or(0.),
            gear: self.gear.unwrap_or(0.) as i32,
            throttle_pct: self.throttle.unwrap_or(0.),
            brake_pct: self.brake.unwrap_or(0.) * 100.,
            distance_m: self.dist.unwrap_or(0.),
            lap_number: self.lap,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RawFrame {
    /// Session clock in seconds
    #[serde(deserialize_with = "lenient_f64")]
    pub t: Option<f64>,
    pub drivers: Option<BTreeMap<String, RawDriver>>,
}

/// One message from the replay stream. Only `frame` and `circuit_length_m`
/// feed the engine, the rest is playback metadata for the viewer.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StreamMessage {
    pub frame: Option<RawFrame>,
    #[serde(deserialize_with = "lenient_f64")]
    pub circuit_length_m: Option<f64>,
    pub frame_index: Option<u64>,
    pub total_frames: Option<u64>,
    pub track_status: Option<String>,
    pub playback_speed: Option<f64>,
    pub is_paused: Option<bool>,
}

impl StreamMessage {
    /// Converts the loosely typed message into a normalized [`Frame`].
    /// Returns `None` when the message carries no driver data.
    pub fn to_frame(&self) -> Option<Frame> {
        let raw = self.frame.as_ref()?;
        let drivers = raw.drivers.as_ref().filter(|d| !d.is_empty())?;
        let session_time = raw.t.unwrap_or(0.);

        Some(Frame {
            session_time,
            circuit_length_m: self.circuit_length_m.filter(|len| *len > 0.),
            drivers: drivers
                .iter()
                .map(|(code, driver)| (code.clone(), driver.to_sample(session_time)))
                .collect(),
        })
    }
}

/// One competitor's instantaneous state at one tick.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Sample {
    /// Session clock in seconds
    pub session_time: f64,
    /// km/h
    pub speed: f64,
    /// 0 for neutral or unknown
    pub gear: i32,
    pub throttle_pct: f64,
    pub brake_pct: f64,
    /// Cumulative distance in meters. Lap-relative once stored in a lap window.
    pub distance_m: f64,
    pub lap_number: Option<i64>,
}

/// A normalized snapshot of every competitor at one tick.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Frame {
    pub session_time: f64,
    pub circuit_length_m: Option<f64>,
    pub drivers: BTreeMap<String, Sample>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub enum ConnectionStatus {
    Connected,
    Disconnected,
    Error(String),
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub enum StreamEvent {
    Message(Box<StreamMessage>),
    ConnectionStatus(ConnectionStatus),
}
