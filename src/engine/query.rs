use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::telemetry::Sample;

use super::CompetitorState;

/// Which history the x axis shows.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
pub enum WindowMode {
    /// Last `W` seconds, most recent sample at x = 0
    #[default]
    Time,
    /// Current lap, x is the lap-relative distance in meters
    Lap,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct AxisExtent {
    pub min: f64,
    pub max: f64,
}

impl AxisExtent {
    /// Returned alongside an empty trace.
    pub const EMPTY: AxisExtent = AxisExtent { min: 0., max: 0. };
}

/// Parallel sequences ready to be handed to a plotting library.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Trace {
    pub x: Vec<f64>,
    pub speed: Vec<f64>,
    pub gear: Vec<i32>,
    pub throttle_pct: Vec<f64>,
    pub brake_pct: Vec<f64>,
}

impl Trace {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            x: Vec::with_capacity(capacity),
            speed: Vec::with_capacity(capacity),
            gear: Vec::with_capacity(capacity),
            throttle_pct: Vec::with_capacity(capacity),
            brake_pct: Vec::with_capacity(capacity),
        }
    }

    fn push(&mut self, x: f64, sample: &Sample) {
        self.x.push(x);
        self.speed.push(sample.speed);
        self.gear.push(sample.gear);
        self.throttle_pct.push(sample.throttle_pct);
        self.brake_pct.push(sample.brake_pct);
    }

    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct WindowSnapshot {
    pub trace: Trace,
    pub extent: AxisExtent,
}

impl WindowSnapshot {
    pub fn empty() -> Self {
        Self {
            trace: Trace::default(),
            extent: AxisExtent::EMPTY,
        }
    }
}

pub(super) fn time_snapshot(state: &CompetitorState, span_s: f64) -> WindowSnapshot {
    let Some(latest) = state.time_window.latest() else {
        return WindowSnapshot::empty();
    };
    let now = latest.session_time;

    let mut trace = Trace::with_capacity(state.time_window.len());
    for sample in state.time_window.samples() {
        trace.push(sample.session_time - now, sample);
    }
    WindowSnapshot {
        trace,
        extent: AxisExtent {
            min: -span_s,
            max: 0.,
        },
    }
}

pub(super) fn lap_snapshot(state: &CompetitorState, circuit_length_m: Option<f64>) -> WindowSnapshot {
    let samples = state.lap_window.samples();
    if samples.is_empty() {
        return WindowSnapshot::empty();
    }

    let mut trace = Trace::with_capacity(samples.len());
    for sample in samples {
        trace.push(sample.distance_m, sample);
    }
    let lap_length = resolve_lap_length(
        circuit_length_m,
        state.last_completed_lap_length_m,
        &trace.x,
    );
    WindowSnapshot {
        trace,
        extent: AxisExtent {
            min: 0.,
            max: lap_length,
        },
    }
}

/// The circuit length wins when known, then the competitor's previous lap,
/// then whatever distance the current lap has reached. Zero or negative
/// lengths count as unknown.
fn resolve_lap_length(
    circuit_length_m: Option<f64>,
    last_completed_lap_length_m: Option<f64>,
    xs: &[f64],
) -> f64 {
    circuit_length_m
        .filter(|len| *len > 0.)
        .or(last_completed_lap_length_m.filter(|len| *len > 0.))
        .unwrap_or_else(|| xs.iter().copied().fold(f64::NEG_INFINITY, f64::max))
}
