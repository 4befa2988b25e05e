//! Per-driver telemetry buffering.
//!
//! A [`SessionState`] ingests one normalized [`Frame`] at a time and keeps, for
//! every competitor, a sliding time window and the samples of the current lap.
//! Renderers pull [`WindowSnapshot`]s from it with [`SessionState::query`].

mod lap_window;
mod query;
mod selector;
mod time_window;

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use itertools::Itertools;
use log::{debug, info};

pub use lap_window::LapWindow;
pub use query::{AxisExtent, Trace, WindowMode, WindowSnapshot};
pub use selector::DriverSelector;
pub use time_window::TimeWindow;

use crate::telemetry::{Frame, Sample};

pub const DEFAULT_TIME_WINDOW_S: f64 = 30.;

#[derive(Clone, Debug, Default)]
pub struct CompetitorState {
    pub time_window: TimeWindow,
    pub lap_window: LapWindow,
    pub last_completed_lap_length_m: Option<f64>,
}

impl CompetitorState {
    fn append_time_sample(&mut self, sample: Sample, span_s: f64) {
        self.time_window.push(sample, span_s);
    }

    fn append_lap_sample(&mut self, sample: Sample) -> Option<f64> {
        let completed = self.lap_window.push(sample);
        if completed.is_some() {
            self.last_completed_lap_length_m = completed;
        }
        completed
    }
}

/// Buffers for one replay or live session. Competitors are added on first
/// sighting and kept for the lifetime of the session.
#[derive(Clone, Debug)]
pub struct SessionState {
    time_window_s: f64,
    competitors: HashMap<String, CompetitorState>,
    circuit_length_m: Option<f64>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new(DEFAULT_TIME_WINDOW_S)
    }
}

impl SessionState {
    pub fn new(time_window_s: f64) -> Self {
        Self {
            time_window_s,
            competitors: HashMap::new(),
            circuit_length_m: None,
        }
    }

    pub fn ingest(&mut self, frame: &Frame) {
        if frame.drivers.is_empty() {
            return;
        }

        if self.circuit_length_m.is_none()
            && let Some(len) = frame
                .circuit_length_m
                .filter(|len| len.is_finite() && *len > 0.)
        {
            info!("Circuit length set to {:.1}m", len);
            self.circuit_length_m = Some(len);
        }

        for (code, sample) in &frame.drivers {
            let state = self.competitors.entry(code.clone()).or_insert_with(|| {
                debug!("First sample for {}", code);
                CompetitorState::default()
            });
            state.append_time_sample(*sample, self.time_window_s);
            if let Some(length) = state.append_lap_sample(*sample) {
                debug!(
                    "{} started lap {:?}, previous lap {:.1}m",
                    code,
                    sample.lap_number,
                    length
                );
            }
        }
    }

    /// Current view of `code` in `mode`. Unknown competitors and empty buffers
    /// yield an empty trace with [`AxisExtent::EMPTY`].
    pub fn query(&self, code: &str, mode: WindowMode) -> WindowSnapshot {
        let Some(state) = self.competitors.get(code) else {
            return WindowSnapshot::empty();
        };
        match mode {
            WindowMode::Time => query::time_snapshot(state, self.time_window_s),
            WindowMode::Lap => query::lap_snapshot(state, self.circuit_length_m),
        }
    }

    /// Every competitor seen so far, sorted
    pub fn competitor_codes(&self) -> Vec<&str> {
        self.competitors.keys().map(String::as_str).sorted().collect()
    }

    pub fn competitor(&self, code: &str) -> Option<&CompetitorState> {
        self.competitors.get(code)
    }

    pub fn circuit_length_m(&self) -> Option<f64> {
        self.circuit_length_m
    }

    pub fn time_window_s(&self) -> f64 {
        self.time_window_s
    }
}

/// A [`SessionState`] behind a mutex, for a producer and a renderer living on
/// different threads. Each call holds the lock for its whole duration.
#[derive(Clone, Debug, Default)]
pub struct SharedSession {
    inner: Arc<Mutex<SessionState>>,
}

impl SharedSession {
    pub fn new(session: SessionState) -> Self {
        Self {
            inner: Arc::new(Mutex::new(session)),
        }
    }

    // ingest never panics mid-update, so a poisoned guard still holds whole buffers
    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn ingest(&self, frame: &Frame) {
        self.lock().ingest(frame);
    }

    pub fn query(&self, code: &str, mode: WindowMode) -> WindowSnapshot {
        self.lock().query(code, mode)
    }

    pub fn competitor_codes(&self) -> Vec<String> {
        self.lock()
            .competitor_codes()
            .into_iter()
            .map(str::to_string)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{collections::BTreeMap, thread};

    fn sample(session_time: f64, distance_m: f64, lap_number: Option<i64>) -> Sample {
        Sample {
            session_time,
            speed: 200.,
            gear: 6,
            throttle_pct: 100.,
            brake_pct: 0.,
            distance_m,
            lap_number,
        }
    }

    fn frame(session_time: f64, drivers: &[(&str, Sample)]) -> Frame {
        Frame {
            session_time,
            circuit_length_m: None,
            drivers: drivers
                .iter()
                .map(|(code, s)| (code.to_string(), *s))
                .collect(),
        }
    }

    #[test]
    fn test_frame_without_drivers_is_ignored() {
        let mut session = SessionState::default();
        session.ingest(&Frame {
            session_time: 1.,
            circuit_length_m: Some(5412.),
            drivers: BTreeMap::new(),
        });
        assert!(session.competitor_codes().is_empty());
        assert_eq!(session.circuit_length_m(), None);
    }

    #[test]
    fn test_circuit_length_is_latched_once() {
        let mut session = SessionState::default();
        let mut a = frame(0., &[("VER", sample(0., 0., Some(1)))]);
        a.circuit_length_m = Some(5412.);
        let mut b = frame(0.1, &[("VER", sample(0.1, 5., Some(1)))]);
        b.circuit_length_m = Some(9999.);

        session.ingest(&a);
        session.ingest(&b);
        assert_eq!(session.circuit_length_m(), Some(5412.));
    }

    #[test]
    fn test_unusable_circuit_length_is_not_latched() {
        let mut session = SessionState::default();
        for (i, len) in [Some(0.), Some(f64::NAN), Some(-1.), None, Some(5412.)]
            .into_iter()
            .enumerate()
        {
            let t = i as f64;
            let mut f = frame(t, &[("VER", sample(t, t * 50., Some(1)))]);
            f.circuit_length_m = len;
            session.ingest(&f);
        }
        assert_eq!(session.circuit_length_m(), Some(5412.));
        assert_eq!(session.query("VER", WindowMode::Lap).extent.max, 5412.);
    }

    #[test]
    fn test_lap_reset_records_completed_lap() {
        let mut session = SessionState::default();
        let laps = [(Some(1), 100.), (Some(1), 1900.), (Some(1), 5100.), (Some(2), 5150.)];
        for (i, (lap, dist)) in laps.iter().enumerate() {
            let t = i as f64;
            session.ingest(&frame(t, &[("LEC", sample(t, *dist, *lap))]));
        }

        let state = session.competitor("LEC").unwrap();
        assert_eq!(state.lap_window.samples().len(), 1);
        assert_eq!(state.lap_window.lap_start_distance(), 5150.);
        assert_eq!(state.last_completed_lap_length_m, Some(5000.));
    }

    #[test]
    fn test_time_query_is_relative_to_latest_sample() {
        let mut session = SessionState::new(10.);
        for i in 0..=20 {
            let t = 100. + i as f64;
            session.ingest(&frame(t, &[("HAM", sample(t, t * 50., Some(1)))]));
        }

        let snapshot = session.query("HAM", WindowMode::Time);
        assert_eq!(snapshot.trace.len(), 11);
        assert_eq!(snapshot.trace.x.first(), Some(&-10.));
        assert_eq!(snapshot.trace.x.last(), Some(&0.));
        assert_eq!(snapshot.extent, AxisExtent { min: -10., max: 0. });
    }

    #[test]
    fn test_lap_query_extent_fallback_chain() {
        let mut session = SessionState::default();
        session.ingest(&frame(0., &[("NOR", sample(0., 1000., Some(1)))]));
        session.ingest(&frame(1., &[("NOR", sample(1., 1080., Some(1)))]));

        let snapshot = session.query("NOR", WindowMode::Lap);
        assert_eq!(snapshot.trace.x, vec![0., 80.]);
        assert_eq!(snapshot.extent, AxisExtent { min: 0., max: 80. });

        session.ingest(&frame(2., &[("NOR", sample(2., 1200., Some(2)))]));
        let snapshot = session.query("NOR", WindowMode::Lap);
        assert_eq!(snapshot.extent.max, 80.);

        let mut with_circuit = frame(3., &[("NOR", sample(3., 1300., Some(2)))]);
        with_circuit.circuit_length_m = Some(5412.);
        session.ingest(&with_circuit);
        let snapshot = session.query("NOR", WindowMode::Lap);
        assert_eq!(snapshot.extent.max, 5412.);
        assert_eq!(snapshot.trace.x, vec![0., 100.]);
    }

    #[test]
    fn test_unknown_competitor_returns_empty_snapshot() {
        let session = SessionState::default();
        for mode in [WindowMode::Time, WindowMode::Lap] {
            let snapshot = session.query("ZZZ", mode);
            assert!(snapshot.trace.is_empty());
            assert_eq!(snapshot.extent, AxisExtent::EMPTY);
        }
    }

    #[test]
    fn test_mode_switch_does_not_change_results() {
        let mut session = SessionState::default();
        for i in 0..50 {
            let t = i as f64 * 0.1;
            session.ingest(&frame(t, &[("PIA", sample(t, t * 60., Some(i / 20)))]));
        }

        let time_before = session.query("PIA", WindowMode::Time);
        let lap_before = session.query("PIA", WindowMode::Lap);
        assert_eq!(session.query("PIA", WindowMode::Lap), lap_before);
        assert_eq!(session.query("PIA", WindowMode::Time), time_before);
    }

    #[test]
    fn test_competitor_codes_are_sorted() {
        let mut session = SessionState::default();
        session.ingest(&frame(
            0.,
            &[
                ("VER", sample(0., 0., None)),
                ("ALO", sample(0., 0., None)),
                ("HAM", sample(0., 0., None)),
            ],
        ));
        assert_eq!(session.competitor_codes(), vec!["ALO", "HAM", "VER"]);
    }

    #[test]
    fn test_shared_session_across_threads() {
        let shared = SharedSession::default();
        let producer = {
            let shared = shared.clone();
            thread::spawn(move || {
                for i in 0..500 {
                    let t = i as f64 * 0.1;
                    shared.ingest(&frame(t, &[("RUS", sample(t, t * 70., Some(1)))]));
                }
            })
        };

        for _ in 0..100 {
            let snapshot = shared.query("RUS", WindowMode::Time);
            assert_eq!(snapshot.trace.x.len(), snapshot.trace.speed.len());
            assert!(snapshot.trace.x.iter().all(|x| *x >= -DEFAULT_TIME_WINDOW_S - 1e-9 && *x <= 0.));
        }
        producer.join().unwrap();

        assert_eq!(shared.competitor_codes(), vec!["RUS".to_string()]);
        assert_eq!(shared.query("RUS", WindowMode::Lap).trace.len(), 500);
    }
}
