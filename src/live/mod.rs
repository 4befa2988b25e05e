pub mod config;

use std::{
    sync::mpsc::{Receiver, TryRecvError},
    time::Instant,
};

use config::AppConfig;
use log::{info, warn};

use crate::engine::{DriverSelector, SessionState, WindowMode, WindowSnapshot};
use crate::telemetry::{ConnectionStatus, StreamEvent, StreamMessage};

pub const REFRESH_RATE_MS: u64 = 100;
const MAX_EVENTS_PER_REFRESH: usize = 25;
const MAX_TIME_PER_REFRESH_MS: u128 = 50;

/// Playback metadata carried next to the frames.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PlaybackInfo {
    pub frame_index: Option<u64>,
    pub total_frames: Option<u64>,
    pub track_status: Option<String>,
    pub playback_speed: Option<f64>,
    pub is_paused: Option<bool>,
}

impl PlaybackInfo {
    fn update(&mut self, message: &StreamMessage) {
        if message.frame_index.is_some() {
            self.frame_index = message.frame_index;
        }
        if message.total_frames.is_some() {
            self.total_frames = message.total_frames;
        }
        if message.track_status.is_some() {
            self.track_status = message.track_status.clone();
        }
        if message.playback_speed.is_some() && message.is_paused.is_some() {
            self.playback_speed = message.playback_speed;
            self.is_paused = message.is_paused;
        }
    }
}

/// `LiveTelemetryView` owns the session buffers and the consumer end of the
/// stream channel. The producer thread never touches the buffers, every frame
/// is ingested here between two refreshes.
///
/// Each [`update`](Self::update) drains a bounded number of events and
/// recomputes the snapshot for the selected driver and mode.
pub struct LiveTelemetryView {
    event_receiver: Receiver<StreamEvent>,
    session: SessionState,
    selector: DriverSelector,
    preferred_driver: Option<String>,
    mode: WindowMode,
    connection: ConnectionStatus,
    playback: PlaybackInfo,
    snapshot: WindowSnapshot,
    needs_redraw: bool,
    stream_closed: bool,
}

impl LiveTelemetryView {
    pub fn new(event_receiver: Receiver<StreamEvent>, app_config: &AppConfig) -> Self {
        Self {
            event_receiver,
            session: SessionState::new(app_config.time_window_s),
            selector: DriverSelector::default(),
            preferred_driver: app_config.selected_driver.clone(),
            mode: app_config.x_mode,
            connection: ConnectionStatus::Disconnected,
            playback: PlaybackInfo::default(),
            snapshot: WindowSnapshot::empty(),
            needs_redraw: false,
            stream_closed: false,
        }
    }

    /// Processes pending events and refreshes the snapshot. Returns the number
    /// of events consumed.
    pub fn update(&mut self) -> usize {
        let start_refresh = Instant::now();
        let mut events_processed = 0;
        loop {
            match self.event_receiver.try_recv() {
                Ok(event) => {
                    self.handle_event(event);
                    events_processed += 1;
                    if events_processed >= MAX_EVENTS_PER_REFRESH
                        || start_refresh.elapsed().as_millis() >= MAX_TIME_PER_REFRESH_MS
                    {
                        break;
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.stream_closed = true;
                    break;
                }
            }
        }

        if self.needs_redraw {
            self.redraw();
        }
        events_processed
    }

    fn handle_event(&mut self, event: StreamEvent) {
        match event {
            StreamEvent::Message(message) => {
                self.playback.update(&message);
                let Some(frame) = message.to_frame() else {
                    return;
                };
                if self
                    .selector
                    .refresh(frame.drivers.keys().map(String::as_str))
                {
                    self.apply_preferred_driver();
                }
                self.session.ingest(&frame);
                self.needs_redraw = true;
            }
            StreamEvent::ConnectionStatus(status) => {
                match &status {
                    ConnectionStatus::Connected => info!("Telemetry stream connected"),
                    ConnectionStatus::Disconnected => {
                        info!("Telemetry stream disconnected");
                        self.clear_output();
                    }
                    ConnectionStatus::Error(reason) => {
                        warn!("Telemetry stream error: {}", reason);
                        self.clear_output();
                    }
                }
                self.connection = status;
            }
        }
    }

    fn apply_preferred_driver(&mut self) {
        if let Some(preferred) = self.preferred_driver.take() {
            if !self.selector.codes().contains(&preferred) {
                self.preferred_driver = Some(preferred);
            } else {
                self.selector.select(&preferred);
            }
        }
    }

    // rendered output only, the buffers keep whatever was received
    fn clear_output(&mut self) {
        self.snapshot = WindowSnapshot::empty();
        self.needs_redraw = false;
    }

    fn redraw(&mut self) {
        self.snapshot = match self.selector.selected() {
            Some(code) => self.session.query(code, self.mode),
            None => WindowSnapshot::empty(),
        };
        self.needs_redraw = false;
    }

    /// Switches the x axis. Buffers are not touched.
    pub fn set_mode(&mut self, mode: WindowMode) {
        if self.mode != mode {
            self.mode = mode;
            self.redraw();
        }
    }

    pub fn select_driver(&mut self, code: &str) -> bool {
        let changed = self.selector.select(code);
        if changed {
            self.redraw();
        }
        changed
    }

    pub fn snapshot(&self) -> &WindowSnapshot {
        &self.snapshot
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    pub fn selector(&self) -> &DriverSelector {
        &self.selector
    }

    pub fn mode(&self) -> WindowMode {
        self.mode
    }

    pub fn connection(&self) -> &ConnectionStatus {
        &self.connection
    }

    pub fn playback(&self) -> &PlaybackInfo {
        &self.playback
    }

    /// True once the producer has hung up and every event has been consumed
    pub fn is_stream_closed(&self) -> bool {
        self.stream_closed
    }

    /// One-line description of what a renderer would currently show.
    pub fn status_line(&self) -> String {
        let driver = self.selector.selected().unwrap_or("-");
        let frame = match (self.playback.frame_index, self.playback.total_frames) {
            (Some(index), Some(total)) => format!("frame {}/{}", index, total),
            (Some(index), None) => format!("frame {}", index),
            _ => "frame -".to_string(),
        };
        let mut line = format!(
            "{} | {:?} | {} samples | x {:.0}..{:.0} | {}",
            driver,
            self.mode,
            self.snapshot.trace.len(),
            self.snapshot.extent.min,
            self.snapshot.extent.max,
            frame,
        );
        if let Some(last) = self.snapshot.trace.len().checked_sub(1) {
            line.push_str(&format!(
                " | {:.0} km/h gear {} thr {:.0}% brk {:.0}%",
                self.snapshot.trace.speed[last],
                self.snapshot.trace.gear[last],
                self.snapshot.trace.throttle_pct[last],
                self.snapshot.trace.brake_pct[last],
            ));
        }
        if let Some(track_status) = &self.playback.track_status {
            line.push_str(&format!(" | track {}", track_status));
        }
        if self.playback.is_paused == Some(true) {
            line.push_str(" | PAUSED");
        }
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PitwallError;
    use crate::engine::AxisExtent;
    use crate::telemetry::{FrameSource, Pacing, collect_frames};
    use std::{
        io,
        sync::mpsc::{self, Sender},
        thread,
    };

    /// Delivers a couple of frames, then loses the underlying stream.
    struct FlakySource {
        events: Vec<StreamEvent>,
    }

    impl FrameSource for FlakySource {
        fn start(&mut self) -> Result<(), PitwallError> {
            self.events.reverse();
            Ok(())
        }

        fn next_event(&mut self) -> Result<Option<StreamEvent>, PitwallError> {
            match self.events.pop() {
                Some(event) => Ok(Some(event)),
                None => Err(PitwallError::ReplayLoaderError {
                    source: io::Error::from(io::ErrorKind::ConnectionReset),
                }),
            }
        }
    }

    fn message(json: &str) -> StreamEvent {
        StreamEvent::Message(Box::new(serde_json::from_str(json).unwrap()))
    }

    fn drive_frame(t: f64, lap: i64, dist: f64) -> StreamEvent {
        message(&format!(
            r#"{{"frame":{{"t":{t},"drivers":{{"VER":{{"speed":250,"gear":7,"throttle":100,"brake":0,"dist":{dist},"lap":{lap}}},"HAM":{{"speed":240,"dist":{dist},"lap":{lap}}}}}}}}}"#
        ))
    }

    fn view_with(config: &AppConfig) -> (Sender<StreamEvent>, LiveTelemetryView) {
        let (tx, rx) = mpsc::channel();
        (tx, LiveTelemetryView::new(rx, config))
    }

    #[test]
    fn test_update_ingests_and_selects_first_driver() {
        let (tx, mut view) = view_with(&AppConfig::default());
        tx.send(StreamEvent::ConnectionStatus(ConnectionStatus::Connected))
            .unwrap();
        tx.send(drive_frame(0., 1, 0.)).unwrap();
        tx.send(drive_frame(1., 1, 70.)).unwrap();

        assert_eq!(view.update(), 3);
        assert_eq!(view.selector().selected(), Some("HAM"));
        assert_eq!(view.snapshot().trace.x, vec![-1., 0.]);
        assert_eq!(view.snapshot().extent, AxisExtent { min: -30., max: 0. });
        assert_eq!(view.connection(), &ConnectionStatus::Connected);
    }

    #[test]
    fn test_preferred_driver_is_selected_once_seen() {
        let config = AppConfig {
            selected_driver: Some("VER".to_string()),
            x_mode: WindowMode::Lap,
            ..Default::default()
        };
        let (tx, mut view) = view_with(&config);
        tx.send(drive_frame(0., 3, 1000.)).unwrap();
        tx.send(drive_frame(1., 3, 1075.)).unwrap();
        view.update();

        assert_eq!(view.selector().selected(), Some("VER"));
        assert_eq!(view.snapshot().trace.x, vec![0., 75.]);
        assert_eq!(view.snapshot().trace.gear, vec![7, 7]);
    }

    #[test]
    fn test_disconnect_clears_output_but_keeps_buffers() {
        let (tx, mut view) = view_with(&AppConfig::default());
        tx.send(drive_frame(0., 1, 0.)).unwrap();
        view.update();
        assert!(!view.snapshot().trace.is_empty());

        tx.send(StreamEvent::ConnectionStatus(ConnectionStatus::Disconnected))
            .unwrap();
        view.update();
        assert!(view.snapshot().trace.is_empty());
        assert_eq!(view.session().query("HAM", WindowMode::Time).trace.len(), 1);

        tx.send(drive_frame(1., 1, 60.)).unwrap();
        view.update();
        assert_eq!(view.snapshot().trace.len(), 2);
    }

    #[test]
    fn test_mode_switch_round_trip_is_stable() {
        let (tx, mut view) = view_with(&AppConfig::default());
        for i in 0..40 {
            tx.send(drive_frame(i as f64 * 0.5, 1 + i / 20, i as f64 * 30.))
                .unwrap();
        }
        while view.update() > 0 {}

        let before = view.snapshot().clone();
        view.set_mode(WindowMode::Lap);
        assert_ne!(view.snapshot(), &before);
        view.set_mode(WindowMode::Time);
        assert_eq!(view.snapshot(), &before);
    }

    #[test]
    fn test_update_is_bounded_per_refresh() {
        let (tx, mut view) = view_with(&AppConfig::default());
        for i in 0..(MAX_EVENTS_PER_REFRESH * 2) {
            tx.send(drive_frame(i as f64, 1, i as f64)).unwrap();
        }
        assert!(view.update() <= MAX_EVENTS_PER_REFRESH);
        drop(tx);
        while !view.is_stream_closed() {
            view.update();
        }
        assert_eq!(
            view.session().query("VER", WindowMode::Lap).trace.len(),
            MAX_EVENTS_PER_REFRESH * 2
        );
    }

    #[test]
    fn test_playback_metadata_in_status_line() {
        let (tx, mut view) = view_with(&AppConfig::default());
        tx.send(message(
            r#"{"frame_index":12,"total_frames":400,"track_status":"SC","playback_speed":2.0,"is_paused":true}"#,
        ))
        .unwrap();
        tx.send(drive_frame(0., 1, 0.)).unwrap();
        view.update();

        let line = view.status_line();
        assert!(line.starts_with("HAM | Time | 1 samples"));
        assert!(line.contains("frame 12/400"));
        assert!(line.contains("track SC"));
        assert!(line.ends_with("PAUSED"));
        assert_eq!(view.playback().playback_speed, Some(2.0));
    }

    #[test]
    fn test_source_failure_sets_error_status_and_clears_output() {
        let (tx, rx) = mpsc::channel();
        let source = FlakySource {
            events: vec![
                StreamEvent::ConnectionStatus(ConnectionStatus::Connected),
                drive_frame(0., 1, 0.),
                drive_frame(1., 1, 60.),
            ],
        };
        let producer = thread::spawn(move || collect_frames(source, tx, Pacing::AsFastAsPossible));

        let mut view = LiveTelemetryView::new(rx, &AppConfig::default());
        while !view.is_stream_closed() {
            view.update();
        }
        assert!(producer.join().unwrap().is_err());

        assert!(matches!(view.connection(), ConnectionStatus::Error(_)));
        assert!(view.snapshot().trace.is_empty());
        assert_eq!(view.session().query("VER", WindowMode::Time).trace.len(), 2);
        assert_eq!(view.selector().selected(), Some("HAM"));
    }
}
