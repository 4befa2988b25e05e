use std::{sync::mpsc::Sender, thread, time::Duration};

use log::error;

use crate::PitwallError;

use super::{ConnectionStatus, StreamEvent, producer::FrameSource};

const MAX_FRAME_DELAY_MS: f64 = 1000.;

/// How fast a recorded stream is pushed to the consumer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Pacing {
    AsFastAsPossible,
    /// Follows the session clock, scaled by `speed` (2.0 = twice as fast).
    Realtime { speed: f64 },
}

impl Pacing {
    /// Wait between two frames stamped `prev_t` and `next_t`. Gaps in the
    /// recording are capped so a paused replay does not stall the consumer.
    pub fn delay(&self, prev_t: f64, next_t: f64) -> Duration {
        match *self {
            Pacing::AsFastAsPossible => Duration::ZERO,
            Pacing::Realtime { speed } if speed <= 0. => Duration::ZERO,
            Pacing::Realtime { speed } => {
                let delay_ms = ((next_t - prev_t).max(0.) * 1000. / speed).min(MAX_FRAME_DELAY_MS);
                Duration::from_micros((delay_ms * 1000.) as u64)
            }
        }
    }
}

/// Reads every event from `source` and forwards it to `event_sender` until the
/// source is exhausted or the receiving side hangs up. A failing source is
/// reported to the consumer as a [`ConnectionStatus::Error`] before the error
/// is returned.
pub fn collect_frames(
    mut source: impl FrameSource,
    event_sender: Sender<StreamEvent>,
    pacing: Pacing,
) -> Result<(), PitwallError> {
    source
        .start()
        .map_err(|e| report_source_error(&event_sender, e))?;

    let mut last_session_time: Option<f64> = None;
    while let Some(event) = source
        .next_event()
        .map_err(|e| report_source_error(&event_sender, e))?
    {
        if let StreamEvent::Message(message) = &event
            && let Some(t) = message.frame.as_ref().and_then(|f| f.t)
        {
            if let Some(prev_t) = last_session_time {
                let delay = pacing.delay(prev_t, t);
                if !delay.is_zero() {
                    thread::sleep(delay);
                }
            }
            last_session_time = Some(t);
        }

        event_sender.send(event).map_err(|e| {
            error!("Could not send stream event: {}", e);
            PitwallError::from(e)
        })?;
    }
    Ok(())
}

fn report_source_error(event_sender: &Sender<StreamEvent>, e: PitwallError) -> PitwallError {
    error!("Telemetry source failed: {}", e);
    // the consumer may already be gone, the source error is what matters
    let _ = event_sender.send(StreamEvent::ConnectionStatus(ConnectionStatus::Error(
        e.to_string(),
    )));
    e
}
