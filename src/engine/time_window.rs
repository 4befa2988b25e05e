use std::collections::VecDeque;

use crate::telemetry::Sample;

/// Samples from the last `span_s` seconds of session time.
///
/// The span is measured against the newest sample. Out-of-order samples are
/// stored as delivered and never reordered.
#[derive(Clone, Debug, Default)]
pub struct TimeWindow {
    samples: VecDeque<Sample>,
}

impl TimeWindow {
    pub fn push(&mut self, sample: Sample, span_s: f64) {
        let cutoff = sample.session_time - span_s;
        self.samples.push_back(sample);
        while self
            .samples
            .front()
            .is_some_and(|front| front.session_time < cutoff)
        {
            self.samples.pop_front();
        }
    }

    pub fn latest(&self) -> Option<&Sample> {
        self.samples.back()
    }

    pub fn samples(&self) -> impl ExactSizeIterator<Item = &Sample> {
        self.samples.iter()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}
