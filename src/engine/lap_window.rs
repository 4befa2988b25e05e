use crate::telemetry::Sample;

/// Samples belonging to the competitor's current lap, with distances re-based
/// so the lap starts at 0.
#[derive(Clone, Debug, Default)]
pub struct LapWindow {
    current_lap: Option<i64>,
    lap_start_distance: f64,
    samples: Vec<Sample>,
}

impl LapWindow {
    /// Appends `sample` to the current lap. When the sample reports a lap
    /// other than the current one the window is reset first and the length of
    /// the lap being closed is returned. A sample without a lap number never
    /// triggers a reset.
    pub fn push(&mut self, sample: Sample) -> Option<f64> {
        let mut completed_length = None;
        if sample.lap_number.is_some() && sample.lap_number != self.current_lap {
            completed_length = self.samples.last().map(|last| last.distance_m);
            self.current_lap = sample.lap_number;
            self.lap_start_distance = sample.distance_m;
            self.samples.clear();
        }

        self.samples.push(Sample {
            distance_m: sample.distance_m - self.lap_start_distance,
            ..sample
        });
        completed_length
    }

    pub fn current_lap(&self) -> Option<i64> {
        self.current_lap
    }

    pub fn lap_start_distance(&self) -> f64 {
        self.lap_start_distance
    }

    /// Samples of the current lap, distances already lap-relative
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }
}
