// Adaptive threshold detection over a rolling energy history
//
// Each frame the current value joins the history first, then the threshold
// is derived from the history's mean and deviation. Quieter material gets a
// higher sensitivity so that soft passages still produce events.

use super::window::RollingWindow;
use crate::config::DetectorTuning;

/// Outcome of evaluating one frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Crossing {
    pub above_threshold: bool,
    pub spike: bool,
    pub threshold: f32,
    pub mean: f32,
    pub variance: f32,
}

impl Crossing {
    pub fn triggered(&self) -> bool {
        self.above_threshold || self.spike
    }
}

#[derive(Debug, Clone)]
pub struct AdaptiveDetector {
    history: RollingWindow,
    tuning: DetectorTuning,
}

impl AdaptiveDetector {
    pub fn new(window: usize, tuning: DetectorTuning) -> Self {
        Self {
            history: RollingWindow::new(window),
            tuning,
        }
    }

    pub fn tuning(&self) -> &DetectorTuning {
        &self.tuning
    }

    pub fn history(&self) -> &RollingWindow {
        &self.history
    }

    pub fn reset(&mut self) {
        self.history.clear();
    }

    /// Sensitivity for the given normalized volume.
    pub fn sensitivity(&self, volume: f32) -> f32 {
        let quiet = 1.0 - volume.clamp(0.0, 1.0);
        self.tuning.sensitivity_base + self.tuning.sensitivity_span * quiet
    }

    /// Push `value` into the history and test it against the adaptive threshold.
    pub fn evaluate(&mut self, value: f32, volume: f32) -> Crossing {
        self.history.push(value);

        let quiet = 1.0 - volume.clamp(0.0, 1.0);
        let mean = self.history.mean();
        let variance = self.history.variance();
        let threshold = mean + variance.sqrt() * self.sensitivity(volume) * self.tuning.deviation_scale;

        if value <= 0.0 {
            return Crossing {
                above_threshold: false,
                spike: false,
                threshold,
                mean,
                variance,
            };
        }

        let peak_ratio = self.tuning.spike_peak_base + self.tuning.spike_peak_span * quiet;
        let mean_ratio = self.tuning.spike_mean_base + self.tuning.spike_mean_span * quiet;
        let recent_max = self.history.recent_max(self.tuning.spike_recent);
        let spike = value > recent_max * peak_ratio && value > mean * mean_ratio;

        Crossing {
            above_threshold: value > threshold,
            spike,
            threshold,
            mean,
            variance,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silence_never_triggers() {
        let mut detector = AdaptiveDetector::new(20, DetectorTuning::beat());
        for _ in 0..50 {
            assert!(!detector.evaluate(0.0, 0.0).triggered());
        }
    }

    #[test]
    fn test_impulse_over_silence_triggers() {
        let mut detector = AdaptiveDetector::new(20, DetectorTuning::beat());
        for _ in 0..20 {
            detector.evaluate(0.0, 0.0);
        }
        let crossing = detector.evaluate(255.0, 0.4);
        assert!(crossing.above_threshold);
        assert!(crossing.spike);
        assert!(crossing.threshold < 255.0);
    }

    #[test]
    fn test_quiet_material_is_more_sensitive() {
        let detector = AdaptiveDetector::new(20, DetectorTuning::voice());
        assert!(detector.sensitivity(0.0) > detector.sensitivity(1.0));
        assert!((detector.sensitivity(1.0) - 0.05).abs() < 1e-6);
    }

    #[test]
    fn test_steady_signal_stays_below_threshold() {
        let mut detector = AdaptiveDetector::new(15, DetectorTuning::sharp());
        for _ in 0..15 {
            detector.evaluate(100.0, 0.5);
        }
        let crossing = detector.evaluate(100.0, 0.5);
        // flat history has no deviation, so the threshold equals the value
        assert!(!crossing.above_threshold);
        assert_eq!(crossing.variance, 0.0);
    }

    #[test]
    fn test_reset_clears_history() {
        let mut detector = AdaptiveDetector::new(5, DetectorTuning::beat());
        detector.evaluate(10.0, 0.5);
        detector.reset();
        assert!(detector.history().is_empty());
    }
}
