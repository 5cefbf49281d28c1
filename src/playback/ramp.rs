use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Easing curves used by gain ramps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Easing {
    Linear,
    SineOut,
    QuadIn,
    QuadOut,
}

impl Easing {
    /// Map linear progress `t` in 0..=1 onto the curve.
    pub fn apply(self, t: f32) -> f32 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Easing::Linear => t,
            Easing::SineOut => (t * std::f32::consts::FRAC_PI_2).sin(),
            Easing::QuadIn => t * t,
            Easing::QuadOut => 1.0 - (1.0 - t) * (1.0 - t),
        }
    }
}

/// Time-based interpolation between two gain values.
///
/// A ramp never jumps: its value at `start` is `from`, and it only reaches
/// `to` once `duration` has elapsed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GainRamp {
    from: f32,
    to: f32,
    start: Duration,
    duration: Duration,
    easing: Easing,
}

impl GainRamp {
    pub fn new(from: f32, to: f32, start: Duration, duration: Duration, easing: Easing) -> Self {
        Self {
            from,
            to,
            start,
            duration,
            easing,
        }
    }

    pub fn from(&self) -> f32 {
        self.from
    }

    pub fn target(&self) -> f32 {
        self.to
    }

    pub fn start(&self) -> Duration {
        self.start
    }

    pub fn end(&self) -> Duration {
        self.start + self.duration
    }

    pub fn is_fade_out(&self) -> bool {
        self.to < self.from || self.to == 0.0
    }

    pub fn progress(&self, now: Duration) -> f32 {
        if self.duration.is_zero() {
            return 1.0;
        }
        let elapsed = now.saturating_sub(self.start).as_secs_f32();
        (elapsed / self.duration.as_secs_f32()).clamp(0.0, 1.0)
    }

    pub fn value_at(&self, now: Duration) -> f32 {
        let eased = self.easing.apply(self.progress(now));
        self.from + (self.to - self.from) * eased
    }

    pub fn is_complete(&self, now: Duration) -> bool {
        now >= self.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_easing_endpoints() {
        for easing in [Easing::Linear, Easing::SineOut, Easing::QuadIn, Easing::QuadOut] {
            assert!(easing.apply(0.0).abs() < 1e-6);
            assert!((easing.apply(1.0) - 1.0).abs() < 1e-6);
        }
        assert!(Easing::QuadIn.apply(0.5) < 0.5);
        assert!(Easing::QuadOut.apply(0.5) > 0.5);
        assert!(Easing::SineOut.apply(0.5) > 0.5);
    }

    #[test]
    fn test_ramp_values() {
        let start = Duration::from_secs(10);
        let ramp = GainRamp::new(1.0, 0.0, start, Duration::from_millis(400), Easing::Linear);

        assert_eq!(ramp.value_at(Duration::from_secs(9)), 1.0);
        assert_eq!(ramp.value_at(start), 1.0);
        assert!((ramp.value_at(start + Duration::from_millis(100)) - 0.75).abs() < 1e-6);
        assert_eq!(ramp.value_at(start + Duration::from_secs(1)), 0.0);
        assert!(ramp.is_fade_out());
        assert!(!ramp.is_complete(start + Duration::from_millis(399)));
        assert!(ramp.is_complete(start + Duration::from_millis(400)));
    }

    #[test]
    fn test_zero_duration_ramp_is_immediately_complete() {
        let ramp = GainRamp::new(0.2, 0.8, Duration::ZERO, Duration::ZERO, Easing::SineOut);
        assert!(ramp.is_complete(Duration::ZERO));
        assert_eq!(ramp.value_at(Duration::ZERO), 0.8);
    }

    #[test]
    fn test_ramp_is_monotonic() {
        let ramp = GainRamp::new(0.0, 1.0, Duration::ZERO, Duration::from_millis(2500), Easing::SineOut);
        let mut last = -1.0;
        for ms in (0..=2600).step_by(16) {
            let value = ramp.value_at(Duration::from_millis(ms));
            assert!(value >= last);
            last = value;
        }
    }
}
