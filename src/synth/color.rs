use std::time::Duration;

use serde::Serialize;

use crate::analysis::bands::{fractional_average, normalized_centroid};

/// Hue in degrees, saturation and lightness in percent
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Hsl {
    pub hue: f32,
    pub saturation: f32,
    pub lightness: f32,
}

impl Hsl {
    pub const fn new(hue: f32, saturation: f32, lightness: f32) -> Self {
        Self {
            hue,
            saturation,
            lightness,
        }
    }

    /// CSS-style `hsl(h, s%, l%)` string with rounded components.
    pub fn css(&self) -> String {
        format!(
            "hsl({}, {}%, {}%)",
            self.hue.round() as i32,
            self.saturation.round() as i32,
            self.lightness.round() as i32
        )
    }
}

impl Default for Hsl {
    fn default() -> Self {
        Hsl::new(180.0, 70.0, 60.0)
    }
}

/// Colour for a magnitude buffer, or a slow hue drift without one.
pub fn target_color(spectrum: Option<&[u8]>, now: Duration) -> Hsl {
    let spectrum = match spectrum {
        Some(s) if !s.is_empty() => s,
        _ => {
            let drift = (now.as_millis() as f64 / 200.0) % 360.0;
            return Hsl::new(drift.round() as f32, 70.0, 60.0);
        }
    };

    let average = spectrum.iter().map(|&v| v as f32 / 255.0).sum::<f32>() / spectrum.len() as f32;
    let bass = fractional_average(spectrum, 0.0, 0.1) / 255.0;
    let treble = fractional_average(spectrum, 0.8, 1.0) / 255.0;
    let centroid = normalized_centroid(spectrum).unwrap_or(0.0);

    Hsl::new(
        ((centroid * 360.0) % 360.0).round(),
        (50.0 + (bass + treble) * 50.0).clamp(50.0, 100.0).round(),
        (40.0 + average * 30.0).clamp(40.0, 90.0).round(),
    )
}

/// Shortest signed distance from `from` to `to` on the hue circle.
fn hue_delta(from: f32, to: f32) -> f32 {
    let mut delta = (to - from) % 360.0;
    if delta > 180.0 {
        delta -= 360.0;
    } else if delta < -180.0 {
        delta += 360.0;
    }
    delta
}

/// Smoothed colour that chases a periodically refreshed target
#[derive(Debug, Clone)]
pub struct ColorState {
    current: Hsl,
    target: Hsl,
    last_refresh: Option<Duration>,
    refresh_interval: Duration,
    step: f32,
}

impl ColorState {
    pub fn new(refresh_interval: Duration, step: f32) -> Self {
        Self {
            current: Hsl::default(),
            target: Hsl::default(),
            last_refresh: None,
            refresh_interval,
            step: step.clamp(0.0, 1.0),
        }
    }

    pub fn current(&self) -> Hsl {
        self.current
    }

    pub fn target(&self) -> Hsl {
        self.target
    }

    /// Refresh the target when due, then take one interpolation step.
    pub fn update(&mut self, spectrum: Option<&[u8]>, now: Duration) -> Hsl {
        let due = self
            .last_refresh
            .map_or(true, |at| now.saturating_sub(at) >= self.refresh_interval);
        if due {
            self.target = target_color(spectrum, now);
            self.last_refresh = Some(now);
        }

        let hue = self.current.hue + hue_delta(self.current.hue, self.target.hue) * self.step;
        self.current = Hsl::new(
            hue.rem_euclid(360.0),
            self.current.saturation + (self.target.saturation - self.current.saturation) * self.step,
            self.current.lightness + (self.target.lightness - self.current.lightness) * self.step,
        );
        self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hue_takes_short_way_round() {
        assert_eq!(hue_delta(350.0, 10.0), 20.0);
        assert_eq!(hue_delta(10.0, 350.0), -20.0);
        assert_eq!(hue_delta(90.0, 180.0), 90.0);
    }

    #[test]
    fn test_interpolation_wraps_through_zero() {
        let mut state = ColorState::new(Duration::from_millis(100), 0.5);
        state.current = Hsl::new(350.0, 70.0, 60.0);
        state.target = Hsl::new(10.0, 70.0, 60.0);
        state.last_refresh = Some(Duration::ZERO);

        let color = state.update(None, Duration::from_millis(10));
        assert!((color.hue - 0.0).abs() < 1e-3 || (color.hue - 360.0).abs() < 1e-3);
        let color = state.update(None, Duration::from_millis(20));
        assert!((color.hue - 5.0).abs() < 1e-3);
    }

    #[test]
    fn test_target_without_spectrum_drifts() {
        let color = target_color(None, Duration::from_millis(2_000));
        assert_eq!(color, Hsl::new(10.0, 70.0, 60.0));
    }

    #[test]
    fn test_target_from_bright_spectrum() {
        let mut spectrum = vec![0u8; 1024];
        for bin in &mut spectrum[900..] {
            *bin = 255;
        }
        let color = target_color(Some(&spectrum), Duration::ZERO);
        // centroid near the top of the buffer maps to a hue near 340 degrees
        assert!(color.hue > 330.0 && color.hue < 350.0);
        assert!(color.saturation > 50.0);
        assert!(color.lightness >= 40.0 && color.lightness <= 90.0);
    }

    #[test]
    fn test_refresh_interval() {
        let mut state = ColorState::new(Duration::from_millis(100), 0.03);
        let silent = vec![0u8; 64];
        state.update(Some(&silent), Duration::ZERO);
        assert_eq!(state.target().hue, 0.0);

        let mut bright = vec![0u8; 64];
        bright[63] = 255;
        state.update(Some(&bright), Duration::from_millis(50));
        assert_eq!(state.target().hue, 0.0);
        state.update(Some(&bright), Duration::from_millis(100));
        assert!(state.target().hue > 300.0);
    }
}
