use std::time::Duration;

use super::{Placement, Trigger, VisualKind, WaveEvent, WaveShape};
use crate::analysis::AudioEvent;
use crate::config::BorderConfig;

/// Outlined squares growing from the centre to the full viewport.
#[derive(Debug, Clone)]
pub struct BorderSquare {
    /// Scale beyond which squares fade out as they reach the edge
    size_fade_start: f32,
    /// Sharp beats change the image instead of spawning a square
    spawn_on_sharp: bool,
}

impl BorderSquare {
    pub fn new(config: &BorderConfig) -> Self {
        Self {
            size_fade_start: config.size_fade_start.clamp(0.0, 0.999),
            spawn_on_sharp: config.spawn_on_sharp_beats,
        }
    }

    fn size_factor(&self, scale: f32) -> f32 {
        if scale <= self.size_fade_start {
            return 1.0;
        }
        let fade = (scale - self.size_fade_start) / (1.0 - self.size_fade_start);
        1.0 - fade.min(1.0)
    }
}

impl Default for BorderSquare {
    fn default() -> Self {
        Self::new(&BorderConfig::default())
    }
}

impl WaveShape for BorderSquare {
    type Params = ();

    const KIND: VisualKind = VisualKind::BorderSquare;

    fn trigger(&self, event: &AudioEvent) -> Option<Trigger> {
        match event {
            AudioEvent::Beat { sharp: true, .. } if !self.spawn_on_sharp => None,
            AudioEvent::Beat { intensity, .. } => Some(Trigger {
                intensity: *intensity,
                level: *intensity,
            }),
            AudioEvent::Voice { .. } => None,
        }
    }

    fn spawn(&mut self, _trigger: &Trigger, _now: Duration, _newest: Option<&WaveEvent<()>>) {}

    fn place(&self, _wave: &WaveEvent<()>, _age: Duration, progress: f32) -> (Placement, f32, f32) {
        let scale = progress.clamp(0.0, 1.0);
        (
            Placement::Center { x: 0.5, y: 0.5 },
            scale,
            self.size_factor(scale),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SynthConfig;
    use crate::synth::{BorderSynth, Synthesizer};

    fn voice() -> AudioEvent {
        AudioEvent::Voice {
            timestamp: Duration::ZERO,
            intensity: 0.9,
            voice_energy: 200.0,
        }
    }

    #[test]
    fn test_ignores_voice_events() {
        let mut synth: BorderSynth = Synthesizer::new(SynthConfig::default(), BorderSquare::default());
        assert!(!synth.on_event(&voice(), Duration::ZERO));
        assert_eq!(synth.current_level(), 0.0);
    }

    #[test]
    fn test_scale_grows_linearly_and_fades_near_edge() {
        let mut synth: BorderSynth = Synthesizer::new(SynthConfig::default(), BorderSquare::default());
        let beat = AudioEvent::Beat {
            timestamp: Duration::ZERO,
            intensity: 1.0,
            sharp: false,
        };
        assert!(synth.on_event(&beat, Duration::ZERO));

        // full intensity lives 12 s
        let frame = synth.render(Duration::from_secs(3));
        assert_eq!(frame.len(), 1);
        assert!((frame[0].scale - 0.25).abs() < 1e-4);
        assert!((frame[0].opacity - 0.5).abs() < 1e-4);
        assert_eq!(frame[0].placement, Placement::Center { x: 0.5, y: 0.5 });

        // 0.8 of lifetime: lifetime fade 0.5 and size fade 2/3
        let frame = synth.render(Duration::from_millis(9_600));
        let expected = 0.5 * 0.5 * (1.0 - 0.1 / 0.3);
        assert!((frame[0].scale - 0.8).abs() < 1e-4);
        assert!((frame[0].opacity - expected).abs() < 1e-3);
    }

    #[test]
    fn test_sharp_beats_leave_the_border_alone() {
        let sharp = AudioEvent::Beat {
            timestamp: Duration::ZERO,
            intensity: 0.9,
            sharp: true,
        };
        let mut synth: BorderSynth = Synthesizer::new(SynthConfig::default(), BorderSquare::default());
        assert!(!synth.on_event(&sharp, Duration::ZERO));
        assert_eq!(synth.wave_count(), 0);

        let config = BorderConfig {
            spawn_on_sharp_beats: true,
            ..BorderConfig::default()
        };
        let mut synth: BorderSynth = Synthesizer::new(config.wave.clone(), BorderSquare::new(&config));
        assert!(synth.on_event(&sharp, Duration::ZERO));
        assert_eq!(synth.wave_count(), 1);
    }

    #[test]
    fn test_size_factor() {
        let shape = BorderSquare::default();
        assert_eq!(shape.size_factor(0.5), 1.0);
        assert!((shape.size_factor(0.85) - 0.5).abs() < 1e-5);
        assert_eq!(shape.size_factor(1.0), 0.0);
    }
}
