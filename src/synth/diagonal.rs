use std::time::Duration;

use rand::Rng;

use super::{Placement, Trigger, VisualKind, WaveEvent, WaveShape};
use crate::analysis::AudioEvent;
use crate::config::DiagonalConfig;

/// Angles and speeds of the lines shown before any voice is heard
const BOOTSTRAP_LINES: [(f32, f32); 6] = [
    (45.0, 1.0),
    (-45.0, 1.2),
    (90.0, 0.9),
    (-90.0, 1.1),
    (135.0, 1.3),
    (-135.0, 0.8),
];

const BOOTSTRAP_INTENSITY: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiagonalParams {
    pub base_angle: f32,
    pub speed: f32,
    pub initial_opacity: f32,
}

/// Long lines through the centre, rotating at an intensity-dependent speed.
#[derive(Debug, Clone)]
pub struct DiagonalLine {
    rotation_period_s: f32,
    length_factor: f32,
    significant_voice_energy: f32,
    significant_intensity: f32,
    bootstrap_lines: bool,
    last_angle: f32,
}

impl DiagonalLine {
    pub fn new(config: &DiagonalConfig) -> Self {
        Self {
            rotation_period_s: config.rotation_period_s.max(f32::EPSILON),
            length_factor: config.length_factor,
            significant_voice_energy: config.significant_voice_energy,
            significant_intensity: config.significant_intensity,
            bootstrap_lines: config.bootstrap_lines,
            last_angle: rand::thread_rng().gen_range(-180.0..180.0),
        }
    }

    /// Angle of a line `age` after its creation, in degrees.
    pub fn angle_at(&self, params: &DiagonalParams, age: Duration) -> f32 {
        let degrees_per_second = 360.0 / (self.rotation_period_s / params.speed);
        (params.base_angle + age.as_secs_f32() * degrees_per_second) % 360.0
    }

    pub fn last_angle(&self) -> f32 {
        self.last_angle
    }
}

impl Default for DiagonalLine {
    fn default() -> Self {
        Self::new(&DiagonalConfig::default())
    }
}

impl WaveShape for DiagonalLine {
    type Params = DiagonalParams;

    const KIND: VisualKind = VisualKind::DiagonalLine;

    fn trigger(&self, event: &AudioEvent) -> Option<Trigger> {
        match event {
            AudioEvent::Voice {
                intensity,
                voice_energy,
                ..
            } => {
                let level = if *voice_energy > self.significant_voice_energy {
                    intensity.max(self.significant_intensity)
                } else {
                    *intensity
                };
                Some(Trigger {
                    intensity: *intensity,
                    level,
                })
            }
            AudioEvent::Beat { .. } => None,
        }
    }

    fn spawn(&mut self, trigger: &Trigger, now: Duration, newest: Option<&WaveEvent<DiagonalParams>>) -> DiagonalParams {
        if let Some(newest) = newest {
            self.last_angle = self.angle_at(&newest.params, now.saturating_sub(newest.created_at));
        }
        let intensity = trigger.intensity.clamp(0.0, 1.0);
        DiagonalParams {
            base_angle: self.last_angle,
            speed: 3.0 + intensity * 5.0,
            initial_opacity: 0.3 + intensity * 0.7,
        }
    }

    fn bootstrap(&mut self) -> Vec<(f32, DiagonalParams)> {
        if !self.bootstrap_lines {
            return Vec::new();
        }
        self.last_angle = BOOTSTRAP_LINES[BOOTSTRAP_LINES.len() - 1].0;
        BOOTSTRAP_LINES
            .iter()
            .map(|&(base_angle, speed)| {
                (
                    BOOTSTRAP_INTENSITY,
                    DiagonalParams {
                        base_angle,
                        speed,
                        initial_opacity: 1.0,
                    },
                )
            })
            .collect()
    }

    fn place(&self, wave: &WaveEvent<DiagonalParams>, age: Duration, _progress: f32) -> (Placement, f32, f32) {
        (
            Placement::Angle {
                degrees: self.angle_at(&wave.params, age),
            },
            self.length_factor,
            wave.params.initial_opacity,
        )
    }
}
