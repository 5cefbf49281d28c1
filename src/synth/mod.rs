// Synth module - event-driven procedural visuals
//
// A Synthesizer owns a bounded list of wave events. Each wave has its own
// lifetime fade; on top of that a synth-wide reactive fade dims every wave
// while the most recent triggering event was below the intensity threshold.
// Shapes plug in through WaveShape:
// - BorderSquare: centred squares growing to the viewport, driven by beats
// - DiagonalLine: slowly rotating lines, driven by voice onsets

use std::collections::VecDeque;
use std::time::Duration;

use serde::Serialize;

use crate::analysis::AudioEvent;
use crate::config::SynthConfig;
use crate::playback::{Easing, GainRamp};

pub mod border;
pub mod color;
pub mod diagonal;

pub use border::BorderSquare;
pub use color::{ColorState, Hsl};
pub use diagonal::{DiagonalLine, DiagonalParams};

/// Primitive kinds understood by the renderer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VisualKind {
    BorderSquare,
    DiagonalLine,
}

/// Where a primitive sits, in viewport-relative coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Placement {
    Center { x: f32, y: f32 },
    Angle { degrees: f32 },
}

/// One drawable item for the current frame
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VisualPrimitive {
    pub kind: VisualKind,
    pub placement: Placement,
    /// Fraction of the viewport (squares) or of its diagonal (lines)
    pub scale: f32,
    pub opacity: f32,
    pub color: Hsl,
}

/// A spawned visual instance
#[derive(Debug, Clone, PartialEq)]
pub struct WaveEvent<P> {
    pub id: u64,
    pub created_at: Duration,
    pub intensity: f32,
    pub kind: VisualKind,
    /// Segment that spawned the wave; `None` survives segment changes
    pub segment: Option<usize>,
    pub params: P,
}

/// How an incoming event drives a shape
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Trigger {
    /// Intensity stored on the wave; sets its lifetime
    pub intensity: f32,
    /// Level compared against the spawn threshold and tracked for the reactive fade
    pub level: f32,
}

/// Shape-specific part of a synthesizer.
pub trait WaveShape {
    type Params: Clone + std::fmt::Debug;

    const KIND: VisualKind;

    /// Map an audio event onto this shape, or ignore it.
    fn trigger(&self, event: &AudioEvent) -> Option<Trigger>;

    /// Parameters for a new wave. `newest` is the most recently spawned wave.
    fn spawn(
        &mut self,
        trigger: &Trigger,
        now: Duration,
        newest: Option<&WaveEvent<Self::Params>>,
    ) -> Self::Params;

    /// Segment-independent waves created when the synth starts.
    fn bootstrap(&mut self) -> Vec<(f32, Self::Params)> {
        Vec::new()
    }

    /// Placement, scale and a shape opacity factor for a live wave.
    fn place(&self, wave: &WaveEvent<Self::Params>, age: Duration, progress: f32) -> (Placement, f32, f32);
}

pub struct Synthesizer<S: WaveShape> {
    config: SynthConfig,
    shape: S,
    waves: VecDeque<WaveEvent<S::Params>>,
    next_id: u64,
    last_spawn: Option<Duration>,
    current_level: f32,
    current_segment: Option<usize>,
    reactive: GainRamp,
    color: ColorState,
}

impl<S: WaveShape> Synthesizer<S> {
    pub fn new(config: SynthConfig, shape: S) -> Self {
        let color = ColorState::new(Duration::from_millis(config.color_refresh_ms), config.color_step);
        Self {
            config,
            shape,
            waves: VecDeque::new(),
            next_id: 0,
            last_spawn: None,
            current_level: 0.0,
            current_segment: None,
            reactive: GainRamp::new(1.0, 1.0, Duration::ZERO, Duration::ZERO, Easing::Linear),
            color,
        }
    }

    pub fn shape(&self) -> &S {
        &self.shape
    }

    pub fn config(&self) -> &SynthConfig {
        &self.config
    }

    pub fn waves(&self) -> impl Iterator<Item = &WaveEvent<S::Params>> {
        self.waves.iter()
    }

    pub fn wave_count(&self) -> usize {
        self.waves.len()
    }

    pub fn current_level(&self) -> f32 {
        self.current_level
    }

    pub fn color(&self) -> Hsl {
        self.color.current()
    }

    /// Spawn the shape's bootstrap waves.
    pub fn start(&mut self, now: Duration) {
        for (intensity, params) in self.shape.bootstrap() {
            self.push_wave(intensity, None, params, now);
        }
        if !self.waves.is_empty() {
            tracing::debug!("[Synth] {:?} bootstrapped {} waves", S::KIND, self.waves.len());
        }
    }

    /// Feed an audio event. Returns true when a wave was spawned.
    pub fn on_event(&mut self, event: &AudioEvent, now: Duration) -> bool {
        let Some(trigger) = self.shape.trigger(event) else {
            return false;
        };
        self.current_level = trigger.level;

        if trigger.level < self.config.min_intensity {
            return false;
        }
        let min_interval = Duration::from_millis(self.config.min_spawn_interval_ms);
        if let Some(last) = self.last_spawn {
            if now.saturating_sub(last) < min_interval {
                return false;
            }
        }
        self.last_spawn = Some(now);

        self.prune_expired(now);
        let params = self.shape.spawn(&trigger, now, self.waves.back());
        self.push_wave(trigger.intensity, self.current_segment, params, now);
        tracing::trace!(
            "[Synth] {:?} wave {} spawned (intensity {:.2}, {} live)",
            S::KIND,
            self.next_id - 1,
            trigger.intensity,
            self.waves.len()
        );
        true
    }

    /// Drop waves tagged with another segment and forget the tracked level.
    pub fn on_segment_changed(&mut self, index: usize) {
        if self.current_segment == Some(index) {
            return;
        }
        let before = self.waves.len();
        self.waves.retain(|w| w.segment.map_or(true, |s| s == index));
        self.current_segment = Some(index);
        self.current_level = 0.0;
        tracing::debug!(
            "[Synth] {:?} segment -> {}, purged {} waves",
            S::KIND,
            index,
            before - self.waves.len()
        );
    }

    /// Advance the colour state by one frame.
    pub fn update_color(&mut self, spectrum: Option<&[u8]>, now: Duration) -> Hsl {
        self.color.update(spectrum, now)
    }

    /// Lifetime-derived opacity factor, 1 until the fade window.
    fn lifetime_factor(&self, progress: f32) -> f32 {
        let start = self.config.lifetime_fade_start.clamp(0.0, 0.999);
        if progress < start {
            1.0
        } else {
            (1.0 - (progress - start) / (1.0 - start)).clamp(0.0, 1.0)
        }
    }

    /// Retarget the reactive fade when the tracked level crosses the threshold.
    fn update_reactive(&mut self, now: Duration) {
        let target = if self.current_level >= self.config.min_intensity {
            1.0
        } else {
            0.0
        };
        if self.reactive.target() == target {
            return;
        }
        let duration_ms = if target > 0.0 {
            self.config.reactive_fade_in_ms
        } else {
            self.config.reactive_fade_out_ms
        };
        self.reactive = GainRamp::new(
            self.reactive.value_at(now),
            target,
            now,
            Duration::from_millis(duration_ms),
            Easing::Linear,
        );
    }

    /// Primitives for this frame. Expired and fully faded waves are destroyed.
    pub fn render(&mut self, now: Duration) -> Vec<VisualPrimitive> {
        self.prune_expired(now);
        self.update_reactive(now);

        let reactive = self.reactive.value_at(now);
        let color = self.color.current();
        let fade_in = Duration::from_millis(self.config.wave_fade_in_ms);
        let cull = self.config.cull_opacity;
        let mut primitives = Vec::with_capacity(self.waves.len());
        let mut faded = Vec::new();

        for wave in &self.waves {
            let age = now.saturating_sub(wave.created_at);
            let lifetime = self.config.lifetime(wave.intensity);
            let progress = (age.as_secs_f32() / lifetime.as_secs_f32().max(f32::EPSILON)).min(1.0);

            let lifetime_opacity = self.config.base_opacity * self.lifetime_factor(progress);
            if lifetime_opacity <= cull && progress >= self.config.lifetime_fade_start {
                faded.push(wave.id);
                continue;
            }

            let wave_fade = if fade_in.is_zero() {
                1.0
            } else {
                (age.as_secs_f32() / fade_in.as_secs_f32()).min(1.0)
            };

            let (placement, scale, shape_opacity) = self.shape.place(wave, age, progress);
            let opacity = (lifetime_opacity * shape_opacity * wave_fade * reactive).clamp(0.0, 1.0);
            if opacity <= cull {
                continue;
            }
            primitives.push(VisualPrimitive {
                kind: S::KIND,
                placement,
                scale,
                opacity,
                color,
            });
        }

        if !faded.is_empty() {
            self.waves.retain(|w| !faded.contains(&w.id));
        }
        primitives
    }

    fn push_wave(&mut self, intensity: f32, segment: Option<usize>, params: S::Params, now: Duration) {
        self.waves.push_back(WaveEvent {
            id: self.next_id,
            created_at: now,
            intensity: intensity.clamp(0.0, 1.0),
            kind: S::KIND,
            segment,
            params,
        });
        self.next_id += 1;
        while self.waves.len() > self.config.max_waves.max(1) {
            self.waves.pop_front();
        }
    }

    fn prune_expired(&mut self, now: Duration) {
        let config = &self.config;
        self.waves
            .retain(|w| now.saturating_sub(w.created_at) < config.lifetime(w.intensity));
    }
}

/// Beat-driven border squares
pub type BorderSynth = Synthesizer<BorderSquare>;

/// Voice-driven diagonal lines
pub type DiagonalSynth = Synthesizer<DiagonalLine>;
