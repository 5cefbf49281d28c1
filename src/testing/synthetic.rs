//! Procedural spectrum frames with bass pulses, voice and treble content.

use std::time::Duration;

use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::analysis::SpectrumSource;

const BINS: usize = 1024;
const BASS_BINS: std::ops::Range<usize> = 0..200;
const VOICE_BINS: std::ops::Range<usize> = 200..600;
const TREBLE_BINS: std::ops::Range<usize> = 600..BINS;

/// Byte spectrum generator advancing one frame per `spectrum()` call.
///
/// Beats are rectangular bass pulses `pulse_frames` long at the configured
/// tempo. Voice content holds the mid bins at a constant level; sharp beats
/// add treble on the pulse frames.
#[derive(Debug, Clone)]
pub struct SyntheticSpectrum {
    frame_interval: Duration,
    frame: u64,
    beat_period: Option<Duration>,
    pulse_frames: u64,
    pulse_level: u8,
    voice_level: u8,
    sharp_beats: bool,
    noise: Option<(StdRng, u8)>,
    buffer: Vec<u8>,
}

impl SyntheticSpectrum {
    /// Silent generator; every frame is all zeros until content is added.
    pub fn new(frame_interval: Duration) -> Self {
        Self {
            frame_interval: frame_interval.max(Duration::from_millis(1)),
            frame: 0,
            beat_period: None,
            pulse_frames: 2,
            pulse_level: 230,
            voice_level: 0,
            sharp_beats: false,
            noise: None,
            buffer: vec![0; BINS],
        }
    }

    pub fn with_bpm(mut self, bpm: f32) -> Self {
        self.beat_period = (bpm > 0.0).then(|| Duration::from_secs_f32(60.0 / bpm));
        self
    }

    pub fn with_pulse(mut self, level: u8, frames: u64) -> Self {
        self.pulse_level = level;
        self.pulse_frames = frames.max(1);
        self
    }

    pub fn with_voice(mut self, level: u8) -> Self {
        self.voice_level = level;
        self
    }

    pub fn with_sharp_beats(mut self) -> Self {
        self.sharp_beats = true;
        self
    }

    /// Add seeded random jitter of up to `amplitude` to every bin.
    pub fn with_noise(mut self, seed: u64, amplitude: u8) -> Self {
        self.noise = Some((StdRng::seed_from_u64(seed), amplitude));
        self
    }

    pub fn frames_generated(&self) -> u64 {
        self.frame
    }

    /// Whether `frame` falls on a bass pulse.
    pub fn is_pulse_frame(&self, frame: u64) -> bool {
        let Some(period) = self.beat_period else {
            return false;
        };
        let at = self.frame_interval * frame as u32;
        let into_beat = at.as_micros() % period.as_micros().max(1);
        into_beat < (self.frame_interval * self.pulse_frames as u32).as_micros()
    }

    fn fill(&mut self) {
        let pulse = self.is_pulse_frame(self.frame);
        self.buffer.fill(0);

        if pulse {
            self.buffer[BASS_BINS].fill(self.pulse_level);
            if self.sharp_beats {
                self.buffer[TREBLE_BINS].fill(self.pulse_level);
            }
        }
        if self.voice_level > 0 {
            self.buffer[VOICE_BINS].fill(self.voice_level);
        }
        if let Some((rng, amplitude)) = self.noise.as_mut() {
            for bin in self.buffer.iter_mut() {
                *bin = bin.saturating_add(rng.gen_range(0..=*amplitude));
            }
        }
    }
}

impl SpectrumSource for SyntheticSpectrum {
    fn spectrum(&mut self) -> Option<&[u8]> {
        self.fill();
        self.frame += 1;
        Some(&self.buffer)
    }
}
