// FeatureExtractor - per-frame event detection from a magnitude buffer
//
// Consumes one byte magnitude buffer per animation frame, maintains the
// rhythm/voice/sharp histories and emits beat and voice events gated by an
// intensity-dependent refractory interval.

use std::time::Duration;

use super::bands::BandEnergies;
use super::detector::AdaptiveDetector;
use super::{AudioEvent, AudioSnapshot, FrameAnalysis, ReactiveSignal};
use crate::config::AnalysisConfig;

/// Timestamp and intensity of the last accepted event of one kind
#[derive(Debug, Clone, Copy)]
struct LastEvent {
    at: Duration,
    intensity: f32,
}

pub struct FeatureExtractor {
    config: AnalysisConfig,
    rhythm: AdaptiveDetector,
    voice: AdaptiveDetector,
    sharp: AdaptiveDetector,
    last_beat: Option<LastEvent>,
    previous_beat_at: Option<Duration>,
    last_voice: Option<LastEvent>,
    segment: Option<usize>,
    rhythm_intensity: f32,
    voice_intensity: f32,
    frames_analyzed: u64,
}

impl FeatureExtractor {
    pub fn new(config: AnalysisConfig) -> Self {
        let rhythm = AdaptiveDetector::new(config.rhythm_window, config.beat.clone());
        let voice = AdaptiveDetector::new(config.voice_window, config.voice.clone());
        let sharp = AdaptiveDetector::new(config.sharp_window, config.sharp.clone());
        Self {
            config,
            rhythm,
            voice,
            sharp,
            last_beat: None,
            previous_beat_at: None,
            last_voice: None,
            segment: None,
            rhythm_intensity: 0.0,
            voice_intensity: 0.0,
            frames_analyzed: 0,
        }
    }

    pub fn current_segment(&self) -> Option<usize> {
        self.segment
    }

    pub fn rhythm_intensity(&self) -> f32 {
        self.rhythm_intensity
    }

    pub fn voice_intensity(&self) -> f32 {
        self.voice_intensity
    }

    pub fn frames_analyzed(&self) -> u64 {
        self.frames_analyzed
    }

    /// Reset histories when the active segment changes.
    ///
    /// Receiving the index that is already active is a no-op.
    pub fn on_segment_changed(&mut self, index: usize) {
        if self.segment == Some(index) {
            return;
        }
        tracing::debug!(
            "[FeatureExtractor] Segment {:?} -> {}, clearing histories",
            self.segment,
            index
        );
        self.segment = Some(index);
        self.reset();
    }

    pub fn reset(&mut self) {
        self.rhythm.reset();
        self.voice.reset();
        self.sharp.reset();
        self.last_beat = None;
        self.previous_beat_at = None;
        self.last_voice = None;
        self.rhythm_intensity = 0.0;
        self.voice_intensity = 0.0;
    }

    /// Analyse one frame.
    ///
    /// Returns `None` when no spectrum is available; that is the normal state
    /// before an output is connected and never an error.
    pub fn analyze_frame(&mut self, spectrum: Option<&[u8]>, now: Duration) -> Option<FrameAnalysis> {
        let spectrum = spectrum.filter(|s| !s.is_empty())?;
        self.frames_analyzed += 1;

        let bands = BandEnergies::from_spectrum(spectrum, &self.config.bands);
        let total_energy = bands.total();
        let volume = (total_energy / 255.0).min(1.0);
        let rhythm_energy = bands.rhythm();
        let voice_energy = bands.voice();
        let sharp_energy = bands.sharp();

        self.rhythm_intensity = normalize(rhythm_energy);
        self.voice_intensity = normalize(voice_energy);

        let rhythm = self.rhythm.evaluate(rhythm_energy, volume);
        let sharp = self.sharp.evaluate(sharp_energy, volume);
        let voice = self.voice.evaluate(voice_energy, volume);

        let mut events = Vec::new();

        if rhythm.triggered() {
            let intensity = self.rhythm_intensity;
            if refractory_elapsed(&self.config.beat, self.last_beat, intensity, now) {
                self.previous_beat_at = self.last_beat.map(|last| last.at);
                self.last_beat = Some(LastEvent { at: now, intensity });
                let event = AudioEvent::Beat {
                    timestamp: now,
                    intensity,
                    sharp: sharp.triggered(),
                };
                tracing::debug!("[FeatureExtractor] {:?}", event);
                events.push(event);
            }
        }

        let significant_voice = voice_energy > 0.0
            && (voice_energy > voice.mean * self.config.voice_significant_ratio
                || voice_energy > self.config.voice_significant_floor);
        if significant_voice || voice.triggered() {
            let intensity = self.voice_intensity;
            if refractory_elapsed(&self.config.voice, self.last_voice, intensity, now) {
                self.last_voice = Some(LastEvent { at: now, intensity });
                let event = AudioEvent::Voice {
                    timestamp: now,
                    intensity,
                    voice_energy,
                };
                tracing::trace!("[FeatureExtractor] {:?}", event);
                events.push(event);
            }
        }

        let signal = ReactiveSignal {
            rhythm_energy,
            voice_energy,
            sharp_energy,
            total_energy,
            normalized_volume: volume,
            rhythm_intensity: self.rhythm_intensity,
            voice_intensity: self.voice_intensity,
        };
        let snapshot = AudioSnapshot::new(
            bands,
            rhythm.mean,
            rhythm.variance,
            self.estimated_bpm(),
        );

        Some(FrameAnalysis {
            signal,
            snapshot,
            events,
        })
    }

    fn estimated_bpm(&self) -> f32 {
        match (self.previous_beat_at, self.last_beat) {
            (Some(previous), Some(last)) if last.at > previous => {
                60.0 / (last.at - previous).as_secs_f32()
            }
            _ => 0.0,
        }
    }
}

fn normalize(energy: f32) -> f32 {
    (energy / 255.0).clamp(0.0, 1.0)
}

/// An event is accepted once both the refractory of the candidate and that of
/// the previous event have elapsed.
fn refractory_elapsed(
    tuning: &crate::config::DetectorTuning,
    last: Option<LastEvent>,
    intensity: f32,
    now: Duration,
) -> bool {
    match last {
        None => true,
        Some(last) => {
            let required = tuning.refractory(intensity).max(tuning.refractory(last.intensity));
            now.saturating_sub(last.at) >= required
        }
    }
}
