// Analysis module - frequency-domain feature extraction
//
// Turns one magnitude buffer per animation frame into continuous reactive
// signals and discrete beat/voice events.
//
// Pipeline:
// - SpectrumSource: supplies the 1024-bin byte buffer (or nothing)
// - BandEnergies: seven band averages combined into rhythm/voice/sharp
// - AdaptiveDetector: rolling mean/variance threshold plus spike rule
// - FeatureExtractor: refractory gating, segment resets, event output

use std::time::Duration;

use serde::Serialize;

pub mod bands;
pub mod detector;
pub mod extractor;
pub mod spectrum;
pub mod window;

pub use bands::BandEnergies;
pub use extractor::FeatureExtractor;
pub use spectrum::{NoSpectrum, SpectrumAnalyser, SpectrumSource, ANALYSER_FFT_SIZE};

/// Discrete musical event detected on one frame
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AudioEvent {
    /// Bass-driven rhythm onset; `sharp` marks strong treble content on the same frame
    Beat {
        timestamp: Duration,
        intensity: f32,
        sharp: bool,
    },
    /// Mid/treble onset associated with vocals
    Voice {
        timestamp: Duration,
        intensity: f32,
        voice_energy: f32,
    },
}

impl AudioEvent {
    pub fn timestamp(&self) -> Duration {
        match self {
            AudioEvent::Beat { timestamp, .. } | AudioEvent::Voice { timestamp, .. } => *timestamp,
        }
    }

    pub fn intensity(&self) -> f32 {
        match self {
            AudioEvent::Beat { intensity, .. } | AudioEvent::Voice { intensity, .. } => *intensity,
        }
    }
}

/// Continuous signals derived from the current frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ReactiveSignal {
    pub rhythm_energy: f32,
    pub voice_energy: f32,
    pub sharp_energy: f32,
    pub total_energy: f32,
    pub normalized_volume: f32,
    pub rhythm_intensity: f32,
    pub voice_intensity: f32,
}

/// Relative weight of each region against the total energy
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Dynamics {
    pub sub_bass_intensity: f32,
    pub bass_intensity: f32,
    pub mid_intensity: f32,
    pub treble_intensity: f32,
    pub bass_to_treble_ratio: f32,
}

/// Descriptive per-frame data for effects that want more than events
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct AudioSnapshot {
    pub bands: BandEnergies,
    pub total_energy: f32,
    pub bass_energy: f32,
    pub rhythm_mean: f32,
    pub rhythm_variance: f32,
    pub dynamics: Dynamics,
    pub estimated_bpm: f32,
}

impl AudioSnapshot {
    pub fn new(bands: BandEnergies, rhythm_mean: f32, rhythm_variance: f32, estimated_bpm: f32) -> Self {
        let total = bands.total();
        let denominator = if total > 0.0 { total } else { 1.0 };
        let treble = bands.treble + bands.presence;
        let treble_denominator = if treble > 0.0 { treble } else { 1.0 };

        Self {
            bands,
            total_energy: total,
            bass_energy: bands.bass_energy(),
            rhythm_mean,
            rhythm_variance,
            dynamics: Dynamics {
                sub_bass_intensity: bands.sub_bass / denominator,
                bass_intensity: bands.bass / denominator,
                mid_intensity: (bands.low_mid + bands.mid) / denominator,
                treble_intensity: treble / denominator,
                bass_to_treble_ratio: (bands.bass + bands.sub_bass) / treble_denominator,
            },
            estimated_bpm,
        }
    }
}

/// Everything the extractor produced for one frame
#[derive(Debug, Clone)]
pub struct FrameAnalysis {
    pub signal: ReactiveSignal,
    pub snapshot: AudioSnapshot,
    pub events: Vec<AudioEvent>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_accessors() {
        let beat = AudioEvent::Beat {
            timestamp: Duration::from_millis(250),
            intensity: 0.8,
            sharp: true,
        };
        assert_eq!(beat.timestamp(), Duration::from_millis(250));
        assert_eq!(beat.intensity(), 0.8);
    }

    #[test]
    fn test_event_serializes_with_kind_tag() {
        let voice = AudioEvent::Voice {
            timestamp: Duration::from_millis(10),
            intensity: 0.5,
            voice_energy: 42.0,
        };
        let json = serde_json::to_value(&voice).unwrap();
        assert_eq!(json["kind"], "voice");
        assert_eq!(json["voice_energy"], 42.0);
    }

    #[test]
    fn test_snapshot_dynamics_for_pure_bass() {
        let bands = BandEnergies {
            sub_bass: 200.0,
            bass: 100.0,
            ..BandEnergies::default()
        };
        let snapshot = AudioSnapshot::new(bands, 0.0, 0.0, 0.0);
        assert!((snapshot.total_energy - 300.0 / 7.0).abs() < 1e-3);
        assert_eq!(snapshot.bass_energy, 150.0);
        assert_eq!(snapshot.dynamics.treble_intensity, 0.0);
        assert_eq!(snapshot.dynamics.bass_to_treble_ratio, 300.0);
    }
}
