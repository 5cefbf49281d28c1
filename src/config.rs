//! Configuration management for engine tuning
//!
//! Every tuning constant of the engine lives here, grouped into one struct
//! per component. Values load from a JSON file at startup so thresholds and
//! fade timings can be adjusted without recompiling. Missing fields fall
//! back to their defaults.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Complete engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub analysis: AnalysisConfig,
    pub playback: PlaybackConfig,
    pub border: BorderConfig,
    pub diagonal: DiagonalConfig,
    pub gallery: GalleryConfig,
    pub frame: FrameConfig,
}

/// Inclusive-exclusive bin range of one frequency band
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BandRange {
    pub start: usize,
    pub end: usize,
}

impl BandRange {
    pub const fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}

/// Bin layout of the seven analysis bands over a 1024-bin buffer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BandLayout {
    pub sub_bass: BandRange,
    pub bass: BandRange,
    pub low_mid: BandRange,
    pub mid: BandRange,
    pub high_mid: BandRange,
    pub treble: BandRange,
    pub presence: BandRange,
}

impl Default for BandLayout {
    fn default() -> Self {
        Self {
            sub_bass: BandRange::new(0, 24),
            bass: BandRange::new(24, 80),
            low_mid: BandRange::new(80, 200),
            mid: BandRange::new(200, 400),
            high_mid: BandRange::new(400, 600),
            treble: BandRange::new(600, 800),
            presence: BandRange::new(800, 1024),
        }
    }
}

/// Adaptive threshold tuning for one event kind
///
/// With `v` the normalized volume:
/// - sensitivity = `sensitivity_base + sensitivity_span * (1 - v)`
/// - threshold = `mean + std * sensitivity * deviation_scale`
/// - spike when value > `max(last spike_recent) * (spike_peak_base + spike_peak_span * (1 - v))`
///   and value > `mean * (spike_mean_base + spike_mean_span * (1 - v))`
///
/// A partial block in a config file overrides only the fields it names; the
/// rest keep the defaults of that event kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorTuning {
    pub sensitivity_base: f32,
    pub sensitivity_span: f32,
    pub deviation_scale: f32,
    pub spike_recent: usize,
    pub spike_peak_base: f32,
    pub spike_peak_span: f32,
    pub spike_mean_base: f32,
    pub spike_mean_span: f32,
    /// Refractory interval at full intensity
    pub refractory_min_ms: u64,
    /// Refractory interval at zero intensity
    pub refractory_max_ms: u64,
}

impl DetectorTuning {
    pub fn beat() -> Self {
        Self {
            sensitivity_base: 0.05,
            sensitivity_span: 0.25,
            deviation_scale: 0.4,
            spike_recent: 5,
            spike_peak_base: 0.15,
            spike_peak_span: 0.1,
            spike_mean_base: 0.7,
            spike_mean_span: 0.2,
            refractory_min_ms: 100,
            refractory_max_ms: 300,
        }
    }

    /// Sharp detection only flags beats, so it carries no refractory.
    pub fn sharp() -> Self {
        Self {
            sensitivity_base: 0.22,
            sensitivity_span: 0.33,
            deviation_scale: 0.75,
            spike_recent: 4,
            spike_peak_base: 0.45,
            spike_peak_span: 0.2,
            spike_mean_base: 0.95,
            spike_mean_span: 0.15,
            refractory_min_ms: 0,
            refractory_max_ms: 0,
        }
    }

    pub fn voice() -> Self {
        Self {
            sensitivity_base: 0.05,
            sensitivity_span: 0.3,
            deviation_scale: 0.3,
            spike_recent: 5,
            spike_peak_base: 0.25,
            spike_peak_span: 0.1,
            spike_mean_base: 0.65,
            spike_mean_span: 0.15,
            refractory_min_ms: 200,
            refractory_max_ms: 800,
        }
    }

    /// Refractory interval for an event of the given intensity.
    pub fn refractory(&self, intensity: f32) -> Duration {
        let i = intensity.clamp(0.0, 1.0) as f64;
        let min = self.refractory_min_ms as f64;
        let max = self.refractory_max_ms.max(self.refractory_min_ms) as f64;
        Duration::from_micros(((min + (max - min) * (1.0 - i)) * 1000.0).round() as u64)
    }

    /// Apply the fields present in a config block on top of `base`.
    fn overlay<'de, D: Deserializer<'de>>(base: Self, deserializer: D) -> Result<Self, D::Error> {
        let overrides = serde_json::Map::<String, serde_json::Value>::deserialize(deserializer)?;
        let mut value = serde_json::to_value(base).map_err(D::Error::custom)?;
        if let serde_json::Value::Object(fields) = &mut value {
            fields.extend(overrides);
        }
        serde_json::from_value(value).map_err(D::Error::custom)
    }
}

impl Default for DetectorTuning {
    fn default() -> Self {
        Self::beat()
    }
}

fn beat_tuning<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DetectorTuning, D::Error> {
    DetectorTuning::overlay(DetectorTuning::beat(), deserializer)
}

fn sharp_tuning<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DetectorTuning, D::Error> {
    DetectorTuning::overlay(DetectorTuning::sharp(), deserializer)
}

fn voice_tuning<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DetectorTuning, D::Error> {
    DetectorTuning::overlay(DetectorTuning::voice(), deserializer)
}

/// Feature extraction parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub bands: BandLayout,
    pub rhythm_window: usize,
    pub voice_window: usize,
    pub sharp_window: usize,
    #[serde(deserialize_with = "beat_tuning")]
    pub beat: DetectorTuning,
    #[serde(deserialize_with = "sharp_tuning")]
    pub sharp: DetectorTuning,
    #[serde(deserialize_with = "voice_tuning")]
    pub voice: DetectorTuning,
    /// Voice counts as significant above `mean * voice_significant_ratio`
    pub voice_significant_ratio: f32,
    /// Voice counts as significant above this absolute energy
    pub voice_significant_floor: f32,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            bands: BandLayout::default(),
            rhythm_window: 20,
            voice_window: 20,
            sharp_window: 15,
            beat: DetectorTuning::beat(),
            sharp: DetectorTuning::sharp(),
            voice: DetectorTuning::voice(),
            voice_significant_ratio: 0.8,
            voice_significant_floor: 20.0,
        }
    }
}

/// Playback orchestration timings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    pub play_fade_in_ms: u64,
    pub pause_fade_out_ms: u64,
    pub seek_fade_out_ms: u64,
    pub seek_fade_in_ms: u64,
    pub auto_fade_out_ms: u64,
    /// Auto-advance starts this long before the end of a segment
    pub lookahead_ms: u64,
    /// Buffered fraction at which a segment counts as ready
    pub ready_threshold: f64,
    /// Segments prepared ahead of the active one
    pub preload_count: usize,
    pub volume_ramp_ms: u64,
    pub initial_volume: f32,
    pub volume_step: f32,
    pub nudge_seconds: f64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            play_fade_in_ms: 2500,
            pause_fade_out_ms: 600,
            seek_fade_out_ms: 300,
            seek_fade_in_ms: 400,
            auto_fade_out_ms: 2500,
            lookahead_ms: 3000,
            ready_threshold: 0.95,
            preload_count: 3,
            volume_ramp_ms: 200,
            initial_volume: 1.0,
            volume_step: 0.1,
            nudge_seconds: 5.0,
        }
    }
}

/// Wave lifecycle parameters shared by every synthesizer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthConfig {
    /// Lifetime of a zero-intensity wave
    pub base_duration_ms: u64,
    /// Lifetime of a full-intensity wave
    pub min_duration_ms: u64,
    /// Progress after which the lifetime fade begins
    pub lifetime_fade_start: f32,
    pub max_waves: usize,
    pub base_opacity: f32,
    pub min_intensity: f32,
    pub min_spawn_interval_ms: u64,
    pub reactive_fade_in_ms: u64,
    pub reactive_fade_out_ms: u64,
    /// Per-wave fade-in after creation (0 disables)
    pub wave_fade_in_ms: u64,
    pub cull_opacity: f32,
    pub color_refresh_ms: u64,
    pub color_step: f32,
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            base_duration_ms: 15_000,
            min_duration_ms: 12_000,
            lifetime_fade_start: 0.6,
            max_waves: 200,
            base_opacity: 0.5,
            min_intensity: 0.2,
            min_spawn_interval_ms: 300,
            reactive_fade_in_ms: 500,
            reactive_fade_out_ms: 1000,
            wave_fade_in_ms: 0,
            cull_opacity: 0.01,
            color_refresh_ms: 100,
            color_step: 0.03,
        }
    }
}

impl SynthConfig {
    /// Lifetime of a wave with the given intensity.
    pub fn lifetime(&self, intensity: f32) -> Duration {
        let base = self.base_duration_ms as f64;
        let min = self.min_duration_ms.min(self.base_duration_ms) as f64;
        let i = intensity.clamp(0.0, 1.0) as f64;
        Duration::from_micros(((base - i * (base - min)) * 1000.0).round() as u64)
    }
}

/// Border-square synthesizer parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BorderConfig {
    pub wave: SynthConfig,
    /// Scale beyond which squares fade as they approach the viewport edge
    pub size_fade_start: f32,
    /// Also spawn squares on sharp beats, which otherwise only advance the gallery
    pub spawn_on_sharp_beats: bool,
}

impl Default for BorderConfig {
    fn default() -> Self {
        Self {
            wave: SynthConfig::default(),
            size_fade_start: 0.7,
            spawn_on_sharp_beats: false,
        }
    }
}

/// Diagonal-line synthesizer parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagonalConfig {
    pub wave: SynthConfig,
    /// Seconds per full rotation at speed 1
    pub rotation_period_s: f32,
    /// Line length relative to the viewport diagonal
    pub length_factor: f32,
    /// Voice energy above which a voice event is considered significant
    pub significant_voice_energy: f32,
    /// Minimum intensity assigned to significant voice events
    pub significant_intensity: f32,
    pub bootstrap_lines: bool,
}

impl Default for DiagonalConfig {
    fn default() -> Self {
        Self {
            wave: SynthConfig {
                base_opacity: 1.0,
                min_intensity: 0.05,
                min_spawn_interval_ms: 100,
                max_waves: 50,
                wave_fade_in_ms: 500,
                ..SynthConfig::default()
            },
            rotation_period_s: 120.0,
            length_factor: 3.0,
            significant_voice_energy: 10.0,
            significant_intensity: 0.15,
            bootstrap_lines: true,
        }
    }
}

/// Device class used to pick gallery preload defaults
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlatformProfile {
    #[default]
    Desktop,
    Mobile,
    Ios,
}

/// Gallery sequencing parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GalleryConfig {
    pub profile: PlatformProfile,
    /// Overrides the profile's initial preload batch
    pub initial_preload: Option<usize>,
    /// Overrides the profile's concurrent load cap
    pub max_concurrent_loads: Option<usize>,
    /// Images requested after each served image
    pub preload_ahead: usize,
    /// Ready images needed before the gallery reports ready
    pub min_ready_images: usize,
}

impl Default for GalleryConfig {
    fn default() -> Self {
        Self {
            profile: PlatformProfile::Desktop,
            initial_preload: None,
            max_concurrent_loads: None,
            preload_ahead: 5,
            min_ready_images: 3,
        }
    }
}

impl GalleryConfig {
    pub fn initial_batch(&self) -> usize {
        self.initial_preload.unwrap_or(match self.profile {
            PlatformProfile::Desktop => 20,
            PlatformProfile::Mobile => 8,
            PlatformProfile::Ios => 5,
        })
    }

    pub fn concurrency_cap(&self) -> usize {
        self.max_concurrent_loads
            .unwrap_or(match self.profile {
                PlatformProfile::Desktop => 6,
                PlatformProfile::Mobile => 3,
                PlatformProfile::Ios => 2,
            })
            .max(1)
    }
}

/// Frame loop pacing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameConfig {
    pub frame_interval_ms: u64,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            frame_interval_ms: 16,
        }
    }
}

impl EngineConfig {
    /// Load configuration from JSON file
    ///
    /// # Arguments
    /// * `path` - Path to JSON config file
    ///
    /// # Returns
    /// The loaded configuration, or defaults if the file is missing or invalid
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    log::info!("[Config] Loaded configuration from {:?}", path.as_ref());
                    config
                }
                Err(err) => {
                    log::warn!(
                        "[Config] Failed to parse JSON from {:?}: {}. Using defaults.",
                        path.as_ref(),
                        err
                    );
                    Self::default()
                }
            },
            Err(err) => {
                log::warn!(
                    "[Config] Failed to read config file {:?}: {}. Using defaults.",
                    path.as_ref(),
                    err
                );
                Self::default()
            }
        }
    }
}
