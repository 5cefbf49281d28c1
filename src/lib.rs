// Pulse Canvas Core - audio-reactive visual engine
// Spectrum analysis, crossfading playback, procedural visuals and an image
// gallery kept in step with the playing segment

// Module declarations
pub mod analysis;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod gallery;
pub mod manifest;
pub mod playback;
pub mod synth;
pub mod testing;

// Re-exports for convenience
pub use config::EngineConfig;
pub use engine::{Engine, Frame, ManualTimeSource, SystemTimeSource, TimeSource};
pub use events::EventBus;
pub use manifest::TrackManifest;

use tracing_subscriber::filter::LevelFilter;

/// Install the global fmt subscriber.
///
/// Only the first call has any effect; `log` records are bridged through
/// `tracing`.
pub fn init_logging(level: LevelFilter) {
    if tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .try_init()
        .is_ok()
    {
        tracing::debug!("[Logging] Initialized at {}", level);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_is_idempotent() {
        init_logging(LevelFilter::WARN);
        init_logging(LevelFilter::DEBUG);
    }
}
