// Audio output abstraction
//
// The orchestrator drives any backend through this trait: per-segment
// preparation, transport and gain. Readiness is polled once per frame; a
// backend buffers asynchronously and never blocks these calls.

use crate::error::PlaybackError;
use std::time::Duration;

/// Buffering state of one segment source
#[derive(Debug, Clone, PartialEq)]
pub enum SourceStatus {
    /// `prepare` has not been called for this segment
    Unprepared,
    /// Source is buffering or buffered; `duration` is known once metadata arrives
    Buffering { buffered: f64, duration: Option<f64> },
    /// Source could not be loaded or decoded
    Failed { reason: String },
}

impl SourceStatus {
    pub fn duration(&self) -> Option<f64> {
        match self {
            SourceStatus::Buffering { duration, .. } => *duration,
            _ => None,
        }
    }

    pub fn buffered(&self) -> f64 {
        match self {
            SourceStatus::Buffering { buffered, .. } => *buffered,
            _ => 0.0,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, SourceStatus::Failed { .. })
    }

    /// Ready once metadata is known and enough of the source is buffered.
    pub fn is_ready(&self, threshold: f64) -> bool {
        match self {
            SourceStatus::Buffering { buffered, duration } => {
                duration.is_some() && *buffered >= threshold.min(1.0)
            }
            _ => false,
        }
    }
}

/// Gain-controllable, segment-addressed audio output.
pub trait AudioOutput {
    /// Called once per frame before any other method.
    fn advance(&mut self, _now: Duration) {}

    /// Begin buffering `source` for `segment`; repeated calls are ignored.
    fn prepare(&mut self, segment: usize, source: &str);

    fn status(&self, segment: usize) -> SourceStatus;

    fn start(&mut self, segment: usize) -> Result<(), PlaybackError>;

    fn pause(&mut self, segment: usize);

    fn seek(&mut self, segment: usize, seconds: f64);

    /// Playback position within the segment, in seconds.
    fn position(&self, segment: usize) -> f64;

    fn set_gain(&mut self, segment: usize, gain: f32);

    fn gain(&self, segment: usize) -> f32;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_readiness_requires_duration_and_threshold() {
        let status = SourceStatus::Buffering {
            buffered: 0.97,
            duration: None,
        };
        assert!(!status.is_ready(0.95));

        let status = SourceStatus::Buffering {
            buffered: 0.97,
            duration: Some(30.0),
        };
        assert!(status.is_ready(0.95));
        assert!(!status.is_ready(0.99));
        assert_eq!(status.duration(), Some(30.0));

        assert!(!SourceStatus::Unprepared.is_ready(0.0));
        assert!(SourceStatus::Failed {
            reason: "gone".to_string()
        }
        .is_failed());
    }
}
