// SimulatedOutput - deterministic backend for tests and the CLI
//
// Positions advance with the engine timeline passed to `advance`; buffering
// progresses linearly over a configurable latency. No audio is produced.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use super::output::{AudioOutput, SourceStatus};
use crate::error::PlaybackError;

#[derive(Debug, Clone)]
struct SimulatedTrack {
    duration: f64,
    prepared_at: Duration,
    position: f64,
    playing: bool,
    gain: f32,
}

#[derive(Debug, Default)]
pub struct SimulatedOutput {
    catalog: HashMap<String, f64>,
    failing: HashSet<String>,
    load_latency: Duration,
    tracks: HashMap<usize, SimulatedTrack>,
    failed: HashMap<usize, String>,
    now: Duration,
}

impl SimulatedOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a source with its duration in seconds.
    pub fn with_source(mut self, source: &str, duration: f64) -> Self {
        self.catalog.insert(source.to_string(), duration.max(0.0));
        self
    }

    pub fn with_failing_source(mut self, source: &str) -> Self {
        self.failing.insert(source.to_string());
        self
    }

    /// Time a source takes to buffer completely.
    pub fn with_load_latency(mut self, latency: Duration) -> Self {
        self.load_latency = latency;
        self
    }

    pub fn is_playing(&self, segment: usize) -> bool {
        self.tracks.get(&segment).map(|t| t.playing).unwrap_or(false)
    }

    fn buffered(&self, track: &SimulatedTrack) -> f64 {
        if self.load_latency.is_zero() {
            return 1.0;
        }
        let elapsed = self.now.saturating_sub(track.prepared_at).as_secs_f64();
        (elapsed / self.load_latency.as_secs_f64()).min(1.0)
    }
}

impl AudioOutput for SimulatedOutput {
    fn advance(&mut self, now: Duration) {
        let delta = now.saturating_sub(self.now).as_secs_f64();
        self.now = now;
        for track in self.tracks.values_mut() {
            if track.playing {
                track.position = (track.position + delta).min(track.duration);
            }
        }
    }

    fn prepare(&mut self, segment: usize, source: &str) {
        if self.tracks.contains_key(&segment) || self.failed.contains_key(&segment) {
            return;
        }
        if self.failing.contains(source) {
            self.failed
                .insert(segment, format!("source {} failed to decode", source));
            return;
        }
        match self.catalog.get(source) {
            Some(&duration) => {
                self.tracks.insert(
                    segment,
                    SimulatedTrack {
                        duration,
                        prepared_at: self.now,
                        position: 0.0,
                        playing: false,
                        gain: 0.0,
                    },
                );
            }
            None => {
                self.failed
                    .insert(segment, format!("unknown source {}", source));
            }
        }
    }

    fn status(&self, segment: usize) -> SourceStatus {
        if let Some(reason) = self.failed.get(&segment) {
            return SourceStatus::Failed {
                reason: reason.clone(),
            };
        }
        match self.tracks.get(&segment) {
            Some(track) => SourceStatus::Buffering {
                buffered: self.buffered(track),
                duration: Some(track.duration),
            },
            None => SourceStatus::Unprepared,
        }
    }

    fn start(&mut self, segment: usize) -> Result<(), PlaybackError> {
        if let Some(reason) = self.failed.get(&segment) {
            return Err(PlaybackError::SourceUnavailable {
                segment,
                reason: reason.clone(),
            });
        }
        let track = self
            .tracks
            .get_mut(&segment)
            .ok_or_else(|| PlaybackError::SourceUnavailable {
                segment,
                reason: "not prepared".to_string(),
            })?;
        track.playing = true;
        Ok(())
    }

    fn pause(&mut self, segment: usize) {
        if let Some(track) = self.tracks.get_mut(&segment) {
            track.playing = false;
        }
    }

    fn seek(&mut self, segment: usize, seconds: f64) {
        if let Some(track) = self.tracks.get_mut(&segment) {
            track.position = seconds.clamp(0.0, track.duration);
        }
    }

    fn position(&self, segment: usize) -> f64 {
        self.tracks.get(&segment).map(|t| t.position).unwrap_or(0.0)
    }

    fn set_gain(&mut self, segment: usize, gain: f32) {
        if let Some(track) = self.tracks.get_mut(&segment) {
            track.gain = gain.clamp(0.0, 1.0);
        }
    }

    fn gain(&self, segment: usize) -> f32 {
        self.tracks.get(&segment).map(|t| t.gain).unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_and_failing_sources() {
        let mut output = SimulatedOutput::new()
            .with_source("a.wav", 10.0)
            .with_failing_source("b.wav");
        output.prepare(0, "a.wav");
        output.prepare(1, "b.wav");
        output.prepare(2, "c.wav");

        assert!(output.status(0).is_ready(0.95));
        assert!(output.status(1).is_failed());
        assert!(output.status(2).is_failed());
        assert_eq!(output.status(3), SourceStatus::Unprepared);
        assert!(output.start(1).is_err());
    }

    #[test]
    fn test_buffering_follows_latency() {
        let mut output = SimulatedOutput::new()
            .with_source("a.wav", 10.0)
            .with_load_latency(Duration::from_secs(2));
        output.prepare(0, "a.wav");
        assert_eq!(output.status(0).buffered(), 0.0);
        output.advance(Duration::from_secs(1));
        assert!((output.status(0).buffered() - 0.5).abs() < 1e-9);
        output.advance(Duration::from_secs(3));
        assert!(output.status(0).is_ready(0.95));
    }

    #[test]
    fn test_position_advances_only_while_playing() {
        let mut output = SimulatedOutput::new().with_source("a.wav", 5.0);
        output.prepare(0, "a.wav");
        output.advance(Duration::from_secs(1));
        assert_eq!(output.position(0), 0.0);

        output.start(0).unwrap();
        output.advance(Duration::from_secs(3));
        assert!((output.position(0) - 2.0).abs() < 1e-9);

        output.pause(0);
        output.advance(Duration::from_secs(4));
        assert!((output.position(0) - 2.0).abs() < 1e-9);

        output.start(0).unwrap();
        output.advance(Duration::from_secs(20));
        assert_eq!(output.position(0), 5.0);
    }
}
