// Playback module - multi-segment transport with ramped crossfades
//
// The orchestrator owns the playlist and the output backend. Every gain
// change goes through a GainRamp; a newer request kills the running ramp
// and restarts from the gain reached so far, so there is never a jump.

use serde::Serialize;
use tokio::sync::oneshot;

pub mod orchestrator;
pub mod output;
pub mod ramp;
pub mod simulated;

pub mod cpal_output;

pub use orchestrator::{AdvanceOutcome, PlaybackOrchestrator};
pub use output::{AudioOutput, SourceStatus};
pub use ramp::{Easing, GainRamp};
pub use simulated::SimulatedOutput;

pub use cpal_output::CpalOutput;

/// Transport phases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackPhase {
    Idle,
    Loading,
    Ready,
    Playing,
    Paused,
    Ended,
}

/// Notifications produced by the orchestrator during a frame
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlaybackEvent {
    PhaseChanged {
        from: PlaybackPhase,
        to: PlaybackPhase,
    },
    LoadingProgress {
        segment: usize,
        fraction: f64,
    },
    /// The single authoritative segment-change notification
    SegmentChanged {
        previous: Option<usize>,
        current: usize,
        automatic: bool,
    },
    SegmentEnded {
        index: usize,
        next: Option<usize>,
        is_last: bool,
    },
    SourceFailed {
        segment: usize,
        reason: String,
    },
    AllComplete,
}

/// How a fade request ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FadeOutcome {
    Completed,
    /// A newer request killed the ramp before it finished
    Superseded,
}

/// Awaitable completion of a play/pause ramp.
#[derive(Debug)]
pub struct FadeCompletion {
    rx: Option<oneshot::Receiver<()>>,
}

impl FadeCompletion {
    pub(crate) fn pending() -> (oneshot::Sender<()>, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, Self { rx: Some(rx) })
    }

    /// Completion for a request that needed no ramp.
    pub fn completed() -> Self {
        Self { rx: None }
    }

    pub async fn wait(self) -> FadeOutcome {
        match self.rx {
            None => FadeOutcome::Completed,
            Some(rx) => match rx.await {
                Ok(()) => FadeOutcome::Completed,
                Err(_) => FadeOutcome::Superseded,
            },
        }
    }

    /// Non-blocking check; `None` while the ramp is still running.
    pub fn try_outcome(&mut self) -> Option<FadeOutcome> {
        let Some(rx) = self.rx.as_mut() else {
            return Some(FadeOutcome::Completed);
        };
        match rx.try_recv() {
            Ok(()) => Some(FadeOutcome::Completed),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(FadeOutcome::Superseded),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fade_completion_outcomes() {
        assert_eq!(FadeCompletion::completed().wait().await, FadeOutcome::Completed);

        let (tx, completion) = FadeCompletion::pending();
        tx.send(()).unwrap();
        assert_eq!(completion.wait().await, FadeOutcome::Completed);

        let (tx, completion) = FadeCompletion::pending();
        drop(tx);
        assert_eq!(completion.wait().await, FadeOutcome::Superseded);
    }

    #[test]
    fn test_try_outcome_while_pending() {
        let (tx, mut completion) = FadeCompletion::pending();
        assert_eq!(completion.try_outcome(), None);
        tx.send(()).unwrap();
        assert_eq!(completion.try_outcome(), Some(FadeOutcome::Completed));
    }

    #[test]
    fn test_event_serialization() {
        let event = PlaybackEvent::SegmentChanged {
            previous: Some(0),
            current: 1,
            automatic: true,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "segment_changed");
        assert_eq!(json["current"], 1);
    }
}
