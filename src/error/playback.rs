// Playback error types and constants

use crate::error::ErrorCode;
use crate::playback::PlaybackPhase;
use log::error;
use std::fmt;

/// Playback error code constants
///
/// Error code range: 1001-1010
pub struct PlaybackErrorCodes;

impl PlaybackErrorCodes {
    /// Requested segment index is outside the playlist
    pub const INVALID_INDEX: i32 = 1001;

    /// No playlist has been loaded yet
    pub const NOT_LOADED: i32 = 1002;

    /// Operation is not valid in the current phase
    pub const INVALID_STATE: i32 = 1003;

    /// Playlist has no segments
    pub const EMPTY_PLAYLIST: i32 = 1004;

    /// Segment source failed to load or decode
    pub const SOURCE_UNAVAILABLE: i32 = 1005;

    /// Failed to open the output stream
    pub const STREAM_OPEN_FAILED: i32 = 1006;

    /// Output device reported an error
    pub const HARDWARE_ERROR: i32 = 1007;

    /// Mutex shared with the output callback was poisoned
    pub const MIXER_FULL: i32 = 1008;
}

/// Log a playback error with structured context
pub fn log_playback_error(err: &PlaybackError, context: &str) {
    error!(
        "Playback error in {}: code={}, component=Playback, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Playback-related errors
///
/// Error code range: 1001-1010
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackError {
    /// Requested segment index is outside the playlist
    InvalidIndex { index: usize, len: usize },

    /// No playlist has been loaded yet
    NotLoaded,

    /// Operation is not valid in the current phase
    InvalidState {
        operation: &'static str,
        phase: PlaybackPhase,
    },

    /// Playlist has no segments
    EmptyPlaylist,

    /// Segment source failed to load or decode
    SourceUnavailable { segment: usize, reason: String },

    /// Failed to open the output stream
    StreamOpenFailed { reason: String },

    /// Output device reported an error
    HardwareError { details: String },

    /// The output callback has not picked up earlier sources yet
    MixerFull { capacity: usize },
}

impl ErrorCode for PlaybackError {
    fn code(&self) -> i32 {
        match self {
            PlaybackError::InvalidIndex { .. } => PlaybackErrorCodes::INVALID_INDEX,
            PlaybackError::NotLoaded => PlaybackErrorCodes::NOT_LOADED,
            PlaybackError::InvalidState { .. } => PlaybackErrorCodes::INVALID_STATE,
            PlaybackError::EmptyPlaylist => PlaybackErrorCodes::EMPTY_PLAYLIST,
            PlaybackError::SourceUnavailable { .. } => PlaybackErrorCodes::SOURCE_UNAVAILABLE,
            PlaybackError::StreamOpenFailed { .. } => PlaybackErrorCodes::STREAM_OPEN_FAILED,
            PlaybackError::HardwareError { .. } => PlaybackErrorCodes::HARDWARE_ERROR,
            PlaybackError::MixerFull { .. } => PlaybackErrorCodes::MIXER_FULL,
        }
    }

    fn message(&self) -> String {
        match self {
            PlaybackError::InvalidIndex { index, len } => {
                format!("Segment index {} out of range (playlist has {})", index, len)
            }
            PlaybackError::NotLoaded => "No playlist loaded. Call load() first.".to_string(),
            PlaybackError::InvalidState { operation, phase } => {
                format!("Cannot {} while {:?}", operation, phase)
            }
            PlaybackError::EmptyPlaylist => "Playlist contains no segments".to_string(),
            PlaybackError::SourceUnavailable { segment, reason } => {
                format!("Segment {} source unavailable: {}", segment, reason)
            }
            PlaybackError::StreamOpenFailed { reason } => {
                format!("Failed to open output stream: {}", reason)
            }
            PlaybackError::HardwareError { details } => {
                format!("Hardware error: {}", details)
            }
            PlaybackError::MixerFull { capacity } => {
                format!("Mixer registration queue full ({} pending)", capacity)
            }
        }
    }
}

impl fmt::Display for PlaybackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PlaybackError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for PlaybackError {}

impl From<std::io::Error> for PlaybackError {
    fn from(err: std::io::Error) -> Self {
        PlaybackError::HardwareError {
            details: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_playback_error_codes() {
        assert_eq!(
            PlaybackError::InvalidIndex { index: 3, len: 2 }.code(),
            PlaybackErrorCodes::INVALID_INDEX
        );
        assert_eq!(PlaybackError::NotLoaded.code(), PlaybackErrorCodes::NOT_LOADED);
        assert_eq!(
            PlaybackError::InvalidState {
                operation: "play",
                phase: PlaybackPhase::Idle
            }
            .code(),
            PlaybackErrorCodes::INVALID_STATE
        );
        assert_eq!(
            PlaybackError::EmptyPlaylist.code(),
            PlaybackErrorCodes::EMPTY_PLAYLIST
        );
        assert_eq!(
            PlaybackError::MixerFull { capacity: 64 }.code(),
            PlaybackErrorCodes::MIXER_FULL
        );
    }

    #[test]
    fn test_playback_error_messages() {
        let err = PlaybackError::InvalidIndex { index: 7, len: 2 };
        assert_eq!(err.message(), "Segment index 7 out of range (playlist has 2)");

        let err = PlaybackError::InvalidState {
            operation: "pause",
            phase: PlaybackPhase::Ready,
        };
        assert_eq!(err.message(), "Cannot pause while Ready");
    }

    #[test]
    fn test_display_includes_code() {
        let err = PlaybackError::SourceUnavailable {
            segment: 1,
            reason: "missing file".to_string(),
        };
        let display = format!("{}", err);
        assert!(display.contains("PlaybackError::"));
        assert!(display.contains("code 1005"));
        assert!(display.contains("missing file"));
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::Other, "device gone");
        let err: PlaybackError = io_err.into();
        assert_eq!(err.code(), PlaybackErrorCodes::HARDWARE_ERROR);
    }
}
