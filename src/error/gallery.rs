// Gallery error types and constants

use crate::error::ErrorCode;
use log::error;
use std::fmt;

/// Gallery error code constants
///
/// Error code range: 2001-2010
pub struct GalleryErrorCodes;

impl GalleryErrorCodes {
    /// Image failed to load
    pub const LOAD_FAILED: i32 = 2001;

    /// Image loads need a tokio runtime and none is running
    pub const NO_RUNTIME: i32 = 2002;

    /// Pool key is not part of the gallery
    pub const UNKNOWN_POOL: i32 = 2003;

    /// Gallery was built without any images
    pub const EMPTY_GALLERY: i32 = 2004;
}

/// Log a gallery error with structured context
pub fn log_gallery_error(err: &GalleryError, context: &str) {
    error!(
        "Gallery error in {}: code={}, component=Gallery, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Gallery-related errors
#[derive(Debug, Clone, PartialEq)]
pub enum GalleryError {
    /// Image failed to load
    LoadFailed { url: String, reason: String },

    /// Image loads need a tokio runtime and none is running
    NoRuntime,

    /// Pool key is not part of the gallery
    UnknownPool { key: String },

    /// Gallery was built without any images
    EmptyGallery,
}

impl ErrorCode for GalleryError {
    fn code(&self) -> i32 {
        match self {
            GalleryError::LoadFailed { .. } => GalleryErrorCodes::LOAD_FAILED,
            GalleryError::NoRuntime => GalleryErrorCodes::NO_RUNTIME,
            GalleryError::UnknownPool { .. } => GalleryErrorCodes::UNKNOWN_POOL,
            GalleryError::EmptyGallery => GalleryErrorCodes::EMPTY_GALLERY,
        }
    }

    fn message(&self) -> String {
        match self {
            GalleryError::LoadFailed { url, reason } => {
                format!("Failed to load image {}: {}", url, reason)
            }
            GalleryError::NoRuntime => {
                "No tokio runtime available for image loading".to_string()
            }
            GalleryError::UnknownPool { key } => format!("Unknown image pool '{}'", key),
            GalleryError::EmptyGallery => "Gallery has no images".to_string(),
        }
    }
}

impl fmt::Display for GalleryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "GalleryError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for GalleryError {}

impl From<std::io::Error> for GalleryError {
    fn from(err: std::io::Error) -> Self {
        GalleryError::LoadFailed {
            url: String::new(),
            reason: err.to_string(),
        }
    }
}
