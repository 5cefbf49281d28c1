// Error types for the reactive engine
//
// Structured error enums with stable numeric codes. None of these errors is
// fatal: callers log them and continue with the remaining resources.

mod gallery;
mod playback;

pub use gallery::{log_gallery_error, GalleryError, GalleryErrorCodes};
pub use playback::{log_playback_error, PlaybackError, PlaybackErrorCodes};

/// Error codes for structured error reporting
///
/// This trait provides a standard way to get error codes and messages
/// from custom error types so the CLI and event stream can report them
/// uniformly.
pub trait ErrorCode {
    /// Get the numeric error code
    fn code(&self) -> i32;

    /// Get the human-readable error message
    fn message(&self) -> String;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn describe(err: &dyn ErrorCode) -> (i32, String) {
        (err.code(), err.message())
    }

    #[test]
    fn test_error_code_ranges_do_not_overlap() {
        let playback = PlaybackError::NotLoaded;
        let gallery = GalleryError::EmptyGallery;

        let (p_code, _) = describe(&playback);
        let (g_code, _) = describe(&gallery);

        assert!((1001..=1010).contains(&p_code));
        assert!((2001..=2010).contains(&g_code));
    }

    #[test]
    fn test_errors_box_into_std_error() {
        let boxed: Box<dyn std::error::Error> = Box::new(PlaybackError::InvalidIndex {
            index: 4,
            len: 2,
        });
        assert!(boxed.to_string().contains("code 1001"));

        let boxed: Box<dyn std::error::Error> = Box::new(GalleryError::LoadFailed {
            url: "a.jpg".to_string(),
            reason: "404".to_string(),
        });
        assert!(boxed.to_string().contains("a.jpg"));
    }
}
