// Image loading primitives
//
// A loader turns an image URL into a handle the renderer can draw. Loads are
// futures so the sequencer can run many of them on the tokio runtime without
// ever blocking the frame loop.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;

use crate::error::GalleryError;

/// Decoded or raw image data ready for the renderer
#[derive(Debug, Clone, PartialEq)]
pub struct ImageHandle {
    pub url: String,
    pub bytes: Arc<[u8]>,
}

impl ImageHandle {
    pub fn new(url: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            url: url.into(),
            bytes: bytes.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

pub trait ImageLoader: Send + Sync {
    fn load(&self, url: &str) -> BoxFuture<'static, Result<ImageHandle, GalleryError>>;
}

/// Reads images from a directory with `tokio::fs`.
#[derive(Debug, Clone)]
pub struct FileImageLoader {
    root: PathBuf,
}

impl FileImageLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ImageLoader for FileImageLoader {
    fn load(&self, url: &str) -> BoxFuture<'static, Result<ImageHandle, GalleryError>> {
        let path = self.root.join(url);
        let url = url.to_string();
        async move {
            match tokio::fs::read(&path).await {
                Ok(bytes) => Ok(ImageHandle::new(url, bytes)),
                Err(err) => Err(GalleryError::LoadFailed {
                    url,
                    reason: format!("{}: {}", path.display(), err),
                }),
            }
        }
        .boxed()
    }
}

/// In-memory loader with optional latency and injected failures.
#[derive(Debug, Clone, Default)]
pub struct MemoryImageLoader {
    images: HashMap<String, Arc<[u8]>>,
    latency: Duration,
    /// Any URL without an entry loads as an empty image instead of failing
    permissive: bool,
}

impl MemoryImageLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loader that succeeds for every URL.
    pub fn permissive() -> Self {
        Self {
            permissive: true,
            ..Self::default()
        }
    }

    pub fn with_image(mut self, url: &str, bytes: &[u8]) -> Self {
        self.images.insert(url.to_string(), Arc::from(bytes));
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }
}

impl ImageLoader for MemoryImageLoader {
    fn load(&self, url: &str) -> BoxFuture<'static, Result<ImageHandle, GalleryError>> {
        let found = match self.images.get(url) {
            Some(bytes) => Some(Arc::clone(bytes)),
            None if self.permissive => Some(Arc::from(&[][..])),
            None => None,
        };
        let latency = self.latency;
        let url = url.to_string();
        async move {
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            found
                .map(|bytes| ImageHandle {
                    url: url.clone(),
                    bytes,
                })
                .ok_or(GalleryError::LoadFailed {
                    url,
                    reason: "not found".to_string(),
                })
        }
        .boxed()
    }
}
