// Gallery module - image sequencing in lockstep with playback
//
// Images are grouped into pools; the pool shown depends on the active
// segment. Each pool is a circular cursor that reuses images rather than
// waiting on slow loads, and reports completion once per visit so playback
// can move on to a segment with fresh images.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;

use crate::config::GalleryConfig;
use crate::error::{log_gallery_error, GalleryError};
use crate::manifest::{ImageRef, PoolKey, PoolLayout, TrackManifest};

pub mod loader;
pub mod pool;

pub use loader::{FileImageLoader, ImageHandle, ImageLoader, MemoryImageLoader};
pub use pool::{ImagePool, ImageState};

/// Notifications produced by the gallery
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GallerySignal {
    /// Every image of this pool has been shown during the current visit
    PoolComplete { pool: PoolKey },
    /// A pool completed and no later segment shows a different one
    AllComplete,
    /// Fraction of images that finished loading (successfully or not)
    LoadingProgress { fraction: f32 },
    /// Enough images are loaded to start showing them
    Ready,
    ImageFailed { url: String, reason: String },
}

type LoadResult = (usize, Result<ImageHandle, GalleryError>);

pub struct GallerySequencer {
    config: GalleryConfig,
    images: Vec<ImageRef>,
    states: Vec<ImageState>,
    handles: Vec<Option<ImageHandle>>,
    by_url: HashMap<String, usize>,
    pools: Vec<ImagePool>,
    pool_index: HashMap<PoolKey, usize>,
    layout: PoolLayout,
    seek_hints: BTreeMap<usize, f64>,
    loader: Arc<dyn ImageLoader>,
    completions_tx: mpsc::UnboundedSender<LoadResult>,
    completions_rx: mpsc::UnboundedReceiver<LoadResult>,
    in_flight: usize,
    queued: VecDeque<usize>,
    current_segment: Option<usize>,
    active_pool: Option<usize>,
    /// Pool whose cursor was placed by a seek and must survive the next visit start
    seeked_pool: Option<usize>,
    completed: HashSet<PoolKey>,
    all_complete_sent: bool,
    ready_sent: bool,
    reported_progress: f32,
    runtime_warned: bool,
    signals: Vec<GallerySignal>,
}

impl GallerySequencer {
    pub fn new(
        manifest: &TrackManifest,
        config: GalleryConfig,
        loader: Arc<dyn ImageLoader>,
    ) -> Result<Self, GalleryError> {
        let images = manifest.images();
        if images.is_empty() {
            return Err(GalleryError::EmptyGallery);
        }
        let layout = manifest.layout();

        let mut pools = Vec::with_capacity(layout.order().len());
        let mut pool_index = HashMap::new();
        for key in layout.order() {
            let members: Vec<usize> = images
                .iter()
                .enumerate()
                .filter(|(_, image)| &image.pool == key)
                .map(|(i, _)| i)
                .collect();
            pool_index.insert(key.clone(), pools.len());
            pools.push(ImagePool::new(key.clone(), members));
        }

        let by_url = images
            .iter()
            .enumerate()
            .map(|(i, image)| (image.url.clone(), i))
            .collect();
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();

        tracing::info!(
            "[Gallery] {} images in {} pools",
            images.len(),
            pools.len()
        );

        Ok(Self {
            config,
            states: vec![ImageState::Pending; images.len()],
            handles: vec![None; images.len()],
            images,
            by_url,
            pools,
            pool_index,
            layout,
            seek_hints: manifest.seek_time_hints.clone(),
            loader,
            completions_tx,
            completions_rx,
            in_flight: 0,
            queued: VecDeque::new(),
            current_segment: None,
            active_pool: None,
            seeked_pool: None,
            completed: HashSet::new(),
            all_complete_sent: false,
            ready_sent: false,
            reported_progress: -1.0,
            runtime_warned: false,
            signals: Vec::new(),
        })
    }

    // ========================================================================
    // QUERIES
    // ========================================================================

    pub fn images(&self) -> &[ImageRef] {
        &self.images
    }

    pub fn state(&self, index: usize) -> Option<ImageState> {
        self.states.get(index).copied()
    }

    pub fn handle(&self, url: &str) -> Option<&ImageHandle> {
        self.by_url
            .get(url)
            .and_then(|&i| self.handles[i].as_ref())
    }

    pub fn pool(&self, key: &str) -> Result<&ImagePool, GalleryError> {
        self.pool_index
            .get(key)
            .map(|&i| &self.pools[i])
            .ok_or_else(|| GalleryError::UnknownPool {
                key: key.to_string(),
            })
    }

    pub fn active_pool(&self) -> Option<&str> {
        self.active_pool.map(|i| self.pools[i].key())
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// Settled images over total.
    pub fn progress(&self) -> f32 {
        let settled = self.states.iter().filter(|s| s.is_settled()).count();
        settled as f32 / self.images.len() as f32
    }

    pub fn ready_count(&self) -> usize {
        self.states.iter().filter(|s| s.is_loaded()).count()
    }

    pub fn is_ready(&self) -> bool {
        self.ready_sent
    }

    pub fn drain_signals(&mut self) -> Vec<GallerySignal> {
        std::mem::take(&mut self.signals)
    }

    // ========================================================================
    // LOADING
    // ========================================================================

    /// Kick off the initial preload batch.
    pub fn start(&mut self) {
        let batch = self.config.initial_batch().min(self.images.len());
        tracing::info!("[Gallery] Initial preload of {} images", batch);
        for index in 0..batch {
            self.request_load(index);
        }
    }

    /// Begin loading the next `count` pending images of the active pool.
    pub fn preload_next(&mut self, count: usize) {
        let Some(active) = self.active_pool else {
            return;
        };
        for index in self.pools[active].upcoming_pending(count, &self.states) {
            self.request_load(index);
        }
    }

    fn request_load(&mut self, index: usize) {
        if self.states[index] != ImageState::Pending || self.queued.contains(&index) {
            return;
        }
        if self.in_flight >= self.config.concurrency_cap() {
            self.queued.push_back(index);
            return;
        }
        self.spawn_load(index);
    }

    fn spawn_load(&mut self, index: usize) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            if !self.runtime_warned {
                self.runtime_warned = true;
                log_gallery_error(&GalleryError::NoRuntime, "spawn_load");
            }
            return;
        };

        self.states[index] = ImageState::Loading;
        self.in_flight += 1;
        let future = self.loader.load(&self.images[index].url);
        let tx = self.completions_tx.clone();
        runtime.spawn(async move {
            let result = future.await;
            let _ = tx.send((index, result));
        });
    }

    /// Apply finished loads. Call once per frame.
    pub fn poll_loads(&mut self) -> usize {
        let mut applied = 0;
        while let Ok((index, result)) = self.completions_rx.try_recv() {
            self.apply_load(index, result);
            applied += 1;
        }
        if applied > 0 {
            self.after_loads();
        }
        applied
    }

    /// Wait until no load is in flight or queued.
    pub async fn settle(&mut self) {
        while self.in_flight > 0 {
            match self.completions_rx.recv().await {
                Some((index, result)) => self.apply_load(index, result),
                None => break,
            }
            self.after_loads();
        }
    }

    fn apply_load(&mut self, index: usize, result: Result<ImageHandle, GalleryError>) {
        self.in_flight = self.in_flight.saturating_sub(1);
        match result {
            Ok(handle) => {
                tracing::trace!("[Gallery] Loaded {}", handle.url);
                self.handles[index] = Some(handle);
                self.states[index] = ImageState::Ready;
            }
            Err(err) => {
                tracing::warn!("[Gallery] {}", err);
                self.states[index] = ImageState::Error;
                let reason = match &err {
                    GalleryError::LoadFailed { reason, .. } => reason.clone(),
                    other => other.to_string(),
                };
                self.signals.push(GallerySignal::ImageFailed {
                    url: self.images[index].url.clone(),
                    reason,
                });
                let pool = &self.images[index].pool;
                if let Some(&pool) = self.pool_index.get(pool) {
                    if Some(pool) == self.active_pool {
                        self.check_completion(pool);
                    }
                }
            }
        }
    }

    fn after_loads(&mut self) {
        while self.in_flight < self.config.concurrency_cap() {
            let Some(next) = self.queued.pop_front() else {
                break;
            };
            if self.states[next] == ImageState::Pending {
                self.spawn_load(next);
            }
        }

        let progress = self.progress();
        if (progress - self.reported_progress).abs() > f32::EPSILON {
            self.reported_progress = progress;
            self.signals.push(GallerySignal::LoadingProgress { fraction: progress });
        }

        let needed = self.config.min_ready_images.min(self.images.len());
        if !self.ready_sent && (self.ready_count() >= needed || progress >= 1.0) {
            self.ready_sent = true;
            tracing::info!("[Gallery] Ready with {} images loaded", self.ready_count());
            self.signals.push(GallerySignal::Ready);
        }
    }

    // ========================================================================
    // SEQUENCING
    // ========================================================================

    /// Switch to the pool of `segment`. Re-entering a pool starts a new visit.
    pub fn on_segment_changed(&mut self, segment: usize) {
        if self.current_segment == Some(segment) {
            return;
        }
        if self.current_segment.is_some_and(|previous| segment < previous) {
            self.all_complete_sent = false;
        }
        self.current_segment = Some(segment);

        let Some(key) = self.layout.active_pool(segment).cloned() else {
            tracing::debug!("[Gallery] Segment {} has no pool, keeping current", segment);
            return;
        };
        let Some(&index) = self.pool_index.get(&key) else {
            return;
        };
        if self.active_pool == Some(index) {
            return;
        }

        self.active_pool = Some(index);
        self.completed.remove(&key);
        if self.seeked_pool.take() == Some(index) {
            tracing::info!("[Gallery] Segment {} -> pool '{}' at seek position", segment, key);
        } else {
            self.pools[index].begin_visit(&mut self.states);
            tracing::info!("[Gallery] Segment {} -> pool '{}'", segment, key);
        }
        self.preload_next(self.config.preload_ahead);
    }

    /// Next image to show, or `None` when nothing in the active pool is loaded.
    /// The image counts toward completion of the pool's visit.
    pub fn next_image(&mut self) -> Option<ImageRef> {
        let active = self.active_pool?;
        let index = self.pools[active].select(&mut self.states)?;
        self.check_completion(active);
        Some(self.images[index].clone())
    }

    /// Image `next_image` would serve, without serving it.
    pub fn preview_image(&self) -> Option<ImageRef> {
        let active = self.active_pool?;
        let index = self.pools[active].peek(&self.states)?;
        Some(self.images[index].clone())
    }

    fn check_completion(&mut self, pool: usize) {
        if !self.pools[pool].is_complete(&self.states) {
            return;
        }
        let key = self.pools[pool].key().to_string();
        if !self.completed.insert(key.clone()) {
            return;
        }
        let segment = self.current_segment.unwrap_or(0);
        match self.layout.next_segment_after(segment, &key) {
            Some(next) => {
                tracing::info!("[Gallery] Pool '{}' complete, segment {} is next", key, next);
                self.signals.push(GallerySignal::PoolComplete { pool: key });
            }
            None => {
                if !self.all_complete_sent {
                    self.all_complete_sent = true;
                    tracing::info!("[Gallery] Final pool '{}' complete", key);
                    self.signals.push(GallerySignal::AllComplete);
                }
            }
        }
    }

    /// Place the cursor of the pool holding the image closest to `seconds`.
    pub fn seek_to_time(&mut self, seconds: f64) -> Option<ImageRef> {
        let (&image, _) = self
            .seek_hints
            .iter()
            .filter(|(i, _)| **i < self.images.len())
            .fold(None::<(&usize, f64)>, |best, (i, &t)| {
                let diff = (t - seconds).abs();
                match best {
                    Some((_, d)) if d <= diff => best,
                    _ => Some((i, diff)),
                }
            })?;

        let pool = *self.pool_index.get(&self.images[image].pool)?;
        let position = self.pools[pool].position_of(image)?;
        self.pools[pool].seek(position, &mut self.states);
        self.completed.remove(self.pools[pool].key());
        self.all_complete_sent = false;
        if self.active_pool != Some(pool) {
            self.seeked_pool = Some(pool);
        }
        tracing::info!(
            "[Gallery] Seek to {:.2}s -> '{}' position {}",
            seconds,
            self.pools[pool].key(),
            position
        );
        Some(self.images[image].clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PlatformProfile;
    use crate::manifest::Segment;
    use crate::testing::FixtureManifest;

    fn manifest() -> TrackManifest {
        let mut images_by_pool = BTreeMap::new();
        images_by_pool.insert("day".to_string(), vec!["d0".into(), "d1".into(), "d2".into()]);
        images_by_pool.insert("night".to_string(), vec!["n0".into(), "n1".into()]);
        let mut seek_time_hints = BTreeMap::new();
        for (i, t) in [0.0, 10.0, 20.0, 30.0, 40.0].iter().enumerate() {
            seek_time_hints.insert(i, *t);
        }
        TrackManifest {
            segments: vec![
                Segment::new(0, "a.wav").with_subgroup("day"),
                Segment::new(1, "b.wav").with_subgroup("night"),
            ],
            images_by_pool,
            seek_time_hints,
        }
    }

    async fn loaded(loader: MemoryImageLoader) -> GallerySequencer {
        loaded_from(&manifest(), loader).await
    }

    async fn loaded_from(manifest: &TrackManifest, loader: MemoryImageLoader) -> GallerySequencer {
        let mut gallery =
            GallerySequencer::new(manifest, GalleryConfig::default(), Arc::new(loader)).unwrap();
        gallery.start();
        gallery.settle().await;
        gallery.drain_signals();
        gallery
    }

    fn served(gallery: &mut GallerySequencer, count: usize) -> Vec<String> {
        (0..count).filter_map(|_| gallery.next_image()).map(|i| i.url).collect()
    }

    #[test]
    fn test_empty_gallery_rejected() {
        let result = GallerySequencer::new(
            &TrackManifest::default(),
            GalleryConfig::default(),
            Arc::new(MemoryImageLoader::permissive()),
        );
        assert!(matches!(result, Err(GalleryError::EmptyGallery)));
    }

    #[test]
    fn test_without_runtime_loads_stay_pending() {
        let mut gallery = GallerySequencer::new(
            &manifest(),
            GalleryConfig::default(),
            Arc::new(MemoryImageLoader::permissive()),
        )
        .unwrap();
        gallery.start();
        assert_eq!(gallery.in_flight(), 0);
        assert_eq!(gallery.state(0), Some(ImageState::Pending));
        gallery.on_segment_changed(0);
        assert_eq!(gallery.next_image(), None);
    }

    #[tokio::test]
    async fn test_start_reports_progress_and_ready() {
        let mut gallery =
            GallerySequencer::new(&manifest(), GalleryConfig::default(), Arc::new(MemoryImageLoader::permissive()))
                .unwrap();
        gallery.start();
        gallery.settle().await;
        let signals = gallery.drain_signals();
        assert!(signals.contains(&GallerySignal::Ready));
        assert!(signals.contains(&GallerySignal::LoadingProgress { fraction: 1.0 }));
    }

    #[tokio::test]
    async fn test_serves_active_pool_in_order() {
        let mut gallery = loaded(MemoryImageLoader::permissive()).await;

        gallery.on_segment_changed(0);
        assert_eq!(gallery.active_pool(), Some("day"));
        let urls: Vec<String> = (0..6).filter_map(|_| gallery.next_image()).map(|i| i.url).collect();
        assert_eq!(urls, vec!["d0", "d1", "d2", "d0", "d1", "d2"]);

        let signals = gallery.drain_signals();
        assert_eq!(
            signals,
            vec![GallerySignal::PoolComplete {
                pool: "day".to_string()
            }]
        );
    }

    #[tokio::test]
    async fn test_final_pool_signals_all_complete() {
        let mut gallery = loaded(MemoryImageLoader::permissive()).await;
        gallery.drain_signals();
        gallery.on_segment_changed(1);
        gallery.next_image();
        gallery.next_image();
        assert_eq!(gallery.drain_signals(), vec![GallerySignal::AllComplete]);
    }

    #[tokio::test]
    async fn test_revisit_fires_again() {
        let mut gallery = loaded(MemoryImageLoader::permissive()).await;
        gallery.on_segment_changed(0);
        for _ in 0..3 {
            gallery.next_image();
        }
        gallery.on_segment_changed(1);
        gallery.on_segment_changed(0);
        gallery.drain_signals();
        assert_eq!(gallery.next_image().map(|i| i.url), Some("d0".to_string()));
        gallery.next_image();
        gallery.next_image();
        assert_eq!(
            gallery.drain_signals(),
            vec![GallerySignal::PoolComplete {
                pool: "day".to_string()
            }]
        );
    }

    #[tokio::test]
    async fn test_failed_images_are_skipped() {
        let loader = MemoryImageLoader::new()
            .with_image("d0", b"0")
            .with_image("d2", b"2")
            .with_image("n0", b"0")
            .with_image("n1", b"1");
        let mut gallery = GallerySequencer::new(&manifest(), GalleryConfig::default(), Arc::new(loader)).unwrap();
        gallery.start();
        gallery.settle().await;
        let signals = gallery.drain_signals();
        assert!(signals
            .iter()
            .any(|s| matches!(s, GallerySignal::ImageFailed { url, .. } if url == "d1")));
        assert_eq!(gallery.state(1), Some(ImageState::Error));

        gallery.on_segment_changed(0);
        assert_eq!(gallery.next_image().map(|i| i.url), Some("d0".to_string()));
        assert_eq!(gallery.next_image().map(|i| i.url), Some("d2".to_string()));
        assert!(gallery
            .drain_signals()
            .contains(&GallerySignal::PoolComplete {
                pool: "day".to_string()
            }));
    }

    #[tokio::test]
    async fn test_concurrency_cap_queues_loads() {
        let config = GalleryConfig {
            profile: PlatformProfile::Ios,
            ..GalleryConfig::default()
        };
        let mut gallery =
            GallerySequencer::new(&manifest(), config, Arc::new(MemoryImageLoader::permissive())).unwrap();
        gallery.start();
        assert_eq!(gallery.in_flight(), 2);
        gallery.settle().await;
        assert_eq!(gallery.progress(), 1.0);
    }

    #[tokio::test]
    async fn test_seek_positions_other_pool_for_next_visit() {
        let mut gallery = loaded(MemoryImageLoader::permissive()).await;
        gallery.on_segment_changed(0);
        gallery.next_image();

        // image 4 is n1, the second image of the night pool
        let target = gallery.seek_to_time(38.0).unwrap();
        assert_eq!(target.url, "n1");
        gallery.on_segment_changed(1);
        assert_eq!(gallery.next_image().map(|i| i.url), Some("n1".to_string()));
    }

    #[tokio::test]
    async fn test_seek_back_within_active_pool() {
        let mut gallery = loaded(MemoryImageLoader::permissive()).await;
        gallery.on_segment_changed(0);
        gallery.next_image();
        gallery.next_image();
        assert_eq!(gallery.pool("day").unwrap().cursor(), 2);
        gallery.drain_signals();

        gallery.seek_to_time(11.0);
        assert_eq!(gallery.pool("day").unwrap().cursor(), 1);
        assert_eq!(gallery.state(1), Some(ImageState::Ready));
        assert_eq!(gallery.next_image().map(|i| i.url), Some("d1".to_string()));
        assert!(gallery.drain_signals().is_empty());
        gallery.next_image();
        // d0 stays served from before the seek
        assert_eq!(
            gallery.drain_signals(),
            vec![GallerySignal::PoolComplete {
                pool: "day".to_string()
            }]
        );
        assert!(gallery.pool("missing").is_err());
    }

    #[tokio::test]
    async fn test_root_pool_does_not_hide_listed_subgroup() {
        let manifest = FixtureManifest::new()
            .root_pool(1)
            .pool("day", 1)
            .pool("night", 2)
            .segment(&["day"])
            .segment(&["night"])
            .build();
        let mut gallery = loaded_from(&manifest, MemoryImageLoader::permissive()).await;

        gallery.on_segment_changed(0);
        assert_eq!(gallery.active_pool(), Some("day"));
        gallery.on_segment_changed(1);
        assert_eq!(gallery.active_pool(), Some("night"));
        assert_eq!(
            served(&mut gallery, 4),
            vec!["night/0.jpg", "night/1.jpg", "night/0.jpg", "night/1.jpg"]
        );
        assert_eq!(gallery.drain_signals(), vec![GallerySignal::AllComplete]);
    }

    #[tokio::test]
    async fn test_pool_shared_by_segments_is_revisited() {
        let manifest = FixtureManifest::new()
            .pool("day", 2)
            .pool("night", 1)
            .segment(&["day"])
            .segment(&["night"])
            .segment(&["day"])
            .build();
        let mut gallery = loaded_from(&manifest, MemoryImageLoader::permissive()).await;

        gallery.on_segment_changed(0);
        served(&mut gallery, 2);
        // a later segment still shows another pool
        assert_eq!(
            gallery.drain_signals(),
            vec![GallerySignal::PoolComplete {
                pool: "day".to_string()
            }]
        );

        gallery.on_segment_changed(1);
        served(&mut gallery, 1);
        gallery.drain_signals();

        gallery.on_segment_changed(2);
        assert_eq!(gallery.active_pool(), Some("day"));
        assert_eq!(gallery.pool("day").unwrap().cursor(), 0);
        assert_eq!(served(&mut gallery, 2), vec!["day/0.jpg", "day/1.jpg"]);
        assert_eq!(gallery.drain_signals(), vec![GallerySignal::AllComplete]);
    }

    #[tokio::test]
    async fn test_preview_does_not_complete_pool() {
        let manifest = FixtureManifest::new()
            .pool("a", 1)
            .pool("b", 3)
            .segment(&["a"])
            .segment(&["b"])
            .build();
        let mut gallery = loaded_from(&manifest, MemoryImageLoader::permissive()).await;
        gallery.on_segment_changed(0);

        for _ in 0..5 {
            assert_eq!(gallery.preview_image().map(|i| i.url), Some("a/0.jpg".to_string()));
        }
        assert!(gallery.drain_signals().is_empty());
        assert_eq!(gallery.state(0), Some(ImageState::Ready));

        assert_eq!(served(&mut gallery, 1), vec!["a/0.jpg"]);
        assert_eq!(
            gallery.drain_signals(),
            vec![GallerySignal::PoolComplete { pool: "a".to_string() }]
        );
    }
}
