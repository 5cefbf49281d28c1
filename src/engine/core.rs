//! Engine: the per-frame loop wiring analysis, playback, synthesizers and
//! the gallery together.
//!
//! Every component is owned here and mutated only from `tick`, so no state
//! is shared between components. Observers read the returned `Frame` or
//! subscribe to the `EventBus`.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::MissedTickBehavior;

use super::clock::{SystemTimeSource, TimeSource};
use crate::analysis::{AudioEvent, FeatureExtractor, NoSpectrum, ReactiveSignal, SpectrumSource};
use crate::config::EngineConfig;
use crate::error::PlaybackError;
use crate::events::EventBus;
use crate::gallery::{GallerySequencer, GallerySignal, ImageLoader};
use crate::manifest::{ImageRef, TrackManifest};
use crate::playback::{
    AudioOutput, FadeCompletion, PlaybackEvent, PlaybackOrchestrator, PlaybackPhase,
};
use crate::synth::{BorderSquare, BorderSynth, DiagonalLine, DiagonalSynth, Synthesizer, VisualPrimitive};

/// Snapshot of one rendered frame
#[derive(Debug, Clone, Serialize)]
pub struct Frame {
    pub at: Duration,
    pub phase: PlaybackPhase,
    pub segment: usize,
    /// Seconds into the active segment
    pub elapsed: f64,
    pub total_elapsed: f64,
    pub total_duration: f64,
    pub volume: f32,
    pub primitives: Vec<VisualPrimitive>,
    pub image: Option<ImageRef>,
    /// `None` while analysis is unavailable or playback is stopped
    pub signal: Option<ReactiveSignal>,
    pub audio_events: Vec<AudioEvent>,
    pub playback_events: Vec<PlaybackEvent>,
    pub gallery_signals: Vec<GallerySignal>,
}

pub struct Engine {
    config: EngineConfig,
    manifest: TrackManifest,
    clock: Box<dyn TimeSource>,
    playback: PlaybackOrchestrator,
    extractor: FeatureExtractor,
    spectrum: Box<dyn SpectrumSource>,
    border: BorderSynth,
    diagonal: DiagonalSynth,
    gallery: Option<GallerySequencer>,
    bus: EventBus,
    image: Option<ImageRef>,
    /// Whether `image` was served while playing and counts toward its pool
    image_counted: bool,
    started: bool,
}

impl Engine {
    /// Build an engine on the wall clock with no spectrum connected.
    ///
    /// A manifest without images runs without a gallery.
    pub fn new(
        config: EngineConfig,
        manifest: TrackManifest,
        output: Box<dyn AudioOutput>,
        loader: Arc<dyn ImageLoader>,
    ) -> Self {
        let gallery = match GallerySequencer::new(&manifest, config.gallery.clone(), loader) {
            Ok(gallery) => Some(gallery),
            Err(err) => {
                tracing::warn!("[Engine] Running without gallery: {}", err);
                None
            }
        };

        Self {
            playback: PlaybackOrchestrator::new(config.playback.clone(), output),
            extractor: FeatureExtractor::new(config.analysis.clone()),
            border: Synthesizer::new(config.border.wave.clone(), BorderSquare::new(&config.border)),
            diagonal: Synthesizer::new(
                config.diagonal.wave.clone(),
                DiagonalLine::new(&config.diagonal),
            ),
            clock: Box::new(SystemTimeSource::new()),
            spectrum: Box::new(NoSpectrum),
            bus: EventBus::initialized(),
            gallery,
            manifest,
            config,
            image: None,
            image_counted: false,
            started: false,
        }
    }

    pub fn with_clock(mut self, clock: Box<dyn TimeSource>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_spectrum(mut self, spectrum: Box<dyn SpectrumSource>) -> Self {
        self.spectrum = spectrum;
        self
    }

    pub fn with_bus(mut self, bus: EventBus) -> Self {
        self.bus = bus;
        self
    }

    // ========================================================================
    // ACCESSORS
    // ========================================================================

    pub fn now(&self) -> Duration {
        self.clock.now()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn manifest(&self) -> &TrackManifest {
        &self.manifest
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn playback(&self) -> &PlaybackOrchestrator {
        &self.playback
    }

    pub fn extractor(&self) -> &FeatureExtractor {
        &self.extractor
    }

    pub fn border(&self) -> &BorderSynth {
        &self.border
    }

    pub fn diagonal(&self) -> &DiagonalSynth {
        &self.diagonal
    }

    pub fn gallery(&self) -> Option<&GallerySequencer> {
        self.gallery.as_ref()
    }

    pub fn current_image(&self) -> Option<&ImageRef> {
        self.image.as_ref()
    }

    // ========================================================================
    // CONTROLS
    // ========================================================================

    /// Load the playlist, start image preloads and spawn bootstrap visuals.
    pub fn start(&mut self) -> Result<(), PlaybackError> {
        let now = self.clock.now();
        self.playback
            .load_with_layout(self.manifest.segments.clone(), self.manifest.layout(), now)?;
        if !self.started {
            self.started = true;
            if let Some(gallery) = self.gallery.as_mut() {
                gallery.start();
            }
            self.border.start(now);
            self.diagonal.start(now);
        }
        tracing::info!(
            "[Engine] Started with {} segments",
            self.manifest.segments.len()
        );
        Ok(())
    }

    pub fn play(&mut self) -> Result<FadeCompletion, PlaybackError> {
        self.playback.play(self.clock.now())
    }

    pub fn pause(&mut self) -> Result<FadeCompletion, PlaybackError> {
        self.playback.pause(self.clock.now())
    }

    pub fn toggle(&mut self) -> Result<FadeCompletion, PlaybackError> {
        self.playback.toggle(self.clock.now())
    }

    pub fn seek_to(&mut self, index: usize, local_time: f64) -> Result<(), PlaybackError> {
        self.playback.seek_to(index, local_time, self.clock.now())
    }

    /// Seek playback and reposition the gallery to the image expected at `seconds`.
    pub fn seek_to_global_time(&mut self, seconds: f64) -> Result<(), PlaybackError> {
        self.playback.seek_to_global_time(seconds, self.clock.now())?;
        if let Some(gallery) = self.gallery.as_mut() {
            let Some(target) = gallery.seek_to_time(seconds) else {
                return Ok(());
            };
            if gallery.active_pool() == Some(target.pool.as_str()) {
                self.show_next_image();
            }
        }
        Ok(())
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.playback.set_volume(volume, self.clock.now());
    }

    pub fn step_volume(&mut self, up: bool) {
        self.playback.step_volume(up, self.clock.now());
    }

    pub fn nudge(&mut self, delta_seconds: f64) -> Result<(), PlaybackError> {
        self.playback.nudge(delta_seconds)
    }

    /// Wait for every in-flight image load to finish.
    pub async fn settle_gallery(&mut self) {
        if let Some(gallery) = self.gallery.as_mut() {
            gallery.settle().await;
        }
    }

    // ========================================================================
    // FRAME LOOP
    // ========================================================================

    /// Run one frame at the current clock time.
    pub fn tick(&mut self) -> Frame {
        let now = self.clock.now();

        let playback_events = self.playback.tick(now);
        for event in &playback_events {
            if let PlaybackEvent::SegmentChanged { current, .. } = event {
                self.on_segment_changed(*current);
            }
            self.bus.publish_playback(event.clone());
        }

        if let Some(gallery) = self.gallery.as_mut() {
            gallery.poll_loads();
        }

        // Drain the source every frame so a tapped output never backs up
        let spectrum = self.spectrum.spectrum();
        let playing = self.playback.is_playing();
        let spectrum = if playing { spectrum } else { None };
        let analysis = self.extractor.analyze_frame(spectrum, now);
        self.border.update_color(spectrum, now);
        self.diagonal.update_color(spectrum, now);

        let (signal, audio_events) = match analysis {
            Some(analysis) => (Some(analysis.signal), analysis.events),
            None => (None, Vec::new()),
        };
        for event in &audio_events {
            self.route_event(event, now);
            self.bus.publish_audio(event.clone());
        }

        self.refresh_image();

        let gallery_signals = self
            .gallery
            .as_mut()
            .map(|gallery| gallery.drain_signals())
            .unwrap_or_default();
        for signal in &gallery_signals {
            match signal {
                GallerySignal::PoolComplete { pool } => {
                    let outcome = self.playback.request_advance(pool, now);
                    tracing::debug!("[Engine] Advance for pool '{}': {:?}", pool, outcome);
                }
                GallerySignal::AllComplete => self.playback.complete_playlist(now),
                _ => {}
            }
            self.bus.publish_gallery(signal.clone());
        }

        let mut primitives = self.border.render(now);
        primitives.extend(self.diagonal.render(now));
        tracing::trace!("[Engine] Frame at {:?}: {} primitives", now, primitives.len());

        Frame {
            at: now,
            phase: self.playback.phase(),
            segment: self.playback.current_segment_index(),
            elapsed: self.playback.elapsed(),
            total_elapsed: self.playback.total_elapsed(),
            total_duration: self.playback.total_duration(),
            volume: self.playback.volume(),
            primitives,
            image: self.image.clone(),
            signal,
            audio_events,
            playback_events,
            gallery_signals,
        }
    }

    /// Drive `tick` at the configured frame rate until `shutdown` resolves.
    pub async fn run<F, S>(&mut self, mut on_frame: F, shutdown: S)
    where
        F: FnMut(&Frame),
        S: Future<Output = ()>,
    {
        let period = Duration::from_millis(self.config.frame.frame_interval_ms.max(1));
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        tracing::info!("[Engine] Frame loop running every {:?}", period);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("[Engine] Frame loop stopped");
                    break;
                }
                _ = interval.tick() => {
                    let frame = self.tick();
                    on_frame(&frame);
                }
            }
        }
    }

    fn on_segment_changed(&mut self, index: usize) {
        tracing::info!("[Engine] Segment {} active", index);
        self.extractor.on_segment_changed(index);
        self.border.on_segment_changed(index);
        self.diagonal.on_segment_changed(index);
        if let Some(gallery) = self.gallery.as_mut() {
            gallery.on_segment_changed(index);
        }
    }

    fn route_event(&mut self, event: &AudioEvent, now: Duration) {
        match event {
            AudioEvent::Beat { sharp, .. } => {
                self.border.on_event(event, now);
                if *sharp {
                    self.show_next_image();
                }
            }
            AudioEvent::Voice { .. } => {
                self.diagonal.on_event(event, now);
            }
        }
    }

    /// Serve the next image. Outside of playback the image is only
    /// previewed, so pools cannot complete before the user presses play.
    fn show_next_image(&mut self) {
        let Some(gallery) = self.gallery.as_mut() else {
            return;
        };
        let playing = self.playback.is_playing();
        let image = if playing {
            gallery.next_image()
        } else {
            gallery.preview_image()
        };
        if let Some(image) = image {
            tracing::debug!("[Engine] Showing {} (counted: {})", image.url, playing);
            self.image = Some(image);
            self.image_counted = playing;
        }
        gallery.preload_next(self.config.gallery.preload_ahead);
    }

    /// Replace the shown image once it no longer belongs to the active pool,
    /// and count a previewed image once playback starts.
    fn refresh_image(&mut self) {
        let Some(gallery) = self.gallery.as_ref() else {
            return;
        };
        let stale = match (self.image.as_ref(), gallery.active_pool()) {
            (Some(image), Some(active)) => {
                image.pool != active || (!self.image_counted && self.playback.is_playing())
            }
            (None, Some(_)) => true,
            _ => false,
        };
        if stale {
            self.show_next_image();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ManualTimeSource;
    use crate::gallery::MemoryImageLoader;
    use crate::playback::SimulatedOutput;
    use crate::testing::{fixture_manifest, SyntheticSpectrum};

    const FRAME: Duration = Duration::from_millis(16);

    fn engine(clock: &ManualTimeSource) -> Engine {
        engine_with(clock, SyntheticSpectrum::new(FRAME).with_bpm(120.0).with_sharp_beats())
    }

    fn engine_with(clock: &ManualTimeSource, spectrum: SyntheticSpectrum) -> Engine {
        let manifest = fixture_manifest(&[("day", 4), ("night", 3)]);
        let output = SimulatedOutput::new()
            .with_source("segment-0.wav", 30.0)
            .with_source("segment-1.wav", 20.0);
        Engine::new(
            EngineConfig::default(),
            manifest,
            Box::new(output),
            Arc::new(MemoryImageLoader::permissive()),
        )
        .with_clock(Box::new(clock.clone()))
        .with_spectrum(Box::new(spectrum))
    }

    fn run_for(engine: &mut Engine, clock: &ManualTimeSource, duration: Duration) -> Vec<Frame> {
        let frames = (duration.as_millis() / FRAME.as_millis()) as usize;
        (0..frames)
            .map(|_| {
                clock.advance(FRAME);
                engine.tick()
            })
            .collect()
    }

    #[test]
    fn test_nothing_analysed_before_play() {
        let clock = ManualTimeSource::new();
        let mut engine = engine(&clock);
        engine.start().unwrap();
        let frames = run_for(&mut engine, &clock, Duration::from_secs(1));
        assert_eq!(engine.playback().phase(), PlaybackPhase::Ready);
        assert!(frames.iter().all(|f| f.signal.is_none()));
        assert_eq!(engine.extractor().frames_analyzed(), 0);
        assert_eq!(engine.extractor().current_segment(), Some(0));
    }

    #[test]
    fn test_beats_drive_border_waves() {
        let clock = ManualTimeSource::new();
        let mut engine = engine_with(&clock, SyntheticSpectrum::new(FRAME).with_bpm(120.0));
        engine.start().unwrap();
        engine.tick();
        engine.play().unwrap();

        let frames = run_for(&mut engine, &clock, Duration::from_secs(3));
        let beats = frames
            .iter()
            .flat_map(|f| f.audio_events.iter())
            .filter(|e| matches!(e, AudioEvent::Beat { .. }))
            .count();
        assert!(beats >= 4, "expected beats at 120 bpm, got {}", beats);
        assert!(engine.border().wave_count() > 0);

        let last = frames.last().unwrap();
        assert!(last.signal.is_some());
        assert!(last.primitives.iter().any(|p| p.kind == crate::synth::VisualKind::BorderSquare));
    }

    #[tokio::test]
    async fn test_sharp_beats_change_images_not_squares() {
        let clock = ManualTimeSource::new();
        let mut engine = engine(&clock);
        engine.start().unwrap();
        engine.settle_gallery().await;
        engine.tick();
        engine.play().unwrap();

        let frames = run_for(&mut engine, &clock, Duration::from_secs(2));
        let sharp = frames
            .iter()
            .flat_map(|f| f.audio_events.iter())
            .filter(|e| matches!(e, AudioEvent::Beat { sharp: true, .. }))
            .count();
        assert!(sharp >= 2, "expected sharp beats, got {}", sharp);
        assert_eq!(engine.border().wave_count(), 0);
        assert_ne!(engine.current_image().map(|i| i.url.as_str()), Some("day/0.jpg"));
    }

    #[tokio::test]
    async fn test_preview_before_play_is_not_counted() {
        let clock = ManualTimeSource::new();
        let mut engine = engine(&clock);
        engine.start().unwrap();
        engine.settle_gallery().await;
        run_for(&mut engine, &clock, Duration::from_millis(100));
        assert_eq!(engine.current_image().map(|i| i.url.as_str()), Some("day/0.jpg"));
        assert_eq!(engine.gallery().unwrap().state(0), Some(crate::gallery::ImageState::Ready));

        engine.play().unwrap();
        engine.tick();
        // the previewed image is counted once playback runs
        assert_eq!(engine.current_image().map(|i| i.url.as_str()), Some("day/0.jpg"));
        assert_eq!(engine.gallery().unwrap().state(0), Some(crate::gallery::ImageState::Used));
    }

    #[tokio::test]
    async fn test_gallery_follows_active_pool() {
        let clock = ManualTimeSource::new();
        let mut engine = engine(&clock);
        engine.start().unwrap();
        engine.settle_gallery().await;
        engine.tick();
        assert_eq!(engine.current_image().map(|i| i.pool.as_str()), Some("day"));

        engine.seek_to(1, 0.0).unwrap();
        run_for(&mut engine, &clock, Duration::from_millis(200));
        assert_eq!(engine.playback().current_segment_index(), 1);
        assert_eq!(engine.current_image().map(|i| i.pool.as_str()), Some("night"));
    }

    #[tokio::test]
    async fn test_seek_to_global_time_repositions_gallery() {
        let clock = ManualTimeSource::new();
        let mut engine = engine(&clock);
        engine.start().unwrap();
        engine.settle_gallery().await;
        engine.tick();

        // fixture hints place image 2 (the third "day" image) at 20 s
        engine.seek_to_global_time(20.0).unwrap();
        assert_eq!(engine.current_image().map(|i| i.url.as_str()), Some("day/2.jpg"));
        assert_eq!(engine.playback().current_segment_index(), 0);
    }

    #[test]
    fn test_runs_without_gallery() {
        let clock = ManualTimeSource::new();
        let mut manifest = fixture_manifest(&[("day", 1)]);
        manifest.images_by_pool.clear();
        let output = SimulatedOutput::new().with_source("segment-0.wav", 5.0);
        let mut engine = Engine::new(
            EngineConfig::default(),
            manifest,
            Box::new(output),
            Arc::new(MemoryImageLoader::permissive()),
        )
        .with_clock(Box::new(clock.clone()));

        engine.start().unwrap();
        assert!(engine.gallery().is_none());
        let frame = engine.tick();
        assert!(frame.image.is_none());
        assert_eq!(frame.phase, PlaybackPhase::Ready);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let clock = ManualTimeSource::new();
        let mut engine = engine(&clock);
        engine.start().unwrap();

        let mut frames = 0;
        engine
            .run(
                |_| frames += 1,
                tokio::time::sleep(Duration::from_millis(100)),
            )
            .await;
        assert!(frames >= 2);
    }
}
