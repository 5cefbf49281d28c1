// EventBus: broadcast channels fanning engine notifications out to observers
//
// The frame loop publishes; any number of UI, logging or test consumers
// subscribe. A channel that was never initialised simply drops what is
// published to it.

use std::sync::{Arc, Mutex, MutexGuard};

use futures::{Stream, StreamExt};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use crate::analysis::AudioEvent;
use crate::gallery::GallerySignal;
use crate::playback::PlaybackEvent;

type Slot<T> = Arc<Mutex<Option<broadcast::Sender<T>>>>;

fn guard<T>(slot: &Slot<T>) -> MutexGuard<'_, Option<broadcast::Sender<T>>> {
    // The sender stays usable even if a publisher panicked mid-send
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn install<T: Clone>(slot: &Slot<T>, capacity: usize) -> broadcast::Sender<T> {
    let (tx, _) = broadcast::channel(capacity);
    *guard(slot) = Some(tx.clone());
    tx
}

fn subscribe<T: Clone>(slot: &Slot<T>) -> Option<broadcast::Receiver<T>> {
    guard(slot).as_ref().map(|tx| tx.subscribe())
}

/// Returns the number of subscribers that received `value`.
fn publish<T: Clone>(slot: &Slot<T>, value: T) -> usize {
    guard(slot)
        .as_ref()
        .and_then(|tx| tx.send(value).ok())
        .unwrap_or(0)
}

/// Turn a receiver into a stream, skipping messages lost to lag.
pub fn into_stream<T: Clone + Send + 'static>(
    receiver: broadcast::Receiver<T>,
) -> impl Stream<Item = T> + Send {
    BroadcastStream::new(receiver).filter_map(|result| async move {
        match result {
            Ok(value) => Some(value),
            Err(lagged) => {
                tracing::debug!("[EventBus] Subscriber {}", lagged);
                None
            }
        }
    })
}

/// Owns the broadcast channels of one engine
///
/// # Channel Types
/// - Audio: beats and voice onsets from the feature extractor
/// - Playback: transport notifications, including the authoritative
///   segment change
/// - Gallery: pool completion, loading progress and image failures
#[derive(Clone, Default)]
pub struct EventBus {
    audio: Slot<AudioEvent>,
    playback: Slot<PlaybackEvent>,
    gallery: Slot<GallerySignal>,
}

impl EventBus {
    /// Bus with every channel uninitialised.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bus with every channel ready for subscribers.
    pub fn initialized() -> Self {
        let bus = Self::new();
        bus.init_audio();
        bus.init_playback();
        bus.init_gallery();
        bus
    }

    // ========================================================================
    // AUDIO CHANNEL
    // ========================================================================

    /// Initialize the audio event channel
    ///
    /// # Notes
    /// - Buffer size: 256 events (several seconds of dense onsets)
    /// - Lagging subscribers lose the oldest events
    pub fn init_audio(&self) -> broadcast::Sender<AudioEvent> {
        install(&self.audio, 256)
    }

    pub fn subscribe_audio(&self) -> Option<broadcast::Receiver<AudioEvent>> {
        subscribe(&self.audio)
    }

    pub fn publish_audio(&self, event: AudioEvent) -> usize {
        publish(&self.audio, event)
    }

    // ========================================================================
    // PLAYBACK CHANNEL
    // ========================================================================

    /// Initialize the playback event channel
    ///
    /// # Notes
    /// - Buffer size: 64 events; transport notifications are sparse
    pub fn init_playback(&self) -> broadcast::Sender<PlaybackEvent> {
        install(&self.playback, 64)
    }

    pub fn subscribe_playback(&self) -> Option<broadcast::Receiver<PlaybackEvent>> {
        subscribe(&self.playback)
    }

    pub fn publish_playback(&self, event: PlaybackEvent) -> usize {
        publish(&self.playback, event)
    }

    // ========================================================================
    // GALLERY CHANNEL
    // ========================================================================

    /// Initialize the gallery signal channel
    ///
    /// # Notes
    /// - Buffer size: 128 signals; the initial preload emits one progress
    ///   signal per image
    pub fn init_gallery(&self) -> broadcast::Sender<GallerySignal> {
        install(&self.gallery, 128)
    }

    pub fn subscribe_gallery(&self) -> Option<broadcast::Receiver<GallerySignal>> {
        subscribe(&self.gallery)
    }

    pub fn publish_gallery(&self, signal: GallerySignal) -> usize {
        publish(&self.gallery, signal)
    }
}
