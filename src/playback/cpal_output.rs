// CpalOutput - device playback of WAV segment sources
//
// Each prepared segment gets a decoder thread that streams mono chunks to the
// audio callback through an rtrb ring sized for the whole file, so buffering
// progress is observable while the file is read. Transport state lives in
// atomics shared with the callback, which never blocks. The mix is copied
// into a second rtrb ring that feeds the spectrum analyser.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread;

use super::output::{AudioOutput, SourceStatus};
use crate::error::{log_playback_error, ErrorCode, PlaybackError};

/// Frames per decoded chunk handed to the callback
const DECODE_CHUNK_FRAMES: usize = 8192;

/// Capacity of the analyser tap in samples
const TAP_CAPACITY: usize = 16_384;

/// Sources the callback can hold, and registrations it may have pending
const MAX_VOICES: usize = 256;

/// `seek_to` value when no seek is pending
const NO_SEEK: u64 = u64::MAX;

type WavSource = hound::WavReader<BufReader<File>>;

/// Per-segment state shared by the control thread, the decoder and the
/// audio callback
#[derive(Debug)]
struct TrackShared {
    sample_rate: u32,
    /// Header frame count until decoding finishes, then the decoded count
    total_frames: AtomicU64,
    decoded_frames: AtomicU64,
    decode_complete: AtomicBool,
    failure: OnceLock<String>,
    playing: AtomicBool,
    /// f32 bits
    gain: AtomicU32,
    /// Read position in source frames, f64 bits
    position: AtomicU64,
    /// Seek target in source frames (f64 bits), or `NO_SEEK`
    seek_to: AtomicU64,
}

impl TrackShared {
    fn new(sample_rate: u32, total_frames: u64) -> Self {
        Self {
            sample_rate,
            total_frames: AtomicU64::new(total_frames),
            decoded_frames: AtomicU64::new(0),
            decode_complete: AtomicBool::new(false),
            failure: OnceLock::new(),
            playing: AtomicBool::new(false),
            gain: AtomicU32::new(0.0f32.to_bits()),
            position: AtomicU64::new(0.0f64.to_bits()),
            seek_to: AtomicU64::new(NO_SEEK),
        }
    }

    fn failed(reason: String) -> Self {
        let track = Self::new(0, 0);
        track.fail(reason);
        track
    }

    fn fail(&self, reason: String) {
        let _ = self.failure.set(reason);
        self.playing.store(false, Ordering::Release);
    }

    fn gain(&self) -> f32 {
        f32::from_bits(self.gain.load(Ordering::Relaxed))
    }

    fn position_frames(&self) -> f64 {
        f64::from_bits(self.position.load(Ordering::Relaxed))
    }

    fn status(&self) -> SourceStatus {
        if let Some(reason) = self.failure.get() {
            return SourceStatus::Failed {
                reason: reason.clone(),
            };
        }
        let total = self.total_frames.load(Ordering::Acquire);
        let decoded = self.decoded_frames.load(Ordering::Acquire);
        let buffered = if total == 0 {
            1.0
        } else {
            (decoded as f64 / total as f64).min(1.0)
        };
        SourceStatus::Buffering {
            buffered,
            duration: (self.sample_rate > 0).then(|| total as f64 / self.sample_rate as f64),
        }
    }
}

/// Callback-side half of a segment: received samples and a local cursor.
struct Voice {
    shared: Arc<TrackShared>,
    incoming: rtrb::Consumer<Vec<f32>>,
    /// Every chunk but the last holds exactly `DECODE_CHUNK_FRAMES` frames
    chunks: Vec<Vec<f32>>,
    received: usize,
    cursor: f64,
    /// Source frames per output frame
    step: f64,
    playing: bool,
    complete: bool,
    gain: f32,
    gain_target: f32,
    gain_step: f32,
    ramp_left: usize,
}

impl Voice {
    fn new(
        shared: Arc<TrackShared>,
        incoming: rtrb::Consumer<Vec<f32>>,
        chunk_count: usize,
        output_rate: u32,
    ) -> Self {
        let step = if output_rate > 0 {
            shared.sample_rate as f64 / output_rate as f64
        } else {
            0.0
        };
        Self {
            shared,
            incoming,
            chunks: Vec::with_capacity(chunk_count),
            received: 0,
            cursor: 0.0,
            step,
            playing: false,
            complete: false,
            gain: 0.0,
            gain_target: 0.0,
            gain_step: 0.0,
            ramp_left: 0,
        }
    }

    /// Pick up decoded chunks and transport changes before a block of
    /// `frames` output frames. Gain changes are spread over the block.
    fn begin_block(&mut self, frames: usize) {
        // completion is published after the last chunk is pushed
        self.complete = self.shared.decode_complete.load(Ordering::Acquire);
        while let Ok(chunk) = self.incoming.pop() {
            self.received += chunk.len();
            self.chunks.push(chunk);
        }

        let seek = self.shared.seek_to.swap(NO_SEEK, Ordering::AcqRel);
        if seek != NO_SEEK {
            self.cursor = f64::from_bits(seek);
        }
        self.playing = self.shared.playing.load(Ordering::Acquire);

        self.gain_target = self.shared.gain();
        self.ramp_left = frames.max(1);
        self.gain_step = (self.gain_target - self.gain) / self.ramp_left as f32;
    }

    fn sample_at(&self, frame: usize) -> Option<f32> {
        self.chunks
            .get(frame / DECODE_CHUNK_FRAMES)?
            .get(frame % DECODE_CHUNK_FRAMES)
            .copied()
    }

    /// Pull one output-rate sample, advancing the cursor.
    fn next_sample(&mut self) -> f32 {
        if !self.playing || self.step == 0.0 {
            return 0.0;
        }
        if self.ramp_left > 0 {
            self.ramp_left -= 1;
            self.gain = if self.ramp_left == 0 {
                self.gain_target
            } else {
                self.gain + self.gain_step
            };
        }

        let index = self.cursor as usize;
        let Some(sample) = self.sample_at(index) else {
            // underrun while decoding, or the end of the source
            if self.complete && index >= self.received {
                self.playing = false;
                self.shared.playing.store(false, Ordering::Release);
            }
            return 0.0;
        };
        self.cursor += self.step;
        sample * self.gain
    }

    fn end_block(&mut self) {
        self.gain = self.gain_target;
        self.ramp_left = 0;
        // a seek issued during the block owns the published position
        if self.shared.seek_to.load(Ordering::Acquire) == NO_SEEK {
            self.shared
                .position
                .store(self.cursor.to_bits(), Ordering::Relaxed);
        }
    }
}

/// State owned by the audio callback
struct Mixer {
    voices: Vec<Voice>,
    registrations: rtrb::Consumer<Voice>,
    tap: rtrb::Producer<f32>,
    channels: usize,
}

impl Mixer {
    fn new(registrations: rtrb::Consumer<Voice>, tap: rtrb::Producer<f32>, channels: usize) -> Self {
        Self {
            voices: Vec::with_capacity(MAX_VOICES),
            registrations,
            tap,
            channels: channels.max(1),
        }
    }

    /// Fill an interleaved output buffer with the mix of every voice.
    fn render(&mut self, data: &mut [f32]) {
        while self.voices.len() < MAX_VOICES {
            let Ok(voice) = self.registrations.pop() else {
                break;
            };
            self.voices.push(voice);
        }

        let frames = data.len() / self.channels;
        for voice in &mut self.voices {
            voice.begin_block(frames);
        }
        for frame in data.chunks_mut(self.channels) {
            let mix: f32 = self.voices.iter_mut().map(Voice::next_sample).sum();
            let mix = mix.clamp(-1.0, 1.0);
            frame.fill(mix);
            let _ = self.tap.push(mix);
        }
        for voice in &mut self.voices {
            voice.end_block();
        }
    }
}

pub struct CpalOutput {
    tracks: HashMap<usize, Arc<TrackShared>>,
    registrations: rtrb::Producer<Voice>,
    stream: Option<cpal::Stream>,
    tap: Option<rtrb::Consumer<f32>>,
    sample_rate: u32,
}

impl CpalOutput {
    /// Open the default output device and start the mixing stream.
    pub fn open() -> Result<Self, PlaybackError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| PlaybackError::StreamOpenFailed {
                reason: "No default output device found".to_string(),
            })?;

        let config = device
            .default_output_config()
            .map_err(|e| PlaybackError::StreamOpenFailed {
                reason: format!("Failed to get default output config: {:?}", e),
            })?;

        let stream_config: cpal::StreamConfig = config.clone().into();
        let channels_count = stream_config.channels as usize;
        let sample_rate = stream_config.sample_rate.0;

        let (registrations, registration_consumer) = rtrb::RingBuffer::<Voice>::new(MAX_VOICES);
        let (tap_producer, tap_consumer) = rtrb::RingBuffer::<f32>::new(TAP_CAPACITY);
        let mut mixer = Mixer::new(registration_consumer, tap_producer, channels_count);

        let err_fn = |err| tracing::error!("[CpalOutput] Output stream error: {}", err);

        let stream = match config.sample_format() {
            cpal::SampleFormat::F32 => device.build_output_stream(
                &stream_config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| mixer.render(data),
                err_fn,
                None,
            ),
            _ => {
                return Err(PlaybackError::StreamOpenFailed {
                    reason: "Only F32 sample format is currently supported for output".to_string(),
                })
            }
        }
        .map_err(|e| PlaybackError::StreamOpenFailed {
            reason: format!("{:?}", e),
        })?;

        stream.play().map_err(|e| PlaybackError::HardwareError {
            details: format!("Output start failed: {}", e),
        })?;

        tracing::info!(
            "[CpalOutput] Output stream open: {} Hz, {} channels",
            sample_rate,
            channels_count
        );

        Ok(Self {
            tracks: HashMap::new(),
            registrations,
            stream: Some(stream),
            tap: Some(tap_consumer),
            sample_rate,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Consumer end of the output mix, for the spectrum analyser.
    pub fn take_tap(&mut self) -> Option<rtrb::Consumer<f32>> {
        self.tap.take()
    }

    pub fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
        }
    }
}

impl Drop for CpalOutput {
    fn drop(&mut self) {
        self.close();
    }
}

fn open_source(path: &Path) -> Result<WavSource, String> {
    let reader =
        hound::WavReader::open(path).map_err(|err| format!("failed to open {}: {err}", path.display()))?;
    if reader.spec().channels == 0 {
        return Err(format!("{} has zero channels", path.display()));
    }
    Ok(reader)
}

/// Decode `reader` to mono and stream it into `chunks`.
fn decode_into(
    mut reader: WavSource,
    track: &TrackShared,
    mut chunks: rtrb::Producer<Vec<f32>>,
    label: &str,
) -> Result<(), String> {
    let spec = reader.spec();
    let channels = spec.channels as usize;

    let samples: Box<dyn Iterator<Item = Result<f32, hound::Error>> + '_> = match spec.sample_format {
        hound::SampleFormat::Float => Box::new(reader.samples::<f32>()),
        hound::SampleFormat::Int => match spec.bits_per_sample {
            16 => Box::new(
                reader
                    .samples::<i16>()
                    .map(|s| s.map(|v| v as f32 / i16::MAX as f32)),
            ),
            24 => Box::new(
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / 8_388_607.0)),
            ),
            32 => Box::new(
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / i32::MAX as f32)),
            ),
            bits => return Err(format!("unsupported bits_per_sample={} for {}", bits, label)),
        },
    };

    let mut chunk = Vec::with_capacity(DECODE_CHUNK_FRAMES);
    let mut decoded = 0u64;
    let mut frame_sum = 0.0;
    let mut frame_fill = 0;
    for sample in samples {
        let sample = sample.map_err(|err| format!("error reading {}: {err}", label))?;
        frame_sum += sample;
        frame_fill += 1;
        if frame_fill == channels {
            chunk.push(frame_sum / channels as f32);
            frame_sum = 0.0;
            frame_fill = 0;
        }
        if chunk.len() == DECODE_CHUNK_FRAMES {
            let full = std::mem::replace(&mut chunk, Vec::with_capacity(DECODE_CHUNK_FRAMES));
            decoded += full.len() as u64;
            chunks
                .push(full)
                .map_err(|_| format!("chunk ring overflow for {}", label))?;
            track.decoded_frames.store(decoded, Ordering::Release);
        }
    }
    if !chunk.is_empty() {
        decoded += chunk.len() as u64;
        chunks
            .push(chunk)
            .map_err(|_| format!("chunk ring overflow for {}", label))?;
    }

    // header may overstate the frame count of a truncated file
    track.total_frames.store(decoded, Ordering::Release);
    track.decoded_frames.store(decoded, Ordering::Release);
    track.decode_complete.store(true, Ordering::Release);
    Ok(())
}

impl AudioOutput for CpalOutput {
    fn prepare(&mut self, segment: usize, source: &str) {
        if self.tracks.contains_key(&segment) {
            return;
        }

        let reader = match open_source(Path::new(source)) {
            Ok(reader) => reader,
            Err(reason) => {
                tracing::warn!("[CpalOutput] Segment {} failed: {}", segment, reason);
                self.tracks.insert(segment, Arc::new(TrackShared::failed(reason)));
                return;
            }
        };
        let total = reader.duration() as usize;
        let chunk_count = total / DECODE_CHUNK_FRAMES + 1;
        let track = Arc::new(TrackShared::new(reader.spec().sample_rate, total as u64));
        let (producer, consumer) = rtrb::RingBuffer::<Vec<f32>>::new(chunk_count);

        let voice = Voice::new(Arc::clone(&track), consumer, chunk_count, self.sample_rate);
        if self.registrations.push(voice).is_err() {
            let err = PlaybackError::MixerFull {
                capacity: MAX_VOICES,
            };
            log_playback_error(&err, "prepare");
            track.fail(err.message());
            self.tracks.insert(segment, track);
            return;
        }
        self.tracks.insert(segment, Arc::clone(&track));

        tracing::debug!("[CpalOutput] Decoding segment {} from {}", segment, source);
        let label = source.to_string();
        thread::spawn(move || {
            if let Err(reason) = decode_into(reader, &track, producer, &label) {
                tracing::warn!("[CpalOutput] Segment {} failed: {}", segment, reason);
                track.fail(reason);
            }
        });
    }

    fn status(&self, segment: usize) -> SourceStatus {
        self.tracks
            .get(&segment)
            .map(|track| track.status())
            .unwrap_or(SourceStatus::Unprepared)
    }

    fn start(&mut self, segment: usize) -> Result<(), PlaybackError> {
        let track = self
            .tracks
            .get(&segment)
            .ok_or_else(|| PlaybackError::SourceUnavailable {
                segment,
                reason: "not prepared".to_string(),
            })?;
        if let Some(reason) = track.failure.get() {
            return Err(PlaybackError::SourceUnavailable {
                segment,
                reason: reason.clone(),
            });
        }
        track.playing.store(true, Ordering::Release);
        Ok(())
    }

    fn pause(&mut self, segment: usize) {
        if let Some(track) = self.tracks.get(&segment) {
            track.playing.store(false, Ordering::Release);
        }
    }

    fn seek(&mut self, segment: usize, seconds: f64) {
        let Some(track) = self.tracks.get(&segment) else {
            return;
        };
        let max = track.total_frames.load(Ordering::Acquire) as f64;
        let frames = (seconds.max(0.0) * track.sample_rate as f64).min(max);
        track.position.store(frames.to_bits(), Ordering::Relaxed);
        track.seek_to.store(frames.to_bits(), Ordering::Release);
    }

    fn position(&self, segment: usize) -> f64 {
        match self.tracks.get(&segment) {
            Some(track) if track.sample_rate > 0 => {
                track.position_frames() / track.sample_rate as f64
            }
            _ => 0.0,
        }
    }

    fn set_gain(&mut self, segment: usize, gain: f32) {
        if let Some(track) = self.tracks.get(&segment) {
            track
                .gain
                .store(gain.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
        }
    }

    fn gain(&self, segment: usize) -> f32 {
        self.tracks.get(&segment).map(|track| track.gain()).unwrap_or(0.0)
    }
}
