// Spectrum sources - byte magnitude buffers for the feature extractor
//
// SpectrumAnalyser turns PCM into the 1024-bin byte buffer the extractor
// reads: 2048-point Hann-windowed FFT, per-bin temporal smoothing, and a
// decibel range mapped onto 0..255.

use std::collections::VecDeque;
use std::sync::Arc;

use rtrb::Consumer;
use rustfft::{num_complex::Complex, Fft, FftPlanner};

/// FFT size producing 1024 magnitude bins
pub const ANALYSER_FFT_SIZE: usize = 2048;

const SMOOTHING: f32 = 0.3;
const MIN_DECIBELS: f32 = -100.0;
const MAX_DECIBELS: f32 = -30.0;

/// Source of one frequency-magnitude buffer per animation frame.
///
/// `None` means analysis is currently unavailable (no output connected yet).
pub trait SpectrumSource {
    fn spectrum(&mut self) -> Option<&[u8]>;
}

/// Source used when nothing is connected.
#[derive(Debug, Default)]
pub struct NoSpectrum;

impl SpectrumSource for NoSpectrum {
    fn spectrum(&mut self) -> Option<&[u8]> {
        None
    }
}

/// Computes byte magnitude spectra from a stream of mono samples
pub struct SpectrumAnalyser {
    fft: Arc<dyn Fft<f32>>,
    fft_size: usize,
    /// Hann window (pre-computed)
    window: Vec<f32>,
    samples: VecDeque<f32>,
    smoothed: Vec<f32>,
    bytes: Vec<u8>,
    scratch: Vec<Complex<f32>>,
    tap: Option<Consumer<f32>>,
    received: bool,
}

impl SpectrumAnalyser {
    pub fn new(fft_size: usize) -> Self {
        let fft_size = fft_size.max(2);
        let window = (0..fft_size)
            .map(|i| {
                0.5 * (1.0
                    - ((2.0 * std::f32::consts::PI * i as f32) / (fft_size as f32 - 1.0)).cos())
            })
            .collect();
        let fft = FftPlanner::new().plan_fft_forward(fft_size);

        Self {
            fft,
            fft_size,
            window,
            samples: VecDeque::from(vec![0.0; fft_size]),
            smoothed: vec![0.0; fft_size / 2],
            bytes: vec![0; fft_size / 2],
            scratch: vec![Complex::new(0.0, 0.0); fft_size],
            tap: None,
            received: false,
        }
    }

    /// Analyser reading samples from an output tap.
    pub fn with_tap(fft_size: usize, tap: Consumer<f32>) -> Self {
        let mut analyser = Self::new(fft_size);
        analyser.tap = Some(tap);
        analyser
    }

    pub fn bin_count(&self) -> usize {
        self.fft_size / 2
    }

    pub fn push_samples(&mut self, samples: &[f32]) {
        for &sample in samples {
            self.push_sample(sample);
        }
    }

    fn push_sample(&mut self, sample: f32) {
        self.samples.pop_front();
        self.samples.push_back(sample);
        self.received = true;
    }

    fn drain_tap(&mut self) {
        let Some(tap) = self.tap.as_mut() else {
            return;
        };
        let mut drained = Vec::with_capacity(tap.slots());
        while let Ok(sample) = tap.pop() {
            drained.push(sample);
        }
        self.push_samples(&drained);
    }

    fn compute(&mut self) {
        for (slot, (sample, w)) in self
            .scratch
            .iter_mut()
            .zip(self.samples.iter().zip(self.window.iter()))
        {
            *slot = Complex::new(sample * w, 0.0);
        }
        self.fft.process(&mut self.scratch);

        let scale = 1.0 / self.fft_size as f32;
        let range = MAX_DECIBELS - MIN_DECIBELS;
        for (bin, (smoothed, byte)) in self
            .smoothed
            .iter_mut()
            .zip(self.bytes.iter_mut())
            .enumerate()
        {
            let magnitude = self.scratch[bin].norm() * scale;
            *smoothed = SMOOTHING * *smoothed + (1.0 - SMOOTHING) * magnitude;
            *byte = if *smoothed > 0.0 {
                let db = 20.0 * smoothed.log10();
                (255.0 * (db - MIN_DECIBELS) / range).clamp(0.0, 255.0) as u8
            } else {
                0
            };
        }
    }
}

impl SpectrumSource for SpectrumAnalyser {
    fn spectrum(&mut self) -> Option<&[u8]> {
        self.drain_tap();
        if !self.received {
            return None;
        }
        self.compute();
        Some(&self.bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, sample_rate: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / sample_rate).sin())
            .collect()
    }

    #[test]
    fn test_unfed_analyser_is_unavailable() {
        let mut analyser = SpectrumAnalyser::new(ANALYSER_FFT_SIZE);
        assert!(analyser.spectrum().is_none());
        assert!(NoSpectrum.spectrum().is_none());
    }

    #[test]
    fn test_sine_peaks_at_expected_bin() {
        let mut analyser = SpectrumAnalyser::new(ANALYSER_FFT_SIZE);
        analyser.push_samples(&sine(1000.0, 48_000.0, ANALYSER_FFT_SIZE));
        let spectrum = analyser.spectrum().unwrap().to_vec();

        assert_eq!(spectrum.len(), 1024);
        let max = *spectrum.iter().max().unwrap();
        let peak = spectrum.iter().position(|&v| v == max).unwrap();
        // 1000 Hz / (48000 / 2048) = bin 42.7
        assert!((40..=44).contains(&peak));
        assert!(spectrum[peak] > 200);
        assert!(spectrum[900] < spectrum[peak] / 2);
    }

    #[test]
    fn test_tap_feeds_analyser() {
        let (mut producer, consumer) = rtrb::RingBuffer::new(4096);
        let mut analyser = SpectrumAnalyser::with_tap(ANALYSER_FFT_SIZE, consumer);
        assert!(analyser.spectrum().is_none());

        for sample in sine(200.0, 48_000.0, 2048) {
            producer.push(sample).unwrap();
        }
        let spectrum = analyser.spectrum().unwrap();
        assert!(spectrum[..24].iter().any(|&v| v > 150));
    }
}
