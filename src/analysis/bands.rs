// Band averages over a byte magnitude buffer
//
// The buffer follows the analyser convention: one byte per bin, 0 = floor,
// 255 = full scale. Bands are averaged independently and then combined into
// the rhythm, voice and sharp signals.

use serde::Serialize;

use crate::config::{BandLayout, BandRange};

/// Average magnitude of each analysis band (0-255 scale)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct BandEnergies {
    pub sub_bass: f32,
    pub bass: f32,
    pub low_mid: f32,
    pub mid: f32,
    pub high_mid: f32,
    pub treble: f32,
    pub presence: f32,
}

impl BandEnergies {
    /// Average every band of `layout` over `spectrum`.
    ///
    /// Ranges running past the end of a short buffer are clipped; a band with
    /// no bins left averages to zero.
    pub fn from_spectrum(spectrum: &[u8], layout: &BandLayout) -> Self {
        Self {
            sub_bass: band_average(spectrum, layout.sub_bass),
            bass: band_average(spectrum, layout.bass),
            low_mid: band_average(spectrum, layout.low_mid),
            mid: band_average(spectrum, layout.mid),
            high_mid: band_average(spectrum, layout.high_mid),
            treble: band_average(spectrum, layout.treble),
            presence: band_average(spectrum, layout.presence),
        }
    }

    fn as_array(&self) -> [f32; 7] {
        [
            self.sub_bass,
            self.bass,
            self.low_mid,
            self.mid,
            self.high_mid,
            self.treble,
            self.presence,
        ]
    }

    /// Mean of the seven band averages.
    pub fn total(&self) -> f32 {
        self.as_array().iter().sum::<f32>() / 7.0
    }

    pub fn bass_energy(&self) -> f32 {
        (self.sub_bass + self.bass) / 2.0
    }

    pub fn mid_average(&self) -> f32 {
        (self.mid + self.high_mid) / 2.0
    }

    pub fn treble_average(&self) -> f32 {
        (self.treble + self.presence) / 2.0
    }

    /// Bass-weighted energy driving beat detection.
    pub fn rhythm(&self) -> f32 {
        0.7 * self.bass + 0.3 * self.low_mid
    }

    /// Mid/treble-weighted energy driving voice detection.
    pub fn voice(&self) -> f32 {
        0.6 * self.mid_average() + 0.4 * self.treble_average()
    }

    /// Treble/presence-weighted energy flagging sharp beats.
    pub fn sharp(&self) -> f32 {
        0.7 * self.treble_average() + 0.3 * self.presence
    }
}

fn band_average(spectrum: &[u8], range: BandRange) -> f32 {
    let end = range.end.min(spectrum.len());
    if range.start >= end {
        return 0.0;
    }
    let sum: u32 = spectrum[range.start..end].iter().map(|&v| v as u32).sum();
    sum as f32 / (end - range.start) as f32
}

/// Loudness-weighted mean bin index, normalized to 0..1.
///
/// Returns `None` for an empty or silent buffer.
pub fn normalized_centroid(spectrum: &[u8]) -> Option<f32> {
    if spectrum.is_empty() {
        return None;
    }
    let (weighted, total) = spectrum
        .iter()
        .enumerate()
        .fold((0.0f64, 0.0f64), |(w, t), (i, &v)| {
            (w + i as f64 * v as f64, t + v as f64)
        });
    if total <= 0.0 {
        return None;
    }
    Some((weighted / total / spectrum.len() as f64) as f32)
}

/// Average of the bins in `[from, to)` expressed as fractions of the buffer.
pub fn fractional_average(spectrum: &[u8], from: f32, to: f32) -> f32 {
    let len = spectrum.len();
    let start = ((from.clamp(0.0, 1.0)) * len as f32) as usize;
    let end = ((to.clamp(0.0, 1.0)) * len as f32) as usize;
    band_average(spectrum, BandRange::new(start, end))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(ranges: &[(usize, usize, u8)]) -> Vec<u8> {
        let mut buf = vec![0u8; 1024];
        for &(start, end, value) in ranges {
            for bin in &mut buf[start..end] {
                *bin = value;
            }
        }
        buf
    }

    #[test]
    fn test_bass_impulse_feeds_only_rhythm() {
        let buf = filled(&[(0, 200, 255)]);
        let bands = BandEnergies::from_spectrum(&buf, &BandLayout::default());

        assert_eq!(bands.sub_bass, 255.0);
        assert_eq!(bands.low_mid, 255.0);
        assert_eq!(bands.rhythm(), 255.0);
        assert_eq!(bands.voice(), 0.0);
        assert_eq!(bands.sharp(), 0.0);
        assert!((bands.total() - 3.0 * 255.0 / 7.0).abs() < 1e-3);
    }

    #[test]
    fn test_treble_content_feeds_sharp_and_voice() {
        let buf = filled(&[(600, 1024, 200)]);
        let bands = BandEnergies::from_spectrum(&buf, &BandLayout::default());

        assert_eq!(bands.rhythm(), 0.0);
        assert!((bands.sharp() - 200.0).abs() < 1e-3);
        assert!((bands.voice() - 80.0).abs() < 1e-3);
    }

    #[test]
    fn test_short_buffer_is_clipped() {
        let buf = vec![100u8; 50];
        let bands = BandEnergies::from_spectrum(&buf, &BandLayout::default());
        assert_eq!(bands.sub_bass, 100.0);
        assert_eq!(bands.bass, 100.0);
        assert_eq!(bands.mid, 0.0);
    }

    #[test]
    fn test_centroid() {
        assert_eq!(normalized_centroid(&[0, 0, 0, 0]), None);
        let low = normalized_centroid(&filled(&[(0, 10, 255)])).unwrap();
        let high = normalized_centroid(&filled(&[(1000, 1024, 255)])).unwrap();
        assert!(low < 0.01);
        assert!(high > 0.97);
    }

    #[test]
    fn test_fractional_average() {
        let buf = filled(&[(0, 102, 255)]);
        assert!((fractional_average(&buf, 0.0, 0.1) - 255.0).abs() < 1e-3);
        assert_eq!(fractional_average(&buf, 0.8, 1.0), 0.0);
    }
}
