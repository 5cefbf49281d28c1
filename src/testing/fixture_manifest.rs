//! In-memory track manifests and WAV fixtures.

use std::collections::BTreeMap;
use std::f32::consts::PI;
use std::path::Path;

use crate::manifest::{Segment, TrackManifest, ROOT_POOL};

/// Seconds between consecutive seek hints in a fixture manifest
pub const FIXTURE_HINT_SPACING: f64 = 10.0;

/// Manifest with one segment per pool.
///
/// Segment `i` plays `segment-{i}.wav` and shows pool `i`; images are named
/// `{pool}/{n}.jpg`. Image `k` (in manifest image order) is hinted at
/// `k * 10` seconds.
pub fn fixture_manifest(pools: &[(&str, usize)]) -> TrackManifest {
    pools
        .iter()
        .fold(FixtureManifest::new(), |fixture, (pool, count)| {
            fixture.pool(pool, *count).segment(&[*pool])
        })
        .build()
}

/// Builder for manifests whose segments list arbitrary pools, including the
/// root pool, pools shared between segments and pools no segment lists.
///
/// Naming and seek hints follow `fixture_manifest`.
#[derive(Debug, Clone, Default)]
pub struct FixtureManifest {
    pools: Vec<(String, usize)>,
    segments: Vec<Vec<String>>,
}

impl FixtureManifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pool(mut self, name: &str, images: usize) -> Self {
        self.pools.push((name.to_string(), images));
        self
    }

    /// Images sitting directly in the track folder.
    pub fn root_pool(self, images: usize) -> Self {
        self.pool(ROOT_POOL, images)
    }

    /// Append a segment listing `subgroups`; an empty slice lists none.
    pub fn segment(mut self, subgroups: &[&str]) -> Self {
        self.segments
            .push(subgroups.iter().map(|g| g.to_string()).collect());
        self
    }

    pub fn build(self) -> TrackManifest {
        let segments = self
            .segments
            .into_iter()
            .enumerate()
            .map(|(i, subgroups)| {
                subgroups
                    .into_iter()
                    .fold(Segment::new(i, format!("segment-{}.wav", i)), |segment, pool| {
                        segment.with_subgroup(pool)
                    })
            })
            .collect();

        let images_by_pool: BTreeMap<String, Vec<String>> = self
            .pools
            .into_iter()
            .map(|(pool, count)| {
                let urls = (0..count).map(|n| format!("{}/{}.jpg", pool, n)).collect();
                (pool, urls)
            })
            .collect();

        let mut manifest = TrackManifest {
            segments,
            images_by_pool,
            seek_time_hints: BTreeMap::new(),
        };
        manifest.seek_time_hints = (0..manifest.images().len())
            .map(|k| (k, k as f64 * FIXTURE_HINT_SPACING))
            .collect();
        manifest
    }
}

/// Write a mono 16-bit sine WAV.
pub fn write_sine_wav(
    path: &Path,
    seconds: f32,
    sample_rate: u32,
    frequency_hz: f32,
) -> Result<(), hound::Error> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    let frames = (seconds * sample_rate as f32) as u32;
    for n in 0..frames {
        let t = n as f32 / sample_rate as f32;
        let sample = (2.0 * PI * frequency_hz * t).sin() * 0.5;
        writer.write_sample((sample * i16::MAX as f32) as i16)?;
    }
    writer.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixture_layout() {
        let manifest = fixture_manifest(&[("b", 2), ("a", 3)]);
        assert_eq!(manifest.segments.len(), 2);
        assert_eq!(manifest.segments[1].source_url, "segment-1.wav");

        // images follow pool order, which is alphabetical
        let images = manifest.images();
        assert_eq!(images[0].url, "a/0.jpg");
        assert_eq!(images[3].url, "b/0.jpg");
        assert_eq!(manifest.seek_time_hints.get(&4), Some(&40.0));

        let layout = manifest.layout();
        assert_eq!(layout.segment_for_pool("b"), Some(0));
        assert!(layout.is_final_pool("a"));
    }

    #[test]
    fn test_builder_with_root_and_shared_pools() {
        let manifest = FixtureManifest::new()
            .root_pool(1)
            .pool("day", 2)
            .segment(&["day"])
            .segment(&[])
            .segment(&["day"])
            .build();
        assert_eq!(manifest.segments.len(), 3);
        assert!(manifest.segments[1].subgroups.is_empty());
        assert_eq!(manifest.images()[0].url, "__root__/0.jpg");
        assert_eq!(manifest.seek_time_hints.len(), 3);

        let layout = manifest.layout();
        assert_eq!(layout.active_pool(2).map(String::as_str), Some("day"));
        assert_eq!(layout.segments_showing("day"), vec![0, 1, 2]);
    }

    #[test]
    fn test_sine_wav_round_trip() {
        let path = std::env::temp_dir().join(format!("pulse_canvas_sine_{}.wav", std::process::id()));
        write_sine_wav(&path, 0.5, 8_000, 440.0).unwrap();
        let reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.duration(), 4_000);
        let _ = std::fs::remove_file(&path);
    }
}
