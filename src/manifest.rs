//! Track metadata consumed by the engine
//!
//! A track is an ordered list of audio segments plus image pools keyed by
//! subfolder name. Loading the JSON from storage is the caller's concern;
//! this module only defines the shape and derives the pool layout from it.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

/// Key of the pool holding images that sit directly in the track folder
pub const ROOT_POOL: &str = "__root__";

pub type PoolKey = String;

/// One audio source of the playlist
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub audio_index: usize,
    pub source_url: String,
    /// Pools shown while this segment plays, in preference order
    #[serde(default)]
    pub subgroups: Vec<PoolKey>,
}

impl Segment {
    pub fn new(audio_index: usize, source_url: impl Into<String>) -> Self {
        Self {
            audio_index,
            source_url: source_url.into(),
            subgroups: Vec::new(),
        }
    }

    pub fn with_subgroup(mut self, pool: impl Into<PoolKey>) -> Self {
        self.subgroups.push(pool.into());
        self
    }

    pub fn shows_pool(&self, pool: &str) -> bool {
        self.subgroups.iter().any(|g| g == pool)
    }
}

/// Image reference handed to the renderer
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageRef {
    pub url: String,
    pub pool: PoolKey,
}

/// Complete description of one selectable track
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackManifest {
    pub segments: Vec<Segment>,
    pub images_by_pool: BTreeMap<PoolKey, Vec<String>>,
    /// Playback time (seconds, across all segments) at which each image,
    /// indexed in `images()` order, is expected on screen
    pub seek_time_hints: BTreeMap<usize, f64>,
}

impl TrackManifest {
    /// Parse a manifest and put segments in `audio_index` order.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let mut manifest: TrackManifest = serde_json::from_str(json)?;
        manifest.normalize();
        Ok(manifest)
    }

    /// Sort segments by `audio_index` and renumber them to their position.
    pub fn normalize(&mut self) {
        self.segments.sort_by_key(|s| s.audio_index);
        for (position, segment) in self.segments.iter_mut().enumerate() {
            if segment.audio_index != position {
                tracing::warn!(
                    "[Manifest] Renumbering segment {} to {}",
                    segment.audio_index,
                    position
                );
                segment.audio_index = position;
            }
        }
    }

    /// Pool keys with the root pool first and the rest alphabetical.
    pub fn pool_order(&self) -> Vec<PoolKey> {
        let mut order: Vec<PoolKey> = Vec::with_capacity(self.images_by_pool.len());
        if self.images_by_pool.contains_key(ROOT_POOL) {
            order.push(ROOT_POOL.to_string());
        }
        order.extend(
            self.images_by_pool
                .keys()
                .filter(|k| k.as_str() != ROOT_POOL)
                .cloned(),
        );
        order
    }

    /// All images concatenated in pool order.
    pub fn images(&self) -> Vec<ImageRef> {
        self.pool_order()
            .into_iter()
            .flat_map(|pool| {
                self.images_by_pool
                    .get(&pool)
                    .cloned()
                    .unwrap_or_default()
                    .into_iter()
                    .map(move |url| ImageRef {
                        url,
                        pool: pool.clone(),
                    })
            })
            .collect()
    }

    pub fn layout(&self) -> PoolLayout {
        PoolLayout::new(self.pool_order(), &self.segments)
    }
}

/// Mapping between pools and the segments that show them
///
/// A segment shows the first of its own subgroups that has images. Pools no
/// segment lists are owned by the segment of the closest listed pool before
/// them in pool order, or by segment 0 when none precedes them; a segment
/// listing nothing usable shows the first pool it owns. Anything still
/// unresolved keeps the previous segment's pool.
#[derive(Debug, Clone, Default)]
pub struct PoolLayout {
    order: Vec<PoolKey>,
    pool_segment: HashMap<PoolKey, usize>,
    segment_pool: Vec<Option<PoolKey>>,
}

impl PoolLayout {
    pub fn new(order: Vec<PoolKey>, segments: &[Segment]) -> Self {
        let mut pool_segment = HashMap::with_capacity(order.len());
        if !segments.is_empty() {
            let mut last_claimed = None;
            for pool in &order {
                let owner = match segments.iter().position(|s| s.shows_pool(pool)) {
                    Some(claimed) => {
                        last_claimed = Some(claimed);
                        claimed
                    }
                    None => last_claimed.unwrap_or(0),
                };
                pool_segment.insert(pool.clone(), owner);
            }
        }

        let mut segment_pool: Vec<Option<PoolKey>> = Vec::with_capacity(segments.len());
        for (index, segment) in segments.iter().enumerate() {
            let listed = segment.subgroups.iter().find(|g| order.contains(g));
            let owned = || {
                order
                    .iter()
                    .find(|pool| pool_segment.get(pool.as_str()) == Some(&index))
            };
            let pool = listed
                .or_else(owned)
                .cloned()
                .or_else(|| segment_pool.last().cloned().flatten())
                .or_else(|| order.first().cloned());
            segment_pool.push(pool);
        }

        Self {
            order,
            pool_segment,
            segment_pool,
        }
    }

    /// Layout over the pools the segments themselves list, in listing order.
    pub fn from_segments(segments: &[Segment]) -> Self {
        let mut order: Vec<PoolKey> = Vec::new();
        for pool in segments.iter().flat_map(|s| s.subgroups.iter()) {
            if !order.contains(pool) {
                order.push(pool.clone());
            }
        }
        Self::new(order, segments)
    }

    pub fn order(&self) -> &[PoolKey] {
        &self.order
    }

    pub fn segment_count(&self) -> usize {
        self.segment_pool.len()
    }

    /// Segment owning `pool`: the first one listing it, or the inherited owner.
    pub fn segment_for_pool(&self, pool: &str) -> Option<usize> {
        self.pool_segment.get(pool).copied()
    }

    /// Pool shown while `segment` plays.
    pub fn active_pool(&self, segment: usize) -> Option<&PoolKey> {
        self.segment_pool.get(segment).and_then(Option::as_ref)
    }

    /// Segments that show `pool`, in playlist order.
    pub fn segments_showing(&self, pool: &str) -> Vec<usize> {
        (0..self.segment_count())
            .filter(|&i| self.active_pool(i).map(String::as_str) == Some(pool))
            .collect()
    }

    /// First segment after `segment` that shows a pool other than `pool`.
    pub fn next_segment_after(&self, segment: usize, pool: &str) -> Option<usize> {
        (segment + 1..self.segment_count())
            .find(|&i| self.active_pool(i).map(String::as_str) != Some(pool))
    }

    /// Whether `pool` is shown by the final segment of the playlist.
    pub fn is_final_pool(&self, pool: &str) -> bool {
        self.segment_count()
            .checked_sub(1)
            .and_then(|last| self.active_pool(last))
            .is_some_and(|active| active == pool)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"{
        "segments": [
            { "audio_index": 1, "source_url": "b.wav", "subgroups": ["night"] },
            { "audio_index": 0, "source_url": "a.wav", "subgroups": ["day"] }
        ],
        "images_by_pool": {
            "night": ["n1.jpg", "n2.jpg"],
            "__root__": ["r1.jpg"],
            "day": ["d1.jpg", "d2.jpg", "d3.jpg"]
        },
        "seek_time_hints": { "0": 0.0, "3": 12.5 }
    }"#;

    #[test]
    fn test_parse_sorts_segments() {
        let manifest = TrackManifest::from_json(MANIFEST).unwrap();
        assert_eq!(manifest.segments[0].source_url, "a.wav");
        assert_eq!(manifest.segments[1].audio_index, 1);
        assert_eq!(manifest.seek_time_hints.get(&3), Some(&12.5));
    }

    #[test]
    fn test_pool_order_puts_root_first() {
        let manifest = TrackManifest::from_json(MANIFEST).unwrap();
        assert_eq!(manifest.pool_order(), vec!["__root__", "day", "night"]);

        let images = manifest.images();
        assert_eq!(images.len(), 6);
        assert_eq!(images[0].url, "r1.jpg");
        assert_eq!(images[1].pool, "day");
        assert_eq!(images[5].url, "n2.jpg");
    }

    #[test]
    fn test_layout_mapping() {
        let manifest = TrackManifest::from_json(MANIFEST).unwrap();
        let layout = manifest.layout();

        assert_eq!(layout.segment_for_pool("day"), Some(0));
        assert_eq!(layout.segment_for_pool("night"), Some(1));
        // nothing listed before the root pool, so it falls to segment 0
        assert_eq!(layout.segment_for_pool(ROOT_POOL), Some(0));

        // listed subgroups win over the unclaimed root pool
        assert_eq!(layout.active_pool(0).map(String::as_str), Some("day"));
        assert_eq!(layout.active_pool(1).map(String::as_str), Some("night"));
        assert_eq!(layout.active_pool(5), None);
        assert!(layout.is_final_pool("night"));
        assert!(!layout.is_final_pool("day"));
        assert!(!layout.is_final_pool(ROOT_POOL));
    }

    #[test]
    fn test_segment_zero_falls_back_to_first_pool() {
        let segments = vec![Segment::new(0, "a.wav"), Segment::new(1, "b.wav")];
        let layout = PoolLayout::new(vec!["only".to_string()], &segments);
        assert_eq!(layout.segment_for_pool("only"), Some(0));
        assert_eq!(layout.active_pool(0).map(String::as_str), Some("only"));
        assert_eq!(layout.active_pool(1).map(String::as_str), Some("only"));
        assert_eq!(layout.next_segment_after(0, "only"), None);
    }

    #[test]
    fn test_revisited_pool_maps_per_segment() {
        let segments = vec![
            Segment::new(0, "a.wav").with_subgroup("day"),
            Segment::new(1, "b.wav").with_subgroup("night"),
            Segment::new(2, "c.wav").with_subgroup("day"),
        ];
        let layout = PoolLayout::new(vec!["day".to_string(), "night".to_string()], &segments);

        assert_eq!(layout.active_pool(2).map(String::as_str), Some("day"));
        assert_eq!(layout.segments_showing("day"), vec![0, 2]);
        assert_eq!(layout.next_segment_after(0, "day"), Some(1));
        assert_eq!(layout.next_segment_after(1, "night"), Some(2));
        assert_eq!(layout.next_segment_after(2, "day"), None);
        assert!(layout.is_final_pool("day"));
    }

    #[test]
    fn test_unclaimed_pool_follows_preceding_claimed_pool() {
        // "extra" sorts after "day", which segment 0 lists
        let segments = vec![
            Segment::new(0, "a.wav").with_subgroup("day"),
            Segment::new(1, "b.wav"),
            Segment::new(2, "c.wav").with_subgroup("night"),
        ];
        let order = vec!["day".to_string(), "extra".to_string(), "night".to_string()];
        let layout = PoolLayout::new(order, &segments);

        assert_eq!(layout.segment_for_pool("extra"), Some(0));
        // segment 1 lists and owns nothing: it keeps showing "day"
        assert_eq!(layout.active_pool(1).map(String::as_str), Some("day"));
        assert_eq!(layout.next_segment_after(0, "day"), Some(2));
    }

    #[test]
    fn test_segment_without_subgroups_shows_owned_root_pool() {
        let segments = vec![
            Segment::new(0, "a.wav"),
            Segment::new(1, "b.wav").with_subgroup("night"),
        ];
        let layout = PoolLayout::new(vec![ROOT_POOL.to_string(), "night".to_string()], &segments);
        assert_eq!(layout.active_pool(0).map(String::as_str), Some(ROOT_POOL));
        assert_eq!(layout.active_pool(1).map(String::as_str), Some("night"));
        assert_eq!(layout.next_segment_after(0, ROOT_POOL), Some(1));
    }

    #[test]
    fn test_layout_from_segments() {
        let segments = vec![
            Segment::new(0, "a.wav").with_subgroup("b"),
            Segment::new(1, "b.wav").with_subgroup("a").with_subgroup("b"),
        ];
        let layout = PoolLayout::from_segments(&segments);
        assert_eq!(layout.order(), ["b".to_string(), "a".to_string()]);
        assert_eq!(layout.active_pool(1).map(String::as_str), Some("a"));
    }
}
