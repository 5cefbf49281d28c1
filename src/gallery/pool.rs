use std::collections::HashSet;

use serde::Serialize;

use crate::manifest::PoolKey;

/// Load and usage state of one image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageState {
    Pending,
    Loading,
    Ready,
    /// Served at least once; still eligible for reuse
    Used,
    Error,
}

impl ImageState {
    pub fn is_settled(self) -> bool {
        matches!(self, ImageState::Ready | ImageState::Used | ImageState::Error)
    }

    pub fn is_loaded(self) -> bool {
        matches!(self, ImageState::Ready | ImageState::Used)
    }
}

/// Circular cursor over the images of one pool.
///
/// Members are indices into the gallery-wide image list, in pool order.
#[derive(Debug, Clone)]
pub struct ImagePool {
    key: PoolKey,
    members: Vec<usize>,
    cursor: usize,
    /// Images served during the current visit
    served: HashSet<usize>,
}

impl ImagePool {
    pub fn new(key: PoolKey, members: Vec<usize>) -> Self {
        Self {
            key,
            members,
            cursor: 0,
            served: HashSet::new(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn members(&self) -> &[usize] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn position_of(&self, image: usize) -> Option<usize> {
        self.members.iter().position(|&m| m == image)
    }

    /// Start a new visit: cursor to the front, every used image reusable.
    pub fn begin_visit(&mut self, states: &mut [ImageState]) {
        self.cursor = 0;
        self.served.clear();
        for &image in &self.members {
            if states[image] == ImageState::Used {
                states[image] = ImageState::Ready;
            }
        }
    }

    /// Serve the next image: the one at the cursor if ready, else the
    /// nearest ready one ahead, else the nearest used one (made ready again).
    pub fn select(&mut self, states: &mut [ImageState]) -> Option<usize> {
        let chosen = self.candidate(states)?;
        let image = self.members[chosen];
        states[image] = ImageState::Used;
        self.served.insert(image);
        self.cursor = (chosen + 1) % self.members.len();
        Some(image)
    }

    /// The image `select` would serve, leaving the pool untouched.
    pub fn peek(&self, states: &[ImageState]) -> Option<usize> {
        self.candidate(states).map(|pos| self.members[pos])
    }

    fn candidate(&self, states: &[ImageState]) -> Option<usize> {
        let len = self.members.len();
        if len == 0 {
            return None;
        }
        let at = |offset: usize| (self.cursor + offset) % len;

        (0..len)
            .map(at)
            .find(|&pos| states[self.members[pos]] == ImageState::Ready)
            .or_else(|| {
                (0..len)
                    .map(at)
                    .find(|&pos| states[self.members[pos]] == ImageState::Used)
            })
    }

    /// Every image that did not fail has been served this visit.
    pub fn is_complete(&self, states: &[ImageState]) -> bool {
        !self.members.is_empty()
            && self
                .members
                .iter()
                .filter(|&&m| states[m] != ImageState::Error)
                .all(|m| self.served.contains(m))
    }

    /// Move the cursor to `position`, making images between the old and new
    /// cursor (inclusive) servable again.
    pub fn seek(&mut self, position: usize, states: &mut [ImageState]) {
        if self.members.is_empty() {
            return;
        }
        let position = position.min(self.members.len() - 1);
        let (from, to) = if position < self.cursor {
            (position, self.cursor)
        } else {
            (self.cursor, position)
        };
        for pos in from..=to.min(self.members.len() - 1) {
            let image = self.members[pos];
            self.served.remove(&image);
            if states[image] == ImageState::Used {
                states[image] = ImageState::Ready;
            }
        }
        self.cursor = position;
    }

    /// Up to `count` pending images starting at the cursor, in serving order.
    pub fn upcoming_pending(&self, count: usize, states: &[ImageState]) -> Vec<usize> {
        let len = self.members.len();
        (0..len)
            .map(|offset| self.members[(self.cursor + offset) % len])
            .filter(|&image| states[image] == ImageState::Pending)
            .take(count)
            .collect()
    }
}
