//! Anchor pose history: paired world/anchor camera poses for scale estimation.

use std::collections::VecDeque;

use crate::geometry::SE3;

/// Camera pose in the anchor frame, from relocalization or the bridge.
#[derive(Debug, Clone, PartialEq)]
pub struct AnchorPose {
    pub timestamp: f64,
    pub anchor_t_camera: SE3,
}

/// The same camera observed in both frames at one instant.
#[derive(Debug, Clone, PartialEq)]
pub struct PairedPose {
    pub timestamp: f64,
    pub world_t_camera: SE3,
    pub anchor_t_camera: SE3,
}

/// Paired poses ordered by timestamp, bounded independently of the pose history.
#[derive(Debug, Clone, Default)]
pub struct AnchorPoseHistory {
    entries: VecDeque<PairedPose>,
}

impl AnchorPoseHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert keeping timestamp order; an entry at an existing timestamp replaces it.
    pub fn insert(&mut self, pair: PairedPose) {
        let idx = self
            .entries
            .partition_point(|e| e.timestamp < pair.timestamp);
        match self.entries.get_mut(idx) {
            Some(existing) if existing.timestamp == pair.timestamp => *existing = pair,
            _ => self.entries.insert(idx, pair),
        }
    }

    /// Evict oldest entries beyond `max_count` or older than `max_age` seconds
    /// before the newest entry.
    pub fn prune(&mut self, max_age: f64, max_count: usize) {
        while self.entries.len() > max_count {
            self.entries.pop_front();
        }
        let Some(newest) = self.entries.back().map(|e| e.timestamp) else {
            return;
        };
        let cutoff = newest - max_age;
        while self.entries.front().is_some_and(|e| e.timestamp < cutoff) {
            self.entries.pop_front();
        }
    }

    pub fn latest(&self) -> Option<&PairedPose> {
        self.entries.back()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &PairedPose> {
        self.entries.iter()
    }
}
