//! Pose History Ring: continuous-tracker samples ordered by timestamp.

use std::collections::VecDeque;

use crate::geometry::SE3;

/// One continuous-tracker observation.
#[derive(Debug, Clone, PartialEq)]
pub struct PoseSample {
    /// Seconds on the world tracker's clock.
    pub timestamp: f64,
    pub world_t_camera: SE3,
}

/// Samples with strictly increasing timestamps, oldest first.
#[derive(Debug, Clone, Default)]
pub struct PoseHistory {
    samples: VecDeque<PoseSample>,
}

impl PoseHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a sample. Duplicate or out-of-order timestamps are ignored.
    ///
    /// Returns whether the sample was stored.
    pub fn append(&mut self, timestamp: f64, world_t_camera: SE3) -> bool {
        if !timestamp.is_finite() {
            return false;
        }
        if let Some(last) = self.samples.back() {
            if timestamp <= last.timestamp {
                return false;
            }
        }
        self.samples.push_back(PoseSample {
            timestamp,
            world_t_camera,
        });
        true
    }

    /// Evict oldest samples until at most `max_count` remain and none is older
    /// than `max_age` seconds before the most recent sample.
    pub fn prune(&mut self, max_age: f64, max_count: usize) {
        while self.samples.len() > max_count {
            self.samples.pop_front();
        }
        let Some(newest) = self.samples.back().map(|s| s.timestamp) else {
            return;
        };
        let cutoff = newest - max_age;
        while self.samples.front().is_some_and(|s| s.timestamp < cutoff) {
            self.samples.pop_front();
        }
    }

    /// Earliest sample at or after `timestamp`, else the most recent sample.
    ///
    /// Used to predict the pose of a frame the tracker may not have reported yet.
    pub fn query_at_or_after(&self, timestamp: f64) -> Option<&PoseSample> {
        let idx = self.samples.partition_point(|s| s.timestamp < timestamp);
        self.samples.get(idx).or_else(|| self.samples.back())
    }

    pub fn most_recent(&self) -> Option<&PoseSample> {
        self.samples.back()
    }

    pub fn oldest(&self) -> Option<&PoseSample> {
        self.samples.front()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &PoseSample> {
        self.samples.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector3;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn pose(x: f64) -> SE3 {
        SE3 {
            translation: Vector3::new(x, 0.0, 0.0),
            ..SE3::identity()
        }
    }

    #[test]
    fn test_append_rejects_duplicates_and_out_of_order() {
        let mut history = PoseHistory::new();
        assert!(history.append(1.0, pose(1.0)));
        assert!(!history.append(1.0, pose(2.0)));
        assert!(!history.append(0.5, pose(3.0)));
        assert!(!history.append(f64::NAN, pose(4.0)));
        assert!(history.append(2.0, pose(5.0)));

        assert_eq!(history.len(), 2);
        assert_eq!(history.most_recent().unwrap().world_t_camera, pose(5.0));
    }

    #[test]
    fn test_query_at_or_after() {
        let mut history = PoseHistory::new();
        assert!(history.query_at_or_after(0.0).is_none());

        for t in [1.0, 2.0, 3.0] {
            history.append(t, pose(t));
        }

        assert_eq!(history.query_at_or_after(0.0).unwrap().timestamp, 1.0);
        assert_eq!(history.query_at_or_after(2.0).unwrap().timestamp, 2.0);
        assert_eq!(history.query_at_or_after(2.5).unwrap().timestamp, 3.0);
        // Past the newest sample: falls back to the most recent.
        assert_eq!(history.query_at_or_after(10.0).unwrap().timestamp, 3.0);
    }

    #[test]
    fn test_prune_by_count_then_age() {
        let mut history = PoseHistory::new();
        for i in 0..10 {
            history.append(i as f64, pose(i as f64));
        }

        history.prune(100.0, 4);
        assert_eq!(history.len(), 4);
        assert_eq!(history.oldest().unwrap().timestamp, 6.0);

        history.prune(1.5, 100);
        assert_eq!(history.len(), 2);
        assert_eq!(history.oldest().unwrap().timestamp, 8.0);
    }

    #[test]
    fn test_prune_bounds_hold_for_random_sequences() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..50 {
            let max_age = rng.gen_range(0.1..5.0);
            let max_count = rng.gen_range(1..30);
            let mut history = PoseHistory::new();
            let mut t = 0.0;

            for _ in 0..rng.gen_range(1..200) {
                t += rng.gen_range(-0.05..0.2);
                history.append(t, SE3::identity());
                if rng.gen_bool(0.3) {
                    history.prune(max_age, max_count);
                    let newest = history.most_recent().unwrap().timestamp;
                    assert!(history.len() <= max_count);
                    assert!(history.iter().all(|s| s.timestamp >= newest - max_age));
                }
            }
        }
    }
}
