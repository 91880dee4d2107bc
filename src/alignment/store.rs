//! Smoothed Transform Store.
//!
//! Holds the latest `anchor_T_world` and answers time queries with a value
//! blended from whatever was displayed when the update arrived, so discrete
//! estimator updates do not show up as pose pops for consumers sampling at a
//! different rate.

use crate::config::{SmoothingConfig, SmoothingMode};
use crate::geometry::Sim3;

use super::AnchorWorldTransform;

/// Blend weights at or above this are treated as complete.
const BLEND_COMPLETE: f64 = 1.0 - 1e-9;

#[derive(Debug, Clone)]
struct Blend {
    from: Option<Sim3>,
    target: AnchorWorldTransform,
}

#[derive(Debug, Clone)]
pub struct SmoothedTransformStore {
    config: SmoothingConfig,
    blend: Option<Blend>,
}

impl SmoothedTransformStore {
    pub fn new(config: SmoothingConfig) -> Self {
        Self { config, blend: None }
    }

    /// Install a new transform. The blend starts at the transform's own
    /// timestamp from the value displayed at that instant.
    pub fn update(&mut self, transform: AnchorWorldTransform) {
        let from = self.query(transform.timestamp);
        self.blend = Some(Blend {
            from,
            target: transform,
        });
    }

    /// Smoothed `anchor_T_world` at `timestamp`, or `None` before the first update.
    pub fn query(&self, timestamp: f64) -> Option<Sim3> {
        let blend = self.blend.as_ref()?;
        let Some(from) = blend.from.as_ref() else {
            return Some(blend.target.anchor_t_world.clone());
        };

        let alpha = self.blend_weight(timestamp - blend.target.timestamp);
        if alpha >= BLEND_COMPLETE {
            Some(blend.target.anchor_t_world.clone())
        } else {
            Some(from.interpolate(&blend.target.anchor_t_world, alpha))
        }
    }

    /// Most recent unsmoothed transform.
    pub fn latest(&self) -> Option<&AnchorWorldTransform> {
        self.blend.as_ref().map(|b| &b.target)
    }

    pub fn is_valid(&self) -> bool {
        self.blend.is_some()
    }

    pub fn clear(&mut self) {
        self.blend = None;
    }

    fn blend_weight(&self, elapsed: f64) -> f64 {
        if elapsed <= 0.0 {
            return 0.0;
        }
        match self.config.mode {
            SmoothingMode::None => 1.0,
            SmoothingMode::Linear => (elapsed / self.config.window).min(1.0),
            SmoothingMode::Exponential => 1.0 - (-elapsed / self.config.window).exp(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    fn at(x: f64, timestamp: f64) -> AnchorWorldTransform {
        AnchorWorldTransform {
            anchor_t_world: Sim3 {
                translation: Vector3::new(x, 0.0, 0.0),
                ..Sim3::identity()
            },
            timestamp,
        }
    }

    fn linear() -> SmoothingConfig {
        SmoothingConfig {
            mode: SmoothingMode::Linear,
            window: 0.5,
        }
    }

    #[test]
    fn test_empty_store() {
        let store = SmoothedTransformStore::new(linear());
        assert!(store.query(1.0).is_none());
        assert!(!store.is_valid());
    }

    #[test]
    fn test_first_update_is_immediate() {
        let mut store = SmoothedTransformStore::new(linear());
        store.update(at(2.0, 1.0));
        assert_relative_eq!(store.query(0.0).unwrap().translation.x, 2.0);
        assert_relative_eq!(store.query(1.0).unwrap().translation.x, 2.0);
    }

    #[test]
    fn test_linear_blend() {
        let mut store = SmoothedTransformStore::new(linear());
        store.update(at(0.0, 0.0));
        store.update(at(1.0, 1.0));

        assert_relative_eq!(store.query(0.9).unwrap().translation.x, 0.0, epsilon = 1e-12);
        assert_relative_eq!(store.query(1.25).unwrap().translation.x, 0.5, epsilon = 1e-12);
        assert_relative_eq!(store.query(1.5).unwrap().translation.x, 1.0, epsilon = 1e-12);
        assert_relative_eq!(store.query(9.0).unwrap().translation.x, 1.0, epsilon = 1e-12);
        assert_eq!(store.latest().unwrap().timestamp, 1.0);
    }

    #[test]
    fn test_update_mid_blend_starts_from_displayed_value() {
        let mut store = SmoothedTransformStore::new(linear());
        store.update(at(0.0, 0.0));
        store.update(at(1.0, 1.0));
        // Displayed value at t = 1.25 is 0.5.
        store.update(at(3.0, 1.25));

        assert_relative_eq!(store.query(1.25).unwrap().translation.x, 0.5, epsilon = 1e-12);
        assert_relative_eq!(store.query(1.5).unwrap().translation.x, 1.75, epsilon = 1e-12);
        assert_relative_eq!(store.query(2.0).unwrap().translation.x, 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_exponential_blend() {
        let mut store = SmoothedTransformStore::new(SmoothingConfig {
            mode: SmoothingMode::Exponential,
            window: 0.5,
        });
        store.update(at(0.0, 0.0));
        store.update(at(1.0, 1.0));

        let expected = 1.0 - (-1.0f64).exp();
        assert_relative_eq!(store.query(1.5).unwrap().translation.x, expected, epsilon = 1e-12);
        assert!(store.query(10.0).unwrap().translation.x > 0.999);
    }

    #[test]
    fn test_no_smoothing_and_clear() {
        let mut store = SmoothedTransformStore::new(SmoothingConfig {
            mode: SmoothingMode::None,
            window: 0.0,
        });
        store.update(at(0.0, 0.0));
        store.update(at(1.0, 1.0));
        assert_relative_eq!(store.query(1.01).unwrap().translation.x, 1.0);

        store.clear();
        assert!(store.query(2.0).is_none());
    }
}
