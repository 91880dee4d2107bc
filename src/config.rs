//! Controller configuration.
//!
//! All structs implement `Default` with the values used in production and
//! derive `Deserialize` so hosts can load them from any serde format.
//! Durations are in seconds on the world tracker's clock.

use nalgebra::Vector3;
use serde::Deserialize;

use crate::error::ConfigError;
use crate::geometry::PnPConfig;
use crate::relocalization::MapSpec;

/// Age and count bounds for a history.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct HistoryBounds {
    /// Maximum age relative to the newest entry, seconds.
    pub max_age: f64,
    /// Maximum number of entries.
    pub max_count: usize,
}

impl HistoryBounds {
    fn validate(&self, name: &str) -> Result<(), ConfigError> {
        if !(self.max_age > 0.0) {
            return Err(ConfigError::InvalidValue(format!("{name}.max_age must be positive")));
        }
        if self.max_count == 0 {
            return Err(ConfigError::InvalidValue(format!("{name}.max_count must be non-zero")));
        }
        Ok(())
    }
}

impl Default for HistoryBounds {
    fn default() -> Self {
        Self {
            max_age: 10.0,
            max_count: 600,
        }
    }
}

/// Relocalization throttling and acceptance.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RelocalizationConfig {
    /// Minimum time between two requests.
    pub min_request_interval: f64,
    /// Minimum correspondences before the first successful relocalization.
    pub min_correspondences_initial: usize,
    /// Minimum correspondences once a relocalization has succeeded.
    pub min_correspondences: usize,
    /// Longer image side sent to the service, pixels.
    pub max_image_dimension: usize,
    /// Start a bridge session from results below the correspondence minimum.
    ///
    /// Off by default: such results are recorded as failures and never touch
    /// the anchor transform. When on, they may seed the bridge, but only while
    /// an anchor transform from an earlier success exists.
    pub seed_bridge_from_insufficient: bool,
}

impl Default for RelocalizationConfig {
    fn default() -> Self {
        Self {
            min_request_interval: 3.0,
            min_correspondences_initial: 20,
            min_correspondences: 40,
            max_image_dimension: 640,
            seed_bridge_from_insufficient: false,
        }
    }
}

/// Frame-to-frame bridge tracking.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub enabled: bool,
    /// Absolute lower bound on surviving points.
    pub absolute_min_points: usize,
    /// Lower bound on surviving points as a fraction of the session's initial count.
    pub relative_min_fraction: f64,
    /// Correspondence budget kept between frames.
    pub max_features: usize,
    /// Maximum distance between a tracked point and its predicted location, pixels.
    pub search_radius: f64,
    /// Maximum forward-backward tracking disagreement, pixels.
    pub forward_backward_tolerance: f64,
    /// Lucas-Kanade patch half-size.
    pub window_radius: usize,
    pub pyramid_levels: usize,
    pub max_flow_iterations: usize,
    /// Flow convergence threshold, pixels.
    pub flow_epsilon: f32,
    pub ransac_iterations: usize,
    /// PnP inlier threshold, pixels.
    pub reprojection_threshold: f64,
    /// Seed for the RANSAC sampler.
    pub rng_seed: u64,
}

impl BridgeConfig {
    /// Fewest surviving points that allow the session to continue.
    pub fn required_points(&self, initial_count: usize) -> usize {
        // 0.3 * 100 rounds to 30.000000000000004.
        let relative = (self.relative_min_fraction * initial_count as f64 - 1e-9).ceil() as usize;
        self.absolute_min_points.max(relative)
    }

    pub fn pnp_config(&self, min_inliers: usize) -> PnPConfig {
        PnPConfig {
            max_iterations: self.ransac_iterations,
            reprojection_threshold: self.reprojection_threshold,
            min_inliers,
            ..PnPConfig::default()
        }
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            absolute_min_points: 12,
            relative_min_fraction: 0.3,
            max_features: 100,
            search_radius: 30.0,
            forward_backward_tolerance: 1.0,
            window_radius: 7,
            pyramid_levels: 3,
            max_flow_iterations: 30,
            flow_epsilon: 0.01,
            ransac_iterations: 200,
            reprojection_threshold: 4.0,
            rng_seed: 0x5eed,
        }
    }
}

/// How the transform store blends between discrete updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SmoothingMode {
    /// Blend weight grows linearly to 1 over the window.
    Linear,
    /// Blend weight `1 - exp(-dt / window)`.
    Exponential,
    /// Updates take effect immediately.
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct SmoothingConfig {
    pub mode: SmoothingMode,
    /// Blend window (linear) or time constant (exponential), seconds.
    pub window: f64,
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            mode: SmoothingMode::Linear,
            window: 0.5,
        }
    }
}

/// Top-level configuration for an [`AnchorAlignmentController`](crate::system::AnchorAlignmentController).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Pose History Ring bounds.
    pub pose_history: HistoryBounds,
    /// Anchor pose history bounds.
    pub anchor_history: HistoryBounds,
    pub relocalization: RelocalizationConfig,
    pub bridge: BridgeConfig,
    pub smoothing: SmoothingConfig,
    /// Map selection, parsed once when the session starts.
    pub map: MapSpec,
    /// World-frame up axis of the world tracker.
    pub world_up: Vector3<f64>,
    /// Worker poll period while no bridge session is active, seconds.
    pub poll_interval: f64,
    /// Worker period while a bridge session is active, seconds.
    pub bridge_interval: f64,
}

impl ControllerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.pose_history.validate("pose_history")?;
        self.anchor_history.validate("anchor_history")?;

        if !(self.poll_interval > 0.0) || !(self.bridge_interval > 0.0) {
            return Err(ConfigError::InvalidValue("poll intervals must be positive".into()));
        }
        if !(self.relocalization.min_request_interval >= 0.0) {
            return Err(ConfigError::InvalidValue(
                "relocalization.min_request_interval must be non-negative".into(),
            ));
        }
        if self.relocalization.max_image_dimension == 0 {
            return Err(ConfigError::InvalidValue(
                "relocalization.max_image_dimension must be non-zero".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.bridge.relative_min_fraction) {
            return Err(ConfigError::InvalidValue(
                "bridge.relative_min_fraction must lie in [0, 1]".into(),
            ));
        }
        if self.bridge.enabled && (self.bridge.max_features < 4 || self.bridge.absolute_min_points < 4) {
            return Err(ConfigError::InvalidValue(
                "bridge.max_features and bridge.absolute_min_points must be at least 4".into(),
            ));
        }
        if self.bridge.pyramid_levels == 0 {
            return Err(ConfigError::InvalidValue("bridge.pyramid_levels must be non-zero".into()));
        }
        if self.smoothing.mode != SmoothingMode::None && !(self.smoothing.window > 0.0) {
            return Err(ConfigError::InvalidValue("smoothing.window must be positive".into()));
        }
        if self.world_up.norm() < 1e-9 {
            return Err(ConfigError::InvalidValue("world_up must be non-zero".into()));
        }
        Ok(())
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            pose_history: HistoryBounds::default(),
            anchor_history: HistoryBounds {
                max_age: 30.0,
                max_count: 64,
            },
            relocalization: RelocalizationConfig::default(),
            bridge: BridgeConfig::default(),
            smoothing: SmoothingConfig::default(),
            map: MapSpec::default(),
            world_up: Vector3::y(),
            poll_interval: 1.0,
            bridge_interval: 0.05,
        }
    }
}
