//! Anchor-World Estimator.
//!
//! Relates the anchor frame to the world tracker's frame with a similarity
//! transform. Only the scale is fitted across the whole history; rotation and
//! translation come from the most recent pair so the current frame is exact
//! and rendered content does not drift when older pairs shift the optimum.

use nalgebra::Vector3;

use crate::error::AlignmentError;
use crate::geometry::{HornSolver, ScaleSolver, Sim3};
use crate::history::AnchorPoseHistory;

/// `anchor_T_world` together with the timestamp of the pair it was built from.
#[derive(Debug, Clone, PartialEq)]
pub struct AnchorWorldTransform {
    pub anchor_t_world: Sim3,
    pub timestamp: f64,
}

impl AnchorWorldTransform {
    pub fn scale(&self) -> f64 {
        self.anchor_t_world.scale
    }
}

pub struct AnchorWorldEstimator {
    solver: Box<dyn ScaleSolver>,
}

impl AnchorWorldEstimator {
    pub fn new() -> Self {
        Self::with_solver(Box::new(HornSolver))
    }

    pub fn with_solver(solver: Box<dyn ScaleSolver>) -> Self {
        Self { solver }
    }

    /// Estimate `anchor_T_world` from the paired history.
    ///
    /// Camera centres in the world frame are aligned to camera centres in the
    /// anchor frame; the fitted scale `s` (anchor units per world unit) is
    /// then applied around the latest pair:
    ///
    /// `anchor_T_world = anchor_T_camera · S(s) · world_T_camera⁻¹`
    ///
    /// so that `anchor_T_world ∘ world_T_camera = anchor_T_camera` holds
    /// exactly for the latest pair. A single pair yields `s = 1`.
    pub fn estimate(&self, history: &AnchorPoseHistory) -> Result<AnchorWorldTransform, AlignmentError> {
        let latest = history.latest().ok_or(AlignmentError::EmptyHistory)?;

        let scale = if history.len() == 1 {
            1.0
        } else {
            let (world_centres, anchor_centres): (Vec<Vector3<f64>>, Vec<Vector3<f64>>) = history
                .iter()
                .map(|pair| (pair.world_t_camera.translation, pair.anchor_t_camera.translation))
                .unzip();
            let fitted = self.solver.solve(&world_centres, &anchor_centres)?;
            if !fitted.scale.is_finite() || fitted.scale <= 0.0 {
                return Err(AlignmentError::NonPositiveScale(fitted.scale));
            }
            fitted.scale
        };

        let anchor_t_world = Sim3::from_se3(&latest.anchor_t_camera)
            .compose(&Sim3::from_scale(scale))
            .compose(&Sim3::from_se3(&latest.world_t_camera.inverse()));

        if !anchor_t_world.is_valid() {
            return Err(AlignmentError::NonPositiveScale(anchor_t_world.scale));
        }

        Ok(AnchorWorldTransform {
            anchor_t_world,
            timestamp: latest.timestamp,
        })
    }
}

impl Default for AnchorWorldEstimator {
    fn default() -> Self {
        Self::new()
    }
}
