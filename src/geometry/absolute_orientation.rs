//! Absolute orientation: closed-form similarity between two paired 3D point sets.
//!
//! Finds S such that `target ≈ S * source`, following Horn's method with the
//! symmetric scale estimate `s = sqrt(Σ|t'|² / Σ|s'|²)` over centred points.
//! The symmetric form gives the same scale whichever set is chosen as source,
//! which matters when both sets carry comparable noise.
//!
//! Reference: B.K.P. Horn, "Closed-form solution of absolute orientation using
//! unit quaternions", JOSA A, 1987.

use nalgebra::{Matrix3, Rotation3, UnitQuaternion, Vector3};

use crate::error::AlignmentError;
use crate::geometry::Sim3;

/// Ratio between the second and first singular value of the source scatter
/// below which the configuration is treated as collinear.
const COLLINEARITY_RATIO: f64 = 1e-6;

/// Total centred energy below which all points are treated as coincident.
const MIN_SPREAD: f64 = 1e-12;

/// Smallest scale accepted as a valid solution.
const MIN_SCALE: f64 = 1e-9;

/// Solver seam for the anchor/world estimator.
///
/// The estimator retains only the scale of the fitted similarity; the trait
/// lets tests substitute a solver with a known answer.
pub trait ScaleSolver: Send + Sync {
    fn solve(
        &self,
        source: &[Vector3<f64>],
        target: &[Vector3<f64>],
    ) -> Result<Sim3, AlignmentError>;
}

/// Horn absolute orientation with free scale.
#[derive(Debug, Clone, Copy, Default)]
pub struct HornSolver;

impl ScaleSolver for HornSolver {
    fn solve(
        &self,
        source: &[Vector3<f64>],
        target: &[Vector3<f64>],
    ) -> Result<Sim3, AlignmentError> {
        solve_absolute_orientation(source, target, false)
    }
}

/// Compute the similarity mapping `source` onto `target`.
///
/// Algorithm:
/// 1. Compute and subtract centroids
/// 2. Reject coincident or collinear configurations
/// 3. Scale (if not fixed): s = sqrt(Σ|t'|² / Σ|s'|²)
/// 4. Rotation via SVD of the cross-covariance, with reflection correction
/// 5. Translation: t = c_target - s * R * c_source
pub fn solve_absolute_orientation(
    source: &[Vector3<f64>],
    target: &[Vector3<f64>],
    fix_scale: bool,
) -> Result<Sim3, AlignmentError> {
    let n = source.len();
    if n == 0 || n != target.len() {
        return Err(AlignmentError::EmptyHistory);
    }
    if n < 3 {
        return Err(AlignmentError::DegenerateConfiguration(0.0));
    }

    let centroid_src = compute_centroid(source);
    let centroid_dst = compute_centroid(target);

    let centered_src: Vec<_> = source.iter().map(|p| p - centroid_src).collect();
    let centered_dst: Vec<_> = target.iter().map(|p| p - centroid_dst).collect();

    check_spread(&centered_src)?;

    let scale = if fix_scale {
        1.0
    } else {
        let sum_sq_src: f64 = centered_src.iter().map(|p| p.norm_squared()).sum();
        let sum_sq_dst: f64 = centered_dst.iter().map(|p| p.norm_squared()).sum();
        let scale = (sum_sq_dst / sum_sq_src).sqrt();
        if !scale.is_finite() || scale < MIN_SCALE {
            return Err(AlignmentError::NonPositiveScale(scale));
        }
        scale
    };

    // Cross-covariance H = Σ s'_i * t'_i^T
    let mut h = Matrix3::zeros();
    for (s, t) in centered_src.iter().zip(centered_dst.iter()) {
        h += s * t.transpose();
    }

    let svd = h.svd(true, true);
    let (u, v_t) = match (svd.u, svd.v_t) {
        (Some(u), Some(v_t)) => (u, v_t),
        _ => return Err(AlignmentError::DegenerateConfiguration(0.0)),
    };

    // R = V * U^T, flipping the last axis of V on reflection.
    let mut v = v_t.transpose();
    let mut rotation_mat = v * u.transpose();
    if rotation_mat.determinant() < 0.0 {
        for i in 0..3 {
            v[(i, 2)] = -v[(i, 2)];
        }
        rotation_mat = v * u.transpose();
    }

    let rotation =
        UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(rotation_mat));
    let translation = centroid_dst - scale * (rotation * centroid_src);

    Ok(Sim3 {
        rotation,
        translation,
        scale,
    })
}

/// Reject coincident and (near-)collinear centred point sets.
fn check_spread(centered: &[Vector3<f64>]) -> Result<(), AlignmentError> {
    let mut scatter = Matrix3::zeros();
    for p in centered {
        scatter += p * p.transpose();
    }
    let singular = scatter.singular_values();
    let mut sorted = [singular[0], singular[1], singular[2]];
    sorted.sort_by(|a, b| b.total_cmp(a));

    if sorted[0] < MIN_SPREAD {
        return Err(AlignmentError::DegenerateConfiguration(0.0));
    }
    let ratio = sorted[1] / sorted[0];
    if ratio < COLLINEARITY_RATIO {
        return Err(AlignmentError::DegenerateConfiguration(ratio));
    }
    Ok(())
}

/// Compute centroid of a set of 3D points.
pub fn compute_centroid(points: &[Vector3<f64>]) -> Vector3<f64> {
    if points.is_empty() {
        return Vector3::zeros();
    }
    let sum: Vector3<f64> = points.iter().sum();
    sum / points.len() as f64
}
