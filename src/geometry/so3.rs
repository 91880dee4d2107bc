//! SO(3)/SE(3) tangent-space helpers for iterative pose refinement.

use nalgebra::{Matrix3, UnitQuaternion, Vector3, Vector6};

use super::SE3;

/// Constructs the skew-symmetric matrix [v]× such that [v]× u = v × u.
///
/// ```text
/// [v]× = |  0   -v_z   v_y |
///        |  v_z   0   -v_x |
///        | -v_y  v_x    0  |
/// ```
#[inline]
pub fn skew(v: &Vector3<f64>) -> Matrix3<f64> {
    Matrix3::new(
        0.0, -v.z, v.y,
        v.z, 0.0, -v.x,
        -v.y, v.x, 0.0,
    )
}

/// Apply a left perturbation `[ω, v]` to a pose: R ← exp(ω) R, t ← exp(ω) t + v.
///
/// Matches the Jacobian `∂(R p + t)/∂[ω, v] = [-[R p + t]×, I]`.
pub fn retract_left(pose: &SE3, delta: &Vector6<f64>) -> SE3 {
    let omega = Vector3::new(delta[0], delta[1], delta[2]);
    let v = Vector3::new(delta[3], delta[4], delta[5]);
    let d_rot = UnitQuaternion::from_scaled_axis(omega);
    SE3 {
        rotation: d_rot * pose.rotation,
        translation: d_rot * pose.translation + v,
    }
}
