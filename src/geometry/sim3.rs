//! Sim3: 7-DOF similarity transformation (rotation + translation + uniform scale).
//!
//! Used for `anchor_T_world`: the anchor map and the world tracker agree on
//! orientation only up to a rotation, and on distances only up to a single
//! scale factor shared by all three axes.

use nalgebra::{Matrix3, Matrix4, Vector3};
use nalgebra::UnitQuaternion;

use super::SE3;

/// Similarity transformation.
///
/// Transforms points as: p' = s * R * p + t
#[derive(Debug, Clone, PartialEq)]
pub struct Sim3 {
    pub rotation: UnitQuaternion<f64>,
    pub translation: Vector3<f64>,
    pub scale: f64,
}

impl Sim3 {
    /// Identity transformation (no rotation, no translation, scale = 1).
    pub fn identity() -> Self {
        Self {
            rotation: UnitQuaternion::identity(),
            translation: Vector3::zeros(),
            scale: 1.0,
        }
    }

    /// Construct from SE3 with scale = 1.0.
    pub fn from_se3(se3: &SE3) -> Self {
        Self::from_se3_with_scale(se3, 1.0)
    }

    /// Construct from SE3 with explicit scale.
    pub fn from_se3_with_scale(se3: &SE3, scale: f64) -> Self {
        Self {
            rotation: se3.rotation,
            translation: se3.translation,
            scale,
        }
    }

    /// Pure uniform scaling about the origin.
    pub fn from_scale(scale: f64) -> Self {
        Self {
            scale,
            ..Self::identity()
        }
    }

    /// Drop the scale, keeping rotation and translation.
    pub fn to_se3(&self) -> SE3 {
        SE3 {
            rotation: self.rotation,
            translation: self.translation,
        }
    }

    /// Homogeneous 4x4 matrix of form [s*R | t; 0 0 0 1].
    pub fn to_matrix(&self) -> Matrix4<f64> {
        let mut mat = Matrix4::identity();
        mat.fixed_view_mut::<3, 3>(0, 0)
            .copy_from(&self.scaled_rotation_matrix());
        mat.fixed_view_mut::<3, 1>(0, 3).copy_from(&self.translation);
        mat
    }

    /// Inverse transformation.
    ///
    /// For S = [sR | t]: S^{-1} = [(1/s)R^T | -(1/s)R^T*t]
    pub fn inverse(&self) -> Self {
        let rot_inv = self.rotation.inverse();
        let scale_inv = 1.0 / self.scale;
        Self {
            rotation: rot_inv,
            translation: -(rot_inv * self.translation) * scale_inv,
            scale: scale_inv,
        }
    }

    /// Compose two Sim3 transforms: self ∘ other.
    ///
    /// [s1*R1 | t1] ∘ [s2*R2 | t2] = [s1*s2*R1*R2 | s1*R1*t2 + t1]
    pub fn compose(&self, other: &Sim3) -> Self {
        Self {
            rotation: self.rotation * other.rotation,
            translation: self.scale * (self.rotation * other.translation) + self.translation,
            scale: self.scale * other.scale,
        }
    }

    /// Apply to a rigid pose, e.g. `anchor_T_world ∘ world_T_camera`.
    ///
    /// The result is the camera pose in the target frame: the camera centre is
    /// mapped through the similarity and the scale is not carried into the pose.
    pub fn transform_pose(&self, pose: &SE3) -> SE3 {
        SE3 {
            rotation: self.rotation * pose.rotation,
            translation: self.transform_point(&pose.translation),
        }
    }

    /// Transform a single point: p' = s * R * p + t.
    pub fn transform_point(&self, p: &Vector3<f64>) -> Vector3<f64> {
        self.scale * (self.rotation * p) + self.translation
    }

    pub fn transform_points(&self, pts: &[Vector3<f64>]) -> Vec<Vector3<f64>> {
        pts.iter().map(|p| self.transform_point(p)).collect()
    }

    pub fn rotation_matrix(&self) -> Matrix3<f64> {
        self.rotation.to_rotation_matrix().into_inner()
    }

    /// Scaled rotation matrix (s * R).
    pub fn scaled_rotation_matrix(&self) -> Matrix3<f64> {
        self.rotation_matrix() * self.scale
    }

    /// True when all components are finite and the scale is strictly positive.
    pub fn is_valid(&self) -> bool {
        self.scale.is_finite()
            && self.scale > 0.0
            && self.translation.iter().all(|v| v.is_finite())
            && self.rotation.coords.iter().all(|v| v.is_finite())
    }

    /// Blend towards `other` by `alpha` in [0, 1].
    ///
    /// Rotation is slerped, translation lerped, and scale interpolated
    /// geometrically so it stays positive.
    pub fn interpolate(&self, other: &Sim3, alpha: f64) -> Self {
        let alpha = alpha.clamp(0.0, 1.0);
        let rotation = self
            .rotation
            .try_slerp(&other.rotation, alpha, 1e-9)
            .unwrap_or(if alpha < 0.5 { self.rotation } else { other.rotation });
        Self {
            rotation,
            translation: self.translation.lerp(&other.translation, alpha),
            scale: (self.scale.ln() * (1.0 - alpha) + other.scale.ln() * alpha).exp(),
        }
    }
}

impl Default for Sim3 {
    fn default() -> Self {
        Self::identity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sample_sim3() -> Sim3 {
        Sim3 {
            rotation: UnitQuaternion::from_axis_angle(&Vector3::z_axis(), std::f64::consts::FRAC_PI_2),
            translation: Vector3::new(1.0, 2.0, 3.0),
            scale: 2.0,
        }
    }

    #[test]
    fn test_inverse() {
        let sim3 = sample_sim3();
        let composed = sim3.compose(&sim3.inverse());

        assert_relative_eq!(composed.scale, 1.0, epsilon = 1e-10);
        assert_relative_eq!(composed.translation.norm(), 0.0, epsilon = 1e-10);

        let p = Vector3::new(1.0, 2.0, 3.0);
        let p_back = sim3.inverse().transform_point(&sim3.transform_point(&p));
        assert_relative_eq!(p_back, p, epsilon = 1e-10);
    }

    #[test]
    fn test_compose() {
        let s1 = Sim3 {
            translation: Vector3::new(1.0, 0.0, 0.0),
            scale: 2.0,
            ..Sim3::identity()
        };
        let s2 = Sim3 {
            translation: Vector3::new(0.0, 1.0, 0.0),
            scale: 3.0,
            ..Sim3::identity()
        };

        let composed = s1.compose(&s2);
        assert_relative_eq!(composed.scale, 6.0, epsilon = 1e-10);
        assert_relative_eq!(composed.translation, Vector3::new(1.0, 2.0, 0.0), epsilon = 1e-10);
        assert_relative_eq!(composed.to_matrix(), s1.to_matrix() * s2.to_matrix(), epsilon = 1e-10);
    }

    #[test]
    fn test_transform_pose_maps_camera_centre() {
        let sim3 = sample_sim3();
        let pose = SE3::new(
            UnitQuaternion::from_euler_angles(0.2, 0.0, -0.1),
            Vector3::new(0.5, 0.5, 0.0),
        );

        let mapped = sim3.transform_pose(&pose);
        assert_relative_eq!(mapped.translation, sim3.transform_point(&pose.translation), epsilon = 1e-12);
        assert_relative_eq!(
            mapped.rotation.angle_to(&(sim3.rotation * pose.rotation)),
            0.0,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_interpolate_endpoints_and_scale() {
        let a = Sim3::identity();
        let b = sample_sim3();

        let start = a.interpolate(&b, 0.0);
        let end = a.interpolate(&b, 1.0);
        assert_relative_eq!(start.scale, 1.0, epsilon = 1e-12);
        assert_relative_eq!(end.translation, b.translation, epsilon = 1e-12);
        assert_relative_eq!(end.scale, 2.0, epsilon = 1e-12);

        let mid = a.interpolate(&b, 0.5);
        assert_relative_eq!(mid.scale, 2.0_f64.sqrt(), epsilon = 1e-12);
        assert_relative_eq!(mid.rotation.angle(), std::f64::consts::FRAC_PI_4, epsilon = 1e-12);
    }

    #[test]
    fn test_validity() {
        assert!(sample_sim3().is_valid());
        assert!(!Sim3::from_scale(0.0).is_valid());
        assert!(!Sim3::from_scale(-1.0).is_valid());
        assert!(!Sim3::from_scale(f64::NAN).is_valid());
    }
}
