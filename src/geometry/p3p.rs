//! Minimal perspective-three-point solver (Grunert's method).
//!
//! Given three world points and their unit bearing vectors, the distances
//! `s_i` from the camera centre to each point satisfy the law of cosines on
//! the three triangles formed at the camera centre. Substituting
//! `s2 = u * s1`, `s3 = v * s1` reduces the system to a quartic in `v`.
//! Each positive real root yields one candidate pose, recovered by aligning
//! the world points with `s_i * bearing_i` in the camera frame.
//!
//! Reference: Haralick et al., "Review and analysis of solutions of the three
//! point perspective pose estimation problem", IJCV 1994.

use nalgebra::{Matrix4, Vector3};

use super::absolute_orientation::solve_absolute_orientation;
use super::SE3;

/// Leading coefficient magnitude below which the quartic is treated as degenerate.
const MIN_LEADING_COEFF: f64 = 1e-12;

/// Imaginary part (relative) below which an eigenvalue counts as a real root.
const REAL_ROOT_TOLERANCE: f64 = 1e-4;

/// Solve P3P for one minimal sample.
///
/// Returns up to four candidate `camera_T_world` poses (world → camera).
/// Degenerate samples (collinear points, coincident bearings) return no
/// candidates.
pub fn solve_p3p(world: &[Vector3<f64>; 3], bearings: &[Vector3<f64>; 3]) -> Vec<SE3> {
    let a = (world[1] - world[2]).norm();
    let b = (world[0] - world[2]).norm();
    let c = (world[0] - world[1]).norm();
    if a < 1e-9 || b < 1e-9 || c < 1e-9 {
        return Vec::new();
    }

    let cos_alpha = bearings[1].dot(&bearings[2]);
    let cos_beta = bearings[0].dot(&bearings[2]);
    let cos_gamma = bearings[0].dot(&bearings[1]);

    let (a2, b2, c2) = (a * a, b * b, c * c);
    let amc = (a2 - c2) / b2;
    let apc = (a2 + c2) / b2;

    let coeffs = [
        (1.0 + amc).powi(2) - 4.0 * a2 / b2 * cos_gamma * cos_gamma,
        4.0 * (-amc * (1.0 + amc) * cos_beta + 2.0 * a2 / b2 * cos_gamma * cos_gamma * cos_beta
            - (1.0 - apc) * cos_alpha * cos_gamma),
        2.0 * (amc * amc - 1.0
            + 2.0 * amc * amc * cos_beta * cos_beta
            + 2.0 * (b2 - c2) / b2 * cos_alpha * cos_alpha
            - 4.0 * apc * cos_alpha * cos_beta * cos_gamma
            + 2.0 * (b2 - a2) / b2 * cos_gamma * cos_gamma),
        4.0 * (amc * (1.0 - amc) * cos_beta - (1.0 - apc) * cos_alpha * cos_gamma
            + 2.0 * c2 / b2 * cos_alpha * cos_alpha * cos_beta),
        (amc - 1.0).powi(2) - 4.0 * c2 / b2 * cos_alpha * cos_alpha,
    ];

    let mut poses = Vec::with_capacity(4);
    for v in real_quartic_roots(&coeffs) {
        if v <= 0.0 {
            continue;
        }
        let denom = 2.0 * (cos_gamma - v * cos_alpha);
        if denom.abs() < 1e-12 {
            continue;
        }
        let u = ((-1.0 + amc) * v * v - 2.0 * amc * cos_beta * v + 1.0 + amc) / denom;
        if u <= 0.0 {
            continue;
        }

        let d = 1.0 + v * v - 2.0 * v * cos_beta;
        if d <= 0.0 {
            continue;
        }
        let s1 = (b2 / d).sqrt();
        let cam_points = [bearings[0] * s1, bearings[1] * (u * s1), bearings[2] * (v * s1)];

        if let Ok(sim3) = solve_absolute_orientation(world, &cam_points, true) {
            poses.push(sim3.to_se3());
        }
    }
    poses
}

/// Real roots of `c[4] v^4 + c[3] v^3 + c[2] v^2 + c[1] v + c[0]`.
///
/// Roots come from the companion-matrix eigenvalues and are polished with a
/// few Newton steps on the original polynomial.
fn real_quartic_roots(c: &[f64; 5]) -> Vec<f64> {
    let lead = c[4];
    if lead.abs() < MIN_LEADING_COEFF {
        return Vec::new();
    }
    let a3 = c[3] / lead;
    let a2 = c[2] / lead;
    let a1 = c[1] / lead;
    let a0 = c[0] / lead;

    let companion = Matrix4::new(
        -a3, -a2, -a1, -a0,
        1.0, 0.0, 0.0, 0.0,
        0.0, 1.0, 0.0, 0.0,
        0.0, 0.0, 1.0, 0.0,
    );

    companion
        .complex_eigenvalues()
        .iter()
        .filter(|z| z.im.abs() <= REAL_ROOT_TOLERANCE * (1.0 + z.re.abs()))
        .map(|z| polish_root(c, z.re))
        .collect()
}

fn polish_root(c: &[f64; 5], mut x: f64) -> f64 {
    for _ in 0..3 {
        let f = (((c[4] * x + c[3]) * x + c[2]) * x + c[1]) * x + c[0];
        let df = ((4.0 * c[4] * x + 3.0 * c[3]) * x + 2.0 * c[2]) * x + c[1];
        if df.abs() < 1e-15 {
            break;
        }
        x -= f / df;
    }
    x
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::UnitQuaternion;

    #[test]
    fn test_quartic_roots() {
        // (v - 1)(v - 2)(v + 3)(v - 0.5) = v^4 - 0.5 v^3 - 7 v^2 + 9.5 v - 3
        let roots = real_quartic_roots(&[-3.0, 9.5, -7.0, -0.5, 1.0]);
        let mut roots = roots;
        roots.sort_by(|a, b| a.total_cmp(b));

        assert_eq!(roots.len(), 4);
        assert_relative_eq!(roots[0], -3.0, epsilon = 1e-9);
        assert_relative_eq!(roots[1], 0.5, epsilon = 1e-9);
        assert_relative_eq!(roots[2], 1.0, epsilon = 1e-9);
        assert_relative_eq!(roots[3], 2.0, epsilon = 1e-9);
    }

    #[test]
    fn test_recovers_true_pose_among_candidates() {
        let camera_t_world = SE3::new(
            UnitQuaternion::from_euler_angles(0.1, -0.2, 0.3),
            Vector3::new(0.2, -0.1, 4.0),
        );
        let world = [
            Vector3::new(-1.0, 0.5, 0.2),
            Vector3::new(1.2, 0.8, -0.3),
            Vector3::new(0.1, -1.1, 0.4),
        ];
        let bearings = [
            camera_t_world.transform_point(&world[0]).normalize(),
            camera_t_world.transform_point(&world[1]).normalize(),
            camera_t_world.transform_point(&world[2]).normalize(),
        ];

        let candidates = solve_p3p(&world, &bearings);
        assert!(!candidates.is_empty());

        let best = candidates
            .iter()
            .map(|pose| pose.distance_to(&camera_t_world))
            .fold(f64::INFINITY, |acc, (dt, dr)| acc.min(dt + dr));
        assert!(best < 1e-6, "closest candidate error {}", best);
    }

    #[test]
    fn test_degenerate_sample() {
        let world = [Vector3::zeros(), Vector3::zeros(), Vector3::x()];
        let bearings = [Vector3::z(), Vector3::z(), Vector3::z()];
        assert!(solve_p3p(&world, &bearings).is_empty());
    }
}
