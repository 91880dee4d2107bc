//! PnP (Perspective-n-Point) with P3P minimal samples wrapped in RANSAC.
//!
//! Poses follow the crate convention: the returned pose maps camera-frame
//! points into the frame of the 3D points (e.g. `anchor_T_camera`).

use nalgebra::{Matrix2x3, Matrix3x6, Matrix6, Vector2, Vector3, Vector6};
use rand::Rng;

use crate::geometry::p3p::solve_p3p;
use crate::geometry::so3::{retract_left, skew};
use crate::geometry::SE3;
use crate::image::CameraModel;

/// Configuration for the PnP RANSAC solver.
#[derive(Debug, Clone)]
pub struct PnPConfig {
    /// Maximum number of RANSAC iterations.
    pub max_iterations: usize,
    /// Inlier threshold on reprojection error, in pixels.
    pub reprojection_threshold: f64,
    /// Minimum number of inliers for a pose to be accepted.
    pub min_inliers: usize,
    /// Probability of drawing at least one all-inlier sample.
    pub probability: f64,
    /// Gauss-Newton iterations when refining on the inlier set.
    pub refine_iterations: usize,
}

impl Default for PnPConfig {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            reprojection_threshold: 4.0,
            min_inliers: 12,
            probability: 0.99,
            refine_iterations: 10,
        }
    }
}

/// Result of PnP solving.
#[derive(Debug, Clone)]
pub struct PnPResult {
    /// Estimated camera pose in the points' frame.
    pub pose: SE3,
    /// Inlier mask per correspondence.
    pub inlier_mask: Vec<bool>,
    /// Number of `true` entries in `inlier_mask`.
    pub num_inliers: usize,
    /// Reprojection error per correspondence (pixels, infinite behind the camera).
    pub reproj_errors: Vec<f64>,
}

/// Solve PnP with RANSAC given 3D-2D correspondences.
///
/// Returns `None` when fewer than four correspondences are given or the best
/// hypothesis has fewer than `config.min_inliers` inliers.
pub fn solve_pnp_ransac<R: Rng>(
    points3d: &[Vector3<f64>],
    points2d: &[Vector2<f64>],
    camera: &CameraModel,
    config: &PnPConfig,
    rng: &mut R,
) -> Option<PnPResult> {
    let n = points3d.len();
    if n < 4 || n != points2d.len() {
        return None;
    }

    let bearings: Vec<Vector3<f64>> = points2d.iter().map(|p| camera.bearing(p)).collect();

    let mut best: Option<(SE3, usize)> = None;
    let mut max_iter = config.max_iterations;
    let mut iteration = 0;

    while iteration < max_iter {
        iteration += 1;
        let idx = sample_three_indices(rng, n);
        let world = [points3d[idx[0]], points3d[idx[1]], points3d[idx[2]]];
        let rays = [bearings[idx[0]], bearings[idx[1]], bearings[idx[2]]];

        for camera_t_world in solve_p3p(&world, &rays) {
            let count = count_inliers(points3d, points2d, camera, &camera_t_world, config);
            if best.as_ref().map_or(true, |(_, c)| count > *c) {
                best = Some((camera_t_world, count));

                if count >= config.min_inliers {
                    let ratio = count as f64 / n as f64;
                    let needed = compute_adaptive_iterations(ratio, config.probability, 3);
                    max_iter = max_iter.min(iteration.saturating_add(needed));
                }
            }
        }
    }

    let (camera_t_world, count) = best?;
    if count < config.min_inliers {
        return None;
    }

    // Refine on the inlier set, then re-classify with the refined pose.
    let (_, mask) = residuals(points3d, points2d, camera, &camera_t_world, config);
    let refined = refine_pose(points3d, points2d, &mask, camera, &camera_t_world, config.refine_iterations);
    let (errors, refined_mask) = residuals(points3d, points2d, camera, &refined, config);
    let refined_count = refined_mask.iter().filter(|&&m| m).count();

    let (pose_cw, reproj_errors, inlier_mask, num_inliers) = if refined_count >= count {
        (refined, errors, refined_mask, refined_count)
    } else {
        let (errors, mask) = residuals(points3d, points2d, camera, &camera_t_world, config);
        (camera_t_world, errors, mask, count)
    };

    Some(PnPResult {
        pose: pose_cw.inverse(),
        inlier_mask,
        num_inliers,
        reproj_errors,
    })
}

fn count_inliers(
    points3d: &[Vector3<f64>],
    points2d: &[Vector2<f64>],
    camera: &CameraModel,
    camera_t_world: &SE3,
    config: &PnPConfig,
) -> usize {
    let threshold_sq = config.reprojection_threshold * config.reprojection_threshold;
    points3d
        .iter()
        .zip(points2d.iter())
        .filter(|(p3, p2)| {
            camera
                .project(&camera_t_world.transform_point(p3))
                .map_or(false, |uv| (uv - *p2).norm_squared() < threshold_sq)
        })
        .count()
}

fn residuals(
    points3d: &[Vector3<f64>],
    points2d: &[Vector2<f64>],
    camera: &CameraModel,
    camera_t_world: &SE3,
    config: &PnPConfig,
) -> (Vec<f64>, Vec<bool>) {
    points3d
        .iter()
        .zip(points2d.iter())
        .map(|(p3, p2)| {
            let err = camera
                .project(&camera_t_world.transform_point(p3))
                .map_or(f64::INFINITY, |uv| (uv - p2).norm());
            (err, err < config.reprojection_threshold)
        })
        .unzip()
}

/// Gauss-Newton refinement of `camera_T_world` on the masked correspondences.
fn refine_pose(
    points3d: &[Vector3<f64>],
    points2d: &[Vector2<f64>],
    mask: &[bool],
    camera: &CameraModel,
    initial: &SE3,
    iterations: usize,
) -> SE3 {
    let mut pose = initial.clone();

    for _ in 0..iterations {
        let mut hessian = Matrix6::<f64>::zeros();
        let mut gradient = Vector6::<f64>::zeros();

        for ((p3, p2), _) in points3d
            .iter()
            .zip(points2d.iter())
            .zip(mask.iter())
            .filter(|(_, &m)| m)
        {
            let pc = pose.transform_point(p3);
            let Some(uv) = camera.project(&pc) else { continue };
            let r = uv - p2;

            let inv_z = 1.0 / pc.z;
            let d_proj = Matrix2x3::new(
                camera.fx * inv_z, 0.0, -camera.fx * pc.x * inv_z * inv_z,
                0.0, camera.fy * inv_z, -camera.fy * pc.y * inv_z * inv_z,
            );
            let mut d_point = Matrix3x6::<f64>::zeros();
            d_point.fixed_view_mut::<3, 3>(0, 0).copy_from(&(-skew(&pc)));
            d_point.fixed_view_mut::<3, 3>(0, 3).copy_from(&nalgebra::Matrix3::identity());

            let jac = d_proj * d_point;
            hessian += jac.transpose() * jac;
            gradient += jac.transpose() * r;
        }

        let Some(chol) = hessian.cholesky() else { break };
        let delta = -chol.solve(&gradient);
        pose = retract_left(&pose, &delta);

        if delta.norm() < 1e-10 {
            break;
        }
    }
    pose
}

/// Sample three unique random indices.
fn sample_three_indices(rng: &mut impl Rng, n: usize) -> [usize; 3] {
    let mut indices = [0usize; 3];
    indices[0] = rng.gen_range(0..n);

    loop {
        indices[1] = rng.gen_range(0..n);
        if indices[1] != indices[0] {
            break;
        }
    }

    loop {
        indices[2] = rng.gen_range(0..n);
        if indices[2] != indices[0] && indices[2] != indices[1] {
            break;
        }
    }

    indices
}

/// Number of RANSAC iterations needed for the given inlier ratio.
///
/// k = log(1 - p) / log(1 - w^n)
fn compute_adaptive_iterations(inlier_ratio: f64, probability: f64, sample_size: usize) -> usize {
    if inlier_ratio <= 0.0 {
        return usize::MAX;
    }
    if inlier_ratio >= 1.0 {
        return 1;
    }

    let w_n = inlier_ratio.powi(sample_size as i32);
    let log_denom = (1.0 - w_n).ln();
    if log_denom.abs() < 1e-10 {
        return 1;
    }

    let k = (1.0 - probability).ln() / log_denom;
    (k.ceil() as usize).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::UnitQuaternion;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn camera() -> CameraModel {
        CameraModel::new(400.0, 400.0, 320.0, 240.0, 640, 480)
    }

    fn scene(rng: &mut StdRng, n: usize) -> Vec<Vector3<f64>> {
        (0..n)
            .map(|_| {
                Vector3::new(
                    rng.gen_range(-2.0..2.0),
                    rng.gen_range(-1.5..1.5),
                    rng.gen_range(-1.0..1.0),
                )
            })
            .collect()
    }

    fn anchor_t_camera() -> SE3 {
        SE3::new(
            UnitQuaternion::from_euler_angles(0.05, 0.1, -0.2),
            Vector3::new(0.3, -0.2, -5.0),
        )
    }

    #[test]
    fn test_exact_correspondences() {
        let mut rng = StdRng::seed_from_u64(7);
        let cam = camera();
        let pose = anchor_t_camera();
        let points3d = scene(&mut rng, 40);
        let points2d: Vec<_> = points3d
            .iter()
            .map(|p| cam.project(&pose.inverse().transform_point(p)).unwrap())
            .collect();

        let result = solve_pnp_ransac(&points3d, &points2d, &cam, &PnPConfig::default(), &mut rng)
            .unwrap();

        assert_eq!(result.num_inliers, 40);
        let (dt, dr) = result.pose.distance_to(&pose);
        assert!(dt < 1e-6 && dr < 1e-6, "dt={} dr={}", dt, dr);
    }

    #[test]
    fn test_with_outliers() {
        let mut rng = StdRng::seed_from_u64(11);
        let cam = camera();
        let pose = anchor_t_camera();
        let points3d = scene(&mut rng, 60);
        let mut points2d: Vec<_> = points3d
            .iter()
            .map(|p| cam.project(&pose.inverse().transform_point(p)).unwrap())
            .collect();
        for p in points2d.iter_mut().take(15) {
            *p += Vector2::new(rng.gen_range(30.0..80.0), rng.gen_range(-80.0..-30.0));
        }

        let result = solve_pnp_ransac(&points3d, &points2d, &cam, &PnPConfig::default(), &mut rng)
            .unwrap();

        assert_eq!(result.num_inliers, 45);
        assert!(result.inlier_mask.iter().take(15).all(|&m| !m));
        let (dt, dr) = result.pose.distance_to(&pose);
        assert!(dt < 1e-4 && dr < 1e-4);
    }

    #[test]
    fn test_insufficient_consensus() {
        let mut rng = StdRng::seed_from_u64(3);
        let cam = camera();
        let points3d = scene(&mut rng, 20);
        let points2d: Vec<_> = (0..20)
            .map(|_| Vector2::new(rng.gen_range(0.0..640.0), rng.gen_range(0.0..480.0)))
            .collect();

        let config = PnPConfig {
            min_inliers: 15,
            ..Default::default()
        };
        assert!(solve_pnp_ransac(&points3d, &points2d, &cam, &config, &mut rng).is_none());
    }

    #[test]
    fn test_too_few_points() {
        let mut rng = StdRng::seed_from_u64(1);
        let cam = camera();
        let points3d = vec![Vector3::z(); 3];
        let points2d = vec![Vector2::new(320.0, 240.0); 3];
        assert!(solve_pnp_ransac(&points3d, &points2d, &cam, &PnPConfig::default(), &mut rng).is_none());
    }

    #[test]
    fn test_adaptive_iterations() {
        assert_eq!(compute_adaptive_iterations(1.0, 0.99, 3), 1);
        assert_eq!(compute_adaptive_iterations(0.0, 0.99, 3), usize::MAX);
        assert!(compute_adaptive_iterations(0.5, 0.99, 3) > compute_adaptive_iterations(0.9, 0.99, 3));
    }
}
