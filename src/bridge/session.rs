//! Frame-to-Frame Bridge.
//!
//! Keeps `anchor_T_camera` fresh between relocalizations. A session starts
//! from the 2D/3D correspondences of a relocalization result and follows the
//! 2D observations frame by frame with optical flow, re-solving the anchor
//! pose with P3P-RANSAC each time. The session ends as soon as too few points
//! survive, after which only relocalization updates the alignment.

use nalgebra::{Vector2, Vector3};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::debug;

use crate::config::BridgeConfig;
use crate::error::BridgeError;
use crate::geometry::{solve_pnp_ransac, Sim3, SE3};
use crate::history::AnchorPose;
use crate::image::{CameraModel, GrayImage, Pyramid};

use super::klt::KltTracker;

/// Per-session tracking state.
struct BridgeSession {
    pyramid: Pyramid,
    observations: Vec<Vector2<f64>>,
    points: Vec<Vector3<f64>>,
    initial_count: usize,
    timestamp: f64,
}

/// Result of one successful bridge step.
#[derive(Debug, Clone)]
pub struct BridgeUpdate {
    pub anchor_pose: AnchorPose,
    /// Correspondences carried into the next frame.
    pub feature_count: usize,
    pub inliers: usize,
}

pub struct FrameBridge {
    config: BridgeConfig,
    tracker: KltTracker,
    rng: StdRng,
    session: Option<BridgeSession>,
}

impl FrameBridge {
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            tracker: KltTracker::from_config(&config),
            rng: StdRng::seed_from_u64(config.rng_seed),
            config,
            session: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    pub fn feature_count(&self) -> usize {
        self.session.as_ref().map_or(0, |s| s.points.len())
    }

    /// Timestamp of the last frame the session consumed.
    pub fn last_timestamp(&self) -> Option<f64> {
        self.session.as_ref().map(|s| s.timestamp)
    }

    pub fn stop(&mut self) {
        self.session = None;
    }

    /// Start (or restart) a session from relocalization correspondences.
    ///
    /// `image_points` must be in the pixel frame of `image`. Returns the
    /// number of correspondences kept, or `None` if the set is too small to
    /// ever pass the survival threshold.
    pub fn start(
        &mut self,
        image: &GrayImage,
        timestamp: f64,
        object_points: &[Vector3<f64>],
        image_points: &[Vector2<f64>],
    ) -> Option<usize> {
        let (points, observations) = subsample(object_points, image_points, self.config.max_features);
        if points.len() < self.config.absolute_min_points || points.len() != observations.len() {
            self.session = None;
            return None;
        }

        let count = points.len();
        self.session = Some(BridgeSession {
            pyramid: Pyramid::build(image, self.config.pyramid_levels),
            observations,
            points,
            initial_count: count,
            timestamp,
        });
        Some(count)
    }

    /// Continue the session with a new frame.
    ///
    /// `world_t_camera` is the tracker's pose predicted for the frame and
    /// `anchor_t_world` the current alignment; together they predict where
    /// each anchor point should appear. Any error ends the session.
    pub fn track(
        &mut self,
        image: &GrayImage,
        camera: &CameraModel,
        timestamp: f64,
        world_t_camera: &SE3,
        anchor_t_world: &Sim3,
    ) -> Result<BridgeUpdate, BridgeError> {
        let Some(session) = self.session.take() else {
            return Err(BridgeError::NoTransform);
        };
        if !anchor_t_world.is_valid() {
            return Err(BridgeError::NoTransform);
        }

        // 1. Predict observations through the current alignment.
        let camera_t_anchor = anchor_t_world.transform_pose(world_t_camera).inverse();
        let predicted: Vec<Vector2<f64>> = session
            .points
            .iter()
            .zip(session.observations.iter())
            .map(|(p, prev)| {
                camera
                    .project(&camera_t_anchor.transform_point(p))
                    .map_or(*prev, |uv| camera.clamp(&uv))
            })
            .collect();

        // 2-3. Track and keep the survivors.
        let pyramid = Pyramid::build(image, self.config.pyramid_levels);
        let tracked = self.tracker.track_bidirectional(
            &session.pyramid,
            &pyramid,
            &session.observations,
            &predicted,
            self.config.search_radius,
            self.config.forward_backward_tolerance,
        );
        let (points, observations): (Vec<_>, Vec<_>) = session
            .points
            .iter()
            .zip(tracked.iter())
            .filter(|(_, t)| t.is_tracked())
            .map(|(p, t)| (*p, t.position))
            .unzip();

        // 4. Survival threshold.
        let required = self.config.required_points(session.initial_count);
        check_survivors(observations.len(), required)?;

        // 5. Robust pose.
        let pnp_config = self.config.pnp_config(required);
        let Some(result) = solve_pnp_ransac(&points, &observations, camera, &pnp_config, &mut self.rng) else {
            return Err(BridgeError::InsufficientConsensus {
                inliers: 0,
                required,
            });
        };
        if result.num_inliers < required {
            return Err(BridgeError::InsufficientConsensus {
                inliers: result.num_inliers,
                required,
            });
        }

        let (points, observations): (Vec<_>, Vec<_>) = points
            .into_iter()
            .zip(observations)
            .zip(result.inlier_mask.iter())
            .filter(|(_, &inlier)| inlier)
            .map(|(pair, _)| pair)
            .unzip();

        // 7. Keep within the feature budget.
        let (points, observations) = subsample(&points, &observations, self.config.max_features);
        let feature_count = points.len();

        debug!(
            tracked = tracked.len(),
            inliers = result.num_inliers,
            feature_count,
            "bridge step at {:.3}",
            timestamp
        );

        // 8. Current frame becomes the previous one.
        self.session = Some(BridgeSession {
            pyramid,
            observations,
            points,
            initial_count: session.initial_count,
            timestamp,
        });

        Ok(BridgeUpdate {
            anchor_pose: AnchorPose {
                timestamp,
                anchor_t_camera: result.pose,
            },
            feature_count,
            inliers: result.num_inliers,
        })
    }
}

/// Reject continuation when fewer than `required` points survived.
pub fn check_survivors(surviving: usize, required: usize) -> Result<(), BridgeError> {
    if surviving < required {
        return Err(BridgeError::TrackingLoss { surviving, required });
    }
    Ok(())
}

/// Evenly strided subset of at most `budget` correspondences, order preserved.
fn subsample(
    points: &[Vector3<f64>],
    observations: &[Vector2<f64>],
    budget: usize,
) -> (Vec<Vector3<f64>>, Vec<Vector2<f64>>) {
    let n = points.len().min(observations.len());
    if n <= budget {
        return (points[..n].to_vec(), observations[..n].to_vec());
    }
    (0..budget)
        .map(|k| k * n / budget)
        .map(|i| (points[i], observations[i]))
        .unzip()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::PlanarScene;
    use nalgebra::UnitQuaternion;
    use rand::Rng;

    fn camera() -> CameraModel {
        CameraModel::new(150.0, 150.0, 79.5, 59.5, 160, 120)
    }

    fn anchor_t_camera(step: usize) -> SE3 {
        let s = step as f64;
        SE3::new(
            UnitQuaternion::from_euler_angles(0.002 * s, -0.003 * s, 0.001 * s),
            Vector3::new(0.02 * s, -0.01 * s, -4.0 + 0.01 * s),
        )
    }

    /// Correspondences as a relocalization service would return them.
    fn seed(scene: &PlanarScene, pose: &SE3) -> (Vec<Vector3<f64>>, Vec<Vector2<f64>>) {
        scene.correspondences(&camera(), pose, 12, 16)
    }

    #[test]
    fn test_survival_threshold() {
        let mut rng = StdRng::seed_from_u64(17);
        for _ in 0..500 {
            let config = BridgeConfig {
                absolute_min_points: rng.gen_range(4..40),
                relative_min_fraction: rng.gen_range(0.0..1.0),
                ..Default::default()
            };
            let initial = rng.gen_range(0..300);
            let surviving = rng.gen_range(0..300);
            let required = config.required_points(initial);

            let threshold = (config.absolute_min_points as f64)
                .max(config.relative_min_fraction * initial as f64);
            let rejected = check_survivors(surviving, required).is_err();
            assert_eq!(rejected, (surviving as f64) < threshold);
        }
    }

    #[test]
    fn test_subsample() {
        let points: Vec<_> = (0..10).map(|i| Vector3::new(i as f64, 0.0, 0.0)).collect();
        let obs: Vec<_> = (0..10).map(|i| Vector2::new(i as f64, 0.0)).collect();

        let (p, o) = subsample(&points, &obs, 4);
        let xs: Vec<_> = p.iter().map(|p| p.x).collect();
        assert_eq!(xs, vec![0.0, 2.0, 5.0, 7.0]);
        assert_eq!(o.len(), 4);

        let (p, _) = subsample(&points, &obs, 20);
        assert_eq!(p.len(), 10);
    }

    #[test]
    fn test_start_requires_enough_points() {
        let scene = PlanarScene::default();
        let mut bridge = FrameBridge::new(BridgeConfig::default());
        let image = scene.render(&camera(), &anchor_t_camera(0));

        let few_points = vec![Vector3::zeros(); 5];
        let few_obs = vec![Vector2::zeros(); 5];
        assert_eq!(bridge.start(&image, 0.0, &few_points, &few_obs), None);
        assert!(!bridge.is_active());

        let (points, obs) = seed(&scene, &anchor_t_camera(0));
        assert_eq!(bridge.start(&image, 0.0, &points, &obs), Some(100));
        assert_eq!(bridge.feature_count(), 100);
        assert_eq!(bridge.last_timestamp(), Some(0.0));
    }

    #[test]
    fn test_tracks_camera_motion() {
        let scene = PlanarScene::default();
        let cam = camera();
        let mut bridge = FrameBridge::new(BridgeConfig::default());

        let start_pose = anchor_t_camera(0);
        let (points, obs) = seed(&scene, &start_pose);
        bridge.start(&scene.render(&cam, &start_pose), 0.0, &points, &obs).unwrap();

        // World frame equals anchor frame; prediction comes straight from truth.
        let anchor_t_world = Sim3::identity();
        for step in 1..=5 {
            let truth = anchor_t_camera(step);
            let image = scene.render(&cam, &truth);
            let update = bridge
                .track(&image, &cam, step as f64 * 0.1, &truth, &anchor_t_world)
                .unwrap();

            let (dt, dr) = update.anchor_pose.anchor_t_camera.distance_to(&truth);
            assert!(dt < 0.02 && dr < 0.01, "step {}: dt={} dr={}", step, dt, dr);
            assert!(update.feature_count >= 80);
            assert_eq!(bridge.feature_count(), update.feature_count);
        }
    }

    #[test]
    fn test_textureless_frame_aborts_session() {
        let scene = PlanarScene::default();
        let cam = camera();
        let mut bridge = FrameBridge::new(BridgeConfig::default());
        let pose = anchor_t_camera(0);
        let (points, obs) = seed(&scene, &pose);
        bridge.start(&scene.render(&cam, &pose), 0.0, &points, &obs).unwrap();

        let blank = GrayImage::from_fn(160, 120, |_, _| 100);
        let result = bridge.track(&blank, &cam, 0.1, &pose, &Sim3::identity());

        assert!(matches!(
            result,
            Err(BridgeError::TrackingLoss { surviving: 0, required: 30 })
        ));
        assert!(!bridge.is_active());
    }

    #[test]
    fn test_track_without_session() {
        let mut bridge = FrameBridge::new(BridgeConfig::default());
        let image = GrayImage::new(160, 120);
        let result = bridge.track(&image, &camera(), 0.0, &SE3::identity(), &Sim3::identity());
        assert_eq!(result.unwrap_err(), BridgeError::NoTransform);
    }
}
