//! Ground-truth trajectory tying the anchor frame to a simulated world tracker.

use nalgebra::{UnitQuaternion, Vector3};

use crate::geometry::{Sim3, SE3};
use crate::image::CameraModel;
use crate::system::Frame;

use super::PlanarScene;

/// A camera orbiting slowly in front of the textured plane.
///
/// The world tracker's frame differs from the anchor frame by
/// `anchor_t_world`, including a scale factor.
#[derive(Debug, Clone)]
pub struct Scenario {
    pub scene: PlanarScene,
    pub camera: CameraModel,
    pub anchor_t_world: Sim3,
}

impl Default for Scenario {
    fn default() -> Self {
        Self {
            scene: PlanarScene::default(),
            camera: CameraModel::new(300.0, 300.0, 159.5, 119.5, 320, 240),
            anchor_t_world: Sim3 {
                rotation: UnitQuaternion::from_euler_angles(0.0, 0.6, 0.0),
                translation: Vector3::new(1.5, -0.4, 2.0),
                scale: 1.25,
            },
        }
    }
}

impl Scenario {
    pub fn anchor_t_camera(&self, t: f64) -> SE3 {
        SE3::new(
            UnitQuaternion::from_euler_angles(0.02 * (0.9 * t).sin(), 0.03 * (0.7 * t).sin(), 0.01 * t),
            Vector3::new(
                0.3 * (0.5 * t).sin(),
                0.2 * (0.4 * t).cos() - 0.2,
                -4.0 + 0.1 * (0.3 * t).sin(),
            ),
        )
    }

    /// What the world tracker reports at `t`.
    pub fn world_t_camera(&self, t: f64) -> SE3 {
        self.anchor_t_world.inverse().transform_pose(&self.anchor_t_camera(t))
    }

    pub fn frame(&self, t: f64) -> Frame {
        Frame {
            timestamp: t,
            image: self.scene.render(&self.camera, &self.anchor_t_camera(t)),
            camera: self.camera,
        }
    }
}
