//! Coordinate frame conventions.
//!
//! - Camera frame: X right, Y down, Z forward (optical axis). Pixel
//!   projection assumes this convention.
//! - World frame: the continuous tracker's session-local frame. Its only
//!   assumed property is a known "up" axis (Y-up for most mobile world
//!   trackers), used to derive the gravity vector sent with relocalization
//!   requests.
//! - Anchor frame: the persistent map frame returned by the relocalization
//!   service.
//!
//! Transform names follow `target_T_source`:
//! ```text
//! p_world  = world_T_camera  * p_camera
//! p_anchor = anchor_T_world  * p_world
//! ```

use nalgebra::Vector3;

use super::SE3;

/// Unit gravity direction expressed in the camera frame.
///
/// Gravity points along `-world_up`; rotating it by `R_wc^T` expresses it in
/// the camera frame. Returns `None` for a zero `world_up`.
pub fn gravity_in_camera(world_t_camera: &SE3, world_up: &Vector3<f64>) -> Option<Vector3<f64>> {
    let down_world = -world_up.try_normalize(1e-12)?;
    Some(world_t_camera.rotation.inverse() * down_world)
}
