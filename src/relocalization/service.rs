//! Relocalization service interface.

use nalgebra::{Vector2, Vector3};

use crate::error::RelocalizationError;
use crate::geometry::SE3;
use crate::image::{CameraModel, GrayImage};

use super::MapConfiguration;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GpsFix {
    pub latitude: f64,
    pub longitude: f64,
}

/// One image plus the context the service needs to localize it.
#[derive(Debug, Clone)]
pub struct RelocalizationRequest {
    /// Capture timestamp of the image on the world tracker's clock.
    pub timestamp: f64,
    /// Downsampled image; `camera` describes this image, not the original.
    pub image: GrayImage,
    pub camera: CameraModel,
    pub gps: GpsFix,
    /// Unit gravity direction in the camera frame.
    pub gravity: Vector3<f64>,
    pub map: MapConfiguration,
}

/// Successful relocalization: the camera pose in the anchor frame plus the
/// 2D/3D correspondences that support it.
#[derive(Debug, Clone)]
pub struct RelocalizationResponse {
    pub anchor_t_camera: SE3,
    /// Points in the anchor frame.
    pub object_points: Vec<Vector3<f64>>,
    /// Observations in the pixel frame of the request image.
    pub image_points: Vec<Vector2<f64>>,
}

impl RelocalizationResponse {
    pub fn correspondence_count(&self) -> usize {
        self.object_points.len()
    }

    pub fn validate(&self) -> Result<(), RelocalizationError> {
        if self.object_points.len() != self.image_points.len() {
            return Err(RelocalizationError::MalformedResponse {
                object_points: self.object_points.len(),
                image_points: self.image_points.len(),
            });
        }
        Ok(())
    }
}

/// Synchronous relocalization backend. Calls block until the service answers.
pub trait RelocalizationService: Send + Sync {
    fn relocalize(
        &self,
        request: &RelocalizationRequest,
    ) -> Result<RelocalizationResponse, RelocalizationError>;
}
