//! Pinhole camera model (no distortion; frame sources deliver rectified images).

use nalgebra::{Vector2, Vector3};
use serde::{Deserialize, Serialize};

/// Minimum depth for a point to be considered in front of the camera.
const MIN_DEPTH: f64 = 1e-6;

/// Pinhole intrinsics together with the image size they refer to.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraModel {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
    pub width: usize,
    pub height: usize,
}

impl CameraModel {
    pub fn new(fx: f64, fy: f64, cx: f64, cy: f64, width: usize, height: usize) -> Self {
        Self {
            fx,
            fy,
            cx,
            cy,
            width,
            height,
        }
    }

    /// Intrinsics for an image box-downsampled by an integer factor.
    ///
    /// Pixel centres move as `u' = (u + 0.5) / f - 0.5`.
    pub fn downsampled(&self, factor: usize) -> Self {
        if factor <= 1 {
            return *self;
        }
        let f = factor as f64;
        Self {
            fx: self.fx / f,
            fy: self.fy / f,
            cx: (self.cx + 0.5) / f - 0.5,
            cy: (self.cy + 0.5) / f - 0.5,
            width: self.width / factor,
            height: self.height / factor,
        }
    }

    /// Project a camera-frame point. `None` if it lies behind the camera.
    pub fn project(&self, p_cam: &Vector3<f64>) -> Option<Vector2<f64>> {
        if p_cam.z <= MIN_DEPTH {
            return None;
        }
        Some(Vector2::new(
            self.fx * p_cam.x / p_cam.z + self.cx,
            self.fy * p_cam.y / p_cam.z + self.cy,
        ))
    }

    /// Unit bearing vector through a pixel.
    pub fn bearing(&self, pixel: &Vector2<f64>) -> Vector3<f64> {
        Vector3::new(
            (pixel.x - self.cx) / self.fx,
            (pixel.y - self.cy) / self.fy,
            1.0,
        )
        .normalize()
    }

    pub fn contains(&self, pixel: &Vector2<f64>) -> bool {
        pixel.x >= 0.0
            && pixel.y >= 0.0
            && pixel.x <= (self.width as f64 - 1.0)
            && pixel.y <= (self.height as f64 - 1.0)
    }

    /// Clamp a pixel into the image rectangle.
    pub fn clamp(&self, pixel: &Vector2<f64>) -> Vector2<f64> {
        Vector2::new(
            pixel.x.clamp(0.0, (self.width as f64 - 1.0).max(0.0)),
            pixel.y.clamp(0.0, (self.height as f64 - 1.0).max(0.0)),
        )
    }
}
