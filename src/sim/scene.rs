//! Textured planar scene for synthetic frames and correspondences.

use nalgebra::{Vector2, Vector3};

use crate::geometry::SE3;
use crate::image::{CameraModel, GrayImage};

/// Pixels kept clear of the border when sampling correspondences.
const BORDER_MARGIN: f64 = 12.0;

/// The plane `z = 0` of the anchor frame, textured with a sum of sinusoids
/// so every patch has gradient in two directions.
#[derive(Debug, Clone)]
pub struct PlanarScene {
    /// Texture frequency multiplier, radians per metre for the base term.
    pub frequency: f64,
}

impl Default for PlanarScene {
    fn default() -> Self {
        Self { frequency: 11.6 }
    }
}

impl PlanarScene {
    /// Intensity at plane coordinates `(u, v)`.
    pub fn intensity(&self, u: f64, v: f64) -> f64 {
        let k = self.frequency;
        128.0
            + 45.0 * (k * u + 0.2).sin() * (0.74 * k * v).cos()
            + 35.0 * (0.55 * k * u - 0.94 * k * v).sin()
            + 20.0 * (1.32 * k * v + 0.42 * k * u).cos()
    }

    /// Plane point seen through `pixel`, if the ray hits the plane in front of the camera.
    pub fn intersect(&self, camera: &CameraModel, anchor_t_camera: &SE3, pixel: &Vector2<f64>) -> Option<Vector3<f64>> {
        let origin = anchor_t_camera.translation;
        let direction = anchor_t_camera.rotation * camera.bearing(pixel);
        if direction.z.abs() < 1e-9 {
            return None;
        }
        let lambda = -origin.z / direction.z;
        (lambda > 0.0).then(|| origin + direction * lambda)
    }

    pub fn render(&self, camera: &CameraModel, anchor_t_camera: &SE3) -> GrayImage {
        GrayImage::from_fn(camera.width, camera.height, |x, y| {
            let pixel = Vector2::new(x as f64, y as f64);
            match self.intersect(camera, anchor_t_camera, &pixel) {
                Some(p) => self.intensity(p.x, p.y).clamp(0.0, 255.0) as u8,
                None => 0,
            }
        })
    }

    /// Anchor-frame points and their pixels on a `rows` x `cols` grid.
    pub fn correspondences(
        &self,
        camera: &CameraModel,
        anchor_t_camera: &SE3,
        rows: usize,
        cols: usize,
    ) -> (Vec<Vector3<f64>>, Vec<Vector2<f64>>) {
        let span_x = camera.width as f64 - 1.0 - 2.0 * BORDER_MARGIN;
        let span_y = camera.height as f64 - 1.0 - 2.0 * BORDER_MARGIN;
        let step = |span: f64, n: usize| if n > 1 { span / (n - 1) as f64 } else { 0.0 };
        let (dx, dy) = (step(span_x, cols), step(span_y, rows));

        let mut points = Vec::with_capacity(rows * cols);
        let mut pixels = Vec::with_capacity(rows * cols);
        for j in 0..rows {
            for i in 0..cols {
                let pixel = Vector2::new(BORDER_MARGIN + dx * i as f64, BORDER_MARGIN + dy * j as f64);
                if let Some(point) = self.intersect(camera, anchor_t_camera, &pixel) {
                    points.push(point);
                    pixels.push(pixel);
                }
            }
        }
        (points, pixels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::UnitQuaternion;

    #[test]
    fn test_correspondences_reproject() {
        let scene = PlanarScene::default();
        let camera = CameraModel::new(150.0, 150.0, 79.5, 59.5, 160, 120);
        let pose = SE3::new(
            UnitQuaternion::from_euler_angles(0.05, -0.04, 0.1),
            Vector3::new(0.2, -0.1, -4.0),
        );

        let (points, pixels) = scene.correspondences(&camera, &pose, 6, 8);
        assert_eq!(points.len(), 48);
        for (p, uv) in points.iter().zip(pixels.iter()) {
            assert_relative_eq!(p.z, 0.0, epsilon = 1e-9);
            let projected = camera.project(&pose.inverse().transform_point(p)).unwrap();
            assert_relative_eq!(projected, *uv, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_render_is_textured() {
        let scene = PlanarScene::default();
        let camera = CameraModel::new(150.0, 150.0, 79.5, 59.5, 160, 120);
        let pose = SE3::new(UnitQuaternion::identity(), Vector3::new(0.0, 0.0, -4.0));

        let image = scene.render(&camera, &pose);
        let min = image.as_slice().iter().min().copied().unwrap_or(0);
        let max = image.as_slice().iter().max().copied().unwrap_or(0);
        assert!(max - min > 100);
    }
}
