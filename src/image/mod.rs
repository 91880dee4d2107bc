//! Image containers, resampling, Gaussian pyramids and the pinhole camera model.

pub mod buffer;
pub mod camera;
pub mod pyramid;

pub use buffer::{interpolate_bilinear, GrayImage, Image, Pixel};
pub use camera::CameraModel;
pub use pyramid::Pyramid;
