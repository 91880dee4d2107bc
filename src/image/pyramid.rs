//! Gaussian image pyramid for coarse-to-fine optical flow.
//!
//! Each level blurs the previous one with a 5-tap binomial kernel
//! `[1 4 6 4 1] / 16` and keeps every other pixel.

use super::buffer::{Image, Pixel};

const KERNEL: [f32; 5] = [1.0 / 16.0, 4.0 / 16.0, 6.0 / 16.0, 4.0 / 16.0, 1.0 / 16.0];

/// Smallest side a pyramid level may have.
const MIN_LEVEL_SIZE: usize = 8;

/// `levels[0]` is the input at full resolution; `levels[n]` is ~`1/2^n` size.
#[derive(Debug, Clone)]
pub struct Pyramid {
    pub levels: Vec<Image<f32>>,
}

impl Pyramid {
    /// Build up to `num_levels` levels, stopping early once a level would be
    /// smaller than 8 pixels on either side.
    pub fn build<T: Pixel>(src: &Image<T>, num_levels: usize) -> Self {
        let mut levels = Vec::with_capacity(num_levels.max(1));
        levels.push(src.to_f32());

        while levels.len() < num_levels {
            let Some(prev) = levels.last() else { break };
            if prev.width() / 2 < MIN_LEVEL_SIZE || prev.height() / 2 < MIN_LEVEL_SIZE {
                break;
            }
            let down = downsample_2x(&blur(prev));
            levels.push(down);
        }

        Self { levels }
    }

    pub fn num_levels(&self) -> usize {
        self.levels.len()
    }

    /// Full-resolution level.
    pub fn base(&self) -> &Image<f32> {
        &self.levels[0]
    }
}

/// Separable binomial blur with clamped borders.
fn blur(img: &Image<f32>) -> Image<f32> {
    let horizontal = Image::from_fn(img.width(), img.height(), |x, y| {
        KERNEL
            .iter()
            .enumerate()
            .map(|(k, w)| w * img.get_clamped(x as isize + k as isize - 2, y as isize))
            .sum::<f32>()
    });
    Image::from_fn(img.width(), img.height(), |x, y| {
        KERNEL
            .iter()
            .enumerate()
            .map(|(k, w)| w * horizontal.get_clamped(x as isize, y as isize + k as isize - 2))
            .sum::<f32>()
    })
}

fn downsample_2x(img: &Image<f32>) -> Image<f32> {
    Image::from_fn(img.width() / 2, img.height() / 2, |x, y| {
        img.get_clamped(2 * x as isize, 2 * y as isize)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_level_sizes() {
        let img = Image::<u8>::new(100, 60);
        let pyr = Pyramid::build(&img, 4);

        assert_eq!(pyr.num_levels(), 3);
        assert_eq!((pyr.levels[1].width(), pyr.levels[1].height()), (50, 30));
        assert_eq!((pyr.levels[2].width(), pyr.levels[2].height()), (25, 15));
    }

    #[test]
    fn test_constant_image_preserved() {
        let img = Image::<u8>::from_fn(64, 64, |_, _| 77);
        let pyr = Pyramid::build(&img, 3);
        for level in &pyr.levels {
            assert_relative_eq!(level.get(3, 3).unwrap(), 77.0, epsilon = 1e-4);
        }
    }

    #[test]
    fn test_blur_spreads_impulse_with_binomial_weights() {
        let mut img = Image::<f32>::new(9, 9);
        img.set(4, 4, 256.0);
        let blurred = blur(&img);

        assert_relative_eq!(blurred.get(4, 4).unwrap(), 36.0, epsilon = 1e-4);
        assert_relative_eq!(blurred.get(5, 4).unwrap(), 24.0, epsilon = 1e-4);
        assert_relative_eq!(blurred.get(6, 6).unwrap(), 1.0, epsilon = 1e-4);
        assert_relative_eq!(blurred.get(7, 4).unwrap(), 0.0, epsilon = 1e-6);
        let total: f32 = blurred.as_slice().iter().sum();
        assert_relative_eq!(total, 256.0, epsilon = 1e-3);
    }
}
