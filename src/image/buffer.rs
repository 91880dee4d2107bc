//! Runtime-sized, row-major image container generic over pixel type.

/// Types that can be stored in an [`Image`].
pub trait Pixel: Copy + Default + Send + Sync + 'static {
    fn to_f32(self) -> f32;
    fn from_f32(v: f32) -> Self;
}

impl Pixel for u8 {
    #[inline]
    fn to_f32(self) -> f32 {
        self as f32
    }

    #[inline]
    fn from_f32(v: f32) -> Self {
        v.clamp(0.0, 255.0).round() as u8
    }
}

impl Pixel for f32 {
    #[inline]
    fn to_f32(self) -> f32 {
        self
    }

    #[inline]
    fn from_f32(v: f32) -> Self {
        v
    }
}

/// A 2D image, contiguous rows without padding.
#[derive(Debug, Clone, PartialEq)]
pub struct Image<T: Pixel> {
    data: Vec<T>,
    width: usize,
    height: usize,
}

/// 8-bit luminance image as delivered by frame sources.
pub type GrayImage = Image<u8>;

impl<T: Pixel> Image<T> {
    /// Zero-filled image.
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            data: vec![T::default(); width * height],
            width,
            height,
        }
    }

    /// Wrap an existing buffer. Returns `None` if the length does not match.
    pub fn from_vec(width: usize, height: usize, data: Vec<T>) -> Option<Self> {
        if data.len() != width * height {
            return None;
        }
        Some(Self {
            data,
            width,
            height,
        })
    }

    /// Build an image by evaluating `f(x, y)` at every pixel.
    pub fn from_fn(width: usize, height: usize, mut f: impl FnMut(usize, usize) -> T) -> Self {
        let mut data = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                data.push(f(x, y));
            }
        }
        Self {
            data,
            width,
            height,
        }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> Option<T> {
        if x < self.width && y < self.height {
            Some(self.data[y * self.width + x])
        } else {
            None
        }
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, value: T) {
        if x < self.width && y < self.height {
            self.data[y * self.width + x] = value;
        }
    }

    /// Pixel access with coordinates clamped to the border.
    #[inline]
    pub fn get_clamped(&self, x: isize, y: isize) -> T {
        let cx = x.clamp(0, self.width as isize - 1) as usize;
        let cy = y.clamp(0, self.height as isize - 1) as usize;
        self.data[cy * self.width + cx]
    }

    /// Convert every pixel to f32.
    pub fn to_f32(&self) -> Image<f32> {
        Image {
            data: self.data.iter().map(|p| p.to_f32()).collect(),
            width: self.width,
            height: self.height,
        }
    }

    /// Box-filter downsample by an integer factor.
    ///
    /// Output dimensions are `floor(dim / factor)`; trailing rows/columns that
    /// do not fill a whole block are dropped. Factor 1 returns a copy.
    pub fn downsample(&self, factor: usize) -> Self {
        if factor <= 1 {
            return self.clone();
        }
        let out_w = self.width / factor;
        let out_h = self.height / factor;
        let norm = 1.0 / (factor * factor) as f32;

        Self::from_fn(out_w, out_h, |ox, oy| {
            let mut acc = 0.0f32;
            for dy in 0..factor {
                let row = (oy * factor + dy) * self.width;
                for dx in 0..factor {
                    acc += self.data[row + ox * factor + dx].to_f32();
                }
            }
            T::from_f32(acc * norm)
        })
    }
}

/// Smallest integer factor that brings the longer image side to at most `max_dimension`.
pub fn downsample_factor(width: usize, height: usize, max_dimension: usize) -> usize {
    let longest = width.max(height);
    if max_dimension == 0 || longest <= max_dimension {
        return 1;
    }
    longest.div_ceil(max_dimension)
}

/// Bilinear sample with coordinates clamped to the image.
pub fn interpolate_bilinear(img: &Image<f32>, x: f32, y: f32) -> f32 {
    if img.is_empty() {
        return 0.0;
    }
    let max_x = (img.width - 1) as f32;
    let max_y = (img.height - 1) as f32;
    let x = x.clamp(0.0, max_x);
    let y = y.clamp(0.0, max_y);

    let x0 = x.floor() as usize;
    let y0 = y.floor() as usize;
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;
    let x1 = (x0 + 1).min(img.width - 1);
    let y1 = (y0 + 1).min(img.height - 1);

    let p00 = img.data[y0 * img.width + x0];
    let p10 = img.data[y0 * img.width + x1];
    let p01 = img.data[y1 * img.width + x0];
    let p11 = img.data[y1 * img.width + x1];

    (1.0 - fx) * (1.0 - fy) * p00 + fx * (1.0 - fy) * p10 + (1.0 - fx) * fy * p01 + fx * fy * p11
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_from_vec_checks_length() {
        assert!(GrayImage::from_vec(4, 3, vec![0; 12]).is_some());
        assert!(GrayImage::from_vec(4, 3, vec![0; 11]).is_none());
    }

    #[test]
    fn test_downsample_averages_blocks() {
        let img = GrayImage::from_fn(4, 2, |x, _| if x < 2 { 10 } else { 30 });
        let half = img.downsample(2);

        assert_eq!((half.width(), half.height()), (2, 1));
        assert_eq!(half.get(0, 0), Some(10));
        assert_eq!(half.get(1, 0), Some(30));
    }

    #[test]
    fn test_downsample_factor() {
        assert_eq!(downsample_factor(640, 480, 640), 1);
        assert_eq!(downsample_factor(1920, 1080, 640), 3);
        assert_eq!(downsample_factor(1921, 1080, 640), 4);
        assert_eq!(downsample_factor(100, 100, 0), 1);
    }

    #[test]
    fn test_bilinear_midpoint_and_clamp() {
        let img = Image::<f32>::from_fn(2, 2, |x, y| (x + 2 * y) as f32);

        assert_relative_eq!(interpolate_bilinear(&img, 0.5, 0.5), 1.5, epsilon = 1e-6);
        assert_relative_eq!(interpolate_bilinear(&img, -3.0, 0.0), 0.0, epsilon = 1e-6);
        assert_relative_eq!(interpolate_bilinear(&img, 9.0, 9.0), 3.0, epsilon = 1e-6);
    }
}
