//! Preprocessing from a grayscale raster to the network input tensor.

use burn::tensor::{backend::Backend, Tensor, TensorData};
use image::{GrayImage, Luma};

use crate::{INPUT_SIZE, MNIST_MEAN, MNIST_STD};

/// Turns decoded images into normalized `[1, 1, 28, 28]` tensors
#[derive(Debug, Clone, Copy)]
pub struct Preprocessor {
    size: u32,
    mean: f32,
    std: f32,
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self {
            size: INPUT_SIZE as u32,
            mean: MNIST_MEAN,
            std: MNIST_STD,
        }
    }
}

impl Preprocessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resize the full frame to the network input size (aspect ratio is not kept)
    pub fn resize(&self, img: &GrayImage) -> GrayImage {
        if img.dimensions() == (self.size, self.size) {
            return img.clone();
        }
        bilinear_resize(img, self.size, self.size)
    }

    /// Row-major normalized pixel values of the resized image
    pub fn normalized_pixels(&self, img: &GrayImage) -> Vec<f32> {
        self.resize(img)
            .pixels()
            .map(|p| (p.0[0] as f32 / 255.0 - self.mean) / self.std)
            .collect()
    }

    /// Build the `[1, 1, 28, 28]` input tensor on `device`
    pub fn transform<B: Backend>(&self, img: &GrayImage, device: &B::Device) -> Tensor<B, 4> {
        let size = self.size as usize;
        let data = TensorData::new(self.normalized_pixels(img), [1, 1, size, size]);
        Tensor::from_data(data, device)
    }
}

/// Bilinear resize with anti-aliasing, matching PIL's `Image.resize(size, BILINEAR)`.
///
/// When downscaling, the triangle filter's support grows with the scale factor so
/// every source pixel contributes. The filter is separable: rows are resampled
/// first into a float buffer, then columns, so the cost stays linear in the
/// source size.
fn bilinear_resize(src: &GrayImage, target_width: u32, target_height: u32) -> GrayImage {
    let (src_width, src_height) = (src.width() as usize, src.height() as usize);
    let (dst_width, dst_height) = (target_width as usize, target_height as usize);

    let mut dst = GrayImage::new(target_width, target_height);
    if src_width == 0 || src_height == 0 || dst_width == 0 || dst_height == 0 {
        return dst;
    }

    let columns = filter_taps(src_width, dst_width);
    let rows = filter_taps(src_height, dst_height);
    let pixels = src.as_raw();

    // [src_height, dst_width]
    let mut horizontal = vec![0.0f32; src_height * dst_width];
    for sy in 0..src_height {
        let line = &pixels[sy * src_width..(sy + 1) * src_width];
        for (dx, taps) in columns.iter().enumerate() {
            horizontal[sy * dst_width + dx] = taps.apply(|sx| line[sx] as f32);
        }
    }

    for (dy, taps) in rows.iter().enumerate() {
        for dx in 0..dst_width {
            let value = taps.apply(|sy| horizontal[sy * dst_width + dx]);
            dst.put_pixel(dx as u32, dy as u32, Luma([value.round().clamp(0.0, 255.0) as u8]));
        }
    }

    dst
}

/// Normalized triangle-filter weights for one output coordinate
struct FilterTaps {
    start: usize,
    weights: Vec<f32>,
}

impl FilterTaps {
    fn apply(&self, sample: impl Fn(usize) -> f32) -> f32 {
        self.weights
            .iter()
            .enumerate()
            .map(|(i, w)| sample(self.start + i) * w)
            .sum()
    }
}

fn filter_taps(src_len: usize, dst_len: usize) -> Vec<FilterTaps> {
    let scale = src_len as f32 / dst_len as f32;
    let support = scale.max(1.0);

    (0..dst_len)
        .map(|d| {
            // Center of the output pixel in source coordinates
            let center = (d as f32 + 0.5) * scale;
            let lo = (center - support).floor().max(0.0) as usize;
            let hi = ((center + support).ceil() as usize).min(src_len - 1);

            let mut weights: Vec<f32> = (lo..=hi)
                .map(|s| (1.0 - ((s as f32 + 0.5) - center).abs() / support).max(0.0))
                .collect();
            let total: f32 = weights.iter().sum();
            if total > 0.0 {
                weights.iter_mut().for_each(|w| *w /= total);
            }

            FilterTaps { start: lo, weights }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_transform_shape_for_any_size() {
        let device = Default::default();
        let preprocessor = Preprocessor::new();

        for (w, h) in [(1, 1), (28, 28), (100, 40), (7, 300), (512, 512)] {
            let img = GrayImage::from_pixel(w, h, Luma([128]));
            let tensor = preprocessor.transform::<TestBackend>(&img, &device);
            assert_eq!(tensor.dims(), [1, 1, 28, 28], "source {}x{}", w, h);
        }
    }

    #[test]
    fn test_empty_source_does_not_panic() {
        let device = Default::default();
        let preprocessor = Preprocessor::new();

        for (w, h) in [(0, 0), (0, 5), (5, 0)] {
            let img = GrayImage::new(w, h);
            let resized = preprocessor.resize(&img);
            assert_eq!(resized.dimensions(), (28, 28));
            assert!(resized.pixels().all(|p| p.0[0] == 0));

            let tensor = preprocessor.transform::<TestBackend>(&img, &device);
            assert_eq!(tensor.dims(), [1, 1, 28, 28]);
        }
    }

    #[test]
    fn test_large_source_resizes() {
        let mut img = GrayImage::new(4000, 3000);
        for (x, y, pixel) in img.enumerate_pixels_mut() {
            if x >= 2000 && y < 1500 {
                *pixel = Luma([255]);
            }
        }

        let resized = Preprocessor::new().resize(&img);
        assert_eq!(resized.get_pixel(0, 27).0[0], 0);
        assert_eq!(resized.get_pixel(27, 0).0[0], 255);
    }

    #[test]
    fn test_normalization_constants() {
        let preprocessor = Preprocessor::new();

        let white = preprocessor.normalized_pixels(&GrayImage::from_pixel(28, 28, Luma([255])));
        assert_eq!(white.len(), 784);
        let expected = (1.0 - 0.1307) / 0.3081;
        assert!(white.iter().all(|v| (v - expected).abs() < 1e-5));

        let black = preprocessor.normalized_pixels(&GrayImage::new(28, 28));
        let expected = -0.1307 / 0.3081;
        assert!(black.iter().all(|v| (v - expected).abs() < 1e-5));
    }

    #[test]
    fn test_uniform_image_stays_uniform() {
        let preprocessor = Preprocessor::new();
        for (w, h) in [(1, 1), (3, 90), (640, 480)] {
            let resized = preprocessor.resize(&GrayImage::from_pixel(w, h, Luma([77])));
            assert_eq!(resized.dimensions(), (28, 28));
            assert!(resized.pixels().all(|p| p.0[0] == 77));
        }
    }

    #[test]
    fn test_downscale_averages() {
        // Left half black, right half white: the seam column blends both.
        let mut img = GrayImage::new(56, 56);
        for (x, _, pixel) in img.enumerate_pixels_mut() {
            if x >= 28 {
                *pixel = Luma([255]);
            }
        }

        let resized = Preprocessor::new().resize(&img);
        assert_eq!(resized.get_pixel(0, 10).0[0], 0);
        assert_eq!(resized.get_pixel(27, 10).0[0], 255);
        let seam = resized.get_pixel(13, 10).0[0];
        assert!(seam > 0 && seam < 255, "seam value {}", seam);
    }

    #[test]
    fn test_tensor_matches_pixels() {
        let device = Default::default();
        let preprocessor = Preprocessor::new();
        let mut img = GrayImage::new(28, 28);
        img.put_pixel(3, 5, Luma([255]));

        let values: Vec<f32> = preprocessor
            .transform::<TestBackend>(&img, &device)
            .into_data()
            .to_vec()
            .unwrap();
        assert_eq!(values, preprocessor.normalized_pixels(&img));
        assert!(values[5 * 28 + 3] > 2.0);
    }
}
