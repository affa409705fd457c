//! Image decoding from request payloads.
//!
//! Payloads are base64 text, optionally wrapped in a `data:` URI. The decoded
//! bytes are sniffed for a known container, decoded, and reduced to 8-bit luma.

use std::io::Cursor;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{DynamicImage, GrayImage, ImageReader, Limits, Luma};
use tracing::debug;

use crate::utils::error::InputError;

/// Largest accepted width or height, checked from the header before pixels are decoded
pub const MAX_IMAGE_DIMENSION: u32 = 8192;

/// Drop a leading `data:<mime>;base64,` marker if present
pub fn strip_data_uri(raw: &str) -> &str {
    let trimmed = raw.trim();
    if trimmed.starts_with("data:") {
        if let Some((_, payload)) = trimmed.split_once(',') {
            return payload.trim();
        }
    }
    trimmed
}

/// Decode a base64 payload into a grayscale raster
pub fn decode_image(raw: &str) -> Result<GrayImage, InputError> {
    let payload: String = strip_data_uri(raw)
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();

    let bytes = STANDARD
        .decode(payload.as_bytes())
        .map_err(|e| InputError::Decode(e.to_string()))?;

    decode_bytes(&bytes)
}

/// Decode raw container bytes (PNG, JPEG, ...) into a grayscale raster
pub fn decode_bytes(bytes: &[u8]) -> Result<GrayImage, InputError> {
    let format = image::guess_format(bytes).map_err(|_| InputError::UnrecognizedFormat)?;

    let mut limits = Limits::default();
    limits.max_image_width = Some(MAX_IMAGE_DIMENSION);
    limits.max_image_height = Some(MAX_IMAGE_DIMENSION);

    let mut reader = ImageReader::with_format(Cursor::new(bytes), format);
    reader.limits(limits);
    let img = reader
        .decode()
        .map_err(|e| InputError::Decode(e.to_string()))?;

    debug!(
        "Decoded {:?} image {}x{} ({:?})",
        format,
        img.width(),
        img.height(),
        img.color()
    );

    check_dimensions(img.width(), img.height())?;
    Ok(to_grayscale(&img))
}

fn check_dimensions(width: u32, height: u32) -> Result<(), InputError> {
    if width == 0 || height == 0 {
        return Err(InputError::Decode(
            "image has zero width or height".to_string(),
        ));
    }
    Ok(())
}

/// Reduce any image to 8-bit luma.
///
/// Colour sources use ITU-R 601-2 weights (`L = R*299/1000 + G*587/1000 + B*114/1000`)
/// in fixed point; alpha is dropped.
pub fn to_grayscale(img: &DynamicImage) -> GrayImage {
    if !img.color().has_color() {
        return img.to_luma8();
    }

    let rgb = img.to_rgb8();
    let (width, height) = rgb.dimensions();
    let mut gray = GrayImage::new(width, height);

    for (x, y, pixel) in rgb.enumerate_pixels() {
        let [r, g, b] = pixel.0;
        let l = (r as u32 * 19595 + g as u32 * 38470 + b as u32 * 7471 + 0x8000) >> 16;
        gray.put_pixel(x, y, Luma([l as u8]));
    }

    gray
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};

    fn encode_png(img: &DynamicImage) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    fn png_base64(img: &DynamicImage) -> String {
        STANDARD.encode(encode_png(img))
    }

    #[test]
    fn test_strip_data_uri() {
        assert_eq!(strip_data_uri("data:image/png;base64,AAAA"), "AAAA");
        assert_eq!(strip_data_uri("  AAAA\n"), "AAAA");
        assert_eq!(strip_data_uri("AAAA"), "AAAA");
    }

    #[test]
    fn test_decode_gray_png() {
        let img = DynamicImage::ImageLuma8(GrayImage::from_pixel(5, 3, Luma([200])));
        let gray = decode_image(&png_base64(&img)).unwrap();
        assert_eq!(gray.dimensions(), (5, 3));
        assert!(gray.pixels().all(|p| p.0[0] == 200));
    }

    #[test]
    fn test_data_uri_prefix_is_ignored() {
        let mut src = GrayImage::new(4, 4);
        src.put_pixel(1, 2, Luma([255]));
        let encoded = png_base64(&DynamicImage::ImageLuma8(src));

        let plain = decode_image(&encoded).unwrap();
        let prefixed = decode_image(&format!("data:image/png;base64,{}", encoded)).unwrap();
        assert_eq!(plain, prefixed);
    }

    #[test]
    fn test_not_base64_is_decode_error() {
        assert!(matches!(
            decode_image("not-base64!!"),
            Err(InputError::Decode(_))
        ));
    }

    #[test]
    fn test_non_image_bytes_are_unrecognized() {
        let encoded = STANDARD.encode(b"hello, this is plain text");
        assert_eq!(decode_image(&encoded), Err(InputError::UnrecognizedFormat));
    }

    #[test]
    fn test_truncated_png_is_decode_error() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(16, 16, Rgb([10, 20, 30])));
        let bytes = encode_png(&img);
        let truncated = &bytes[..bytes.len() / 2];
        assert!(matches!(decode_bytes(truncated), Err(InputError::Decode(_))));
    }

    #[test]
    fn test_colour_uses_601_weights() {
        let mut rgb = RgbImage::new(3, 1);
        rgb.put_pixel(0, 0, Rgb([255, 0, 0]));
        rgb.put_pixel(1, 0, Rgb([0, 255, 0]));
        rgb.put_pixel(2, 0, Rgb([0, 0, 255]));

        let gray = to_grayscale(&DynamicImage::ImageRgb8(rgb));
        assert_eq!(gray.get_pixel(0, 0).0[0], 76);
        assert_eq!(gray.get_pixel(1, 0).0[0], 150);
        assert_eq!(gray.get_pixel(2, 0).0[0], 29);
    }

    #[test]
    fn test_alpha_is_dropped() {
        let rgba = RgbaImage::from_pixel(2, 2, Rgba([255, 255, 255, 0]));
        let gray = decode_image(&png_base64(&DynamicImage::ImageRgba8(rgba))).unwrap();
        assert!(gray.pixels().all(|p| p.0[0] == 255));
    }

    #[test]
    fn test_zero_sized_image_is_decode_error() {
        assert_eq!(
            check_dimensions(0, 0),
            Err(InputError::Decode("image has zero width or height".to_string()))
        );
        assert!(check_dimensions(0, 5).is_err());
        assert!(check_dimensions(5, 0).is_err());
        assert!(check_dimensions(1, 1).is_ok());
    }

    #[test]
    fn test_oversized_image_is_rejected() {
        let wide = DynamicImage::ImageLuma8(GrayImage::new(MAX_IMAGE_DIMENSION + 1, 1));
        assert!(matches!(
            decode_bytes(&encode_png(&wide)),
            Err(InputError::Decode(_))
        ));

        let edge = DynamicImage::ImageLuma8(GrayImage::new(MAX_IMAGE_DIMENSION, 1));
        assert_eq!(
            decode_bytes(&encode_png(&edge)).unwrap().dimensions(),
            (MAX_IMAGE_DIMENSION, 1)
        );
    }
}
