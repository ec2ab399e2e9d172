//! Image helpers shared across pipeline stages.

use image::{imageops, GrayImage, RgbImage};
use imageproc::filter::laplacian_filter;

use crate::processors::geometry::BBox;

/// Converts an RGB image to grayscale.
pub fn rgb_to_gray(image: &RgbImage) -> GrayImage {
    imageops::grayscale(image)
}

/// Mean and standard deviation of a grayscale image. These are the
/// brightness and contrast signals of the Quality Gate.
pub fn gray_stats(gray: &GrayImage) -> (f64, f64) {
    let n = (gray.width() as u64 * gray.height() as u64) as f64;
    if n == 0.0 {
        return (0.0, 0.0);
    }

    let mut sum = 0.0f64;
    let mut sum_sq = 0.0f64;
    for p in gray.pixels() {
        let v = p.0[0] as f64;
        sum += v;
        sum_sq += v * v;
    }

    let mean = sum / n;
    let variance = (sum_sq / n - mean * mean).max(0.0);
    (mean, variance.sqrt())
}

/// Variance of the Laplacian response, the sharpness/texture signal used
/// by both the Quality Gate and photo-region classification.
pub fn laplacian_variance(gray: &GrayImage) -> f64 {
    let response = laplacian_filter(gray);
    let n = (response.width() as u64 * response.height() as u64) as f64;
    if n == 0.0 {
        return 0.0;
    }

    let mut sum = 0.0f64;
    let mut sum_sq = 0.0f64;
    for p in response.pixels() {
        let v = p.0[0] as f64;
        sum += v;
        sum_sq += v * v;
    }

    let mean = sum / n;
    (sum_sq / n - mean * mean).max(0.0)
}

/// Crops a pixel box out of an image, clamping to the image bounds.
/// Returns None when the clamped box is empty.
pub fn crop_bbox(image: &RgbImage, bbox: &BBox) -> Option<RgbImage> {
    let clamped = bbox.clamp_to(image.width(), image.height());
    if clamped.width() <= 0 || clamped.height() <= 0 {
        return None;
    }
    Some(
        imageops::crop_imm(
            image,
            clamped.x1 as u32,
            clamped.y1 as u32,
            clamped.width() as u32,
            clamped.height() as u32,
        )
        .to_image(),
    )
}

/// Crops the same box out of a grayscale mask, clamped.
pub fn crop_gray_bbox(mask: &GrayImage, bbox: &BBox) -> Option<GrayImage> {
    let clamped = bbox.clamp_to(mask.width(), mask.height());
    if clamped.width() <= 0 || clamped.height() <= 0 {
        return None;
    }
    Some(
        imageops::crop_imm(
            mask,
            clamped.x1 as u32,
            clamped.y1 as u32,
            clamped.width() as u32,
            clamped.height() as u32,
        )
        .to_image(),
    )
}

/// Pads an image on all sides by `pad_ratio` of its size, replicating
/// the border pixels. Document face crops are padded this way before
/// re-detection so the detector sees enough context.
pub fn pad_replicate(image: &RgbImage, pad_ratio: f32) -> RgbImage {
    let (w, h) = (image.width(), image.height());
    let pad_w = (w as f32 * pad_ratio) as u32;
    let pad_h = (h as f32 * pad_ratio) as u32;
    let (out_w, out_h) = (w + 2 * pad_w, h + 2 * pad_h);

    let mut out = RgbImage::new(out_w, out_h);
    for y in 0..out_h {
        let src_y = (y as i64 - pad_h as i64).clamp(0, h as i64 - 1) as u32;
        for x in 0..out_w {
            let src_x = (x as i64 - pad_w as i64).clamp(0, w as i64 - 1) as u32;
            out.put_pixel(x, y, *image.get_pixel(src_x, src_y));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb};

    #[test]
    fn gray_stats_of_flat_image() {
        let gray = GrayImage::from_pixel(50, 50, Luma([120]));
        let (mean, std) = gray_stats(&gray);
        assert!((mean - 120.0).abs() < 1e-9);
        assert!(std < 1e-9);
    }

    #[test]
    fn gray_stats_of_half_and_half() {
        let mut gray = GrayImage::from_pixel(10, 10, Luma([0]));
        for y in 0..10 {
            for x in 5..10 {
                gray.put_pixel(x, y, Luma([200]));
            }
        }
        let (mean, std) = gray_stats(&gray);
        assert!((mean - 100.0).abs() < 1e-9);
        assert!((std - 100.0).abs() < 1e-9);
    }

    #[test]
    fn laplacian_variance_zero_on_flat_image() {
        let gray = GrayImage::from_pixel(30, 30, Luma([128]));
        assert!(laplacian_variance(&gray) < 1e-9);
    }

    #[test]
    fn laplacian_variance_high_on_checkerboard() {
        let mut gray = GrayImage::new(30, 30);
        for y in 0..30 {
            for x in 0..30 {
                let v = if (x + y) % 2 == 0 { 255 } else { 0 };
                gray.put_pixel(x, y, Luma([v]));
            }
        }
        assert!(laplacian_variance(&gray) > 1000.0);
    }

    #[test]
    fn crop_bbox_clamps_out_of_bounds() {
        let img = RgbImage::from_pixel(20, 20, Rgb([1, 2, 3]));
        let crop = crop_bbox(&img, &BBox::new(-5, -5, 10, 10)).unwrap();
        assert_eq!(crop.dimensions(), (10, 10));
        assert!(crop_bbox(&img, &BBox::new(25, 25, 30, 30)).is_none());
    }

    #[test]
    fn pad_replicate_grows_image() {
        let img = RgbImage::from_pixel(10, 10, Rgb([9, 9, 9]));
        let padded = pad_replicate(&img, 0.6);
        assert_eq!(padded.dimensions(), (22, 22));
        assert_eq!(padded.get_pixel(0, 0).0, [9, 9, 9]);
    }
}
