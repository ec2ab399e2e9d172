//! Perspective transformation for document rectification.
//!
//! Maps a detected document quadrilateral onto an axis-aligned rectangle
//! whose size is derived from the quadrilateral's edge lengths. The
//! homography is solved as an 8x8 linear system and applied by inverse
//! mapping with bilinear sampling and border replication.

use image::{Rgb, RgbImage};
use nalgebra::{Matrix3, Vector3};
use rayon::prelude::*;

use crate::core::errors::{VerifyError, VerifyResult};
use crate::processors::geometry::Point2f;

/// Warps the region bounded by an ordered quadrilateral
/// (top-left, top-right, bottom-right, bottom-left) onto an upright
/// rectangle. The target width is the longer of the top and bottom
/// edges, the target height the longer of the left and right edges.
pub fn warp_quad_to_rect(src_image: &RgbImage, quad: &[Point2f; 4]) -> VerifyResult<RgbImage> {
    let [tl, tr, br, bl] = *quad;

    let width = br.distance(&bl).max(tr.distance(&tl)).round() as u32;
    let height = tr.distance(&br).max(tl.distance(&bl)).round() as u32;

    if width == 0 || height == 0 {
        return Err(VerifyError::normalization(
            "document quadrilateral collapses to a zero-sized rectangle",
        ));
    }

    let dst = [
        Point2f::new(0.0, 0.0),
        Point2f::new(width as f32 - 1.0, 0.0),
        Point2f::new(width as f32 - 1.0, height as f32 - 1.0),
        Point2f::new(0.0, height as f32 - 1.0),
    ];

    let matrix = perspective_transform(quad, &dst)?;
    warp_perspective(src_image, &matrix, width, height)
}

/// Solves for the 3x3 homography mapping four source points onto four
/// destination points.
pub fn perspective_transform(
    src_points: &[Point2f; 4],
    dst_points: &[Point2f; 4],
) -> VerifyResult<Matrix3<f32>> {
    let mut a = nalgebra::DMatrix::<f32>::zeros(8, 8);
    let mut b = nalgebra::DVector::<f32>::zeros(8);

    for i in 0..4 {
        let src = &src_points[i];
        let dst = &dst_points[i];

        a.set_row(
            i * 2,
            &nalgebra::RowDVector::from_row_slice(&[
                src.x,
                src.y,
                1.0,
                0.0,
                0.0,
                0.0,
                -src.x * dst.x,
                -src.y * dst.x,
            ]),
        );
        b[i * 2] = dst.x;

        a.set_row(
            i * 2 + 1,
            &nalgebra::RowDVector::from_row_slice(&[
                0.0,
                0.0,
                0.0,
                src.x,
                src.y,
                1.0,
                -src.x * dst.y,
                -src.y * dst.y,
            ]),
        );
        b[i * 2 + 1] = dst.y;
    }

    let solution = a.lu().solve(&b).ok_or_else(|| {
        VerifyError::normalization("perspective system is singular for the detected corners")
    })?;

    Ok(Matrix3::new(
        solution[0],
        solution[1],
        solution[2],
        solution[3],
        solution[4],
        solution[5],
        solution[6],
        solution[7],
        1.0,
    ))
}

/// Applies a homography by inverse mapping. Rows are processed in
/// parallel; sampling is bilinear with border replication.
fn warp_perspective(
    src_image: &RgbImage,
    matrix: &Matrix3<f32>,
    dst_width: u32,
    dst_height: u32,
) -> VerifyResult<RgbImage> {
    let inverse = matrix.try_inverse().ok_or_else(|| {
        VerifyError::normalization("perspective matrix is not invertible")
    })?;

    let mut dst_image = RgbImage::new(dst_width, dst_height);
    let buffer: &mut [u8] = dst_image.as_mut();

    buffer
        .par_chunks_mut((dst_width * 3) as usize)
        .enumerate()
        .for_each(|(dst_y, row)| {
            for dst_x in 0..dst_width {
                let dst_point = Vector3::new(dst_x as f32, dst_y as f32, 1.0);
                let src_point = inverse * dst_point;
                let pixel = if src_point.z.abs() > f32::EPSILON {
                    bilinear_sample(
                        src_image,
                        src_point.x / src_point.z,
                        src_point.y / src_point.z,
                    )
                } else {
                    *src_image.get_pixel(0, 0)
                };
                let index = (dst_x * 3) as usize;
                row[index..index + 3].copy_from_slice(&pixel.0);
            }
        });

    Ok(dst_image)
}

#[inline]
fn pixel_replicate(image: &RgbImage, x: i32, y: i32) -> Rgb<u8> {
    let cx = x.clamp(0, image.width() as i32 - 1) as u32;
    let cy = y.clamp(0, image.height() as i32 - 1) as u32;
    *image.get_pixel(cx, cy)
}

/// Bilinear sample at fractional coordinates with border replication.
fn bilinear_sample(image: &RgbImage, x: f32, y: f32) -> Rgb<u8> {
    let x0 = x.floor() as i32;
    let y0 = y.floor() as i32;
    let dx = x - x0 as f32;
    let dy = y - y0 as f32;

    let p00 = pixel_replicate(image, x0, y0);
    let p10 = pixel_replicate(image, x0 + 1, y0);
    let p01 = pixel_replicate(image, x0, y0 + 1);
    let p11 = pixel_replicate(image, x0 + 1, y0 + 1);

    let mut out = [0u8; 3];
    for (c, out_c) in out.iter_mut().enumerate() {
        let v = (1.0 - dx) * (1.0 - dy) * p00.0[c] as f32
            + dx * (1.0 - dy) * p10.0[c] as f32
            + (1.0 - dx) * dy * p01.0[c] as f32
            + dx * dy * p11.0[c] as f32;
        *out_c = v.round().clamp(0.0, 255.0) as u8;
    }
    Rgb(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_square_maps_to_itself() {
        let quad = [
            Point2f::new(0.0, 0.0),
            Point2f::new(3.0, 0.0),
            Point2f::new(3.0, 3.0),
            Point2f::new(0.0, 3.0),
        ];
        let transform = perspective_transform(&quad, &quad).unwrap();
        let p = transform * Vector3::new(2.0, 1.0, 1.0);
        assert!((p.x / p.z - 2.0).abs() < 1e-4);
        assert!((p.y / p.z - 1.0).abs() < 1e-4);
    }

    #[test]
    fn degenerate_quad_is_rejected() {
        // All four corners collinear.
        let quad = [
            Point2f::new(0.0, 0.0),
            Point2f::new(1.0, 0.0),
            Point2f::new(2.0, 0.0),
            Point2f::new(3.0, 0.0),
        ];
        let dst = [
            Point2f::new(0.0, 0.0),
            Point2f::new(1.0, 0.0),
            Point2f::new(1.0, 1.0),
            Point2f::new(0.0, 1.0),
        ];
        assert!(perspective_transform(&quad, &dst).is_err());
    }

    #[test]
    fn warp_axis_aligned_region_preserves_content() {
        let mut image = RgbImage::from_pixel(40, 40, Rgb([0, 0, 0]));
        for y in 10..30 {
            for x in 10..30 {
                image.put_pixel(x, y, Rgb([200, 100, 50]));
            }
        }
        let quad = [
            Point2f::new(10.0, 10.0),
            Point2f::new(29.0, 10.0),
            Point2f::new(29.0, 29.0),
            Point2f::new(10.0, 29.0),
        ];
        let warped = warp_quad_to_rect(&image, &quad).unwrap();
        assert_eq!(warped.dimensions(), (19, 19));
        assert_eq!(warped.get_pixel(9, 9).0, [200, 100, 50]);
    }

    #[test]
    fn zero_size_quad_fails() {
        let image = RgbImage::new(10, 10);
        let quad = [
            Point2f::new(5.0, 5.0),
            Point2f::new(5.0, 5.0),
            Point2f::new(5.0, 5.0),
            Point2f::new(5.0, 5.0),
        ];
        assert!(warp_quad_to_rect(&image, &quad).is_err());
    }
}
