//! Document boundary detection and perspective correction.
//!
//! Finds the document's outer quadrilateral through edge detection and
//! contour analysis, then warps it onto an upright rectangle. When no
//! boundary contour qualifies, the page is returned unchanged: the
//! Quality Gate, not the normalizer, is the input-rejection mechanism.

use image::RgbImage;
use imageproc::contours::find_contours;
use imageproc::edges::canny;
use imageproc::filter::gaussian_blur_f32;
use imageproc::geometry::{approximate_polygon_dp, arc_length};
use tracing::debug;

use crate::core::config::NormalizerConfig;
use crate::core::errors::VerifyResult;
use crate::processors::geometry::{min_area_rect, order_quad, polygon_area, Point2f};
use crate::utils::image::rgb_to_gray;
use crate::utils::transform::warp_quad_to_rect;

/// Geometric normalizer for one page image.
#[derive(Debug, Clone)]
pub struct Normalizer {
    config: NormalizerConfig,
}

impl Normalizer {
    /// Creates a normalizer with the given parameters.
    pub fn new(config: NormalizerConfig) -> Self {
        Self { config }
    }

    /// Normalizes one page. Returns the perspective-corrected document
    /// when a boundary quadrilateral is found, otherwise the input
    /// unchanged.
    pub fn normalize(&self, page: &RgbImage) -> VerifyResult<RgbImage> {
        match self.detect_document_quad(page) {
            Some(quad) => {
                let ordered = order_quad(&quad);
                debug!(
                    tl = ?(ordered[0].x, ordered[0].y),
                    br = ?(ordered[2].x, ordered[2].y),
                    "warping document boundary"
                );
                warp_quad_to_rect(page, &ordered)
            }
            None => {
                debug!("no document boundary found, keeping page as-is");
                Ok(page.clone())
            }
        }
    }

    /// Searches the largest edge contours for a document boundary.
    ///
    /// The first of the ten largest contours whose area exceeds the
    /// configured fraction of the image area decides the outcome: its
    /// polygon approximation when that has exactly four vertices,
    /// otherwise its minimum-area rectangle.
    fn detect_document_quad(&self, page: &RgbImage) -> Option<[Point2f; 4]> {
        let gray = rgb_to_gray(page);
        let blurred = gaussian_blur_f32(&gray, self.config.blur_sigma);
        let edges = canny(&blurred, self.config.canny_low, self.config.canny_high);

        let mut contours: Vec<(f64, Vec<Point2f>, Vec<imageproc::point::Point<u32>>)> =
            find_contours::<u32>(&edges)
                .into_iter()
                .map(|c| {
                    let points: Vec<Point2f> = c
                        .points
                        .iter()
                        .map(|p| Point2f::new(p.x as f32, p.y as f32))
                        .collect();
                    (polygon_area(&points), points, c.points)
                })
                .collect();

        contours.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        let image_area = page.width() as f64 * page.height() as f64;
        let min_area = image_area * self.config.min_area_fraction;

        for (area, points, raw_points) in contours.into_iter().take(self.config.max_candidates) {
            if area < min_area {
                continue;
            }

            let perimeter = arc_length(&raw_points, true);
            let epsilon = perimeter * self.config.approx_epsilon_fraction;
            let approx = approximate_polygon_dp(&raw_points, epsilon, true);

            let quad: Vec<Point2f> = if approx.len() == 4 {
                approx
                    .iter()
                    .map(|p| Point2f::new(p.x as f32, p.y as f32))
                    .collect()
            } else {
                min_area_rect(&points).to_vec()
            };

            return Some([quad[0], quad[1], quad[2], quad[3]]);
        }

        None
    }
}
