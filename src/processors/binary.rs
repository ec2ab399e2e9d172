//! Binarization and low-level block extraction.
//!
//! The structural segmenter works on an inverted Otsu binarization of the
//! normalized page (foreground = ink). This module produces that mask and
//! extracts the two raw block sources feeding segmentation: 8-connected
//! component statistics and contour-hierarchy blocks.

use image::{GrayImage, Luma, RgbImage};
use imageproc::contours::find_contours;
use imageproc::contrast::{otsu_level, threshold, ThresholdType};
use imageproc::distance_transform::Norm;
use imageproc::morphology::close;
use imageproc::region_labelling::{connected_components, Connectivity};

use crate::processors::geometry::{polygon_area, BBox, Point2f};
use crate::utils::image::rgb_to_gray;

/// Statistics of one connected component, in label order.
#[derive(Debug, Clone, Copy)]
pub struct ComponentStats {
    /// Tight bounding box of the component.
    pub bbox: BBox,
    /// Number of foreground pixels.
    pub area: u32,
}

impl ComponentStats {
    /// Component width in pixels.
    pub fn width(&self) -> i32 {
        self.bbox.width()
    }

    /// Component height in pixels.
    pub fn height(&self) -> i32 {
        self.bbox.height()
    }
}

/// Binarizes a page with inverted global Otsu thresholding so ink
/// becomes foreground, then closes single-pixel gaps with a 3x3 kernel.
pub fn binarize_inverted(image: &RgbImage) -> GrayImage {
    let gray = rgb_to_gray(image);
    let level = otsu_level(&gray);
    let binary = threshold(&gray, level, ThresholdType::BinaryInverted);
    close(&binary, Norm::LInf, 1)
}

/// Computes per-label statistics of the 8-connected foreground
/// components. The background label is skipped. Components are returned
/// in label order, which is deterministic for a given mask.
pub fn component_stats(binary: &GrayImage) -> Vec<ComponentStats> {
    let labels = connected_components(binary, Connectivity::Eight, Luma([0u8]));

    let max_label = labels.pixels().map(|p| p.0[0]).max().unwrap_or(0) as usize;
    if max_label == 0 {
        return Vec::new();
    }

    // One slot per label; label 0 is the background.
    let mut min_x = vec![i32::MAX; max_label + 1];
    let mut min_y = vec![i32::MAX; max_label + 1];
    let mut max_x = vec![i32::MIN; max_label + 1];
    let mut max_y = vec![i32::MIN; max_label + 1];
    let mut areas = vec![0u32; max_label + 1];

    for (x, y, pixel) in labels.enumerate_pixels() {
        let label = pixel.0[0] as usize;
        if label == 0 {
            continue;
        }
        let (x, y) = (x as i32, y as i32);
        min_x[label] = min_x[label].min(x);
        min_y[label] = min_y[label].min(y);
        max_x[label] = max_x[label].max(x);
        max_y[label] = max_y[label].max(y);
        areas[label] += 1;
    }

    (1..=max_label)
        .filter(|&label| areas[label] > 0)
        .map(|label| ComponentStats {
            bbox: BBox::new(
                min_x[label],
                min_y[label],
                max_x[label] + 1,
                max_y[label] + 1,
            ),
            area: areas[label],
        })
        .collect()
}

/// Extracts bounding boxes of contours from the full hierarchy whose
/// enclosed area reaches `min_area`, in discovery order.
pub fn contour_blocks(binary: &GrayImage, min_area: f64) -> Vec<BBox> {
    let contours = find_contours::<u32>(binary);

    let mut blocks = Vec::new();
    for contour in &contours {
        if contour.points.len() < 3 {
            continue;
        }
        let points: Vec<Point2f> = contour
            .points
            .iter()
            .map(|p| Point2f::new(p.x as f32, p.y as f32))
            .collect();
        if polygon_area(&points) < min_area {
            continue;
        }

        let mut bx1 = i32::MAX;
        let mut by1 = i32::MAX;
        let mut bx2 = i32::MIN;
        let mut by2 = i32::MIN;
        for p in &contour.points {
            bx1 = bx1.min(p.x as i32);
            by1 = by1.min(p.y as i32);
            bx2 = bx2.max(p.x as i32);
            by2 = by2.max(p.y as i32);
        }
        blocks.push(BBox::new(bx1, by1, bx2 + 1, by2 + 1));
    }
    blocks
}

/// Fraction of foreground pixels inside the (clamped) crop of the mask.
pub fn ink_density(binary: &GrayImage, bbox: &BBox) -> f64 {
    let clamped = bbox.clamp_to(binary.width(), binary.height());
    let total = clamped.area();
    if total <= 0 {
        return 0.0;
    }

    let mut ink = 0i64;
    for y in clamped.y1..clamped.y2 {
        for x in clamped.x1..clamped.x2 {
            if binary.get_pixel(x as u32, y as u32).0[0] > 0 {
                ink += 1;
            }
        }
    }
    ink as f64 / total as f64
}
