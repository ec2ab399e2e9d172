//! Geometric primitives for document structure analysis.
//!
//! This module provides pixel-space and normalized bounding boxes and the
//! overlap metrics the layout matcher is built on: IoU, coverage, spill
//! penalty and the directional overlap ratio. It also carries the convex
//! hull and minimum-area rectangle used by the boundary detector.

use itertools::Itertools;
use serde::{Deserialize, Serialize};

/// A 2D point with floating-point coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point2f {
    /// X coordinate.
    pub x: f32,
    /// Y coordinate.
    pub y: f32,
}

impl Point2f {
    /// Creates a new point.
    #[inline]
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point.
    #[inline]
    pub fn distance(&self, other: &Point2f) -> f32 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// An axis-aligned bounding box in pixel coordinates.
///
/// Invariant: `x1 < x2` and `y1 < y2` after construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BBox {
    /// Left edge.
    pub x1: i32,
    /// Top edge.
    pub y1: i32,
    /// Right edge (exclusive).
    pub x2: i32,
    /// Bottom edge (exclusive).
    pub y2: i32,
}

impl BBox {
    /// Creates a bounding box, swapping coordinates if needed so the
    /// ordering invariant holds.
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self {
            x1: x1.min(x2),
            y1: y1.min(y2),
            x2: x1.max(x2),
            y2: y1.max(y2),
        }
    }

    /// Box width in pixels.
    #[inline]
    pub fn width(&self) -> i32 {
        self.x2 - self.x1
    }

    /// Box height in pixels.
    #[inline]
    pub fn height(&self) -> i32 {
        self.y2 - self.y1
    }

    /// Box area in pixels.
    #[inline]
    pub fn area(&self) -> i64 {
        self.width() as i64 * self.height() as i64
    }

    /// Smallest box enclosing both boxes.
    pub fn union(&self, other: &BBox) -> BBox {
        BBox {
            x1: self.x1.min(other.x1),
            y1: self.y1.min(other.y1),
            x2: self.x2.max(other.x2),
            y2: self.y2.max(other.y2),
        }
    }

    /// True when `other` lies entirely inside this box.
    pub fn contains(&self, other: &BBox) -> bool {
        other.x1 >= self.x1 && other.y1 >= self.y1 && other.x2 <= self.x2 && other.y2 <= self.y2
    }

    /// Per-axis gap between two boxes; zero on an axis where they
    /// overlap or touch.
    pub fn axis_gaps(&self, other: &BBox) -> (i32, i32) {
        let dx = (self.x1 - other.x2).max(other.x1 - self.x2).max(0);
        let dy = (self.y1 - other.y2).max(other.y1 - self.y2).max(0);
        (dx, dy)
    }

    /// Sum of the per-axis gaps, the distance used for text grouping.
    pub fn gap_distance(&self, other: &BBox) -> i32 {
        let (dx, dy) = self.axis_gaps(other);
        dx + dy
    }

    /// Overlapping vertical span divided by the smaller height.
    pub fn vertical_overlap_ratio(&self, other: &BBox) -> f64 {
        let overlap = (self.y2.min(other.y2) - self.y1.max(other.y1)).max(0);
        let min_height = self.height().min(other.height());
        if min_height > 0 {
            overlap as f64 / min_height as f64
        } else {
            0.0
        }
    }

    /// Overlapping horizontal span divided by the smaller width.
    pub fn horizontal_overlap_ratio(&self, other: &BBox) -> f64 {
        let overlap = (self.x2.min(other.x2) - self.x1.max(other.x1)).max(0);
        let min_width = self.width().min(other.width());
        if min_width > 0 {
            overlap as f64 / min_width as f64
        } else {
            0.0
        }
    }

    /// Clamps the box to an image of the given size.
    pub fn clamp_to(&self, width: u32, height: u32) -> BBox {
        BBox {
            x1: self.x1.clamp(0, width as i32),
            y1: self.y1.clamp(0, height as i32),
            x2: self.x2.clamp(0, width as i32),
            y2: self.y2.clamp(0, height as i32),
        }
    }

    /// Converts to resolution-independent coordinates in [0, 1].
    pub fn normalize(&self, image_width: u32, image_height: u32) -> NormBBox {
        let w = image_width as f64;
        let h = image_height as f64;
        NormBBox {
            x1: self.x1 as f64 / w,
            y1: self.y1 as f64 / h,
            x2: self.x2 as f64 / w,
            y2: self.y2 as f64 / h,
        }
    }
}

/// An axis-aligned bounding box in normalized [0, 1] coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormBBox {
    /// Left edge in [0, 1].
    pub x1: f64,
    /// Top edge in [0, 1].
    pub y1: f64,
    /// Right edge in [0, 1].
    pub x2: f64,
    /// Bottom edge in [0, 1].
    pub y2: f64,
}

impl NormBBox {
    /// Creates a normalized box, swapping coordinates if needed.
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self {
            x1: x1.min(x2),
            y1: y1.min(y2),
            x2: x1.max(x2),
            y2: y1.max(y2),
        }
    }

    /// Box width.
    #[inline]
    pub fn width(&self) -> f64 {
        self.x2 - self.x1
    }

    /// Box height.
    #[inline]
    pub fn height(&self) -> f64 {
        self.y2 - self.y1
    }

    /// Box area.
    #[inline]
    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    /// Intersection area with another box; zero when disjoint.
    pub fn intersection_area(&self, other: &NormBBox) -> f64 {
        let ix1 = self.x1.max(other.x1);
        let iy1 = self.y1.max(other.y1);
        let ix2 = self.x2.min(other.x2);
        let iy2 = self.y2.min(other.y2);
        if ix2 <= ix1 || iy2 <= iy1 {
            0.0
        } else {
            (ix2 - ix1) * (iy2 - iy1)
        }
    }

    /// Intersection over union. Symmetric; 1.0 for identical boxes.
    pub fn iou(&self, other: &NormBBox) -> f64 {
        let inter = self.intersection_area(other);
        let union = self.area() + other.area() - inter;
        if union > 0.0 {
            inter / union
        } else {
            0.0
        }
    }

    /// Directional overlap ratio: intersection area over *this* box's
    /// area. Not symmetric.
    pub fn overlap_ratio(&self, other: &NormBBox) -> f64 {
        let own_area = self.area();
        if own_area > 0.0 {
            self.intersection_area(other) / own_area
        } else {
            0.0
        }
    }

    /// Coverage of a layout field: intersection area over the field's
    /// area.
    pub fn coverage_of(&self, layout: &NormBBox) -> f64 {
        let layout_area = layout.area();
        if layout_area > 0.0 {
            self.intersection_area(layout) / layout_area
        } else {
            0.0
        }
    }

    /// Fraction of this box's area falling outside the layout field.
    pub fn spill_penalty(&self, layout: &NormBBox) -> f64 {
        let own_area = self.area();
        if own_area > 0.0 {
            (own_area - self.intersection_area(layout)) / own_area
        } else {
            0.0
        }
    }

    /// Smallest box enclosing both boxes.
    pub fn union(&self, other: &NormBBox) -> NormBBox {
        NormBBox {
            x1: self.x1.min(other.x1),
            y1: self.y1.min(other.y1),
            x2: self.x2.max(other.x2),
            y2: self.y2.max(other.y2),
        }
    }

    /// Smallest box enclosing every box in the iterator, or None when
    /// empty.
    pub fn merge_all<'a>(boxes: impl IntoIterator<Item = &'a NormBBox>) -> Option<NormBBox> {
        boxes
            .into_iter()
            .copied()
            .reduce(|acc, b| acc.union(&b))
    }

    /// Converts back to pixel coordinates for an image of the given
    /// size, rounding to the nearest pixel.
    pub fn denormalize(&self, image_width: u32, image_height: u32) -> BBox {
        let w = image_width as f64;
        let h = image_height as f64;
        BBox::new(
            (self.x1 * w).round() as i32,
            (self.y1 * h).round() as i32,
            (self.x2 * w).round() as i32,
            (self.y2 * h).round() as i32,
        )
    }

    /// Grows the box by `margin` on every side, clamped to [0, 1].
    /// Used when building layout templates from reference documents.
    pub fn inflate(&self, margin: f64) -> NormBBox {
        NormBBox {
            x1: (self.x1 - margin).clamp(0.0, 1.0),
            y1: (self.y1 - margin).clamp(0.0, 1.0),
            x2: (self.x2 + margin).clamp(0.0, 1.0),
            y2: (self.y2 + margin).clamp(0.0, 1.0),
        }
    }

    /// Rounds every coordinate to the given number of decimals.
    pub fn round(&self, decimals: u32) -> NormBBox {
        let factor = 10f64.powi(decimals as i32);
        let r = |v: f64| (v * factor).round() / factor;
        NormBBox {
            x1: r(self.x1),
            y1: r(self.y1),
            x2: r(self.x2),
            y2: r(self.y2),
        }
    }
}

/// Orders the four corners of a quadrilateral as (top-left, top-right,
/// bottom-right, bottom-left) using the sum/difference heuristic: the
/// top-left corner minimizes x+y, the bottom-right maximizes x+y, the
/// top-right minimizes y-x and the bottom-left maximizes y-x.
pub fn order_quad(points: &[Point2f; 4]) -> [Point2f; 4] {
    let mut tl = points[0];
    let mut tr = points[0];
    let mut br = points[0];
    let mut bl = points[0];

    for p in points.iter() {
        if p.x + p.y < tl.x + tl.y {
            tl = *p;
        }
        if p.x + p.y > br.x + br.y {
            br = *p;
        }
        if p.y - p.x < tr.y - tr.x {
            tr = *p;
        }
        if p.y - p.x > bl.y - bl.x {
            bl = *p;
        }
    }

    [tl, tr, br, bl]
}

/// Signed polygon area via the shoelace formula; the absolute value is
/// the enclosed area.
pub fn polygon_area(points: &[Point2f]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let n = points.len();
    let mut acc = 0.0f64;
    for i in 0..n {
        let j = (i + 1) % n;
        acc += points[i].x as f64 * points[j].y as f64;
        acc -= points[j].x as f64 * points[i].y as f64;
    }
    acc.abs() / 2.0
}

fn cross(o: &Point2f, a: &Point2f, b: &Point2f) -> f32 {
    (a.x - o.x) * (b.y - o.y) - (a.y - o.y) * (b.x - o.x)
}

/// Convex hull in counter-clockwise order (Andrew's monotone chain).
pub fn convex_hull(points: &[Point2f]) -> Vec<Point2f> {
    if points.len() < 3 {
        return points.to_vec();
    }

    let mut pts = points.to_vec();
    pts.sort_by(|a, b| {
        a.x.partial_cmp(&b.x)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.y.partial_cmp(&b.y).unwrap_or(std::cmp::Ordering::Equal))
    });
    pts.dedup_by(|a, b| a.x == b.x && a.y == b.y);

    if pts.len() < 3 {
        return pts;
    }

    let mut hull: Vec<Point2f> = Vec::with_capacity(pts.len() * 2);
    for p in pts.iter().chain(pts.iter().rev().skip(1)) {
        while hull.len() >= 2 && cross(&hull[hull.len() - 2], &hull[hull.len() - 1], p) <= 0.0 {
            hull.pop();
        }
        hull.push(*p);
    }
    hull.pop();
    hull
}

/// Corners of the minimum-area rectangle enclosing the points, found by
/// rotating calipers over the convex hull. Falls back to the axis-aligned
/// bounding rectangle for degenerate inputs.
pub fn min_area_rect(points: &[Point2f]) -> [Point2f; 4] {
    let hull = convex_hull(points);

    if hull.len() < 3 {
        let (min_x, max_x) = points
            .iter()
            .map(|p| p.x)
            .minmax_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
            .into_option()
            .unwrap_or((0.0, 0.0));
        let (min_y, max_y) = points
            .iter()
            .map(|p| p.y)
            .minmax_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
            .into_option()
            .unwrap_or((0.0, 0.0));
        return [
            Point2f::new(min_x, min_y),
            Point2f::new(max_x, min_y),
            Point2f::new(max_x, max_y),
            Point2f::new(min_x, max_y),
        ];
    }

    let n = hull.len();
    let mut best_area = f32::MAX;
    let mut best = [Point2f::new(0.0, 0.0); 4];

    for i in 0..n {
        let j = (i + 1) % n;
        let ex = hull[j].x - hull[i].x;
        let ey = hull[j].y - hull[i].y;
        let len = (ex * ex + ey * ey).sqrt();
        if len < f32::EPSILON {
            continue;
        }
        // Edge direction and its perpendicular.
        let (ux, uy) = (ex / len, ey / len);
        let (vx, vy) = (-uy, ux);

        let mut min_u = f32::MAX;
        let mut max_u = f32::MIN;
        let mut min_v = f32::MAX;
        let mut max_v = f32::MIN;
        for p in &hull {
            let du = ux * (p.x - hull[i].x) + uy * (p.y - hull[i].y);
            let dv = vx * (p.x - hull[i].x) + vy * (p.y - hull[i].y);
            min_u = min_u.min(du);
            max_u = max_u.max(du);
            min_v = min_v.min(dv);
            max_v = max_v.max(dv);
        }

        let area = (max_u - min_u) * (max_v - min_v);
        if area < best_area {
            best_area = area;
            let corner = |u: f32, v: f32| {
                Point2f::new(
                    hull[i].x + ux * u + vx * v,
                    hull[i].y + uy * u + vy * v,
                )
            };
            best = [
                corner(min_u, min_v),
                corner(max_u, min_v),
                corner(max_u, max_v),
                corner(min_u, max_v),
            ];
        }
    }

    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nb(x1: f64, y1: f64, x2: f64, y2: f64) -> NormBBox {
        NormBBox::new(x1, y1, x2, y2)
    }

    #[test]
    fn iou_is_symmetric_and_one_for_self() {
        let a = nb(0.1, 0.1, 0.5, 0.5);
        let b = nb(0.3, 0.3, 0.7, 0.7);
        assert!((a.iou(&b) - b.iou(&a)).abs() < 1e-12);
        assert!((a.iou(&a) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn overlap_ratio_zero_when_disjoint() {
        let a = nb(0.0, 0.0, 0.2, 0.2);
        let b = nb(0.5, 0.5, 0.9, 0.9);
        assert_eq!(a.overlap_ratio(&b), 0.0);
        assert_eq!(a.iou(&b), 0.0);
        assert_eq!(a.spill_penalty(&b), 1.0);
    }

    #[test]
    fn overlap_ratio_is_directional() {
        // Small box fully inside a large box.
        let small = nb(0.4, 0.4, 0.5, 0.5);
        let large = nb(0.0, 0.0, 1.0, 1.0);
        assert!((small.overlap_ratio(&large) - 1.0).abs() < 1e-12);
        assert!(large.overlap_ratio(&small) < 0.011);
    }

    #[test]
    fn coverage_and_spill() {
        let assigned = nb(0.0, 0.0, 0.4, 0.4);
        let layout = nb(0.2, 0.2, 0.6, 0.6);
        // Intersection is 0.2 x 0.2 = 0.04; both areas are 0.16.
        assert!((assigned.coverage_of(&layout) - 0.25).abs() < 1e-12);
        assert!((assigned.spill_penalty(&layout) - 0.75).abs() < 1e-12);
    }

    #[test]
    fn normalize_denormalize_round_trip() {
        let original = BBox::new(37, 91, 412, 508);
        let norm = original.normalize(640, 960);
        let back = norm.denormalize(640, 960);
        assert_eq!(original, back);
    }

    #[test]
    fn inflate_round_identity_with_zero_margin() {
        let b = nb(0.12, 0.34, 0.56, 0.78);
        assert_eq!(b.inflate(0.0).round(2), b);
    }

    #[test]
    fn inflate_clamps_to_unit_square() {
        let b = nb(0.02, 0.05, 0.98, 0.97);
        let inflated = b.inflate(0.05);
        assert_eq!(inflated.x1, 0.0);
        assert_eq!(inflated.y1, 0.0);
        assert_eq!(inflated.x2, 1.0);
        assert!(inflated.y2 <= 1.0);
    }

    #[test]
    fn bbox_gaps_and_overlap_ratios() {
        let a = BBox::new(0, 0, 10, 10);
        let b = BBox::new(13, 2, 20, 8);
        assert_eq!(a.axis_gaps(&b), (3, 0));
        assert_eq!(a.gap_distance(&b), 3);
        assert!((a.vertical_overlap_ratio(&b) - 1.0).abs() < 1e-12);
        assert_eq!(a.horizontal_overlap_ratio(&b), 0.0);
    }

    #[test]
    fn merge_all_is_enclosing_box() {
        let boxes = [nb(0.1, 0.1, 0.2, 0.2), nb(0.5, 0.0, 0.9, 0.3)];
        let merged = NormBBox::merge_all(boxes.iter()).unwrap();
        assert_eq!(merged, nb(0.1, 0.0, 0.9, 0.3));
        assert!(NormBBox::merge_all([].iter()).is_none());
    }

    #[test]
    fn order_quad_sum_diff_heuristic() {
        let shuffled = [
            Point2f::new(90.0, 10.0),
            Point2f::new(5.0, 95.0),
            Point2f::new(10.0, 12.0),
            Point2f::new(88.0, 91.0),
        ];
        let [tl, tr, br, bl] = order_quad(&shuffled);
        assert_eq!((tl.x, tl.y), (10.0, 12.0));
        assert_eq!((tr.x, tr.y), (90.0, 10.0));
        assert_eq!((br.x, br.y), (88.0, 91.0));
        assert_eq!((bl.x, bl.y), (5.0, 95.0));
    }

    #[test]
    fn min_area_rect_of_axis_aligned_square() {
        let pts = [
            Point2f::new(0.0, 0.0),
            Point2f::new(4.0, 0.0),
            Point2f::new(4.0, 4.0),
            Point2f::new(0.0, 4.0),
            Point2f::new(2.0, 2.0),
        ];
        let rect = min_area_rect(&pts);
        let area = polygon_area(&rect);
        assert!((area - 16.0).abs() < 1e-3);
    }

    #[test]
    fn polygon_area_shoelace() {
        let tri = [
            Point2f::new(0.0, 0.0),
            Point2f::new(4.0, 0.0),
            Point2f::new(0.0, 3.0),
        ];
        assert!((polygon_area(&tri) - 6.0).abs() < 1e-9);
    }
}
