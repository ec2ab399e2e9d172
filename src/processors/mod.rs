//! Image processors: geometric primitives and binarization.

pub mod binary;
pub mod geometry;

pub use binary::{binarize_inverted, component_stats, contour_blocks, ink_density, ComponentStats};
pub use geometry::{convex_hull, min_area_rect, order_quad, polygon_area, BBox, NormBBox, Point2f};
