//! Structural segmentation of a normalized page into regions and groups.
//!
//! Regions come from two complementary sources over the same binary
//! mask: greedy merging of 8-connected components and blocks from the
//! full contour hierarchy. Each region is classified as text or photo
//! and labeled with its vertical band; regions are then grouped by
//! proximity and alignment for layout matching.
//!
//! Both merge procedures are greedy and order-sensitive; they process
//! candidates strictly in detection order so output is reproducible.

use image::RgbImage;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::config::SegmenterConfig;
use crate::processors::binary::{
    binarize_inverted, component_stats, contour_blocks, ink_density, ComponentStats,
};
use crate::processors::geometry::BBox;
use crate::utils::image::{crop_bbox, laplacian_variance, rgb_to_gray};

/// Classification of a detected region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionKind {
    /// Textual content.
    Text,
    /// Photographic content (portrait, hologram, dense imagery).
    Photo,
}

/// Vertical position of a region by its top edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerticalBand {
    /// Top third of the page.
    Upper,
    /// Middle third.
    Center,
    /// Bottom third.
    Lower,
}

/// One detected visual block. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Region {
    /// 1-based detection-order id.
    pub id: usize,
    /// Pixel bounding box.
    pub bbox: BBox,
    /// Fraction of foreground (ink) pixels inside the box.
    pub density: f64,
    /// Text or photo.
    pub kind: RegionKind,
    /// Vertical band of the top edge.
    pub band: VerticalBand,
}

/// One or more regions merged by proximity and alignment. Photo groups
/// are always singletons.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    /// 1-based group id.
    pub id: usize,
    /// Kind inherited from the member regions.
    pub kind: RegionKind,
    /// Union of the member bounding boxes.
    pub bbox: BBox,
    /// Member regions, owned by the group.
    pub regions: Vec<Region>,
}

/// Grouped regions of one page together with the page's pixel size,
/// which the layout matcher needs for coordinate normalization.
#[derive(Debug, Clone)]
pub struct PageGroups {
    /// Groups in creation order.
    pub groups: Vec<Group>,
    /// (width, height) of the normalized page image.
    pub image_size: (u32, u32),
}

/// Structural segmenter for normalized page images.
#[derive(Debug, Clone)]
pub struct Segmenter {
    config: SegmenterConfig,
}

impl Segmenter {
    /// Creates a segmenter with the given parameters.
    pub fn new(config: SegmenterConfig) -> Self {
        Self { config }
    }

    /// Segments and groups every page. Pages are independent and
    /// processed in parallel.
    pub fn segment_pages(&self, pages: &[RgbImage]) -> Vec<PageGroups> {
        pages
            .par_iter()
            .map(|page| {
                let regions = self.segment(page);
                let groups = self.group_regions(regions);
                PageGroups {
                    groups,
                    image_size: page.dimensions(),
                }
            })
            .collect()
    }

    /// Segments one page into classified regions.
    pub fn segment(&self, page: &RgbImage) -> Vec<Region> {
        let binary = binarize_inverted(page);
        let image_area = page.width() as f64 * page.height() as f64;

        let components = self.filter_components(component_stats(&binary), image_area);
        let mut blocks = self.merge_components(&components);

        // Contour-hierarchy blocks catch framed areas (photo borders,
        // seals) that connected components split apart.
        for contour_box in contour_blocks(&binary, self.config.min_contour_area) {
            let contained = blocks.iter().any(|b| b.contains(&contour_box));
            if !contained {
                blocks.push(contour_box);
            }
        }

        let mut regions = Vec::with_capacity(blocks.len());
        for bbox in blocks {
            let clamped = bbox.clamp_to(page.width(), page.height());
            if clamped.width() <= 0 || clamped.height() <= 0 {
                continue;
            }

            let density = ink_density(&binary, &clamped);
            let kind = self.classify(page, &clamped, density, image_area);
            let band = vertical_band(clamped.y1, page.height());

            regions.push(Region {
                id: regions.len() + 1,
                bbox: clamped,
                density,
                kind,
                band,
            });
        }

        debug!(regions = regions.len(), "page segmented");
        regions
    }

    fn filter_components(
        &self,
        components: Vec<ComponentStats>,
        image_area: f64,
    ) -> Vec<ComponentStats> {
        components
            .into_iter()
            .filter(|c| {
                c.area >= self.config.min_component_area
                    && c.width() >= self.config.min_component_dim as i32
                    && c.height() >= self.config.min_component_dim as i32
                    && (c.area as f64) <= image_area * self.config.max_component_area_fraction
            })
            .collect()
    }

    /// Greedily merges components into blocks: a component joins the
    /// first block within the configured gap on both axes.
    fn merge_components(&self, components: &[ComponentStats]) -> Vec<BBox> {
        let gap = self.config.component_merge_gap;
        let mut blocks: Vec<BBox> = Vec::new();

        for comp in components {
            let mut joined = false;
            for block in blocks.iter_mut() {
                let (dx, dy) = block.axis_gaps(&comp.bbox);
                if dx < gap && dy < gap {
                    *block = block.union(&comp.bbox);
                    joined = true;
                    break;
                }
            }
            if !joined {
                blocks.push(comp.bbox);
            }
        }

        blocks
    }

    /// Photo when the region is large, dense and highly textured;
    /// otherwise text.
    fn classify(&self, page: &RgbImage, bbox: &BBox, density: f64, image_area: f64) -> RegionKind {
        let area = bbox.area() as f64;
        let candidate = area > image_area * self.config.photo_area_fraction
            && density > self.config.photo_min_density;
        if !candidate {
            return RegionKind::Text;
        }

        let texture = crop_bbox(page, bbox)
            .map(|crop| laplacian_variance(&rgb_to_gray(&crop)))
            .unwrap_or(0.0);

        if texture > self.config.photo_min_texture {
            RegionKind::Photo
        } else {
            RegionKind::Text
        }
    }

    /// Groups regions: photos stay singleton; a text region joins the
    /// first text group within the gap distance that also aligns
    /// vertically or horizontally.
    pub fn group_regions(&self, regions: Vec<Region>) -> Vec<Group> {
        let mut groups: Vec<Group> = Vec::new();

        for region in regions {
            if region.kind == RegionKind::Photo {
                groups.push(Group {
                    id: groups.len() + 1,
                    kind: RegionKind::Photo,
                    bbox: region.bbox,
                    regions: vec![region],
                });
                continue;
            }

            let mut joined = false;
            for group in groups.iter_mut() {
                if group.kind != RegionKind::Text {
                    continue;
                }

                let close = region.bbox.gap_distance(&group.bbox)
                    < self.config.group_merge_gap;
                let aligned = region.bbox.vertical_overlap_ratio(&group.bbox)
                    > self.config.min_vertical_overlap
                    || region.bbox.horizontal_overlap_ratio(&group.bbox)
                        > self.config.min_horizontal_overlap;

                if close && aligned {
                    group.bbox = group.bbox.union(&region.bbox);
                    group.regions.push(region.clone());
                    joined = true;
                    break;
                }
            }

            if !joined {
                groups.push(Group {
                    id: groups.len() + 1,
                    kind: RegionKind::Text,
                    bbox: region.bbox,
                    regions: vec![region],
                });
            }
        }

        groups
    }
}

fn vertical_band(top: i32, image_height: u32) -> VerticalBand {
    let fraction = top as f64 / image_height as f64;
    if fraction < 1.0 / 3.0 {
        VerticalBand::Upper
    } else if fraction < 2.0 / 3.0 {
        VerticalBand::Center
    } else {
        VerticalBand::Lower
    }
}
