//! Configuration for the verification pipeline.
//!
//! Each stage has its own config struct with serde defaults, so a
//! deployment can override individual thresholds from a JSON file while
//! leaving the rest at the reference values.

use serde::{Deserialize, Serialize};

/// Limits applied to the raw submission before any decoding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputConfig {
    /// Maximum number of files per submission.
    #[serde(default = "InputConfig::default_max_files")]
    pub max_files: usize,
    /// Maximum size of a single file in bytes.
    #[serde(default = "InputConfig::default_max_file_bytes")]
    pub max_file_bytes: usize,
}

impl InputConfig {
    fn default_max_files() -> usize {
        3
    }

    fn default_max_file_bytes() -> usize {
        7 * 1024 * 1024
    }
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            max_files: Self::default_max_files(),
            max_file_bytes: Self::default_max_file_bytes(),
        }
    }
}

/// Thresholds for the pre-flight image quality checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityConfig {
    /// Minimum pixel size on both axes.
    #[serde(default = "QualityConfig::default_min_size_px")]
    pub min_size_px: u32,
    /// Inclusive mean-brightness range on the grayscale image.
    #[serde(default = "QualityConfig::default_brightness_range")]
    pub brightness_range: (f64, f64),
    /// Minimum grayscale standard deviation.
    #[serde(default = "QualityConfig::default_min_contrast")]
    pub min_contrast: f64,
    /// Minimum Laplacian variance.
    #[serde(default = "QualityConfig::default_min_sharpness")]
    pub min_sharpness: f64,
}

impl QualityConfig {
    fn default_min_size_px() -> u32 {
        500
    }

    fn default_brightness_range() -> (f64, f64) {
        (110.0, 250.0)
    }

    fn default_min_contrast() -> f64 {
        30.0
    }

    fn default_min_sharpness() -> f64 {
        100.0
    }
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            min_size_px: Self::default_min_size_px(),
            brightness_range: Self::default_brightness_range(),
            min_contrast: Self::default_min_contrast(),
            min_sharpness: Self::default_min_sharpness(),
        }
    }
}

/// Parameters for document boundary detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizerConfig {
    /// Gaussian blur sigma applied before edge detection.
    #[serde(default = "NormalizerConfig::default_blur_sigma")]
    pub blur_sigma: f32,
    /// Canny low threshold.
    #[serde(default = "NormalizerConfig::default_canny_low")]
    pub canny_low: f32,
    /// Canny high threshold.
    #[serde(default = "NormalizerConfig::default_canny_high")]
    pub canny_high: f32,
    /// A contour qualifies as the document boundary when its area
    /// exceeds this fraction of the image area.
    #[serde(default = "NormalizerConfig::default_min_area_fraction")]
    pub min_area_fraction: f64,
    /// Polygon approximation epsilon as a fraction of the perimeter.
    #[serde(default = "NormalizerConfig::default_approx_epsilon_fraction")]
    pub approx_epsilon_fraction: f64,
    /// Number of largest contours inspected.
    #[serde(default = "NormalizerConfig::default_max_candidates")]
    pub max_candidates: usize,
}

impl NormalizerConfig {
    fn default_blur_sigma() -> f32 {
        // Matches a 5x5 Gaussian kernel.
        1.1
    }

    fn default_canny_low() -> f32 {
        75.0
    }

    fn default_canny_high() -> f32 {
        200.0
    }

    fn default_min_area_fraction() -> f64 {
        0.2
    }

    fn default_approx_epsilon_fraction() -> f64 {
        0.02
    }

    fn default_max_candidates() -> usize {
        10
    }
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            blur_sigma: Self::default_blur_sigma(),
            canny_low: Self::default_canny_low(),
            canny_high: Self::default_canny_high(),
            min_area_fraction: Self::default_min_area_fraction(),
            approx_epsilon_fraction: Self::default_approx_epsilon_fraction(),
            max_candidates: Self::default_max_candidates(),
        }
    }
}

/// Parameters for structural segmentation and grouping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmenterConfig {
    /// Connected components below this area are discarded.
    #[serde(default = "SegmenterConfig::default_min_component_area")]
    pub min_component_area: u32,
    /// Connected components narrower or shorter than this are discarded.
    #[serde(default = "SegmenterConfig::default_min_component_dim")]
    pub min_component_dim: u32,
    /// Components covering more than this fraction of the image are
    /// discarded (page background).
    #[serde(default = "SegmenterConfig::default_max_component_area_fraction")]
    pub max_component_area_fraction: f64,
    /// Gap in pixels within which components merge into one block.
    #[serde(default = "SegmenterConfig::default_component_merge_gap")]
    pub component_merge_gap: i32,
    /// Minimum area for blocks taken from the contour hierarchy.
    #[serde(default = "SegmenterConfig::default_min_contour_area")]
    pub min_contour_area: f64,
    /// A region qualifies as a photo candidate above this fraction of
    /// the image area.
    #[serde(default = "SegmenterConfig::default_photo_area_fraction")]
    pub photo_area_fraction: f64,
    /// Minimum ink density for photo candidates.
    #[serde(default = "SegmenterConfig::default_photo_min_density")]
    pub photo_min_density: f64,
    /// Minimum Laplacian variance of the grayscale crop for photo
    /// classification.
    #[serde(default = "SegmenterConfig::default_photo_min_texture")]
    pub photo_min_texture: f64,
    /// Gap in pixels within which text regions merge into one group.
    #[serde(default = "SegmenterConfig::default_group_merge_gap")]
    pub group_merge_gap: i32,
    /// Minimum vertical overlap ratio for text grouping.
    #[serde(default = "SegmenterConfig::default_min_vertical_overlap")]
    pub min_vertical_overlap: f64,
    /// Minimum horizontal overlap ratio for text grouping.
    #[serde(default = "SegmenterConfig::default_min_horizontal_overlap")]
    pub min_horizontal_overlap: f64,
}

impl SegmenterConfig {
    fn default_min_component_area() -> u32 {
        40
    }

    fn default_min_component_dim() -> u32 {
        5
    }

    fn default_max_component_area_fraction() -> f64 {
        0.95
    }

    fn default_component_merge_gap() -> i32 {
        10
    }

    fn default_min_contour_area() -> f64 {
        600.0
    }

    fn default_photo_area_fraction() -> f64 {
        0.01
    }

    fn default_photo_min_density() -> f64 {
        0.6
    }

    fn default_photo_min_texture() -> f64 {
        150.0
    }

    fn default_group_merge_gap() -> i32 {
        15
    }

    fn default_min_vertical_overlap() -> f64 {
        0.2
    }

    fn default_min_horizontal_overlap() -> f64 {
        0.4
    }
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            min_component_area: Self::default_min_component_area(),
            min_component_dim: Self::default_min_component_dim(),
            max_component_area_fraction: Self::default_max_component_area_fraction(),
            component_merge_gap: Self::default_component_merge_gap(),
            min_contour_area: Self::default_min_contour_area(),
            photo_area_fraction: Self::default_photo_area_fraction(),
            photo_min_density: Self::default_photo_min_density(),
            photo_min_texture: Self::default_photo_min_texture(),
            group_merge_gap: Self::default_group_merge_gap(),
            min_vertical_overlap: Self::default_min_vertical_overlap(),
            min_horizontal_overlap: Self::default_min_horizontal_overlap(),
        }
    }
}

/// Parameters for layout-template assignment and page scoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutConfig {
    /// Minimum directional overlap ratio (intersection over group area)
    /// for a group to be assigned to a field.
    #[serde(default = "LayoutConfig::default_overlap_threshold")]
    pub overlap_threshold: f64,
    /// A page passes when its final score reaches this value.
    #[serde(default = "LayoutConfig::default_page_pass_score")]
    pub page_pass_score: f64,
}

impl LayoutConfig {
    fn default_overlap_threshold() -> f64 {
        0.3
    }

    fn default_page_pass_score() -> f64 {
        0.55
    }
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            overlap_threshold: Self::default_overlap_threshold(),
            page_pass_score: Self::default_page_pass_score(),
        }
    }
}

/// Parameters for the final decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusionConfig {
    /// A document is valid when its final score reaches this value.
    #[serde(default = "FusionConfig::default_validity_threshold")]
    pub validity_threshold: f64,
}

impl FusionConfig {
    fn default_validity_threshold() -> f64 {
        0.55
    }
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            validity_threshold: Self::default_validity_threshold(),
        }
    }
}

/// Parallelism policy for per-page work.
///
/// Pages are independent through segmentation and layout matching, so
/// they are fanned out on the rayon pool; the pool size can be pinned
/// once at startup.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ParallelPolicy {
    /// Maximum number of rayon threads. None keeps rayon's default.
    #[serde(default)]
    pub max_threads: Option<usize>,
}

impl ParallelPolicy {
    /// Installs the global rayon thread pool with the configured size.
    ///
    /// Call once at application startup. Does nothing when
    /// `max_threads` is None.
    pub fn install_global_thread_pool(&self) -> Result<bool, rayon::ThreadPoolBuildError> {
        if let Some(num_threads) = self.max_threads {
            rayon::ThreadPoolBuilder::new()
                .num_threads(num_threads)
                .build_global()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }
}

/// Aggregate configuration for one pipeline instance.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PipelineConfig {
    /// Raw submission limits.
    #[serde(default)]
    pub input: InputConfig,
    /// Quality Gate thresholds.
    #[serde(default)]
    pub quality: QualityConfig,
    /// Boundary detection parameters.
    #[serde(default)]
    pub normalizer: NormalizerConfig,
    /// Segmentation parameters.
    #[serde(default)]
    pub segmenter: SegmenterConfig,
    /// Layout matching parameters.
    #[serde(default)]
    pub layout: LayoutConfig,
    /// Decision fusion parameters.
    #[serde(default)]
    pub fusion: FusionConfig,
    /// Parallelism policy.
    #[serde(default)]
    pub parallel: ParallelPolicy,
}
