//! Pre-flight image quality checks.
//!
//! The Quality Gate is the input-rejection mechanism of the pipeline:
//! every page must pass resolution, brightness, contrast and sharpness
//! checks before any geometric work starts. A single failing page aborts
//! the whole submission.

use image::RgbImage;
use tracing::debug;

use crate::core::config::QualityConfig;
use crate::core::errors::{VerifyError, VerifyResult};
use crate::utils::image::{gray_stats, laplacian_variance, rgb_to_gray};

/// Quality Gate over a list of page images.
#[derive(Debug, Clone)]
pub struct QualityGate {
    config: QualityConfig,
}

impl QualityGate {
    /// Creates a gate with the given thresholds.
    pub fn new(config: QualityConfig) -> Self {
        Self { config }
    }

    /// Checks every page, failing on the first page that violates a
    /// threshold.
    pub fn check_all(&self, pages: &[RgbImage]) -> VerifyResult<()> {
        for (index, page) in pages.iter().enumerate() {
            self.check_page(index, page)?;
        }
        Ok(())
    }

    /// Checks one page. Boundary values pass: a brightness of exactly
    /// 110 or 250 is acceptable.
    pub fn check_page(&self, index: usize, page: &RgbImage) -> VerifyResult<()> {
        let (width, height) = page.dimensions();
        let min = self.config.min_size_px;
        if width < min || height < min {
            return Err(VerifyError::low_quality(
                index,
                format!("image is {width}x{height}px, needs at least {min}px on both axes"),
            ));
        }

        let gray = rgb_to_gray(page);
        let (brightness, contrast) = gray_stats(&gray);
        let (low, high) = self.config.brightness_range;

        if brightness < low {
            return Err(VerifyError::low_quality(
                index,
                "image is too dark to be processed",
            ));
        }
        if brightness > high {
            return Err(VerifyError::low_quality(
                index,
                "image is too bright to be processed",
            ));
        }

        if contrast < self.config.min_contrast {
            return Err(VerifyError::low_quality(
                index,
                "image contrast is too low for text to be recognized",
            ));
        }

        let sharpness = laplacian_variance(&gray);
        if sharpness < self.config.min_sharpness {
            return Err(VerifyError::low_quality(index, "image is not sharp enough"));
        }

        debug!(
            page = index,
            brightness, contrast, sharpness, "quality gate passed"
        );
        Ok(())
    }
}
