//! Utility functions: image helpers, perspective transform, logging setup.

pub mod image;
pub mod transform;

pub use image::{
    crop_bbox, crop_gray_bbox, gray_stats, laplacian_variance, pad_replicate, rgb_to_gray,
};
pub use transform::{perspective_transform, warp_quad_to_rect};

/// Initializes tracing with an env-filter subscriber. Intended for
/// binaries and examples; libraries embedding the pipeline should set up
/// their own subscriber.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}
