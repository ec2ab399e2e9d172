//! Core types of the verification pipeline: errors and configuration.

pub mod config;
pub mod errors;

pub use config::{
    FusionConfig, InputConfig, LayoutConfig, NormalizerConfig, ParallelPolicy, PipelineConfig,
    QualityConfig, SegmenterConfig,
};
pub use errors::{PipelineStage, VerifyError, VerifyResult};
