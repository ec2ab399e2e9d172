//! Identity-document verification pipeline.
//!
//! `veridoc` validates identity-document submissions: it decodes and
//! quality-checks the page images, rectifies the document geometry,
//! segments each page into structural regions, matches those regions
//! against a per-document-type layout template, scores the recognized
//! text and optionally compares the document portrait with a selfie.
//! All signals fuse into one accept/reject decision.
//!
//! Heavy collaborators stay outside the crate: OCR backends implement
//! [`pipeline::OcrEngine`], face models implement
//! [`pipeline::FaceEmbedder`], PDF rendering plugs in through
//! [`pipeline::PageDecoder`] and persistence through
//! [`pipeline::ResultSink`].
//!
//! # Modules
//!
//! - [`core`] - Configuration and error types
//! - [`processors`] - Geometry and binary-image primitives
//! - [`pipeline`] - The verification stages and their orchestration
//! - [`utils`] - Image helpers, perspective transform, logging setup

pub mod core;
pub mod pipeline;
pub mod processors;
pub mod utils;

pub use crate::core::config::PipelineConfig;
pub use crate::core::errors::{PipelineStage, VerifyError, VerifyResult};
pub use pipeline::{
    DocumentPipeline, DocumentPipelineBuilder, VerificationOutcome, VerificationRequest,
};
