//! Core error types for the verification pipeline.
//!
//! Every stage failure surfaces as a [`VerifyError`] with a stable
//! caller-facing code string, so the transport layer can map failures
//! without inspecting message text.

use thiserror::Error;

/// Stages of the verification pipeline, used to attribute internal
/// processing failures to the stage that raised them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    /// Technical validation and image decoding of the raw submission.
    InputValidation,
    /// Pre-flight image quality checks.
    QualityGate,
    /// Document boundary detection and perspective correction.
    Normalization,
    /// Structural segmentation into regions and groups.
    Segmentation,
    /// Layout template assignment and geometric scoring.
    LayoutMatching,
    /// OCR text extraction and plausibility scoring.
    TextScoring,
    /// Face detection and embedding comparison.
    Biometric,
    /// Final score fusion and persistence hand-off.
    Fusion,
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineStage::InputValidation => write!(f, "input validation"),
            PipelineStage::QualityGate => write!(f, "quality gate"),
            PipelineStage::Normalization => write!(f, "normalization"),
            PipelineStage::Segmentation => write!(f, "segmentation"),
            PipelineStage::LayoutMatching => write!(f, "layout matching"),
            PipelineStage::TextScoring => write!(f, "text scoring"),
            PipelineStage::Biometric => write!(f, "biometric"),
            PipelineStage::Fusion => write!(f, "fusion"),
        }
    }
}

/// Errors terminating the verification of one document submission.
///
/// The first five variants correspond to the error kinds exposed to the
/// caller; the remaining variants cover internal defects and collaborator
/// failures that are not expected during normal operation.
#[derive(Debug, Error)]
pub enum VerifyError {
    /// Malformed, oversized or unsupported input files.
    #[error("technical validation: {message}")]
    TechnicalValidation {
        /// Description of the rejected input.
        message: String,
    },

    /// A Quality Gate check failed for one page image.
    #[error("low quality on page {page}: {message}")]
    LowQuality {
        /// Zero-based index of the failing page.
        page: usize,
        /// Description of the failing check.
        message: String,
    },

    /// Geometric normalization failed (degenerate quadrilateral or
    /// unsolvable homography). Boundary-less input does not raise this:
    /// the normalizer falls back to the unmodified image by design.
    #[error("normalization: {message}")]
    Normalization {
        /// Description of the geometric failure.
        message: String,
    },

    /// Face undetectable, selfie decode failure or embedding comparison
    /// failure.
    #[error("biometric: {message}")]
    Biometric {
        /// Description of the biometric failure.
        message: String,
    },

    /// Unknown document type or fewer pages than the layout requires.
    #[error("configuration mismatch: {message}")]
    ConfigMismatch {
        /// Description of the mismatch.
        message: String,
    },

    /// Internal processing defect attributed to a pipeline stage.
    #[error("{stage} failed: {context}")]
    Processing {
        /// The stage where the failure occurred.
        stage: PipelineStage,
        /// Additional context about the failure.
        context: String,
        /// The underlying error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A page image could not be decoded.
    #[error("image decode")]
    ImageDecode(#[source] image::ImageError),

    /// IO error while loading layout templates.
    #[error("io")]
    Io(#[from] std::io::Error),

    /// A layout template file could not be parsed.
    #[error("layout template parse")]
    LayoutParse(#[from] serde_json::Error),
}

impl From<image::ImageError> for VerifyError {
    fn from(error: image::ImageError) -> Self {
        Self::ImageDecode(error)
    }
}

impl VerifyError {
    /// Stable error code surfaced to the transport layer.
    pub fn code(&self) -> &'static str {
        match self {
            VerifyError::TechnicalValidation { .. } | VerifyError::ImageDecode(_) => {
                "TECHNICAL_VALIDATION_ERROR"
            }
            VerifyError::LowQuality { .. } => "LOW_QUALITY_ERROR",
            VerifyError::Normalization { .. } => "NORMALIZATION_ERROR",
            VerifyError::Biometric { .. } => "BIOMETRIC_ERROR",
            VerifyError::ConfigMismatch { .. } => "CONFIGURATION_MISMATCH_ERROR",
            VerifyError::Processing { .. } | VerifyError::Io(_) | VerifyError::LayoutParse(_) => {
                "INTERNAL_ERROR"
            }
        }
    }

    /// Creates a technical validation error.
    pub fn technical(message: impl Into<String>) -> Self {
        Self::TechnicalValidation {
            message: message.into(),
        }
    }

    /// Creates a low quality error for one page.
    pub fn low_quality(page: usize, message: impl Into<String>) -> Self {
        Self::LowQuality {
            page,
            message: message.into(),
        }
    }

    /// Creates a normalization error.
    pub fn normalization(message: impl Into<String>) -> Self {
        Self::Normalization {
            message: message.into(),
        }
    }

    /// Creates a biometric error.
    pub fn biometric(message: impl Into<String>) -> Self {
        Self::Biometric {
            message: message.into(),
        }
    }

    /// Creates a configuration mismatch error.
    pub fn config_mismatch(message: impl Into<String>) -> Self {
        Self::ConfigMismatch {
            message: message.into(),
        }
    }

    /// Wraps an internal error with the stage it occurred in.
    pub fn processing(
        stage: PipelineStage,
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Processing {
            stage,
            context: context.into(),
            source: Box::new(source),
        }
    }
}

/// Convenience alias used throughout the pipeline.
pub type VerifyResult<T> = Result<T, VerifyError>;
