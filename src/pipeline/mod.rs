//! The document verification pipeline.
//!
//! This module wires the stages together: input validation, quality
//! gate, geometric normalization, structural segmentation, layout
//! matching, textual scoring, optional biometric comparison and final
//! decision fusion. [`DocumentPipelineBuilder`] is the entry point for
//! assembling a pipeline with its collaborators.

pub mod biometric;
pub mod fusion;
pub mod input;
pub mod layout;
pub mod normalizer;
pub mod quality;
pub mod result;
pub mod segmenter;
pub mod text;

pub use biometric::{BiometricReport, BiometricScorer, FaceDetection, FaceEmbedder};
pub use fusion::{DecisionFusion, FusedDecision};
pub use input::{FileKind, ImagePageDecoder, InputValidator, PageDecoder};
pub use layout::{
    DocumentLayout, FieldMatch, LayoutMatcher, LayoutStore, PageMatch, PageScore, PageTemplate,
    StructuralReport, TemplateField,
};
pub use normalizer::Normalizer;
pub use quality::QualityGate;
pub use result::{FieldRecord, NullSink, PageResult, ResultSink, VerificationOutcome};
pub use segmenter::{Group, PageGroups, Region, RegionKind, Segmenter, VerticalBand};
pub use text::{FieldTextRecord, OcrEngine, TextScorer, TextualReport};

use std::sync::Arc;

use tracing::{debug, info};

use crate::core::config::PipelineConfig;
use crate::core::errors::{VerifyError, VerifyResult};

/// One submission to verify.
#[derive(Debug, Clone)]
pub struct VerificationRequest {
    /// Caller-side identifier carried through to the outcome.
    pub user_id: String,
    /// Document type deciding which layout applies.
    pub document_type_id: u32,
    /// Raw file bodies in page order.
    pub files: Vec<Vec<u8>>,
    /// Optional selfie for biometric comparison.
    pub selfie: Option<Vec<u8>>,
}

/// Builder for [`DocumentPipeline`].
///
/// The layout store and OCR engine are required; the page decoder,
/// face embedder and result sink are optional collaborators.
///
/// # Example
///
/// ```no_run
/// use veridoc::pipeline::{DocumentPipelineBuilder, LayoutStore, OcrEngine};
/// use veridoc::core::errors::VerifyResult;
///
/// struct MyOcr;
/// impl OcrEngine for MyOcr {
///     fn recognize(&self, _region: &image::RgbImage) -> VerifyResult<String> {
///         Ok(String::new())
///     }
/// }
///
/// let store = LayoutStore::from_dir(std::path::Path::new("layouts"))?;
/// let pipeline = DocumentPipelineBuilder::new(store, MyOcr).build()?;
/// # Ok::<(), veridoc::core::errors::VerifyError>(())
/// ```
pub struct DocumentPipelineBuilder {
    store: LayoutStore,
    ocr: Arc<dyn OcrEngine>,
    config: PipelineConfig,
    decoder: Arc<dyn PageDecoder>,
    embedder: Option<Arc<dyn FaceEmbedder>>,
    sink: Arc<dyn ResultSink>,
}

impl DocumentPipelineBuilder {
    /// Creates a builder with the required collaborators.
    pub fn new(store: LayoutStore, ocr: impl OcrEngine + 'static) -> Self {
        Self {
            store,
            ocr: Arc::new(ocr),
            config: PipelineConfig::default(),
            decoder: Arc::new(ImagePageDecoder),
            embedder: None,
            sink: Arc::new(NullSink),
        }
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Replaces the built-in raster decoder, e.g. with a PDF-capable
    /// one.
    pub fn page_decoder(mut self, decoder: impl PageDecoder + 'static) -> Self {
        self.decoder = Arc::new(decoder);
        self
    }

    /// Enables biometric comparison with the given embedder.
    pub fn face_embedder(mut self, embedder: impl FaceEmbedder + 'static) -> Self {
        self.embedder = Some(Arc::new(embedder));
        self
    }

    /// Attaches a persistence sink for finished outcomes.
    pub fn result_sink(mut self, sink: impl ResultSink + 'static) -> Self {
        self.sink = Arc::new(sink);
        self
    }

    /// Builds the pipeline. Installs the global thread pool when the
    /// parallelism policy caps the thread count.
    pub fn build(self) -> VerifyResult<DocumentPipeline> {
        if let Err(error) = self.config.parallel.install_global_thread_pool() {
            // Another component may have installed a pool already; the
            // pipeline works with whatever pool is in place.
            debug!(%error, "global thread pool was not installed");
        }

        Ok(DocumentPipeline {
            validator: InputValidator::new(self.config.input.clone()),
            quality: QualityGate::new(self.config.quality.clone()),
            normalizer: Normalizer::new(self.config.normalizer.clone()),
            segmenter: Segmenter::new(self.config.segmenter.clone()),
            matcher: LayoutMatcher::new(self.store, self.config.layout.clone()),
            text: TextScorer::new(),
            biometric: BiometricScorer::new(),
            fusion: DecisionFusion::new(self.config.fusion.clone()),
            decoder: self.decoder,
            ocr: self.ocr,
            embedder: self.embedder,
            sink: self.sink,
        })
    }
}

/// The assembled verification pipeline.
pub struct DocumentPipeline {
    validator: InputValidator,
    quality: QualityGate,
    normalizer: Normalizer,
    segmenter: Segmenter,
    matcher: LayoutMatcher,
    text: TextScorer,
    biometric: BiometricScorer,
    fusion: DecisionFusion,
    decoder: Arc<dyn PageDecoder>,
    ocr: Arc<dyn OcrEngine>,
    embedder: Option<Arc<dyn FaceEmbedder>>,
    sink: Arc<dyn ResultSink>,
}

impl DocumentPipeline {
    /// Verifies one submission end to end and persists the outcome.
    pub fn verify(&self, request: VerificationRequest) -> VerifyResult<VerificationOutcome> {
        info!(
            user_id = %request.user_id,
            document_type_id = request.document_type_id,
            files = request.files.len(),
            with_selfie = request.selfie.is_some(),
            "verification started"
        );

        let pages = self.validator.decode_all(self.decoder.as_ref(), &request.files)?;
        self.quality.check_all(&pages)?;

        let normalized: Vec<_> = pages
            .iter()
            .map(|page| self.normalizer.normalize(page))
            .collect::<VerifyResult<_>>()?;
        drop(pages);

        let segmented = self.segmenter.segment_pages(&normalized);
        let structural = self
            .matcher
            .match_document(request.document_type_id, &segmented)?;

        let textual =
            self.text
                .score_document(self.ocr.as_ref(), &normalized, &segmented, &structural)?;

        let biometric = match &request.selfie {
            Some(selfie_bytes) => {
                let embedder = self.embedder.as_deref().ok_or_else(|| {
                    VerifyError::biometric(
                        "a selfie was submitted but no face embedder is configured",
                    )
                })?;
                let selfie = input::decode_selfie(selfie_bytes)?;
                Some(self.biometric.verify(embedder, &normalized, &selfie)?)
            }
            None => None,
        };

        let decision = self.fusion.fuse(
            structural.structural_score,
            textual.textual_score,
            biometric.as_ref().map(|b| b.biometric_score),
        );

        let outcome = VerificationOutcome::assemble(
            request.user_id,
            structural,
            &textual,
            biometric,
            &decision,
        );

        self.sink.persist(&outcome)?;

        info!(
            user_id = %outcome.user_id,
            final_score = outcome.final_score,
            is_valid = outcome.is_valid,
            "verification finished"
        );
        Ok(outcome)
    }
}
