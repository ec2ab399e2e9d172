//! Verification outcome assembly and persistence hand-off.

use serde::{Deserialize, Serialize};

use crate::core::errors::VerifyResult;
use crate::pipeline::biometric::BiometricReport;
use crate::pipeline::fusion::FusedDecision;
use crate::pipeline::layout::{PageScore, StructuralReport};
use crate::pipeline::text::TextualReport;
use crate::processors::geometry::NormBBox;

/// One template field's consolidated result: structural match plus the
/// recognized text, when the field carries any.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldRecord {
    pub field: String,
    pub exists: bool,
    /// Merged normalized box of the assigned groups.
    pub assignment: Option<NormBBox>,
    pub iou: f64,
    pub coverage: f64,
    pub spill_penalty: f64,
    /// Recognized text. `None` for graphic fields and fields with no
    /// assignment; `Some` (possibly empty) where OCR ran.
    pub text: Option<String>,
}

/// One page's consolidated result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageResult {
    pub page: usize,
    pub side: String,
    pub score: PageScore,
    pub fields: Vec<FieldRecord>,
}

/// Everything the caller learns about one verified submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationOutcome {
    pub user_id: String,
    pub document_type_id: u32,
    pub structural_score: f64,
    pub textual_score: f64,
    pub biometric: Option<BiometricReport>,
    pub final_score: f64,
    pub is_valid: bool,
    pub pages: Vec<PageResult>,
}

impl VerificationOutcome {
    /// Joins the stage reports into the caller-facing outcome. Text
    /// records are matched to fields by page index and field name.
    pub fn assemble(
        user_id: impl Into<String>,
        structural: StructuralReport,
        textual: &TextualReport,
        biometric: Option<BiometricReport>,
        decision: &FusedDecision,
    ) -> Self {
        let pages = structural
            .pages
            .into_iter()
            .map(|page_match| {
                let fields = page_match
                    .fields
                    .into_iter()
                    .map(|(name, field)| {
                        let text = textual
                            .fields
                            .iter()
                            .find(|t| t.page == page_match.page && t.field == name)
                            .map(|t| t.text.clone());
                        FieldRecord {
                            field: name,
                            exists: field.exists,
                            assignment: field.assigned,
                            iou: field.iou,
                            coverage: field.coverage,
                            spill_penalty: field.spill_penalty,
                            text,
                        }
                    })
                    .collect();

                PageResult {
                    page: page_match.page,
                    side: page_match.side,
                    score: page_match.score,
                    fields,
                }
            })
            .collect();

        Self {
            user_id: user_id.into(),
            document_type_id: structural.document_type_id,
            structural_score: decision.structural_score,
            textual_score: decision.textual_score,
            biometric,
            final_score: decision.final_score,
            is_valid: decision.is_valid,
            pages,
        }
    }
}

/// Persistence hand-off for finished verifications.
pub trait ResultSink: Send + Sync {
    fn persist(&self, outcome: &VerificationOutcome) -> VerifyResult<()>;
}

/// Sink that discards outcomes. The default when no store is attached.
#[derive(Debug, Clone, Default)]
pub struct NullSink;

impl ResultSink for NullSink {
    fn persist(&self, _outcome: &VerificationOutcome) -> VerifyResult<()> {
        Ok(())
    }
}
