//! Final decision fusion.
//!
//! Combines the structural, textual and optional biometric scores into
//! one validity score. The weights shift depending on whether a
//! biometric comparison ran, so a submission without a selfie is not
//! penalized for the missing signal.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::config::FusionConfig;

/// Weights applied when a biometric score is present.
const WITH_BIOMETRIC: (f64, f64, f64) = (0.5, 0.3, 0.2);

/// Weights applied when no selfie was submitted.
const WITHOUT_BIOMETRIC: (f64, f64) = (0.65, 0.35);

/// Fused document decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusedDecision {
    pub structural_score: f64,
    pub textual_score: f64,
    pub biometric_score: Option<f64>,
    /// Weighted combination clamped to [0, 1].
    pub final_score: f64,
    /// True when the final score reaches the validity threshold.
    pub is_valid: bool,
}

/// Combines stage scores into the final accept/reject decision.
#[derive(Debug, Clone)]
pub struct DecisionFusion {
    config: FusionConfig,
}

impl DecisionFusion {
    pub fn new(config: FusionConfig) -> Self {
        Self { config }
    }

    /// Fuses the stage scores.
    pub fn fuse(
        &self,
        structural_score: f64,
        textual_score: f64,
        biometric_score: Option<f64>,
    ) -> FusedDecision {
        // Stage scores are clipped before weighting; a page with heavy
        // spill can report a negative structural score and must not drag
        // the weighted sum below the zero-structure case.
        let structural_score = structural_score.clamp(0.0, 1.0);
        let textual_score = textual_score.clamp(0.0, 1.0);

        let raw = match biometric_score {
            Some(biometric) => {
                let (ws, wt, wb) = WITH_BIOMETRIC;
                ws * structural_score + wt * textual_score + wb * biometric
            }
            None => {
                let (ws, wt) = WITHOUT_BIOMETRIC;
                ws * structural_score + wt * textual_score
            }
        };

        let final_score = raw.clamp(0.0, 1.0);
        let is_valid = final_score >= self.config.validity_threshold;

        debug!(
            structural_score,
            textual_score,
            biometric = ?biometric_score,
            final_score,
            is_valid,
            "decision fused"
        );

        FusedDecision {
            structural_score,
            textual_score,
            biometric_score,
            final_score,
            is_valid,
        }
    }
}
