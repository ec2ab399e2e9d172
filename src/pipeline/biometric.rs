//! Face comparison between the document portrait and a selfie.
//!
//! Detection and embedding are delegated to a [`FaceEmbedder`]; the
//! pipeline ships no face model of its own. The scorer finds the main
//! face on the document pages, crops it with a margin, re-detects it on
//! the padded crop and compares embeddings with a similarity curve
//! tuned for low-quality document portraits.

use image::RgbImage;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::errors::{VerifyError, VerifyResult};
use crate::processors::geometry::BBox;
use crate::utils::image::{crop_bbox, pad_replicate};

/// Margin added around the detected document portrait before
/// re-detection, as a fraction of the face box size.
const FACE_CROP_MARGIN: f64 = 0.2;

/// Replicated border added to the document face crop so the detector
/// sees context around the portrait.
const FACE_PAD_RATIO: f32 = 0.6;

/// One detected face with its normalized embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaceDetection {
    /// Pixel bounding box in the searched image.
    pub bbox: BBox,
    /// Detector confidence in [0, 1].
    pub confidence: f64,
    /// L2-normalized embedding vector.
    pub embedding: Vec<f32>,
}

/// Face detector and embedder over an RGB image.
///
/// Implementations must return L2-normalized embeddings so cosine
/// similarity reduces to a dot product.
pub trait FaceEmbedder: Send + Sync {
    /// Detects every face in the image. An empty vector means no face.
    fn detect_faces(&self, image: &RgbImage) -> VerifyResult<Vec<FaceDetection>>;
}

/// Outcome of the biometric comparison.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BiometricReport {
    /// Raw cosine similarity between the two embeddings.
    pub cosine_similarity: f64,
    /// Detector confidence on the document portrait.
    pub document_confidence: f64,
    /// Detector confidence on the selfie.
    pub selfie_confidence: f64,
    /// Final biometric score in [0, 1].
    pub biometric_score: f64,
}

/// Compares the document portrait against a selfie.
#[derive(Debug, Clone, Default)]
pub struct BiometricScorer;

impl BiometricScorer {
    pub fn new() -> Self {
        Self
    }

    /// Runs the full comparison. Fails with a biometric error when no
    /// face is found on either side.
    pub fn verify(
        &self,
        embedder: &dyn FaceEmbedder,
        pages: &[RgbImage],
        selfie: &RgbImage,
    ) -> VerifyResult<BiometricReport> {
        let doc_crop = self
            .find_document_face(embedder, pages)?
            .ok_or_else(|| VerifyError::biometric("no face was found on the document pages"))?;

        let selfie_faces = embedder.detect_faces(selfie)?;
        let selfie_face = select_main_face(&selfie_faces, selfie.dimensions())
            .ok_or_else(|| VerifyError::biometric("no face was detected on the selfie"))?
            .clone();

        // Re-detect on the padded crop so the embedder aligns the
        // portrait the same way it aligns the selfie.
        let padded = pad_replicate(&doc_crop, FACE_PAD_RATIO);
        let doc_faces = embedder.detect_faces(&padded)?;
        let doc_face = select_main_face(&doc_faces, padded.dimensions())
            .ok_or_else(|| {
                VerifyError::biometric("document portrait could not be re-detected")
            })?
            .clone();

        let cosine = cosine_similarity(&doc_face.embedding, &selfie_face.embedding);
        let mapped = similarity_curve(cosine);

        let confidence_factor = 0.4 * doc_face.confidence + 0.6 * selfie_face.confidence;
        let biometric_score = (0.8 * mapped + 0.2 * confidence_factor).clamp(0.0, 1.0);

        debug!(
            cosine, mapped, biometric_score, "biometric comparison finished"
        );

        Ok(BiometricReport {
            cosine_similarity: cosine,
            document_confidence: doc_face.confidence,
            selfie_confidence: selfie_face.confidence,
            biometric_score,
        })
    }

    /// Scans the pages in order and crops the main face of the first
    /// page that has one, with a margin around the face box.
    pub fn find_document_face(
        &self,
        embedder: &dyn FaceEmbedder,
        pages: &[RgbImage],
    ) -> VerifyResult<Option<RgbImage>> {
        for page in pages {
            let faces = embedder.detect_faces(page)?;
            let Some(face) = select_main_face(&faces, page.dimensions()) else {
                continue;
            };

            let margin_x = (face.bbox.width() as f64 * FACE_CROP_MARGIN) as i32;
            let margin_y = (face.bbox.height() as f64 * FACE_CROP_MARGIN) as i32;
            let expanded = BBox::new(
                face.bbox.x1 - margin_x,
                face.bbox.y1 - margin_y,
                face.bbox.x2 + margin_x,
                face.bbox.y2 + margin_y,
            )
            .clamp_to(page.width(), page.height());

            if let Some(crop) = crop_bbox(page, &expanded) {
                return Ok(Some(crop));
            }
        }
        Ok(None)
    }
}

/// Picks the most plausible main face by relative size, centrality and
/// detector confidence, weighted 0.4 / 0.4 / 0.2.
pub fn select_main_face(
    faces: &[FaceDetection],
    image_size: (u32, u32),
) -> Option<&FaceDetection> {
    let (width, height) = image_size;
    let image_area = width as f64 * height as f64;
    let center_x = width as f64 / 2.0;
    let center_y = height as f64 / 2.0;
    let max_dist = (center_x * center_x + center_y * center_y).sqrt();

    let mut best: Option<(&FaceDetection, f64)> = None;
    for face in faces {
        let size_score = face.bbox.area() as f64 / image_area;

        let face_cx = (face.bbox.x1 + face.bbox.x2) as f64 / 2.0;
        let face_cy = (face.bbox.y1 + face.bbox.y2) as f64 / 2.0;
        let dist = ((face_cx - center_x).powi(2) + (face_cy - center_y).powi(2)).sqrt();
        let center_score = 1.0 - dist / max_dist;

        let total = 0.4 * size_score + 0.4 * center_score + 0.2 * face.confidence;
        if best.map_or(true, |(_, s)| total > s) {
            best = Some((face, total));
        }
    }

    best.map(|(face, _)| face)
}

/// Dot product of two normalized embeddings. Mismatched lengths compare
/// over the shorter prefix.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x * y) as f64).sum()
}

/// Maps raw cosine similarity onto the document-vs-selfie score scale.
///
/// Document portraits score lower than selfie-to-selfie comparisons, so
/// the curve lifts mid-range similarities. Piecewise linear and
/// continuous at 0.1, 0.3 and 0.5.
pub fn similarity_curve(cosine: f64) -> f64 {
    if cosine > 0.5 {
        0.7 + 0.3 * (cosine - 0.5) * 2.0
    } else if cosine > 0.3 {
        0.4 + 0.3 * (cosine - 0.3) / 0.2
    } else if cosine > 0.1 {
        0.1 + 0.3 * (cosine - 0.1) / 0.2
    } else {
        cosine
    }
}
