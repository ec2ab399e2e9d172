//! Text extraction and soft textual validation.
//!
//! Fields matched by the layout stage are cropped out of the normalized
//! pages and run through an [`OcrEngine`]. The recognized strings are
//! then scored against per-field expectations derived from the field
//! name: date fields want date-shaped text, identifier fields want a
//! plausible digit run, name fields want mostly letters. Scores are
//! soft; weak text lowers the document's textual score instead of
//! rejecting the submission.

use std::sync::OnceLock;

use image::RgbImage;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::errors::VerifyResult;
use crate::pipeline::layout::StructuralReport;
use crate::pipeline::segmenter::PageGroups;
use crate::utils::image::crop_bbox;

/// Field names containing one of these fragments carry graphics, not
/// readable text, and are skipped by the extractor.
const NON_OCR_KEYWORDS: &[&str] = &[
    "photo", "codigo", "firma", "escudo", "huella", "logo", "microphoto", "qr", "photo_",
    "mariposa", "micro",
];

/// Character recognizer over a cropped field region.
///
/// The pipeline ships no recognizer of its own; embedders plug in their
/// OCR backend through this trait.
pub trait OcrEngine: Send + Sync {
    /// Recognizes the text in one region crop. An empty string means
    /// nothing readable was found.
    fn recognize(&self, region: &RgbImage) -> VerifyResult<String>;
}

/// Extracted and scored text of one field on one page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldTextRecord {
    /// 0-based page index.
    pub page: usize,
    /// Field name from the layout template.
    pub field: String,
    /// Recognized text, possibly empty.
    pub text: String,
    pub format_score: f64,
    pub length_score: f64,
    /// Weighted field score, 0.8 format + 0.2 length. Empty text scores
    /// exactly 0.0.
    pub score: f64,
}

/// Textual validation result for a whole document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextualReport {
    pub fields: Vec<FieldTextRecord>,
    /// Mean of the field scores, 0.0 when no field was scored.
    pub textual_score: f64,
}

/// True when a field name suggests readable text rather than graphics.
pub fn needs_ocr(field_name: &str) -> bool {
    let lower = field_name.to_lowercase();
    !NON_OCR_KEYWORDS.iter().any(|k| lower.contains(k))
}

/// Extracts and scores text for every OCR-worthy field the layout
/// matcher detected.
#[derive(Debug, Clone)]
pub struct TextScorer;

impl TextScorer {
    pub fn new() -> Self {
        Self
    }

    /// Runs OCR over every detected, OCR-worthy field and scores the
    /// results. Assigned groups are read top-to-bottom, left-to-right
    /// and their texts joined with single spaces.
    pub fn score_document(
        &self,
        engine: &dyn OcrEngine,
        pages: &[RgbImage],
        segmented: &[PageGroups],
        report: &StructuralReport,
    ) -> VerifyResult<TextualReport> {
        let mut fields = Vec::new();

        for page_match in &report.pages {
            let (Some(image), Some(groups)) =
                (pages.get(page_match.page), segmented.get(page_match.page))
            else {
                continue;
            };

            for (name, field) in &page_match.fields {
                if !field.exists || !needs_ocr(name) {
                    continue;
                }

                let text = self.read_field_text(engine, image, groups, &field.group_ids)?;
                fields.push(self.score_field(page_match.page, name, text));
            }
        }

        let textual_score = if fields.is_empty() {
            0.0
        } else {
            fields.iter().map(|f| f.score).sum::<f64>() / fields.len() as f64
        };

        debug!(
            fields = fields.len(),
            textual_score, "textual validation finished"
        );

        Ok(TextualReport {
            fields,
            textual_score,
        })
    }

    /// Crops each assigned group in reading order and concatenates the
    /// recognized snippets.
    fn read_field_text(
        &self,
        engine: &dyn OcrEngine,
        image: &RgbImage,
        page: &PageGroups,
        group_ids: &[usize],
    ) -> VerifyResult<String> {
        let mut boxes: Vec<_> = page
            .groups
            .iter()
            .filter(|g| group_ids.contains(&g.id))
            .map(|g| g.bbox)
            .collect();
        boxes.sort_by_key(|b| (b.y1, b.x1));

        let mut texts = Vec::new();
        for bbox in boxes {
            let clamped = bbox.clamp_to(image.width(), image.height());
            if let Some(crop) = crop_bbox(image, &clamped) {
                let text = engine.recognize(&crop)?;
                let text = text.trim();
                if !text.is_empty() {
                    texts.push(text.to_string());
                }
            }
        }

        Ok(texts.join(" "))
    }

    fn score_field(&self, page: usize, field: &str, text: String) -> FieldTextRecord {
        let trimmed = text.trim();
        // A matched field whose OCR came back empty still enters the
        // textual mean, at 0.0. Deliberate: unreadable text lowers the
        // document score instead of being ignored.
        if trimmed.is_empty() {
            return FieldTextRecord {
                page,
                field: field.to_string(),
                text: String::new(),
                format_score: 0.0,
                length_score: 0.0,
                score: 0.0,
            };
        }

        let name = field.to_lowercase();
        let format_score = format_score(&name, trimmed);
        let length_score = length_score(&name, trimmed);
        let score = 0.8 * format_score + 0.2 * length_score;

        FieldTextRecord {
            page,
            field: field.to_string(),
            text: trimmed.to_string(),
            format_score,
            length_score,
            score,
        }
    }
}

impl Default for TextScorer {
    fn default() -> Self {
        Self::new()
    }
}

fn contains_any(name: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|k| name.contains(k))
}

/// Format plausibility in [0, 1] by field category. Fields with no
/// recognized category always score 1.0.
fn format_score(field_name: &str, text: &str) -> f64 {
    if field_name.contains("fecha") {
        date_score(text)
    } else if contains_any(field_name, &["documento", "id", "nuip", "cedula", "dni"]) {
        id_score(text)
    } else if contains_any(field_name, &["nombre", "apellido"]) {
        name_score(text)
    } else {
        1.0
    }
}

fn date_patterns() -> &'static [Regex; 3] {
    static PATTERNS: OnceLock<[Regex; 3]> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            Regex::new(r"^\d{2}/\d{2}/\d{4}$").unwrap(),
            Regex::new(r"^\d{2}-\d{2}-\d{4}$").unwrap(),
            Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap(),
        ]
    })
}

fn date_score(text: &str) -> f64 {
    if date_patterns().iter().any(|p| p.is_match(text)) {
        return 1.0;
    }
    if text.chars().any(|c| c.is_ascii_digit()) {
        return 0.5;
    }
    0.0
}

fn id_score(text: &str) -> f64 {
    let digits = text.chars().filter(|c| c.is_ascii_digit()).count();
    if digits == 0 {
        return 0.0;
    }
    match digits {
        7..=12 => 1.0,
        5..=20 => 0.6,
        _ => 0.3,
    }
}

const NAME_EXTRA_LETTERS: &str = "ÁÉÍÓÚáéíóúÑñÜü";

fn name_score(text: &str) -> f64 {
    let total = text.chars().count().max(1);
    let letters = text
        .chars()
        .filter(|c| c.is_ascii_alphabetic() || NAME_EXTRA_LETTERS.contains(*c))
        .count();
    let ratio = letters as f64 / total as f64;
    let compact_len = text.chars().filter(|c| *c != ' ').count();

    if ratio > 0.9 && compact_len >= 3 {
        1.0
    } else if ratio > 0.7 {
        0.6
    } else {
        0.2
    }
}

/// Length plausibility against per-category ideal ranges, with a soft
/// penalty proportional to the distance outside the range.
fn length_score(field_name: &str, text: &str) -> f64 {
    let len = text.chars().count();

    let (low, high) = if field_name.contains("fecha") {
        (8, 12)
    } else if contains_any(field_name, &["documento", "id", "nuip"]) {
        (5, 20)
    } else if contains_any(field_name, &["nombre", "apellido"]) {
        (2, 50)
    } else {
        (1, 100)
    };

    if (low..=high).contains(&len) {
        return 1.0;
    }

    let dist = (len as i64 - low as i64)
        .abs()
        .min((len as i64 - high as i64).abs()) as f64;
    (1.0 - dist / high as f64).max(0.0)
}
