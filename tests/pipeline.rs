//! End-to-end pipeline tests over synthetic document images.

use std::collections::BTreeMap;
use std::io::Cursor;

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};

use veridoc::core::errors::VerifyResult;
use veridoc::pipeline::{
    DocumentLayout, DocumentPipeline, DocumentPipelineBuilder, FaceDetection, FaceEmbedder,
    LayoutStore, OcrEngine, PageTemplate, TemplateField, VerificationRequest,
};
use veridoc::processors::geometry::{BBox, NormBBox};

/// A 600x600 page: light background with two dark text bars. The wide
/// bar is a name, the narrow one a document number.
fn synthetic_page() -> RgbImage {
    let mut img = RgbImage::from_pixel(600, 600, Rgb([230, 230, 230]));
    for y in 80..120 {
        for x in 60..400 {
            img.put_pixel(x, y, Rgb([20, 20, 20]));
        }
    }
    for y in 200..240 {
        for x in 60..260 {
            img.put_pixel(x, y, Rgb([20, 20, 20]));
        }
    }
    img
}

fn encode_png(img: &RgbImage) -> Vec<u8> {
    let mut buf = Vec::new();
    DynamicImage::ImageRgb8(img.clone())
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .unwrap();
    buf
}

/// Recognizer keyed on crop width: wide crops are names, narrow crops
/// are document numbers.
struct StubOcr;

impl OcrEngine for StubOcr {
    fn recognize(&self, region: &RgbImage) -> VerifyResult<String> {
        if region.width() > 300 {
            Ok("MARIA PEREZ".to_string())
        } else {
            Ok("1234567".to_string())
        }
    }
}

/// Embedder that finds one centered face on any non-white image.
struct StubEmbedder;

impl FaceEmbedder for StubEmbedder {
    fn detect_faces(&self, image: &RgbImage) -> VerifyResult<Vec<FaceDetection>> {
        if image.get_pixel(0, 0).0 == [255, 255, 255] {
            return Ok(vec![]);
        }
        let (w, h) = image.dimensions();
        Ok(vec![FaceDetection {
            bbox: BBox::new(w as i32 / 4, h as i32 / 4, 3 * w as i32 / 4, 3 * h as i32 / 4),
            confidence: 0.9,
            embedding: vec![1.0, 0.0],
        }])
    }
}

fn field(x1: f64, y1: f64, x2: f64, y2: f64) -> TemplateField {
    TemplateField::from_bbox(NormBBox::new(x1, y1, x2, y2))
}

fn card_layout(pages: usize) -> DocumentLayout {
    let mut template = BTreeMap::new();
    template.insert("nombre".to_string(), field(0.08, 0.11, 0.69, 0.22));
    template.insert("documento".to_string(), field(0.08, 0.31, 0.46, 0.42));
    let page = PageTemplate {
        side: "front".into(),
        template,
    };
    DocumentLayout {
        document_key: "cedula".into(),
        document_type: Some("national id".into()),
        document_type_id: 1,
        version: Some("1".into()),
        templates: vec![page; pages],
    }
}

fn pipeline(layout: DocumentLayout) -> DocumentPipeline {
    DocumentPipelineBuilder::new(LayoutStore::from_definitions([layout]), StubOcr)
        .build()
        .unwrap()
}

fn request(files: Vec<Vec<u8>>) -> VerificationRequest {
    VerificationRequest {
        user_id: "user-1".into(),
        document_type_id: 1,
        files,
        selfie: None,
    }
}

#[test]
fn valid_submission_passes_end_to_end() {
    let outcome = pipeline(card_layout(1))
        .verify(request(vec![encode_png(&synthetic_page())]))
        .unwrap();

    assert_eq!(outcome.document_type_id, 1);
    assert_eq!(outcome.pages.len(), 1);

    let fields = &outcome.pages[0].fields;
    let nombre = fields.iter().find(|f| f.field == "nombre").unwrap();
    assert!(nombre.exists);
    assert_eq!(nombre.text.as_deref(), Some("MARIA PEREZ"));
    let documento = fields.iter().find(|f| f.field == "documento").unwrap();
    assert!(documento.exists);
    assert_eq!(documento.text.as_deref(), Some("1234567"));

    // Without a selfie the fused score reweights to structure and text.
    let expected = 0.65 * outcome.structural_score + 0.35 * outcome.textual_score;
    assert!((outcome.final_score - expected).abs() < 1e-9);
    assert!((outcome.textual_score - 1.0).abs() < 1e-9);
    assert!(outcome.is_valid);
}

#[test]
fn selfie_adds_a_biometric_signal() {
    let layout = card_layout(1);
    let pipeline = DocumentPipelineBuilder::new(LayoutStore::from_definitions([layout]), StubOcr)
        .face_embedder(StubEmbedder)
        .build()
        .unwrap();

    let selfie = RgbImage::from_pixel(600, 600, Rgb([120, 120, 120]));
    let mut req = request(vec![encode_png(&synthetic_page())]);
    req.selfie = Some(encode_png(&selfie));

    let outcome = pipeline.verify(req).unwrap();
    let biometric = outcome.biometric.as_ref().unwrap();
    assert!((biometric.cosine_similarity - 1.0).abs() < 1e-6);

    let expected = 0.5 * outcome.structural_score
        + 0.3 * outcome.textual_score
        + 0.2 * biometric.biometric_score;
    assert!((outcome.final_score - expected.clamp(0.0, 1.0)).abs() < 1e-9);
}

#[test]
fn selfie_without_embedder_is_a_biometric_error() {
    let mut req = request(vec![encode_png(&synthetic_page())]);
    req.selfie = Some(encode_png(&RgbImage::from_pixel(
        600,
        600,
        Rgb([120, 120, 120]),
    )));

    let err = pipeline(card_layout(1)).verify(req).unwrap_err();
    assert_eq!(err.code(), "BIOMETRIC_ERROR");
}

#[test]
fn one_page_against_a_two_page_layout_is_a_config_mismatch() {
    let err = pipeline(card_layout(2))
        .verify(request(vec![encode_png(&synthetic_page())]))
        .unwrap_err();
    assert_eq!(err.code(), "CONFIGURATION_MISMATCH_ERROR");
}

#[test]
fn unknown_document_type_is_a_config_mismatch() {
    let mut req = request(vec![encode_png(&synthetic_page())]);
    req.document_type_id = 99;
    let err = pipeline(card_layout(1)).verify(req).unwrap_err();
    assert_eq!(err.code(), "CONFIGURATION_MISMATCH_ERROR");
}

#[test]
fn blank_white_page_fails_the_quality_gate() {
    let white = RgbImage::from_pixel(1000, 1000, Rgb([255, 255, 255]));
    let err = pipeline(card_layout(1))
        .verify(request(vec![encode_png(&white)]))
        .unwrap_err();
    assert_eq!(err.code(), "LOW_QUALITY_ERROR");
}

#[test]
fn too_many_files_fail_technical_validation() {
    let file = encode_png(&synthetic_page());
    let err = pipeline(card_layout(1))
        .verify(request(vec![file.clone(), file.clone(), file.clone(), file]))
        .unwrap_err();
    assert_eq!(err.code(), "TECHNICAL_VALIDATION_ERROR");
}

#[test]
fn garbage_bytes_fail_technical_validation() {
    let err = pipeline(card_layout(1))
        .verify(request(vec![b"not an image at all".to_vec()]))
        .unwrap_err();
    assert_eq!(err.code(), "TECHNICAL_VALIDATION_ERROR");
}

#[test]
fn second_page_reuses_the_last_template() {
    let page = encode_png(&synthetic_page());
    let outcome = pipeline(card_layout(1))
        .verify(request(vec![page.clone(), page]))
        .unwrap();
    assert_eq!(outcome.pages.len(), 2);
    assert_eq!(outcome.pages[0].side, "front");
    assert_eq!(outcome.pages[1].side, "page_1");
    assert!(outcome.pages[1].fields.iter().any(|f| f.exists));
}
