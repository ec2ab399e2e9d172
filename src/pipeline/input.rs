//! Submission intake: file limits, content sniffing and page decoding.
//!
//! Files are typed by magic bytes, never by name or declared MIME type.
//! Every rejection here is a technical validation error; nothing about
//! image content is judged at this stage.

use image::imageops::FilterType;
use image::{DynamicImage, RgbImage};
use tracing::debug;

use crate::core::config::InputConfig;
use crate::core::errors::{VerifyError, VerifyResult};

/// Largest side of a decoded selfie; bigger selfies are downscaled
/// before face detection.
const MAX_SELFIE_SIDE: u32 = 1024;

/// Supported submission file types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Jpeg,
    Png,
    Pdf,
}

/// Sniffs the file type from its leading magic bytes.
pub fn sniff_kind(bytes: &[u8]) -> Option<FileKind> {
    if bytes.starts_with(&[0xFF, 0xD8]) {
        Some(FileKind::Jpeg)
    } else if bytes.starts_with(&[0x89, 0x50, 0x4E, 0x47]) {
        Some(FileKind::Png)
    } else if bytes.starts_with(b"%PDF") {
        Some(FileKind::Pdf)
    } else {
        None
    }
}

/// True when a PDF body declares encryption. Encrypted PDFs cannot be
/// rendered and are rejected up front.
fn pdf_is_encrypted(bytes: &[u8]) -> bool {
    bytes.windows(b"/Encrypt".len()).any(|w| w == b"/Encrypt")
}

/// Decodes one submission file into page images.
///
/// The built-in [`ImagePageDecoder`] covers JPEG and PNG; rendering PDF
/// pages needs an external backend plugged in through this trait.
pub trait PageDecoder: Send + Sync {
    fn decode_pages(&self, bytes: &[u8], kind: FileKind) -> VerifyResult<Vec<RgbImage>>;
}

/// Raster decoder backed by the `image` crate. Rejects PDFs.
#[derive(Debug, Clone, Default)]
pub struct ImagePageDecoder;

impl PageDecoder for ImagePageDecoder {
    fn decode_pages(&self, bytes: &[u8], kind: FileKind) -> VerifyResult<Vec<RgbImage>> {
        match kind {
            FileKind::Jpeg | FileKind::Png => {
                let image = image::load_from_memory(bytes)?;
                Ok(vec![image.to_rgb8()])
            }
            FileKind::Pdf => Err(VerifyError::technical(
                "PDF files need a PDF-capable page decoder",
            )),
        }
    }
}

/// Validates and types a submission's files.
#[derive(Debug, Clone)]
pub struct InputValidator {
    config: InputConfig,
}

impl InputValidator {
    pub fn new(config: InputConfig) -> Self {
        Self { config }
    }

    /// Checks file count, per-file size and content type. Returns the
    /// sniffed kind of each file in submission order.
    pub fn validate(&self, files: &[Vec<u8>]) -> VerifyResult<Vec<FileKind>> {
        if files.is_empty() {
            return Err(VerifyError::technical("submission contains no files"));
        }
        if files.len() > self.config.max_files {
            return Err(VerifyError::technical(format!(
                "submission has {} files, at most {} are allowed",
                files.len(),
                self.config.max_files
            )));
        }

        let mut kinds = Vec::with_capacity(files.len());
        for (index, file) in files.iter().enumerate() {
            if file.len() > self.config.max_file_bytes {
                return Err(VerifyError::technical(format!(
                    "file {index} is {} bytes, the limit is {} bytes",
                    file.len(),
                    self.config.max_file_bytes
                )));
            }

            let kind = sniff_kind(file).ok_or_else(|| {
                VerifyError::technical(format!(
                    "file {index} is not a JPEG, PNG or PDF"
                ))
            })?;

            if kind == FileKind::Pdf && pdf_is_encrypted(file) {
                return Err(VerifyError::technical(format!(
                    "file {index} is an encrypted PDF"
                )));
            }

            kinds.push(kind);
        }

        debug!(files = files.len(), "input validation passed");
        Ok(kinds)
    }

    /// Decodes every file into pages, preserving submission order.
    pub fn decode_all(
        &self,
        decoder: &dyn PageDecoder,
        files: &[Vec<u8>],
    ) -> VerifyResult<Vec<RgbImage>> {
        let kinds = self.validate(files)?;

        let mut pages = Vec::new();
        for (file, kind) in files.iter().zip(kinds) {
            pages.extend(decoder.decode_pages(file, kind)?);
        }

        if pages.is_empty() {
            return Err(VerifyError::technical("submission decoded to zero pages"));
        }
        Ok(pages)
    }
}

/// Decodes a selfie and caps its resolution for face detection.
pub fn decode_selfie(bytes: &[u8]) -> VerifyResult<RgbImage> {
    let image = image::load_from_memory(bytes)
        .map_err(|_| VerifyError::biometric("selfie could not be decoded"))?;
    let (width, height) = (image.width(), image.height());
    let longest = width.max(height);

    if longest <= MAX_SELFIE_SIDE {
        return Ok(image.to_rgb8());
    }

    let scale = MAX_SELFIE_SIDE as f64 / longest as f64;
    let new_width = (width as f64 * scale) as u32;
    let new_height = (height as f64 * scale) as u32;
    let resized = DynamicImage::ImageRgb8(image.to_rgb8()).resize_exact(
        new_width.max(1),
        new_height.max(1),
        FilterType::Triangle,
    );
    Ok(resized.to_rgb8())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb};
    use std::io::Cursor;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, Rgb([120, 130, 140]));
        let mut buf = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        buf
    }

    fn validator() -> InputValidator {
        InputValidator::new(InputConfig::default())
    }

    #[test]
    fn magic_bytes_decide_the_kind() {
        assert_eq!(sniff_kind(&[0xFF, 0xD8, 0xFF, 0xE0]), Some(FileKind::Jpeg));
        assert_eq!(
            sniff_kind(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A]),
            Some(FileKind::Png)
        );
        assert_eq!(sniff_kind(b"%PDF-1.7 ..."), Some(FileKind::Pdf));
        assert_eq!(sniff_kind(b"GIF89a"), None);
        assert_eq!(sniff_kind(b""), None);
    }

    #[test]
    fn too_many_files_are_rejected() {
        let file = png_bytes(4, 4);
        let files = vec![file.clone(), file.clone(), file.clone(), file];
        let err = validator().validate(&files).unwrap_err();
        assert_eq!(err.code(), "TECHNICAL_VALIDATION_ERROR");
    }

    #[test]
    fn empty_submission_is_rejected() {
        let err = validator().validate(&[]).unwrap_err();
        assert_eq!(err.code(), "TECHNICAL_VALIDATION_ERROR");
    }

    #[test]
    fn oversized_file_is_rejected() {
        let mut big = vec![0xFF, 0xD8];
        big.resize(7 * 1024 * 1024 + 1, 0);
        let err = validator().validate(&[big]).unwrap_err();
        assert_eq!(err.code(), "TECHNICAL_VALIDATION_ERROR");
    }

    #[test]
    fn unknown_content_is_rejected_regardless_of_extension() {
        let err = validator().validate(&[b"plain text".to_vec()]).unwrap_err();
        assert_eq!(err.code(), "TECHNICAL_VALIDATION_ERROR");
    }

    #[test]
    fn encrypted_pdf_is_rejected() {
        let pdf = b"%PDF-1.7\n1 0 obj\n<< /Encrypt 2 0 R >>\n".to_vec();
        let err = validator().validate(&[pdf]).unwrap_err();
        assert_eq!(err.code(), "TECHNICAL_VALIDATION_ERROR");

        let plain = b"%PDF-1.7\n1 0 obj\n<< /Pages 2 0 R >>\n".to_vec();
        assert_eq!(validator().validate(&[plain]).unwrap(), vec![FileKind::Pdf]);
    }

    #[test]
    fn png_round_trips_through_the_decoder() {
        let files = vec![png_bytes(8, 6)];
        let pages = validator().decode_all(&ImagePageDecoder, &files).unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].dimensions(), (8, 6));
        assert_eq!(pages[0].get_pixel(3, 3).0, [120, 130, 140]);
    }

    #[test]
    fn builtin_decoder_refuses_pdfs() {
        let pdf = b"%PDF-1.7\n".to_vec();
        let err = validator().decode_all(&ImagePageDecoder, &[pdf]).unwrap_err();
        assert_eq!(err.code(), "TECHNICAL_VALIDATION_ERROR");
    }

    #[test]
    fn large_selfies_are_downscaled() {
        let selfie = decode_selfie(&png_bytes(2048, 1024)).unwrap();
        assert_eq!(selfie.dimensions(), (1024, 512));

        let small = decode_selfie(&png_bytes(640, 480)).unwrap();
        assert_eq!(small.dimensions(), (640, 480));
    }

    #[test]
    fn undecodable_selfie_is_a_biometric_error() {
        let err = decode_selfie(b"not an image").unwrap_err();
        assert_eq!(err.code(), "BIOMETRIC_ERROR");
    }
}
