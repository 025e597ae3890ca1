//! Content extraction: artifact bytes → text or pixels.
//!
//! PDFs are read through their text layer with `lopdf`, page by page in
//! page order, and the per-page text is concatenated. A PDF whose pages carry
//! no text (a scanned report saved as PDF) yields an empty string here; the
//! pipeline decides what to do with that. Images are decoded with `image`
//! into an in-memory pixel buffer at their original resolution.
//!
//! ## Why spawn_blocking?
//!
//! Both decoders are CPU-bound and synchronous. [`extract_blocking`] moves
//! the work onto Tokio's blocking pool so a large upload never stalls the
//! async workers serving other requests.

use super::input::UploadedArtifact;
use crate::domain::{MediaKind, ReportKind};
use crate::error::ExtractionError;
use image::{DynamicImage, ImageFormat};
use lopdf::Document;
use tracing::{debug, info};

/// Analysable content recovered from an artifact. Exactly one variant per run.
#[derive(Debug, Clone)]
pub enum NormalizedContent {
    /// Text recovered from a PDF report.
    PlainText(String),
    /// Pixels of a scan.
    DecodedImage(DecodedImage),
}

impl NormalizedContent {
    pub fn report_kind(&self) -> ReportKind {
        match self {
            NormalizedContent::PlainText(_) => ReportKind::Medical,
            NormalizedContent::DecodedImage(_) => ReportKind::Scan,
        }
    }

    /// True when there is nothing worth sending to the backend.
    pub fn is_empty(&self) -> bool {
        match self {
            NormalizedContent::PlainText(text) => text.trim().is_empty(),
            NormalizedContent::DecodedImage(img) => img.width() == 0 || img.height() == 0,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            NormalizedContent::PlainText(text) => Some(text),
            NormalizedContent::DecodedImage(_) => None,
        }
    }

    pub fn as_image(&self) -> Option<&DecodedImage> {
        match self {
            NormalizedContent::PlainText(_) => None,
            NormalizedContent::DecodedImage(img) => Some(img),
        }
    }
}

/// A decoded scan: pixel buffer plus dimensions.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    image: DynamicImage,
}

impl DecodedImage {
    pub fn new(image: DynamicImage) -> Self {
        Self { image }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width(), self.height())
    }

    pub fn pixels(&self) -> &DynamicImage {
        &self.image
    }
}

/// Convert an uploaded artifact into normalized content.
///
/// Fails when the bytes are not what the declared kind says, when the PDF
/// or image is corrupt, or when the PDF is encrypted. Pure: reads the input
/// buffer and nothing else.
pub fn extract(artifact: &UploadedArtifact) -> Result<NormalizedContent, ExtractionError> {
    artifact.validate(u64::MAX)?;

    match artifact.kind() {
        MediaKind::Pdf => extract_pdf_text(artifact.bytes()).map(NormalizedContent::PlainText),
        kind => decode_image(artifact.bytes(), kind).map(NormalizedContent::DecodedImage),
    }
}

/// [`extract`] on the blocking thread pool.
pub async fn extract_blocking(
    artifact: UploadedArtifact,
) -> Result<NormalizedContent, ExtractionError> {
    tokio::task::spawn_blocking(move || extract(&artifact))
        .await
        .map_err(|e| ExtractionError::TaskFailed(format!("Extraction task panicked: {}", e)))?
}

/// Concatenate the text of every page, in page order.
pub fn extract_pdf_text(bytes: &[u8]) -> Result<String, ExtractionError> {
    let document = Document::load_mem(bytes).map_err(|e| ExtractionError::CorruptPdf {
        detail: e.to_string(),
    })?;

    if document.is_encrypted() {
        return Err(ExtractionError::EncryptedPdf);
    }

    // BTreeMap keyed by 1-based page number, so iteration is page order.
    let pages = document.get_pages();
    info!("PDF loaded: {} pages", pages.len());

    let mut text = String::new();
    for &page_num in pages.keys() {
        let page_text =
            document
                .extract_text(&[page_num])
                .map_err(|e| ExtractionError::PageTextFailed {
                    page: page_num,
                    detail: e.to_string(),
                })?;
        debug!("Page {}: {} chars", page_num, page_text.len());
        text.push_str(&page_text);
    }

    Ok(text)
}

/// Decode image bytes at their original resolution.
pub fn decode_image(bytes: &[u8], kind: MediaKind) -> Result<DecodedImage, ExtractionError> {
    let format = match kind {
        MediaKind::Png => ImageFormat::Png,
        MediaKind::Jpg | MediaKind::Jpeg => ImageFormat::Jpeg,
        MediaKind::Pdf => {
            return Err(ExtractionError::UnsupportedMediaKind {
                extension: kind.extension().to_string(),
            })
        }
    };

    let image = image::load_from_memory_with_format(bytes, format).map_err(|e| {
        ExtractionError::UndecodableImage {
            detail: e.to_string(),
        }
    })?;

    debug!("Decoded {} scan → {}x{} px", kind, image.width(), image.height());
    Ok(DecodedImage::new(image))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Object, Stream};
    use std::io::Cursor;

    /// One page per entry; an empty entry gives a page without text.
    fn pdf_with_pages(pages: &[&str]) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let mut kids = Vec::new();
        for text in pages {
            let operations = if text.is_empty() {
                Vec::new()
            } else {
                vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 12.into()]),
                    Operation::new("Td", vec![72.into(), 700.into()]),
                    Operation::new("Tj", vec![Object::string_literal(*text)]),
                    Operation::new("ET", vec![]),
                ]
            };
            let content = Content { operations };
            let content_id =
                doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            });
            kids.push(Object::from(page_id));
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut buf = Vec::new();
        doc.save_to(&mut buf).unwrap();
        buf
    }

    fn png_bytes(w: u32, h: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(w, h, Rgb([10, 20, 30])));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        buf
    }

    #[test]
    fn single_page_text() {
        let text = extract_pdf_text(&pdf_with_pages(&["Patient stable."])).unwrap();
        assert_eq!(text.trim(), "Patient stable.");
    }

    #[test]
    fn multi_page_text_in_page_order() {
        let bytes = pdf_with_pages(&["Patient stable.", "No abnormalities."]);
        let text = extract_pdf_text(&bytes).unwrap();
        let first = text.find("Patient stable.").expect("page 1 text");
        let second = text.find("No abnormalities.").expect("page 2 text");
        assert!(first < second, "pages out of order: {text:?}");
    }

    #[test]
    fn textless_pdf_yields_empty_string() {
        let artifact = UploadedArtifact::new(pdf_with_pages(&["", ""]), MediaKind::Pdf);
        match extract(&artifact).unwrap() {
            NormalizedContent::PlainText(text) => assert!(text.trim().is_empty()),
            other => panic!("expected text, got {other:?}"),
        }
    }

    #[test]
    fn corrupt_pdf_is_an_error() {
        let artifact = UploadedArtifact::new(b"%PDF-1.4\nnot really a pdf".to_vec(), MediaKind::Pdf);
        assert!(matches!(
            extract(&artifact),
            Err(ExtractionError::CorruptPdf { .. })
        ));
    }

    #[test]
    fn image_keeps_original_resolution() {
        let artifact = UploadedArtifact::new(png_bytes(37, 19), MediaKind::Png);
        let content = extract(&artifact).unwrap();
        assert_eq!(content.report_kind(), ReportKind::Scan);
        assert_eq!(content.as_image().unwrap().dimensions(), (37, 19));
        assert!(!content.is_empty());
    }

    #[test]
    fn truncated_image_is_an_error() {
        let mut bytes = png_bytes(8, 8);
        bytes.truncate(20);
        let artifact = UploadedArtifact::new(bytes, MediaKind::Png);
        assert!(matches!(
            extract(&artifact),
            Err(ExtractionError::UndecodableImage { .. })
        ));
    }

    #[test]
    fn mislabelled_image_is_rejected_before_decoding() {
        let artifact = UploadedArtifact::new(png_bytes(4, 4), MediaKind::Jpeg);
        assert!(matches!(
            extract(&artifact),
            Err(ExtractionError::KindMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn blocking_variant_matches() {
        let artifact = UploadedArtifact::new(pdf_with_pages(&["Sinus rhythm."]), MediaKind::Pdf);
        let content = extract_blocking(artifact).await.unwrap();
        assert_eq!(content.as_text().map(str::trim), Some("Sinus rhythm."));
    }
}
