//! Text extraction: turn an uploaded document into [`ExtractedText`].
//!
//! ## Degradation ladder
//!
//! ```text
//! PDF ─▶ text layer ≥ threshold ─────────────▶ usable text
//!  │        │
//!  │        └─ short / empty ─▶ rasterise pages ─▶ PNG payloads
//!  │                               └─ fails ────▶ raw PDF file payload
//!  └─ engine missing / corrupt ─────────────────▶ raw PDF file payload
//! image ────────────────────────────────────────▶ original image payload
//! text/plain ───────────────────────────────────▶ usable text
//! ```
//!
//! Only an empty upload or an unrecognised media type is fatal; every PDF
//! library failure degrades to vision-mode.

use crate::config::AnalysisConfig;
use crate::document::{MediaKind, UploadedDocument};
use crate::error::{ExtractionError, ReportError};
use crate::output::{ExtractedText, ExtractionStatus};
use crate::pipeline::encode::{self, InlinePayload};
use crate::pipeline::pdf::{PdfCapability, PdfEngine, PdfText};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// The extraction stage.
#[derive(Debug, Clone)]
pub struct TextExtractor {
    pdf: PdfCapability,
    min_usable_chars: usize,
    max_vision_pages: usize,
    max_rendered_pixels: u32,
}

impl TextExtractor {
    pub fn new(pdf: PdfCapability, config: &AnalysisConfig) -> Self {
        Self {
            pdf,
            min_usable_chars: config.min_usable_chars,
            max_vision_pages: config.max_vision_pages,
            max_rendered_pixels: config.max_rendered_pixels,
        }
    }

    pub fn pdf_capability(&self) -> &PdfCapability {
        &self.pdf
    }

    /// Extract text from `document`, or prepare it for vision-mode.
    pub async fn extract(&self, document: &UploadedDocument) -> Result<ExtractedText, ReportError> {
        if document.size() == 0 {
            return Err(ReportError::EmptyDocument);
        }

        match document.kind() {
            MediaKind::Pdf => Ok(self.extract_pdf(document).await),
            MediaKind::Image => {
                let mime = document.effective_media_type();
                info!("Image upload ({}), using vision-mode", mime);
                Ok(ExtractedText::unusable(
                    String::new(),
                    vec![InlinePayload::image_from_bytes(document.bytes(), mime)],
                ))
            }
            MediaKind::Text => {
                let text = String::from_utf8_lossy(document.bytes()).trim().to_string();
                if text.is_empty() {
                    return Err(ReportError::EmptyDocument);
                }
                Ok(ExtractedText::usable(text, ExtractionStatus::Complete))
            }
            MediaKind::Unknown => Err(ReportError::UnsupportedMedia {
                media_type: document.media_type().to_string(),
            }),
        }
    }

    async fn extract_pdf(&self, document: &UploadedDocument) -> ExtractedText {
        let engine = match &self.pdf {
            PdfCapability::Available(engine) => Arc::clone(engine),
            PdfCapability::Unavailable { reason } => {
                let mut out = pdf_file_fallback(document, String::new());
                out.issues.push(ExtractionError::EngineUnavailable {
                    reason: reason.clone(),
                });
                return out;
            }
        };

        let bytes = document.shared_bytes();
        let blocking_engine = Arc::clone(&engine);
        let parsed = tokio::task::spawn_blocking(move || blocking_engine.extract_pdf_text(&bytes))
            .await
            .unwrap_or_else(|e| {
                Err(ExtractionError::OpenFailed {
                    detail: format!("text extraction task panicked: {e}"),
                })
            });

        let pdf_text = match parsed {
            Ok(t) => t,
            Err(e) => {
                warn!("PDF text extraction failed, falling back to vision-mode: {}", e);
                let mut out = pdf_file_fallback(document, String::new());
                out.issues.push(e);
                return out;
            }
        };

        let PdfText {
            text,
            page_count,
            info,
            failed_pages,
        } = pdf_text;
        let text = text.trim().to_string();
        let issues: Vec<ExtractionError> = failed_pages
            .iter()
            .map(|(page, detail)| ExtractionError::PageFailed {
                page: *page,
                detail: detail.clone(),
            })
            .collect();

        let char_len = text.chars().count();
        info!(
            "PDF text layer: {} pages, {} characters, {} failed pages",
            page_count,
            char_len,
            failed_pages.len()
        );

        let mut out = if char_len >= self.min_usable_chars {
            let status = if failed_pages.is_empty() {
                ExtractionStatus::Complete
            } else {
                ExtractionStatus::Partial {
                    failed_pages: failed_pages.iter().map(|(p, _)| *p).collect(),
                }
            };
            ExtractedText::usable(text, status)
        } else {
            debug!(
                "Text layer below threshold ({} < {}), rasterising for vision-mode",
                char_len, self.min_usable_chars
            );
            self.vision_from_pages(engine, document, text).await
        };

        out.page_count = Some(page_count);
        out.info = Some(info);
        out.issues.extend(issues);
        out
    }

    /// Rasterise leading pages into PNG payloads; fall back to the raw file.
    async fn vision_from_pages(
        &self,
        engine: Arc<dyn PdfEngine>,
        document: &UploadedDocument,
        text: String,
    ) -> ExtractedText {
        let bytes = document.shared_bytes();
        let max_pages = self.max_vision_pages;
        let max_pixels = self.max_rendered_pixels;

        let rendered = tokio::task::spawn_blocking(move || {
            let images = engine.render_pages(&bytes, max_pages, max_pixels)?;
            images
                .iter()
                .enumerate()
                .map(|(idx, img)| {
                    encode::encode_page(img).map_err(|e| ExtractionError::RenderFailed {
                        page: idx + 1,
                        detail: format!("PNG encoding failed: {e}"),
                    })
                })
                .collect::<Result<Vec<_>, _>>()
        })
        .await
        .unwrap_or_else(|e| {
            Err(ExtractionError::RenderFailed {
                page: 0,
                detail: format!("render task panicked: {e}"),
            })
        });

        match rendered {
            Ok(payloads) if !payloads.is_empty() => {
                info!("Rasterised {} pages for vision-mode", payloads.len());
                ExtractedText::unusable(text, payloads)
            }
            Ok(_) => pdf_file_fallback(document, text),
            Err(e) => {
                warn!("Rasterisation failed, sending the PDF as a file: {}", e);
                let mut out = pdf_file_fallback(document, text);
                out.issues.push(e);
                out
            }
        }
    }
}

fn pdf_file_fallback(document: &UploadedDocument, text: String) -> ExtractedText {
    let filename = document.filename().unwrap_or("report.pdf");
    ExtractedText::unusable(
        text,
        vec![InlinePayload::file_from_bytes(
            document.bytes(),
            filename,
            "application/pdf",
        )],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::DocumentInfo;
    use image::{DynamicImage, Rgba, RgbaImage};
    use tokio_test::{assert_err, assert_ok};

    struct FakeEngine {
        text: Result<PdfText, ExtractionError>,
        pages_to_render: usize,
    }

    impl PdfEngine for FakeEngine {
        fn extract_pdf_text(&self, _bytes: &[u8]) -> Result<PdfText, ExtractionError> {
            self.text.clone()
        }

        fn render_pages(
            &self,
            _bytes: &[u8],
            max_pages: usize,
            _max_pixels: u32,
        ) -> Result<Vec<DynamicImage>, ExtractionError> {
            if self.pages_to_render == 0 {
                return Err(ExtractionError::RenderFailed {
                    page: 1,
                    detail: "no bitmap".into(),
                });
            }
            Ok((0..self.pages_to_render.min(max_pages))
                .map(|_| DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 255]))))
                .collect())
        }
    }

    fn extractor(engine: FakeEngine) -> TextExtractor {
        TextExtractor::new(
            PdfCapability::from_engine(Arc::new(engine)),
            &AnalysisConfig::default(),
        )
    }

    fn pdf_doc() -> UploadedDocument {
        UploadedDocument::new(b"%PDF-1.7 fake".to_vec(), "application/pdf", Some("cbc.pdf".into()))
    }

    fn pdf_text(text: &str, pages: usize) -> PdfText {
        PdfText {
            text: text.to_string(),
            page_count: pages,
            info: DocumentInfo::default(),
            failed_pages: Vec::new(),
        }
    }

    #[tokio::test]
    async fn text_pdf_is_usable() {
        let body = "Hemoglobin 9.1 g/dL (low). Platelets 410 x10^9/L. Impression: microcytic anemia.";
        let ex = extractor(FakeEngine {
            text: Ok(pdf_text(body, 2)),
            pages_to_render: 0,
        });
        let out = assert_ok!(ex.extract(&pdf_doc()).await);
        assert!(out.is_usable());
        assert!(out.char_len > 0);
        assert_eq!(out.status, ExtractionStatus::Complete);
        assert_eq!(out.page_count, Some(2));
        assert!(out.payloads.is_empty());
    }

    #[tokio::test]
    async fn failing_pages_make_partial() {
        let mut t = pdf_text(&"Normal sinus rhythm. ".repeat(10), 3);
        t.failed_pages = vec![(2, "broken".into())];
        let ex = extractor(FakeEngine {
            text: Ok(t),
            pages_to_render: 0,
        });
        let out = ex.extract(&pdf_doc()).await.unwrap();
        assert_eq!(
            out.status,
            ExtractionStatus::Partial {
                failed_pages: vec![2]
            }
        );
        assert_eq!(out.issues.len(), 1);
    }

    #[tokio::test]
    async fn library_failure_degrades_to_file_payload() {
        let ex = extractor(FakeEngine {
            text: Err(ExtractionError::OpenFailed {
                detail: "xref table corrupt".into(),
            }),
            pages_to_render: 0,
        });
        let out = ex.extract(&pdf_doc()).await.unwrap();
        assert!(!out.is_usable());
        assert_eq!(out.payloads.len(), 1);
        assert!(matches!(out.payloads[0], InlinePayload::File { .. }));
        assert!(matches!(out.issues[0], ExtractionError::OpenFailed { .. }));
    }

    #[tokio::test]
    async fn scanned_pdf_is_rasterised() {
        let ex = extractor(FakeEngine {
            text: Ok(pdf_text("  \n ", 10)),
            pages_to_render: 10,
        });
        let out = ex.extract(&pdf_doc()).await.unwrap();
        assert!(!out.is_usable());
        assert_eq!(out.payloads.len(), AnalysisConfig::default().max_vision_pages);
        assert!(out
            .payloads
            .iter()
            .all(|p| matches!(p, InlinePayload::Image { mime_type, .. } if mime_type == "image/png")));
        assert_eq!(out.page_count, Some(10));
    }

    #[tokio::test]
    async fn render_failure_falls_back_to_file() {
        let ex = extractor(FakeEngine {
            text: Ok(pdf_text("short", 1)),
            pages_to_render: 0,
        });
        let out = ex.extract(&pdf_doc()).await.unwrap();
        assert!(!out.is_usable());
        assert_eq!(out.text, "short");
        assert!(matches!(out.payloads[0], InlinePayload::File { .. }));
    }

    #[tokio::test]
    async fn unavailable_engine_sends_file() {
        let ex = TextExtractor::new(
            PdfCapability::Unavailable {
                reason: "libpdfium.so not found".into(),
            },
            &AnalysisConfig::default(),
        );
        let out = ex.extract(&pdf_doc()).await.unwrap();
        assert!(!out.is_usable());
        assert!(matches!(
            out.issues[0],
            ExtractionError::EngineUnavailable { .. }
        ));
    }

    #[tokio::test]
    async fn image_keeps_original_bytes() {
        let ex = extractor(FakeEngine {
            text: Ok(PdfText::default()),
            pages_to_render: 0,
        });
        let doc = UploadedDocument::new(vec![0xFF, 0xD8, 0xFF, 0xE0, 1, 2, 3], "image/jpeg", None);
        let out = ex.extract(&doc).await.unwrap();
        assert!(!out.is_usable());
        assert_eq!(
            out.payloads,
            vec![InlinePayload::image_from_bytes(doc.bytes(), "image/jpeg")]
        );
    }

    #[tokio::test]
    async fn plain_text_is_usable() {
        let ex = extractor(FakeEngine {
            text: Ok(PdfText::default()),
            pages_to_render: 0,
        });
        let doc = UploadedDocument::new("  TSH 6.2 mIU/L  ", "text/plain", None);
        let out = ex.extract(&doc).await.unwrap();
        assert!(out.is_usable());
        assert_eq!(out.text, "TSH 6.2 mIU/L");
    }

    #[tokio::test]
    async fn empty_and_unknown_uploads_are_fatal() {
        let ex = extractor(FakeEngine {
            text: Ok(PdfText::default()),
            pages_to_render: 0,
        });
        let empty = UploadedDocument::new(Vec::new(), "application/pdf", None);
        assert!(matches!(
            assert_err!(ex.extract(&empty).await),
            ReportError::EmptyDocument
        ));

        let zip = UploadedDocument::new(b"PK\x03\x04".to_vec(), "application/zip", None);
        assert!(matches!(
            assert_err!(ex.extract(&zip).await),
            ReportError::UnsupportedMedia { .. }
        ));
    }
}
