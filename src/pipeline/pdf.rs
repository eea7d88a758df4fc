//! PDF engine adapter: text layer, document info and page rasterisation.
//!
//! The pipeline never talks to pdfium directly. It holds a
//! [`PdfCapability`] resolved once at startup and calls the fixed-signature
//! [`PdfEngine`] methods on it. A missing or broken pdfium library becomes
//! [`PdfCapability::Unavailable`] rather than a panic, and PDFs then go
//! straight to vision-mode.
//!
//! All engine methods are blocking; callers run them inside
//! `tokio::task::spawn_blocking`.

use crate::error::ExtractionError;
use crate::output::DocumentInfo;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What [`PdfEngine::extract_pdf_text`] yields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PdfText {
    /// Page texts joined with `\n`, in page order.
    pub text: String,
    pub page_count: usize,
    pub info: DocumentInfo,
    /// `(1-indexed page, reason)` for pages whose text layer failed.
    pub failed_pages: Vec<(usize, String)>,
}

/// The only interface the pipeline uses to read PDFs.
pub trait PdfEngine: Send + Sync {
    /// Extract the text layer of every page.
    ///
    /// Fails only when the document cannot be opened at all; single-page
    /// failures are reported in [`PdfText::failed_pages`].
    fn extract_pdf_text(&self, bytes: &[u8]) -> Result<PdfText, ExtractionError>;

    /// Rasterise up to `max_pages` leading pages, longest edge `max_pixels`.
    fn render_pages(
        &self,
        bytes: &[u8],
        max_pages: usize,
        max_pixels: u32,
    ) -> Result<Vec<DynamicImage>, ExtractionError>;
}

/// PDF support resolved at startup.
#[derive(Clone)]
pub enum PdfCapability {
    Available(Arc<dyn PdfEngine>),
    Unavailable { reason: String },
}

impl PdfCapability {
    /// Try to bind pdfium once and report the outcome.
    ///
    /// `library` may point at the shared library itself or at the directory
    /// holding it; `None` uses the system library search path.
    pub fn detect(library: Option<&Path>) -> Self {
        let engine = PdfiumEngine::new(library.map(Path::to_path_buf));
        match engine.bind() {
            Ok(_) => {
                info!("PDF engine ready (pdfium)");
                PdfCapability::Available(Arc::new(engine))
            }
            Err(e) => {
                let reason = format!("{e:?}");
                warn!(
                    "pdfium could not be bound ({}); PDFs will be sent to the model as files",
                    reason
                );
                PdfCapability::Unavailable { reason }
            }
        }
    }

    pub fn from_engine(engine: Arc<dyn PdfEngine>) -> Self {
        PdfCapability::Available(engine)
    }

    pub fn is_available(&self) -> bool {
        matches!(self, PdfCapability::Available(_))
    }
}

impl std::fmt::Debug for PdfCapability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PdfCapability::Available(_) => f.write_str("Available(<dyn PdfEngine>)"),
            PdfCapability::Unavailable { reason } => f
                .debug_struct("Unavailable")
                .field("reason", reason)
                .finish(),
        }
    }
}

/// [`PdfEngine`] backed by the pdfium C++ library.
#[derive(Debug, Clone)]
pub struct PdfiumEngine {
    library: Option<PathBuf>,
}

impl PdfiumEngine {
    pub fn new(library: Option<PathBuf>) -> Self {
        Self { library }
    }

    fn bind(&self) -> Result<Pdfium, PdfiumError> {
        let bindings = match &self.library {
            Some(path) if path.is_dir() => {
                Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(path))?
            }
            Some(path) => Pdfium::bind_to_library(path)?,
            None => Pdfium::bind_to_system_library()?,
        };
        Ok(Pdfium::new(bindings))
    }

    fn bind_or_unavailable(&self) -> Result<Pdfium, ExtractionError> {
        self.bind().map_err(|e| ExtractionError::EngineUnavailable {
            reason: format!("{e:?}"),
        })
    }
}

fn open_failed(e: PdfiumError) -> ExtractionError {
    ExtractionError::OpenFailed {
        detail: format!("{e:?}"),
    }
}

impl PdfEngine for PdfiumEngine {
    fn extract_pdf_text(&self, bytes: &[u8]) -> Result<PdfText, ExtractionError> {
        let pdfium = self.bind_or_unavailable()?;
        let document = pdfium
            .load_pdf_from_byte_slice(bytes, None)
            .map_err(open_failed)?;

        let pages = document.pages();
        let page_count = pages.len() as usize;
        debug!("PDF opened: {} pages", page_count);

        let mut texts = Vec::with_capacity(page_count);
        let mut failed_pages = Vec::new();

        for (idx, page) in pages.iter().enumerate() {
            match page.text() {
                Ok(text) => texts.push(text.all()),
                Err(e) => {
                    warn!("Page {}: text layer unreadable: {:?}", idx + 1, e);
                    failed_pages.push((idx + 1, format!("{e:?}")));
                }
            }
        }

        Ok(PdfText {
            text: texts.join("\n"),
            page_count,
            info: document_info(&document),
            failed_pages,
        })
    }

    fn render_pages(
        &self,
        bytes: &[u8],
        max_pages: usize,
        max_pixels: u32,
    ) -> Result<Vec<DynamicImage>, ExtractionError> {
        let pdfium = self.bind_or_unavailable()?;
        let document = pdfium
            .load_pdf_from_byte_slice(bytes, None)
            .map_err(open_failed)?;

        let render_config = PdfRenderConfig::new()
            .set_target_width(max_pixels as i32)
            .set_maximum_height(max_pixels as i32);

        let mut images = Vec::new();
        for (idx, page) in document.pages().iter().take(max_pages).enumerate() {
            let bitmap = page.render_with_config(&render_config).map_err(|e| {
                ExtractionError::RenderFailed {
                    page: idx + 1,
                    detail: format!("{e:?}"),
                }
            })?;
            let image = bitmap.as_image();
            debug!(
                "Rendered page {} → {}x{} px",
                idx + 1,
                image.width(),
                image.height()
            );
            images.push(image);
        }

        Ok(images)
    }
}

fn document_info(document: &PdfDocument<'_>) -> DocumentInfo {
    let metadata = document.metadata();
    let get_meta = |tag: PdfDocumentMetadataTagType| -> Option<String> {
        metadata.get(tag).and_then(|t| {
            let v = t.value().trim().to_string();
            if v.is_empty() {
                None
            } else {
                Some(v)
            }
        })
    };

    DocumentInfo {
        title: get_meta(PdfDocumentMetadataTagType::Title),
        author: get_meta(PdfDocumentMetadataTagType::Author),
        subject: get_meta(PdfDocumentMetadataTagType::Subject),
        creator: get_meta(PdfDocumentMetadataTagType::Creator),
        producer: get_meta(PdfDocumentMetadataTagType::Producer),
        creation_date: get_meta(PdfDocumentMetadataTagType::CreationDate),
        pdf_version: Some(format!("{:?}", document.version())),
    }
}
