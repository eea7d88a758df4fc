//! Inline payload encoding for vision-mode.
//!
//! Chat-completion APIs accept images as base64 data-URIs inside the JSON
//! request body, and PDFs as base64 `file` parts. Rasterised pages are
//! PNG-encoded: lossless keeps small print legible for the model.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Cursor;
use tracing::debug;

/// A document fragment embedded directly in the prompt.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InlinePayload {
    /// An image the model looks at.
    Image { mime_type: String, data: String },
    /// A whole file (used for PDFs the engine could not rasterise).
    File {
        filename: String,
        mime_type: String,
        data: String,
    },
}

impl InlinePayload {
    /// Wrap already-encoded image bytes (the original upload) without
    /// re-encoding them.
    pub fn image_from_bytes(bytes: &[u8], mime_type: impl Into<String>) -> Self {
        InlinePayload::Image {
            mime_type: mime_type.into(),
            data: STANDARD.encode(bytes),
        }
    }

    /// Wrap a raw file.
    pub fn file_from_bytes(
        bytes: &[u8],
        filename: impl Into<String>,
        mime_type: impl Into<String>,
    ) -> Self {
        InlinePayload::File {
            filename: filename.into(),
            mime_type: mime_type.into(),
            data: STANDARD.encode(bytes),
        }
    }

    /// `data:<mime>;base64,<data>` form used by the chat API.
    pub fn data_url(&self) -> String {
        match self {
            InlinePayload::Image { mime_type, data } | InlinePayload::File { mime_type, data, .. } => {
                format!("data:{mime_type};base64,{data}")
            }
        }
    }

    /// Length of the base64 data in bytes.
    pub fn encoded_len(&self) -> usize {
        match self {
            InlinePayload::Image { data, .. } | InlinePayload::File { data, .. } => data.len(),
        }
    }
}

impl fmt::Debug for InlinePayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InlinePayload::Image { mime_type, data } => f
                .debug_struct("Image")
                .field("mime_type", mime_type)
                .field("base64_len", &data.len())
                .finish(),
            InlinePayload::File {
                filename,
                mime_type,
                data,
            } => f
                .debug_struct("File")
                .field("filename", filename)
                .field("mime_type", mime_type)
                .field("base64_len", &data.len())
                .finish(),
        }
    }
}

/// Encode a rasterised page as a base64 PNG payload.
pub fn encode_page(img: &DynamicImage) -> Result<InlinePayload, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;

    let payload = InlinePayload::image_from_bytes(&buf, "image/png");
    debug!("Encoded page image → {} bytes base64", payload.encoded_len());
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn encode_small_image() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(10, 10, Rgba([255, 0, 0, 255])));
        let payload = encode_page(&img).expect("encode should succeed");
        let InlinePayload::Image { mime_type, data } = &payload else {
            panic!("expected an image payload");
        };
        assert_eq!(mime_type, "image/png");
        let decoded = STANDARD.decode(data).expect("valid base64");
        assert!(decoded.starts_with(&[0x89, b'P', b'N', b'G']));
    }

    #[test]
    fn data_url_format() {
        let p = InlinePayload::file_from_bytes(b"%PDF", "report.pdf", "application/pdf");
        assert_eq!(p.data_url(), "data:application/pdf;base64,JVBERg==");
    }

    #[test]
    fn debug_does_not_dump_base64() {
        let p = InlinePayload::image_from_bytes(&[7u8; 300], "image/jpeg");
        let dbg = format!("{p:?}");
        assert!(dbg.contains("base64_len"));
        assert!(dbg.len() < 100, "got: {dbg}");
    }
}
