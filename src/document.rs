//! Input types: the uploaded document and the requested response language.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

/// A document received from a caller.
///
/// Immutable once constructed. Owned by exactly one pipeline run and dropped
/// when that run finishes; nothing is written to disk.
#[derive(Clone)]
pub struct UploadedDocument {
    bytes: Arc<[u8]>,
    media_type: String,
    filename: Option<String>,
}

impl UploadedDocument {
    pub fn new(
        bytes: impl Into<Vec<u8>>,
        media_type: impl Into<String>,
        filename: Option<String>,
    ) -> Self {
        Self {
            bytes: Arc::from(bytes.into()),
            media_type: media_type.into().trim().to_ascii_lowercase(),
            filename,
        }
    }

    /// Read a local file, guessing the media type from its extension.
    pub async fn from_path(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned());
        let media_type = filename
            .as_deref()
            .and_then(media_type_for_filename)
            .unwrap_or("application/octet-stream");
        Ok(Self::new(bytes, media_type, filename))
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Cheap shared handle on the payload, for blocking-pool work.
    pub fn shared_bytes(&self) -> Arc<[u8]> {
        Arc::clone(&self.bytes)
    }

    /// Declared media type, lower-cased, possibly with parameters.
    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    pub fn filename(&self) -> Option<&str> {
        self.filename.as_deref()
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    /// Resolve what kind of document this is.
    ///
    /// The declared type wins unless it is missing or generic; then magic
    /// bytes are sniffed, and finally the filename extension is consulted.
    pub fn kind(&self) -> MediaKind {
        let declared = MediaKind::from_media_type(&self.media_type);
        if declared != MediaKind::Unknown {
            return declared;
        }
        let sniffed = MediaKind::sniff(&self.bytes);
        if sniffed != MediaKind::Unknown {
            return sniffed;
        }
        self.filename
            .as_deref()
            .and_then(media_type_for_filename)
            .map(MediaKind::from_media_type)
            .unwrap_or(MediaKind::Unknown)
    }

    /// The concrete media type to use for an inline payload.
    ///
    /// Same precedence as [`kind`](Self::kind).
    pub fn effective_media_type(&self) -> String {
        let essence = essence(&self.media_type);
        if MediaKind::from_media_type(essence) != MediaKind::Unknown {
            return essence.to_string();
        }
        if let Some(sniffed) = sniff_media_type(&self.bytes) {
            return sniffed.to_string();
        }
        self.filename
            .as_deref()
            .and_then(media_type_for_filename)
            .unwrap_or("application/octet-stream")
            .to_string()
    }
}

impl fmt::Debug for UploadedDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadedDocument")
            .field("media_type", &self.media_type)
            .field("filename", &self.filename)
            .field("size", &self.bytes.len())
            .finish()
    }
}

/// Broad document category driving the extraction strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Pdf,
    Image,
    Text,
    Unknown,
}

impl MediaKind {
    /// Classify a declared media type such as `application/pdf; charset=binary`.
    pub fn from_media_type(media_type: &str) -> Self {
        let essence = essence(media_type);
        match essence {
            "application/pdf" | "application/x-pdf" => MediaKind::Pdf,
            "text/plain" => MediaKind::Text,
            _ if essence.starts_with("image/") => MediaKind::Image,
            _ => MediaKind::Unknown,
        }
    }

    /// Classify raw bytes by their magic number.
    pub fn sniff(bytes: &[u8]) -> Self {
        sniff_media_type(bytes)
            .map(MediaKind::from_media_type)
            .unwrap_or(MediaKind::Unknown)
    }
}

fn essence(media_type: &str) -> &str {
    media_type.split(';').next().unwrap_or("").trim()
}

fn sniff_media_type(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(b"%PDF") {
        Some("application/pdf")
    } else if bytes.starts_with(&[0x89, b'P', b'N', b'G']) {
        Some("image/png")
    } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("image/jpeg")
    } else if bytes.starts_with(b"GIF8") {
        Some("image/gif")
    } else if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        Some("image/webp")
    } else {
        None
    }
}

fn media_type_for_filename(name: &str) -> Option<&'static str> {
    let ext = Path::new(name).extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "pdf" => Some("application/pdf"),
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        "txt" => Some("text/plain"),
        _ => None,
    }
}

/// Language the field values are written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    English,
    Arabic,
}

impl Language {
    /// ISO 639-1 code.
    pub fn code(&self) -> &'static str {
        match self {
            Language::English => "en",
            Language::Arabic => "ar",
        }
    }

    /// Parse a caller preference, falling back to English for anything
    /// unrecognised or absent.
    pub fn from_preference(pref: Option<&str>) -> Self {
        pref.and_then(|p| p.parse().ok()).unwrap_or_default()
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        // Accept region-tagged codes such as "ar-SA" or "en_US".
        let primary = s.split(['-', '_']).next().unwrap_or("");
        match primary {
            "en" | "english" => Ok(Language::English),
            "ar" | "arabic" => Ok(Language::Arabic),
            _ if s == "العربية" => Ok(Language::Arabic),
            _ => Err(format!("unsupported language '{s}'")),
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declared_type_wins() {
        let doc = UploadedDocument::new(b"%PDF-1.7".to_vec(), "image/png", None);
        assert_eq!(doc.kind(), MediaKind::Image);
    }

    #[test]
    fn octet_stream_is_sniffed() {
        let doc = UploadedDocument::new(b"%PDF-1.4\n...".to_vec(), "application/octet-stream", None);
        assert_eq!(doc.kind(), MediaKind::Pdf);
        assert_eq!(doc.effective_media_type(), "application/pdf");
    }

    #[test]
    fn jpeg_magic_is_sniffed() {
        let doc = UploadedDocument::new(vec![0xFF, 0xD8, 0xFF, 0xE0, 0, 0], "", None);
        assert_eq!(doc.kind(), MediaKind::Image);
        assert_eq!(doc.effective_media_type(), "image/jpeg");
    }

    #[test]
    fn filename_extension_is_last_resort() {
        let doc = UploadedDocument::new(
            b"garbage".to_vec(),
            "application/octet-stream",
            Some("scan.JPG".into()),
        );
        assert_eq!(doc.kind(), MediaKind::Image);
        assert_eq!(doc.effective_media_type(), "image/jpeg");
    }

    #[test]
    fn media_type_parameters_are_ignored() {
        assert_eq!(
            MediaKind::from_media_type("application/pdf; charset=binary"),
            MediaKind::Pdf
        );
        assert_eq!(MediaKind::from_media_type("text/plain; charset=utf-8"), MediaKind::Text);
    }

    #[test]
    fn unknown_stays_unknown() {
        let doc = UploadedDocument::new(b"PK\x03\x04".to_vec(), "application/zip", Some("a.zip".into()));
        assert_eq!(doc.kind(), MediaKind::Unknown);
    }

    #[test]
    fn language_preferences() {
        assert_eq!(Language::from_preference(Some("ar")), Language::Arabic);
        assert_eq!(Language::from_preference(Some("ar-SA")), Language::Arabic);
        assert_eq!(Language::from_preference(Some("English")), Language::English);
        assert_eq!(Language::from_preference(Some("fr")), Language::English);
        assert_eq!(Language::from_preference(None), Language::English);
    }

    #[test]
    fn debug_hides_payload() {
        let doc = UploadedDocument::new(b"secret report".to_vec(), "text/plain", None);
        assert!(!format!("{doc:?}").contains("secret"));
    }
}
