//! Error types for the medreport library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`ReportError`]: **Fatal** for one pipeline run: the document cannot be
//!   analysed at all (nothing to send to the model, provider not configured,
//!   provider rejected the call, deadline exceeded). The orchestrator turns
//!   these into [`crate::output::PipelineResult::Failure`].
//!
//! * [`ExtractionError`]: **Non-fatal**: the PDF library could not produce a
//!   text layer (corrupt file, library missing, one bad page). The extractor
//!   records it and degrades to vision-mode instead of failing the request.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// All fatal errors returned by the medreport pipeline.
#[derive(Debug, Error)]
pub enum ReportError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The upload carried zero bytes.
    #[error("Uploaded document is empty")]
    EmptyDocument,

    /// The upload could not be read as a PDF, an image or plain text, and
    /// therefore yields neither text nor an inline payload.
    #[error("Unsupported media type '{media_type}': expected a PDF, an image or plain text")]
    UnsupportedMedia { media_type: String },

    /// Extraction produced neither usable text nor an inline payload.
    #[error("Document yielded neither text nor an image to analyse")]
    NoContent,

    // ── Configuration errors ──────────────────────────────────────────────
    /// No provider credential is configured.
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Provider errors ───────────────────────────────────────────────────
    /// The provider answered with a non-success HTTP status.
    ///
    /// `body` is the upstream response body, verbatim.
    #[error("LLM API error {status}: {body}")]
    ProviderStatus { status: u16, body: String },

    /// The request never produced an HTTP response (DNS, TLS, reset, …)
    /// or the response body was not JSON.
    #[error("LLM API request failed: {0}")]
    ProviderTransport(String),

    /// The provider call did not finish before the deadline.
    #[error("LLM API call timed out after {timeout_ms}ms")]
    ProviderTimeout { timeout_ms: u64 },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error (panicked blocking task, bad encoder state).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ReportError {
    /// The credential for `provider` is missing.
    pub fn provider_not_configured(provider: &str) -> Self {
        ReportError::ProviderNotConfigured {
            provider: provider.to_string(),
            hint: "Set OPENAI_API_KEY to enable report analysis.".to_string(),
        }
    }

    /// Pipeline stage this error terminates.
    pub fn stage(&self) -> FailureStage {
        match self {
            ReportError::EmptyDocument
            | ReportError::UnsupportedMedia { .. }
            | ReportError::NoContent => FailureStage::Extraction,
            ReportError::ProviderNotConfigured { .. } | ReportError::InvalidConfig(_) => {
                FailureStage::Configuration
            }
            ReportError::ProviderStatus { .. } | ReportError::ProviderTransport(_) => {
                FailureStage::Provider
            }
            ReportError::ProviderTimeout { .. } => FailureStage::Timeout,
            ReportError::Internal(_) => FailureStage::Unexpected,
        }
    }
}

/// A non-fatal error from the PDF text layer.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
pub enum ExtractionError {
    /// pdfium could not be bound at startup.
    #[error("PDF engine unavailable: {reason}")]
    EngineUnavailable { reason: String },

    /// The document could not be opened (corrupt, encrypted, truncated).
    #[error("PDF could not be opened: {detail}")]
    OpenFailed { detail: String },

    /// A single page's text layer could not be read.
    #[error("Page {page}: text extraction failed: {detail}")]
    PageFailed { page: usize, detail: String },

    /// Page rasterisation for vision-mode failed.
    #[error("Page {page}: rasterisation failed: {detail}")]
    RenderFailed { page: usize, detail: String },
}

/// Which pipeline stage a failed run stopped in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    Extraction,
    Configuration,
    Provider,
    Timeout,
    Unexpected,
}

impl FailureStage {
    /// Short error kind used in the `error` field of the HTTP envelope.
    pub fn error_kind(&self) -> &'static str {
        match self {
            FailureStage::Extraction => "extraction failed",
            FailureStage::Configuration => "configuration error",
            FailureStage::Provider => "provider call failed",
            FailureStage::Timeout => "provider timeout",
            FailureStage::Unexpected => "unexpected error",
        }
    }
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureStage::Extraction => "extraction",
            FailureStage::Configuration => "configuration",
            FailureStage::Provider => "provider",
            FailureStage::Timeout => "timeout",
            FailureStage::Unexpected => "unexpected",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_status_display_keeps_body_verbatim() {
        let e = ReportError::ProviderStatus {
            status: 429,
            body: r#"{"error":{"message":"Rate limit reached"}}"#.into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("429"), "got: {msg}");
        assert!(msg.contains(r#"{"error":{"message":"Rate limit reached"}}"#));
    }

    #[test]
    fn timeout_display() {
        let e = ReportError::ProviderTimeout { timeout_ms: 300_000 };
        assert!(e.to_string().contains("300000ms"));
    }

    #[test]
    fn stages_are_classified() {
        assert_eq!(ReportError::EmptyDocument.stage(), FailureStage::Extraction);
        assert_eq!(
            ReportError::ProviderNotConfigured {
                provider: "openai".into(),
                hint: String::new(),
            }
            .stage(),
            FailureStage::Configuration
        );
        assert_eq!(
            ReportError::ProviderTransport("reset".into()).stage(),
            FailureStage::Provider
        );
        assert_eq!(
            ReportError::ProviderTimeout { timeout_ms: 1 }.stage(),
            FailureStage::Timeout
        );
        assert_eq!(
            ReportError::Internal("boom".into()).stage(),
            FailureStage::Unexpected
        );
    }

    #[test]
    fn provider_not_configured_names_the_variable() {
        let e = ReportError::provider_not_configured("openai");
        let msg = e.to_string();
        assert!(msg.contains("'openai'"), "got: {msg}");
        assert!(msg.contains("OPENAI_API_KEY"));
        assert_eq!(e.stage(), FailureStage::Configuration);
    }

    #[test]
    fn configuration_kind_is_distinct_from_provider_kind() {
        assert_ne!(
            FailureStage::Configuration.error_kind(),
            FailureStage::Provider.error_kind()
        );
        assert!(FailureStage::Configuration.error_kind().contains("configuration"));
    }

    #[test]
    fn page_failure_display() {
        let e = ExtractionError::PageFailed {
            page: 3,
            detail: "no text layer".into(),
        };
        assert!(e.to_string().contains("Page 3"));
    }
}
