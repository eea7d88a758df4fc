//! # medreport
//!
//! Turn an uploaded medical report (PDF, image or plain text) into a
//! structured, patient-friendly JSON object using an LLM.
//!
//! ## Pipeline Overview
//!
//! ```text
//! upload
//!  │
//!  ├─ 1. Extract    pdfium text layer (spawn_blocking); scanned PDFs and
//!  │                images fall through to vision-mode payloads
//!  ├─ 2. Prompt     fixed schema + language rule, text capped at 24 000 chars
//!  ├─ 3. Invoke     one chat-completion call raced against a deadline
//!  ├─ 4. Reconcile  strict JSON → fenced → embedded object → raw text
//!  └─ 5. Envelope   {ok, filename, length, pages, info, raw_text, ai_raw,
//!                    ai_response_full, extracted, mode, language}
//! ```
//!
//! Every run ends in exactly one [`PipelineResult`]: `Success`, or
//! `Failure` tagged with the stage that stopped it.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use medreport::{AnalysisConfig, Analyzer, Language, UploadedDocument};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Reads OPENAI_API_KEY, MEDREPORT_MODEL, PDFIUM_LIB_PATH, …
//!     let config = AnalysisConfig::from_env()?;
//!     let analyzer = Analyzer::from_config(config);
//!
//!     let document = UploadedDocument::from_path("cbc.pdf").await?;
//!     let result = analyzer.run(document, Language::English).await;
//!     println!("{}", serde_json::to_string_pretty(&result.envelope())?);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `medreport` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! The HTTP service ([`server::router`]) is part of the library so it can be
//! embedded in a larger axum application.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod analyze;
pub mod config;
pub mod document;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod prompts;
pub mod server;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use analyze::{analyze_sync, Analyzer};
pub use config::{AnalysisConfig, AnalysisConfigBuilder};
pub use document::{Language, MediaKind, UploadedDocument};
pub use error::{ExtractionError, FailureStage, ReportError};
pub use output::{
    AnalysisFailure, AnalysisSuccess, DocumentInfo, ExtractedText, ExtractionStatus,
    PipelineResult, PromptMode, ReportFields, TriageUrgency,
};
pub use pipeline::llm::{ChatProvider, ChatRequest, OpenAiProvider, ProviderReply};
pub use pipeline::pdf::{PdfCapability, PdfEngine, PdfiumEngine};
pub use prompts::PROMPT_VERSION;
