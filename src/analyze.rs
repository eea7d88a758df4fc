//! Pipeline orchestration: one document in, one [`PipelineResult`] out.
//!
//! [`Analyzer`] is built once at startup and shared behind an `Arc`. It holds
//! no mutable state, so concurrent runs never interact.
//!
//! ## Stages
//!
//! ```text
//! extract ─▶ build prompt ─▶ invoke (deadline) ─▶ reconcile ─▶ Success
//!    │            │               │
//!    └────────────┴───────────────┴──▶ Failure { stage, message, details }
//! ```
//!
//! A run never returns `Err` and never unwinds: stage errors and panics are
//! both converted into [`PipelineResult::Failure`].

use crate::config::AnalysisConfig;
use crate::document::{Language, UploadedDocument};
use crate::error::{FailureStage, ReportError};
use crate::output::{AnalysisFailure, AnalysisSuccess, PipelineResult};
use crate::pipeline::extract::TextExtractor;
use crate::pipeline::llm::{self, ChatProvider, OpenAiProvider};
use crate::pipeline::pdf::PdfCapability;
use crate::pipeline::prompt::PromptBuilder;
use crate::pipeline::reconcile::{reconcile, Reconciliation};
use futures::FutureExt;
use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// The report-analysis pipeline.
pub struct Analyzer {
    config: AnalysisConfig,
    extractor: TextExtractor,
    builder: PromptBuilder,
    provider: Option<Arc<dyn ChatProvider>>,
}

impl Analyzer {
    /// Build an analyzer, probing for pdfium once.
    pub fn from_config(config: AnalysisConfig) -> Self {
        let pdf = PdfCapability::detect(config.pdfium_library.as_deref());
        match &pdf {
            PdfCapability::Available(_) => info!("PDF engine available"),
            PdfCapability::Unavailable { reason } => warn!(
                "PDF engine unavailable, PDFs will be sent as files: {}",
                reason
            ),
        }
        Self::new(config, pdf)
    }

    /// Build an analyzer around an explicit PDF capability.
    ///
    /// The provider is resolved from most to least specific:
    /// 1. `config.provider`, used as-is;
    /// 2. `config.api_key`, wrapped in an [`OpenAiProvider`] for `config.api_base`;
    /// 3. none: every run that reaches the provider stage fails with
    ///    `configuration error`.
    pub fn new(config: AnalysisConfig, pdf: PdfCapability) -> Self {
        let provider: Option<Arc<dyn ChatProvider>> = match (&config.provider, &config.api_key) {
            (Some(p), _) => Some(Arc::clone(p)),
            (None, Some(_)) => Some(Arc::new(OpenAiProvider::from_config(&config))),
            (None, None) => None,
        };
        Self {
            extractor: TextExtractor::new(pdf, &config),
            builder: PromptBuilder::new(config.text_budget_chars),
            provider,
            config,
        }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn pdf_capability(&self) -> &PdfCapability {
        self.extractor.pdf_capability()
    }

    /// Whether a provider credential is configured.
    pub fn has_provider(&self) -> bool {
        self.provider.is_some()
    }

    /// Analyse one document.
    pub async fn run(&self, document: UploadedDocument, language: Language) -> PipelineResult {
        let start = Instant::now();
        info!(
            "Analysing {} ({}, {} bytes, language={})",
            document.filename().unwrap_or("<unnamed>"),
            document.media_type(),
            document.size(),
            language
        );

        let outcome = AssertUnwindSafe(self.run_stages(&document, language))
            .catch_unwind()
            .await;

        let result = match outcome {
            Ok(Ok(success)) => PipelineResult::Success(Box::new(success)),
            Ok(Err(e)) => {
                let stage = e.stage();
                warn!("Analysis failed at {} stage: {}", stage, e);
                PipelineResult::Failure(AnalysisFailure {
                    stage,
                    details: e.to_string(),
                })
            }
            Err(panic) => {
                let detail = panic_message(panic.as_ref());
                error!("Analysis panicked: {}", detail);
                PipelineResult::Failure(AnalysisFailure {
                    stage: FailureStage::Unexpected,
                    details: detail,
                })
            }
        };

        info!(
            "Analysis finished in {}ms (ok={})",
            start.elapsed().as_millis(),
            result.is_success()
        );
        result
    }

    async fn run_stages(
        &self,
        document: &UploadedDocument,
        language: Language,
    ) -> Result<AnalysisSuccess, ReportError> {
        // ── Step 1: Extract ──────────────────────────────────────────────────
        let extracted = self.extractor.extract(document).await?;
        for issue in &extracted.issues {
            warn!("Extraction issue: {}", issue);
        }

        // ── Step 2: Build prompt ─────────────────────────────────────────────
        let prompt = self.builder.build(&extracted, language)?;
        let mode = prompt.mode();

        // ── Step 3: Invoke ───────────────────────────────────────────────────
        let provider = self
            .provider
            .as_deref()
            .ok_or_else(|| ReportError::provider_not_configured("openai"))?;
        let reply = llm::invoke(provider, &prompt, &self.config).await?;

        // ── Step 4: Reconcile ────────────────────────────────────────────────
        let reconciled = reconcile(&reply.assistant_text);
        if let Reconciliation::Parsed { fields, .. } = &reconciled {
            let missing = fields.missing_keys();
            if !missing.is_empty() {
                warn!("Model reply is missing keys: {}", missing.join(", "));
            }
        }

        Ok(AnalysisSuccess {
            filename: document.filename().map(str::to_string),
            length: document.size(),
            fields: reconciled.into_fields(),
            assistant_text: reply.assistant_text,
            provider_response: reply.raw_response,
            extracted,
            mode,
            language,
        })
    }
}

impl fmt::Debug for Analyzer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Analyzer")
            .field("config", &self.config)
            .field("extractor", &self.extractor)
            .field("builder", &self.builder)
            .field("provider", &self.provider.as_ref().map(|p| p.name().to_string()))
            .finish()
    }
}

/// Synchronous wrapper around [`Analyzer::run`].
///
/// Creates a temporary tokio runtime internally.
pub fn analyze_sync(
    analyzer: &Analyzer,
    document: UploadedDocument,
    language: Language,
) -> Result<PipelineResult, ReportError> {
    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| ReportError::Internal(format!("Failed to create tokio runtime: {e}")))?;
    Ok(runtime.block_on(analyzer.run(document, language)))
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("pipeline panicked: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("pipeline panicked: {s}")
    } else {
        "pipeline panicked".to_string()
    }
}
