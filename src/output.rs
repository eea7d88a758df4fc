//! Output types: extracted text, report fields and the pipeline result.

use crate::document::Language;
use crate::error::{ExtractionError, FailureStage};
use crate::pipeline::encode::InlinePayload;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

// ── Extraction ───────────────────────────────────────────────────────────

/// How well text extraction went.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExtractionStatus {
    /// Every page yielded text and the total passed the usability threshold.
    Complete,
    /// Usable text, but the listed 1-indexed pages failed.
    Partial { failed_pages: Vec<usize> },
    /// Nothing usable: image upload, scanned PDF, or library failure.
    NoUsableText,
}

/// Metadata read from the PDF info dictionary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentInfo {
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub creator: Option<String>,
    pub producer: Option<String>,
    pub creation_date: Option<String>,
    pub pdf_version: Option<String>,
}

/// Result of the extraction stage. Never mutated after creation.
#[derive(Debug, Clone)]
pub struct ExtractedText {
    /// Extracted text, trimmed. May be non-empty even when not usable.
    pub text: String,
    /// `text.chars().count()`.
    pub char_len: usize,
    pub status: ExtractionStatus,
    /// Page count for PDFs the library could open.
    pub page_count: Option<usize>,
    pub info: Option<DocumentInfo>,
    /// Inline payloads for vision-mode; empty when the text is usable.
    pub payloads: Vec<InlinePayload>,
    /// Non-fatal problems met along the way.
    pub issues: Vec<ExtractionError>,
}

impl ExtractedText {
    /// Usable text extracted from the document.
    pub fn usable(text: String, status: ExtractionStatus) -> Self {
        let char_len = text.chars().count();
        Self {
            text,
            char_len,
            status,
            page_count: None,
            info: None,
            payloads: Vec::new(),
            issues: Vec::new(),
        }
    }

    /// No usable text; the payloads carry the document for vision-mode.
    pub fn unusable(text: String, payloads: Vec<InlinePayload>) -> Self {
        let char_len = text.chars().count();
        Self {
            text,
            char_len,
            status: ExtractionStatus::NoUsableText,
            page_count: None,
            info: None,
            payloads,
            issues: Vec::new(),
        }
    }

    pub fn is_usable(&self) -> bool {
        !matches!(self.status, ExtractionStatus::NoUsableText)
    }
}

// ── Report fields ────────────────────────────────────────────────────────

/// The nine keys the extraction prompt asks for, in prompt order.
pub const REPORT_KEYS: [&str; 9] = [
    "patient_name",
    "age_gender",
    "study",
    "summary_for_patient",
    "impression",
    "findings",
    "recommended_next_steps",
    "specialty_referral",
    "triage_urgency",
];

/// The structured object the model returned.
///
/// Stored exactly as parsed: keys are not validated and values keep their
/// JSON types. Consumers use the accessors and handle absent keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReportFields(Map<String, Value>);

impl ReportFields {
    pub fn new(map: Map<String, Value>) -> Self {
        Self(map)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    /// String value of `key`, if present and a string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// Parsed `triage_urgency`, if present and one of the four levels.
    pub fn triage_urgency(&self) -> Option<TriageUrgency> {
        self.get_str("triage_urgency").and_then(|s| s.parse().ok())
    }

    /// Required keys that are absent or null.
    pub fn missing_keys(&self) -> Vec<&'static str> {
        REPORT_KEYS
            .iter()
            .copied()
            .filter(|k| self.0.get(*k).is_none_or(Value::is_null))
            .collect()
    }
}

/// How soon the patient should seek care.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriageUrgency {
    /// No concern.
    Normal,
    /// Within weeks.
    Low,
    /// Within days.
    Medium,
    /// Same day / emergency.
    High,
}

impl TriageUrgency {
    pub const ALL: [TriageUrgency; 4] = [
        TriageUrgency::Normal,
        TriageUrgency::Low,
        TriageUrgency::Medium,
        TriageUrgency::High,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TriageUrgency::Normal => "normal",
            TriageUrgency::Low => "low",
            TriageUrgency::Medium => "medium",
            TriageUrgency::High => "high",
        }
    }
}

impl FromStr for TriageUrgency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "normal" => Ok(TriageUrgency::Normal),
            "low" => Ok(TriageUrgency::Low),
            "medium" => Ok(TriageUrgency::Medium),
            "high" => Ok(TriageUrgency::High),
            other => Err(format!("unknown triage level '{other}'")),
        }
    }
}

impl fmt::Display for TriageUrgency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Pipeline result ──────────────────────────────────────────────────────

/// Which submission shape was sent to the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptMode {
    Text,
    Vision,
}

/// A completed run.
#[derive(Debug, Clone)]
pub struct AnalysisSuccess {
    pub filename: Option<String>,
    /// Upload size in bytes.
    pub length: usize,
    /// Parsed fields, or `None` when the reply could not be reconciled.
    pub fields: Option<ReportFields>,
    pub assistant_text: String,
    pub provider_response: Value,
    pub extracted: ExtractedText,
    pub mode: PromptMode,
    pub language: Language,
}

/// A run that stopped at `stage`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisFailure {
    pub stage: FailureStage,
    pub details: String,
}

/// The only value a pipeline run returns.
#[derive(Debug, Clone)]
pub enum PipelineResult {
    Success(Box<AnalysisSuccess>),
    Failure(AnalysisFailure),
}

impl PipelineResult {
    pub fn is_success(&self) -> bool {
        matches!(self, PipelineResult::Success(_))
    }

    /// Render the JSON envelope returned to callers.
    pub fn envelope(&self) -> Value {
        match self {
            PipelineResult::Success(s) => serde_json::json!({
                "ok": true,
                "filename": s.filename,
                "length": s.length,
                "pages": s.extracted.page_count,
                "info": s.extracted.info,
                "raw_text": s.extracted.text,
                "ai_raw": s.assistant_text,
                "ai_response_full": s.provider_response,
                "extracted": s.fields,
                "mode": s.mode,
                "language": s.language.code(),
            }),
            PipelineResult::Failure(f) => serde_json::json!({
                "ok": false,
                "error": f.stage.error_kind(),
                "details": f.details,
            }),
        }
    }
}
