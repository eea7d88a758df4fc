//! End-to-end tests against a live provider and a real pdfium build.
//!
//! Gated behind `E2E_ENABLED` so they do not run in CI unless explicitly
//! requested. They also need `OPENAI_API_KEY` and, for the PDF cases, a
//! report in `./test_cases/`.
//!
//! Run with:
//!   E2E_ENABLED=1 PDFIUM_LIB_PATH=/opt/pdfium/lib cargo test --test e2e -- --nocapture

use medreport::{
    AnalysisConfig, Analyzer, Language, PipelineResult, PromptMode, TriageUrgency,
    UploadedDocument, PROMPT_VERSION,
};
use std::path::PathBuf;

// ── Test helpers ─────────────────────────────────────────────────────────────

fn test_cases_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("test_cases")
}

/// Skip unless E2E_ENABLED and OPENAI_API_KEY are set.
macro_rules! e2e_skip_unless_ready {
    () => {{
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP — set E2E_ENABLED=1 to run e2e tests");
            return;
        }
        if std::env::var("OPENAI_API_KEY").is_err() {
            println!("SKIP — OPENAI_API_KEY not set");
            return;
        }
    }};
    ($path:expr) => {{
        e2e_skip_unless_ready!();
        let p: PathBuf = $path;
        if !p.exists() {
            println!("SKIP — test file not found: {}", p.display());
            return;
        }
        p
    }};
}

fn analyzer() -> Analyzer {
    let config = AnalysisConfig::from_env().expect("valid environment configuration");
    Analyzer::from_config(config)
}

fn assert_schema(result: &PipelineResult, context: &str) {
    let PipelineResult::Success(s) = result else {
        panic!("[{context}] expected success, got {result:?}");
    };
    let fields = s
        .fields
        .as_ref()
        .unwrap_or_else(|| panic!("[{context}] reply was not JSON: {}", s.assistant_text));
    let missing = fields.missing_keys();
    assert!(
        missing.is_empty(),
        "[{context}] {PROMPT_VERSION} reply is missing keys: {missing:?}"
    );
    assert!(
        fields.triage_urgency().is_some(),
        "[{context}] triage_urgency not one of {:?}",
        TriageUrgency::ALL
    );
}

// ── Live tests ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_plain_text_report() {
    e2e_skip_unless_ready!();
    let doc = UploadedDocument::new(
        "COMPLETE BLOOD COUNT\nPatient: J. Doe, 34 y, F\nHemoglobin 9.8 g/dL (L)\n\
         MCV 71 fL (L)\nFerritin 6 ng/mL (L)\nImpression: microcytic hypochromic anemia, \
         likely iron deficiency.",
        "text/plain",
        Some("cbc.txt".into()),
    );
    let result = analyzer().run(doc, Language::English).await;
    assert_schema(&result, "cbc.txt");
}

#[tokio::test]
async fn test_plain_text_report_arabic() {
    e2e_skip_unless_ready!();
    let doc = UploadedDocument::new(
        "Chest X-ray PA view. Lungs clear. No effusion. Heart size normal. Impression: normal study.",
        "text/plain",
        None,
    );
    let result = analyzer().run(doc, Language::Arabic).await;
    assert_schema(&result, "cxr-ar");
    if let PipelineResult::Success(s) = &result {
        let summary = s.fields.as_ref().and_then(|f| f.get_str("summary_for_patient"));
        assert!(
            summary.is_some_and(|t| t.chars().any(|c| ('\u{0600}'..='\u{06FF}').contains(&c))),
            "expected Arabic summary, got {summary:?}"
        );
    }
}

#[tokio::test]
async fn test_pdf_report() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("report.pdf"));
    let doc = UploadedDocument::from_path(&path).await.unwrap();
    let result = analyzer().run(doc, Language::English).await;
    assert_schema(&result, "report.pdf");
}

#[tokio::test]
async fn test_scanned_pdf_uses_vision_mode() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("scanned.pdf"));
    let doc = UploadedDocument::from_path(&path).await.unwrap();
    let result = analyzer().run(doc, Language::English).await;
    if let PipelineResult::Success(s) = &result {
        assert_eq!(s.mode, PromptMode::Vision);
    }
    assert_schema(&result, "scanned.pdf");
}
