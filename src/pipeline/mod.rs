//! Pipeline stages for medical-report analysis.
//!
//! Each submodule implements one step and is testable on its own.
//!
//! ## Data Flow
//!
//! ```text
//! extract ──▶ prompt ──▶ llm ──▶ reconcile
//! (pdfium)   (schema)   (chat)  (JSON recovery)
//! ```
//!
//! 1. [`extract`]: resolve the media kind and read the PDF text layer on the
//!    blocking pool via [`pdf`]; scanned PDFs and images become inline
//!    payloads ([`encode`]) for vision-mode
//! 2. [`prompt`]: embed the text under a character budget, or attach the
//!    payloads
//! 3. [`llm`]: one chat-completion call raced against a deadline; the only
//!    stage with network I/O
//! 4. [`reconcile`]: recover a JSON object from the reply, or keep it raw

pub mod encode;
pub mod extract;
pub mod llm;
pub mod pdf;
pub mod prompt;
pub mod reconcile;
