//! Prompt construction: [`ExtractedText`] + [`Language`] → [`ExtractionPrompt`].
//!
//! Text-mode embeds the extracted text, capped at the character budget.
//! Vision-mode attaches the inline payloads instead. The output is a pure
//! function of the inputs.

use crate::document::Language;
use crate::error::ReportError;
use crate::output::{ExtractedText, PromptMode};
use crate::pipeline::encode::InlinePayload;
use crate::prompts::{
    language_rule, EXTRACTION_INSTRUCTIONS, SYSTEM_PROMPT, TEXT_MODE_LEAD, VISION_MODE_LEAD,
};
use tracing::debug;

/// What accompanies the instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum PromptBody {
    Text {
        /// The embedded text, at most `budget` characters.
        text: String,
        truncated: bool,
        /// Character count before truncation.
        original_chars: usize,
    },
    Vision { payloads: Vec<InlinePayload> },
}

/// The final instruction sent to the model. Built once per run.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionPrompt {
    pub system: String,
    /// Schema instructions plus the language rule.
    pub instruction: String,
    pub body: PromptBody,
    pub language: Language,
}

impl ExtractionPrompt {
    pub fn mode(&self) -> PromptMode {
        match self.body {
            PromptBody::Text { .. } => PromptMode::Text,
            PromptBody::Vision { .. } => PromptMode::Vision,
        }
    }

    /// The embedded report text, for text-mode prompts.
    pub fn embedded_text(&self) -> Option<&str> {
        match &self.body {
            PromptBody::Text { text, .. } => Some(text),
            PromptBody::Vision { .. } => None,
        }
    }

    /// Payloads to attach, empty for text-mode.
    pub fn attachments(&self) -> &[InlinePayload] {
        match &self.body {
            PromptBody::Text { .. } => &[],
            PromptBody::Vision { payloads } => payloads,
        }
    }

    /// The textual part of the user message.
    pub fn user_text(&self) -> String {
        match &self.body {
            PromptBody::Text { text, .. } => format!(
                "{}\n\n{}\n\"\"\"\n{}\n\"\"\"",
                self.instruction, TEXT_MODE_LEAD, text
            ),
            PromptBody::Vision { .. } => format!("{}\n\n{}", self.instruction, VISION_MODE_LEAD),
        }
    }
}

/// Builds [`ExtractionPrompt`]s under a fixed character budget.
#[derive(Debug, Clone, Copy)]
pub struct PromptBuilder {
    text_budget_chars: usize,
}

impl PromptBuilder {
    pub fn new(text_budget_chars: usize) -> Self {
        Self { text_budget_chars }
    }

    pub fn text_budget_chars(&self) -> usize {
        self.text_budget_chars
    }

    /// Build the prompt for one run.
    ///
    /// Fails only when the extraction is unusable and carries no payload.
    pub fn build(
        &self,
        extracted: &ExtractedText,
        language: Language,
    ) -> Result<ExtractionPrompt, ReportError> {
        let body = if extracted.is_usable() {
            let (text, truncated) = head_chars(&extracted.text, self.text_budget_chars);
            if truncated {
                debug!(
                    "Truncating report text from {} to {} characters",
                    extracted.char_len, self.text_budget_chars
                );
            }
            PromptBody::Text {
                text: text.to_string(),
                truncated,
                original_chars: extracted.char_len,
            }
        } else if extracted.payloads.is_empty() {
            return Err(ReportError::NoContent);
        } else {
            PromptBody::Vision {
                payloads: extracted.payloads.clone(),
            }
        };

        Ok(ExtractionPrompt {
            system: SYSTEM_PROMPT.to_string(),
            instruction: format!("{}\n\n{}", EXTRACTION_INSTRUCTIONS, language_rule(language)),
            body,
            language,
        })
    }
}

/// The first `max` characters of `s`, and whether anything was dropped.
fn head_chars(s: &str, max: usize) -> (&str, bool) {
    match s.char_indices().nth(max) {
        Some((byte_idx, _)) => (&s[..byte_idx], true),
        None => (s, false),
    }
}
