//! Response reconciliation: assistant text → [`ReportFields`], or raw text.
//!
//! Models asked for "JSON only" still wrap it in fences or prose now and
//! then. Fallback order:
//!
//! 1. **Strict**: the trimmed text parses as a JSON object.
//! 2. **Fenced**: an outer Markdown code fence is stripped and the inner
//!    text parses as an object.
//! 3. **Embedded**: a brace-matching scan finds a balanced `{ … }` span,
//!    honouring string literals and escapes, and that span parses.
//! 4. **Raw**: none of the above; the caller keeps the text as-is.
//!
//! Reconciliation never fails and never validates keys or value types.

use crate::output::ReportFields;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::debug;

/// How many opening braces the embedded scan tries before giving up.
const MAX_SCAN_STARTS: usize = 8;

/// Which rule produced the parsed object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseMethod {
    Strict,
    Fenced,
    Embedded,
}

/// Outcome of reconciling one reply.
#[derive(Debug, Clone, PartialEq)]
pub enum Reconciliation {
    Parsed {
        fields: ReportFields,
        method: ParseMethod,
    },
    Raw {
        text: String,
    },
}

impl Reconciliation {
    pub fn fields(&self) -> Option<&ReportFields> {
        match self {
            Reconciliation::Parsed { fields, .. } => Some(fields),
            Reconciliation::Raw { .. } => None,
        }
    }

    pub fn into_fields(self) -> Option<ReportFields> {
        match self {
            Reconciliation::Parsed { fields, .. } => Some(fields),
            Reconciliation::Raw { .. } => None,
        }
    }
}

/// Reconcile the assistant's reply.
pub fn reconcile(assistant_text: &str) -> Reconciliation {
    let trimmed = assistant_text.trim();

    if let Some(map) = parse_object(trimmed) {
        return parsed(map, ParseMethod::Strict);
    }

    if let Some(inner) = strip_outer_fence(trimmed) {
        if let Some(map) = parse_object(inner.trim()) {
            return parsed(map, ParseMethod::Fenced);
        }
    }

    if let Some(map) = scan_embedded_object(trimmed) {
        return parsed(map, ParseMethod::Embedded);
    }

    debug!(
        "Assistant reply is not a JSON object ({} characters), keeping raw text",
        trimmed.chars().count()
    );
    Reconciliation::Raw {
        text: assistant_text.to_string(),
    }
}

fn parsed(map: Map<String, Value>, method: ParseMethod) -> Reconciliation {
    if method != ParseMethod::Strict {
        debug!("Recovered JSON object from reply via {:?} rule", method);
    }
    Reconciliation::Parsed {
        fields: ReportFields::new(map),
        method,
    }
}

fn parse_object(s: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(s) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

static RE_OUTER_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z0-9_-]*[ \t]*\r?\n(.*?)\r?\n?```\s*$").unwrap());

fn strip_outer_fence(s: &str) -> Option<&str> {
    RE_OUTER_FENCE
        .captures(s)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Try the balanced span after each of the first few `{` characters.
fn scan_embedded_object(s: &str) -> Option<Map<String, Value>> {
    s.match_indices('{')
        .take(MAX_SCAN_STARTS)
        .filter_map(|(start, _)| matching_brace(s, start).map(|end| &s[start..=end]))
        .find_map(parse_object)
}

/// Byte index of the `}` closing the `{` at `start`.
fn matching_brace(s: &str, start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (idx, ch) in s[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(start + idx);
                }
            }
            _ => {}
        }
    }
    None
}
