//! Prompt text for the report-extraction call.
//!
//! Every instruction sent to the model lives here so the schema can be read,
//! diffed and tested in one place. The template is fixed; the only parameter
//! is the language the field values are written in.

use crate::document::Language;

/// Version of the output schema requested by [`EXTRACTION_INSTRUCTIONS`].
///
/// Bump it whenever the key set or the urgency vocabulary changes.
pub const PROMPT_VERSION: &str = "report-v1";

/// System message pinning the model to JSON-only output.
pub const SYSTEM_PROMPT: &str = "You are a strict JSON-only extractor. Return valid JSON only. Never add code fences or explanations.";

/// Extraction instructions: persona, exact schema, per-field rules.
pub const EXTRACTION_INSTRUCTIONS: &str = r#"You explain ANY medical report for worried patients and parents.

Your job:
- Give a calm, clear explanation in SIMPLE language.
- Give SPECIFIC next steps and ONE best doctor specialty.
- Never scare the user unnecessarily, but never hide serious problems.

You MUST return ONLY one valid JSON object. No extra text, no commentary, no code fences.

Return exactly these fields:

{
  "patient_name": "",
  "age_gender": "",
  "study": "",
  "summary_for_patient": "",
  "impression": "",
  "findings": "",
  "recommended_next_steps": "",
  "specialty_referral": "",
  "triage_urgency": ""
}

FIELD RULES:

1) patient_name
- The patient's name if clearly visible in the report. Otherwise "Unknown".

2) age_gender
- Age and sex together, like "3-year-old male". Otherwise "Unknown".

3) study
- The type of report: CBC, NIPT, urine test, MRI, ultrasound, etc.

4) summary_for_patient
- 3-4 short sentences maximum.
- NO medical terms. NO lab names. NO values.
- The overall picture in simple, warm, everyday language.

5) impression
- Bullet style only, one "•" per line.
- Quote at least 2 real medical terms from the report and explain each simply,
  like: • "Term" means ...

6) findings
- Bullet list, one "•" per line.
- Each bullet under 15 words.
- Specific abnormal results only.

7) recommended_next_steps
- MUST NOT be empty.
- 3-6 clear bullets, like:
  • Book an appointment with a [doctor type] within [timeframe].
  • Ask the doctor about [specific issue].
  • Repeat the test in [timeframe].
  • Seek urgent care IF you notice [red flags].

8) specialty_referral
- ONE specialty only, the most relevant to the report.
- Examples: "Pediatric Hematologist", "Pediatric Allergist/Immunologist", "Hematologist", "Pediatrician".

9) triage_urgency
- Exactly one of: "normal" | "low" | "medium" | "high".
- high = same-day / emergency.
- medium = within days.
- low = within weeks.
- normal = no concern.

GLOBAL RULES:
- Every field MUST have unique content. No field may repeat a sentence from another field.
- NO headings like "Summary:" inside fields.
- Never omit a key. If the report is incomplete, still fill every field with your best estimate from context.
- Output ONLY the JSON object."#;

/// Language rule appended to the instructions.
pub fn language_rule(language: Language) -> &'static str {
    match language {
        Language::English => {
            "LANGUAGE:\n- Write every field value in English."
        }
        Language::Arabic => {
            "LANGUAGE:\n- Write every field value in Arabic (العربية).\n- Keep the JSON keys in English exactly as listed.\n- Keep triage_urgency as one of the English words \"normal\", \"low\", \"medium\", \"high\"."
        }
    }
}

/// Closing line for text-mode: the report text follows between `"""` quotes.
pub const TEXT_MODE_LEAD: &str = "Report text:";

/// Closing line for vision-mode: the report is attached.
pub const VISION_MODE_LEAD: &str =
    "The report is attached as images or a file. Read it carefully, including handwriting, stamps and tables.";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::{TriageUrgency, REPORT_KEYS};

    #[test]
    fn instructions_list_every_key() {
        for key in REPORT_KEYS {
            assert!(
                EXTRACTION_INSTRUCTIONS.contains(&format!("\"{key}\"")),
                "missing key {key}"
            );
        }
    }

    #[test]
    fn instructions_define_every_urgency_level() {
        for level in TriageUrgency::ALL {
            assert!(EXTRACTION_INSTRUCTIONS.contains(&format!("\"{}\"", level.as_str())));
        }
        assert!(EXTRACTION_INSTRUCTIONS.contains("high = same-day"));
    }

    #[test]
    fn arabic_rule_keeps_english_keys() {
        let rule = language_rule(Language::Arabic);
        assert!(rule.contains("Arabic"));
        assert!(rule.contains("JSON keys in English"));
    }
}
