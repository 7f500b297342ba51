// Notes module
// Chat-completion prompts for summarizing clinical notes and proposing ICD-10-CM codes


use fancy_regex::Regex;
use std::sync::LazyLock;
use tracing::{debug, info};

use crate::provider::{ChatCompleter, ChatMessage};
use crate::{IcdError, Result};

/// Upper bound on codes the generation prompt asks for
pub const MAX_GENERATED_CODES: usize = 4;

pub const SUMMARY_PROMPT: &str = "You are a doctor's assistant and you are great at summarizing \
clinical notes. Try to keep the information about the history of present illness, past medical \
history and physical exam. The identity of the patient is not important; it is enough to state \
the age and gender of the patient. Do not summarize too much, a good length is 300 words. Start \
the summary directly, without stating that it is a summary.";

static WHITESPACE_RUNS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

/// System prompt for code generation
#[inline]
pub fn generation_prompt() -> String {
    format!(
        "You are an expert medical coding assistant.\n\n\
         Task: Analyze the following summary of a clinical note and provide a list of \
         appropriate ICD-10-CM codes that best relate to the medical information mentioned.\n\n\
         Instructions:\n\n\
         -Provide a maximum of {} ICD-10-CM codes.\n\
         -Format: [Code]: [Description]\n\
         -List each code and its description on a new line.\n\
         -Only include the codes and their descriptions, no extra text.\n\n\
         Clinical Note Summary:\n",
        MAX_GENERATED_CODES
    )
}

/// Collapse every whitespace run to one space and trim the ends
#[inline]
pub fn collapse_whitespace(text: &str) -> String {
    WHITESPACE_RUNS.replace_all(text, " ").trim().to_string()
}

/// Summarize a clinical note to roughly 300 words
#[inline]
pub async fn summarize_note(completer: &dyn ChatCompleter, clinical_note: &str) -> Result<String> {
    if clinical_note.trim().is_empty() {
        return Err(IcdError::InvalidRequest(
            "Provided 'clinical_note' cannot be empty.".to_string(),
        ));
    }

    info!("Summarizing clinical note");
    let messages = [
        ChatMessage::system(SUMMARY_PROMPT),
        ChatMessage::user(clinical_note),
    ];

    completer.complete(&messages).await
}

/// Ask for up to four ICD-10-CM codes, one `[Code]: [Description]` line each
#[inline]
pub async fn generate_codes(
    completer: &dyn ChatCompleter,
    clinical_note_summary: &str,
) -> Result<String> {
    let summary = collapse_whitespace(clinical_note_summary);
    if summary.is_empty() {
        return Err(IcdError::InvalidRequest(
            "Provided 'clinical_note_summary' cannot be empty.".to_string(),
        ));
    }

    info!("Generating ICD-10-CM codes");
    debug!("Normalized summary: {}", summary);

    let messages = [
        ChatMessage::system(generation_prompt()),
        ChatMessage::user(summary),
    ];

    completer.complete(&messages).await
}
