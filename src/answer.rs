//! Grounded answer synthesis
//!
//! Turns a pipeline result into the six-section answer text. Questions
//! without grounding never reach the generator: they get the canned
//! "not enough information" answer instead.

use regex::Regex;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::warn;

use crate::llm::Generator;
use crate::rag::{RAGResult, RetrievalOutcome, SourceRef};

/// Phrase used for every section that has no grounding
pub const NOT_ENOUGH_INFORMATION: &str = "Not enough information in the retrieved pages.";

/// Section headings, in answer order
pub const SECTION_HEADINGS: [&str; 6] = [
    "1) Overview",
    "2) Causes / Risk factors",
    "3) Symptoms",
    "4) Diagnosis",
    "5) Treatment / What you can do",
    "6) When to seek urgent care",
];

static SPLIT_HEADING: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?m)^[ \t]*(\d+)[ \t]*[.)][ \t]*\n(?:[ \t]*\n)*[ \t]*([A-Za-z])").ok());
static HEADING_NUMBER: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?m)^[ \t]*(\d+)[.)][ \t]+").ok());
static BLANK_AFTER_HEADING: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?m)^(\d+\)[ \t][^\n]+)\n(?:[ \t]*\n)+").ok());
static BLANK_BEFORE_BULLET: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\n(?:[ \t]*\n)+([ \t]*[-•*][ \t]+)").ok());
static BLANK_RUNS: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"\n{3,}").ok());

fn rewrite(pattern: &LazyLock<Option<Regex>>, text: String, replacement: &str) -> String {
    match pattern.as_ref() {
        Some(re) => re.replace_all(&text, replacement).into_owned(),
        None => text,
    }
}

/// Answer given when retrieval produced no grounding
pub fn insufficient_answer() -> String {
    SECTION_HEADINGS
        .iter()
        .map(|heading| format!("{}\n{}", heading, NOT_ENOUGH_INFORMATION))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Prompt instructing the generator to answer from the context only
pub fn answer_prompt(question: &str, context: &str) -> String {
    format!(
        "You are a careful medical information assistant.\n\
         \n\
         RULES:\n\
         - Use ONLY the provided context.\n\
         - Do NOT guess or add outside knowledge.\n\
         - If a section is missing, write exactly: {}\n\
         - Do NOT include URLs in the answer body.\n\
         - NO blank lines between a heading and its content.\n\
         \n\
         Use these headings EXACTLY:\n\
         {}\n\
         \n\
         CONTEXT:\n\
         {}\n\
         \n\
         QUESTION:\n\
         {}\n",
        NOT_ENOUGH_INFORMATION,
        SECTION_HEADINGS.join("\n"),
        context,
        question.trim()
    )
}

/// Normalise generator output into compact numbered sections.
///
/// Joins headings split across lines, writes every number as `N) `, drops
/// blank lines after headings and around bullets, and keeps at most one
/// blank line anywhere else.
pub fn tighten_answer(text: &str) -> String {
    let text = text
        .replace("\r\n", "\n")
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n");

    let text = rewrite(&SPLIT_HEADING, text, "$1) $2");
    let text = rewrite(&HEADING_NUMBER, text, "$1) ");
    let text = rewrite(&BLANK_AFTER_HEADING, text, "$1\n");
    let text = rewrite(&BLANK_BEFORE_BULLET, text, "\n$1");
    let text = rewrite(&BLANK_RUNS, text, "\n\n");

    text.trim().to_string()
}

/// Numbered citation list for the selected sources
pub fn format_sources(sources: &[SourceRef]) -> String {
    let mut lines = vec![format!("Sources used ({} unique)", sources.len())];
    if sources.is_empty() {
        lines.push("No sources found.".to_string());
    }
    for (i, source) in sources.iter().enumerate() {
        lines.push(format!("{}. {} (score: {:.3})", i + 1, source.origin_key, source.score));
    }
    lines.join("\n")
}

/// Produces the final answer text for a pipeline result
pub struct AnswerComposer {
    call_timeout: Duration,
}

impl AnswerComposer {
    pub fn new(call_timeout: Duration) -> Self {
        Self { call_timeout }
    }

    /// Grounded answer, or the canned answer when grounding or generation fails
    pub async fn compose(&self, generator: &dyn Generator, result: &RAGResult) -> String {
        let context = match &result.outcome {
            RetrievalOutcome::Grounded { context, .. } => context,
            RetrievalOutcome::Insufficient => return insufficient_answer(),
        };

        let prompt = answer_prompt(&result.question, &context.text);
        match tokio::time::timeout(self.call_timeout, generator.complete(&prompt)).await {
            Ok(Ok(text)) => {
                let tightened = tighten_answer(&text);
                if tightened.is_empty() {
                    insufficient_answer()
                } else {
                    tightened
                }
            }
            Ok(Err(err)) => {
                warn!(error = %err, "answer generation failed");
                insufficient_answer()
            }
            Err(_) => {
                warn!(timeout_ms = self.call_timeout.as_millis() as u64, "answer generation timed out");
                insufficient_answer()
            }
        }
    }
}
