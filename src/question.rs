//! Question extraction from free-form input
//!
//! Callers may pipe a whole conversation (policy text, history, then a
//! `QUESTION:` block). Only the last question is retrieved for.

use regex::Regex;
use std::sync::LazyLock;

use crate::errors::{RagError, Result};

/// Single-line input shorter than this is the question itself
const SHORT_INPUT_CHARS: usize = 400;

static QUESTION_MARKER: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:QUESTION|New question):\s*").ok());
static WHITESPACE: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"\s+").ok());

fn collapse_whitespace(text: &str) -> String {
    match WHITESPACE.as_ref() {
        Some(re) => re.replace_all(text.trim(), " ").into_owned(),
        None => text.split_whitespace().collect::<Vec<_>>().join(" "),
    }
}

/// The last question in `input`, whitespace-collapsed. May be empty.
///
/// A short single line is taken as is. Otherwise text after the last
/// `QUESTION:`/`New question:` marker wins, and without a marker the last
/// non-empty line is used.
pub fn extract_last_question(input: &str) -> String {
    let text = input.trim();
    if !text.contains('\n') && text.chars().count() < SHORT_INPUT_CHARS {
        return collapse_whitespace(text);
    }

    let after_marker = QUESTION_MARKER
        .as_ref()
        .and_then(|re| re.find_iter(text).last())
        .map(|m| &text[m.end()..]);

    let question = match after_marker {
        Some(rest) => rest,
        None => text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .last()
            .unwrap_or_default(),
    };

    collapse_whitespace(question)
}

/// Extract the question or fail with `InvalidInput`
pub fn require_question(input: &str) -> Result<String> {
    let question = extract_last_question(input);
    if question.is_empty() {
        Err(RagError::InvalidInput("No question provided".to_string()))
    } else {
        Ok(question)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_line_taken_verbatim() {
        assert_eq!(
            extract_last_question("  What is   high blood pressure?  "),
            "What is high blood pressure?"
        );
    }

    #[test]
    fn test_short_line_with_marker_word_is_kept_whole() {
        assert_eq!(
            extract_last_question("My doctor's question: why is my gout flaring again?"),
            "My doctor's question: why is my gout flaring again?"
        );
    }

    #[test]
    fn test_last_marker_wins() {
        let input = "INSTRUCTIONS (must follow):\n- Use sources.\n\n\
                     Conversation so far:\nUser: What is asthma?\nAssistant: ...\n\n\
                     QUESTION:\nWhat triggers\n  asthma attacks?\n";
        assert_eq!(extract_last_question(input), "What triggers asthma attacks?");
    }

    #[test]
    fn test_markers_are_case_insensitive() {
        let input = "question: first one\nnew QUESTION: second one";
        assert_eq!(extract_last_question(input), "second one");
    }

    #[test]
    fn test_without_marker_takes_last_line() {
        let input = "Some preamble\n\nWhat are the side effects of antibiotics?\n\n";
        assert_eq!(
            extract_last_question(input),
            "What are the side effects of antibiotics?"
        );
    }

    #[test]
    fn test_long_single_line_still_scans_markers() {
        let input = format!("{} QUESTION: is flu contagious?", "context ".repeat(60));
        assert_eq!(extract_last_question(&input), "is flu contagious?");
    }

    #[test]
    fn test_empty_input_is_invalid() {
        assert!(matches!(require_question(" \n\t "), Err(RagError::InvalidInput(_))));
        assert!(matches!(
            require_question("Some history\nQUESTION:\n   "),
            Err(RagError::InvalidInput(_))
        ));
        assert_eq!(require_question("flu?").unwrap(), "flu?");
    }
}
