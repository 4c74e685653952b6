// Context assembly: turns a selection into the bounded grounding block
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use crate::rag::types::{Candidate, Selection};

/// Prefix of the attribution line preceding every source block
pub const SOURCE_PREFIX: &str = "SOURCE: ";

static BLANK_RUNS: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"\n{3,}").ok());

/// Context assembly configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Characters kept from each source's text
    pub per_source_chars: usize,
    /// Characters kept from the whole block
    pub max_context_chars: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            per_source_chars: 1400,
            max_context_chars: 8000,
        }
    }
}

/// Assembled context for the generation step
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssembledContext {
    /// The formatted context text
    pub text: String,
    /// Number of source blocks that survived the total budget
    pub document_count: usize,
    /// Origins of those blocks, in order
    pub origin_keys: Vec<String>,
}

impl AssembledContext {
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }

    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }
}

/// Context builder for assembling grounding text
pub struct ContextBuilder {
    config: ContextConfig,
}

impl ContextBuilder {
    /// Create new context builder with default config
    pub fn new() -> Self {
        Self {
            config: ContextConfig::default(),
        }
    }

    /// Create with custom configuration
    pub fn with_config(config: ContextConfig) -> Self {
        Self { config }
    }

    /// Build context from selected candidates
    pub fn build(&self, selection: &Selection) -> AssembledContext {
        let mut text = String::new();
        let mut origin_keys = Vec::new();
        let mut used = 0usize;

        for candidate in selection.candidates() {
            let separator = if text.is_empty() { "" } else { "\n\n" };
            let block = format!("{}{}", separator, self.format_block(candidate));
            let remaining = self.config.max_context_chars.saturating_sub(used);
            if remaining <= separator.len() {
                break;
            }

            let kept = truncate_chars(&block, remaining);
            used += kept.chars().count();
            text.push_str(kept);
            origin_keys.push(candidate.origin.clone());
        }

        AssembledContext {
            text,
            document_count: origin_keys.len(),
            origin_keys,
        }
    }

    /// Attribution line followed by cleaned, truncated text
    fn format_block(&self, candidate: &Candidate) -> String {
        let cleaned = collapse_blank_lines(candidate.content.trim());
        format!(
            "{}{}\n{}",
            SOURCE_PREFIX,
            candidate.origin,
            truncate_chars(&cleaned, self.config.per_source_chars)
        )
    }

    /// Get current configuration
    pub fn config(&self) -> &ContextConfig {
        &self.config
    }
}

impl Default for ContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Render a selection into a block of at most `total_budget` characters
pub fn assemble(selection: &Selection, per_source_budget: usize, total_budget: usize) -> String {
    ContextBuilder::with_config(ContextConfig {
        per_source_chars: per_source_budget,
        max_context_chars: total_budget,
    })
    .build(selection)
    .text
}

/// Collapse runs of three or more newlines to a single blank line
pub fn collapse_blank_lines(text: &str) -> String {
    let normalized = text.replace("\r\n", "\n");
    match BLANK_RUNS.as_ref() {
        Some(re) => re.replace_all(&normalized, "\n\n").into_owned(),
        None => normalized,
    }
}

/// Longest prefix of `text` holding at most `max_chars` characters
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;

    fn selection_of(docs: &[(&str, &str)]) -> Selection {
        Selection::best_effort(
            docs.iter()
                .enumerate()
                .map(|(i, (origin, content))| Candidate::new(*content, *origin, i as f64 / 10.0))
                .collect(),
        )
    }

    #[test]
    fn test_context_builder_creation() {
        let builder = ContextBuilder::new();
        assert_eq!(builder.config().per_source_chars, 1400);
        assert_eq!(builder.config().max_context_chars, 8000);
    }

    #[test]
    fn test_build_empty_selection() {
        let context = ContextBuilder::new().build(&Selection::default());
        assert!(context.is_empty());
        assert_eq!(context.document_count, 0);
        assert_eq!(assemble(&Selection::default(), 100, 100), "");
    }

    #[test]
    fn test_blocks_carry_attribution_in_order() {
        let selection = selection_of(&[
            ("https://medlineplus.gov/flu.html", "Flu is a respiratory illness."),
            ("https://medlineplus.gov/cold.html", "Colds are milder."),
        ]);

        let context = ContextBuilder::new().build(&selection);
        assert_eq!(
            context.text,
            "SOURCE: https://medlineplus.gov/flu.html\nFlu is a respiratory illness.\n\n\
             SOURCE: https://medlineplus.gov/cold.html\nColds are milder."
        );
        assert_eq!(context.document_count, 2);
        assert_eq!(context.origin_keys[1], "https://medlineplus.gov/cold.html");
    }

    #[test]
    fn test_per_source_truncation() {
        let selection = selection_of(&[("https://medlineplus.gov/a", "abcdefghij")]);
        assert_eq!(assemble(&selection, 4, 1000), "SOURCE: https://medlineplus.gov/a\nabcd");
    }

    #[test]
    fn test_total_budget_drops_trailing_blocks() {
        let selection = selection_of(&[
            ("https://medlineplus.gov/a", "first"),
            ("https://medlineplus.gov/b", "second"),
        ]);
        let first_len = "SOURCE: https://medlineplus.gov/a\nfirst".len();

        let context = ContextBuilder::with_config(ContextConfig {
            per_source_chars: 100,
            max_context_chars: first_len + 2,
        })
        .build(&selection);

        assert_eq!(context.document_count, 1);
        assert_eq!(context.char_count(), first_len);
    }

    #[test]
    fn test_collapse_blank_lines() {
        assert_eq!(collapse_blank_lines("a\n\n\n\nb"), "a\n\nb");
        assert_eq!(collapse_blank_lines("a\n\nb"), "a\n\nb");
        assert_eq!(collapse_blank_lines("a\r\n\r\n\r\nb"), "a\n\nb");
    }

    #[test]
    fn test_truncate_chars_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("abc", 0), "");
    }

    #[quickcheck]
    fn prop_context_never_exceeds_total_budget(docs: Vec<(String, String)>, per: u16, total: u16) -> bool {
        let selection = Selection::best_effort(
            docs.into_iter()
                .map(|(origin, content)| Candidate::new(content, origin, 0.0))
                .collect(),
        );
        let total = usize::from(total);
        assemble(&selection, usize::from(per), total).chars().count() <= total
    }
}
