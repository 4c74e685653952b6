//! Section query planning for the multi-query strategy
//!
//! The generator is asked for six labelled search queries. Its reply is
//! parsed line by line against a closed set of labels; anything missing is
//! filled from a fixed fallback table, so planning never fails.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};

use crate::errors::RagError;
use crate::llm::Generator;
use crate::rag::retrieval::DEFAULT_CALL_TIMEOUT;

/// Topical section a sub-query retrieves for
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SectionLabel {
    Overview,
    Causes,
    Symptoms,
    Diagnosis,
    Treatment,
    Urgent,
}

impl SectionLabel {
    pub const ALL: [SectionLabel; 6] = [
        SectionLabel::Overview,
        SectionLabel::Causes,
        SectionLabel::Symptoms,
        SectionLabel::Diagnosis,
        SectionLabel::Treatment,
        SectionLabel::Urgent,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Overview => "Overview",
            Self::Causes => "Causes",
            Self::Symptoms => "Symptoms",
            Self::Diagnosis => "Diagnosis",
            Self::Treatment => "Treatment",
            Self::Urgent => "Urgent",
        }
    }

    /// Label whose lowercase name prefixes `key` (case-insensitive)
    pub fn match_prefix(key: &str) -> Option<SectionLabel> {
        let key = key.to_lowercase();
        Self::ALL
            .into_iter()
            .find(|label| key.starts_with(&label.as_str().to_lowercase()))
    }

    /// Deterministic query used when the generator gives nothing usable
    pub fn fallback_query(&self, question: &str) -> String {
        let question = question.trim();
        match self {
            Self::Overview => question.to_string(),
            Self::Causes => format!("{} causes risk factors", question),
            Self::Symptoms => format!("{} symptoms", question),
            Self::Diagnosis => format!("{} diagnosis tests", question),
            Self::Treatment => format!("{} treatment management", question),
            Self::Urgent => format!("{} emergency when to seek help", question),
        }
    }
}

impl fmt::Display for SectionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a planned query came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuerySource {
    Generated,
    Fallback,
}

/// One sub-query per section label
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryPlan {
    queries: BTreeMap<SectionLabel, (String, QuerySource)>,
}

impl QueryPlan {
    /// Complete a partial parse with fallbacks for every missing label
    pub fn complete(question: &str, mut parsed: BTreeMap<SectionLabel, String>) -> Self {
        let queries = SectionLabel::ALL
            .into_iter()
            .map(|label| match parsed.remove(&label) {
                Some(query) => (label, (query, QuerySource::Generated)),
                None => (label, (label.fallback_query(question), QuerySource::Fallback)),
            })
            .collect();
        Self { queries }
    }

    /// Plan built purely from the fallback table
    pub fn fallback(question: &str) -> Self {
        Self::complete(question, BTreeMap::new())
    }

    pub fn get(&self, label: SectionLabel) -> Option<&str> {
        self.queries.get(&label).map(|(q, _)| q.as_str())
    }

    pub fn source(&self, label: SectionLabel) -> Option<QuerySource> {
        self.queries.get(&label).map(|(_, s)| *s)
    }

    pub fn len(&self) -> usize {
        self.queries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }

    pub fn fallback_count(&self) -> usize {
        self.queries
            .values()
            .filter(|(_, s)| *s == QuerySource::Fallback)
            .count()
    }

    /// Queries in label order
    pub fn queries(&self) -> Vec<String> {
        self.queries.values().map(|(q, _)| q.clone()).collect()
    }
}

/// Prompt asking for exactly six labelled queries
pub fn planning_prompt(question: &str) -> String {
    format!(
        "Create 6 short search queries to retrieve trusted health information for this medical question.\n\
         \n\
         Question: {}\n\
         \n\
         Return EXACTLY 6 lines in this format:\n\
         Overview: ...\n\
         Causes: ...\n\
         Symptoms: ...\n\
         Diagnosis: ...\n\
         Treatment: ...\n\
         Urgent: ...\n\
         \n\
         Rules:\n\
         - Each query should be 5-12 words.\n\
         - Include key medical terms from the question.\n\
         - No extra text.\n",
        question.trim()
    )
}

/// Parse `Label: query` lines, ignoring anything that does not fit.
///
/// Labels match by case-insensitive prefix; list markers and emphasis
/// around the label are tolerated. A later line for the same label wins.
pub fn parse_plan(text: &str) -> BTreeMap<SectionLabel, String> {
    let mut parsed = BTreeMap::new();

    for line in text.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key
            .trim()
            .trim_start_matches(|c: char| c == '-' || c == '*' || c == '•' || c == '#')
            .trim_start_matches(|c: char| c.is_ascii_digit() || c == '.' || c == ')')
            .trim()
            .trim_matches('*');
        let value = value.trim().trim_matches(|c: char| c == '*' || c == '"').trim();

        if value.is_empty() {
            continue;
        }
        if let Some(label) = SectionLabel::match_prefix(key) {
            parsed.insert(label, value.to_string());
        }
    }

    parsed
}

/// Decomposes a question into labelled sub-queries via the generator
pub struct QueryPlanner {
    call_timeout: Duration,
}

impl QueryPlanner {
    pub fn new(call_timeout: Duration) -> Self {
        Self { call_timeout }
    }

    pub fn call_timeout(&self) -> Duration {
        self.call_timeout
    }

    /// Always returns a complete plan; generator failures degrade to fallbacks
    pub async fn plan(&self, question: &str, generator: &dyn Generator) -> QueryPlan {
        let prompt = planning_prompt(question);
        let reply = match tokio::time::timeout(self.call_timeout, generator.complete(&prompt)).await {
            Ok(Ok(text)) => Ok(text),
            Ok(Err(err)) => Err(RagError::PlanningFailure(err.to_string())),
            Err(_) => Err(RagError::PlanningFailure(format!(
                "no reply within {}ms",
                self.call_timeout.as_millis()
            ))),
        };

        let parsed = match reply {
            Ok(text) => parse_plan(&text),
            Err(err) => {
                warn!(error = %err, "query planning failed, using fallback queries");
                BTreeMap::new()
            }
        };

        let plan = QueryPlan::complete(question, parsed);
        debug!(fallbacks = plan.fallback_count(), "query plan ready");
        plan
    }
}

impl Default for QueryPlanner {
    fn default() -> Self {
        Self::new(DEFAULT_CALL_TIMEOUT)
    }
}

/// Plan sub-queries for `question` with the default call timeout
pub async fn plan_queries(question: &str, generator: &dyn Generator) -> QueryPlan {
    QueryPlanner::default().plan(question, generator).await
}
