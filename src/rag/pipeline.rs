// End-to-end retrieval pipeline: plan -> pool -> dedupe -> select -> [expand] -> assemble
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::errors::{RagError, Result};
use crate::llm::Generator;
use crate::rag::context::{AssembledContext, ContextBuilder, ContextConfig};
use crate::rag::dedup::{dedupe, TrustedDomains};
use crate::rag::expansion::{ExpansionConfig, FallbackExpander, DEFAULT_EXPANSION_KEYWORDS};
use crate::rag::planner::QueryPlanner;
use crate::rag::retrieval::{PoolBuilder, QueryReport, Retriever};
use crate::rag::selection::{
    AdaptiveSelector, SelectionPolicy, MULTI_QUERY_MARGINS, SINGLE_QUERY_MARGINS,
};
use crate::rag::types::{DedupedSet, Pool, Selection, SourceRef};
use crate::telemetry::{PipelineEvent, PipelineTrace};

/// Retrieval strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// One query straight from the question ("vanilla")
    SingleQuery,
    /// Six planned section queries ("agentic")
    MultiQuery,
}

impl Strategy {
    pub fn label(&self) -> &'static str {
        match self {
            Strategy::SingleQuery => "Vanilla RAG",
            Strategy::MultiQuery => "Agentic RAG",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Strategy {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "vanilla" | "single" | "single_query" => Ok(Strategy::SingleQuery),
            "agentic" | "multi" | "multi_query" => Ok(Strategy::MultiQuery),
            other => Err(RagError::ConfigError(format!("Unknown strategy: {}", other))),
        }
    }
}

/// Per-strategy knobs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyConfig {
    /// Ascending margin widths for the selector
    pub margins: Vec<f64>,
    /// Acceptance floor (capped at k); `None` means all k slots must fill
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_acceptable: Option<usize>,
    /// Results requested per query
    pub per_query_results: usize,
    /// Results requested by the fallback expansion query
    pub expansion_results: usize,
}

impl StrategyConfig {
    pub fn single_query() -> Self {
        Self {
            margins: SINGLE_QUERY_MARGINS.to_vec(),
            min_acceptable: None,
            per_query_results: 220,
            expansion_results: 260,
        }
    }

    pub fn multi_query() -> Self {
        Self {
            margins: MULTI_QUERY_MARGINS.to_vec(),
            min_acceptable: Some(3),
            per_query_results: 60,
            expansion_results: 120,
        }
    }

    pub fn selection_policy(&self) -> SelectionPolicy {
        SelectionPolicy {
            margins: self.margins.clone(),
            min_acceptable: self.min_acceptable,
        }
    }
}

/// A strategy table as written in a config file; missing keys keep the
/// strategy's own defaults
#[derive(Debug, Deserialize)]
struct StrategyOverrides {
    margins: Option<Vec<f64>>,
    min_acceptable: Option<usize>,
    per_query_results: Option<usize>,
    expansion_results: Option<usize>,
}

impl StrategyOverrides {
    fn apply(self, mut base: StrategyConfig) -> StrategyConfig {
        if let Some(margins) = self.margins {
            base.margins = margins;
        }
        if let Some(floor) = self.min_acceptable {
            base.min_acceptable = Some(floor);
        }
        if let Some(n) = self.per_query_results {
            base.per_query_results = n;
        }
        if let Some(n) = self.expansion_results {
            base.expansion_results = n;
        }
        base
    }
}

fn single_query_table<'de, D>(deserializer: D) -> std::result::Result<StrategyConfig, D::Error>
where
    D: Deserializer<'de>,
{
    StrategyOverrides::deserialize(deserializer).map(|o| o.apply(StrategyConfig::single_query()))
}

fn multi_query_table<'de, D>(deserializer: D) -> std::result::Result<StrategyConfig, D::Error>
where
    D: Deserializer<'de>,
{
    StrategyOverrides::deserialize(deserializer).map(|o| o.apply(StrategyConfig::multi_query()))
}

/// RAG pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RAGConfig {
    /// Unique sources to select (k)
    pub target_sources: usize,
    /// Context assembly budgets
    pub context: ContextConfig,
    /// Hosts allowed to ground an answer
    pub trusted_domains: TrustedDomains,
    /// Keywords appended to the question for fallback expansion
    pub expansion_keywords: String,
    /// Timeout for each collaborator call
    pub call_timeout_secs: u64,
    /// Wall-clock budget for one question
    pub question_budget_secs: u64,
    #[serde(deserialize_with = "single_query_table")]
    pub single_query: StrategyConfig,
    #[serde(deserialize_with = "multi_query_table")]
    pub multi_query: StrategyConfig,
}

impl Default for RAGConfig {
    fn default() -> Self {
        Self {
            target_sources: 5,
            context: ContextConfig::default(),
            trusted_domains: TrustedDomains::default(),
            expansion_keywords: DEFAULT_EXPANSION_KEYWORDS.to_string(),
            call_timeout_secs: 30,
            question_budget_secs: 120,
            single_query: StrategyConfig::single_query(),
            multi_query: StrategyConfig::multi_query(),
        }
    }
}

impl RAGConfig {
    pub fn strategy(&self, strategy: Strategy) -> &StrategyConfig {
        match strategy {
            Strategy::SingleQuery => &self.single_query,
            Strategy::MultiQuery => &self.multi_query,
        }
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    pub fn question_budget(&self) -> Duration {
        Duration::from_secs(self.question_budget_secs)
    }
}

/// Grounding produced for a question
#[derive(Debug, Clone, PartialEq)]
pub enum RetrievalOutcome {
    /// Context for the generator plus the sources it came from
    Grounded {
        context: AssembledContext,
        selection: Selection,
    },
    /// Nothing usable survived selection; answer with the canned phrase
    Insufficient,
}

/// RAG pipeline result
#[derive(Debug, Clone)]
pub struct RAGResult {
    pub question: String,
    pub strategy: Strategy,
    pub outcome: RetrievalOutcome,
    pub trace: PipelineTrace,
}

impl RAGResult {
    pub fn is_grounded(&self) -> bool {
        matches!(self.outcome, RetrievalOutcome::Grounded { .. })
    }

    /// Selected sources in ascending score order, for citation
    pub fn sources(&self) -> Vec<SourceRef> {
        match &self.outcome {
            RetrievalOutcome::Grounded { selection, .. } => selection.sources(),
            RetrievalOutcome::Insufficient => Vec::new(),
        }
    }

    pub fn context(&self) -> Option<&AssembledContext> {
        match &self.outcome {
            RetrievalOutcome::Grounded { context, .. } => Some(context),
            RetrievalOutcome::Insufficient => None,
        }
    }
}

/// End-to-end selection pipeline
pub struct RAGPipeline {
    pools: PoolBuilder,
    generator: Arc<dyn Generator>,
    planner: QueryPlanner,
    context_builder: ContextBuilder,
    config: RAGConfig,
}

impl RAGPipeline {
    /// Create with default configuration
    pub fn new(retriever: Arc<dyn Retriever>, generator: Arc<dyn Generator>) -> Self {
        Self::with_config(retriever, generator, RAGConfig::default())
    }

    /// Create with custom configuration
    pub fn with_config(
        retriever: Arc<dyn Retriever>,
        generator: Arc<dyn Generator>,
        config: RAGConfig,
    ) -> Self {
        Self {
            pools: PoolBuilder::with_timeout(retriever, config.call_timeout()),
            generator,
            planner: QueryPlanner::new(config.call_timeout()),
            context_builder: ContextBuilder::with_config(config.context.clone()),
            config,
        }
    }

    /// Retrieve, select and assemble grounding for one question.
    ///
    /// Only an empty question is an error. Collaborator failures degrade the
    /// pool, and an exhausted question budget yields `Insufficient`.
    pub async fn execute(&self, question: &str, strategy: Strategy) -> Result<RAGResult> {
        let question = question.trim();
        if question.is_empty() {
            return Err(RagError::InvalidInput("question is empty".to_string()));
        }

        let budget = self.config.question_budget();
        let mut trace = PipelineTrace::new();
        let finished =
            tokio::time::timeout(budget, self.run(question, strategy, &mut trace)).await;
        let outcome = match finished {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(budget_ms = budget.as_millis() as u64, "question budget exceeded");
                trace.record(PipelineEvent::BudgetExceeded {
                    budget_ms: budget.as_millis() as u64,
                });
                RetrievalOutcome::Insufficient
            }
        };

        Ok(RAGResult {
            question: question.to_string(),
            strategy,
            outcome,
            trace,
        })
    }

    /// Events land in `trace` as they happen so a budget expiry keeps them
    async fn run(
        &self,
        question: &str,
        strategy: Strategy,
        trace: &mut PipelineTrace,
    ) -> RetrievalOutcome {
        let settings = self.config.strategy(strategy);
        let k = self.config.target_sources;
        let selector = AdaptiveSelector::with_policy(settings.selection_policy());

        let queries = match strategy {
            Strategy::SingleQuery => vec![question.to_string()],
            Strategy::MultiQuery => {
                let plan = self.planner.plan(question, self.generator.as_ref()).await;
                trace.record(PipelineEvent::QueriesPlanned {
                    planned: plan.len(),
                    fallbacks: plan.fallback_count(),
                });
                plan.queries()
            }
        };

        let (pool, reports) = self
            .pools
            .retrieve_all(&queries, settings.per_query_results)
            .await;
        for report in reports {
            record_report(trace, report);
        }

        let mut selection = self.dedupe_and_select(&pool, &selector, k, trace);

        if selection.len() < k {
            let expander = FallbackExpander::with_config(ExpansionConfig {
                keywords: self.config.expansion_keywords.clone(),
                result_count: settings.expansion_results,
            });
            trace.record(PipelineEvent::ExpansionTriggered {
                query: expander.broadened_query(question),
            });

            let (merged, report) = expander.expand(question, pool, &self.pools).await;
            record_report(trace, report);
            selection = self.dedupe_and_select(&merged, &selector, k, trace);
        }

        let context = self.context_builder.build(&selection);
        info!(
            %strategy,
            sources = selection.len(),
            context_chars = context.char_count(),
            "retrieval finished"
        );

        if selection.is_empty() || context.is_empty() {
            RetrievalOutcome::Insufficient
        } else {
            RetrievalOutcome::Grounded { context, selection }
        }
    }

    fn dedupe_and_select(
        &self,
        pool: &Pool,
        selector: &AdaptiveSelector,
        k: usize,
        trace: &mut PipelineTrace,
    ) -> Selection {
        let deduped: DedupedSet = dedupe(pool, &self.config.trusted_domains);
        trace.record(PipelineEvent::Deduplicated {
            pool: pool.len(),
            unique: deduped.len(),
        });

        let selection = selector.select(&deduped, k);
        trace.record(PipelineEvent::Selected {
            picked: selection.len(),
            margin: selection.margin(),
        });
        selection
    }

    /// Get current configuration
    pub fn config(&self) -> &RAGConfig {
        &self.config
    }

    pub fn generator(&self) -> &Arc<dyn Generator> {
        &self.generator
    }
}

fn record_report(trace: &mut PipelineTrace, report: QueryReport) {
    let event = match report.failure {
        Some(reason) => PipelineEvent::RetrievalFailed {
            query: report.query,
            reason,
        },
        None => PipelineEvent::RetrievalCompleted {
            query: report.query,
            requested: report.requested,
            hits: report.hits,
        },
    };
    trace.record(event);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rag_config_default() {
        let config = RAGConfig::default();
        assert_eq!(config.target_sources, 5);
        assert_eq!(config.context.max_context_chars, 8000);
        assert_eq!(config.single_query.per_query_results, 220);
        assert_eq!(config.multi_query.expansion_results, 120);
        assert_eq!(
            config.single_query.margins.len(),
            config.multi_query.margins.len() + 1
        );
    }

    #[test]
    fn test_strategy_parsing() {
        assert_eq!("vanilla".parse::<Strategy>().unwrap(), Strategy::SingleQuery);
        assert_eq!("Agentic".parse::<Strategy>().unwrap(), Strategy::MultiQuery);
        assert!("hybrid".parse::<Strategy>().is_err());
    }

    #[test]
    fn test_strategy_policies_keep_their_floors() {
        let config = RAGConfig::default();
        assert_eq!(config.strategy(Strategy::SingleQuery).selection_policy().floor(5), 5);
        assert_eq!(config.strategy(Strategy::MultiQuery).selection_policy().floor(5), 3);
    }

    #[test]
    fn test_rag_result_without_grounding() {
        let result = RAGResult {
            question: "q".to_string(),
            strategy: Strategy::MultiQuery,
            outcome: RetrievalOutcome::Insufficient,
            trace: PipelineTrace::new(),
        };
        assert!(!result.is_grounded());
        assert!(result.sources().is_empty());
        assert!(result.context().is_none());
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: RAGConfig = toml::from_str("target_sources = 3\n").unwrap();
        assert_eq!(config.target_sources, 3);
        assert_eq!(config.multi_query, StrategyConfig::multi_query());
    }

    #[test]
    fn test_partial_strategy_table_keeps_its_own_floor() {
        let config: RAGConfig = toml::from_str(
            "[multi_query]\nmargins = [0.2, 0.4]\n\n[single_query]\nper_query_results = 100\n",
        )
        .unwrap();

        assert_eq!(config.multi_query.margins, vec![0.2, 0.4]);
        assert_eq!(config.multi_query.min_acceptable, Some(3));
        assert_eq!(config.multi_query.per_query_results, 60);
        assert_eq!(config.multi_query.selection_policy().floor(5), 3);

        assert_eq!(config.single_query.per_query_results, 100);
        assert_eq!(config.single_query.expansion_results, 260);
        assert_eq!(config.single_query.selection_policy().floor(5), 5);
    }

    #[test]
    fn test_strategy_tables_round_trip_through_toml() {
        let config = RAGConfig::default();
        let text = toml::to_string(&config).unwrap();
        let parsed: RAGConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }
}
