//! Per-question pipeline trace
//!
//! Each pipeline run owns one [`PipelineTrace`]; nothing is shared between
//! questions, so recording needs no locking.

use colored::Colorize;
use std::time::{Duration, Instant};

/// Events emitted while answering one question
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    QueriesPlanned {
        planned: usize,
        fallbacks: usize,
    },
    RetrievalCompleted {
        query: String,
        requested: usize,
        hits: usize,
    },
    RetrievalFailed {
        query: String,
        reason: String,
    },
    Deduplicated {
        pool: usize,
        unique: usize,
    },
    Selected {
        picked: usize,
        margin: Option<f64>,
    },
    ExpansionTriggered {
        query: String,
    },
    BudgetExceeded {
        budget_ms: u64,
    },
}

/// Counters derived from recorded events
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TraceStats {
    pub retrieval_calls: usize,
    pub retrieval_failures: usize,
    pub planning_fallbacks: usize,
    pub expansions: usize,
    pub candidates_seen: usize,
}

/// Ordered record of one pipeline run
#[derive(Debug, Clone)]
pub struct PipelineTrace {
    events: Vec<(Duration, PipelineEvent)>,
    stats: TraceStats,
    start_time: Instant,
}

impl PipelineTrace {
    pub fn new() -> Self {
        Self {
            events: Vec::new(),
            stats: TraceStats::default(),
            start_time: Instant::now(),
        }
    }

    /// Record an event
    pub fn record(&mut self, event: PipelineEvent) {
        match &event {
            PipelineEvent::QueriesPlanned { fallbacks, .. } => {
                self.stats.planning_fallbacks += fallbacks;
            }
            PipelineEvent::RetrievalCompleted { hits, .. } => {
                self.stats.retrieval_calls += 1;
                self.stats.candidates_seen += hits;
            }
            PipelineEvent::RetrievalFailed { .. } => {
                self.stats.retrieval_calls += 1;
                self.stats.retrieval_failures += 1;
            }
            PipelineEvent::ExpansionTriggered { .. } => {
                self.stats.expansions += 1;
            }
            PipelineEvent::Deduplicated { .. }
            | PipelineEvent::Selected { .. }
            | PipelineEvent::BudgetExceeded { .. } => {}
        }

        self.events.push((self.start_time.elapsed(), event));
    }

    pub fn stats(&self) -> &TraceStats {
        &self.stats
    }

    pub fn events(&self) -> impl Iterator<Item = &PipelineEvent> {
        self.events.iter().map(|(_, e)| e)
    }

    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Multi-line human summary, one line per event
    pub fn render(&self) -> String {
        let mut lines = vec![format!("{}", "Retrieval trace".bold())];
        for (at, event) in &self.events {
            let line = match event {
                PipelineEvent::QueriesPlanned { planned, fallbacks } => {
                    format!("planned {} sub-queries ({} fallback)", planned, fallbacks)
                }
                PipelineEvent::RetrievalCompleted { query, requested, hits } => {
                    format!("retrieved {}/{} for \"{}\"", hits, requested, query)
                }
                PipelineEvent::RetrievalFailed { query, reason } => {
                    format!("{} \"{}\": {}", "retrieval failed".yellow(), query, reason)
                }
                PipelineEvent::Deduplicated { pool, unique } => {
                    format!("deduplicated {} candidates to {} sources", pool, unique)
                }
                PipelineEvent::Selected { picked, margin: Some(m) } => {
                    format!("selected {} at margin {:.2}", picked, m)
                }
                PipelineEvent::Selected { picked, margin: None } => {
                    format!("selected {} (best effort)", picked)
                }
                PipelineEvent::ExpansionTriggered { query } => {
                    format!("{} \"{}\"", "expanding with".cyan(), query)
                }
                PipelineEvent::BudgetExceeded { budget_ms } => {
                    format!("{} after {}ms", "question budget exceeded".red(), budget_ms)
                }
            };
            lines.push(format!("  [{:>6}ms] {}", at.as_millis(), line));
        }
        lines.join("\n")
    }
}

impl Default for PipelineTrace {
    fn default() -> Self {
        Self::new()
    }
}
