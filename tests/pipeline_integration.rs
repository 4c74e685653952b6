//! End-to-end pipeline tests against in-memory collaborators.
//!
//! No Ollama or Qdrant instance is needed.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use healthrag::{
    answer::{format_sources, insufficient_answer, AnswerComposer},
    llm::Generator,
    rag::{
        Candidate, RAGConfig, RAGPipeline, RetrievalOutcome, Retriever, Strategy,
        UnavailableRetriever,
    },
    telemetry::PipelineEvent,
    RagError, Result,
};

const EXPANSION_MARKER: &str = "symptoms causes diagnosis treatment emergency";

fn page(name: &str) -> String {
    format!("https://medlineplus.gov/{}.html", name)
}

fn hit(name: &str, score: f64) -> Candidate {
    Candidate::new(format!("About {}.\n\n\n\nMore on {}.", name, name), page(name), score)
}

/// Answers by query: the expansion query, queries containing a failing
/// fragment, and everything else
#[derive(Default)]
struct ScriptedRetriever {
    initial: Vec<Candidate>,
    expansion: Vec<Candidate>,
    fail_on: Option<&'static str>,
    delay: Option<Duration>,
    expansion_delay: Option<Duration>,
    calls: Mutex<Vec<(String, usize)>>,
}

impl ScriptedRetriever {
    fn returning(initial: Vec<Candidate>) -> Self {
        Self {
            initial,
            ..Default::default()
        }
    }

    fn calls(&self) -> Vec<(String, usize)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Retriever for ScriptedRetriever {
    async fn similarity_search(&self, query: &str, k: usize) -> Result<Vec<Candidate>> {
        self.calls.lock().unwrap().push((query.to_string(), k));

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(fragment) = self.fail_on {
            if query.contains(fragment) {
                return Err(RagError::RetrievalFailure {
                    query: query.to_string(),
                    reason: "index unavailable".to_string(),
                });
            }
        }

        if query.ends_with(EXPANSION_MARKER) {
            if let Some(delay) = self.expansion_delay {
                tokio::time::sleep(delay).await;
            }
            Ok(self.expansion.clone())
        } else {
            Ok(self.initial.clone())
        }
    }
}

struct CannedGenerator {
    reply: String,
    prompts: Mutex<Vec<String>>,
}

impl CannedGenerator {
    fn new(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    fn prompt_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl Generator for CannedGenerator {
    async fn complete(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok(self.reply.clone())
    }
}

fn config_with_k(k: usize) -> RAGConfig {
    RAGConfig {
        target_sources: k,
        ..RAGConfig::default()
    }
}

#[tokio::test]
async fn test_eight_candidate_scenario_selects_three_closest_sources() {
    let origins = ["a", "a", "b", "c", "b", "d", "c", "a"];
    let scores = [0.10, 0.12, 0.20, 0.25, 0.40, 0.55, 0.90, 1.50];
    let pool = origins
        .iter()
        .zip(scores)
        .enumerate()
        .map(|(i, (name, score))| {
            Candidate::new(format!("chunk {}", i), format!("{}?utm=kb#part{}", page(name), i), score)
        })
        .collect();

    let retriever = Arc::new(ScriptedRetriever::returning(pool));
    let generator = Arc::new(CannedGenerator::new("unused"));
    let pipeline = RAGPipeline::with_config(retriever.clone(), generator.clone(), config_with_k(3));

    let result = pipeline.execute("What is gout?", Strategy::SingleQuery).await.unwrap();

    let sources: Vec<_> = result
        .sources()
        .into_iter()
        .map(|s| (s.origin_key, s.score))
        .collect();
    assert_eq!(
        sources,
        vec![(page("a"), 0.10), (page("b"), 0.20), (page("c"), 0.25)]
    );

    let context = result.context().unwrap();
    assert!(context.text.starts_with(&format!("SOURCE: {}\nchunk 0", page("a"))));
    assert_eq!(context.document_count, 3);

    assert_eq!(retriever.calls(), vec![("What is gout?".to_string(), 220)]);
    assert_eq!(result.trace.stats().expansions, 0);
    assert_eq!(generator.prompt_count(), 0);
}

#[tokio::test]
async fn test_thin_pool_expands_once_and_keeps_existing_sources() {
    let retriever = Arc::new(ScriptedRetriever {
        initial: vec![hit("asthma", 0.20), hit("inhalers", 0.30)],
        expansion: vec![hit("wheezing", 0.25), hit("spirometry", 0.40), hit("asthma", 0.90)],
        ..Default::default()
    });
    let pipeline = RAGPipeline::with_config(
        retriever.clone(),
        Arc::new(CannedGenerator::new("unused")),
        config_with_k(5),
    );

    let result = pipeline.execute("asthma", Strategy::SingleQuery).await.unwrap();

    let calls = retriever.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[1], (format!("asthma {}", EXPANSION_MARKER), 260));
    assert_eq!(result.trace.stats().expansions, 1);

    let keys: Vec<_> = result.sources().into_iter().map(|s| s.origin_key).collect();
    assert_eq!(
        keys,
        vec![page("asthma"), page("wheezing"), page("inhalers"), page("spirometry")]
    );
    // the duplicate from expansion does not displace the closer original chunk
    assert_eq!(result.sources()[0].score, 0.20);
}

#[tokio::test]
async fn test_off_domain_pool_is_insufficient_not_an_error() {
    let off_domain = vec![
        Candidate::new("ad copy", "https://example.com/cure", 0.05),
        Candidate::new("forum post", "https://medlineplus.gov.evil.net/x", 0.06),
    ];
    let retriever = Arc::new(ScriptedRetriever {
        initial: off_domain.clone(),
        expansion: off_domain,
        ..Default::default()
    });
    let generator = Arc::new(CannedGenerator::new("should not be asked"));
    let pipeline = RAGPipeline::with_config(retriever.clone(), generator.clone(), config_with_k(5));

    let result = pipeline.execute("miracle cure?", Strategy::SingleQuery).await.unwrap();

    assert_eq!(result.outcome, RetrievalOutcome::Insufficient);
    assert!(!result.is_grounded());
    assert_eq!(result.trace.stats().expansions, 1);
    assert_eq!(retriever.calls().len(), 2);

    let answer = AnswerComposer::new(Duration::from_secs(1))
        .compose(generator.as_ref(), &result)
        .await;
    assert_eq!(answer, insufficient_answer());
    assert_eq!(generator.prompt_count(), 0);
    assert_eq!(format_sources(&result.sources()), "Sources used (0 unique)\nNo sources found.");
}

#[tokio::test]
async fn test_empty_question_is_invalid_input() {
    let retriever = Arc::new(ScriptedRetriever::default());
    let pipeline = RAGPipeline::new(retriever.clone(), Arc::new(CannedGenerator::new("")));

    for question in ["", "   \n\t"] {
        let err = pipeline.execute(question, Strategy::MultiQuery).await.unwrap_err();
        assert!(matches!(err, RagError::InvalidInput(_)));
        assert!(err.is_fatal());
    }
    assert!(retriever.calls().is_empty());
}

#[tokio::test]
async fn test_multi_query_falls_back_on_garbage_plan() {
    let pool = ["asthma", "wheezing", "inhalers", "triggers", "attack"]
        .iter()
        .enumerate()
        .map(|(i, name)| hit(name, 0.10 + 0.02 * i as f64))
        .collect();
    let retriever = Arc::new(ScriptedRetriever::returning(pool));
    let generator = Arc::new(CannedGenerator::new("I'm sorry, I can't help with that."));
    let pipeline = RAGPipeline::with_config(retriever.clone(), generator.clone(), config_with_k(5));

    let result = pipeline.execute("asthma", Strategy::MultiQuery).await.unwrap();

    let calls = retriever.calls();
    assert_eq!(calls.len(), 6);
    assert!(calls.iter().all(|(_, k)| *k == 60));
    assert!(calls.iter().any(|(q, _)| q == "asthma causes risk factors"));
    assert!(calls.iter().any(|(q, _)| q == "asthma emergency when to seek help"));

    assert_eq!(generator.prompt_count(), 1);
    assert_eq!(result.trace.stats().planning_fallbacks, 6);
    assert_eq!(result.trace.stats().expansions, 0);
    assert_eq!(result.sources().len(), 5);
}

#[tokio::test]
async fn test_multi_query_uses_planned_queries_and_absorbs_failures() {
    let plan = "Overview: asthma chronic airway disease\n\
                Causes: asthma allergens triggers\n\
                Symptoms: asthma wheezing cough chest tightness\n\
                Diagnosis: asthma spirometry test\n\
                Treatment: asthma inhaled corticosteroids\n\
                Urgent: asthma attack blue lips emergency";
    let retriever = Arc::new(ScriptedRetriever {
        initial: vec![hit("asthma", 0.10), hit("wheezing", 0.15), hit("inhalers", 0.20)],
        fail_on: Some("spirometry"),
        ..Default::default()
    });
    let pipeline = RAGPipeline::with_config(
        retriever.clone(),
        Arc::new(CannedGenerator::new(plan)),
        config_with_k(3),
    );

    let result = pipeline.execute("asthma", Strategy::MultiQuery).await.unwrap();

    let stats = result.trace.stats();
    assert_eq!(stats.planning_fallbacks, 0);
    assert_eq!(stats.retrieval_calls, 6);
    assert_eq!(stats.retrieval_failures, 1);
    assert!(result.is_grounded());
    assert_eq!(result.sources().len(), 3);
    assert!(retriever
        .calls()
        .iter()
        .any(|(q, _)| q == "asthma inhaled corticosteroids"));
}

#[tokio::test]
async fn test_question_budget_exhaustion_degrades_to_insufficient() {
    let retriever = Arc::new(ScriptedRetriever {
        initial: vec![hit("flu", 0.1)],
        delay: Some(Duration::from_secs(5)),
        ..Default::default()
    });
    let config = RAGConfig {
        question_budget_secs: 1,
        ..RAGConfig::default()
    };
    let pipeline = RAGPipeline::with_config(retriever, Arc::new(CannedGenerator::new("")), config);

    let result = pipeline.execute("flu", Strategy::SingleQuery).await.unwrap();

    assert_eq!(result.outcome, RetrievalOutcome::Insufficient);
    assert!(result
        .trace
        .events()
        .any(|e| matches!(e, PipelineEvent::BudgetExceeded { budget_ms: 1000 })));
}

#[tokio::test]
async fn test_budget_exhaustion_keeps_events_recorded_before_it() {
    let retriever = Arc::new(ScriptedRetriever {
        initial: vec![hit("flu", 0.1)],
        expansion_delay: Some(Duration::from_secs(5)),
        ..Default::default()
    });
    let config = RAGConfig {
        question_budget_secs: 1,
        ..RAGConfig::default()
    };
    let pipeline = RAGPipeline::with_config(retriever, Arc::new(CannedGenerator::new("")), config);

    let result = pipeline.execute("flu", Strategy::SingleQuery).await.unwrap();

    assert_eq!(result.outcome, RetrievalOutcome::Insufficient);
    let events: Vec<_> = result.trace.events().collect();
    assert!(matches!(
        events.first(),
        Some(PipelineEvent::RetrievalCompleted { hits: 1, .. })
    ));
    assert!(events
        .iter()
        .any(|e| matches!(e, PipelineEvent::ExpansionTriggered { .. })));
    assert!(matches!(
        events.last(),
        Some(PipelineEvent::BudgetExceeded { budget_ms: 1000 })
    ));
}

#[tokio::test]
async fn test_unopenable_knowledge_base_still_answers() {
    let retriever = Arc::new(UnavailableRetriever::new("embedding model failed to load"));
    let generator = Arc::new(CannedGenerator::new("no plan today"));
    let pipeline = RAGPipeline::new(retriever, generator.clone());

    for strategy in [Strategy::SingleQuery, Strategy::MultiQuery] {
        let result = pipeline.execute("What is gout?", strategy).await.unwrap();
        assert_eq!(result.outcome, RetrievalOutcome::Insufficient);
        assert!(result.trace.stats().retrieval_failures > 0);

        let answer = AnswerComposer::new(Duration::from_secs(1))
            .compose(generator.as_ref(), &result)
            .await;
        assert_eq!(answer, insufficient_answer());
        assert_eq!(format_sources(&result.sources()), "Sources used (0 unique)\nNo sources found.");
    }
}

#[tokio::test]
async fn test_grounded_answer_is_tightened() {
    let retriever = Arc::new(ScriptedRetriever::returning(vec![
        hit("gout", 0.1),
        hit("arthritis", 0.2),
    ]));
    let generator = Arc::new(CannedGenerator::new(
        "1. Overview\n\nGout is a type of arthritis.\n\n\n\n2.\nCauses / Risk factors\n- uric acid\n",
    ));
    let pipeline = RAGPipeline::with_config(retriever, generator.clone(), config_with_k(2));

    let result = pipeline.execute("What is gout?", Strategy::SingleQuery).await.unwrap();
    let answer = AnswerComposer::new(Duration::from_secs(1))
        .compose(generator.as_ref(), &result)
        .await;

    assert_eq!(
        answer,
        "1) Overview\nGout is a type of arthritis.\n\n2) Causes / Risk factors\n- uric acid"
    );

    let prompt = generator.prompts.lock().unwrap()[0].clone();
    assert!(prompt.contains(&format!("SOURCE: {}\nAbout gout.\n\nMore on gout.", page("gout"))));
    assert!(prompt.contains("QUESTION:\nWhat is gout?"));
}
