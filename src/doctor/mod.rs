//! Doctor command: reachability checks for the generator and the knowledge base

use colored::Colorize;

use crate::llm::OllamaClient;
use crate::store::{self, StoreConfig};

/// Health check result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    Pass,
    Warn(String),
    Fail(String),
}

/// Individual health check
#[derive(Debug)]
pub struct HealthCheck {
    pub name: String,
    pub status: HealthStatus,
}

impl HealthCheck {
    fn new(name: &str, status: HealthStatus) -> Self {
        Self {
            name: name.to_string(),
            status,
        }
    }
}

pub struct Doctor {
    ollama: OllamaClient,
    store: StoreConfig,
}

impl Doctor {
    pub fn new(ollama: OllamaClient, store: StoreConfig) -> Self {
        Self { ollama, store }
    }

    /// Run all health checks
    pub async fn run_diagnostics(&self) -> Vec<HealthCheck> {
        let mut checks = vec![self.check_ollama_api().await];
        if checks[0].status == HealthStatus::Pass {
            checks.push(self.check_model_available().await);
        }
        checks.extend(self.check_knowledge_base().await);
        checks
    }

    async fn check_ollama_api(&self) -> HealthCheck {
        let status = match self.ollama.health_check().await {
            Ok(true) => HealthStatus::Pass,
            Ok(false) => HealthStatus::Fail(format!(
                "Ollama not reachable at {} (start with: ollama serve)",
                self.ollama.base_url()
            )),
            Err(e) => HealthStatus::Fail(format!("Error checking Ollama: {}", e)),
        };
        HealthCheck::new("Ollama API", status)
    }

    async fn check_model_available(&self) -> HealthCheck {
        let status = match self.ollama.list_models().await {
            Ok(models) => model_status(&models, self.ollama.model()),
            Err(e) => HealthStatus::Fail(format!("Cannot list models: {}", e)),
        };
        HealthCheck::new("Model", status)
    }

    async fn check_knowledge_base(&self) -> Vec<HealthCheck> {
        let client = match store::connect(&self.store) {
            Ok(client) => client,
            Err(e) => return vec![HealthCheck::new("Qdrant", HealthStatus::Fail(e.to_string()))],
        };

        match store::store_status(&client, &self.store.collection).await {
            Ok(status) => vec![
                HealthCheck::new("Qdrant", HealthStatus::Pass),
                HealthCheck::new(
                    "Collection",
                    if status.collection_exists {
                        HealthStatus::Pass
                    } else {
                        HealthStatus::Fail(format!(
                            "Collection '{}' not found",
                            self.store.collection
                        ))
                    },
                ),
            ],
            Err(e) => vec![HealthCheck::new(
                "Qdrant",
                HealthStatus::Fail(format!("{} ({})", e, self.store.url)),
            )],
        }
    }

    /// Display diagnostics results
    pub fn display_results(checks: &[HealthCheck]) {
        println!("\n{}\n", "healthrag diagnostics".bold());
        println!("{:<14} Status", "Check");
        println!("{}", "=".repeat(50));

        for check in checks {
            let status = match &check.status {
                HealthStatus::Pass => "PASS".green().to_string(),
                HealthStatus::Warn(msg) => format!("WARN: {}", msg).yellow().to_string(),
                HealthStatus::Fail(msg) => format!("FAIL: {}", msg).red().to_string(),
            };
            println!("{:<14} {}", check.name, status);
        }

        println!();
    }

    /// Get overall health status
    pub fn overall_status(checks: &[HealthCheck]) -> bool {
        !checks.iter().any(|c| matches!(c.status, HealthStatus::Fail(_)))
    }
}

fn model_status(installed: &[String], wanted: &str) -> HealthStatus {
    if installed.is_empty() {
        HealthStatus::Fail("No models installed".to_string())
    } else if installed.iter().any(|name| name == wanted) {
        HealthStatus::Pass
    } else {
        HealthStatus::Warn(format!("'{}' not installed (ollama pull {})", wanted, wanted))
    }
}
