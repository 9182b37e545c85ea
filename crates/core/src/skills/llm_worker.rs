//! # LLM Worker
//!
//! A worker backed by a structured LLM call. The role's instructions become
//! the system prompt, the projected input becomes the user message, and the
//! reply is parsed into a [`StageReport`].

use anyhow::Context;
use async_trait::async_trait;
use radkit::macros::LLMOutput;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use super::{Worker, WorkerError, WorkerRegistry};
use crate::models::{LlmProvider, ModelConfig};
use crate::run_llm_function;
use crate::swarm::{CoordinatorConfig, Payload};

/// Structured reply expected from every LLM-backed stage
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, LLMOutput)]
pub struct StageReport {
    /// Optional heading for the section (used by synthesizers)
    #[serde(default)]
    pub title: Option<String>,
    /// One-paragraph summary
    pub summary: String,
    /// Full text of the analysis (markdown)
    #[serde(default)]
    pub content: String,
    /// Key points, one per entry
    #[serde(default)]
    pub findings: Vec<String>,
}

impl StageReport {
    /// Convert into a stage payload
    pub fn into_payload(self) -> Result<Payload, WorkerError> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(other) => Err(WorkerError::new(format!(
                "stage report serialized to {} instead of an object",
                other
            ))),
            Err(e) => Err(WorkerError::new(format!("malformed stage report: {}", e))),
        }
    }
}

/// Worker that asks an LLM to perform one role
#[derive(Debug, Clone)]
pub struct LlmWorker {
    role: String,
    instructions: String,
    config: ModelConfig,
}

impl LlmWorker {
    pub fn new(
        role: impl Into<String>,
        instructions: impl Into<String>,
        config: ModelConfig,
    ) -> Self {
        Self {
            role: role.into(),
            instructions: instructions.into(),
            config,
        }
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn instructions(&self) -> &str {
        &self.instructions
    }

    async fn complete(&self, input: String) -> anyhow::Result<StageReport> {
        let config = &self.config;
        run_llm_function!(config, StageReport, self.instructions.as_str(), input)
            .with_context(|| format!("{} call failed", self.role))
    }
}

#[async_trait]
impl Worker for LlmWorker {
    fn name(&self) -> &str {
        &self.role
    }

    async fn run(&self, _role: &str, input: &str) -> Result<Payload, WorkerError> {
        let report = self.complete(input.to_string()).await?;
        report.into_payload()
    }
}

/// Builds `LlmWorker`s from explicit configuration.
///
/// Resolution per role: role override, then global setting, then the
/// provider's default model.
#[derive(Debug, Clone)]
pub struct LlmWorkerFactory {
    config: CoordinatorConfig,
}

impl LlmWorkerFactory {
    pub fn new(config: &CoordinatorConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Model config for a specific role
    pub fn model_config(&self, role: &str) -> ModelConfig {
        let provider: LlmProvider = self
            .config
            .per_role_providers
            .get(role)
            .cloned()
            .unwrap_or_else(|| self.config.global_provider.clone());

        let model = self
            .config
            .per_role_models
            .get(role)
            .or(self.config.global_model.as_ref())
            .cloned()
            .unwrap_or_else(|| provider.default_model().to_string());

        // base_url only applies to OpenAI-compatible endpoints
        let base_url = if provider.supports_base_url() {
            self.config
                .per_role_base_urls
                .get(role)
                .or(self.config.base_url.as_ref())
                .cloned()
        } else {
            None
        };

        ModelConfig {
            provider,
            model,
            base_url,
        }
    }

    pub fn worker(&self, role: &str, instructions: &str) -> LlmWorker {
        LlmWorker::new(role, instructions, self.model_config(role))
    }

    /// Register an `LlmWorker` for each `(role, instructions)` pair
    pub fn registry<'a, I>(&self, roles: I) -> WorkerRegistry
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut registry = WorkerRegistry::new();
        for (role, instructions) in roles {
            registry.register(role, Arc::new(self.worker(role, instructions)));
        }
        registry
    }
}
