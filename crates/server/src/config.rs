//! Server configuration: `.cohort/config.json` plus command-line overrides.

use cohort_core::models::LlmProvider;
use cohort_core::swarm::{CoordinatorConfig, ExecutionMode};
use std::path::Path;

pub const CONFIG_PATH: &str = ".cohort/config.json";

/// Load the coordinator config, falling back to defaults
pub async fn load(path: &Path) -> CoordinatorConfig {
    if !path.exists() {
        return CoordinatorConfig::default();
    }
    match tokio::fs::read_to_string(path).await {
        Ok(content) => match serde_json::from_str(&content) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "ignoring malformed config");
                CoordinatorConfig::default()
            }
        },
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to read config");
            CoordinatorConfig::default()
        }
    }
}

/// Command-line settings that win over the config file
#[derive(Debug, Clone, Default, clap::Args)]
pub struct Overrides {
    /// LLM provider for every role (anthropic, openai, gemini, openrouter, grok, deepseek)
    #[arg(long, global = true)]
    pub provider: Option<LlmProvider>,
    /// Model for every role
    #[arg(long, global = true)]
    pub model: Option<String>,
    /// Base URL for OpenAI-compatible endpoints
    #[arg(long, global = true)]
    pub base_url: Option<String>,
    /// Run independent stages concurrently, at most N at a time
    #[arg(long, global = true)]
    pub concurrency: Option<usize>,
    /// Per-stage worker timeout in seconds
    #[arg(long, global = true)]
    pub timeout: Option<u64>,
    /// Extra attempts after a worker failure
    #[arg(long, global = true)]
    pub retries: Option<u32>,
}

impl Overrides {
    pub fn apply(&self, config: &mut CoordinatorConfig) {
        if let Some(provider) = &self.provider {
            config.global_provider = provider.clone();
        }
        if self.model.is_some() {
            config.global_model = self.model.clone();
        }
        if self.base_url.is_some() {
            config.base_url = self.base_url.clone();
        }
        if let Some(max_parallel) = self.concurrency {
            config.execution_mode = ExecutionMode::Concurrent {
                max_parallel: max_parallel.max(1),
            };
        }
        if self.timeout.is_some() {
            config.stage_timeout_secs = self.timeout;
        }
        if let Some(retries) = self.retries {
            config.stage_retries = retries;
        }
    }
}
