//! # Swarm Coordinator
//!
//! The externally callable entry point for a run. Builds the context from a
//! request, drives the orchestrator, and always returns exactly one
//! artifact: the synthesizer's, or the team's fallback error report.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::models::LlmProvider;
use crate::skills::{find_team, LlmWorkerFactory, TeamDefinition, WorkerRegistry};
use crate::state::RunLedger;

use super::artifact::{Artifact, ArtifactStatus, FallbackNotice};
use super::context::PipelineContext;
use super::events::{new_id, SwarmEvent, SwarmEventKind};
use super::graph::ConfigError;
use super::invoke::InvocationPolicy;
use super::orchestrator::{ExecutionMode, Orchestrator};
use super::pipeline::PipelineRun;
use super::request::Request;

/// Configuration for the coordinator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Sequential (default) or concurrent waves
    pub execution_mode: ExecutionMode,
    /// Per-stage worker timeout; `None` waits indefinitely
    pub stage_timeout_secs: Option<u64>,
    /// Extra attempts after a worker failure (default: 0)
    pub stage_retries: u32,
    /// Pause between attempts
    pub retry_delay_ms: u64,
    /// Global LLM provider (default: Anthropic)
    pub global_provider: LlmProvider,
    /// Global model to use for all roles
    pub global_model: Option<String>,
    /// Base URL override for LLM API (for OpenAI-compatible endpoints)
    pub base_url: Option<String>,
    /// Per-role model overrides (role -> model name)
    pub per_role_models: HashMap<String, String>,
    /// Per-role provider overrides (role -> provider)
    pub per_role_providers: HashMap<String, LlmProvider>,
    /// Per-role base URL overrides (role -> base_url, for OpenAI)
    pub per_role_base_urls: HashMap<String, String>,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            execution_mode: ExecutionMode::Sequential,
            stage_timeout_secs: None,
            stage_retries: 0,
            retry_delay_ms: 500,
            global_provider: LlmProvider::Anthropic,
            global_model: None,
            base_url: None,
            per_role_models: HashMap::new(),
            per_role_providers: HashMap::new(),
            per_role_base_urls: HashMap::new(),
        }
    }
}

impl CoordinatorConfig {
    /// Default invocation policy for every stage
    pub fn invocation_policy(&self) -> InvocationPolicy {
        InvocationPolicy {
            timeout: self.stage_timeout_secs.map(Duration::from_secs),
            retries: self.stage_retries,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
        }
    }
}

/// Everything a run produced
#[derive(Debug)]
pub struct RunOutcome {
    pub artifact: Artifact,
    /// Results recorded before the run ended
    pub context: PipelineContext,
    pub run: PipelineRun,
}

/// The swarm coordinator
pub struct Coordinator {
    team: String,
    orchestrator: Orchestrator,
    fallback: FallbackNotice,
    event_tx: Option<mpsc::Sender<SwarmEvent>>,
    ledger: Option<RunLedger>,
}

impl Coordinator {
    /// Wrap an already-built orchestrator
    pub fn new(team: impl Into<String>, orchestrator: Orchestrator) -> Self {
        Self {
            team: team.into(),
            orchestrator,
            fallback: FallbackNotice::default(),
            event_tx: None,
            ledger: None,
        }
    }

    /// Build a coordinator for a team over an explicit worker registry
    pub fn for_team(
        team: &TeamDefinition,
        registry: &WorkerRegistry,
        config: &CoordinatorConfig,
    ) -> Result<Self, ConfigError> {
        let orchestrator = team
            .orchestrator(registry)?
            .with_mode(config.execution_mode)
            .with_policy(config.invocation_policy());
        Ok(Self::new(team.name, orchestrator).with_fallback(team.fallback.clone()))
    }

    /// Build a coordinator for a preset team backed by LLM workers
    pub fn from_config(team: &str, config: &CoordinatorConfig) -> Result<Self, ConfigError> {
        let team = find_team(team)?;
        let registry = team.llm_registry(&LlmWorkerFactory::new(config));
        Self::for_team(&team, &registry, config)
    }

    /// Set the guidance attached to error artifacts
    pub fn with_fallback(mut self, fallback: FallbackNotice) -> Self {
        self.fallback = fallback;
        self
    }

    /// Set event channel for streaming events
    pub fn with_event_channel(mut self, tx: mpsc::Sender<SwarmEvent>) -> Self {
        self.orchestrator = self.orchestrator.with_event_channel(tx.clone());
        self.event_tx = Some(tx);
        self
    }

    /// Record every run in `ledger`
    pub fn with_ledger(mut self, ledger: RunLedger) -> Self {
        self.ledger = Some(ledger);
        self
    }

    pub fn team(&self) -> &str {
        &self.team
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    /// Run the team on `request` and return its artifact
    pub async fn run(&self, request: Request) -> Artifact {
        self.run_detailed(request).await.artifact
    }

    /// Parse raw caller text and run it.
    ///
    /// A request that cannot be parsed yields the error artifact.
    pub async fn run_raw(&self, raw: &str) -> Artifact {
        match Request::parse(raw) {
            Ok(request) => self.run(request).await,
            Err(e) => {
                tracing::warn!(team = %self.team, error = %e, "rejected request");
                let run_id = new_id();
                self.ledger_start(&run_id, raw.trim());
                let artifact =
                    Artifact::error_report(&self.team, raw.trim(), &run_id, &e.to_string(), &self.fallback);
                self.emit_terminal(&artifact).await;
                self.ledger_finish(&artifact);
                artifact
            }
        }
    }

    /// Run the team and return the artifact with the context and run state
    #[tracing::instrument(skip(self, request), fields(team = %self.team, subject = %request.subject))]
    pub async fn run_detailed(&self, request: Request) -> RunOutcome {
        let mut context = PipelineContext::new(request);
        let mut run = PipelineRun::new(context.run_id());

        self.ledger_start(context.run_id(), &context.request().subject);

        let executed = self.orchestrator.execute(&mut context).await;
        for result in context.results() {
            run.advance(&result.stage_id);
        }

        let artifact = match executed {
            Err(e) => {
                tracing::error!(run_id = context.run_id(), error = %e, "run aborted");
                self.error_artifact(&context, &e.to_string())
            }
            Ok(()) => self.synthesized_artifact(&context),
        };

        match artifact.status {
            ArtifactStatus::Aborted => run.fail(artifact.error.clone().unwrap_or_default()),
            status => run.complete(status == ArtifactStatus::Degraded),
        }

        self.emit_terminal(&artifact).await;
        self.ledger_finish(&artifact);

        tracing::info!(
            run_id = %artifact.run_id,
            status = artifact.status.as_str(),
            degraded = context.degraded_count(),
            "run finished"
        );

        RunOutcome {
            artifact,
            context,
            run,
        }
    }

    fn synthesized_artifact(&self, context: &PipelineContext) -> Artifact {
        let Some(synthesizer) = self.orchestrator.synthesizer_id() else {
            return self.error_artifact(context, "pipeline has no synthesizer stage");
        };

        match context.get(synthesizer) {
            Some(result) if result.is_ok() => Artifact::from_synthesis(&self.team, context, result),
            Some(result) => {
                let reason = result.error.as_deref().unwrap_or("unknown error");
                tracing::error!(stage = synthesizer, error = reason, "synthesis failed");
                self.error_artifact(context, &format!("Report generation error: {}", reason))
            }
            None => self.error_artifact(context, "synthesizer produced no result"),
        }
    }

    fn error_artifact(&self, context: &PipelineContext, error: &str) -> Artifact {
        Artifact::error_report(
            &self.team,
            &context.request().subject,
            context.run_id(),
            error,
            &self.fallback,
        )
    }

    fn ledger_start(&self, run_id: &str, subject: &str) {
        if let Some(ledger) = &self.ledger {
            if let Err(e) = ledger.record_start(run_id, &self.team, subject) {
                tracing::warn!(error = %e, "run ledger unavailable");
            }
        }
    }

    fn ledger_finish(&self, artifact: &Artifact) {
        if let Some(ledger) = &self.ledger {
            if let Err(e) = ledger.record_finish(artifact) {
                tracing::warn!(error = %e, "failed to record run result");
            }
        }
    }

    async fn emit_terminal(&self, artifact: &Artifact) {
        let Some(tx) = &self.event_tx else {
            return;
        };
        let kind = if artifact.is_aborted() {
            SwarmEventKind::PipelineAborted
        } else {
            SwarmEventKind::PipelineCompleted
        };
        let event = SwarmEvent::new(kind, &artifact.run_id).with_data(serde_json::json!({
            "team": self.team,
            "status": artifact.status,
            "error": artifact.error,
        }));
        let _ = tx.send(event).await;
    }
}
