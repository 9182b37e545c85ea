//! # Orchestrator
//!
//! Executes a resolved stage graph against one pipeline context.
//!
//! ```text
//! resolve(descriptors) ─► [wave 0] ─► [wave 1] ─► ... ─► [synthesizer]
//!                           │  each stage: check prerequisites
//!                           │              project input
//!                           │              invoke worker (timeout/retry)
//!                           └─ record Ok | Degraded | Failed
//! ```
//!
//! Worker failures never escape a stage; they become degraded results. Only
//! contract violations (missing prerequisite, projection error or panic) and fatal
//! stages end a run early.

use serde::{Deserialize, Serialize};
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;

use super::context::PipelineContext;
use super::events::{SwarmEvent, SwarmEventKind};
use super::graph::{resolve, ConfigError, ExecutionPlan};
use super::invoke::{invoke, settle, InvocationPolicy};
use super::request::Request;
use super::stage::{StageDescriptor, StageResult, StageStatus};
use super::synthesis::{default_projection, synthesis_input};
use crate::skills::{Worker, WorkerRegistry};

/// How ready stages are scheduled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExecutionMode {
    /// One stage at a time in resolved order
    #[default]
    Sequential,
    /// Stages whose prerequisites are complete run together, bounded by
    /// `max_parallel`
    Concurrent { max_parallel: usize },
}

/// Errors that end a run before the synthesizer produces an artifact
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("stage '{stage}' ran before its prerequisite '{missing}'")]
    MissingPrerequisite { stage: String, missing: String },
    #[error("input projection for stage '{stage}' failed: {message}")]
    Projection { stage: String, message: String },
    #[error("fatal stage '{stage}' failed: {message}")]
    FatalStage { stage: String, message: String },
    #[error("stage task failed: {0}")]
    Task(String),
}

/// A descriptor bound to its worker
#[derive(Clone)]
struct Stage {
    descriptor: StageDescriptor,
    worker: Arc<dyn Worker>,
    synthesizer: bool,
}

/// Runs stage descriptors in dependency order
pub struct Orchestrator {
    stages: Vec<Stage>,
    plan: ExecutionPlan,
    mode: ExecutionMode,
    policy: InvocationPolicy,
    event_tx: Option<mpsc::Sender<SwarmEvent>>,
}

impl Orchestrator {
    /// Build an orchestrator without a synthesizer.
    ///
    /// Resolves the graph and binds every role to a worker; all
    /// configuration errors surface here, before any worker is called.
    pub fn new(
        descriptors: Vec<StageDescriptor>,
        registry: &WorkerRegistry,
    ) -> Result<Self, ConfigError> {
        Self::build(descriptors, None, registry)
    }

    /// Build an orchestrator whose last stage is `synthesizer`.
    ///
    /// A synthesizer with no explicit `requires` depends on every other
    /// stage. No stage may depend on the synthesizer.
    pub fn with_synthesizer(
        descriptors: Vec<StageDescriptor>,
        synthesizer: StageDescriptor,
        registry: &WorkerRegistry,
    ) -> Result<Self, ConfigError> {
        Self::build(descriptors, Some(synthesizer), registry)
    }

    fn build(
        mut descriptors: Vec<StageDescriptor>,
        synthesizer: Option<StageDescriptor>,
        registry: &WorkerRegistry,
    ) -> Result<Self, ConfigError> {
        let synthesizer_index = match synthesizer {
            Some(mut synth) => {
                if let Some(dependant) = descriptors
                    .iter()
                    .find(|d| d.requires.contains(&synth.stage_id))
                {
                    return Err(ConfigError::SynthesizerHasDependents {
                        synthesizer: synth.stage_id.clone(),
                        stage: dependant.stage_id.clone(),
                    });
                }
                if synth.requires.is_empty() {
                    let all: Vec<String> =
                        descriptors.iter().map(|d| d.stage_id.clone()).collect();
                    synth = synth.requires(all);
                }
                descriptors.push(synth);
                Some(descriptors.len() - 1)
            }
            None => None,
        };

        let mut plan = resolve(&descriptors)?;

        // the synthesizer always runs alone, after every other stage
        if let Some(s) = synthesizer_index {
            plan.order.retain(|&i| i != s);
            plan.order.push(s);
            for wave in &mut plan.waves {
                wave.retain(|&i| i != s);
            }
            plan.waves.retain(|wave| !wave.is_empty());
            plan.waves.push(vec![s]);
        }

        let stages = descriptors
            .into_iter()
            .enumerate()
            .map(|(i, descriptor)| {
                let worker = registry
                    .get(&descriptor.role)
                    .ok_or_else(|| ConfigError::MissingWorker {
                        stage: descriptor.stage_id.clone(),
                        role: descriptor.role.clone(),
                    })?;
                Ok(Stage {
                    descriptor,
                    worker,
                    synthesizer: synthesizer_index == Some(i),
                })
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        Ok(Self {
            stages,
            plan,
            mode: ExecutionMode::default(),
            policy: InvocationPolicy::default(),
            event_tx: None,
        })
    }

    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the default timeout/retry policy for every stage
    pub fn with_policy(mut self, policy: InvocationPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Set event channel for streaming events
    pub fn with_event_channel(mut self, tx: mpsc::Sender<SwarmEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    /// Stage ids in the order they will run
    pub fn execution_order(&self) -> Vec<&str> {
        self.plan
            .order
            .iter()
            .map(|&i| self.stages[i].descriptor.stage_id.as_str())
            .collect()
    }

    /// Stage ids grouped into concurrently runnable waves
    pub fn waves(&self) -> Vec<Vec<&str>> {
        self.plan
            .waves
            .iter()
            .map(|wave| {
                wave.iter()
                    .map(|&i| self.stages[i].descriptor.stage_id.as_str())
                    .collect()
            })
            .collect()
    }

    pub fn synthesizer_id(&self) -> Option<&str> {
        self.stages
            .iter()
            .find(|s| s.synthesizer)
            .map(|s| s.descriptor.stage_id.as_str())
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    /// Run every stage for `request` in a fresh context
    pub async fn run(&self, request: Request) -> Result<PipelineContext, RunError> {
        let mut context = PipelineContext::new(request);
        self.execute(&mut context).await?;
        Ok(context)
    }

    /// Run every stage, recording results into `context`.
    ///
    /// On error the context keeps every result recorded so far.
    pub async fn execute(&self, context: &mut PipelineContext) -> Result<(), RunError> {
        tracing::info!(
            run_id = context.run_id(),
            stages = self.stages.len(),
            mode = ?self.mode,
            "pipeline started"
        );
        emit(
            self.event_tx.as_ref(),
            SwarmEvent::new(SwarmEventKind::PipelineStarted, context.run_id()).with_data(
                serde_json::json!({ "order": self.execution_order() }),
            ),
        )
        .await;

        match self.mode {
            ExecutionMode::Sequential => self.execute_sequential(context).await,
            ExecutionMode::Concurrent { max_parallel } => {
                self.execute_concurrent(context, max_parallel.max(1)).await
            }
        }
    }

    async fn execute_sequential(&self, context: &mut PipelineContext) -> Result<(), RunError> {
        for &i in &self.plan.order {
            let stage = &self.stages[i];
            let result =
                run_stage(stage, &self.policy, self.event_tx.as_ref(), context).await?;
            let fatal = fatal_error(&result);
            context.record(result);
            if let Some(err) = fatal {
                return Err(err);
            }
        }
        Ok(())
    }

    async fn execute_concurrent(
        &self,
        context: &mut PipelineContext,
        max_parallel: usize,
    ) -> Result<(), RunError> {
        let semaphore = Arc::new(Semaphore::new(max_parallel));

        for wave in &self.plan.waves {
            // every stage in a wave reads the same snapshot
            let snapshot = Arc::new(context.clone());
            let mut join_set = JoinSet::new();

            for (slot, &i) in wave.iter().enumerate() {
                let stage = self.stages[i].clone();
                let policy = self.policy;
                let tx = self.event_tx.clone();
                let snapshot = Arc::clone(&snapshot);
                let semaphore = Arc::clone(&semaphore);

                join_set.spawn(async move {
                    let _permit = semaphore.acquire_owned().await.ok();
                    let result = run_stage(&stage, &policy, tx.as_ref(), &snapshot).await;
                    (slot, result)
                });
            }

            // GATHER
            let mut gathered: Vec<Option<Result<StageResult, RunError>>> =
                (0..wave.len()).map(|_| None).collect();
            while let Some(joined) = join_set.join_next().await {
                match joined {
                    Ok((slot, result)) => gathered[slot] = Some(result),
                    Err(e) => return Err(RunError::Task(e.to_string())),
                }
            }

            // append in declaration order, then surface the first error
            let mut first_error = None;
            for result in gathered.into_iter().flatten() {
                match result {
                    Ok(result) => {
                        let fatal = fatal_error(&result);
                        context.record(result);
                        if first_error.is_none() {
                            first_error = fatal;
                        }
                    }
                    Err(err) => {
                        if first_error.is_none() {
                            first_error = Some(err);
                        }
                    }
                }
            }
            if let Some(err) = first_error {
                return Err(err);
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("order", &self.execution_order())
            .field("mode", &self.mode)
            .field("policy", &self.policy)
            .finish()
    }
}

fn fatal_error(result: &StageResult) -> Option<RunError> {
    (result.status == StageStatus::Failed).then(|| RunError::FatalStage {
        stage: result.stage_id.clone(),
        message: result.error.clone().unwrap_or_default(),
    })
}

/// Emit an event; a closed or missing channel is ignored
async fn emit(tx: Option<&mpsc::Sender<SwarmEvent>>, event: SwarmEvent) {
    if let Some(tx) = tx {
        let _ = tx.send(event).await;
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

async fn run_stage(
    stage: &Stage,
    policy: &InvocationPolicy,
    events: Option<&mpsc::Sender<SwarmEvent>>,
    context: &PipelineContext,
) -> Result<StageResult, RunError> {
    let d = &stage.descriptor;

    for dep in &d.requires {
        let usable = context
            .get(dep)
            .map(|r| r.status.is_usable())
            .unwrap_or(false);
        if !usable {
            return Err(RunError::MissingPrerequisite {
                stage: d.stage_id.clone(),
                missing: dep.clone(),
            });
        }
    }

    let request = context.request();
    let projected = catch_unwind(AssertUnwindSafe(|| {
        match (&d.input_projection, stage.synthesizer) {
            (Some(projection), _) => projection(request, context),
            (None, true) => synthesis_input(&d.requires, request, context),
            (None, false) => default_projection(&d.requires, request, context),
        }
    }))
    .unwrap_or_else(|payload| {
        Err(anyhow::anyhow!(
            "projection panicked: {}",
            panic_message(payload.as_ref())
        ))
    });
    let input = projected.map_err(|e| RunError::Projection {
        stage: d.stage_id.clone(),
        message: format!("{:#}", e),
    })?;

    tracing::info!(stage = %d.stage_id, role = %d.role, "stage started");
    emit(
        events,
        SwarmEvent::new(SwarmEventKind::StageStarted, context.run_id()).with_stage(&d.stage_id),
    )
    .await;

    let invocation = invoke(
        Arc::clone(&stage.worker),
        &d.role,
        input,
        &policy.for_stage(d),
    )
    .await;
    let result = settle(d, invocation);

    let kind = match result.status {
        StageStatus::Ok => {
            tracing::info!(
                stage = %d.stage_id,
                duration_ms = result.duration_ms,
                "stage completed"
            );
            SwarmEventKind::StageCompleted
        }
        StageStatus::Degraded => {
            tracing::warn!(
                stage = %d.stage_id,
                attempts = result.attempts,
                error = result.error.as_deref().unwrap_or_default(),
                "stage degraded, continuing with placeholder"
            );
            SwarmEventKind::StageDegraded
        }
        StageStatus::Failed => {
            tracing::error!(
                stage = %d.stage_id,
                error = result.error.as_deref().unwrap_or_default(),
                "fatal stage failed"
            );
            SwarmEventKind::StageFailed
        }
    };

    let mut data = serde_json::json!({
        "duration_ms": result.duration_ms,
        "attempts": result.attempts,
    });
    if let Some(error) = &result.error {
        data["error"] = serde_json::json!(error);
    }
    emit(
        events,
        SwarmEvent::new(kind, context.run_id())
            .with_stage(&d.stage_id)
            .with_data(data),
    )
    .await;

    Ok(result)
}
