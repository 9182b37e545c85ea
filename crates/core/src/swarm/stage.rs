//! # Stages
//!
//! Static stage descriptors and the per-stage outcome recorded in the
//! pipeline context.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::context::PipelineContext;
use super::request::Request;

/// Semi-structured worker output: string keys, nested scalars/lists/maps.
pub type Payload = Map<String, Value>;

/// Builds a worker's input from the request and the results recorded so far.
///
/// Projections must be deterministic: the same request and context always
/// produce the same input.
pub type InputProjection =
    Arc<dyn Fn(&Request, &PipelineContext) -> anyhow::Result<String> + Send + Sync>;

/// Outcome class of a stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// Worker returned normally
    Ok,
    /// Worker failed; a placeholder payload was substituted
    Degraded,
    /// Worker failed on a stage marked fatal; the run aborts
    Failed,
}

impl StageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Degraded => "degraded",
            Self::Failed => "failed",
        }
    }

    /// Whether downstream stages may consume this result
    pub fn is_usable(&self) -> bool {
        matches!(self, Self::Ok | Self::Degraded)
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One worker's outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageResult {
    pub stage_id: String,
    pub status: StageStatus,
    pub payload: Payload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub produced_at: DateTime<Utc>,
    /// Time spent in the worker call(s)
    #[serde(default)]
    pub duration_ms: u64,
    /// Number of worker invocations made
    #[serde(default = "one")]
    pub attempts: u32,
}

fn one() -> u32 {
    1
}

impl StageResult {
    /// Create an Ok result
    pub fn ok(stage_id: impl Into<String>, payload: Payload) -> Self {
        Self {
            stage_id: stage_id.into(),
            status: StageStatus::Ok,
            payload,
            error: None,
            produced_at: Utc::now(),
            duration_ms: 0,
            attempts: 1,
        }
    }

    /// Create a degraded result carrying a placeholder payload
    pub fn degraded(
        stage_id: impl Into<String>,
        placeholder: Payload,
        error: impl Into<String>,
    ) -> Self {
        Self {
            stage_id: stage_id.into(),
            status: StageStatus::Degraded,
            payload: placeholder,
            error: Some(error.into()),
            produced_at: Utc::now(),
            duration_ms: 0,
            attempts: 1,
        }
    }

    /// Create a failed (fatal) result
    pub fn failed(
        stage_id: impl Into<String>,
        placeholder: Payload,
        error: impl Into<String>,
    ) -> Self {
        Self {
            status: StageStatus::Failed,
            ..Self::degraded(stage_id, placeholder, error)
        }
    }

    /// Attach timing information
    pub fn with_timing(mut self, duration: Duration, attempts: u32) -> Self {
        self.duration_ms = duration.as_millis() as u64;
        self.attempts = attempts;
        self
    }

    pub fn is_ok(&self) -> bool {
        self.status == StageStatus::Ok
    }

    pub fn is_degraded(&self) -> bool {
        self.status == StageStatus::Degraded
    }

    /// Read a string field from the payload
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(Value::as_str)
    }
}

/// Static definition of one DAG node
#[derive(Clone)]
pub struct StageDescriptor {
    pub stage_id: String,
    /// Opaque role used to select the worker
    pub role: String,
    /// Stages that must have a usable result before this one runs
    pub requires: BTreeSet<String>,
    /// `None` uses the default dependency projection
    pub input_projection: Option<InputProjection>,
    /// Payload shape substituted when the worker fails
    pub placeholder: Payload,
    /// Failure aborts the run instead of degrading
    pub fatal: bool,
    /// Overrides the orchestrator's default timeout
    pub timeout: Option<Duration>,
    /// Overrides the orchestrator's default retry count
    pub retries: Option<u32>,
}

impl StageDescriptor {
    pub fn new(stage_id: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            stage_id: stage_id.into(),
            role: role.into(),
            requires: BTreeSet::new(),
            input_projection: None,
            placeholder: Payload::new(),
            fatal: false,
            timeout: None,
            retries: None,
        }
    }

    /// Add prerequisite stages
    pub fn requires<I, S>(mut self, stages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.requires.extend(stages.into_iter().map(Into::into));
        self
    }

    /// Set a custom input projection
    pub fn project<F>(mut self, projection: F) -> Self
    where
        F: Fn(&Request, &PipelineContext) -> anyhow::Result<String> + Send + Sync + 'static,
    {
        self.input_projection = Some(Arc::new(projection));
        self
    }

    /// Set the placeholder payload used when this stage degrades.
    ///
    /// Non-object values are ignored.
    pub fn placeholder(mut self, shape: Value) -> Self {
        if let Value::Object(map) = shape {
            self.placeholder = map;
        }
        self
    }

    /// Mark this stage's failure as fatal to the run
    pub fn fatal(mut self) -> Self {
        self.fatal = true;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = Some(retries);
        self
    }
}

impl fmt::Debug for StageDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageDescriptor")
            .field("stage_id", &self.stage_id)
            .field("role", &self.role)
            .field("requires", &self.requires)
            .field("custom_projection", &self.input_projection.is_some())
            .field("fatal", &self.fatal)
            .field("timeout", &self.timeout)
            .field("retries", &self.retries)
            .finish()
    }
}
