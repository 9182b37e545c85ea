//! # Cohort Workers
//!
//! The worker boundary: role-bound units that turn a projected input into a
//! payload, or fail.
//!
//! ## Architecture
//!
//! ```text
//! Orchestrator
//!   └── WorkerRegistry (role -> Arc<dyn Worker>)
//!         ├── LlmWorker    (radkit provider call)
//!         ├── CachedWorker (TTL cache in front of another worker)
//!         └── FnWorker     (closure; stubs and local data sources)
//! ```
//!
//! Team presets (`team_definitions`) compose stage descriptors and role
//! instructions into ready-to-run pipelines.

pub mod cached_worker;
pub mod llm_helpers;
pub mod llm_worker;
pub mod team_definitions;

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::swarm::Payload;

pub use cached_worker::CachedWorker;
pub use llm_worker::{LlmWorker, LlmWorkerFactory, StageReport};
pub use team_definitions::{all_teams, find_team, RoleSpec, TeamDefinition};

/// A worker failure.
///
/// Only the message survives into the stage result; `partial` carries any
/// data collected before the failure so it can be merged into the
/// placeholder payload.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct WorkerError {
    pub message: String,
    pub partial: Option<Payload>,
}

impl WorkerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            partial: None,
        }
    }

    /// Attach data gathered before the failure
    pub fn with_partial(mut self, partial: Payload) -> Self {
        self.partial = Some(partial);
        self
    }
}

impl From<anyhow::Error> for WorkerError {
    fn from(err: anyhow::Error) -> Self {
        Self::new(format!("{:#}", err))
    }
}

/// One specialized reasoning task
///
/// Workers know nothing about the pipeline: they receive their role and the
/// already-projected input and return a payload.
#[async_trait]
pub trait Worker: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &str;

    async fn run(&self, role: &str, input: &str) -> Result<Payload, WorkerError>;
}

/// Worker backed by a synchronous closure
///
/// Used for stub workers in tests and for deterministic local data sources.
pub struct FnWorker<F> {
    name: String,
    func: F,
}

impl<F> FnWorker<F>
where
    F: Fn(&str, &str) -> Result<Payload, WorkerError> + Send + Sync,
{
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

#[async_trait]
impl<F> Worker for FnWorker<F>
where
    F: Fn(&str, &str) -> Result<Payload, WorkerError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, role: &str, input: &str) -> Result<Payload, WorkerError> {
        (self.func)(role, input)
    }
}

/// Maps roles to workers
#[derive(Clone, Default)]
pub struct WorkerRegistry {
    workers: HashMap<String, Arc<dyn Worker>>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a worker for a role, replacing any previous one
    pub fn register(&mut self, role: impl Into<String>, worker: Arc<dyn Worker>) {
        self.workers.insert(role.into(), worker);
    }

    /// Builder-style registration
    pub fn with(mut self, role: impl Into<String>, worker: impl Worker + 'static) -> Self {
        self.register(role, Arc::new(worker));
        self
    }

    pub fn get(&self, role: &str) -> Option<Arc<dyn Worker>> {
        self.workers.get(role).cloned()
    }

    pub fn contains(&self, role: &str) -> bool {
        self.workers.contains_key(role)
    }

    pub fn roles(&self) -> Vec<&str> {
        let mut roles: Vec<&str> = self.workers.keys().map(String::as_str).collect();
        roles.sort_unstable();
        roles
    }
}

impl fmt::Debug for WorkerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerRegistry")
            .field("roles", &self.roles())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_fn_worker_runs_closure() {
        let worker = FnWorker::new("echo", |role: &str, input: &str| {
            let mut payload = Payload::new();
            payload.insert("role".into(), json!(role));
            payload.insert("echo".into(), json!(input));
            Ok(payload)
        });

        let payload = worker.run("geo", "Austin").await.unwrap();
        assert_eq!(payload["role"], "geo");
        assert_eq!(payload["echo"], "Austin");
        assert_eq!(worker.name(), "echo");
    }

    #[test]
    fn test_worker_error_from_anyhow_keeps_context_chain() {
        let err: WorkerError = anyhow::anyhow!("connection refused")
            .context("geocoder unavailable")
            .into();
        assert_eq!(err.message, "geocoder unavailable: connection refused");
        assert!(err.partial.is_none());
    }

    #[test]
    fn test_registry_lookup() {
        let registry = WorkerRegistry::new()
            .with("b", FnWorker::new("b", |_: &str, _: &str| Ok(Payload::new())))
            .with("a", FnWorker::new("a", |_: &str, _: &str| Ok(Payload::new())));

        assert!(registry.contains("a"));
        assert!(registry.get("missing").is_none());
        assert_eq!(registry.roles(), vec!["a", "b"]);
    }
}
