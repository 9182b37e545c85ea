//! # Swarm Orchestration
//!
//! Runs a team of role-bound workers over a dependency graph of stages and
//! folds their results into one artifact.
//!
//! ## Run Flow
//!
//! ```text
//! Request → PipelineContext → Orchestrator (resolve → waves) → Synthesizer → Artifact
//!                                   │
//!                                   └── per stage: project → invoke → settle → record
//! ```
//!
//! A failing stage records a degraded placeholder and the run continues; only
//! configuration errors, projection errors, and fatal stages abort it. The
//! coordinator turns an aborted run into the team's error artifact.

pub mod artifact;
pub mod context;
pub mod coordinator;
pub mod events;
pub mod graph;
pub mod invoke;
pub mod orchestrator;
pub mod pipeline;
pub mod request;
pub mod stage;
pub mod synthesis;

pub use artifact::{Artifact, ArtifactStatus, FallbackNotice};
pub use context::PipelineContext;
pub use coordinator::{Coordinator, CoordinatorConfig, RunOutcome};
pub use events::{SwarmEvent, SwarmEventKind};
pub use graph::{resolve, ConfigError, ExecutionPlan};
pub use invoke::InvocationPolicy;
pub use orchestrator::{ExecutionMode, Orchestrator, RunError};
pub use pipeline::{PipelineRun, RunPhase};
pub use request::{Request, RequestError, Urgency};
pub use stage::{InputProjection, Payload, StageDescriptor, StageResult, StageStatus};
