//! # Cohort Core
//!
//! DAG-based multi-worker orchestration: a request flows through a team of
//! specialized workers, each stage sees only its prerequisites' results, and
//! a synthesizer merges everything into one artifact. A failing worker
//! degrades its stage instead of aborting the run.
//!
//! ## Architecture
//!
//! - `swarm/` - Stages, graph resolution, orchestrator, coordinator, artifacts
//! - `skills/` - The worker boundary, LLM workers, team presets
//! - `models/` - Centralized LLM provider configuration
//! - `state/` - SQLite run ledger
//! - `tools/` - Worker-side helpers (TTL cache)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use cohort_core::swarm::{Coordinator, CoordinatorConfig, Request};
//!
//! let config = CoordinatorConfig::default();
//! let coordinator = Coordinator::from_config("location-intelligence", &config)?;
//! let artifact = coordinator.run(Request::new("Austin, Texas")).await;
//! println!("{}", artifact.to_markdown());
//! ```

pub mod models;
pub mod skills;
pub mod state;
pub mod swarm;
pub mod tools;
