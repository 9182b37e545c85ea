//! # State
//!
//! Optional persistence. The orchestration core keeps no state between
//! runs; the run ledger is an audit collaborator attached to the
//! coordinator.

pub mod db;
pub mod run_ledger;

pub use db::CohortDb;
pub use run_ledger::{RunLedger, RunRecord};
