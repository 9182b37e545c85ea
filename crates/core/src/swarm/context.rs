//! # Pipeline Context
//!
//! The request and the stage results of one run, in the order they were recorded.

use serde_json::Value;
use std::collections::HashMap;

use super::events::new_id;
use super::request::Request;
use super::stage::{Payload, StageResult};

/// Run-scoped record of stage results
///
/// Holds the immutable request and an insertion-ordered mapping of
/// stage id to [`StageResult`]. One context belongs to exactly one run.
///
/// # Example
/// ```
/// use cohort_core::swarm::{PipelineContext, Request, StageResult};
///
/// let mut context = PipelineContext::new(Request::new("Austin, Texas"));
/// context.record(StageResult::ok("geographic", Default::default()));
///
/// assert!(context.contains("geographic"));
/// assert_eq!(context.stage_ids(), vec!["geographic"]);
/// ```
#[derive(Debug, Clone)]
pub struct PipelineContext {
    run_id: String,
    request: Request,
    results: Vec<StageResult>,
    index: HashMap<String, usize>,
}

impl PipelineContext {
    /// Create a fresh context with a generated run id
    pub fn new(request: Request) -> Self {
        Self::with_run_id(new_id(), request)
    }

    pub fn with_run_id(run_id: impl Into<String>, request: Request) -> Self {
        Self {
            run_id: run_id.into(),
            request,
            results: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    /// Record a stage result.
    ///
    /// A second result for the same stage replaces the first in place;
    /// no history is kept.
    pub fn record(&mut self, result: StageResult) {
        match self.index.get(&result.stage_id) {
            Some(&slot) => self.results[slot] = result,
            None => {
                self.index
                    .insert(result.stage_id.clone(), self.results.len());
                self.results.push(result);
            }
        }
    }

    pub fn get(&self, stage_id: &str) -> Option<&StageResult> {
        self.index.get(stage_id).map(|&slot| &self.results[slot])
    }

    pub fn contains(&self, stage_id: &str) -> bool {
        self.index.contains_key(stage_id)
    }

    /// Payload of a recorded stage
    pub fn payload(&self, stage_id: &str) -> Option<&Payload> {
        self.get(stage_id).map(|r| &r.payload)
    }

    /// Read one field of a stage's payload
    pub fn field(&self, stage_id: &str, key: &str) -> Option<&Value> {
        self.payload(stage_id).and_then(|p| p.get(key))
    }

    /// Read one string field of a stage's payload
    pub fn field_str(&self, stage_id: &str, key: &str) -> Option<&str> {
        self.field(stage_id, key).and_then(Value::as_str)
    }

    /// Results in insertion order
    pub fn results(&self) -> impl Iterator<Item = &StageResult> {
        self.results.iter()
    }

    pub fn stage_ids(&self) -> Vec<&str> {
        self.results.iter().map(|r| r.stage_id.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Number of stages that degraded
    pub fn degraded_count(&self) -> usize {
        self.results.iter().filter(|r| r.is_degraded()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::swarm::stage::StageStatus;
    use serde_json::json;

    fn payload(value: Value) -> Payload {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_context_creation() {
        let context = PipelineContext::with_run_id("run-1", Request::new("Austin"));
        assert_eq!(context.run_id(), "run-1");
        assert_eq!(context.request().subject, "Austin");
        assert!(context.is_empty());
    }

    #[test]
    fn test_generated_run_ids_differ() {
        let a = PipelineContext::new(Request::new("x"));
        let b = PipelineContext::new(Request::new("x"));
        assert_ne!(a.run_id(), b.run_id());
    }

    #[test]
    fn test_insertion_order() {
        let mut context = PipelineContext::new(Request::new("Austin"));
        context.record(StageResult::ok("b", Payload::new()));
        context.record(StageResult::ok("a", Payload::new()));
        context.record(StageResult::ok("c", Payload::new()));

        assert_eq!(context.stage_ids(), vec!["b", "a", "c"]);
        assert_eq!(context.len(), 3);
    }

    #[test]
    fn test_rerun_overwrites_in_place() {
        let mut context = PipelineContext::new(Request::new("Austin"));
        context.record(StageResult::degraded("a", Payload::new(), "timeout"));
        context.record(StageResult::ok("b", Payload::new()));
        context.record(StageResult::ok("a", payload(json!({ "summary": "retry" }))));

        assert_eq!(context.stage_ids(), vec!["a", "b"]);
        assert_eq!(context.get("a").unwrap().status, StageStatus::Ok);
        assert_eq!(context.field_str("a", "summary"), Some("retry"));
        assert_eq!(context.degraded_count(), 0);
    }

    #[test]
    fn test_field_access() {
        let mut context = PipelineContext::new(Request::new("Austin"));
        context.record(StageResult::ok(
            "geo",
            payload(json!({ "county": "Travis", "population": 1300000 })),
        ));

        assert_eq!(context.field_str("geo", "county"), Some("Travis"));
        assert_eq!(context.field("geo", "population"), Some(&json!(1300000)));
        assert!(context.field_str("geo", "population").is_none());
        assert!(context.field("missing", "county").is_none());
    }
}
