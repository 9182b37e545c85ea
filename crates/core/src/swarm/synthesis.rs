//! # Input Projections
//!
//! Default projections used when a descriptor does not declare its own:
//! ordinary stages see the request plus their prerequisites' payloads; the
//! synthesizer sees the request plus every prerequisite result with its
//! status.

use anyhow::{Context, Result};
use serde_json::{json, Map, Value};
use std::collections::BTreeSet;

use super::context::PipelineContext;
use super::request::Request;

/// Project the request and the payloads of `requires` into a JSON document.
///
/// Stages without prerequisites receive only the request.
pub fn default_projection(
    requires: &BTreeSet<String>,
    request: &Request,
    context: &PipelineContext,
) -> Result<String> {
    let mut inputs = Map::new();
    for stage_id in requires {
        let payload = context
            .payload(stage_id)
            .with_context(|| format!("no result recorded for '{}'", stage_id))?;
        inputs.insert(stage_id.clone(), Value::Object(payload.clone()));
    }

    let document = if inputs.is_empty() {
        json!({ "request": request })
    } else {
        json!({ "request": request, "inputs": inputs })
    };
    serde_json::to_string_pretty(&document).context("failed to serialize stage input")
}

/// Serialize the accumulated context for the synthesizer.
///
/// Stages appear in execution order. Each entry carries its status and
/// error so degraded sections can be flagged in the final artifact.
pub fn synthesis_input(
    requires: &BTreeSet<String>,
    request: &Request,
    context: &PipelineContext,
) -> Result<String> {
    let stages: Vec<Value> = context
        .results()
        .filter(|r| requires.contains(&r.stage_id))
        .map(|r| {
            let mut entry = json!({
                "stage_id": r.stage_id,
                "status": r.status,
                "payload": r.payload,
            });
            if let Some(error) = &r.error {
                entry["error"] = json!(error);
            }
            entry
        })
        .collect();

    let degraded: Vec<&str> = context
        .results()
        .filter(|r| requires.contains(&r.stage_id) && !r.is_ok())
        .map(|r| r.stage_id.as_str())
        .collect();

    let document = json!({
        "request": request,
        "stages": stages,
        "degraded_stages": degraded,
    });
    serde_json::to_string_pretty(&document).context("failed to serialize synthesis input")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::swarm::stage::{Payload, StageResult};

    fn payload(value: Value) -> Payload {
        value.as_object().cloned().unwrap_or_default()
    }

    fn set(ids: &[&str]) -> BTreeSet<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_projection_without_prerequisites() {
        let request = Request::new("Austin, Texas");
        let context = PipelineContext::new(request.clone());

        let input = default_projection(&BTreeSet::new(), &request, &context).unwrap();
        let value: Value = serde_json::from_str(&input).unwrap();

        assert_eq!(value["request"]["subject"], "Austin, Texas");
        assert!(value.get("inputs").is_none());
    }

    #[test]
    fn test_projection_includes_prerequisite_payloads() {
        let request = Request::new("Austin, Texas");
        let mut context = PipelineContext::new(request.clone());
        context.record(StageResult::ok("geo", payload(json!({ "county": "Travis" }))));
        context.record(StageResult::ok("other", payload(json!({ "noise": true }))));

        let input = default_projection(&set(&["geo"]), &request, &context).unwrap();
        let value: Value = serde_json::from_str(&input).unwrap();

        assert_eq!(value["inputs"]["geo"]["county"], "Travis");
        assert!(value["inputs"].get("other").is_none());
    }

    #[test]
    fn test_projection_is_deterministic() {
        let request = Request::new("Austin").with_field("age", json!(65));
        let mut context = PipelineContext::new(request.clone());
        context.record(StageResult::ok("b", payload(json!({ "z": 1, "a": 2 }))));
        context.record(StageResult::ok("a", payload(json!({ "k": [1, 2, 3] }))));

        let requires = set(&["a", "b"]);
        let first = default_projection(&requires, &request, &context).unwrap();
        let second = default_projection(&requires, &request, &context.clone()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_projection_missing_prerequisite_is_error() {
        let request = Request::new("Austin");
        let context = PipelineContext::new(request.clone());
        assert!(default_projection(&set(&["geo"]), &request, &context).is_err());
    }

    #[test]
    fn test_synthesis_input_flags_degraded_stages() {
        let request = Request::new("Austin, Texas");
        let mut context = PipelineContext::new(request.clone());
        context.record(StageResult::ok("geo", payload(json!({ "county": "Travis" }))));
        context.record(StageResult::degraded(
            "epi",
            payload(json!({ "degraded": true })),
            "ConnectionError",
        ));

        let input = synthesis_input(&set(&["geo", "epi"]), &request, &context).unwrap();
        let value: Value = serde_json::from_str(&input).unwrap();

        assert_eq!(value["stages"][0]["stage_id"], "geo");
        assert_eq!(value["stages"][0]["status"], "ok");
        assert_eq!(value["stages"][1]["status"], "degraded");
        assert_eq!(value["stages"][1]["error"], "ConnectionError");
        assert_eq!(value["degraded_stages"], json!(["epi"]));
    }
}
