//! # Swarm Events
//!
//! Progress events emitted while a pipeline runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of swarm event
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SwarmEventKind {
    /// Run started
    PipelineStarted,
    /// A stage's worker was invoked
    StageStarted,
    /// Stage finished Ok
    StageCompleted,
    /// Stage failed and was replaced by its placeholder
    StageDegraded,
    /// Fatal stage failed
    StageFailed,
    /// Run finished with an artifact from the synthesizer
    PipelineCompleted,
    /// Run ended with the fallback error artifact
    PipelineAborted,
}

impl SwarmEventKind {
    /// Wire name, as serialized
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PipelineStarted => "pipeline_started",
            Self::StageStarted => "stage_started",
            Self::StageCompleted => "stage_completed",
            Self::StageDegraded => "stage_degraded",
            Self::StageFailed => "stage_failed",
            Self::PipelineCompleted => "pipeline_completed",
            Self::PipelineAborted => "pipeline_aborted",
        }
    }
}

/// An event in the swarm
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwarmEvent {
    /// Unique event ID
    pub id: String,
    /// Timestamp
    pub timestamp: DateTime<Utc>,
    /// Kind of event
    pub kind: SwarmEventKind,
    /// Run this event belongs to
    pub run_id: String,
    /// Stage that produced this event, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    /// Associated data (JSON)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl SwarmEvent {
    /// Create a new event
    pub fn new(kind: SwarmEventKind, run_id: &str) -> Self {
        Self {
            id: new_id(),
            timestamp: Utc::now(),
            kind,
            run_id: run_id.to_string(),
            stage: None,
            data: None,
        }
    }

    /// Attach the originating stage
    pub fn with_stage(mut self, stage: &str) -> Self {
        self.stage = Some(stage.to_string());
        self
    }

    /// Add data to the event
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// Generate a time-ordered unique id
pub fn new_id() -> String {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    static COUNTER: AtomicU32 = AtomicU32::new(0);

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_nanos();
    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{:x}-{:x}{:04x}", nanos, rand_u32() >> 16, seq & 0xffff)
}

/// Simple random number (not cryptographic)
fn rand_u32() -> u32 {
    use std::collections::hash_map::RandomState;
    use std::hash::{BuildHasher, Hasher};
    RandomState::new().build_hasher().finish() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_creation() {
        let event = SwarmEvent::new(SwarmEventKind::StageDegraded, "run-1")
            .with_stage("epidemiological")
            .with_data(serde_json::json!({ "error": "timeout" }));

        assert_eq!(event.run_id, "run-1");
        assert_eq!(event.stage.as_deref(), Some("epidemiological"));
        assert_eq!(event.data.unwrap()["error"], "timeout");
    }

    #[test]
    fn test_event_serialization() {
        let event = SwarmEvent::new(SwarmEventKind::PipelineStarted, "run-2");
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"kind\":\"pipeline_started\""));
        assert!(!json.contains("\"stage\""));
    }

    #[test]
    fn test_kind_names_match_serde() {
        for kind in [SwarmEventKind::StageDegraded, SwarmEventKind::PipelineAborted] {
            let json = serde_json::to_value(kind).unwrap();
            assert_eq!(json, kind.as_str());
        }
    }

    #[test]
    fn test_ids_are_unique() {
        let ids: std::collections::HashSet<String> = (0..100).map(|_| new_id()).collect();
        assert_eq!(ids.len(), 100);
    }
}
