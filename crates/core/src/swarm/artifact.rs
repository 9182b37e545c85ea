//! # Artifacts
//!
//! The single deliverable a run returns. Synthesized and error artifacts
//! share one shape so callers never branch on type.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::Write as _;

use super::context::PipelineContext;
use super::stage::{Payload, StageResult};

/// Terminal status of an artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactStatus {
    /// Every stage returned normally
    Completed,
    /// Synthesized, but at least one upstream stage used a placeholder
    Degraded,
    /// The run failed; this is the fallback error report
    Aborted,
}

impl ArtifactStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Degraded => "degraded",
            Self::Aborted => "aborted",
        }
    }
}

/// Fixed guidance attached to error artifacts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallbackNotice {
    /// Numbered next steps
    pub actions: Vec<String>,
    /// Places to look while the service is unavailable
    #[serde(default)]
    pub resources: Vec<String>,
    pub closing: String,
}

impl Default for FallbackNotice {
    fn default() -> Self {
        Self {
            actions: vec![
                "Retry the request in a few minutes".to_string(),
                "Check that the configured model provider is reachable".to_string(),
            ],
            resources: Vec::new(),
            closing: "Please retry the analysis.".to_string(),
        }
    }
}

/// Final output of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub subject: String,
    pub status: ArtifactStatus,
    pub title: String,
    /// Synthesized text, or the error report
    pub body: String,
    /// Synthesizer payload (empty for error artifacts)
    #[serde(default)]
    pub sections: Payload,
    /// Stages whose results were placeholders
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub degraded_stages: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub next_steps: Vec<String>,
    pub run_id: String,
    pub produced_at: DateTime<Utc>,
}

impl Artifact {
    /// Build the artifact from the synthesizer's result.
    ///
    /// The body is the payload's `content` field when it is a string, and
    /// the pretty-printed payload otherwise.
    pub fn from_synthesis(team: &str, context: &PipelineContext, synthesis: &StageResult) -> Self {
        let subject = context.request().subject.clone();
        let degraded_stages: Vec<String> = context
            .results()
            .filter(|r| !r.is_ok())
            .map(|r| r.stage_id.clone())
            .collect();

        let title = synthesis
            .get_str("title")
            .map(str::to_string)
            .unwrap_or_else(|| format!("{} report: {}", team, subject));
        let body = match synthesis.get_str("content") {
            Some(content) => content.to_string(),
            None => serde_json::to_string_pretty(&Value::Object(synthesis.payload.clone()))
                .unwrap_or_default(),
        };

        Self {
            subject,
            status: if degraded_stages.is_empty() {
                ArtifactStatus::Completed
            } else {
                ArtifactStatus::Degraded
            },
            title,
            body,
            sections: synthesis.payload.clone(),
            degraded_stages,
            error: None,
            next_steps: Vec::new(),
            run_id: context.run_id().to_string(),
            produced_at: Utc::now(),
        }
    }

    /// Build the generic error artifact
    pub fn error_report(
        team: &str,
        subject: &str,
        run_id: &str,
        error: &str,
        fallback: &FallbackNotice,
    ) -> Self {
        let mut body = String::new();
        let _ = writeln!(body, "## Error Summary\n");
        let _ = writeln!(body, "An error occurred during the {} analysis:\n", team);
        let _ = writeln!(body, "```\n{}\n```\n", error);
        let _ = writeln!(body, "## Recommended Actions\n");
        for (i, action) in fallback.actions.iter().enumerate() {
            let _ = writeln!(body, "{}. {}", i + 1, action);
        }
        if !fallback.resources.is_empty() {
            let _ = writeln!(body, "\n## Manual Resources\n");
            for resource in &fallback.resources {
                let _ = writeln!(body, "- {}", resource);
            }
        }
        let _ = write!(body, "\n{}", fallback.closing);

        Self {
            subject: subject.to_string(),
            status: ArtifactStatus::Aborted,
            title: format!("{} report: {} (error)", team, subject),
            body,
            sections: Payload::new(),
            degraded_stages: Vec::new(),
            error: Some(error.to_string()),
            next_steps: fallback
                .actions
                .iter()
                .chain(fallback.resources.iter())
                .cloned()
                .collect(),
            run_id: run_id.to_string(),
            produced_at: Utc::now(),
        }
    }

    pub fn is_aborted(&self) -> bool {
        self.status == ArtifactStatus::Aborted
    }

    /// Render as a markdown document
    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "# {}\n", self.title);
        let _ = writeln!(out, "**Subject:** {}  ", self.subject);
        let _ = writeln!(out, "**Generated:** {}  ", self.produced_at.to_rfc3339());
        let _ = writeln!(out, "**Status:** {}  ", self.status.as_str());
        let _ = writeln!(out, "**Run:** {}\n", self.run_id);

        if !self.degraded_stages.is_empty() {
            let _ = writeln!(
                out,
                "> Built with partial data: {} did not complete.\n",
                self.degraded_stages.join(", ")
            );
        }

        out.push_str(self.body.trim_end());
        out.push('\n');
        out
    }
}
