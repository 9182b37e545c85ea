//! # Requests
//!
//! The caller input a run is built from. Accepts either a bare subject
//! string or a JSON object.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

/// Errors parsing a raw request
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("no subject provided for analysis")]
    EmptySubject,
    #[error("invalid request JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

/// How urgently the caller needs the artifact
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    #[default]
    Routine,
    Urgent,
    Emergency,
}

impl Urgency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Routine => "routine",
            Self::Urgent => "urgent",
            Self::Emergency => "emergency",
        }
    }
}

impl fmt::Display for Urgency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Urgency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "routine" => Ok(Self::Routine),
            "urgent" => Ok(Self::Urgent),
            "emergency" => Ok(Self::Emergency),
            other => Err(format!("unknown urgency level: {}", other)),
        }
    }
}

/// Caller input for one pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Primary subject: a location, a case description, a URL
    #[serde(alias = "location", alias = "url", alias = "prompt")]
    pub subject: String,
    #[serde(default, alias = "emergency_level")]
    pub urgency: Urgency,
    /// Desired depth of analysis (e.g. "comprehensive")
    #[serde(default, alias = "query_type", skip_serializing_if = "Option::is_none")]
    pub depth: Option<String>,
    /// Desired output format (e.g. "markdown")
    #[serde(default, alias = "output_format", skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    /// Any further context fields
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Request {
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            urgency: Urgency::default(),
            depth: None,
            format: None,
            extra: Map::new(),
        }
    }

    pub fn with_urgency(mut self, urgency: Urgency) -> Self {
        self.urgency = urgency;
        self
    }

    pub fn with_depth(mut self, depth: impl Into<String>) -> Self {
        self.depth = Some(depth.into());
        self
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    /// Add a free-form context field
    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Parse raw caller text.
    ///
    /// Text starting with `{` is read as a JSON request; anything else is
    /// taken verbatim as the subject.
    pub fn parse(raw: &str) -> Result<Self, RequestError> {
        let trimmed = raw.trim();
        let request = if trimmed.starts_with('{') {
            serde_json::from_str::<Request>(trimmed)?
        } else {
            Request::new(trimmed)
        };

        if request.subject.trim().is_empty() {
            return Err(RequestError::EmptySubject);
        }
        Ok(request)
    }

    /// Read a string field from `extra`
    pub fn field_str(&self, key: &str) -> Option<&str> {
        self.extra.get(key).and_then(Value::as_str)
    }
}
