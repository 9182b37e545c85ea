//! # Run Ledger
//!
//! Audit record of coordinator runs: one row per run, written when the run
//! starts and updated with the artifact when it finishes.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

use super::db::CohortDb;
use crate::swarm::Artifact;

/// One ledger row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    pub team: String,
    pub subject: String,
    /// `running`, or the artifact status once finished
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<Artifact>,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunRecord {
    pub fn is_finished(&self) -> bool {
        self.finished_at.is_some()
    }
}

/// SQLite-backed run ledger
#[derive(Clone)]
pub struct RunLedger {
    conn: Arc<Mutex<Connection>>,
}

impl RunLedger {
    /// Create from shared CohortDb connection
    pub fn new(db: &CohortDb) -> Self {
        Self {
            conn: db.connection(),
        }
    }

    /// Record that a run started
    pub fn record_start(&self, run_id: &str, team: &str, subject: &str) -> Result<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        conn.execute(
            r#"
            INSERT OR REPLACE INTO runs (run_id, team, subject, status, started_at)
            VALUES (?1, ?2, ?3, 'running', ?4)
            "#,
            params![run_id, team, subject, Utc::now().to_rfc3339()],
        )
        .context("Failed to record run start")?;

        Ok(())
    }

    /// Record the artifact a run finished with
    pub fn record_finish(&self, artifact: &Artifact) -> Result<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        let artifact_json = serde_json::to_string(artifact)?;
        let affected = conn.execute(
            r#"
            UPDATE runs
            SET status = ?1, error = ?2, artifact_json = ?3, finished_at = ?4
            WHERE run_id = ?5
            "#,
            params![
                artifact.status.as_str(),
                artifact.error,
                artifact_json,
                artifact.produced_at.to_rfc3339(),
                artifact.run_id,
            ],
        )?;

        if affected == 0 {
            anyhow::bail!("Run not found: {}", artifact.run_id);
        }
        Ok(())
    }

    /// Load a run by ID
    pub fn load(&self, run_id: &str) -> Result<RunRecord> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        conn.query_row(
            r#"
            SELECT run_id, team, subject, status, error, artifact_json, started_at, finished_at
            FROM runs WHERE run_id = ?1
            "#,
            params![run_id],
            Self::row_to_record,
        )
        .with_context(|| format!("Run not found: {}", run_id))
    }

    /// Most recent runs first
    pub fn list_recent(&self, limit: usize) -> Result<Vec<RunRecord>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        let mut stmt = conn.prepare(
            r#"
            SELECT run_id, team, subject, status, error, artifact_json, started_at, finished_at
            FROM runs
            ORDER BY started_at DESC
            LIMIT ?1
            "#,
        )?;

        let records = stmt
            .query_map(params![limit as i64], Self::row_to_record)?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to list runs")?;

        Ok(records)
    }

    fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<RunRecord> {
        let artifact_json: Option<String> = row.get(5)?;
        let started_at: String = row.get(6)?;
        let finished_at: Option<String> = row.get(7)?;

        Ok(RunRecord {
            run_id: row.get(0)?,
            team: row.get(1)?,
            subject: row.get(2)?,
            status: row.get(3)?,
            error: row.get(4)?,
            artifact: artifact_json.and_then(|s| serde_json::from_str(&s).ok()),
            started_at: parse_time(&started_at).unwrap_or_else(Utc::now),
            finished_at: finished_at.as_deref().and_then(parse_time),
        })
    }
}

fn parse_time(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .ok()
}
