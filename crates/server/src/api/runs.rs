//! # Team & Run API
//!
//! List preset teams, run one, and browse the run ledger.

use axum::extract::{Path, Query, State};
use axum::Json;
use cohort_core::skills::{all_teams, TeamDefinition};
use cohort_core::state::RunRecord;
use cohort_core::swarm::Artifact;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use super::{ApiError, SharedState};

#[derive(Debug, Serialize, ToSchema)]
pub struct StageInfo {
    pub id: String,
    pub requires: Vec<String>,
    pub fatal: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TeamInfo {
    pub name: String,
    pub description: String,
    pub stages: Vec<StageInfo>,
    pub synthesizer: String,
    /// Stage ids grouped by execution wave
    pub waves: Vec<Vec<String>>,
}

impl TeamInfo {
    fn from_team(team: &TeamDefinition) -> Result<Self, ApiError> {
        let waves = team
            .execution_waves()?
            .into_iter()
            .map(|wave| wave.into_iter().map(str::to_string).collect())
            .collect();
        Ok(Self {
            name: team.name.to_string(),
            description: team.description.to_string(),
            stages: team
                .stages
                .iter()
                .map(|d| StageInfo {
                    id: d.stage_id.clone(),
                    requires: d.requires.iter().cloned().collect(),
                    fatal: d.fatal,
                })
                .collect(),
            synthesizer: team.synthesizer.stage_id.clone(),
            waves,
        })
    }
}

/// The artifact of one run
#[derive(Debug, Serialize, ToSchema)]
pub struct RunResponse {
    pub run_id: String,
    pub subject: String,
    /// completed, degraded or aborted
    pub status: String,
    pub title: String,
    /// Markdown body
    pub body: String,
    #[schema(value_type = Object)]
    pub sections: serde_json::Map<String, serde_json::Value>,
    pub degraded_stages: Vec<String>,
    pub error: Option<String>,
    pub next_steps: Vec<String>,
    pub produced_at: String,
}

impl From<Artifact> for RunResponse {
    fn from(artifact: Artifact) -> Self {
        Self {
            run_id: artifact.run_id,
            subject: artifact.subject,
            status: artifact.status.as_str().to_string(),
            title: artifact.title,
            body: artifact.body,
            sections: artifact.sections,
            degraded_stages: artifact.degraded_stages,
            error: artifact.error,
            next_steps: artifact.next_steps,
            produced_at: artifact.produced_at.to_rfc3339(),
        }
    }
}

/// One ledger entry
#[derive(Debug, Serialize, ToSchema)]
pub struct RunSummary {
    pub run_id: String,
    pub team: String,
    pub subject: String,
    pub status: String,
    pub error: Option<String>,
    pub started_at: String,
    pub finished_at: Option<String>,
}

impl From<RunRecord> for RunSummary {
    fn from(record: RunRecord) -> Self {
        Self {
            run_id: record.run_id,
            team: record.team,
            subject: record.subject,
            status: record.status,
            error: record.error,
            started_at: record.started_at.to_rfc3339(),
            finished_at: record.finished_at.map(|t| t.to_rfc3339()),
        }
    }
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct RunsQuery {
    /// Maximum number of runs (default 20)
    pub limit: Option<usize>,
}

/// List preset teams
#[utoipa::path(
    get,
    path = "/api/v1/teams",
    tag = "teams",
    responses(
        (status = 200, description = "Preset teams", body = Vec<TeamInfo>)
    )
)]
pub async fn list_teams() -> Result<Json<Vec<TeamInfo>>, ApiError> {
    let teams = all_teams()
        .iter()
        .map(TeamInfo::from_team)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Json(teams))
}

/// Run a team once and return its artifact
///
/// The body is a JSON request (`subject`, or `location`/`url`/`prompt`,
/// plus optional context fields) or plain text naming the subject. A
/// request that cannot be parsed still yields an (aborted) artifact.
#[utoipa::path(
    post,
    path = "/api/v1/teams/{team}/run",
    tag = "teams",
    params(("team" = String, Path, description = "Team name")),
    request_body(content = String, description = "JSON request or plain-text subject"),
    responses(
        (status = 200, description = "Run artifact", body = RunResponse),
        (status = 404, description = "Unknown team", body = super::ErrorResponse)
    )
)]
pub async fn run_team(
    State(state): State<SharedState>,
    Path(team): Path<String>,
    body: String,
) -> Result<Json<RunResponse>, ApiError> {
    let coordinator = state.coordinator(&team)?;
    tracing::info!(team = %team, "run requested");
    let artifact = coordinator.run_raw(&body).await;
    Ok(Json(artifact.into()))
}

/// Recent runs from the ledger, newest first
#[utoipa::path(
    get,
    path = "/api/v1/runs",
    tag = "teams",
    params(RunsQuery),
    responses(
        (status = 200, description = "Recent runs", body = Vec<RunSummary>)
    )
)]
pub async fn list_runs(
    State(state): State<SharedState>,
    Query(query): Query<RunsQuery>,
) -> Result<Json<Vec<RunSummary>>, ApiError> {
    let Some(ledger) = &state.ledger else {
        return Ok(Json(Vec::new()));
    };
    let records = ledger
        .list_recent(query.limit.unwrap_or(20))
        .map_err(|e| ApiError::internal(format!("{:#}", e)))?;
    Ok(Json(records.into_iter().map(RunSummary::from).collect()))
}

#[cfg(test)]
mod tests {
    use super::super::tests::{body_json, stub_state};
    use super::super::{router, AppState};
    use axum::body::Body;
    use axum::http::{Request as HttpRequest, StatusCode};
    use cohort_core::state::{CohortDb, RunLedger};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn post(uri: &str, body: &str) -> HttpRequest<Body> {
        HttpRequest::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_list_teams() {
        let response = router(stub_state())
            .oneshot(HttpRequest::get("/api/v1/teams").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let teams = body_json(response).await;
        let homepage = teams
            .as_array()
            .unwrap()
            .iter()
            .find(|t| t["name"] == "homepage")
            .unwrap();
        assert_eq!(homepage["synthesizer"], "composer");
        assert_eq!(homepage["waves"][0][0], "crawl");
    }

    #[tokio::test]
    async fn test_run_team_returns_artifact() {
        let response = router(stub_state())
            .oneshot(post(
                "/api/v1/teams/location-intelligence/run",
                r#"{"location": "Austin, Texas"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let artifact = body_json(response).await;
        assert_eq!(artifact["subject"], "Austin, Texas");
        assert_eq!(artifact["status"], "completed");
        assert_eq!(artifact["body"], "# report");
    }

    #[tokio::test]
    async fn test_run_empty_body_yields_aborted_artifact() {
        let response = router(stub_state())
            .oneshot(post("/api/v1/teams/clinical-decision/run", ""))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "aborted");
    }

    #[tokio::test]
    async fn test_run_unknown_team() {
        let response = router(stub_state())
            .oneshot(post("/api/v1/teams/marketing/run", "{}"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(body_json(response).await["error"]
            .as_str()
            .unwrap()
            .contains("marketing"));
    }

    #[tokio::test]
    async fn test_runs_listed_from_ledger() {
        let ledger = RunLedger::new(&CohortDb::open_in_memory().unwrap());
        let stub = stub_state();
        let state = Arc::new(AppState {
            config: stub.config.clone(),
            event_tx: stub.event_tx.clone(),
            ledger: Some(ledger),
            registry: stub.registry.clone(),
        });
        let app = router(state);

        app.clone()
            .oneshot(post("/api/v1/teams/homepage/run", r#"{"url": "https://example.com"}"#))
            .await
            .unwrap();

        let response = app
            .oneshot(HttpRequest::get("/api/v1/runs?limit=5").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let runs = body_json(response).await;
        assert_eq!(runs.as_array().unwrap().len(), 1);
        assert_eq!(runs[0]["team"], "homepage");
        assert_eq!(runs[0]["subject"], "https://example.com");
        assert_eq!(runs[0]["status"], "completed");
    }
}
