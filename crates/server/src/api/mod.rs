//! # HTTP API
//!
//! Thin axum shell over the coordinator facade. Every run gets its own
//! coordinator; stage events are bridged into one broadcast channel that
//! the SSE endpoint subscribes to.

pub mod runs;

use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Json,
    },
    routing::{get, post},
    Router,
};
use cohort_core::skills::{find_team, LlmWorkerFactory, WorkerRegistry};
use cohort_core::state::RunLedger;
use cohort_core::swarm::{ConfigError, Coordinator, CoordinatorConfig, SwarmEvent};
use futures::stream::{self, Stream};
use serde::Serialize;
use std::{convert::Infallible, sync::Arc};
use tokio::sync::{broadcast, mpsc};
use utoipa::{OpenApi, ToSchema};

/// Application state
pub struct AppState {
    pub config: CoordinatorConfig,
    pub event_tx: broadcast::Sender<SwarmEvent>,
    pub ledger: Option<RunLedger>,
    /// Workers to use instead of LLM workers built from `config`
    pub registry: Option<WorkerRegistry>,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(config: CoordinatorConfig, ledger: Option<RunLedger>) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        Self {
            config,
            event_tx,
            ledger,
            registry: None,
        }
    }

    /// Build a coordinator for one run, wired to the event bus and ledger
    pub fn coordinator(&self, team: &str) -> Result<Coordinator, ConfigError> {
        let team = find_team(team)?;
        let coordinator = match &self.registry {
            Some(registry) => Coordinator::for_team(&team, registry, &self.config)?,
            None => {
                let registry = team.llm_registry(&LlmWorkerFactory::new(&self.config));
                Coordinator::for_team(&team, &registry, &self.config)?
            }
        };

        let (tx, mut rx) = mpsc::channel::<SwarmEvent>(100);
        let broadcast_tx = self.event_tx.clone();
        // Ends when the coordinator is dropped
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let _ = broadcast_tx.send(event);
            }
        });

        let coordinator = coordinator.with_event_channel(tx);
        Ok(match &self.ledger {
            Some(ledger) => coordinator.with_ledger(ledger.clone()),
            None => coordinator,
        })
    }
}

/// JSON error body
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl From<ConfigError> for ApiError {
    fn from(err: ConfigError) -> Self {
        let status = match err {
            ConfigError::UnknownTeam(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
            }),
        )
            .into_response()
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Cohort API",
        version = "1.0.0",
        description = "Run preset worker teams and inspect their runs"
    ),
    paths(health, runs::list_teams, runs::run_team, runs::list_runs),
    components(schemas(
        HealthResponse,
        ErrorResponse,
        runs::TeamInfo,
        runs::StageInfo,
        runs::RunResponse,
        runs::RunSummary
    )),
    tags(
        (name = "teams", description = "Preset teams and runs"),
        (name = "system", description = "Health and discovery")
    )
)]
struct ApiDoc;

pub fn router(state: SharedState) -> Router {
    let team_routes = Router::new()
        .route("/", get(runs::list_teams))
        .route("/:team/run", post(runs::run_team));

    Router::new()
        .nest("/api/v1/teams", team_routes)
        .route("/api/v1/runs", get(runs::list_runs))
        .route("/api/v1/events", get(events))
        .route("/api/v1/openapi.json", get(serve_openapi))
        .route("/health", get(health))
        .with_state(state)
}

/// Liveness check
#[utoipa::path(
    get,
    path = "/health",
    tag = "system",
    responses(
        (status = 200, description = "Server is up", body = HealthResponse)
    )
)]
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// SSE endpoint for stage events with heartbeat
async fn events(
    State(state): State<SharedState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.event_tx.subscribe();

    let stream = stream::unfold(rx, |mut rx| async move {
        loop {
            let next = tokio::time::timeout(std::time::Duration::from_secs(15), rx.recv()).await;
            return match next {
                Ok(Ok(event)) => {
                    let json = serde_json::to_string(&event).unwrap_or_default();
                    Some((Ok(Event::default().event(event.kind.as_str()).data(json)), rx))
                }
                Ok(Err(broadcast::error::RecvError::Lagged(skipped))) => {
                    tracing::warn!(skipped, "event subscriber lagged");
                    continue;
                }
                Ok(Err(broadcast::error::RecvError::Closed)) => None,
                Err(_) => Some((Ok(Event::default().comment("heartbeat")), rx)),
            };
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

async fn serve_openapi() -> impl IntoResponse {
    match ApiDoc::openapi().to_json() {
        Ok(spec) => (
            [(header::CONTENT_TYPE, "application/json")],
            Body::from(spec),
        )
            .into_response(),
        Err(e) => ApiError::internal(e.to_string()).into_response(),
    }
}
