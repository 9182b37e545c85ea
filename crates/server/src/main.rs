//! Cohort Server
//!
//! Command-line and HTTP shell around the cohort coordinator: run a preset
//! team once from the terminal, or serve the team API.

mod api;
mod config;

use anyhow::Context;
use clap::{Parser, Subcommand};
use cohort_core::skills::{all_teams, find_team, LlmWorkerFactory};
use cohort_core::state::{CohortDb, RunLedger};
use cohort_core::swarm::{Coordinator, CoordinatorConfig, Request, SwarmEvent, Urgency};
use std::{net::SocketAddr, path::Path, sync::Arc};
use tokio::{net::TcpListener, sync::mpsc};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Clone)]
#[command(author, version, about = "Cohort - DAG-based multi-worker orchestration")]
struct Args {
    #[command(subcommand)]
    command: Option<CliCommand>,

    /// Don't record runs in .cohort/cohort.db
    #[arg(long, global = true)]
    no_ledger: bool,

    #[command(flatten)]
    overrides: config::Overrides,
}

#[derive(Subcommand, Clone)]
enum CliCommand {
    /// Start the HTTP server (default)
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8080")]
        port: u16,
    },
    /// Run a team once and print the artifact
    Run {
        /// Subject to analyze (a location, a case description, a URL) or a JSON request
        subject: String,
        /// Team to run
        #[arg(short, long, default_value = "location-intelligence")]
        team: String,
        /// routine, urgent or emergency
        #[arg(short, long)]
        urgency: Option<Urgency>,
        /// Print the artifact as JSON instead of markdown
        #[arg(long)]
        json: bool,
    },
    /// List preset teams and their stage order
    Teams,
}

fn init_tracing() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing subscriber: {e}"))
}

fn open_ledger(disabled: bool) -> Option<RunLedger> {
    if disabled {
        return None;
    }
    match CohortDb::open() {
        Ok(db) => Some(RunLedger::new(&db)),
        Err(e) => {
            tracing::warn!(error = %e, "run ledger disabled");
            None
        }
    }
}

fn print_teams() -> anyhow::Result<()> {
    for team in all_teams() {
        println!("{}  {}", team.name, team.description);
        for (i, wave) in team.execution_waves()?.iter().enumerate() {
            println!("  {}. {}", i + 1, wave.join(", "));
        }
    }
    Ok(())
}

async fn run_once(
    config: &CoordinatorConfig,
    ledger: Option<RunLedger>,
    team: &str,
    request: Request,
    json: bool,
) -> anyhow::Result<()> {
    let team = find_team(team)?;
    let registry = team.llm_registry(&LlmWorkerFactory::new(config));

    let (tx, mut rx) = mpsc::channel::<SwarmEvent>(100);
    let progress = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if let Some(stage) = &event.stage {
                tracing::info!(stage = %stage, "{}", event.kind.as_str());
            }
        }
    });

    let mut coordinator = Coordinator::for_team(&team, &registry, config)?.with_event_channel(tx);
    if let Some(ledger) = ledger {
        coordinator = coordinator.with_ledger(ledger);
    }

    let artifact = coordinator.run(request).await;
    drop(coordinator);
    let _ = progress.await;

    if json {
        println!("{}", serde_json::to_string_pretty(&artifact)?);
    } else {
        println!("{}", artifact.to_markdown());
    }
    Ok(())
}

async fn run_server(
    config: CoordinatorConfig,
    ledger: Option<RunLedger>,
    port: u16,
) -> anyhow::Result<()> {
    let state = Arc::new(api::AppState::new(config, ledger));
    let app = api::router(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    tracing::info!("Cohort server running at http://{}", addr);
    tracing::info!("   Teams:   /api/v1/teams, /api/v1/teams/:team/run");
    tracing::info!("   Runs:    /api/v1/runs");
    tracing::info!("   Events:  /api/v1/events (SSE)");
    tracing::info!("   OpenAPI: /api/v1/openapi.json");

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing()?;

    let args = Args::parse();
    let mut config = config::load(Path::new(config::CONFIG_PATH)).await;
    args.overrides.apply(&mut config);

    match args.command {
        Some(CliCommand::Teams) => print_teams(),
        Some(CliCommand::Run {
            subject,
            team,
            urgency,
            json,
        }) => {
            let mut request = Request::parse(&subject)?;
            if let Some(urgency) = urgency {
                request = request.with_urgency(urgency);
            }
            run_once(&config, open_ledger(args.no_ledger), &team, request, json).await
        }
        Some(CliCommand::Serve { port }) => {
            run_server(config, open_ledger(args.no_ledger), port).await
        }
        None => run_server(config, open_ledger(args.no_ledger), 8080).await,
    }
}
