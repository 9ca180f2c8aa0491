use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use axum_prometheus::PrometheusMetricLayer;
use bidmatch::config::AppConfig;
use bidmatch::error::AppError;
use bidmatch::infra::{
    demo_fixtures, InMemoryOpportunityRepository, InMemoryProfileRepository,
    InMemoryUsageRecorder, LoggingEventPublisher, UnconfiguredGeneration,
};
use bidmatch::scoring::{
    scoring_router, BackgroundDispatcher, BatchCoordinator, InMemoryScoreCache, OpportunityId,
    OrganizationId, ScoreMethod, ScoreMode, ScoreRequest, ScoringOrchestrator, ScoringState,
    UsageBillingHook,
};
use bidmatch::telemetry;
use clap::{Args, Parser, Subcommand};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
struct AppState {
    readiness: Arc<AtomicBool>,
    metrics: PrometheusHandle,
}

#[derive(Parser, Debug)]
#[command(
    name = "Opportunity Match Scorer",
    about = "Score government-contracting opportunities against contractor capability profiles",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Score the bundled demo opportunities and print the match report
    Score(ScoreArgs),
}

#[derive(Args, Debug, Default)]
struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    port: Option<u16>,
}

#[derive(Args, Debug, Default)]
struct ScoreArgs {
    /// Score a single opportunity id instead of every demo opportunity
    #[arg(long)]
    opportunity: Option<String>,
    /// Repeat the run to demonstrate cache hits
    #[arg(long)]
    repeat: bool,
    /// Run through the background dispatcher instead of inline scoring
    #[arg(long)]
    background: bool,
}

#[tokio::main]
async fn main() {
    if let Err(err) = run_cli().await {
        eprintln!("application error: {err}");
        std::process::exit(1);
    }
}

async fn run_cli() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => run_server(args).await,
        Command::Score(args) => run_score_demo(args).await,
    }
}

type DemoOrchestrator = ScoringOrchestrator<
    InMemoryOpportunityRepository,
    InMemoryProfileRepository,
    InMemoryScoreCache,
>;

fn build_orchestrator(
    config: &AppConfig,
    usage: Arc<InMemoryUsageRecorder>,
) -> Arc<DemoOrchestrator> {
    let (opportunities, profiles) = demo_fixtures();
    let opportunity_repo = InMemoryOpportunityRepository::with_opportunities(opportunities);
    let profile_repo = InMemoryProfileRepository::with_profiles(profiles);
    let cache = Arc::new(InMemoryScoreCache::new());

    let orchestrator = ScoringOrchestrator::new(
        Arc::new(opportunity_repo),
        Arc::new(profile_repo),
        cache,
        Arc::new(UnconfiguredGeneration),
        config.scoring.clone(),
    )
    .with_hook(Arc::new(UsageBillingHook::new(usage)));

    Arc::new(orchestrator)
}

async fn run_server(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(AtomicBool::new(false));
    let state = AppState {
        readiness: readiness_flag.clone(),
        metrics: prometheus_handle,
    };

    let usage = Arc::new(InMemoryUsageRecorder::default());
    let orchestrator = build_orchestrator(&config, usage.clone());
    let batch = Arc::new(BatchCoordinator::new(
        orchestrator.clone(),
        usage,
        config.scoring.max_batch_size,
    ));

    let app = scoring_router(ScoringState {
        orchestrator,
        batch,
    })
    .merge(
        Router::new()
            .route("/health", get(healthcheck))
            .route("/ready", get(readiness_endpoint))
            .route("/metrics", get(metrics_endpoint))
            .with_state(state),
    )
    .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "match scoring service ready");

    axum::serve(listener, app).await?;
    Ok(())
}

async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn readiness_endpoint(State(state): State<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

async fn metrics_endpoint(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

async fn run_score_demo(args: ScoreArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry).ok();

    let usage = Arc::new(InMemoryUsageRecorder::default());
    let orchestrator = build_orchestrator(&config, usage.clone());

    let (opportunities, profiles) = demo_fixtures();
    let organization_id = profiles
        .first()
        .map(|profile| profile.organization_id.clone())
        .unwrap_or_else(|| OrganizationId("org-demo".to_string()));

    let targets: Vec<OpportunityId> = match args.opportunity {
        Some(id) => vec![OpportunityId(id)],
        None => opportunities
            .iter()
            .map(|opportunity| opportunity.opportunity_id.clone())
            .collect(),
    };

    if args.background {
        let dispatcher = BackgroundDispatcher::new(
            orchestrator,
            Arc::new(LoggingEventPublisher),
            config.scoring.dispatcher_concurrency,
            config.scoring.dispatcher_max_retries,
        );

        for opportunity_id in &targets {
            let handle = dispatcher.dispatch(ScoreRequest {
                opportunity_id: opportunity_id.clone(),
                profile_id: None,
                method: ScoreMethod::Calculation,
                mode: ScoreMode::Fast,
                organization_id: organization_id.clone(),
                user_id: "cli-demo".to_string(),
            });
            handle.await.ok();
        }

        println!(
            "Dispatched {} background score job(s); usage events emitted: {}",
            targets.len(),
            usage.events().len()
        );
        return Ok(());
    }

    let passes = if args.repeat { 2 } else { 1 };
    for pass in 1..=passes {
        if passes > 1 {
            println!("\n=== Pass {pass} ===");
        }
        for opportunity_id in &targets {
            let request = ScoreRequest {
                opportunity_id: opportunity_id.clone(),
                profile_id: None,
                method: ScoreMethod::Calculation,
                mode: ScoreMode::Fast,
                organization_id: organization_id.clone(),
                user_id: "cli-demo".to_string(),
            };

            match orchestrator.score_single(&request).await {
                Ok(outcome) => render_score(opportunity_id, &outcome),
                Err(err) => println!("- {}: failed ({err})", opportunity_id.0),
            }
        }
    }

    println!("\nUsage events emitted: {}", usage.events().len());
    Ok(())
}

fn render_score(opportunity_id: &OpportunityId, outcome: &bidmatch::scoring::ScoredOutcome) {
    let result = &outcome.result;
    println!(
        "\nOpportunity {} -> {}/100 (confidence {}, {}, cached: {})",
        opportunity_id.0,
        result.overall_score,
        result.confidence,
        result.algorithm_version,
        outcome.from_cache
    );

    for (name, category) in &result.categories {
        println!(
            "- {name}: {} x{} -> {:.1}",
            category.score, category.weight, category.contribution
        );
    }

    if result.recommendations.is_empty() {
        println!("Recommendations: none");
    } else {
        println!("Recommendations:");
        for recommendation in &result.recommendations {
            println!("- {recommendation}");
        }
    }
}
