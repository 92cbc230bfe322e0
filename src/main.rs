use anyhow::Result;
use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::Utc;
use deep_research::models::{ResearchRequest, ResearchResponse};
use deep_research::tools::{
    fetch::HttpFetcher,
    llm::{OpenAiEmbedder, OpenAiReasoner},
    tavily::{SearxSearch, TavilySearch},
    SearchClient,
};
use deep_research::{ResearchError, ResearchPipeline, Services, Settings};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, instrument};
use tracing_subscriber::EnvFilter;

#[derive(Clone)]
struct AppState {
    pipeline: ResearchPipeline,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("deep_research=debug,graph_flow=info")),
        )
        .init();

    let settings = Settings::from_env();
    let services = build_services(&settings)?;
    let state = AppState {
        pipeline: ResearchPipeline::new(services, settings),
    };

    let app = Router::new()
        .route("/health", get(health))
        .route("/research", post(research))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state);

    let addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Deep research server running on http://{}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}

fn build_services(settings: &Settings) -> Result<Services> {
    let search: Arc<dyn SearchClient> = match std::env::var("SEARX_URL") {
        Ok(url) if !url.trim().is_empty() => {
            info!("Using SearxNG at {}", url);
            Arc::new(SearxSearch::new(url))
        }
        _ => Arc::new(TavilySearch::from_env()?),
    };

    let services = Services::new(
        Arc::new(OpenAiReasoner::from_env(settings.chat_model.clone())?),
        Arc::new(OpenAiEmbedder::from_env(
            settings.embedding_model.clone(),
            settings.max_embed_chars,
        )?),
        search,
        Arc::new(HttpFetcher::new(
            settings.max_page_chars,
            settings.content_cache_capacity,
        )?),
        settings,
    );
    Ok(services)
}

async fn health() -> &'static str {
    "OK"
}

#[instrument(skip(state))]
async fn research(
    State(state): State<AppState>,
    Json(req): Json<ResearchRequest>,
) -> Result<Json<ResearchResponse>, (StatusCode, String)> {
    let start_time = std::time::Instant::now();

    let outcome = state
        .pipeline
        .run_with_timings(&req.query)
        .await
        .map_err(|e| {
            error!("Research failed: {}", e);
            let status = match e {
                ResearchError::QueryEmbedding => StatusCode::BAD_GATEWAY,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            (status, format!("Error: {}", e))
        })?;

    Ok(Json(ResearchResponse {
        session_id: outcome.session_id,
        query: req.query,
        report: outcome.report,
        total_time_ms: start_time.elapsed().as_millis() as u64,
        task_times: outcome.task_times,
        generated_at: Utc::now(),
    }))
}
