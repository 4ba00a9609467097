mod config;
mod db;
mod errors;
mod llm_client;
mod models;
mod routes;
mod screening;
mod state;

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::db::create_pool;
use crate::llm_client::{HttpChatTransport, LlmClient};
use crate::routes::build_router;
use crate::screening::orchestrator::BatchOrchestrator;
use crate::screening::repository::PgCandidateRepository;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Configuration first; startup fails on missing required env vars
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting screener v{}", env!("CARGO_PKG_VERSION"));

    let db = create_pool(&config.database_url, config.database_max_connections).await?;
    let repository = Arc::new(PgCandidateRepository::new(db));

    let settings = config.llm_settings();
    let transport = HttpChatTransport::new(
        &config.llm_base_url,
        config.llm_api_key.clone(),
        settings.call_timeout,
    )?;
    let llm = LlmClient::new(Arc::new(transport), settings);
    info!(
        "LLM client initialized (model: {}, base url: {})",
        llm.model(),
        config.llm_base_url
    );

    let orchestrator = BatchOrchestrator::new(llm, config.batch_options());
    info!(
        "Screening mode {:?}, fused fallback {}, default concurrency {}",
        config.screening_mode, config.screening_fused_fallback, config.screening_concurrency
    );

    let state = AppState::new(orchestrator, repository, &config);

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
