mod auth;
mod config;
mod db;
mod documents;
mod errors;
mod generation;
mod job_descriptions;
mod llm_client;
mod models;
mod routes;
mod state;
mod store;

use anyhow::{Context, Result};
use aws_config::Region;
use aws_sdk_s3::config::Credentials;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::auth::TokenVerifier;
use crate::config::{Config, StorageConfig};
use crate::db::create_pool;
use crate::generation::generator::{DocumentGenerator, DryRunGenerator, LlmGenerator};
use crate::generation::orchestrator::Orchestrator;
use crate::generation::queue::{ChannelJobQueue, JobQueue, RedisJobQueue};
use crate::generation::worker::{recover_queued_jobs, spawn_reaper, spawn_workers};
use crate::llm_client::LlmClient;
use crate::routes::build_router;
use crate::state::AppState;
use crate::store::{MemoryRepository, PgRepository, Repository};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting ResumeAI API v{}", env!("CARGO_PKG_VERSION"));

    let repo: Arc<dyn Repository> = match &config.storage {
        Some(storage) => {
            let pool = create_pool(&storage.database_url).await?;
            let s3 = build_s3_client(storage).await;
            info!("S3 client initialized (bucket: {})", storage.s3_bucket);
            Arc::new(PgRepository::new(pool, s3, storage.s3_bucket.clone()))
        }
        None => {
            warn!("DATABASE_URL not set, using in-memory storage (data is lost on restart)");
            Arc::new(MemoryRepository::new())
        }
    };

    let queue: Arc<dyn JobQueue> = match &config.redis_url {
        Some(url) => {
            let client = redis::Client::open(url.as_str()).context("Invalid REDIS_URL")?;
            info!("Redis job queue initialized");
            Arc::new(RedisJobQueue::new(client))
        }
        None => {
            info!("REDIS_URL not set, using in-process job queue");
            Arc::new(ChannelJobQueue::new())
        }
    };

    let generator: Arc<dyn DocumentGenerator> = if config.ai_dry_run {
        info!("AI_DRY_RUN enabled, generating stub documents");
        Arc::new(DryRunGenerator)
    } else {
        let api_key = config
            .anthropic_api_key
            .clone()
            .context("ANTHROPIC_API_KEY is required when AI_DRY_RUN is false")?;
        let llm = LlmClient::new(api_key)?;
        info!("LLM client initialized (model: {})", llm_client::MODEL);
        Arc::new(LlmGenerator::new(llm))
    };

    let orchestrator = Arc::new(Orchestrator::new(
        repo.clone(),
        generator,
        queue.clone(),
        config.job_timeout,
    ));

    // Background work
    let shutdown = CancellationToken::new();
    recover_queued_jobs(repo.as_ref(), queue.as_ref()).await?;
    let mut background = spawn_workers(
        orchestrator.clone(),
        queue,
        config.worker_concurrency,
        shutdown.clone(),
    );
    info!("{} generation worker(s) running", config.worker_concurrency);
    if let Some(timeout) = config.job_timeout {
        background.push(spawn_reaper(
            repo.clone(),
            timeout,
            config.reaper_interval,
            shutdown.clone(),
        ));
        info!("Stale job reaper running (timeout {}s)", timeout.as_secs());
    }

    // Build app state
    let state = AppState {
        repo,
        orchestrator,
        verifier: TokenVerifier::new(&config.jwt_secret),
        config: config.clone(),
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: restrict origins once the web client's domain is fixed

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    shutdown.cancel();
    for handle in background {
        if let Err(e) = handle.await {
            warn!("Background task ended abnormally: {e}");
        }
    }
    info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
    shutdown.cancel();
}

/// Constructs an S3 client configured for MinIO (local) or AWS (production).
async fn build_s3_client(storage: &StorageConfig) -> aws_sdk_s3::Client {
    let credentials = Credentials::new(
        &storage.aws_access_key_id,
        &storage.aws_secret_access_key,
        None,
        None,
        "resumeai-static",
    );

    let s3_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(Region::new("us-east-1"))
        .credentials_provider(credentials)
        .endpoint_url(&storage.s3_endpoint)
        .load()
        .await;

    aws_sdk_s3::Client::new(&s3_config)
}
