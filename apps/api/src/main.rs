mod auth;
mod config;
mod db;
mod errors;
mod interview;
mod llm_client;
mod models;
mod render;
mod report;
mod response;
mod routes;
mod spellcheck;
mod state;
mod storage;
mod store;
#[cfg(test)]
mod testing;

use anyhow::Result;
use aws_config::Region;
use aws_sdk_s3::config::Credentials;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::auth::SupabaseIdentity;
use crate::config::Config;
use crate::db::create_pool;
use crate::interview::locks::ConversationLocks;
use crate::llm_client::LlmClient;
use crate::render::PandocRenderer;
use crate::routes::build_router;
use crate::state::{AppState, Limits};
use crate::storage::S3ArtifactStore;
use crate::store::PgInterviewStore;

const LOCK_PRUNE_INTERVAL: Duration = Duration::from_secs(300);

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "{}={}",
                env!("CARGO_PKG_NAME").replace('-', "_"),
                &config.rust_log
            ))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Interview API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize PostgreSQL
    let db = create_pool(&config.database_url).await?;

    // Initialize S3 / MinIO
    let s3 = build_s3_client(&config).await;
    info!("S3 client initialized (bucket: {})", config.s3_bucket);

    // Initialize LLM client
    let llm = LlmClient::new(config.gemini_api_key.clone())?;
    info!("LLM client initialized (model: {})", llm_client::MODEL);

    let identity = SupabaseIdentity::new(&config.identity_url, config.identity_api_key.clone())?;
    let renderer = PandocRenderer::new(config.pdf_renderer.clone());
    info!("Report renderer: {}", config.pdf_renderer);

    let locks = Arc::new(ConversationLocks::new());
    spawn_lock_pruner(locks.clone());

    // Build app state
    let state = AppState {
        store: Arc::new(PgInterviewStore::new(db)),
        artifacts: Arc::new(S3ArtifactStore::new(s3, config.s3_bucket.clone())),
        llm: Arc::new(llm),
        identity: Arc::new(identity),
        renderer: Arc::new(renderer),
        locks,
        limits: Limits {
            max_resume_bytes: config.max_resume_bytes,
            stream_idle_timeout: Duration::from_secs(config.llm_stream_idle_timeout_secs),
        },
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Constructs an S3 client for AWS, or for MinIO when `S3_ENDPOINT` is set.
async fn build_s3_client(config: &Config) -> aws_sdk_s3::Client {
    let credentials = Credentials::new(
        &config.aws_access_key_id,
        &config.aws_secret_access_key,
        None,
        None,
        "interview-static",
    );

    let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(Region::new(config.s3_region.clone()))
        .credentials_provider(credentials);
    if let Some(endpoint) = &config.s3_endpoint {
        loader = loader.endpoint_url(endpoint);
    }
    let shared = loader.load().await;

    // MinIO serves buckets by path, not by subdomain.
    let s3_config = aws_sdk_s3::config::Builder::from(&shared)
        .force_path_style(config.s3_endpoint.is_some())
        .build();
    aws_sdk_s3::Client::from_conf(s3_config)
}

/// Periodically forgets conversation locks nobody holds.
fn spawn_lock_pruner(locks: Arc<ConversationLocks>) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(LOCK_PRUNE_INTERVAL);
        loop {
            ticker.tick().await;
            locks.prune_idle();
            debug!("Conversation locks tracked: {}", locks.tracked());
        }
    });
}
