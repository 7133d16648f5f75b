//! Repo Insight - Main Application Entry Point
//!
//! A REST API server that analyzes public GitHub repositories. It gathers
//! facts from the GitHub API, summarizes them with a text-completion model,
//! caches the results per repository, and meters access with per-user API keys.
//!
//! # Architecture
//!
//! - **Web Framework**: Axum (async HTTP server)
//! - **Database**: PostgreSQL with sqlx (async queries)
//! - **Authentication**: session cookie for the dashboard, API keys (SHA-256
//!   hashed) for metered analysis
//! - **Upstreams**: GitHub REST API and an OpenAI-compatible completion API
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment variables
//! 2. Create database connection pool
//! 3. Run database migrations
//! 4. Build the upstream clients and services
//! 5. Build HTTP router and start server on configured port

mod app;
mod config;
mod db;
mod error;
mod handlers;
mod middleware;
mod models;
mod services;
mod store;

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use crate::{
    app::AppState,
    services::{
        analyzer::Analyzer, github::GithubClient, ledger::Ledger, openai::OpenAiClient,
        summarizer::Summarizer,
    },
    store::postgres::PgStore,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Reads RUST_LOG (defaults to "info")
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = config::Config::from_env()?;
    tracing::info!("Configuration loaded");

    let pool = db::create_pool(&config.database_url).await?;
    tracing::info!("Database pool created");

    db::run_migrations(&pool).await?;
    tracing::info!("Database migrations complete");

    let store = Arc::new(PgStore::new(pool));

    let github = GithubClient::new(
        &config.github_api_url,
        config.github_token(),
        config.github_timeout(),
    )?;
    if config.github_token().is_none() {
        tracing::warn!("GITHUB_TOKEN not set, using the unauthenticated GitHub rate limit");
    }

    let completions = OpenAiClient::new(
        &config.openai_base_url,
        &config.openai_api_key,
        &config.openai_model,
        config.completion_timeout(),
    )?;

    let ledger = Arc::new(Ledger::new(store.clone(), config.default_key_limit));
    let analyzer = Arc::new(Analyzer::new(
        ledger.clone(),
        store.clone(),
        store.clone(),
        Arc::new(github),
        Summarizer::new(Arc::new(completions), config.readme_max_chars),
        config.contributor_limit,
    ));

    let app = app::router(AppState {
        analyzer,
        ledger,
        repositories: store.clone(),
        analysis_log: store.clone(),
        users: store,
    });

    let addr = format!("0.0.0.0:{}", config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
