//! Pollsmith - conversational poll creation bot
//!
//! Guides a Telegram user through naming a poll, describing it and adding
//! options, and keeps every rendered copy of the poll current.

mod api;
mod config;
mod db;
mod display;
mod lifecycle;
mod runtime;
mod state_machine;
mod transport;

use api::{create_router, AppState};
use config::BotConfig;
use db::Database;
use lifecycle::PublishingLifecycle;
use runtime::{DatabaseStorage, RuntimeManager};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use transport::TelegramClient;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pollsmith=info,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    let config = BotConfig::from_env()?;

    // Ensure database directory exists
    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    tracing::info!(path = %config.db_path.display(), "Opening database");
    let db = Database::open(&config.db_path)?;

    let telegram = Arc::new(TelegramClient::new(
        config.telegram_api_url.clone(),
        config.bot_token.clone(),
    ));
    let storage = DatabaseStorage::new(db);
    let lifecycle = PublishingLifecycle::new(storage.clone(), telegram.clone());
    let manager = RuntimeManager::new(storage, telegram, lifecycle);

    let state = AppState::new(manager);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Pollsmith listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
