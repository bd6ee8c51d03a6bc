use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use helpdesk_api::app::app;
use helpdesk_api::config::{self, StoreBackend};
use helpdesk_api::store::{AppState, MemoryStore, PgStore, Store};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("helpdesk_api=info,tower_http=info")),
        )
        .init();

    let config = config::config();

    let store: Arc<dyn Store> = match config.storage.backend {
        StoreBackend::Postgres => {
            let database_url =
                std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
            let store = PgStore::connect(&database_url)
                .await
                .context("failed to connect to database")?;
            tracing::info!("connected to postgres");
            Arc::new(store)
        }
        StoreBackend::Memory => {
            tracing::warn!("using in-memory store; data will not survive restart");
            Arc::new(MemoryStore::new())
        }
    };

    let state = AppState::new(store);
    let addr = format!("0.0.0.0:{}", config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    tracing::info!("helpdesk api listening on {}", addr);
    axum::serve(listener, app(state))
        .await
        .context("server error")?;

    Ok(())
}
