// SPDX-License-Identifier: MIT

use std::sync::Arc;

use vitalog::config::Config;
use vitalog::db::Store;
use vitalog::routes::create_router;
use vitalog::services::Scheduler;
use vitalog::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    let config = Config::from_env()?;
    let port = config.port;

    let store = Store::connect(&config.database_url).await?;
    store.migrate().await?;

    let state = Arc::new(AppState::new(config, store));

    Scheduler::new(
        state.sync.clone(),
        state.whoop.clone(),
        state.store.clone(),
    )
    .spawn();

    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Structured JSON logs in production, pretty logs when LOG_FORMAT=pretty.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,vitalog=debug"));

    let pretty = std::env::var("LOG_FORMAT")
        .map(|v| v == "pretty")
        .unwrap_or(false);

    if pretty {
        fmt().with_env_filter(filter).init();
    } else {
        fmt().with_env_filter(filter).json().init();
    }
}
