//! Serve like counts from the counter store.
use std::sync::Arc;

use axum::Router;
use config::Config;
use envconfig::Envconfig;
use eyre::Result;

use like_common::metrics::{setup_metrics_recorder, setup_metrics_routes};
use like_common::store::PgCounterStore;

mod config;
mod handlers;

async fn listen(app: Router, bind: String) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;

    axum::serve(listener, app).await?;

    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let config = Config::init_from_env().expect("failed to load configuration from env");

    // Connects on first request, so the reader comes up even while the store is down.
    let store = PgCounterStore::new_lazy(
        &config.database_url,
        config.max_pg_connections,
        config.pg_acquire_timeout.0,
    )
    .expect("invalid DATABASE_URL");

    let state = handlers::ReaderState {
        store: Arc::new(store),
        entity_kind: Arc::from(config.entity_kind.as_str()),
    };
    let app = handlers::add_routes(Router::new(), state);

    let recorder_handle = if config.export_prometheus {
        Some(setup_metrics_recorder().expect("failed to install metrics recorder"))
    } else {
        None
    };
    let app = setup_metrics_routes(app, recorder_handle);

    tracing::info!("listening on {}", config.bind());

    match listen(app, config.bind()).await {
        Ok(_) => {}
        Err(e) => tracing::error!("failed to start like-reader http server, {}", e),
    }
}
