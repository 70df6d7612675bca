//! Accept likes over HTTP and push them onto the like queue.
use std::sync::Arc;

use axum::Router;
use config::Config;
use envconfig::Envconfig;
use eyre::Result;

use like_common::metrics::{setup_metrics_recorder, setup_metrics_routes};
use like_common::queue::RedisQueue;

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

    // The producer never pops, the pop timeout is irrelevant here.
    let queue = RedisQueue::new(config.queue_name.as_str(), &config.redis_url, 0)
        .expect("failed to initialize queue");

    let state = handlers::AppState::new(Arc::new(queue), config.like_targets.clone());
    let app = handlers::add_routes(Router::new(), state, config.concurrency_limit);

    let recorder_handle = if config.export_prometheus {
        Some(setup_metrics_recorder().expect("failed to install metrics recorder"))
    } else {
        None
    };
    let app = setup_metrics_routes(app, recorder_handle);

    tracing::info!("listening on {}", config.bind());

    match listen(app, config.bind()).await {
        Ok(_) => {}
        Err(e) => tracing::error!("failed to start like-api http server, {}", e),
    }
}
