//! Drain the like queue into the counter store.
use axum::{routing::get, Router};
use envconfig::Envconfig;

use like_common::{
    health::HealthRegistry,
    metrics::{serve, setup_metrics_recorder, setup_metrics_routes},
    queue::RedisQueue,
    store::PgConnector,
};
use like_worker::backoff::Backoff;
use like_worker::config::Config;
use like_worker::worker::LikeWorker;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let config = Config::init_from_env().expect("Invalid configuration:");

    let liveness = HealthRegistry::new("liveness");
    let worker_liveness = liveness.register(
        "worker",
        time::Duration::try_from(config.liveness_deadline.0)
            .expect("invalid liveness deadline"),
    );

    let queue = RedisQueue::new(
        config.queue_name.as_str(),
        &config.redis_url,
        config.pop_timeout_secs,
    )
    .expect("failed to initialize queue");
    let connector = PgConnector::new(
        &config.database_url,
        config.max_pg_connections,
        config.pg_acquire_timeout.0,
    );

    let worker = LikeWorker::new(
        &config.worker_name,
        queue,
        connector,
        Backoff::fixed(config.backoff_interval.0),
        worker_liveness,
    );

    let router = Router::new()
        .route("/", get(index))
        .route("/_readiness", get(index))
        .route("/_liveness", get(move || std::future::ready(liveness.get_status())));
    let router = setup_metrics_routes(
        router,
        Some(setup_metrics_recorder().expect("failed to install metrics recorder")),
    );

    let bind = config.bind();
    tokio::task::spawn(async move {
        serve(router, &bind)
            .await
            .expect("failed to start serving metrics");
    });

    worker.run().await;
}

pub async fn index() -> &'static str {
    "like worker"
}
