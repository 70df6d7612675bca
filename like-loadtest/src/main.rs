//! Generate like traffic against the like api.
use config::Config;
use envconfig::Envconfig;
use eyre::Result;

mod config;
mod runner;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let config = Config::init_from_env()?;

    tracing::info!(
        "Starting load test: {} requests with {} workers.",
        config.request_count,
        config.concurrent_workers
    );
    tracing::info!("Targeting URL: {}", config.target_url);

    tokio::time::sleep(config.startup_delay.0).await;

    let client = reqwest::Client::builder()
        .timeout(config.request_timeout.0)
        .build()?;

    let summary = runner::run_load(
        &client,
        &config.target_url,
        config.request_count,
        config.concurrent_workers,
    )
    .await;

    tracing::info!(
        "Load test finished in {:.2} seconds: {} accepted, {} failed.",
        summary.elapsed.as_secs_f64(),
        summary.accepted,
        summary.failed
    );

    Ok(())
}
