use std::time::{Duration, Instant};

use futures::stream::{self, StreamExt};
use reqwest::StatusCode;
use tracing::{info, warn};

/// What a load run achieved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadSummary {
    pub accepted: usize,
    pub failed: usize,
    pub elapsed: Duration,
}

/// Send `request_count` likes to `url`, with at most `concurrency` requests in flight.
/// Per-request timeouts are the client's.
pub async fn run_load(
    client: &reqwest::Client,
    url: &str,
    request_count: usize,
    concurrency: usize,
) -> LoadSummary {
    let start = Instant::now();

    let accepted = stream::iter(0..request_count)
        .map(|n| send_like(client, url, n, request_count))
        .buffer_unordered(concurrency.max(1))
        .fold(0, |accepted, ok| async move { accepted + usize::from(ok) })
        .await;

    LoadSummary {
        accepted,
        failed: request_count - accepted,
        elapsed: start.elapsed(),
    }
}

/// A like counts as sent only when the api answered 202.
async fn send_like(client: &reqwest::Client, url: &str, n: usize, total: usize) -> bool {
    match client.post(url).send().await {
        Ok(response) if response.status() == StatusCode::ACCEPTED => {
            info!("Request {}/{} sent successfully.", n + 1, total);
            true
        }
        Ok(response) => {
            warn!(
                "Request {}/{} failed with status: {}",
                n + 1,
                total,
                response.status()
            );
            false
        }
        Err(e) => {
            warn!("Request {}/{} failed: {}", n + 1, total, e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use axum::{http, routing, Router};

    use super::*;

    /// Serve an api that accepts every other like.
    async fn flaky_api() -> (String, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let app = Router::new().route(
            "/like",
            routing::post(move || {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n % 2 == 0 {
                        http::StatusCode::ACCEPTED
                    } else {
                        http::StatusCode::INTERNAL_SERVER_ERROR
                    }
                }
            }),
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        (format!("http://{}/like", addr), calls)
    }

    #[tokio::test]
    async fn counts_accepted_and_failed_requests() {
        let (url, calls) = flaky_api().await;
        let client = reqwest::Client::new();

        let summary = run_load(&client, &url, 20, 4).await;

        assert_eq!(calls.load(Ordering::SeqCst), 20);
        assert_eq!(summary.accepted, 10);
        assert_eq!(summary.failed, 10);
    }

    #[tokio::test]
    async fn unreachable_target_fails_every_request() {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(1))
            .build()
            .unwrap();

        let summary = run_load(&client, "http://127.0.0.1:1/like", 5, 2).await;

        assert_eq!(summary.accepted, 0);
        assert_eq!(summary.failed, 5);
    }
}
