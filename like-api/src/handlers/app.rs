use std::convert::Infallible;
use std::sync::Arc;

use axum::{routing, Router};
use tower::limit::ConcurrencyLimitLayer;

use like_common::event::TargetSet;
use like_common::queue::LikeQueue;

use super::like;

/// Shared by every request: the queue to push to and the entities to pick from.
#[derive(Clone)]
pub struct AppState {
    pub queue: Arc<dyn LikeQueue>,
    pub targets: Arc<TargetSet>,
}

impl AppState {
    pub fn new(queue: Arc<dyn LikeQueue>, targets: TargetSet) -> Self {
        Self {
            queue,
            targets: Arc::new(targets),
        }
    }
}

pub fn add_routes(router: Router, state: AppState, concurrency_limit: usize) -> Router {
    router
        .route("/", routing::get(index))
        .route("/health", routing::get(health))
        .route("/_readiness", routing::get(index))
        .route("/_liveness", routing::get(index)) // No async loop in the api, axum serving is enough
        .route(
            "/like",
            routing::post(like::post_like)
                .with_state(state.clone())
                .layer::<_, Infallible>(ConcurrencyLimitLayer::new(concurrency_limit)),
        )
        .route(
            "/like/:post_id",
            routing::post(like::post_like_target)
                .with_state(state)
                .layer::<_, Infallible>(ConcurrencyLimitLayer::new(concurrency_limit)),
        )
}

pub async fn index() -> &'static str {
    "like api"
}

pub async fn health() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use http_body_util::BodyExt; // for `collect`
    use like_common::mock::MemoryQueue;
    use tower::ServiceExt; // for `oneshot`

    fn app() -> Router {
        let state = AppState::new(
            Arc::new(MemoryQueue::new("like_queue")),
            "post:1".parse().unwrap(),
        );
        add_routes(Router::new(), state, 10)
    }

    #[tokio::test]
    async fn index() {
        let response = app()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"like api");
    }

    #[tokio::test]
    async fn health() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"OK");
    }
}
