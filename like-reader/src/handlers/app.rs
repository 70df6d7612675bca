use std::sync::Arc;

use axum::{routing, Router};

use like_common::store::CounterStore;

use super::likes;

#[derive(Clone)]
pub struct ReaderState {
    pub store: Arc<dyn CounterStore>,
    pub entity_kind: Arc<str>,
}

pub fn add_routes(router: Router, state: ReaderState) -> Router {
    router
        .route("/", routing::get(index))
        .route("/_readiness", routing::get(index))
        .route("/_liveness", routing::get(index))
        .route(
            "/likes/:post_id",
            routing::get(likes::get_likes).with_state(state),
        )
}

pub async fn index() -> &'static str {
    "like reader"
}
