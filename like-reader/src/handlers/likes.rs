use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_derive::Serialize;
use tracing::error;

use like_common::event::EventKey;

use super::app::ReaderState;

#[derive(Serialize, Debug)]
pub struct LikeCount {
    post_id: EventKey,
    like_count: i64,
}

#[derive(Serialize, Debug)]
pub struct ReaderMessage {
    message: String,
}

fn message(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(ReaderMessage {
            message: message.to_owned(),
        }),
    )
        .into_response()
}

/// Current like count of a post, as last written by the worker.
pub async fn get_likes(State(state): State<ReaderState>, Path(post_id): Path<String>) -> Response {
    let key = match EventKey::new(&state.entity_kind, &post_id) {
        Ok(key) => key,
        Err(err) => return message(StatusCode::BAD_REQUEST, &err.to_string()),
    };

    match state.store.count(&key).await {
        Ok(Some(like_count)) => Json(LikeCount {
            post_id: key,
            like_count,
        })
        .into_response(),
        Ok(None) => message(StatusCode::NOT_FOUND, "Post not found"),
        Err(err) => {
            error!("failed to read like count for {}: {}", key, err);
            message(StatusCode::INTERNAL_SERVER_ERROR, &err.to_string())
        }
    }
}
