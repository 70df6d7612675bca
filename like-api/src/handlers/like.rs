use std::time::Instant;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde_derive::{Deserialize, Serialize};
use tracing::{debug, error};

use like_common::event::{EventKey, DEFAULT_ENTITY_KIND};

use super::app::AppState;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LikeStatus {
    Accepted,
    Failure,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct LikeResponse {
    status: LikeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    key: Option<EventKey>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

type LikeResult = Result<(StatusCode, Json<LikeResponse>), (StatusCode, Json<LikeResponse>)>;

/// Record a like for one of the configured targets, chosen at random.
pub async fn post_like(State(state): State<AppState>) -> LikeResult {
    let key = state.targets.choose(&mut rand::thread_rng()).clone();

    enqueue(&state, key).await
}

/// Record a like for the post named in the path.
pub async fn post_like_target(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
) -> LikeResult {
    let key = EventKey::new(DEFAULT_ENTITY_KIND, &post_id).map_err(|err| {
        (
            StatusCode::BAD_REQUEST,
            Json(LikeResponse {
                status: LikeStatus::Failure,
                key: None,
                error: Some(err.to_string()),
            }),
        )
    })?;

    enqueue(&state, key).await
}

/// Push the key and answer without waiting for it to be aggregated.
async fn enqueue(state: &AppState, key: EventKey) -> LikeResult {
    let start_time = Instant::now();

    if let Err(err) = state.queue.push(&key).await {
        error!("failed to queue like for {}: {}", key, err);
        metrics::counter!("like_api_enqueue_total", "outcome" => "failure").increment(1);

        return Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(LikeResponse {
                status: LikeStatus::Failure,
                key: Some(key),
                error: Some(err.to_string()),
            }),
        ));
    }

    metrics::histogram!("like_api_enqueue_duration_seconds")
        .record(start_time.elapsed().as_secs_f64());
    metrics::counter!("like_api_enqueue_total", "outcome" => "accepted").increment(1);
    debug!("queued like for {}", key);

    Ok((
        StatusCode::ACCEPTED,
        Json(LikeResponse {
            status: LikeStatus::Accepted,
            key: Some(key),
            error: None,
        }),
    ))
}
