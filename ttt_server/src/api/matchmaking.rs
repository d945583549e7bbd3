//! Matchmaking and match lookup handlers.
//!
//! # Examples
//!
//! Find an open match, or create one:
//! ```bash
//! curl -X POST http://localhost:7350/v2/rpc/find_or_create_match \
//!   -H "Content-Type: application/json" \
//!   -d '{"user_id": "alice"}'
//! ```
//!
//! Fetch its current state:
//! ```bash
//! curl http://localhost:7350/api/v1/matches/<match_id>
//! ```

use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use tictactoe::{
    MatchSummary,
    entities::{MatchId, MatchState, UserId},
};

use super::{AppState, request_id::RequestId};
use crate::{logging, metrics};

/// `user_id` is checked while deserializing: blank or over-long ids never
/// reach the handler.
#[derive(Debug, Deserialize)]
pub struct MatchmakingRequest {
    pub user_id: UserId,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MatchmakingResponse {
    pub match_id: MatchId,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, error: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
        }),
    )
}

/// Return the id of an open match, creating one when none is waiting.
///
/// The match is not joined here; the caller joins by opening
/// `/ws/{match_id}`.
pub async fn find_or_create_match(
    State(state): State<AppState>,
    request_id: RequestId,
    payload: Result<Json<MatchmakingRequest>, JsonRejection>,
) -> Result<Json<MatchmakingResponse>, ApiError> {
    let Json(request) = payload.map_err(|rejection| {
        metrics::matchmaking_requests_total("bad_request");
        api_error(StatusCode::BAD_REQUEST, rejection.body_text())
    })?;

    match state.registry.find_or_create(&request.user_id).await {
        Ok(match_id) => {
            metrics::matchmaking_requests_total("ok");
            metrics::active_matches(state.registry.len().await);
            logging::log_matchmaking(
                request_id.as_str(),
                request.user_id.as_str(),
                match_id.as_str(),
            );
            Ok(Json(MatchmakingResponse { match_id }))
        }
        Err(e) => {
            metrics::matchmaking_requests_total("error");
            tracing::error!(
                request_id = %request_id.as_str(),
                user_id = %request.user_id,
                "Matchmaking failed: {e}"
            );
            Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
    }
}

/// Summaries of every live match, oldest first.
pub async fn list_matches(State(state): State<AppState>) -> Json<Vec<MatchSummary>> {
    Json(state.registry.list().await)
}

/// Full state snapshot of one match.
pub async fn get_match(
    State(state): State<AppState>,
    Path(match_id): Path<String>,
) -> Result<Json<MatchState>, ApiError> {
    let match_id = MatchId::from(match_id);
    let not_found = || api_error(StatusCode::NOT_FOUND, format!("Match {match_id} not found"));

    let handle = state.registry.get(&match_id).await.ok_or_else(not_found)?;
    handle.snapshot().await.map(Json).map_err(|_| not_found())
}
