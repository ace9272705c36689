//! HTTP API endpoints for read-only views.
//!
//! The answers page and the raffle result page poll these instead of
//! holding a WebSocket open.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use std::sync::Arc;

use crate::protocol::QuestionInfo;
use crate::state::AppState;
use crate::types::QuestionStatus;

/// Response structure for a raffle lookup
#[derive(Debug, Clone, Serialize)]
pub struct RaffleLookupResponse {
    pub active: bool,
    pub is_winner: bool,
}

/// List approved questions, newest first.
///
/// GET /api/questions/approved
pub async fn list_approved_questions(
    State(state): State<Arc<AppState>>,
) -> Json<Vec<QuestionInfo>> {
    let questions = state.questions_with_status(QuestionStatus::Approved).await;
    Json(questions.iter().map(QuestionInfo::from).collect())
}

/// Check whether a device won the current raffle.
///
/// GET /api/raffle/{device_id}
pub async fn raffle_lookup(
    State(state): State<Arc<AppState>>,
    Path(device_id): Path<String>,
) -> Json<RaffleLookupResponse> {
    let raffle = state.raffle_state().await;
    let is_winner = state.check_if_winner(&device_id).await;
    Json(RaffleLookupResponse {
        active: raffle.active,
        is_winner,
    })
}
