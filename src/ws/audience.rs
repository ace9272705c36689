use std::sync::Arc;

use crate::protocol::ServerMessage;
use crate::state::AppState;

/// Register (or re-announce) a device and hand back its friendly label
pub async fn register_device(state: &Arc<AppState>, device_id: Option<String>) -> ServerMessage {
    let record = state.register_device(device_id).await;
    tracing::info!("Device registered: {} ({})", record.device_id, record.label);
    ServerMessage::DeviceRegistered {
        device_id: record.device_id,
        label: record.label,
    }
}

/// Submit a question on behalf of a device.
///
/// The submission gate runs first; only an accepted submission creates a
/// record and counts against the device's allowance.
pub async fn submit_question(
    state: &Arc<AppState>,
    device_id: Option<String>,
    name: Option<String>,
    text: String,
) -> ServerMessage {
    let today = chrono::Utc::now().date_naive();

    if let Some(device_id) = &device_id {
        if let Err(reason) = state.check_gate(device_id, today).await {
            tracing::info!("Submission denied for device {}: {}", device_id, reason);
            return ServerMessage::SubmissionDenied { reason };
        }
    }

    match state
        .create_question(device_id.as_deref(), name, text)
        .await
    {
        Ok(question) => {
            if let Some(device_id) = &device_id {
                state
                    .record_submission(device_id, &question.name, today)
                    .await;
            }
            tracing::info!("Question {} submitted by {}", question.id, question.name);
            ServerMessage::SubmissionAccepted {
                question_id: question.id,
            }
        }
        Err(reason) => ServerMessage::SubmissionDenied { reason },
    }
}

/// Tell a device whether it won the current raffle
pub async fn check_raffle(state: &Arc<AppState>, device_id: String) -> ServerMessage {
    let is_winner = state.check_if_winner(&device_id).await;
    ServerMessage::RaffleResult {
        device_id,
        is_winner,
    }
}
