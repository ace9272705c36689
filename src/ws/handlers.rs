use std::sync::Arc;

use crate::protocol::{ClientMessage, ServerMessage};
use crate::state::AppState;
use crate::types::Role;

use super::{admin, audience};

/// Reject non-admin senders of admin messages
macro_rules! check_admin {
    ($role:expr) => {
        if *$role != Role::Admin {
            tracing::warn!("Rejected admin message from role {:?}", $role);
            return Some(ServerMessage::Error {
                code: "FORBIDDEN".to_string(),
                msg: "Solo para administradores".to_string(),
            });
        }
    };
}

/// Dispatch a parsed client message.
///
/// Returns the direct reply for the sending connection, if any; state
/// changes additionally fan out over the broadcast channels.
pub async fn handle_message(
    msg: ClientMessage,
    role: &Role,
    state: &Arc<AppState>,
) -> Option<ServerMessage> {
    match msg {
        ClientMessage::RegisterDevice { device_id } => {
            Some(audience::register_device(state, device_id).await)
        }
        ClientMessage::SubmitQuestion {
            device_id,
            name,
            text,
        } => Some(audience::submit_question(state, device_id, name, text).await),
        ClientMessage::CheckRaffle { device_id } => {
            Some(audience::check_raffle(state, device_id).await)
        }
        ClientMessage::AdminSetStatus {
            question_id,
            status,
        } => {
            check_admin!(role);
            Some(admin::set_status(state, &question_id, status).await)
        }
        ClientMessage::AdminStartRaffle => {
            check_admin!(role);
            Some(admin::start_raffle(state).await)
        }
        ClientMessage::AdminRunModeration => {
            check_admin!(role);
            admin::run_job(state, crate::jobs::JobKind::Moderation).await
        }
        ClientMessage::AdminRunResponses => {
            check_admin!(role);
            admin::run_job(state, crate::jobs::JobKind::OllamaResponse).await
        }
        ClientMessage::AdminPurgeQuestions => {
            check_admin!(role);
            Some(admin::purge_questions(state).await)
        }
    }
}
