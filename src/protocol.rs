use crate::types::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Announce a locally stored device id, or ask the server for one
    RegisterDevice {
        device_id: Option<DeviceId>,
    },
    SubmitQuestion {
        device_id: Option<DeviceId>,
        /// Omitted for the anonymous expo flow
        name: Option<String>,
        text: String,
    },
    /// Ask whether this device won the current raffle
    CheckRaffle {
        device_id: DeviceId,
    },
    // Admin-only messages
    AdminSetStatus {
        question_id: QuestionId,
        status: QuestionStatus,
    },
    AdminStartRaffle,
    /// Trigger the external moderation batch job
    AdminRunModeration,
    /// Trigger the external response-generation batch job
    AdminRunResponses,
    /// Delete every question in the collection
    AdminPurgeQuestions,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum ServerMessage {
    Welcome {
        protocol: String,
        role: Role,
        server_now: String,
    },
    DeviceRegistered {
        device_id: DeviceId,
        label: String,
    },
    /// Full snapshot of the collection, newest first; redelivered on
    /// every change
    Questions {
        list: Vec<QuestionInfo>,
    },
    /// Admin-only snapshot including device identifiers
    AdminQuestions {
        list: Vec<AdminQuestionInfo>,
    },
    SubmissionAccepted {
        question_id: QuestionId,
    },
    /// Submission gate said no; `reason` is the user-facing explanation
    SubmissionDenied {
        reason: String,
    },
    /// Confirms a moderation transition, with the toast text for the
    /// acting admin
    StatusUpdated {
        question_id: QuestionId,
        status: QuestionStatus,
        notice: String,
    },
    /// Current raffle singleton, broadcast to everyone on change
    RaffleState {
        active: bool,
        winner: Option<DeviceId>,
    },
    RaffleStarted {
        participants: usize,
    },
    RaffleResult {
        device_id: DeviceId,
        is_winner: bool,
    },
    /// Periodic queue counts for admin connections
    AdminStats {
        pending: usize,
        approved: usize,
        rejected: usize,
        raffle_active: bool,
    },
    /// Outcome of an external batch job
    JobOutput {
        job: String,
        success: bool,
        output: String,
    },
    QuestionsPurged {
        deleted: usize,
    },
    Error {
        code: String,
        msg: String,
    },
}

/// Public question info (device identifiers stay admin-only)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionInfo {
    pub id: QuestionId,
    pub name: String,
    pub question: String,
    pub status: QuestionStatus,
    pub created_at: String,
}

impl From<&Question> for QuestionInfo {
    fn from(q: &Question) -> Self {
        Self {
            id: q.id.clone(),
            name: q.name.clone(),
            question: q.question.clone(),
            status: q.status,
            created_at: q.created_at.clone(),
        }
    }
}

/// Admin-only question info (includes the submitting device)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminQuestionInfo {
    pub id: QuestionId,
    pub name: String,
    pub question: String,
    pub status: QuestionStatus,
    pub created_at: String,
    pub processed_at: Option<String>,
    pub device_id: Option<DeviceId>,
    /// Friendly label for the device, when the server has one
    pub device_label: Option<String>,
}

impl AdminQuestionInfo {
    pub fn new(q: &Question, device_label: Option<String>) -> Self {
        Self {
            id: q.id.clone(),
            name: q.name.clone(),
            question: q.question.clone(),
            status: q.status,
            created_at: q.created_at.clone(),
            processed_at: q.processed_at.clone(),
            device_id: q.device_id.clone(),
            device_label,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_message_wire_format() {
        let json = r#"{"t":"submit_question","device_id":"d1","name":"Ana","text":"¿Hora?"}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        match msg {
            ClientMessage::SubmitQuestion {
                device_id,
                name,
                text,
            } => {
                assert_eq!(device_id.as_deref(), Some("d1"));
                assert_eq!(name.as_deref(), Some("Ana"));
                assert_eq!(text, "¿Hora?");
            }
            _ => panic!("Expected SubmitQuestion"),
        }
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let msg = ServerMessage::StatusUpdated {
            question_id: "q1".to_string(),
            status: QuestionStatus::Approved,
            notice: "Pregunta aprobada".to_string(),
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains(r#""status":"approved""#));
        assert!(json.contains(r#""t":"status_updated""#));
    }
}
