use std::sync::Arc;

use crate::jobs::JobKind;
use crate::protocol::ServerMessage;
use crate::state::{AppState, ModerationResult, RaffleStart};
use crate::types::QuestionStatus;

fn status_notice(status: QuestionStatus) -> &'static str {
    match status {
        QuestionStatus::Approved => "Pregunta aprobada",
        QuestionStatus::Rejected => "Pregunta rechazada",
        QuestionStatus::Pending => "La pregunta ha vuelto a pendiente",
    }
}

/// Apply a moderation transition and report the outcome to the acting
/// admin. The updated snapshot fans out over the broadcast channels
/// separately.
pub async fn set_status(
    state: &Arc<AppState>,
    question_id: &str,
    status: QuestionStatus,
) -> ServerMessage {
    match state.update_status(question_id, status).await {
        ModerationResult::Updated(question) => {
            tracing::info!("Question {} set to {:?}", question.id, question.status);
            ServerMessage::StatusUpdated {
                question_id: question.id,
                status: question.status,
                notice: status_notice(question.status).to_string(),
            }
        }
        ModerationResult::NotFound => ServerMessage::Error {
            code: "QUESTION_NOT_FOUND".to_string(),
            msg: "La pregunta ya no existe".to_string(),
        },
        ModerationResult::InvalidTransition { from, to } => {
            tracing::warn!(
                "Invalid transition {:?} -> {:?} for question {}",
                from,
                to,
                question_id
            );
            ServerMessage::Error {
                code: "INVALID_TRANSITION".to_string(),
                msg: "Ese cambio de estado no está permitido".to_string(),
            }
        }
        ModerationResult::InFlight => ServerMessage::Error {
            code: "TRANSITION_IN_FLIGHT".to_string(),
            msg: "Esa pregunta ya se está procesando".to_string(),
        },
    }
}

/// Draw a raffle winner among devices with at least one approved question
pub async fn start_raffle(state: &Arc<AppState>) -> ServerMessage {
    match state.start_raffle().await {
        RaffleStart::Started {
            winner,
            participants,
        } => {
            tracing::info!(
                "Raffle started with {} participants, winner {}",
                participants,
                winner
            );
            ServerMessage::RaffleStarted { participants }
        }
        RaffleStart::NoEligibleParticipants => ServerMessage::Error {
            code: "NO_PARTICIPANTS".to_string(),
            msg: "No hay participantes válidos".to_string(),
        },
    }
}

/// Run one of the companion batch jobs.
///
/// The outcome goes out once, over the admin channel, so every connected
/// admin (the caller included) sees exactly one copy. Only the
/// unconfigured case answers the caller directly.
pub async fn run_job(state: &Arc<AppState>, kind: JobKind) -> Option<ServerMessage> {
    let Some(jobs) = &state.jobs else {
        return Some(ServerMessage::Error {
            code: "JOBS_UNAVAILABLE".to_string(),
            msg: "El servicio de scripts no está configurado".to_string(),
        });
    };

    tracing::info!("Running job: {}", kind.name());
    let msg = match jobs.run(kind).await {
        Ok(outcome) => ServerMessage::JobOutput {
            job: kind.name().to_string(),
            success: outcome.success,
            output: outcome.output,
        },
        Err(e) => {
            tracing::error!("Job {} failed: {}", kind.name(), e);
            ServerMessage::JobOutput {
                job: kind.name().to_string(),
                success: false,
                output: e.to_string(),
            }
        }
    };
    state.broadcast_to_admin(msg);
    None
}

/// Delete every question and broadcast the now-empty snapshot
pub async fn purge_questions(state: &Arc<AppState>) -> ServerMessage {
    let deleted = state.purge_questions().await;
    tracing::info!("Purged {} questions", deleted);
    ServerMessage::QuestionsPurged { deleted }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SubmitPolicy;

    async fn seeded_state() -> Arc<AppState> {
        let state = Arc::new(AppState::with_policy(SubmitPolicy::Unlimited));
        state
            .create_question(Some("d1"), Some("Ana".to_string()), "¿Hora?".to_string())
            .await
            .unwrap();
        state
    }

    #[tokio::test]
    async fn test_approve_returns_notice() {
        let state = seeded_state().await;
        let id = state.snapshot().await[0].id.clone();

        let msg = set_status(&state, &id, QuestionStatus::Approved).await;
        match msg {
            ServerMessage::StatusUpdated { status, notice, .. } => {
                assert_eq!(status, QuestionStatus::Approved);
                assert_eq!(notice, "Pregunta aprobada");
            }
            other => panic!("Expected StatusUpdated, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unknown_question() {
        let state = Arc::new(AppState::new());
        let msg = set_status(&state, "missing", QuestionStatus::Approved).await;
        match msg {
            ServerMessage::Error { code, .. } => assert_eq!(code, "QUESTION_NOT_FOUND"),
            other => panic!("Expected error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_approved_to_rejected_is_refused() {
        let state = seeded_state().await;
        let id = state.snapshot().await[0].id.clone();

        set_status(&state, &id, QuestionStatus::Approved).await;
        let msg = set_status(&state, &id, QuestionStatus::Rejected).await;
        match msg {
            ServerMessage::Error { code, .. } => assert_eq!(code, "INVALID_TRANSITION"),
            other => panic!("Expected error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_raffle_without_approved_questions() {
        let state = seeded_state().await;
        let msg = start_raffle(&state).await;
        match msg {
            ServerMessage::Error { code, .. } => assert_eq!(code, "NO_PARTICIPANTS"),
            other => panic!("Expected error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_raffle_with_one_approved_question() {
        let state = seeded_state().await;
        let id = state.snapshot().await[0].id.clone();
        set_status(&state, &id, QuestionStatus::Approved).await;

        let msg = start_raffle(&state).await;
        match msg {
            ServerMessage::RaffleStarted { participants } => assert_eq!(participants, 1),
            other => panic!("Expected RaffleStarted, got {:?}", other),
        }
        let raffle = state.raffle.read().await;
        assert!(raffle.active);
        assert_eq!(raffle.winner.as_deref(), Some("d1"));
    }

    #[tokio::test]
    async fn test_jobs_unconfigured() {
        let state = Arc::new(AppState::new());
        let msg = run_job(&state, JobKind::Moderation).await;
        match msg {
            Some(ServerMessage::Error { code, .. }) => assert_eq!(code, "JOBS_UNAVAILABLE"),
            other => panic!("Expected error, got {:?}", other),
        }
    }

    struct FixedOutcomeService;

    #[async_trait::async_trait]
    impl crate::jobs::JobService for FixedOutcomeService {
        async fn run(&self, _job: JobKind) -> crate::jobs::JobResult<crate::jobs::JobOutcome> {
            Ok(crate::jobs::JobOutcome {
                output: "12 preguntas revisadas".to_string(),
                success: true,
            })
        }
    }

    // The acting admin subscribes to the admin channel like everyone
    // else, so the outcome must arrive there exactly once with no
    // direct reply on top.
    #[tokio::test]
    async fn test_job_output_is_delivered_once() {
        let state = Arc::new(AppState::with_jobs(
            SubmitPolicy::Unlimited,
            Some(Arc::new(FixedOutcomeService)),
        ));
        let mut rx = state.admin_broadcast.subscribe();

        let reply = run_job(&state, JobKind::Moderation).await;
        assert!(reply.is_none());

        match rx.try_recv() {
            Ok(ServerMessage::JobOutput {
                job,
                success,
                output,
            }) => {
                assert_eq!(job, "moderation");
                assert!(success);
                assert_eq!(output, "12 preguntas revisadas");
            }
            other => panic!("Expected JobOutput broadcast, got {:?}", other),
        }
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_purge_reports_count() {
        let state = seeded_state().await;
        let msg = purge_questions(&state).await;
        match msg {
            ServerMessage::QuestionsPurged { deleted } => assert_eq!(deleted, 1),
            other => panic!("Expected QuestionsPurged, got {:?}", other),
        }
        assert!(state.questions.read().await.is_empty());
    }
}
