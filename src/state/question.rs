use super::AppState;
use crate::protocol::{AdminQuestionInfo, QuestionInfo, ServerMessage};
use crate::types::*;

pub(crate) fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Result of a moderation transition request
#[derive(Debug, Clone, PartialEq)]
pub enum ModerationResult {
    Updated(Question),
    NotFound,
    InvalidTransition {
        from: QuestionStatus,
        to: QuestionStatus,
    },
    /// Another transition for the same record is still outstanding
    InFlight,
}

impl AppState {
    /// Create a new question with status pending and a server-assigned
    /// creation order, then broadcast the updated snapshot.
    ///
    /// The submitted name and text are stored exactly as given (after
    /// trimming); an absent or blank name becomes the anonymous sentinel.
    pub async fn create_question(
        &self,
        device_id: Option<&str>,
        name: Option<String>,
        text: String,
    ) -> Result<Question, String> {
        let text = text.trim().to_string();
        if text.is_empty() {
            return Err("La pregunta no puede estar vacía".to_string());
        }

        let name = name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| ANONYMOUS_NAME.to_string());

        let question = Question {
            id: ulid::Ulid::new().to_string(),
            name,
            question: text,
            status: QuestionStatus::Pending,
            seq: self.next_seq(),
            created_at: now_rfc3339(),
            processed_at: None,
            device_id: device_id.map(|d| d.to_string()),
        };

        self.questions
            .write()
            .await
            .insert(question.id.clone(), question.clone());

        self.broadcast_questions().await;

        Ok(question)
    }

    /// Transition a question's status.
    ///
    /// At most one transition per record may be outstanding at a time;
    /// a second request while the first is in flight is rejected. The
    /// snapshot is broadcast only after the write has landed, so clients
    /// never display an unconfirmed status.
    pub async fn update_status(&self, id: &str, new_status: QuestionStatus) -> ModerationResult {
        {
            let mut in_flight = self.in_flight.write().await;
            if !in_flight.insert(id.to_string()) {
                tracing::warn!("Transition for question {} already in flight", id);
                return ModerationResult::InFlight;
            }
        }

        let result = {
            let mut questions = self.questions.write().await;
            match questions.get_mut(id) {
                Some(question) => {
                    if !question.status.can_transition_to(new_status) {
                        ModerationResult::InvalidTransition {
                            from: question.status,
                            to: new_status,
                        }
                    } else {
                        question.status = new_status;
                        question.processed_at = Some(now_rfc3339());
                        ModerationResult::Updated(question.clone())
                    }
                }
                None => ModerationResult::NotFound,
            }
        };

        self.in_flight.write().await.remove(id);

        if matches!(result, ModerationResult::Updated(_)) {
            self.broadcast_questions().await;
        }

        result
    }

    /// Full snapshot of the collection, newest first
    pub async fn snapshot(&self) -> Vec<Question> {
        let questions = self.questions.read().await;
        let mut list: Vec<Question> = questions.values().cloned().collect();
        list.sort_by(|a, b| b.seq.cmp(&a.seq));
        list
    }

    /// Client-side filter over the snapshot; no separate query
    pub async fn questions_with_status(&self, status: QuestionStatus) -> Vec<Question> {
        self.snapshot()
            .await
            .into_iter()
            .filter(|q| q.status == status)
            .collect()
    }

    /// Delete every question in the collection (admin bulk action).
    /// Returns the number of deleted records.
    pub async fn purge_questions(&self) -> usize {
        let deleted = {
            let mut questions = self.questions.write().await;
            let n = questions.len();
            questions.clear();
            n
        };

        tracing::info!("Purged {} questions", deleted);
        self.broadcast_questions().await;
        deleted
    }

    /// Broadcast the current snapshot to all clients, and the extended
    /// snapshot (with device identifiers) to admin connections.
    pub async fn broadcast_questions(&self) {
        let snapshot = self.snapshot().await;
        tracing::debug!("Broadcasting snapshot of {} questions", snapshot.len());

        let public: Vec<QuestionInfo> = snapshot.iter().map(|q| q.into()).collect();
        self.broadcast_to_all(ServerMessage::Questions { list: public });

        let devices = self.devices.read().await;
        let admin: Vec<AdminQuestionInfo> = snapshot
            .iter()
            .map(|q| {
                let label = q
                    .device_id
                    .as_ref()
                    .and_then(|d| devices.get(d))
                    .map(|r| r.label.clone());
                AdminQuestionInfo::new(q, label)
            })
            .collect();
        drop(devices);

        self.broadcast_to_admin(ServerMessage::AdminQuestions { list: admin });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_question_starts_pending() {
        let state = AppState::new();
        let q = state
            .create_question(Some("d1"), Some("Ana".to_string()), "¿Hora?".to_string())
            .await
            .unwrap();

        assert_eq!(q.status, QuestionStatus::Pending);
        assert_eq!(q.name, "Ana");
        assert_eq!(q.question, "¿Hora?");
        assert_eq!(q.device_id.as_deref(), Some("d1"));
        assert!(q.processed_at.is_none());
    }

    #[tokio::test]
    async fn test_create_question_round_trips_text() {
        let state = AppState::new();
        state
            .create_question(None, Some("Ana".to_string()), "¿Hora?".to_string())
            .await
            .unwrap();

        let snapshot = state.snapshot().await;
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].name, "Ana");
        assert_eq!(snapshot[0].question, "¿Hora?");
    }

    #[tokio::test]
    async fn test_blank_name_becomes_anonymous() {
        let state = AppState::new();
        let q = state
            .create_question(None, Some("   ".to_string()), "texto".to_string())
            .await
            .unwrap();
        assert_eq!(q.name, ANONYMOUS_NAME);

        let q = state
            .create_question(None, None, "otra".to_string())
            .await
            .unwrap();
        assert_eq!(q.name, ANONYMOUS_NAME);
    }

    #[tokio::test]
    async fn test_empty_text_rejected() {
        let state = AppState::new();
        let result = state
            .create_question(None, Some("Ana".to_string()), "   ".to_string())
            .await;
        assert!(result.is_err());
        assert!(state.questions.read().await.is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_is_newest_first() {
        let state = AppState::new();
        let first = state
            .create_question(None, None, "primera".to_string())
            .await
            .unwrap();
        let second = state
            .create_question(None, None, "segunda".to_string())
            .await
            .unwrap();

        let snapshot = state.snapshot().await;
        assert_eq!(snapshot[0].id, second.id);
        assert_eq!(snapshot[1].id, first.id);
    }

    #[tokio::test]
    async fn test_update_status_happy_path() {
        let state = AppState::new();
        let q = state
            .create_question(None, None, "texto".to_string())
            .await
            .unwrap();

        let result = state.update_status(&q.id, QuestionStatus::Approved).await;
        match result {
            ModerationResult::Updated(updated) => {
                assert_eq!(updated.status, QuestionStatus::Approved);
                assert!(updated.processed_at.is_some());
                // Creation timestamp is never altered by a transition
                assert_eq!(updated.created_at, q.created_at);
                assert_eq!(updated.seq, q.seq);
            }
            other => panic!("Expected Updated, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_update_status_is_idempotent() {
        let state = AppState::new();
        let q = state
            .create_question(None, None, "texto".to_string())
            .await
            .unwrap();

        let first = state.update_status(&q.id, QuestionStatus::Approved).await;
        let second = state.update_status(&q.id, QuestionStatus::Approved).await;

        assert!(matches!(first, ModerationResult::Updated(_)));
        assert!(matches!(second, ModerationResult::Updated(_)));
        let approved = state
            .questions_with_status(QuestionStatus::Approved)
            .await;
        assert_eq!(approved.len(), 1);
    }

    #[tokio::test]
    async fn test_approved_cannot_jump_to_rejected() {
        let state = AppState::new();
        let q = state
            .create_question(None, None, "texto".to_string())
            .await
            .unwrap();

        state.update_status(&q.id, QuestionStatus::Approved).await;
        let result = state.update_status(&q.id, QuestionStatus::Rejected).await;

        assert_eq!(
            result,
            ModerationResult::InvalidTransition {
                from: QuestionStatus::Approved,
                to: QuestionStatus::Rejected,
            }
        );
    }

    #[tokio::test]
    async fn test_rejected_returns_to_pending_without_duplicates() {
        let state = AppState::new();
        let q = state
            .create_question(None, None, "texto".to_string())
            .await
            .unwrap();

        state.update_status(&q.id, QuestionStatus::Rejected).await;
        assert_eq!(
            state
                .questions_with_status(QuestionStatus::Rejected)
                .await
                .len(),
            1
        );

        state.update_status(&q.id, QuestionStatus::Pending).await;
        assert_eq!(
            state
                .questions_with_status(QuestionStatus::Pending)
                .await
                .len(),
            1
        );
        assert!(state
            .questions_with_status(QuestionStatus::Rejected)
            .await
            .is_empty());
        assert_eq!(state.snapshot().await.len(), 1);
    }

    #[tokio::test]
    async fn test_update_status_unknown_id() {
        let state = AppState::new();
        let result = state
            .update_status("nonexistent", QuestionStatus::Approved)
            .await;
        assert_eq!(result, ModerationResult::NotFound);
    }

    #[tokio::test]
    async fn test_in_flight_guard_blocks_second_transition() {
        let state = AppState::new();
        let q = state
            .create_question(None, None, "texto".to_string())
            .await
            .unwrap();

        // Simulate an outstanding transition
        state.in_flight.write().await.insert(q.id.clone());

        let result = state.update_status(&q.id, QuestionStatus::Approved).await;
        assert_eq!(result, ModerationResult::InFlight);

        // Once the outstanding one clears, the transition goes through
        state.in_flight.write().await.remove(&q.id);
        let result = state.update_status(&q.id, QuestionStatus::Approved).await;
        assert!(matches!(result, ModerationResult::Updated(_)));
    }

    #[tokio::test]
    async fn test_purge_questions() {
        let state = AppState::new();
        for i in 0..3 {
            state
                .create_question(None, None, format!("pregunta {}", i))
                .await
                .unwrap();
        }

        assert_eq!(state.purge_questions().await, 3);
        assert!(state.snapshot().await.is_empty());
    }
}
