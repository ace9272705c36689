use crate::protocol::ServerMessage;
use crate::state::AppState;
use crate::types::QuestionStatus;
use std::sync::Arc;
use std::time::Duration;

/// Spawn a background task that broadcasts queue counts to admin clients
pub fn spawn_stats_broadcaster(state: Arc<AppState>) {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(Duration::from_secs(5)).await;

            // Nobody moderating, nothing to report
            if state.admin_broadcast.receiver_count() == 0 {
                continue;
            }

            let msg = stats_message(&state).await;
            let _ = state.admin_broadcast.send(msg);
        }
    });
}

pub async fn stats_message(state: &AppState) -> ServerMessage {
    let questions = state.questions.read().await;
    let mut pending = 0;
    let mut approved = 0;
    let mut rejected = 0;
    for q in questions.values() {
        match q.status {
            QuestionStatus::Pending => pending += 1,
            QuestionStatus::Approved => approved += 1,
            QuestionStatus::Rejected => rejected += 1,
        }
    }
    drop(questions);

    ServerMessage::AdminStats {
        pending,
        approved,
        rejected,
        raffle_active: state.raffle.read().await.active,
    }
}

/// Spawn a background task that evicts stale rate-limiter entries
pub fn spawn_limiter_cleanup(config: Arc<crate::abuse::AbuseConfig>) {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(Duration::from_secs(60)).await;
            if let Some(ref limiter) = config.rate_limiter {
                limiter.cleanup().await;
            }
        }
    });
}
