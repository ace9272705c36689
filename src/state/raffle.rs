use super::question::now_rfc3339;
use super::AppState;
use crate::protocol::ServerMessage;
use crate::types::*;
use rand::Rng;
use std::collections::HashSet;

/// Outcome of a raffle draw request
#[derive(Debug, Clone, PartialEq)]
pub enum RaffleStart {
    Started {
        winner: DeviceId,
        participants: usize,
    },
    /// No approved question carries a device id; nothing was written
    NoEligibleParticipants,
}

impl AppState {
    /// Distinct device ids behind currently approved questions.
    /// Questions without a device id are excluded from eligibility.
    pub async fn eligible_devices(&self) -> Vec<DeviceId> {
        let approved = self.questions_with_status(QuestionStatus::Approved).await;

        let mut seen = HashSet::new();
        let mut eligible = Vec::new();
        for q in approved {
            if let Some(device_id) = q.device_id {
                if seen.insert(device_id.clone()) {
                    eligible.push(device_id);
                }
            }
        }
        eligible
    }

    /// Draw a winner uniformly from the eligible set and overwrite the
    /// raffle singleton. Re-drawing replaces any previous winner.
    pub async fn start_raffle(&self) -> RaffleStart {
        let eligible = self.eligible_devices().await;
        if eligible.is_empty() {
            tracing::info!("Raffle requested with no eligible participants");
            return RaffleStart::NoEligibleParticipants;
        }

        let index = rand::rng().random_range(0..eligible.len());
        let winner = eligible[index].clone();

        {
            let mut raffle = self.raffle.write().await;
            raffle.active = true;
            raffle.winner = Some(winner.clone());
            raffle.updated_at = now_rfc3339();
        }

        tracing::info!(
            "Raffle drawn: winner {} among {} participants",
            winner,
            eligible.len()
        );

        self.broadcast_raffle().await;

        RaffleStart::Started {
            winner,
            participants: eligible.len(),
        }
    }

    /// True iff the raffle is active and this exact device won.
    /// Fails closed: empty id, missing winner or inactive raffle all
    /// answer false.
    pub async fn check_if_winner(&self, device_id: &str) -> bool {
        if device_id.is_empty() {
            return false;
        }
        let raffle = self.raffle.read().await;
        raffle.active && raffle.winner.as_deref() == Some(device_id)
    }

    pub async fn raffle_state(&self) -> Raffle {
        self.raffle.read().await.clone()
    }

    pub async fn broadcast_raffle(&self) {
        let raffle = self.raffle_state().await;
        self.broadcast_to_all(ServerMessage::RaffleState {
            active: raffle.active,
            winner: raffle.winner,
        });
    }
}
