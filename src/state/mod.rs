mod device;
mod question;
mod raffle;

pub use question::ModerationResult;
pub use raffle::RaffleStart;

use crate::jobs::JobService;
use crate::protocol::ServerMessage;
use crate::types::*;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

/// Shared application state.
///
/// Owns the questions collection, the raffle singleton and the device
/// records, and broadcasts a fresh snapshot to every subscriber on each
/// change. A WebSocket connection subscribes by taking a receiver from
/// one of the broadcast channels; dropping the receiver unsubscribes.
#[derive(Clone)]
pub struct AppState {
    pub questions: Arc<RwLock<HashMap<QuestionId, Question>>>,
    pub devices: Arc<RwLock<HashMap<DeviceId, DeviceRecord>>>,
    pub raffle: Arc<RwLock<Raffle>>,
    /// Question ids with a moderation transition currently outstanding
    pub in_flight: Arc<RwLock<HashSet<QuestionId>>>,
    /// Source of the server-assigned creation order
    seq: Arc<AtomicU64>,
    pub policy: SubmitPolicy,
    /// Companion batch-job service, if configured
    pub jobs: Option<Arc<dyn JobService>>,
    /// Broadcast channel for all connected clients
    pub broadcast: broadcast::Sender<ServerMessage>,
    /// Broadcast channel for admin connections only
    pub admin_broadcast: broadcast::Sender<ServerMessage>,
}

impl AppState {
    pub fn new() -> Self {
        Self::with_policy(SubmitPolicy::OncePerDay)
    }

    pub fn with_policy(policy: SubmitPolicy) -> Self {
        let (tx, _rx) = broadcast::channel(100);
        let (admin_tx, _admin_rx) = broadcast::channel(100);
        Self {
            questions: Arc::new(RwLock::new(HashMap::new())),
            devices: Arc::new(RwLock::new(HashMap::new())),
            raffle: Arc::new(RwLock::new(Raffle::inactive(question::now_rfc3339()))),
            in_flight: Arc::new(RwLock::new(HashSet::new())),
            seq: Arc::new(AtomicU64::new(0)),
            policy,
            jobs: None,
            broadcast: tx,
            admin_broadcast: admin_tx,
        }
    }

    pub fn with_jobs(policy: SubmitPolicy, jobs: Option<Arc<dyn JobService>>) -> Self {
        Self {
            jobs,
            ..Self::with_policy(policy)
        }
    }

    /// Next value of the monotonic creation sequence
    pub(crate) fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1
    }

    /// Send a message to all connected clients.
    /// Ignores send errors (no receivers connected is fine).
    pub fn broadcast_to_all(&self, msg: ServerMessage) {
        let _ = self.broadcast.send(msg);
    }

    /// Send a message to admin connections only
    pub fn broadcast_to_admin(&self, msg: ServerMessage) {
        let _ = self.admin_broadcast.send(msg);
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
