use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Opaque ID types for type safety
pub type QuestionId = String;
pub type DeviceId = String;

/// Display name recorded for submissions that arrive without one
pub const ANONYMOUS_NAME: &str = "Anónimo";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum QuestionStatus {
    Pending,
    Approved,
    Rejected,
}

impl QuestionStatus {
    /// Whether a moderator may move a question from `self` to `to`.
    ///
    /// Approved and rejected can only reach each other through pending.
    /// Repeating the current status is allowed so a double-click on
    /// "approve" stays idempotent.
    pub fn can_transition_to(self, to: QuestionStatus) -> bool {
        use QuestionStatus::*;
        match (self, to) {
            (from, to) if from == to => true,
            (Pending, Approved) | (Pending, Rejected) => true,
            (Approved, Pending) | (Rejected, Pending) => true,
            _ => false,
        }
    }
}

/// A submitted audience question with its moderation status
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Question {
    pub id: QuestionId,
    pub name: String,
    pub question: String,
    pub status: QuestionStatus,
    /// Server-assigned monotonic sequence number; orders the snapshot
    pub seq: u64,
    /// ISO8601 creation timestamp, assigned once and never altered
    pub created_at: String,
    /// Set on every status transition
    pub processed_at: Option<String>,
    /// Device identifier attached at creation, if the submitter had one
    pub device_id: Option<DeviceId>,
}

/// The singleton raffle record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Raffle {
    pub active: bool,
    pub winner: Option<DeviceId>,
    pub updated_at: String,
}

impl Raffle {
    /// Initial record: inactive, no winner
    pub fn inactive(now: String) -> Self {
        Self {
            active: false,
            winner: None,
            updated_at: now,
        }
    }
}

/// Per-device bookkeeping.
///
/// The device id is self-reported by the client and survives only as
/// long as its local storage does, so everything derived from it is an
/// advisory anti-abuse signal, not authentication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub device_id: DeviceId,
    /// Friendly label shown in the admin panel instead of the raw id
    pub label: String,
    /// Name used on the last submission, for redisplay
    pub last_name: Option<String>,
    pub submitted_once: bool,
    pub last_submission_date: Option<NaiveDate>,
}

/// How often a single device may submit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitPolicy {
    Unlimited,
    OnceEver,
    OncePerDay,
}

impl SubmitPolicy {
    /// Read the policy from SUBMIT_POLICY (unlimited | once | daily).
    /// Defaults to once per day, the policy used at the live event.
    pub fn from_env() -> Self {
        match std::env::var("SUBMIT_POLICY")
            .unwrap_or_default()
            .trim()
            .to_lowercase()
            .as_str()
        {
            "unlimited" => SubmitPolicy::Unlimited,
            "once" => SubmitPolicy::OnceEver,
            "daily" | "" => SubmitPolicy::OncePerDay,
            other => {
                tracing::warn!("Unknown SUBMIT_POLICY '{}', using daily", other);
                SubmitPolicy::OncePerDay
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Display,
    Audience,
}
