use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Lifecycle status of a reviewable item. `Pending` is the only initial
/// value; the rest are reached through `perform` transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReviewableStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
    Ignored,
    Deleted,
}

impl ReviewableStatus {
    /// Stable integer mapping used by the persisted shape and the wire
    /// contract.
    pub fn as_i16(self) -> i16 {
        match self {
            ReviewableStatus::Pending => 0,
            ReviewableStatus::Approved => 1,
            ReviewableStatus::Rejected => 2,
            ReviewableStatus::Ignored => 3,
            ReviewableStatus::Deleted => 4,
        }
    }

    pub fn from_i16(value: i16) -> Option<Self> {
        match value {
            0 => Some(ReviewableStatus::Pending),
            1 => Some(ReviewableStatus::Approved),
            2 => Some(ReviewableStatus::Rejected),
            3 => Some(ReviewableStatus::Ignored),
            4 => Some(ReviewableStatus::Deleted),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ReviewableStatus::Pending => "pending",
            ReviewableStatus::Approved => "approved",
            ReviewableStatus::Rejected => "rejected",
            ReviewableStatus::Ignored => "ignored",
            ReviewableStatus::Deleted => "deleted",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "pending" => Some(ReviewableStatus::Pending),
            "approved" => Some(ReviewableStatus::Approved),
            "rejected" => Some(ReviewableStatus::Rejected),
            "ignored" => Some(ReviewableStatus::Ignored),
            "deleted" => Some(ReviewableStatus::Deleted),
            _ => None,
        }
    }
}

/// Reference to the entity under review, named by subject kind and id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetRef {
    pub kind: String,
    pub id: i64,
}

/// A queued item awaiting a moderation decision.
///
/// The record is uniform across item kinds; `kind` selects which
/// [`ReviewableType`](crate::types::ReviewableType) supplies the judgment
/// logic. Only `perform` mutates `status`, at most once per call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reviewable {
    pub id: Uuid,
    pub kind: String,
    pub status: ReviewableStatus,
    pub created_by: i64,
    pub reviewable_by_moderator: bool,
    pub reviewable_by_group: Option<i64>,
    /// Reserved-to-one-reviewer marker. Persisted but not enforced.
    pub claimed_by: Option<i64>,
    pub category: Option<i64>,
    pub target: Option<TargetRef>,
    /// Arbitrary item-specific data. Always a mapping, never null.
    #[serde(default)]
    pub payload: Map<String, Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Reviewable {
    /// A fresh pending reviewable of the given kind.
    pub fn new(kind: &str, created_by: i64) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            kind: kind.to_string(),
            status: ReviewableStatus::Pending,
            created_by,
            reviewable_by_moderator: false,
            reviewable_by_group: None,
            claimed_by: None,
            category: None,
            target: None,
            payload: Map::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == ReviewableStatus::Pending
    }

    pub fn is_approved(&self) -> bool {
        self.status == ReviewableStatus::Approved
    }

    pub fn is_rejected(&self) -> bool {
        self.status == ReviewableStatus::Rejected
    }
}

/// Whether an action handler succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PerformStatus {
    Success,
    Failed,
}

/// Outcome contract returned by every action handler: success or failure,
/// plus the status the reviewable should transition to. Ephemeral; handed
/// back to the caller unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerformResult {
    pub status: PerformStatus,
    pub transition_to: Option<ReviewableStatus>,
}

impl PerformResult {
    pub fn success(transition_to: impl Into<Option<ReviewableStatus>>) -> Self {
        Self {
            status: PerformStatus::Success,
            transition_to: transition_to.into(),
        }
    }

    /// A business-rule failure. Not an error: the caller gets the result,
    /// the status transition is skipped.
    pub fn failed() -> Self {
        Self {
            status: PerformStatus::Failed,
            transition_to: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == PerformStatus::Success
    }

    pub fn is_failed(&self) -> bool {
        !self.is_success()
    }
}
