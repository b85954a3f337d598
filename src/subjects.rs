use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::StoreError;
use crate::models::TargetRef;

/// Subject kind tag for user records.
pub const USER_KIND: &str = "user";

/// Actor id stamped on records the system creates on its own behalf.
pub const SYSTEM_ACTOR: i64 = -1;

/// The reference subject: a user account held for approval.
///
/// Subjects live in the store as JSON documents addressed by
/// [`TargetRef`]; this is the typed view the user-approval item type
/// decodes them into.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: i64,
    pub username: String,
    #[serde(default)]
    pub admin: bool,
    #[serde(default)]
    pub moderator: bool,
    #[serde(default)]
    pub approved: bool,
    #[serde(default)]
    pub approved_by: Option<i64>,
    #[serde(default)]
    pub approved_at: Option<DateTime<Utc>>,
    /// Dependent records that block removal while present.
    #[serde(default)]
    pub post_count: i64,
}

impl UserRecord {
    pub fn new(id: i64, username: &str) -> Self {
        Self {
            id,
            username: username.to_string(),
            admin: false,
            moderator: false,
            approved: false,
            approved_by: None,
            approved_at: None,
            post_count: 0,
        }
    }

    pub fn target(&self) -> TargetRef {
        TargetRef {
            kind: USER_KIND.to_string(),
            id: self.id,
        }
    }

    pub fn from_doc(doc: &Value) -> Result<Self, StoreError> {
        Ok(serde_json::from_value(doc.clone())?)
    }

    pub fn to_doc(&self) -> Result<Value, StoreError> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Mark a user approved without persisting. `approved_by` and
/// `approved_at` keep any value already set, so creation flows that
/// approve on the spot can reuse this.
pub fn setup_approval(user: &mut UserRecord, approved_by: i64) {
    user.approved = true;
    user.approved_by.get_or_insert(approved_by);
    user.approved_at.get_or_insert_with(Utc::now);
}
