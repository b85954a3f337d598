use serde::{Deserialize, Serialize};

use crate::models::Reviewable;
use crate::subjects::UserRecord;

/// Identity facts about a requesting reviewer, supplied by the caller.
/// The queue never looks reviewers up itself; it only consumes these facts
/// through [`Guardian`] decisions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Reviewer {
    pub id: i64,
    pub admin: bool,
    pub moderator: bool,
    #[serde(default)]
    pub groups: Vec<i64>,
}

impl Reviewer {
    pub fn is_staff(&self) -> bool {
        self.admin || self.moderator
    }

    pub fn in_group(&self, group: i64) -> bool {
        self.groups.contains(&group)
    }
}

/// Authorization decisions for one reviewer.
pub struct Guardian<'a> {
    reviewer: &'a Reviewer,
}

impl<'a> Guardian<'a> {
    pub fn new(reviewer: &'a Reviewer) -> Self {
        Self { reviewer }
    }

    pub fn reviewer(&self) -> &Reviewer {
        self.reviewer
    }

    /// Visibility rule: admins see everything; otherwise the item must be
    /// moderator-reviewable and the reviewer staff, or the item's granting
    /// group must match a membership.
    pub fn can_see(&self, item: &Reviewable) -> bool {
        if self.reviewer.admin {
            return true;
        }

        (item.reviewable_by_moderator && self.reviewer.is_staff())
            || item
                .reviewable_by_group
                .is_some_and(|group| self.reviewer.in_group(group))
    }

    pub fn can_approve_user(&self, _user: &UserRecord) -> bool {
        self.reviewer.is_staff()
    }

    /// Staff may remove ordinary users; admin accounts are never removable
    /// through the queue.
    pub fn can_remove_user(&self, user: &UserRecord) -> bool {
        self.reviewer.is_staff() && !user.admin
    }
}
