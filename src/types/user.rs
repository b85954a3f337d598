//! User-approval reviewables: new accounts held until staff signs off.

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use super::ReviewableType;
use crate::actions::ActionList;
use crate::errors::{Error, StoreError};
use crate::guardian::{Guardian, Reviewer};
use crate::models::{PerformResult, Reviewable, ReviewableStatus, TargetRef};
use crate::store::StoreTx;
use crate::subjects::{self, UserRecord, SYSTEM_ACTOR, USER_KIND};

pub struct UserApproval;

impl UserApproval {
    /// Queue a freshly signed-up user for approval. The record is created
    /// by the system actor and reviewable by any moderator.
    pub fn create_for(user: &UserRecord) -> Reviewable {
        let mut reviewable = Reviewable::new(USER_KIND, SYSTEM_ACTOR);
        reviewable.reviewable_by_moderator = true;
        reviewable.target = Some(user.target());
        reviewable
    }

    async fn locked_user(
        tx: &mut dyn StoreTx,
        target: &TargetRef,
    ) -> Result<UserRecord, Error> {
        let doc = tx
            .subject(target)
            .await?
            .ok_or_else(|| StoreError::MissingSubject {
                kind: target.kind.clone(),
                id: target.id,
            })?;
        Ok(UserRecord::from_doc(&doc)?)
    }

    async fn approve(
        &self,
        item: &Reviewable,
        performed_by: &Reviewer,
        tx: &mut dyn StoreTx,
    ) -> Result<PerformResult, Error> {
        let target = require_target(item)?;
        let mut user = Self::locked_user(tx, &target).await?;

        subjects::setup_approval(&mut user, performed_by.id);
        tx.put_subject(&target, user.to_doc()?).await?;

        Ok(PerformResult::success(ReviewableStatus::Approved))
    }

    async fn reject(
        &self,
        item: &Reviewable,
        _performed_by: &Reviewer,
        tx: &mut dyn StoreTx,
    ) -> Result<PerformResult, Error> {
        let target = require_target(item)?;
        let user = Self::locked_user(tx, &target).await?;

        if user.post_count > 0 {
            debug!(
                user = user.id,
                posts = user.post_count,
                "Rejection blocked, user has posts"
            );
            return Ok(PerformResult::failed());
        }

        tx.delete_subject(&target).await?;

        Ok(PerformResult::success(ReviewableStatus::Rejected))
    }
}

fn require_target(item: &Reviewable) -> Result<TargetRef, Error> {
    item.target.clone().ok_or_else(|| {
        Error::Store(StoreError::Corrupt(format!(
            "user reviewable {} has no target",
            item.id
        )))
    })
}

#[async_trait]
impl ReviewableType for UserApproval {
    fn kind(&self) -> &'static str {
        USER_KIND
    }

    fn handled_actions(&self) -> &'static [&'static str] {
        &["approve", "reject"]
    }

    fn flattened_target_fields(&self) -> &'static [&'static str] {
        &["username"]
    }

    fn build_actions(
        &self,
        item: &Reviewable,
        subject: Option<&Value>,
        guardian: &Guardian<'_>,
        actions: &mut ActionList,
    ) {
        if !item.is_pending() {
            return;
        }

        let Some(user) = subject.and_then(|doc| UserRecord::from_doc(doc).ok()) else {
            return;
        };

        if guardian.can_approve_user(&user) {
            actions.add("approve");
        }
        if guardian.can_remove_user(&user) {
            actions.add("reject");
        }
    }

    async fn perform(
        &self,
        action: &str,
        item: &Reviewable,
        performed_by: &Reviewer,
        tx: &mut dyn StoreTx,
    ) -> Result<PerformResult, Error> {
        match action {
            "approve" => self.approve(item, performed_by, tx).await,
            "reject" => self.reject(item, performed_by, tx).await,
            other => Err(Error::UnsupportedAction {
                kind: self.kind().to_string(),
                action: other.to_string(),
            }),
        }
    }
}
