use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

use crate::actions::ActionList;
use crate::errors::{Error, StoreError};
use crate::guardian::{Guardian, Reviewer};
use crate::models::{PerformResult, Reviewable, ReviewableStatus};
use crate::store::Store;
use crate::types::{ReviewableType, TypeRegistry};

/// A reviewable joined with its prefetched subject document and the
/// actions offered to the requesting reviewer.
#[derive(Debug, Clone)]
pub struct ReviewableView {
    pub reviewable: Reviewable,
    pub subject: Option<Value>,
    pub actions: ActionList,
}

/// The review queue: visibility, action resolution, and the perform
/// state-transition protocol over a storage backend.
pub struct ReviewQueue {
    store: Arc<dyn Store>,
    registry: TypeRegistry,
}

impl ReviewQueue {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self::with_registry(store, TypeRegistry::builtin())
    }

    pub fn with_registry(store: Arc<dyn Store>, registry: TypeRegistry) -> Self {
        Self { store, registry }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    /// Persist a new reviewable (the collaborator creation hook).
    pub async fn create(&self, reviewable: Reviewable) -> Result<Reviewable, Error> {
        self.store.create(&reviewable).await?;
        info!(id = %reviewable.id, kind = %reviewable.kind, "Queued reviewable");
        Ok(reviewable)
    }

    /// Items with the given status that the reviewer may see, subjects
    /// eagerly resolved. Anonymous callers get an empty list.
    pub async fn list_for(
        &self,
        reviewer: Option<&Reviewer>,
        status: ReviewableStatus,
    ) -> Result<Vec<ReviewableView>, Error> {
        let Some(reviewer) = reviewer else {
            return Ok(Vec::new());
        };
        let guardian = Guardian::new(reviewer);

        let mut views = Vec::new();
        for reviewable in self.store.list(status).await? {
            if !guardian.can_see(&reviewable) {
                continue;
            }
            let subject = self.resolve_subject(&reviewable).await?;
            let actions = self.build_actions(&reviewable, subject.as_ref(), &guardian);
            views.push(ReviewableView {
                reviewable,
                subject,
                actions,
            });
        }

        debug!(
            reviewer = reviewer.id,
            status = status.as_str(),
            count = views.len(),
            "Listed reviewables"
        );

        Ok(views)
    }

    /// Actions currently offered on one item to one reviewer.
    pub async fn actions_for(&self, reviewer: &Reviewer, id: Uuid) -> Result<ActionList, Error> {
        let reviewable = self.visible_reviewable(reviewer, id).await?;
        let subject = self.resolve_subject(&reviewable).await?;
        Ok(self.build_actions(&reviewable, subject.as_ref(), &Guardian::new(reviewer)))
    }

    /// Execute a named action on a reviewable.
    ///
    /// Authorization and dispatch are checked before any write: the action
    /// must be offered to this reviewer in the item's current state, and
    /// the item type must have a handler for it. The handler then runs
    /// inside a single storage transaction together with the status
    /// transition it requests; an error on any step rolls the whole call
    /// back. The handler's result is returned unchanged.
    pub async fn perform(
        &self,
        performed_by: Option<&Reviewer>,
        id: Uuid,
        action: &str,
    ) -> Result<PerformResult, Error> {
        let actor = performed_by.ok_or_else(|| {
            Error::NotAuthorized("anonymous callers cannot perform actions".to_string())
        })?;

        let reviewable = self.visible_reviewable(actor, id).await?;

        let rtype = self
            .registry
            .get(&reviewable.kind)
            .ok_or_else(|| Error::UnsupportedAction {
                kind: reviewable.kind.clone(),
                action: action.to_string(),
            })?;

        // Authorize: the action must be offered to this reviewer in the
        // item's current state.
        let guardian = Guardian::new(actor);
        let subject = self.resolve_subject(&reviewable).await?;
        let offered = self.build_actions(&reviewable, subject.as_ref(), &guardian);
        if !offered.has(action) {
            return Err(Error::NotAuthorized(format!(
                "`{action}` is not available on reviewable {id}"
            )));
        }

        // Dispatch: missing handler entries are configuration defects,
        // refused before any write.
        if !rtype.handled_actions().iter().any(|a| *a == action) {
            return Err(Error::UnsupportedAction {
                kind: reviewable.kind.clone(),
                action: action.to_string(),
            });
        }

        let mut tx = self.store.begin(id).await.map_err(|e| match e {
            StoreError::Gone => Error::NotFound,
            other => Error::Store(other),
        })?;

        // The offered set is status-gated; if the row moved since the
        // check above, a concurrent perform won the race.
        let locked = tx.reviewable().clone();
        if locked.status != reviewable.status {
            return Err(Error::NotAuthorized(format!(
                "`{action}` is no longer available on reviewable {id}"
            )));
        }

        let result = rtype.perform(action, &locked, actor, tx.as_mut()).await?;

        if result.is_success() {
            if let Some(to) = result.transition_to {
                tx.set_status(to).await?;
            }
        }
        tx.commit().await?;

        info!(
            id = %id,
            action,
            actor = actor.id,
            success = result.is_success(),
            transition = ?result.transition_to.map(|s| s.as_str()),
            "Performed reviewable action"
        );

        Ok(result)
    }

    async fn visible_reviewable(
        &self,
        reviewer: &Reviewer,
        id: Uuid,
    ) -> Result<Reviewable, Error> {
        let reviewable = self.store.fetch(id).await?.ok_or(Error::NotFound)?;

        // Hidden items are reported exactly like missing ones.
        if !Guardian::new(reviewer).can_see(&reviewable) {
            return Err(Error::NotFound);
        }

        Ok(reviewable)
    }

    async fn resolve_subject(&self, reviewable: &Reviewable) -> Result<Option<Value>, Error> {
        match &reviewable.target {
            Some(target) => Ok(self.store.subject(target).await?),
            None => Ok(None),
        }
    }

    fn build_actions(
        &self,
        reviewable: &Reviewable,
        subject: Option<&Value>,
        guardian: &Guardian<'_>,
    ) -> ActionList {
        let mut actions = ActionList::new(&reviewable.kind);
        if let Some(rtype) = self.registry.get(&reviewable.kind) {
            rtype.build_actions(reviewable, subject, guardian, &mut actions);
        }
        actions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PerformStatus;
    use crate::store::{JsonStore, StoreTx};
    use crate::subjects::UserRecord;
    use crate::types::UserApproval;
    use async_trait::async_trait;
    use tempfile::tempdir;

    fn moderator() -> Reviewer {
        Reviewer {
            id: 100,
            moderator: true,
            ..Default::default()
        }
    }

    fn admin() -> Reviewer {
        Reviewer {
            id: 101,
            admin: true,
            ..Default::default()
        }
    }

    fn plain_user() -> Reviewer {
        Reviewer {
            id: 102,
            ..Default::default()
        }
    }

    fn group_member(group: i64) -> Reviewer {
        Reviewer {
            id: 103,
            groups: vec![group],
            ..Default::default()
        }
    }

    fn queue_in(dir: &tempfile::TempDir) -> ReviewQueue {
        let store = JsonStore::new(dir.path().join("queue.json")).unwrap();
        ReviewQueue::new(Arc::new(store))
    }

    async fn seed_user(queue: &ReviewQueue, id: i64, post_count: i64) -> (UserRecord, Reviewable) {
        let mut user = UserRecord::new(id, "bandersnatch");
        user.post_count = post_count;
        queue
            .store()
            .put_subject(&user.target(), user.to_doc().unwrap())
            .await
            .unwrap();

        let reviewable = queue
            .create(UserApproval::create_for(&user))
            .await
            .unwrap();

        (user, reviewable)
    }

    #[tokio::test]
    async fn test_list_for_anonymous_is_empty() {
        let dir = tempdir().unwrap();
        let queue = queue_in(&dir);
        seed_user(&queue, 42, 0).await;

        let views = queue
            .list_for(None, ReviewableStatus::Pending)
            .await
            .unwrap();
        assert!(views.is_empty());
    }

    #[tokio::test]
    async fn test_list_for_respects_moderator_flag() {
        let dir = tempdir().unwrap();
        let queue = queue_in(&dir);
        seed_user(&queue, 42, 0).await;

        let for_plain = queue
            .list_for(Some(&plain_user()), ReviewableStatus::Pending)
            .await
            .unwrap();
        assert!(for_plain.is_empty());

        let for_moderator = queue
            .list_for(Some(&moderator()), ReviewableStatus::Pending)
            .await
            .unwrap();
        assert_eq!(for_moderator.len(), 1);

        let for_admin = queue
            .list_for(Some(&admin()), ReviewableStatus::Pending)
            .await
            .unwrap();
        assert_eq!(for_admin.len(), 1);
    }

    #[tokio::test]
    async fn test_list_for_respects_group_grant() {
        let dir = tempdir().unwrap();
        let queue = queue_in(&dir);

        let user = UserRecord::new(42, "bandersnatch");
        queue
            .store()
            .put_subject(&user.target(), user.to_doc().unwrap())
            .await
            .unwrap();

        let mut reviewable = UserApproval::create_for(&user);
        reviewable.reviewable_by_moderator = false;
        reviewable.reviewable_by_group = Some(7);
        queue.create(reviewable).await.unwrap();

        // A moderator outside the group is not covered by a group grant.
        let for_moderator = queue
            .list_for(Some(&moderator()), ReviewableStatus::Pending)
            .await
            .unwrap();
        assert!(for_moderator.is_empty());

        let for_member = queue
            .list_for(Some(&group_member(7)), ReviewableStatus::Pending)
            .await
            .unwrap();
        assert_eq!(for_member.len(), 1);

        let for_admin = queue
            .list_for(Some(&admin()), ReviewableStatus::Pending)
            .await
            .unwrap();
        assert_eq!(for_admin.len(), 1);
    }

    #[tokio::test]
    async fn test_list_prefetches_subject_and_actions() {
        let dir = tempdir().unwrap();
        let queue = queue_in(&dir);
        seed_user(&queue, 42, 0).await;

        let views = queue
            .list_for(Some(&moderator()), ReviewableStatus::Pending)
            .await
            .unwrap();

        let view = &views[0];
        assert!(view.subject.is_some());
        assert!(view.actions.has("approve"));
        assert!(view.actions.has("reject"));
    }

    #[tokio::test]
    async fn test_payload_round_trip() {
        let dir = tempdir().unwrap();
        let queue = queue_in(&dir);

        let user = UserRecord::new(42, "bandersnatch");
        let mut reviewable = UserApproval::create_for(&user);
        reviewable.payload = serde_json::json!({
            "list": [1, 2, 3],
            "name": "bandersnatch",
        })
        .as_object()
        .unwrap()
        .clone();

        let created = queue.create(reviewable).await.unwrap();
        let loaded = queue.store().fetch(created.id).await.unwrap().unwrap();

        assert_eq!(loaded.payload["name"], "bandersnatch");
        assert_eq!(loaded.payload["list"], serde_json::json!([1, 2, 3]));

        // And no payload surfaces as an empty mapping, never null.
        let (_, bare) = seed_user(&queue, 43, 0).await;
        let loaded = queue.store().fetch(bare.id).await.unwrap().unwrap();
        assert!(loaded.payload.is_empty());
    }

    #[tokio::test]
    async fn test_approve_flow() {
        let dir = tempdir().unwrap();
        let queue = queue_in(&dir);
        let (user, reviewable) = seed_user(&queue, 42, 0).await;
        let reviewer = moderator();

        let offered = queue.actions_for(&reviewer, reviewable.id).await.unwrap();
        assert!(offered.has("approve"));
        assert!(offered.has("reject"));

        let result = queue
            .perform(Some(&reviewer), reviewable.id, "approve")
            .await
            .unwrap();
        assert!(result.is_success());
        assert_eq!(result.transition_to, Some(ReviewableStatus::Approved));

        let loaded = queue.store().fetch(reviewable.id).await.unwrap().unwrap();
        assert!(loaded.is_approved());

        let doc = queue.store().subject(&user.target()).await.unwrap().unwrap();
        let approved = UserRecord::from_doc(&doc).unwrap();
        assert!(approved.approved);
        assert_eq!(approved.approved_by, Some(reviewer.id));
        assert!(approved.approved_at.is_some());
    }

    #[tokio::test]
    async fn test_second_approve_is_denied_not_reexecuted() {
        let dir = tempdir().unwrap();
        let queue = queue_in(&dir);
        let (_, reviewable) = seed_user(&queue, 42, 0).await;
        let reviewer = moderator();

        queue
            .perform(Some(&reviewer), reviewable.id, "approve")
            .await
            .unwrap();

        // The action list no longer offers approve once decided.
        let offered = queue.actions_for(&reviewer, reviewable.id).await.unwrap();
        assert!(!offered.has("approve"));

        let second = queue
            .perform(Some(&reviewer), reviewable.id, "approve")
            .await;
        assert!(matches!(second, Err(Error::NotAuthorized(_))));
    }

    #[tokio::test]
    async fn test_reject_flow_removes_subject() {
        let dir = tempdir().unwrap();
        let queue = queue_in(&dir);
        let (user, reviewable) = seed_user(&queue, 42, 0).await;

        let result = queue
            .perform(Some(&moderator()), reviewable.id, "reject")
            .await
            .unwrap();
        assert!(result.is_success());
        assert_eq!(result.transition_to, Some(ReviewableStatus::Rejected));

        let loaded = queue.store().fetch(reviewable.id).await.unwrap().unwrap();
        assert!(loaded.is_rejected());

        // Rejecting deletes the user record; the reviewable itself stays.
        assert_eq!(queue.store().subject(&user.target()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_reject_blocked_by_posts_keeps_pending() {
        let dir = tempdir().unwrap();
        let queue = queue_in(&dir);
        let (user, reviewable) = seed_user(&queue, 42, 3).await;

        let result = queue
            .perform(Some(&moderator()), reviewable.id, "reject")
            .await
            .unwrap();
        assert_eq!(result.status, PerformStatus::Failed);
        assert_eq!(result.transition_to, None);

        let loaded = queue.store().fetch(reviewable.id).await.unwrap().unwrap();
        assert!(loaded.is_pending());
        assert!(queue.store().subject(&user.target()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_perform_anonymous_is_denied() {
        let dir = tempdir().unwrap();
        let queue = queue_in(&dir);
        let (_, reviewable) = seed_user(&queue, 42, 0).await;

        let result = queue.perform(None, reviewable.id, "approve").await;
        assert!(matches!(result, Err(Error::NotAuthorized(_))));
    }

    #[tokio::test]
    async fn test_perform_on_hidden_item_is_not_found() {
        let dir = tempdir().unwrap();
        let queue = queue_in(&dir);
        let (_, reviewable) = seed_user(&queue, 42, 0).await;

        let result = queue
            .perform(Some(&plain_user()), reviewable.id, "approve")
            .await;
        assert!(matches!(result, Err(Error::NotFound)));
    }

    #[tokio::test]
    async fn test_perform_on_missing_item_is_not_found() {
        let dir = tempdir().unwrap();
        let queue = queue_in(&dir);

        let result = queue
            .perform(Some(&admin()), Uuid::new_v4(), "approve")
            .await;
        assert!(matches!(result, Err(Error::NotFound)));
    }

    #[tokio::test]
    async fn test_perform_unoffered_action_is_denied() {
        let dir = tempdir().unwrap();
        let queue = queue_in(&dir);
        let (_, reviewable) = seed_user(&queue, 42, 0).await;

        let result = queue
            .perform(Some(&moderator()), reviewable.id, "escalate")
            .await;
        assert!(matches!(result, Err(Error::NotAuthorized(_))));
    }

    /// Offers an action its handler table cannot execute, to exercise the
    /// dispatch defect path.
    struct Miswired;

    #[async_trait]
    impl ReviewableType for Miswired {
        fn kind(&self) -> &'static str {
            "miswired"
        }

        fn handled_actions(&self) -> &'static [&'static str] {
            &[]
        }

        fn build_actions(
            &self,
            item: &Reviewable,
            _subject: Option<&serde_json::Value>,
            _guardian: &Guardian<'_>,
            actions: &mut ActionList,
        ) {
            if item.is_pending() {
                actions.add("escalate");
            }
        }

        async fn perform(
            &self,
            action: &str,
            _item: &Reviewable,
            _performed_by: &Reviewer,
            _tx: &mut dyn StoreTx,
        ) -> Result<PerformResult, Error> {
            Err(Error::UnsupportedAction {
                kind: "miswired".to_string(),
                action: action.to_string(),
            })
        }
    }

    #[tokio::test]
    async fn test_missing_handler_is_unsupported_action() {
        let dir = tempdir().unwrap();
        let store = JsonStore::new(dir.path().join("queue.json")).unwrap();
        let mut registry = TypeRegistry::builtin();
        registry.register(Arc::new(Miswired));
        let queue = ReviewQueue::with_registry(Arc::new(store), registry);

        let mut reviewable = Reviewable::new("miswired", -1);
        reviewable.reviewable_by_moderator = true;
        let reviewable = queue.create(reviewable).await.unwrap();

        let result = queue
            .perform(Some(&moderator()), reviewable.id, "escalate")
            .await;
        assert!(matches!(result, Err(Error::UnsupportedAction { .. })));
    }

    /// Writes to the subject store and then fails, to exercise rollback.
    struct Exploding;

    #[async_trait]
    impl ReviewableType for Exploding {
        fn kind(&self) -> &'static str {
            "exploding"
        }

        fn handled_actions(&self) -> &'static [&'static str] {
            &["detonate"]
        }

        fn build_actions(
            &self,
            item: &Reviewable,
            _subject: Option<&serde_json::Value>,
            _guardian: &Guardian<'_>,
            actions: &mut ActionList,
        ) {
            if item.is_pending() {
                actions.add("detonate");
            }
        }

        async fn perform(
            &self,
            _action: &str,
            _item: &Reviewable,
            _performed_by: &Reviewer,
            tx: &mut dyn StoreTx,
        ) -> Result<PerformResult, Error> {
            let target = crate::models::TargetRef {
                kind: "debris".to_string(),
                id: 1,
            };
            tx.put_subject(&target, serde_json::json!({ "written": true }))
                .await?;
            Err(Error::Store(StoreError::Corrupt(
                "handler blew up mid-write".to_string(),
            )))
        }
    }

    #[tokio::test]
    async fn test_handler_error_rolls_back_writes() {
        let dir = tempdir().unwrap();
        let store = JsonStore::new(dir.path().join("queue.json")).unwrap();
        let mut registry = TypeRegistry::builtin();
        registry.register(Arc::new(Exploding));
        let queue = ReviewQueue::with_registry(Arc::new(store), registry);

        let mut reviewable = Reviewable::new("exploding", -1);
        reviewable.reviewable_by_moderator = true;
        let reviewable = queue.create(reviewable).await.unwrap();

        let result = queue
            .perform(Some(&moderator()), reviewable.id, "detonate")
            .await;
        assert!(matches!(result, Err(Error::Store(_))));

        // The handler's write must not survive, and the status must not
        // have moved.
        let debris = crate::models::TargetRef {
            kind: "debris".to_string(),
            id: 1,
        };
        assert_eq!(queue.store().subject(&debris).await.unwrap(), None);

        let loaded = queue.store().fetch(reviewable.id).await.unwrap().unwrap();
        assert!(loaded.is_pending());
    }

    #[tokio::test]
    async fn test_unregistered_kind_is_unsupported() {
        let dir = tempdir().unwrap();
        let queue = queue_in(&dir);

        let mut reviewable = Reviewable::new("unknown", -1);
        reviewable.reviewable_by_moderator = true;
        let reviewable = queue.create(reviewable).await.unwrap();

        let result = queue
            .perform(Some(&moderator()), reviewable.id, "approve")
            .await;
        assert!(matches!(result, Err(Error::UnsupportedAction { .. })));

        // Listing still works; the unknown kind just offers no actions.
        let views = queue
            .list_for(Some(&moderator()), ReviewableStatus::Pending)
            .await
            .unwrap();
        assert_eq!(views.len(), 1);
        assert!(views[0].actions.is_empty());
    }
}
