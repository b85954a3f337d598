use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info};
use uuid::Uuid;

use super::{Store, StoreTx};
use crate::errors::StoreError;
use crate::models::{Reviewable, ReviewableStatus, TargetRef};

/// File-backed store for development and tests.
///
/// The whole state lives in one JSON file guarded by one async mutex, so
/// transactions serialize globally. The perform transaction snapshots the
/// state up front and restores it when dropped uncommitted; the file is
/// only rewritten on commit, via temp-file rename.
pub struct JsonStore {
    path: PathBuf,
    state: Arc<Mutex<State>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct State {
    reviewables: Vec<Reviewable>,
    subjects: HashMap<String, Value>,
}

fn subject_key(target: &TargetRef) -> String {
    format!("{}/{}", target.kind, target.id)
}

fn persist(path: &Path, state: &State) -> Result<(), StoreError> {
    let content = serde_json::to_string_pretty(state)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, content)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

impl JsonStore {
    pub fn new(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let state = if path.exists() {
            let content = fs::read_to_string(&path)?;
            serde_json::from_str(&content)?
        } else {
            State::default()
        };

        info!(path = %path.display(), "Initialized JSON store");

        Ok(Self {
            path,
            state: Arc::new(Mutex::new(state)),
        })
    }
}

#[async_trait]
impl Store for JsonStore {
    async fn create(&self, reviewable: &Reviewable) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state.reviewables.retain(|r| r.id != reviewable.id);
        state.reviewables.push(reviewable.clone());
        persist(&self.path, &state)?;

        debug!(id = %reviewable.id, "Saved reviewable");
        Ok(())
    }

    async fn fetch(&self, id: Uuid) -> Result<Option<Reviewable>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.reviewables.iter().find(|r| r.id == id).cloned())
    }

    async fn list(&self, status: ReviewableStatus) -> Result<Vec<Reviewable>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .reviewables
            .iter()
            .filter(|r| r.status == status)
            .cloned()
            .collect())
    }

    async fn subject(&self, target: &TargetRef) -> Result<Option<Value>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.subjects.get(&subject_key(target)).cloned())
    }

    async fn put_subject(&self, target: &TargetRef, doc: Value) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state.subjects.insert(subject_key(target), doc);
        persist(&self.path, &state)?;
        Ok(())
    }

    async fn begin(&self, id: Uuid) -> Result<Box<dyn StoreTx>, StoreError> {
        let guard = self.state.clone().lock_owned().await;

        let reviewable = guard
            .reviewables
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or(StoreError::Gone)?;

        let snapshot = guard.clone();

        Ok(Box::new(JsonTx {
            path: self.path.clone(),
            guard,
            snapshot: Some(snapshot),
            reviewable,
            committed: false,
        }))
    }
}

struct JsonTx {
    path: PathBuf,
    guard: OwnedMutexGuard<State>,
    snapshot: Option<State>,
    reviewable: Reviewable,
    committed: bool,
}

#[async_trait]
impl StoreTx for JsonTx {
    fn reviewable(&self) -> &Reviewable {
        &self.reviewable
    }

    async fn subject(&mut self, target: &TargetRef) -> Result<Option<Value>, StoreError> {
        Ok(self.guard.subjects.get(&subject_key(target)).cloned())
    }

    async fn put_subject(&mut self, target: &TargetRef, doc: Value) -> Result<(), StoreError> {
        self.guard.subjects.insert(subject_key(target), doc);
        Ok(())
    }

    async fn delete_subject(&mut self, target: &TargetRef) -> Result<(), StoreError> {
        self.guard.subjects.remove(&subject_key(target));
        Ok(())
    }

    async fn set_status(&mut self, to: ReviewableStatus) -> Result<(), StoreError> {
        let id = self.reviewable.id;
        let row = self
            .guard
            .reviewables
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(StoreError::Gone)?;

        row.status = to;
        row.updated_at = chrono::Utc::now();
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let mut this = self;
        persist(&this.path, &this.guard)?;
        this.committed = true;
        Ok(())
    }
}

impl Drop for JsonTx {
    fn drop(&mut self) {
        // Uncommitted writes never reached the file; undo the in-memory
        // ones before the lock is released.
        if !self.committed {
            if let Some(snapshot) = self.snapshot.take() {
                *self.guard = snapshot;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use tokio_test::block_on;

    fn sample_reviewable() -> Reviewable {
        let mut reviewable = Reviewable::new("user", -1);
        reviewable.reviewable_by_moderator = true;
        reviewable.target = Some(TargetRef {
            kind: "user".to_string(),
            id: 42,
        });
        reviewable
    }

    #[test]
    fn test_create_and_fetch() {
        let dir = tempdir().unwrap();
        let store = JsonStore::new(dir.path().join("queue.json")).unwrap();

        let reviewable = sample_reviewable();
        block_on(store.create(&reviewable)).unwrap();

        let loaded = block_on(store.fetch(reviewable.id)).unwrap().unwrap();
        assert_eq!(loaded.id, reviewable.id);
        assert_eq!(loaded.kind, "user");
        assert!(loaded.is_pending());
    }

    #[test]
    fn test_list_filters_by_status() {
        let dir = tempdir().unwrap();
        let store = JsonStore::new(dir.path().join("queue.json")).unwrap();

        let pending = sample_reviewable();
        let mut approved = sample_reviewable();
        approved.status = ReviewableStatus::Approved;

        block_on(store.create(&pending)).unwrap();
        block_on(store.create(&approved)).unwrap();

        let listed = block_on(store.list(ReviewableStatus::Pending)).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, pending.id);
    }

    #[test]
    fn test_subject_round_trip() {
        let dir = tempdir().unwrap();
        let store = JsonStore::new(dir.path().join("queue.json")).unwrap();

        let target = TargetRef {
            kind: "user".to_string(),
            id: 42,
        };
        let doc = serde_json::json!({ "id": 42, "username": "bandersnatch" });

        block_on(store.put_subject(&target, doc.clone())).unwrap();
        let loaded = block_on(store.subject(&target)).unwrap();
        assert_eq!(loaded, Some(doc));
    }

    #[test]
    fn test_begin_missing_row_is_gone() {
        let dir = tempdir().unwrap();
        let store = JsonStore::new(dir.path().join("queue.json")).unwrap();

        let result = block_on(store.begin(Uuid::new_v4()));
        assert!(matches!(result, Err(StoreError::Gone)));
    }

    #[test]
    fn test_uncommitted_transaction_rolls_back() {
        let dir = tempdir().unwrap();
        let store = JsonStore::new(dir.path().join("queue.json")).unwrap();

        let reviewable = sample_reviewable();
        let target = reviewable.target.clone().unwrap();
        block_on(store.create(&reviewable)).unwrap();

        {
            let mut tx = block_on(store.begin(reviewable.id)).unwrap();
            block_on(tx.put_subject(&target, serde_json::json!({ "id": 42 }))).unwrap();
            block_on(tx.set_status(ReviewableStatus::Approved)).unwrap();
            // Dropped without commit.
        }

        let loaded = block_on(store.fetch(reviewable.id)).unwrap().unwrap();
        assert!(loaded.is_pending());
        assert_eq!(block_on(store.subject(&target)).unwrap(), None);
    }

    #[test]
    fn test_committed_transaction_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("queue.json");

        let reviewable = sample_reviewable();
        {
            let store = JsonStore::new(&path).unwrap();
            block_on(store.create(&reviewable)).unwrap();

            let mut tx = block_on(store.begin(reviewable.id)).unwrap();
            block_on(tx.set_status(ReviewableStatus::Approved)).unwrap();
            block_on(tx.commit()).unwrap();
        }

        let reopened = JsonStore::new(&path).unwrap();
        let loaded = block_on(reopened.fetch(reviewable.id)).unwrap().unwrap();
        assert!(loaded.is_approved());
    }
}
