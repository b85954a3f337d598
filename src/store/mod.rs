pub mod json;
pub mod postgres;

pub use json::JsonStore;
pub use postgres::PostgresStore;

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use crate::errors::StoreError;
use crate::models::{Reviewable, ReviewableStatus, TargetRef};

/// Persistence seam for reviewables and their subject documents.
#[async_trait]
pub trait Store: Send + Sync {
    /// Persist a new reviewable, replacing any record with the same id.
    async fn create(&self, reviewable: &Reviewable) -> Result<(), StoreError>;

    async fn fetch(&self, id: Uuid) -> Result<Option<Reviewable>, StoreError>;

    /// All reviewables with the given status, oldest first.
    async fn list(&self, status: ReviewableStatus) -> Result<Vec<Reviewable>, StoreError>;

    /// Read a subject document outside any transaction (list prefetch).
    async fn subject(&self, target: &TargetRef) -> Result<Option<Value>, StoreError>;

    /// Create or replace a subject document (seeding collaborators).
    async fn put_subject(&self, target: &TargetRef, doc: Value) -> Result<(), StoreError>;

    /// Open the perform transaction for one reviewable. The returned
    /// handle holds a write lock on the row; dropping it without `commit`
    /// rolls back every write made through it. Fails with
    /// [`StoreError::Gone`] when the row no longer exists.
    async fn begin(&self, id: Uuid) -> Result<Box<dyn StoreTx>, StoreError>;
}

/// Write handle scoped to one `perform` call.
#[async_trait]
pub trait StoreTx: Send {
    /// The locked reviewable row as of transaction start.
    fn reviewable(&self) -> &Reviewable;

    async fn subject(&mut self, target: &TargetRef) -> Result<Option<Value>, StoreError>;

    async fn put_subject(&mut self, target: &TargetRef, doc: Value) -> Result<(), StoreError>;

    async fn delete_subject(&mut self, target: &TargetRef) -> Result<(), StoreError>;

    /// Move the locked row to `to`, refreshing `updated_at`.
    async fn set_status(&mut self, to: ReviewableStatus) -> Result<(), StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}
