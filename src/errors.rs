use thiserror::Error;

/// Faults surfaced by the review queue core.
#[derive(Debug, Error)]
pub enum Error {
    /// The reviewable does not exist or is hidden from the requester. The
    /// two causes are deliberately indistinguishable so callers cannot
    /// probe for hidden items.
    #[error("reviewable not found")]
    NotFound,

    /// The requester may not perform the action, or the action is not
    /// offered on the item in its current state.
    #[error("{0}")]
    NotAuthorized(String),

    /// The item type has no handler for the action. A configuration
    /// defect, surfaced as a denial rather than a crash.
    #[error("no handler for action `{action}` on reviewable kind `{kind}`")]
    UnsupportedAction { kind: String, action: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Faults raised by storage backends.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The row vanished between lookup and lock.
    #[error("reviewable no longer exists")]
    Gone,

    #[error("subject `{kind}/{id}` is missing")]
    MissingSubject { kind: String, id: i64 },

    /// A persisted record violates an invariant the code relies on.
    #[error("corrupt record: {0}")]
    Corrupt(String),

    #[error("I/O failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization failure: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("database failure: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration failure: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}
