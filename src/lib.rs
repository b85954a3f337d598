pub mod actions;
pub mod config;
pub mod errors;
pub mod guardian;
pub mod models;
pub mod queue;
pub mod store;
pub mod subjects;
pub mod types;
pub mod wire;

pub use actions::{Action, ActionList, ActionOverride};
pub use config::Config;
pub use errors::{Error, StoreError};
pub use guardian::{Guardian, Reviewer};
pub use models::{PerformResult, PerformStatus, Reviewable, ReviewableStatus, TargetRef};
pub use queue::{ReviewQueue, ReviewableView};
pub use store::{JsonStore, PostgresStore, Store, StoreTx};
pub use subjects::{setup_approval, UserRecord, SYSTEM_ACTOR, USER_KIND};
pub use types::{ReviewableType, TypeRegistry, UserApproval};
