pub mod user;

pub use user::UserApproval;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::actions::ActionList;
use crate::errors::Error;
use crate::guardian::{Guardian, Reviewer};
use crate::models::{PerformResult, Reviewable};
use crate::store::StoreTx;

/// Behavior contract for one reviewable kind: which actions it offers a
/// reviewer and how each one executes.
///
/// Implementations are expected to gate every offered action on both a
/// status check and a guardian capability check, and to keep
/// `handled_actions` in sync with the arms of `perform`; the queue
/// refuses anything outside that table before a transaction is opened.
#[async_trait]
pub trait ReviewableType: Send + Sync {
    /// Dispatch tag stored on [`Reviewable::kind`].
    fn kind(&self) -> &'static str;

    /// The handler table: action ids `perform` can execute.
    fn handled_actions(&self) -> &'static [&'static str];

    /// Subject fields the wire shape flattens into the item body.
    fn flattened_target_fields(&self) -> &'static [&'static str] {
        &[]
    }

    /// Offer actions on `item` to the guardian's reviewer. The default
    /// builder offers nothing.
    fn build_actions(
        &self,
        _item: &Reviewable,
        _subject: Option<&Value>,
        _guardian: &Guardian<'_>,
        _actions: &mut ActionList,
    ) {
    }

    /// Execute one handled action inside the perform transaction. A
    /// business-rule failure is reported through the result, not an error;
    /// returned errors roll the transaction back.
    async fn perform(
        &self,
        action: &str,
        item: &Reviewable,
        performed_by: &Reviewer,
        tx: &mut dyn StoreTx,
    ) -> Result<PerformResult, Error>;
}

/// The sealed set of item kinds this process knows about.
pub struct TypeRegistry {
    types: HashMap<&'static str, Arc<dyn ReviewableType>>,
}

impl TypeRegistry {
    /// An empty registry, for callers composing their own kind set.
    pub fn empty() -> Self {
        Self {
            types: HashMap::new(),
        }
    }

    /// Registry preloaded with the built-in kinds.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(UserApproval));
        registry
    }

    pub fn register(&mut self, rtype: Arc<dyn ReviewableType>) {
        self.types.insert(rtype.kind(), rtype);
    }

    pub fn get(&self, kind: &str) -> Option<&Arc<dyn ReviewableType>> {
        self.types.get(kind)
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
