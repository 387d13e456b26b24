//! Cluster-wide visibility of transaction ids.
//!
//! Coordinators that share a state store publish every id they own, so a peer
//! that receives an id it does not hold can report it as foreign instead of
//! unknown. A single-node deployment uses [`LocalOnly`].

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use tracing::warn;

use crate::transaction::TransactionId;

const MAX_REMOVE_ATTEMPTS: usize = 3;

pub trait SharedTransactionState: Send + Sync {
    fn publish(&self, transaction_id: &TransactionId) -> anyhow::Result<()>;

    fn remove(&self, transaction_id: &TransactionId) -> anyhow::Result<()>;

    fn contains(&self, transaction_id: &TransactionId) -> anyhow::Result<bool>;
}

/// No shared state: every transaction is local.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalOnly;

impl SharedTransactionState for LocalOnly {
    fn publish(&self, _transaction_id: &TransactionId) -> anyhow::Result<()> {
        Ok(())
    }

    fn remove(&self, _transaction_id: &TransactionId) -> anyhow::Result<()> {
        Ok(())
    }

    fn contains(&self, _transaction_id: &TransactionId) -> anyhow::Result<bool> {
        Ok(false)
    }
}

/// Process-local stand-in for a shared store; clones observe the same ids.
#[derive(Debug, Clone, Default)]
pub struct InMemorySharedState {
    ids: Arc<RwLock<HashSet<TransactionId>>>,
}

impl InMemorySharedState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.ids
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SharedTransactionState for InMemorySharedState {
    fn publish(&self, transaction_id: &TransactionId) -> anyhow::Result<()> {
        self.ids
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(*transaction_id);
        Ok(())
    }

    fn remove(&self, transaction_id: &TransactionId) -> anyhow::Result<()> {
        self.ids
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(transaction_id);
        Ok(())
    }

    fn contains(&self, transaction_id: &TransactionId) -> anyhow::Result<bool> {
        Ok(self
            .ids
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains(transaction_id))
    }
}

/// Remove an id from shared state, retrying a bounded number of times.
///
/// Failures are logged and swallowed so the caller's commit or abort is never
/// interrupted by the state store.
pub(crate) fn remove_with_retry(
    state: &dyn SharedTransactionState,
    transaction_id: &TransactionId,
) -> bool {
    for attempt in 1..=MAX_REMOVE_ATTEMPTS {
        match state.remove(transaction_id) {
            Ok(()) => return true,
            Err(err) => warn!(
                transaction_id = %transaction_id,
                attempt,
                error = %err,
                "failed to remove transaction from shared state"
            ),
        }
    }
    false
}
