use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::connector::TransactionHandle;

/// Pluggable function catalog that takes part in transactions.
pub trait FunctionNamespaceManager: Send + Sync {
    fn begin_transaction(&self) -> anyhow::Result<TransactionHandle>;

    fn commit(&self, handle: &TransactionHandle) -> anyhow::Result<()>;

    fn abort(&self, handle: &TransactionHandle) -> anyhow::Result<()>;
}

/// Namespace managers by catalog name, shared by the registry and every transaction.
pub(crate) type FunctionNamespaceManagers =
    Arc<RwLock<HashMap<String, Arc<dyn FunctionNamespaceManager>>>>;
