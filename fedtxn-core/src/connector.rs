//! Backend connector collaborator.
//!
//! A connector owns the real transactions of one data source. The coordinator
//! never looks inside a [`TransactionHandle`]; it only hands it back to the
//! connector that produced it.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::transaction::{IsolationLevel, TransactionId};

/// Opaque, cheaply clonable handle to a backend transaction.
#[derive(Clone)]
pub struct TransactionHandle(Arc<dyn Any + Send + Sync>);

impl TransactionHandle {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Arc::new(value))
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }

    /// Whether both handles refer to the same backend transaction.
    pub fn ptr_eq(&self, other: &TransactionHandle) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for TransactionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TransactionHandle(..)")
    }
}

/// Metadata view a connector exposes for one of its transactions.
pub trait ConnectorMetadata: Send + Sync {
    fn as_any(&self) -> &dyn Any;
}

/// Capabilities a connector declares up front.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConnectorCapabilities {
    pub supports_writes: bool,
    /// Writes are only allowed when each statement runs in its own transaction.
    pub single_statement_writes_only: bool,
}

impl ConnectorCapabilities {
    pub fn read_only() -> Self {
        Self::default()
    }

    pub fn writable() -> Self {
        Self {
            supports_writes: true,
            ..Self::default()
        }
    }

    pub fn autocommit_writes_only() -> Self {
        Self {
            supports_writes: true,
            single_statement_writes_only: true,
            ..Self::default()
        }
    }
}

pub trait Connector: Send + Sync {
    fn begin_transaction(
        &self,
        isolation_level: IsolationLevel,
        read_only: bool,
    ) -> anyhow::Result<TransactionHandle>;

    fn metadata(&self, handle: &TransactionHandle) -> anyhow::Result<Arc<dyn ConnectorMetadata>>;

    fn commit(&self, handle: &TransactionHandle) -> anyhow::Result<()>;

    fn rollback(&self, handle: &TransactionHandle) -> anyhow::Result<()>;

    /// Read-only unless the connector says otherwise.
    fn capabilities(&self) -> ConnectorCapabilities {
        ConnectorCapabilities::default()
    }

    /// Connectors that can scope their transaction by the logical id return `Some`.
    fn coordinator_aware(&self) -> Option<&dyn CoordinatorAwareConnector> {
        None
    }
}

/// Extended begin for connectors that track the coordinator's transaction id.
pub trait CoordinatorAwareConnector: Send + Sync {
    fn begin_transaction(
        &self,
        transaction_id: &TransactionId,
        isolation_level: IsolationLevel,
        read_only: bool,
    ) -> anyhow::Result<TransactionHandle>;
}

/// Begin a backend transaction, passing the logical id when the connector accepts it.
pub(crate) fn begin_connector_transaction(
    connector: &dyn Connector,
    transaction_id: &TransactionId,
    isolation_level: IsolationLevel,
    read_only: bool,
) -> anyhow::Result<TransactionHandle> {
    match connector.coordinator_aware() {
        Some(aware) => aware.begin_transaction(transaction_id, isolation_level, read_only),
        None => connector.begin_transaction(isolation_level, read_only),
    }
}
