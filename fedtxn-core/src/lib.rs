//! In-memory transaction coordinator for a federated query engine.
//!
//! A logical transaction may touch several independently implemented catalogs.
//! The coordinator lazily opens one backend transaction per catalog view, keeps
//! at most one catalog as the writer, and fans commit/abort out to every
//! participant once the transaction ends.
//!
//! This crate provides:
//! - `TransactionManager`: registry of live transactions, idle expiry, commit/abort
//! - `TransactionMetadata`: per-transaction state and the finishing fan-out
//! - `Connector` / `FunctionNamespaceManager`: backend collaborator traits
//! - `CatalogDirectory`: lookup of the catalogs a transaction may resolve
//! - `SharedTransactionState`: optional cluster-wide visibility of transaction ids

pub mod catalog;
pub mod config;
pub mod connector;
pub mod error;
pub mod function;
pub mod metrics;
pub mod security;
pub mod shared_state;
pub mod transaction;

#[cfg(test)]
pub(crate) mod testing;

pub use catalog::{Catalog, CatalogDirectory, CatalogManager, CatalogMetadata, CatalogName};
pub use config::CoordinatorConfig;
pub use connector::{
    Connector, ConnectorCapabilities, ConnectorMetadata, CoordinatorAwareConnector,
    TransactionHandle,
};
pub use error::{Result, TransactionError};
pub use function::FunctionNamespaceManager;
pub use shared_state::{InMemorySharedState, LocalOnly, SharedTransactionState};
pub use transaction::{
    FinishHandle, IsolationLevel, TransactionId, TransactionInfo, TransactionManager,
};
