//! Transaction registry - owns every live transaction on this coordinator.
//!
//! The registry:
//! - Creates transactions and publishes their ids to shared state
//! - Resolves catalogs and enforces write policy through each record
//! - Removes a record exactly once on commit, abort or idle expiry
//! - Tells foreign ids apart from unknown ones in clustered deployments

use std::collections::{BTreeMap, HashMap};
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, RwLock, Weak};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::catalog::{CatalogDirectory, CatalogMetadata, CatalogName};
use crate::config::CoordinatorConfig;
use crate::connector::TransactionHandle;
use crate::error::{Result, TransactionError};
use crate::function::{FunctionNamespaceManager, FunctionNamespaceManagers};
use crate::metrics::{TransactionMetrics, TransactionMetricsSnapshot};
use crate::shared_state::{remove_with_retry, LocalOnly, SharedTransactionState};
use crate::transaction::executor::BoundedExecutor;
use crate::transaction::metadata::TransactionMetadata;
use crate::transaction::{FinishHandle, IsolationLevel, TransactionId, TransactionInfo};

/// Registry of live transactions
#[derive(Clone)]
pub struct TransactionManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    transactions: RwLock<HashMap<TransactionId, Arc<TransactionMetadata>>>,
    directory: Arc<dyn CatalogDirectory>,
    shared_state: Arc<dyn SharedTransactionState>,
    function_namespace_managers: FunctionNamespaceManagers,
    finishing_pool: Handle,
    idle_timeout: Duration,
    idle_check_interval: Duration,
    max_finishing_concurrency: usize,
    metrics: TransactionMetrics,
}

impl TransactionManager {
    /// Create a single-node transaction manager
    pub fn new(
        config: &CoordinatorConfig,
        directory: Arc<dyn CatalogDirectory>,
        finishing_pool: Handle,
    ) -> Result<Self> {
        Self::with_shared_state(config, directory, Arc::new(LocalOnly), finishing_pool)
    }

    #[instrument(skip_all)]
    pub fn with_shared_state(
        config: &CoordinatorConfig,
        directory: Arc<dyn CatalogDirectory>,
        shared_state: Arc<dyn SharedTransactionState>,
        finishing_pool: Handle,
    ) -> Result<Self> {
        config
            .validate()
            .map_err(|err| TransactionError::Config(err.to_string()))?;

        info!(
            idle_timeout_seconds = config.idle_timeout_seconds,
            idle_check_interval_seconds = config.idle_check_interval_seconds,
            max_finishing_concurrency = config.max_finishing_concurrency,
            "transaction manager initialized"
        );

        Ok(Self {
            inner: Arc::new(ManagerInner {
                transactions: RwLock::new(HashMap::new()),
                directory,
                shared_state,
                function_namespace_managers: FunctionNamespaceManagers::default(),
                finishing_pool,
                idle_timeout: config.idle_timeout(),
                idle_check_interval: config.idle_check_interval(),
                max_finishing_concurrency: config.max_finishing_concurrency,
                metrics: TransactionMetrics::new(),
            }),
        })
    }

    /// Begin a transaction with the default isolation level, read-write.
    pub fn begin_transaction(&self, auto_commit_context: bool) -> Result<TransactionId> {
        self.begin_transaction_with(IsolationLevel::DEFAULT, false, auto_commit_context)
    }

    #[instrument(skip(self))]
    pub fn begin_transaction_with(
        &self,
        isolation_level: IsolationLevel,
        read_only: bool,
        auto_commit_context: bool,
    ) -> Result<TransactionId> {
        let transaction_id = TransactionId::new();
        let executor = BoundedExecutor::new(
            self.inner.finishing_pool.clone(),
            self.inner.max_finishing_concurrency,
        );
        let metadata = Arc::new(TransactionMetadata::new(
            transaction_id,
            isolation_level,
            read_only,
            auto_commit_context,
            self.inner.directory.clone(),
            self.inner.function_namespace_managers.clone(),
            executor,
            self.inner.metrics.clone(),
        ));

        let active_transactions = {
            let mut transactions = self
                .inner
                .transactions
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if transactions.contains_key(&transaction_id) {
                return Err(TransactionError::IllegalState(format!(
                    "duplicate transaction ID: {transaction_id}"
                )));
            }
            transactions.insert(transaction_id, metadata);
            transactions.len()
        };
        if let Err(err) = self.inner.shared_state.publish(&transaction_id) {
            warn!(
                transaction_id = %transaction_id,
                error = %err,
                "failed to publish transaction to shared state"
            );
        }
        self.inner.metrics.record_begun();
        debug!(
            transaction_id = %transaction_id,
            active_transactions,
            "transaction started"
        );
        Ok(transaction_id)
    }

    pub fn transaction_exists(&self, transaction_id: &TransactionId) -> bool {
        self.try_get(transaction_id).is_some()
    }

    pub fn get_transaction_info(&self, transaction_id: &TransactionId) -> Result<TransactionInfo> {
        Ok(self.get(transaction_id)?.transaction_info())
    }

    /// Snapshots of every live transaction, oldest first.
    pub fn get_all_transaction_infos(&self) -> Vec<TransactionInfo> {
        let mut infos: Vec<TransactionInfo> = self
            .inner
            .transactions
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .values()
            .map(|metadata| metadata.transaction_info())
            .collect();
        infos.sort_by(|left, right| left.create_time.cmp(&right.create_time));
        infos
    }

    pub fn get_catalog_names(
        &self,
        transaction_id: &TransactionId,
    ) -> Result<BTreeMap<String, CatalogName>> {
        Ok(self.get(transaction_id)?.catalog_names())
    }

    /// Metadata for a catalog by its user-facing name, or `None` if it does not exist.
    ///
    /// A transaction owned by another coordinator also yields `None`.
    pub fn get_optional_catalog_metadata(
        &self,
        transaction_id: &TransactionId,
        catalog_name: &str,
    ) -> Result<Option<CatalogMetadata>> {
        let metadata = match self.get(transaction_id) {
            Ok(metadata) => metadata,
            Err(err @ TransactionError::ForeignTransaction(_)) => {
                warn!(
                    transaction_id = %transaction_id,
                    error = %err,
                    "catalog lookup for foreign transaction"
                );
                return Ok(None);
            }
            Err(err) => return Err(err),
        };
        metadata
            .connector_id(catalog_name)
            .map(|connector_id| metadata.catalog_metadata(&connector_id))
            .transpose()
    }

    pub fn get_catalog_metadata(
        &self,
        transaction_id: &TransactionId,
        catalog_name: &CatalogName,
    ) -> Result<CatalogMetadata> {
        self.get(transaction_id)?.catalog_metadata(catalog_name)
    }

    /// Resolve a view and claim it as this transaction's writer.
    pub fn get_catalog_metadata_for_write(
        &self,
        transaction_id: &TransactionId,
        catalog_name: &CatalogName,
    ) -> Result<CatalogMetadata> {
        let metadata = self.get(transaction_id)?;
        let catalog_metadata = metadata.catalog_metadata(catalog_name)?;
        if let Err(err) = metadata.check_connector_write(catalog_name) {
            if err.is_user_error() {
                self.inner.metrics.record_write_rejection();
            }
            debug!(
                transaction_id = %transaction_id,
                catalog = %catalog_name,
                error = %err,
                "write rejected"
            );
            return Err(err);
        }
        Ok(catalog_metadata)
    }

    pub fn get_catalog_metadata_for_write_by_name(
        &self,
        transaction_id: &TransactionId,
        catalog_name: &str,
    ) -> Result<CatalogMetadata> {
        let connector_id = self
            .get(transaction_id)?
            .connector_id(catalog_name)
            .ok_or_else(|| TransactionError::UnknownCatalog(catalog_name.to_string()))?;
        self.get_catalog_metadata_for_write(transaction_id, &connector_id)
    }

    pub fn get_connector_transaction(
        &self,
        transaction_id: &TransactionId,
        catalog_name: &CatalogName,
    ) -> Result<TransactionHandle> {
        self.get_catalog_metadata(transaction_id, catalog_name)?
            .transaction_handle_for(catalog_name)
    }

    pub fn register_function_namespace_manager(
        &self,
        namespace: &str,
        manager: Arc<dyn FunctionNamespaceManager>,
    ) -> Result<()> {
        let mut managers = self
            .inner
            .function_namespace_managers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if managers.contains_key(namespace) {
            return Err(TransactionError::DuplicateFunctionNamespace(
                namespace.to_string(),
            ));
        }
        managers.insert(namespace.to_string(), manager);
        info!(namespace, "function namespace manager registered");
        Ok(())
    }

    pub fn get_function_namespace_transaction(
        &self,
        transaction_id: &TransactionId,
        namespace: &str,
    ) -> Result<TransactionHandle> {
        self.get(transaction_id)?
            .function_namespace_transaction(namespace)
    }

    /// Mark the transaction active, failing if it has already finished.
    pub fn check_and_set_active(&self, transaction_id: &TransactionId) -> Result<()> {
        let metadata = self.get(transaction_id)?;
        metadata.check_open_transaction()?;
        metadata.set_active();
        Ok(())
    }

    pub fn try_set_active(&self, transaction_id: &TransactionId) {
        if let Some(metadata) = self.try_get(transaction_id) {
            metadata.set_active();
        }
    }

    pub fn try_set_inactive(&self, transaction_id: &TransactionId) {
        if let Some(metadata) = self.try_get(transaction_id) {
            metadata.set_inactive();
        }
    }

    /// Remove the transaction and commit it.
    ///
    /// A second commit or abort of the same id fails with `NoSuchTransaction`.
    #[instrument(skip(self))]
    pub fn async_commit(&self, transaction_id: &TransactionId) -> FinishHandle {
        match self.remove(transaction_id) {
            Ok(metadata) => {
                debug!(transaction_id = %transaction_id, "committing transaction");
                metadata.async_commit()
            }
            Err(err) => FinishHandle::ready(Err(err)),
        }
    }

    /// Remove the transaction and abort it.
    #[instrument(skip(self))]
    pub fn async_abort(&self, transaction_id: &TransactionId) -> FinishHandle {
        match self.remove(transaction_id) {
            Ok(metadata) => {
                debug!(transaction_id = %transaction_id, "aborting transaction");
                metadata.async_abort()
            }
            Err(err) => FinishHandle::ready(Err(err)),
        }
    }

    /// Abort in the background but keep the record, so later calls see it as aborted.
    #[instrument(skip(self))]
    pub fn fail(&self, transaction_id: &TransactionId) {
        if let Some(metadata) = self.try_get(transaction_id) {
            info!(transaction_id = %transaction_id, "failing transaction");
            drop(metadata.async_abort());
        }
    }

    /// Remove and abort every transaction idle for longer than the timeout.
    #[instrument(skip(self))]
    pub fn cleanup_expired_transactions(&self) -> usize {
        let expired: Vec<Arc<TransactionMetadata>> = {
            let mut transactions = self
                .inner
                .transactions
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            let expired_ids: Vec<TransactionId> = transactions
                .iter()
                .filter(|(_, metadata)| metadata.is_expired(self.inner.idle_timeout))
                .map(|(transaction_id, _)| *transaction_id)
                .collect();
            expired_ids
                .iter()
                .filter_map(|transaction_id| transactions.remove(transaction_id))
                .collect()
        };

        for metadata in &expired {
            remove_with_retry(self.inner.shared_state.as_ref(), metadata.transaction_id());
            info!(
                transaction_id = %metadata.transaction_id(),
                idle_duration = ?metadata.idle_duration(),
                "removing expired transaction"
            );
            self.inner.metrics.record_expired();
            drop(metadata.async_abort());
        }

        if !expired.is_empty() {
            info!(
                removed = expired.len(),
                active_transactions = self.active_transaction_count(),
                "cleaned up expired transactions"
            );
        }
        expired.len()
    }

    /// Spawn the periodic idle sweep; it stops once every manager handle is dropped.
    pub fn spawn_idle_sweeper(&self) -> JoinHandle<()> {
        let weak: Weak<ManagerInner> = Arc::downgrade(&self.inner);
        let interval = self.inner.idle_check_interval;
        self.inner.finishing_pool.spawn(async move {
            // The first tick fires immediately; skip it.
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    debug!("transaction manager dropped; stopping idle sweep");
                    return;
                };
                let manager = TransactionManager { inner };
                let sweep = std::panic::catch_unwind(AssertUnwindSafe(|| {
                    manager.cleanup_expired_transactions()
                }));
                if sweep.is_err() {
                    error!("unexpected panic while cleaning up expired transactions");
                }
            }
        })
    }

    pub fn active_transaction_count(&self) -> usize {
        self.inner
            .transactions
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn metrics(&self) -> TransactionMetricsSnapshot {
        self.inner.metrics.snapshot(self.active_transaction_count())
    }

    pub fn idle_timeout(&self) -> Duration {
        self.inner.idle_timeout
    }

    fn try_get(&self, transaction_id: &TransactionId) -> Option<Arc<TransactionMetadata>> {
        self.inner
            .transactions
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(transaction_id)
            .cloned()
    }

    fn get(&self, transaction_id: &TransactionId) -> Result<Arc<TransactionMetadata>> {
        if let Some(metadata) = self.try_get(transaction_id) {
            return Ok(metadata);
        }
        match self.inner.shared_state.contains(transaction_id) {
            Ok(true) => Err(TransactionError::ForeignTransaction(*transaction_id)),
            Ok(false) => Err(TransactionError::NoSuchTransaction(*transaction_id)),
            Err(err) => {
                warn!(
                    transaction_id = %transaction_id,
                    error = %err,
                    "failed to query shared state for transaction"
                );
                Err(TransactionError::NoSuchTransaction(*transaction_id))
            }
        }
    }

    fn remove(&self, transaction_id: &TransactionId) -> Result<Arc<TransactionMetadata>> {
        let removed = self
            .inner
            .transactions
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(transaction_id);
        match removed {
            Some(metadata) => {
                remove_with_retry(self.inner.shared_state.as_ref(), transaction_id);
                Ok(metadata)
            }
            None => Err(TransactionError::NoSuchTransaction(*transaction_id)),
        }
    }
}
