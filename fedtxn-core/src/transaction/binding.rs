//! Per-participant transaction bindings.
//!
//! A binding holds one backend transaction opened on behalf of a logical
//! transaction. Its `finished` flag makes commit and abort single-shot: only
//! the caller that flips the flag reaches the backend.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::catalog::CatalogName;
use crate::connector::{
    begin_connector_transaction, Connector, ConnectorCapabilities, ConnectorMetadata,
    TransactionHandle,
};
use crate::error::{Result, TransactionError};
use crate::function::FunctionNamespaceManager;
use crate::transaction::{IsolationLevel, TransactionId};

/// Anything that takes part in the commit/abort fan-out.
pub(crate) trait Participant: Send + Sync {
    fn commit(&self) -> Result<()>;

    fn abort(&self) -> Result<()>;

    fn describe(&self) -> String;
}

pub(crate) struct ConnectorTransactionBinding {
    catalog_name: CatalogName,
    connector: Arc<dyn Connector>,
    handle: TransactionHandle,
    metadata: Arc<dyn ConnectorMetadata>,
    finished: AtomicBool,
}

impl ConnectorTransactionBinding {
    pub(crate) fn begin(
        catalog_name: CatalogName,
        connector: Arc<dyn Connector>,
        transaction_id: &TransactionId,
        isolation_level: IsolationLevel,
        read_only: bool,
    ) -> Result<Self> {
        let handle = begin_connector_transaction(
            connector.as_ref(),
            transaction_id,
            isolation_level,
            read_only,
        )
        .map_err(|source| TransactionError::Connector {
            catalog: catalog_name.clone(),
            source,
        })?;

        let metadata = match connector.metadata(&handle) {
            Ok(metadata) => metadata,
            Err(source) => {
                if let Err(err) = connector.rollback(&handle) {
                    warn!(
                        transaction_id = %transaction_id,
                        catalog = %catalog_name,
                        error = %err,
                        "failed to roll back connector transaction after metadata error"
                    );
                }
                return Err(TransactionError::Connector {
                    catalog: catalog_name,
                    source,
                });
            }
        };

        debug!(
            transaction_id = %transaction_id,
            catalog = %catalog_name,
            "connector transaction started"
        );

        Ok(Self {
            catalog_name,
            connector,
            handle,
            metadata,
            finished: AtomicBool::new(false),
        })
    }

    pub(crate) fn catalog_name(&self) -> &CatalogName {
        &self.catalog_name
    }

    pub(crate) fn capabilities(&self) -> ConnectorCapabilities {
        self.connector.capabilities()
    }

    pub(crate) fn connector_metadata(&self) -> Result<Arc<dyn ConnectorMetadata>> {
        self.check_not_finished()?;
        Ok(self.metadata.clone())
    }

    pub(crate) fn transaction_handle(&self) -> Result<TransactionHandle> {
        self.check_not_finished()?;
        Ok(self.handle.clone())
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    fn check_not_finished(&self) -> Result<()> {
        if self.is_finished() {
            return Err(TransactionError::IllegalState(format!(
                "transaction for catalog {} already finished",
                self.catalog_name
            )));
        }
        Ok(())
    }

    fn claim_finish(&self) -> bool {
        self.finished
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn connector_error(&self, source: anyhow::Error) -> TransactionError {
        TransactionError::Connector {
            catalog: self.catalog_name.clone(),
            source,
        }
    }
}

impl Participant for ConnectorTransactionBinding {
    fn commit(&self) -> Result<()> {
        if !self.claim_finish() {
            return Ok(());
        }
        self.connector
            .commit(&self.handle)
            .map_err(|source| self.connector_error(source))
    }

    fn abort(&self) -> Result<()> {
        if !self.claim_finish() {
            return Ok(());
        }
        self.connector
            .rollback(&self.handle)
            .map_err(|source| self.connector_error(source))
    }

    fn describe(&self) -> String {
        format!("catalog {}", self.catalog_name)
    }
}

pub(crate) struct FunctionNamespaceTransactionBinding {
    namespace: String,
    manager: Arc<dyn FunctionNamespaceManager>,
    handle: TransactionHandle,
    finished: AtomicBool,
}

impl FunctionNamespaceTransactionBinding {
    pub(crate) fn begin(
        namespace: &str,
        manager: Arc<dyn FunctionNamespaceManager>,
    ) -> Result<Self> {
        let handle = manager
            .begin_transaction()
            .map_err(|source| TransactionError::FunctionNamespace {
                namespace: namespace.to_string(),
                source,
            })?;
        Ok(Self {
            namespace: namespace.to_string(),
            manager,
            handle,
            finished: AtomicBool::new(false),
        })
    }

    pub(crate) fn transaction_handle(&self) -> TransactionHandle {
        self.handle.clone()
    }

    fn claim_finish(&self) -> bool {
        self.finished
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn namespace_error(&self, source: anyhow::Error) -> TransactionError {
        TransactionError::FunctionNamespace {
            namespace: self.namespace.clone(),
            source,
        }
    }
}

impl Participant for FunctionNamespaceTransactionBinding {
    fn commit(&self) -> Result<()> {
        if !self.claim_finish() {
            return Ok(());
        }
        self.manager
            .commit(&self.handle)
            .map_err(|source| self.namespace_error(source))
    }

    fn abort(&self) -> Result<()> {
        if !self.claim_finish() {
            return Ok(());
        }
        self.manager
            .abort(&self.handle)
            .map_err(|source| self.namespace_error(source))
    }

    fn describe(&self) -> String {
        format!("function namespace {}", self.namespace)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Journal, RecordingConnector, RecordingNamespaceManager};

    fn bind(connector: &Arc<RecordingConnector>) -> Result<ConnectorTransactionBinding> {
        ConnectorTransactionBinding::begin(
            CatalogName::new("hive"),
            connector.clone(),
            &TransactionId::new(),
            IsolationLevel::DEFAULT,
            false,
        )
    }

    #[test]
    fn commit_twice_reaches_backend_once() -> anyhow::Result<()> {
        let connector = RecordingConnector::new("hive");
        let binding = bind(&connector)?;

        binding.commit()?;
        binding.commit()?;
        binding.abort()?;

        assert_eq!(connector.commit_count(), 1);
        assert_eq!(connector.rollback_count(), 0);
        Ok(())
    }

    #[test]
    fn abort_twice_reaches_backend_once() -> anyhow::Result<()> {
        let connector = RecordingConnector::new("hive");
        let binding = bind(&connector)?;

        binding.abort()?;
        binding.abort()?;

        assert_eq!(connector.rollback_count(), 1);
        Ok(())
    }

    #[test]
    fn accessors_fail_once_finished() -> anyhow::Result<()> {
        let connector = RecordingConnector::new("hive");
        let binding = bind(&connector)?;
        assert!(binding.transaction_handle().is_ok());
        assert!(binding.connector_metadata().is_ok());

        binding.abort()?;
        assert!(binding.is_finished());
        assert!(matches!(
            binding.transaction_handle(),
            Err(TransactionError::IllegalState(_))
        ));
        assert!(matches!(
            binding.connector_metadata(),
            Err(TransactionError::IllegalState(_))
        ));
        Ok(())
    }

    #[test]
    fn metadata_failure_rolls_back_the_new_transaction() {
        let connector = RecordingConnector::new("hive");
        connector.fail_metadata();

        let result = bind(&connector);
        assert!(matches!(result, Err(TransactionError::Connector { .. })));
        assert_eq!(connector.begin_count(), 1);
        assert_eq!(connector.rollback_count(), 1);
    }

    #[test]
    fn namespace_binding_is_single_shot() -> anyhow::Result<()> {
        let journal = Journal::default();
        let manager = RecordingNamespaceManager::with_journal("udf", journal.clone());
        let binding = FunctionNamespaceTransactionBinding::begin("udf", manager.clone())?;

        binding.commit()?;
        binding.abort()?;

        assert_eq!(manager.commit_count(), 1);
        assert_eq!(manager.abort_count(), 0);
        assert_eq!(journal.entries(), vec!["begin udf", "commit udf"]);
        Ok(())
    }
}
