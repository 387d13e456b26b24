//! State of one live transaction.
//!
//! Catalog resolution, the writer claim and namespace binding run under their
//! own guards, while the completion flag and idle marker are lock-free so
//! readers and the idle sweep never wait on a slow backend.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, RwLock};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{debug, error, warn};

use crate::catalog::{Catalog, CatalogDirectory, CatalogMetadata, CatalogName, CatalogView};
use crate::connector::TransactionHandle;
use crate::error::{Result, TransactionError};
use crate::function::FunctionNamespaceManagers;
use crate::metrics::TransactionMetrics;
use crate::transaction::binding::{
    ConnectorTransactionBinding, FunctionNamespaceTransactionBinding, Participant,
};
use crate::transaction::executor::BoundedExecutor;
use crate::transaction::{FinishHandle, IsolationLevel, TransactionId, TransactionInfo};

const PENDING: u8 = 0;
const COMMITTED: u8 = 1;
const ABORTED: u8 = 2;

/// Idle marker value meaning "active".
const ACTIVE: u64 = 0;

pub(crate) struct TransactionMetadata {
    transaction_id: TransactionId,
    isolation_level: IsolationLevel,
    read_only: bool,
    auto_commit_context: bool,
    create_time: DateTime<Utc>,
    created_at: Instant,
    directory: Arc<dyn CatalogDirectory>,
    function_namespace_managers: FunctionNamespaceManagers,
    executor: BoundedExecutor,
    metrics: TransactionMetrics,
    completion: AtomicU8,
    /// Nanoseconds after `created_at` (plus one) when the transaction went idle.
    idle_since: AtomicU64,
    written_catalog: OnceLock<CatalogName>,
    connector_bindings: RwLock<BTreeMap<CatalogName, Arc<ConnectorTransactionBinding>>>,
    function_namespace_bindings: Mutex<BTreeMap<String, Arc<FunctionNamespaceTransactionBinding>>>,
    catalogs: Mutex<CatalogResolution>,
}

#[derive(Default)]
struct CatalogResolution {
    /// Directory answers by catalog name, misses included.
    catalog_by_name: HashMap<String, Option<Catalog>>,
    /// Resolved catalogs under each of their view names.
    catalogs_by_id: HashMap<CatalogName, Catalog>,
    catalog_metadata: HashMap<CatalogName, CatalogMetadata>,
}

impl CatalogResolution {
    fn lookup(&mut self, directory: &dyn CatalogDirectory, catalog_name: &str) -> Option<Catalog> {
        let catalog = self
            .catalog_by_name
            .entry(catalog_name.to_string())
            .or_insert_with(|| directory.lookup_catalog(catalog_name))
            .clone()?;
        for view_name in catalog.view_names() {
            self.catalogs_by_id
                .entry(view_name.clone())
                .or_insert_with(|| catalog.clone());
        }
        Some(catalog)
    }
}

/// Participants captured when the transaction finished.
struct FinishingPlan {
    transaction_id: TransactionId,
    writer: Option<Arc<ConnectorTransactionBinding>>,
    others: Vec<Arc<dyn Participant>>,
}

impl FinishingPlan {
    fn is_empty(&self) -> bool {
        self.writer.is_none() && self.others.is_empty()
    }

    fn all(&self) -> Vec<Arc<dyn Participant>> {
        let mut all = self.others.clone();
        if let Some(writer) = &self.writer {
            all.push(writer.clone());
        }
        all
    }
}

impl TransactionMetadata {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        transaction_id: TransactionId,
        isolation_level: IsolationLevel,
        read_only: bool,
        auto_commit_context: bool,
        directory: Arc<dyn CatalogDirectory>,
        function_namespace_managers: FunctionNamespaceManagers,
        executor: BoundedExecutor,
        metrics: TransactionMetrics,
    ) -> Self {
        Self {
            transaction_id,
            isolation_level,
            read_only,
            auto_commit_context,
            create_time: Utc::now(),
            created_at: Instant::now(),
            directory,
            function_namespace_managers,
            executor,
            metrics,
            completion: AtomicU8::new(PENDING),
            idle_since: AtomicU64::new(ACTIVE),
            written_catalog: OnceLock::new(),
            connector_bindings: RwLock::new(BTreeMap::new()),
            function_namespace_bindings: Mutex::new(BTreeMap::new()),
            catalogs: Mutex::new(CatalogResolution::default()),
        }
    }

    pub(crate) fn transaction_id(&self) -> &TransactionId {
        &self.transaction_id
    }

    pub(crate) fn set_active(&self) {
        self.idle_since.store(ACTIVE, Ordering::Release);
    }

    pub(crate) fn set_inactive(&self) {
        let offset = self.created_at.elapsed().as_nanos() as u64;
        self.idle_since
            .store(offset.saturating_add(1), Ordering::Release);
    }

    pub(crate) fn idle_duration(&self) -> Duration {
        match self.idle_since.load(Ordering::Acquire) {
            ACTIVE => Duration::ZERO,
            marker => self
                .created_at
                .elapsed()
                .saturating_sub(Duration::from_nanos(marker - 1)),
        }
    }

    pub(crate) fn is_expired(&self, idle_timeout: Duration) -> bool {
        self.idle_since.load(Ordering::Acquire) != ACTIVE && self.idle_duration() > idle_timeout
    }

    pub(crate) fn check_open_transaction(&self) -> Result<()> {
        match self.completion.load(Ordering::Acquire) {
            PENDING => Ok(()),
            COMMITTED => Err(TransactionError::already_committed()),
            _ => Err(TransactionError::already_aborted()),
        }
    }

    /// Connector catalog name for a user-facing catalog name, memoized per transaction.
    pub(crate) fn connector_id(&self, catalog_name: &str) -> Option<CatalogName> {
        self.lock_catalogs()
            .lookup(self.directory.as_ref(), catalog_name)
            .map(|catalog| catalog.connector_catalog_name().clone())
    }

    /// Every catalog visible to this transaction: resolved ones first, then the directory.
    pub(crate) fn catalog_names(&self) -> BTreeMap<String, CatalogName> {
        let mut names = BTreeMap::new();
        {
            let catalogs = self.lock_catalogs();
            for catalog in catalogs.catalog_by_name.values().flatten() {
                names.insert(
                    catalog.catalog_name().to_string(),
                    catalog.connector_catalog_name().clone(),
                );
            }
        }
        for catalog in self.directory.list_catalogs() {
            names
                .entry(catalog.catalog_name().to_string())
                .or_insert_with(|| catalog.connector_catalog_name().clone());
        }
        names
    }

    /// Transaction-scoped metadata for a view, opening backend transactions on first use.
    pub(crate) fn catalog_metadata(&self, catalog_name: &CatalogName) -> Result<CatalogMetadata> {
        let mut catalogs = self.lock_catalogs();
        self.check_open_transaction()?;

        if let Some(metadata) = catalogs.catalog_metadata.get(catalog_name) {
            return Ok(metadata.clone());
        }

        let known = catalogs.catalogs_by_id.get(catalog_name).cloned();
        let catalog = match known {
            Some(catalog) => catalog,
            None => catalogs
                .lookup(self.directory.as_ref(), catalog_name.catalog())
                .filter(|catalog| catalog.connector(catalog_name).is_some())
                .ok_or_else(|| TransactionError::UnknownCatalog(catalog_name.to_string()))?,
        };

        let capabilities = catalog
            .connector(catalog_name)
            .map(|connector| connector.capabilities())
            .unwrap_or_default();

        let mut views = Vec::with_capacity(3);
        for view_name in catalog.view_names() {
            let binding = self.open_binding(&catalog, view_name)?;
            views.push(CatalogView {
                catalog_name: view_name.clone(),
                metadata: binding.connector_metadata()?,
                transaction_handle: binding.transaction_handle()?,
            });
        }
        let [primary, information_schema, system_tables]: [CatalogView; 3] =
            views.try_into().map_err(|_| {
                TransactionError::IllegalState(format!(
                    "catalog {} did not resolve to three views",
                    catalog.catalog_name()
                ))
            })?;

        let metadata =
            CatalogMetadata::new(primary, information_schema, system_tables, capabilities);
        for view_name in catalog.view_names() {
            catalogs
                .catalog_metadata
                .insert(view_name.clone(), metadata.clone());
        }
        debug!(
            transaction_id = %self.transaction_id,
            catalog = %catalog.catalog_name(),
            "catalog resolved"
        );
        Ok(metadata)
    }

    fn open_binding(
        &self,
        catalog: &Catalog,
        view_name: &CatalogName,
    ) -> Result<Arc<ConnectorTransactionBinding>> {
        if self.binding(view_name).is_some() {
            return Err(duplicate_binding(view_name));
        }
        let connector = catalog.connector(view_name).cloned().ok_or_else(|| {
            TransactionError::IllegalState(format!(
                "catalog {} has no connector for {view_name}",
                catalog.catalog_name()
            ))
        })?;
        let binding = Arc::new(ConnectorTransactionBinding::begin(
            view_name.clone(),
            connector,
            &self.transaction_id,
            self.isolation_level,
            self.read_only,
        )?);
        self.insert_binding(binding)
    }

    /// Register a freshly begun binding, rolling it back if its view is already bound.
    pub(crate) fn insert_binding(
        &self,
        binding: Arc<ConnectorTransactionBinding>,
    ) -> Result<Arc<ConnectorTransactionBinding>> {
        let view_name = binding.catalog_name().clone();
        {
            let mut bindings = self
                .connector_bindings
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if !bindings.contains_key(&view_name) {
                bindings.insert(view_name, binding.clone());
                return Ok(binding);
            }
        }
        if let Err(err) = binding.abort() {
            warn!(
                transaction_id = %self.transaction_id,
                catalog = %view_name,
                error = %err,
                "failed to roll back duplicate connector transaction"
            );
        }
        Err(duplicate_binding(&view_name))
    }

    pub(crate) fn binding(
        &self,
        catalog_name: &CatalogName,
    ) -> Option<Arc<ConnectorTransactionBinding>> {
        self.connector_bindings
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(catalog_name)
            .cloned()
    }

    /// Claim `catalog_name` as this transaction's writer.
    ///
    /// Runs under the resolution guard so the claim cannot interleave with
    /// `complete`, which reads the claim while flipping the completion flag.
    pub(crate) fn check_connector_write(&self, catalog_name: &CatalogName) -> Result<()> {
        let _resolution = self.lock_catalogs();
        self.check_open_transaction()?;
        let binding = self.binding(catalog_name).ok_or_else(|| {
            TransactionError::IllegalState(format!(
                "cannot record write for catalog {catalog_name} not part of transaction"
            ))
        })?;
        if self.read_only {
            return Err(TransactionError::ReadOnlyViolation);
        }
        let capabilities = binding.capabilities();
        if !capabilities.supports_writes {
            return Err(TransactionError::WriteNotSupported(catalog_name.clone()));
        }
        let written = self.written_catalog.get_or_init(|| catalog_name.clone());
        if written != catalog_name {
            return Err(TransactionError::MultiCatalogWriteConflict {
                written: written.clone(),
            });
        }
        if capabilities.single_statement_writes_only && !self.auto_commit_context {
            return Err(TransactionError::AutocommitWriteConflict(
                catalog_name.clone(),
            ));
        }
        Ok(())
    }

    pub(crate) fn function_namespace_transaction(
        &self,
        namespace: &str,
    ) -> Result<TransactionHandle> {
        let mut bindings = self.lock_namespaces();
        self.check_open_transaction()?;

        if let Some(binding) = bindings.get(namespace) {
            return Ok(binding.transaction_handle());
        }
        let manager = self
            .function_namespace_managers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(namespace)
            .cloned()
            .ok_or_else(|| TransactionError::UnknownFunctionNamespace(namespace.to_string()))?;

        let binding = Arc::new(FunctionNamespaceTransactionBinding::begin(namespace, manager)?);
        let handle = binding.transaction_handle();
        bindings.insert(namespace.to_string(), binding);
        debug!(
            transaction_id = %self.transaction_id,
            namespace,
            "function namespace transaction started"
        );
        Ok(handle)
    }

    /// Commit every participant; a claimed writer commits alone before the rest.
    pub(crate) fn async_commit(&self) -> FinishHandle {
        let plan = match self.complete(COMMITTED) {
            Ok(plan) => plan,
            Err(COMMITTED) => return FinishHandle::ready(Ok(())),
            Err(_) => {
                return FinishHandle::ready(Err(TransactionError::TransactionAborted(
                    "Current transaction has already been aborted".to_string(),
                )))
            }
        };

        if plan.is_empty() {
            self.metrics.record_committed();
            return FinishHandle::ready(Ok(()));
        }

        let executor = self.executor.clone();
        let metrics = self.metrics.clone();
        FinishHandle::running(self.executor.spawn(async move {
            let result = commit_participants(&executor, &plan).await;
            match &result {
                Ok(()) => metrics.record_committed(),
                Err(_) => metrics.record_commit_failure(),
            }
            result
        }))
    }

    /// Abort every participant. Participant failures are logged, never returned.
    pub(crate) fn async_abort(&self) -> FinishHandle {
        let plan = match self.complete(ABORTED) {
            Ok(plan) => plan,
            Err(ABORTED) => return FinishHandle::ready(Ok(())),
            Err(_) => return FinishHandle::ready(Err(TransactionError::already_committed())),
        };
        self.metrics.record_aborted();

        if plan.is_empty() {
            return FinishHandle::ready(Ok(()));
        }

        let executor = self.executor.clone();
        FinishHandle::running(self.executor.spawn(async move {
            abort_participants(&executor, &plan.transaction_id, plan.all()).await;
            Ok(())
        }))
    }

    /// Claim the completion flag and capture the participants to finish.
    ///
    /// Both resolution guards are held so no binding can be added after the
    /// flag flips. Returns the current flag if another caller already claimed it.
    fn complete(&self, outcome: u8) -> std::result::Result<FinishingPlan, u8> {
        let _resolution = self.lock_catalogs();
        let namespaces = self.lock_namespaces();
        self.completion
            .compare_exchange(PENDING, outcome, Ordering::AcqRel, Ordering::Acquire)?;

        let writer_name = self.written_catalog.get();
        let mut writer = None;
        let mut others: Vec<Arc<dyn Participant>> = Vec::new();
        for (name, binding) in self
            .connector_bindings
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
        {
            if Some(name) == writer_name {
                writer = Some(binding.clone());
            } else {
                others.push(binding.clone());
            }
        }
        for binding in namespaces.values() {
            others.push(binding.clone());
        }

        Ok(FinishingPlan {
            transaction_id: self.transaction_id,
            writer,
            others,
        })
    }

    pub(crate) fn transaction_info(&self) -> TransactionInfo {
        let catalog_names = self
            .connector_bindings
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .keys()
            .cloned()
            .collect();
        TransactionInfo {
            transaction_id: self.transaction_id,
            isolation_level: self.isolation_level,
            read_only: self.read_only,
            auto_commit_context: self.auto_commit_context,
            create_time: self.create_time,
            idle_time: self.idle_duration(),
            catalog_names,
            written_catalog: self.written_catalog.get().cloned(),
        }
    }

    fn lock_catalogs(&self) -> MutexGuard<'_, CatalogResolution> {
        self.catalogs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_namespaces(
        &self,
    ) -> MutexGuard<'_, BTreeMap<String, Arc<FunctionNamespaceTransactionBinding>>> {
        self.function_namespace_bindings
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn duplicate_binding(catalog_name: &CatalogName) -> TransactionError {
    TransactionError::IllegalState(format!(
        "catalog {catalog_name} is already bound to this transaction"
    ))
}

async fn commit_participants(executor: &BoundedExecutor, plan: &FinishingPlan) -> Result<()> {
    let transaction_id = plan.transaction_id;

    if let Some(writer) = &plan.writer {
        let participant = writer.clone();
        let outcome = match executor.submit(move || participant.commit()).await {
            Ok(result) => result,
            Err(err) => Err(TransactionError::IllegalState(format!(
                "finishing task failed: {err}"
            ))),
        };
        if let Err(err) = outcome {
            error!(
                transaction_id = %transaction_id,
                catalog = %writer.catalog_name(),
                error = %err,
                "writer commit failed, aborting transaction"
            );
            abort_participants(executor, &transaction_id, plan.all()).await;
            return Err(err);
        }
    }

    let tasks = plan.others.iter().map(|participant| {
        let participant = participant.clone();
        move || participant.commit()
    });
    let results = executor.run_all(tasks).await;

    let mut failed = false;
    for (participant, result) in plan.others.iter().zip(results) {
        if let Err(err) = result {
            failed = true;
            error!(
                transaction_id = %transaction_id,
                participant = %participant.describe(),
                error = %err,
                "read-only participant should not throw exception on commit"
            );
        }
    }
    if failed {
        abort_participants(executor, &transaction_id, plan.all()).await;
    }
    Ok(())
}

async fn abort_participants(
    executor: &BoundedExecutor,
    transaction_id: &TransactionId,
    participants: Vec<Arc<dyn Participant>>,
) {
    let tasks = participants.iter().map(|participant| {
        let participant = participant.clone();
        move || participant.abort()
    });
    let results = executor.run_all(tasks).await;
    for (participant, result) in participants.iter().zip(results) {
        if let Err(err) = result {
            error!(
                transaction_id = %transaction_id,
                participant = %participant.describe(),
                error = %err,
                "participant threw exception on abort"
            );
        }
    }
}
