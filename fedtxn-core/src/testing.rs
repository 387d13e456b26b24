//! Recording collaborators shared by the unit tests.

use std::any::Any;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::connector::{
    Connector, ConnectorCapabilities, ConnectorMetadata, CoordinatorAwareConnector,
    TransactionHandle,
};
use crate::function::FunctionNamespaceManager;
use crate::transaction::{IsolationLevel, TransactionId};

/// Ordered log of backend calls, shared between mocks.
#[derive(Clone, Default)]
pub(crate) struct Journal {
    entries: Arc<Mutex<Vec<String>>>,
}

impl Journal {
    pub(crate) fn push(&self, entry: String) {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(entry);
    }

    pub(crate) fn entries(&self) -> Vec<String> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub(crate) fn position(&self, entry: &str) -> Option<usize> {
        self.entries().iter().position(|e| e == entry)
    }

    pub(crate) fn count(&self, entry: &str) -> usize {
        self.entries().iter().filter(|e| *e == entry).count()
    }
}

/// Backend transaction created by a [`RecordingConnector`].
#[derive(Debug)]
pub(crate) struct RecordingHandle {
    pub(crate) connector: String,
    pub(crate) sequence: u64,
    pub(crate) transaction_id: Option<TransactionId>,
}

pub(crate) struct RecordingMetadata {
    pub(crate) connector: String,
}

impl ConnectorMetadata for RecordingMetadata {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub(crate) struct RecordingConnector {
    name: String,
    journal: Journal,
    capabilities: Mutex<ConnectorCapabilities>,
    coordinator_aware: AtomicBool,
    fail_commit: AtomicBool,
    fail_rollback: AtomicBool,
    fail_metadata: AtomicBool,
    finish_delay: Mutex<Duration>,
    next_handle: AtomicU64,
    begins: AtomicUsize,
    commits: AtomicUsize,
    rollbacks: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    transaction_ids: Mutex<Vec<TransactionId>>,
}

impl RecordingConnector {
    pub(crate) fn new(name: &str) -> Arc<Self> {
        Self::with_journal(name, Journal::default())
    }

    pub(crate) fn with_journal(name: &str, journal: Journal) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            journal,
            capabilities: Mutex::new(ConnectorCapabilities::writable()),
            coordinator_aware: AtomicBool::new(false),
            fail_commit: AtomicBool::new(false),
            fail_rollback: AtomicBool::new(false),
            fail_metadata: AtomicBool::new(false),
            finish_delay: Mutex::new(Duration::ZERO),
            next_handle: AtomicU64::new(1),
            begins: AtomicUsize::new(0),
            commits: AtomicUsize::new(0),
            rollbacks: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
            transaction_ids: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn set_capabilities(&self, capabilities: ConnectorCapabilities) {
        *self
            .capabilities
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = capabilities;
    }

    pub(crate) fn enable_coordinator_aware(&self) {
        self.coordinator_aware.store(true, Ordering::SeqCst);
    }

    pub(crate) fn fail_commit(&self) {
        self.fail_commit.store(true, Ordering::SeqCst);
    }

    pub(crate) fn fail_rollback(&self) {
        self.fail_rollback.store(true, Ordering::SeqCst);
    }

    pub(crate) fn fail_metadata(&self) {
        self.fail_metadata.store(true, Ordering::SeqCst);
    }

    /// Make every commit and rollback block for `delay`.
    pub(crate) fn set_finish_delay(&self, delay: Duration) {
        *self
            .finish_delay
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = delay;
    }

    pub(crate) fn begin_count(&self) -> usize {
        self.begins.load(Ordering::SeqCst)
    }

    pub(crate) fn commit_count(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    pub(crate) fn rollback_count(&self) -> usize {
        self.rollbacks.load(Ordering::SeqCst)
    }

    pub(crate) fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    pub(crate) fn transaction_ids(&self) -> Vec<TransactionId> {
        self.transaction_ids
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn open(&self, transaction_id: Option<TransactionId>) -> TransactionHandle {
        self.begins.fetch_add(1, Ordering::SeqCst);
        self.journal.push(format!("begin {}", self.name));
        TransactionHandle::new(RecordingHandle {
            connector: self.name.clone(),
            sequence: self.next_handle.fetch_add(1, Ordering::SeqCst),
            transaction_id,
        })
    }

    fn finish(&self, operation: &str, fail: &AtomicBool) -> anyhow::Result<()> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        let delay = *self
            .finish_delay
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.journal.push(format!("{operation} {}", self.name));
        if fail.load(Ordering::SeqCst) {
            anyhow::bail!("{operation} failed on {}", self.name);
        }
        Ok(())
    }
}

impl Connector for RecordingConnector {
    fn begin_transaction(
        &self,
        _isolation_level: IsolationLevel,
        _read_only: bool,
    ) -> anyhow::Result<TransactionHandle> {
        Ok(self.open(None))
    }

    fn metadata(&self, _handle: &TransactionHandle) -> anyhow::Result<Arc<dyn ConnectorMetadata>> {
        if self.fail_metadata.load(Ordering::SeqCst) {
            anyhow::bail!("metadata unavailable on {}", self.name);
        }
        Ok(Arc::new(RecordingMetadata {
            connector: self.name.clone(),
        }))
    }

    fn commit(&self, _handle: &TransactionHandle) -> anyhow::Result<()> {
        self.commits.fetch_add(1, Ordering::SeqCst);
        self.finish("commit", &self.fail_commit)
    }

    fn rollback(&self, _handle: &TransactionHandle) -> anyhow::Result<()> {
        self.rollbacks.fetch_add(1, Ordering::SeqCst);
        self.finish("rollback", &self.fail_rollback)
    }

    fn capabilities(&self) -> ConnectorCapabilities {
        *self
            .capabilities
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn coordinator_aware(&self) -> Option<&dyn CoordinatorAwareConnector> {
        if self.coordinator_aware.load(Ordering::SeqCst) {
            Some(self)
        } else {
            None
        }
    }
}

impl CoordinatorAwareConnector for RecordingConnector {
    fn begin_transaction(
        &self,
        transaction_id: &TransactionId,
        _isolation_level: IsolationLevel,
        _read_only: bool,
    ) -> anyhow::Result<TransactionHandle> {
        self.transaction_ids
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(*transaction_id);
        Ok(self.open(Some(*transaction_id)))
    }
}

pub(crate) struct RecordingNamespaceManager {
    name: String,
    journal: Journal,
    fail_abort: AtomicBool,
    begins: AtomicUsize,
    commits: AtomicUsize,
    aborts: AtomicUsize,
}

impl RecordingNamespaceManager {
    pub(crate) fn new(name: &str) -> Arc<Self> {
        Self::with_journal(name, Journal::default())
    }

    pub(crate) fn with_journal(name: &str, journal: Journal) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            journal,
            fail_abort: AtomicBool::new(false),
            begins: AtomicUsize::new(0),
            commits: AtomicUsize::new(0),
            aborts: AtomicUsize::new(0),
        })
    }

    pub(crate) fn fail_abort(&self) {
        self.fail_abort.store(true, Ordering::SeqCst);
    }

    pub(crate) fn begin_count(&self) -> usize {
        self.begins.load(Ordering::SeqCst)
    }

    pub(crate) fn commit_count(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    pub(crate) fn abort_count(&self) -> usize {
        self.aborts.load(Ordering::SeqCst)
    }
}

impl FunctionNamespaceManager for RecordingNamespaceManager {
    fn begin_transaction(&self) -> anyhow::Result<TransactionHandle> {
        let sequence = self.begins.fetch_add(1, Ordering::SeqCst) as u64 + 1;
        self.journal.push(format!("begin {}", self.name));
        Ok(TransactionHandle::new(sequence))
    }

    fn commit(&self, _handle: &TransactionHandle) -> anyhow::Result<()> {
        self.commits.fetch_add(1, Ordering::SeqCst);
        self.journal.push(format!("commit {}", self.name));
        Ok(())
    }

    fn abort(&self, _handle: &TransactionHandle) -> anyhow::Result<()> {
        self.aborts.fetch_add(1, Ordering::SeqCst);
        self.journal.push(format!("abort {}", self.name));
        if self.fail_abort.load(Ordering::SeqCst) {
            anyhow::bail!("abort failed on {}", self.name);
        }
        Ok(())
    }
}
