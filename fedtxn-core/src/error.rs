use thiserror::Error;

use crate::catalog::CatalogName;
use crate::transaction::TransactionId;

#[derive(Debug, Error)]
pub enum TransactionError {
    #[error("unknown transaction ID: {0}. Possibly expired? Commands ignored until end of transaction block")]
    NoSuchTransaction(TransactionId),
    #[error("transaction {0} is owned by another coordinator")]
    ForeignTransaction(TransactionId),
    #[error("catalog does not exist: {0}")]
    UnknownCatalog(String),
    #[error("function namespace manager is not registered for catalog [{0}]")]
    UnknownFunctionNamespace(String),
    #[error("function namespace manager is already registered for catalog [{0}]")]
    DuplicateFunctionNamespace(String),
    #[error("{0}")]
    TransactionAborted(String),
    #[error("cannot execute write in a read-only transaction")]
    ReadOnlyViolation,
    #[error("multi-catalog writes not supported in a single transaction. Already wrote to catalog {written}")]
    MultiCatalogWriteConflict { written: CatalogName },
    #[error("catalog {0} only supports writes using autocommit")]
    AutocommitWriteConflict(CatalogName),
    #[error("catalog {0} does not support writes")]
    WriteNotSupported(CatalogName),
    #[error("illegal state: {0}")]
    IllegalState(String),
    #[error("connector for catalog {catalog} failed: {source}")]
    Connector {
        catalog: CatalogName,
        #[source]
        source: anyhow::Error,
    },
    #[error("function namespace {namespace} failed: {source}")]
    FunctionNamespace {
        namespace: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T, E = TransactionError> = std::result::Result<T, E>;

impl TransactionError {
    /// Stable error code reported to clients.
    pub fn code(&self) -> &'static str {
        match self {
            TransactionError::NoSuchTransaction(_) => "NOT_IN_TRANSACTION",
            TransactionError::ForeignTransaction(_) => "NOT_IN_LOCAL_TRANSACTION",
            TransactionError::UnknownCatalog(_) | TransactionError::UnknownFunctionNamespace(_) => {
                "NOT_FOUND"
            }
            TransactionError::TransactionAborted(_) => "TRANSACTION_ALREADY_ABORTED",
            TransactionError::ReadOnlyViolation => "READ_ONLY_VIOLATION",
            TransactionError::MultiCatalogWriteConflict { .. } => "MULTI_CATALOG_WRITE_CONFLICT",
            TransactionError::AutocommitWriteConflict(_) => "AUTOCOMMIT_WRITE_CONFLICT",
            TransactionError::WriteNotSupported(_) => "NOT_SUPPORTED",
            TransactionError::Connector { .. } | TransactionError::FunctionNamespace { .. } => {
                "EXTERNAL"
            }
            TransactionError::DuplicateFunctionNamespace(_) | TransactionError::Config(_) => {
                "CONFIGURATION_INVALID"
            }
            TransactionError::IllegalState(_) => "GENERIC_INTERNAL_ERROR",
        }
    }

    /// Whether the error reports caller misuse or policy rather than a coordinator defect.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            TransactionError::NoSuchTransaction(_)
                | TransactionError::ForeignTransaction(_)
                | TransactionError::UnknownCatalog(_)
                | TransactionError::UnknownFunctionNamespace(_)
                | TransactionError::TransactionAborted(_)
                | TransactionError::ReadOnlyViolation
                | TransactionError::MultiCatalogWriteConflict { .. }
                | TransactionError::AutocommitWriteConflict(_)
                | TransactionError::WriteNotSupported(_)
        )
    }

    pub(crate) fn already_aborted() -> Self {
        TransactionError::TransactionAborted(
            "Current transaction is aborted, commands ignored until end of transaction block"
                .to_string(),
        )
    }

    pub(crate) fn already_committed() -> Self {
        TransactionError::IllegalState("current transaction already committed".to_string())
    }
}
