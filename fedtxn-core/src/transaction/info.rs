use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

use crate::catalog::CatalogName;
use crate::transaction::{IsolationLevel, TransactionId};

/// Point-in-time view of one transaction.
#[derive(Debug, Clone, Serialize)]
pub struct TransactionInfo {
    pub transaction_id: TransactionId,
    pub isolation_level: IsolationLevel,
    pub read_only: bool,
    pub auto_commit_context: bool,
    pub create_time: DateTime<Utc>,
    #[serde(rename = "idle_time_ms", serialize_with = "serialize_millis")]
    pub idle_time: Duration,
    /// Every view with a bound backend transaction, in name order.
    pub catalog_names: Vec<CatalogName>,
    pub written_catalog: Option<CatalogName>,
}

fn serialize_millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(duration.as_millis() as u64)
}
