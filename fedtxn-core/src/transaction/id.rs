//! Transaction ID generation.
//!
//! Ids are random UUIDs so coordinators in a cluster can hand them out
//! independently.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a logical transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(Uuid);

impl TransactionId {
    /// Create a new random transaction ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TransactionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl From<Uuid> for TransactionId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_unique_and_parse_back() -> anyhow::Result<()> {
        let first = TransactionId::new();
        let second = TransactionId::new();
        assert_ne!(first, second);

        let parsed: TransactionId = first.to_string().parse()?;
        assert_eq!(parsed, first);
        assert_eq!(parsed.as_uuid(), first.as_uuid());
        Ok(())
    }

    #[test]
    fn malformed_id_is_rejected() {
        assert!("not-a-transaction".parse::<TransactionId>().is_err());
    }

    #[test]
    fn serializes_as_plain_string() -> anyhow::Result<()> {
        let id = TransactionId::new();
        let json = serde_json::to_string(&id)?;
        assert_eq!(json, format!("\"{id}\""));
        Ok(())
    }
}
