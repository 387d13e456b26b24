use std::fmt;

use serde::{Deserialize, Serialize};

/// SQL isolation level requested for a transaction.
///
/// Variants are ordered from strongest to weakest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IsolationLevel {
    Serializable,
    RepeatableRead,
    ReadCommitted,
    ReadUncommitted,
}

impl IsolationLevel {
    pub const DEFAULT: IsolationLevel = IsolationLevel::ReadUncommitted;

    fn strength(self) -> u8 {
        match self {
            IsolationLevel::Serializable => 3,
            IsolationLevel::RepeatableRead => 2,
            IsolationLevel::ReadCommitted => 1,
            IsolationLevel::ReadUncommitted => 0,
        }
    }

    /// Whether this level gives at least the guarantees of `requirement`.
    pub fn meets_requirement_of(self, requirement: IsolationLevel) -> bool {
        self.strength() >= requirement.strength()
    }

    /// Fails when a connector supporting only `supported` cannot serve `requested`.
    pub fn check_supported(
        supported: IsolationLevel,
        requested: IsolationLevel,
    ) -> anyhow::Result<()> {
        if !supported.meets_requirement_of(requested) {
            anyhow::bail!(
                "connector supports isolation level {supported}, but {requested} was requested"
            );
        }
        Ok(())
    }
}

impl Default for IsolationLevel {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IsolationLevel::Serializable => "SERIALIZABLE",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::ReadUncommitted => "READ UNCOMMITTED",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stronger_levels_meet_weaker_requirements() {
        use IsolationLevel::*;
        assert!(Serializable.meets_requirement_of(ReadUncommitted));
        assert!(ReadCommitted.meets_requirement_of(ReadCommitted));
        assert!(!ReadUncommitted.meets_requirement_of(ReadCommitted));
        assert!(!RepeatableRead.meets_requirement_of(Serializable));
    }

    #[test]
    fn check_supported_reports_both_levels() {
        assert!(IsolationLevel::check_supported(
            IsolationLevel::Serializable,
            IsolationLevel::ReadCommitted
        )
        .is_ok());

        let err = IsolationLevel::check_supported(
            IsolationLevel::ReadCommitted,
            IsolationLevel::Serializable,
        )
        .err()
        .map(|e| e.to_string());
        assert_eq!(
            err.as_deref(),
            Some("connector supports isolation level READ COMMITTED, but SERIALIZABLE was requested")
        );
    }

    #[test]
    fn default_is_read_uncommitted() -> anyhow::Result<()> {
        assert_eq!(IsolationLevel::default(), IsolationLevel::ReadUncommitted);
        let json = serde_json::to_string(&IsolationLevel::RepeatableRead)?;
        assert_eq!(json, "\"REPEATABLE_READ\"");
        Ok(())
    }
}
