use std::collections::HashMap;
use std::sync::RwLock;

use tracing::info;

use crate::catalog::Catalog;
use crate::error::{Result, TransactionError};

/// Source of the catalogs a transaction can resolve.
pub trait CatalogDirectory: Send + Sync {
    fn lookup_catalog(&self, name: &str) -> Option<Catalog>;

    fn list_catalogs(&self) -> Vec<Catalog>;
}

/// In-memory catalog directory.
#[derive(Default)]
pub struct CatalogManager {
    catalogs: RwLock<HashMap<String, Catalog>>,
}

impl CatalogManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_catalog(&self, catalog: Catalog) -> Result<()> {
        let mut catalogs = self
            .catalogs
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let name = catalog.catalog_name().to_string();
        if catalogs.contains_key(&name) {
            return Err(TransactionError::IllegalState(format!(
                "catalog '{name}' is already registered"
            )));
        }
        catalogs.insert(name.clone(), catalog);
        info!(catalog = %name, total_catalogs = catalogs.len(), "catalog registered");
        Ok(())
    }

    pub fn remove_catalog(&self, name: &str) -> Option<Catalog> {
        let removed = self
            .catalogs
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(name);
        if removed.is_some() {
            info!(catalog = %name, "catalog removed");
        }
        removed
    }
}

impl CatalogDirectory for CatalogManager {
    fn lookup_catalog(&self, name: &str) -> Option<Catalog> {
        self.catalogs
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(name)
            .cloned()
    }

    fn list_catalogs(&self) -> Vec<Catalog> {
        let mut catalogs: Vec<Catalog> = self
            .catalogs
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .values()
            .cloned()
            .collect();
        catalogs.sort_by(|left, right| left.catalog_name().cmp(right.catalog_name()));
        catalogs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingConnector;

    #[test]
    fn register_lookup_and_remove() -> anyhow::Result<()> {
        let manager = CatalogManager::new();
        manager.register_catalog(Catalog::new("b", RecordingConnector::new("b")))?;
        manager.register_catalog(Catalog::new("a", RecordingConnector::new("a")))?;

        assert!(manager.lookup_catalog("a").is_some());
        assert!(manager.lookup_catalog("missing").is_none());

        let names: Vec<String> = manager
            .list_catalogs()
            .iter()
            .map(|catalog| catalog.catalog_name().to_string())
            .collect();
        assert_eq!(names, vec!["a".to_string(), "b".to_string()]);

        assert!(manager.remove_catalog("a").is_some());
        assert!(manager.remove_catalog("a").is_none());
        assert!(manager.lookup_catalog("a").is_none());
        Ok(())
    }

    #[test]
    fn duplicate_registration_is_rejected() -> anyhow::Result<()> {
        let manager = CatalogManager::new();
        manager.register_catalog(Catalog::new("a", RecordingConnector::new("a")))?;
        let err = manager
            .register_catalog(Catalog::new("a", RecordingConnector::new("a2")))
            .err();
        assert!(matches!(err, Some(TransactionError::IllegalState(_))));
        Ok(())
    }
}
