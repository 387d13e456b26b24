//! Catalogs and the names of their transactional views.
//!
//! A catalog resolves to three `CatalogName`s: the connector itself, its
//! information-schema view and its system-tables view. Each view gets its own
//! backend transaction even when one connector backs all three.

mod directory;
mod metadata;

pub use directory::{CatalogDirectory, CatalogManager};
pub use metadata::{CatalogMetadata, CatalogView};

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::connector::Connector;

const INFORMATION_SCHEMA_PREFIX: &str = "$info_schema@";
const SYSTEM_TABLES_PREFIX: &str = "$system@";

/// Name of one transactional view of a catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct CatalogName(String);

impl CatalogName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn information_schema(&self) -> CatalogName {
        CatalogName(format!("{INFORMATION_SCHEMA_PREFIX}{}", self.catalog()))
    }

    pub fn system_tables(&self) -> CatalogName {
        CatalogName(format!("{SYSTEM_TABLES_PREFIX}{}", self.catalog()))
    }

    /// Whether this names an information-schema or system-tables view.
    pub fn is_internal(&self) -> bool {
        self.0.starts_with(INFORMATION_SCHEMA_PREFIX) || self.0.starts_with(SYSTEM_TABLES_PREFIX)
    }

    /// User-facing catalog name this view belongs to.
    pub fn catalog(&self) -> &str {
        self.0
            .strip_prefix(INFORMATION_SCHEMA_PREFIX)
            .or_else(|| self.0.strip_prefix(SYSTEM_TABLES_PREFIX))
            .unwrap_or(&self.0)
    }
}

impl fmt::Display for CatalogName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CatalogName {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl From<String> for CatalogName {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl AsRef<str> for CatalogName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A registered catalog and the connectors behind its three views.
#[derive(Clone)]
pub struct Catalog {
    catalog_name: String,
    connector_catalog_name: CatalogName,
    connector: Arc<dyn Connector>,
    information_schema_id: CatalogName,
    information_schema: Arc<dyn Connector>,
    system_tables_id: CatalogName,
    system_tables: Arc<dyn Connector>,
}

impl Catalog {
    /// Catalog whose three views share a single connector.
    pub fn new(catalog_name: impl Into<String>, connector: Arc<dyn Connector>) -> Self {
        Self::with_views(
            catalog_name,
            connector.clone(),
            connector.clone(),
            connector,
        )
    }

    pub fn with_views(
        catalog_name: impl Into<String>,
        connector: Arc<dyn Connector>,
        information_schema: Arc<dyn Connector>,
        system_tables: Arc<dyn Connector>,
    ) -> Self {
        let catalog_name = catalog_name.into();
        let connector_catalog_name = CatalogName::new(catalog_name.clone());
        Self {
            information_schema_id: connector_catalog_name.information_schema(),
            system_tables_id: connector_catalog_name.system_tables(),
            catalog_name,
            connector_catalog_name,
            connector,
            information_schema,
            system_tables,
        }
    }

    pub fn catalog_name(&self) -> &str {
        &self.catalog_name
    }

    pub fn connector_catalog_name(&self) -> &CatalogName {
        &self.connector_catalog_name
    }

    pub fn information_schema_id(&self) -> &CatalogName {
        &self.information_schema_id
    }

    pub fn system_tables_id(&self) -> &CatalogName {
        &self.system_tables_id
    }

    /// All three view names, primary first.
    pub fn view_names(&self) -> [&CatalogName; 3] {
        [
            &self.connector_catalog_name,
            &self.information_schema_id,
            &self.system_tables_id,
        ]
    }

    /// Connector backing the given view, if the view belongs to this catalog.
    pub fn connector(&self, catalog_name: &CatalogName) -> Option<&Arc<dyn Connector>> {
        if catalog_name == &self.connector_catalog_name {
            Some(&self.connector)
        } else if catalog_name == &self.information_schema_id {
            Some(&self.information_schema)
        } else if catalog_name == &self.system_tables_id {
            Some(&self.system_tables)
        } else {
            None
        }
    }
}

impl fmt::Debug for Catalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Catalog")
            .field("catalog_name", &self.catalog_name)
            .field("connector_catalog_name", &self.connector_catalog_name)
            .finish_non_exhaustive()
    }
}
