use std::sync::Arc;

use crate::catalog::CatalogName;
use crate::connector::{ConnectorCapabilities, ConnectorMetadata, TransactionHandle};
use crate::error::{Result, TransactionError};

/// One view's metadata and backend transaction inside a transaction.
#[derive(Clone)]
pub struct CatalogView {
    pub catalog_name: CatalogName,
    pub metadata: Arc<dyn ConnectorMetadata>,
    pub transaction_handle: TransactionHandle,
}

/// Transaction-scoped metadata of a resolved catalog, shared by its three views.
#[derive(Clone)]
pub struct CatalogMetadata {
    primary: CatalogView,
    information_schema: CatalogView,
    system_tables: CatalogView,
    capabilities: ConnectorCapabilities,
}

impl CatalogMetadata {
    pub fn new(
        primary: CatalogView,
        information_schema: CatalogView,
        system_tables: CatalogView,
        capabilities: ConnectorCapabilities,
    ) -> Self {
        Self {
            primary,
            information_schema,
            system_tables,
            capabilities,
        }
    }

    pub fn catalog_name(&self) -> &CatalogName {
        &self.primary.catalog_name
    }

    pub fn metadata(&self) -> &Arc<dyn ConnectorMetadata> {
        &self.primary.metadata
    }

    pub fn capabilities(&self) -> ConnectorCapabilities {
        self.capabilities
    }

    pub fn view_names(&self) -> [&CatalogName; 3] {
        [
            &self.primary.catalog_name,
            &self.information_schema.catalog_name,
            &self.system_tables.catalog_name,
        ]
    }

    pub fn metadata_for(&self, catalog_name: &CatalogName) -> Result<&Arc<dyn ConnectorMetadata>> {
        self.view(catalog_name).map(|view| &view.metadata)
    }

    pub fn transaction_handle_for(&self, catalog_name: &CatalogName) -> Result<TransactionHandle> {
        self.view(catalog_name)
            .map(|view| view.transaction_handle.clone())
    }

    fn view(&self, catalog_name: &CatalogName) -> Result<&CatalogView> {
        [&self.primary, &self.information_schema, &self.system_tables]
            .into_iter()
            .find(|view| &view.catalog_name == catalog_name)
            .ok_or_else(|| {
                TransactionError::IllegalState(format!(
                    "{catalog_name} is not a view of catalog {}",
                    self.catalog_name()
                ))
            })
    }
}
