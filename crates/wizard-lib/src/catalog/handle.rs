//! Shared, hot-reloadable access to the current catalog
//!
//! Readers take an `Arc` snapshot and keep using it for the rest of their
//! request; a reload swaps the pointer, it never edits a published catalog.

use super::PresetCatalog;
use crate::error::WizardResult;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct CatalogHandle {
    current: Arc<RwLock<Arc<PresetCatalog>>>,
}

impl Default for CatalogHandle {
    fn default() -> Self {
        Self::new(PresetCatalog::builtin())
    }
}

impl CatalogHandle {
    pub fn new(catalog: PresetCatalog) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(catalog))),
        }
    }

    /// Current catalog; stays valid even if a reload happens meanwhile
    pub async fn snapshot(&self) -> Arc<PresetCatalog> {
        self.current.read().await.clone()
    }

    /// Publish a new catalog, returning the one it replaced
    pub async fn replace(&self, catalog: PresetCatalog) -> Arc<PresetCatalog> {
        let mut guard = self.current.write().await;
        std::mem::replace(&mut *guard, Arc::new(catalog))
    }

    /// Load and validate `path`, then publish it.
    ///
    /// On failure the previous catalog stays in place. Returns the new version.
    pub async fn reload_from(&self, path: &Path) -> WizardResult<String> {
        let catalog = match PresetCatalog::from_path(path) {
            Ok(catalog) => catalog,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Catalog reload rejected");
                return Err(e);
            }
        };
        let version = catalog.version().to_string();
        let previous = self.replace(catalog).await;
        info!(
            path = %path.display(),
            old_version = %previous.version(),
            new_version = %version,
            "Catalog reloaded"
        );
        Ok(version)
    }
}
