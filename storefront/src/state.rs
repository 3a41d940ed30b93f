//! Application state shared across handlers

use std::sync::Arc;

use crate::config::Config;
use crate::repository::ResourceRepository;
use crate::resources::ResourceSpec;
use crate::store::DocumentStore;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    store: Arc<dyn DocumentStore>,
}

impl AppState {
    /// Create state from a loaded config and an open store
    pub fn new(config: Config, store: Arc<dyn DocumentStore>) -> Self {
        Self {
            config: Arc::new(config),
            store,
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the document store
    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// Repository for one resource
    pub fn repository(&self, spec: &'static ResourceSpec) -> ResourceRepository {
        ResourceRepository::new(self.store.clone(), spec)
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("service", &self.config.service.name)
            .finish_non_exhaustive()
    }
}
