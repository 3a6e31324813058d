//! Application State Management
//!
//! This module provides the application state that contains all services
//! and their dependencies, following the dependency injection pattern.

use std::sync::Arc;
use log::info;

use crate::config::AppConfig;
use crate::error::StoreResult;
use crate::metadata::{SectionStorage, mock_store::MockSectionStore};
use crate::service::blob_service::BlobService;
use crate::service::gallery_service::GalleryService;
use crate::storage::{BlobStorage, mock_store::MockBlobStore};

/// Application state containing all services and their dependencies
#[derive(Clone)]
pub struct AppState {
    pub gallery_service: Arc<GalleryService>,
    pub config: AppConfig,
}

impl AppState {
    /// Create application state from configuration, opening the configured backends
    pub fn from_config(config: AppConfig) -> StoreResult<Self> {
        info!("Initializing application state with configuration");
        let blob_backend = config.storage.create_store()?;
        let section_backend = config.metadata.create_store()?;
        let state = Self::with_stores(config, blob_backend, section_backend);
        info!("Application state initialized successfully");
        Ok(state)
    }

    /// Create application state over already constructed stores
    pub fn with_stores(
        config: AppConfig,
        blob_backend: Arc<dyn BlobStorage>,
        section_backend: Arc<dyn SectionStorage>,
    ) -> Self {
        let blob_service = BlobService::new(blob_backend, &config.storage.public_base_url);
        let gallery_service = Arc::new(GalleryService::new(section_backend, blob_service));
        Self { gallery_service, config }
    }

    /// Create application state for testing with mock backends
    pub fn new_for_testing(config: AppConfig) -> Self {
        Self::with_stores(config, Arc::new(MockBlobStore::new()), Arc::new(MockSectionStore::new()))
    }
}
