//! Configuration for blob storage backends

use crate::error::StoreResult;
use crate::storage::{BlobStorage, local_store::LocalBlobStore, mock_store::MockBlobStore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::env;
use log::{info, warn};

/// Available blob storage backends
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum StorageBackend {
    Local,
    Mock,
}

impl Default for StorageBackend {
    fn default() -> Self {
        StorageBackend::Local
    }
}

impl std::str::FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "local" | "fs" | "filesystem" => Ok(StorageBackend::Local),
            "mock" => Ok(StorageBackend::Mock),
            _ => Err(format!("Unknown storage backend: {}", s))
        }
    }
}

/// Blob storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Storage backend type
    pub backend: StorageBackend,
    /// Root directory for the local backend
    pub base_path: String,
    /// Public URL prefix under which objects are served; image URLs are `<public_base_url>/<key>`
    pub public_base_url: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            base_path: "./data/blobs".to_string(),
            public_base_url: "http://127.0.0.1:9710/media".to_string(),
        }
    }
}

impl StorageConfig {
    /// Override the backend from `STORAGE_BACKEND` when it is set and valid
    pub fn apply_env(&mut self) {
        if let Ok(backend_str) = env::var("STORAGE_BACKEND") {
            match backend_str.parse::<StorageBackend>() {
                Ok(backend) => {
                    info!("Using storage backend from environment: {:?}", backend);
                    self.backend = backend;
                }
                Err(e) => {
                    warn!("Invalid storage backend in environment: {}. Keeping {:?}.", e, self.backend);
                }
            }
        }
    }

    /// Create a storage instance based on the configuration
    pub fn create_store(&self) -> StoreResult<Arc<dyn BlobStorage>> {
        Ok(match self.backend {
            StorageBackend::Local => {
                info!("Using local blob storage backend with base_path: {}", self.base_path);
                Arc::new(LocalBlobStore::open(&self.base_path)?)
            }
            StorageBackend::Mock => {
                info!("Using mock blob storage backend");
                Arc::new(MockBlobStore::new())
            }
        })
    }
}
