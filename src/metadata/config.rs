//! Configuration for section record storage backends

use crate::error::StoreResult;
use crate::metadata::{SectionStorage, sqlite_store::SQLiteSectionStore, mock_store::MockSectionStore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::env;
use log::{info, warn};

/// Available section record backends
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum MetadataBackend {
    SQLite,
    Mock,
}

impl Default for MetadataBackend {
    fn default() -> Self {
        MetadataBackend::SQLite
    }
}

impl std::str::FromStr for MetadataBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sqlite" => Ok(MetadataBackend::SQLite),
            "mock" => Ok(MetadataBackend::Mock),
            _ => Err(format!("Unknown metadata backend: {}", s))
        }
    }
}

/// Section record storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataConfig {
    /// Metadata backend type
    pub backend: MetadataBackend,
    /// Database file path, `:memory:` for a private in-memory database
    pub db_path: String,
    /// Enable WAL mode
    pub wal_mode: bool,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            backend: MetadataBackend::default(),
            db_path: "./data/gallery.db".to_string(),
            wal_mode: true,
        }
    }
}

impl MetadataConfig {
    /// Override the backend from `METADATA_BACKEND` when it is set and valid
    pub fn apply_env(&mut self) {
        if let Ok(backend_str) = env::var("METADATA_BACKEND") {
            match backend_str.parse::<MetadataBackend>() {
                Ok(backend) => {
                    info!("Using metadata backend from environment: {:?}", backend);
                    self.backend = backend;
                }
                Err(e) => {
                    warn!("Invalid metadata backend in environment: {}. Keeping {:?}.", e, self.backend);
                }
            }
        }
    }

    /// Create a section store based on the configuration
    pub fn create_store(&self) -> StoreResult<Arc<dyn SectionStorage>> {
        Ok(match self.backend {
            MetadataBackend::SQLite => {
                info!("Using SQLite metadata backend with db_path: {}, wal_mode: {}", self.db_path, self.wal_mode);
                Arc::new(SQLiteSectionStore::open(self)?)
            }
            MetadataBackend::Mock => {
                info!("Using mock metadata backend");
                Arc::new(MockSectionStore::new())
            }
        })
    }
}
