//! Blob Storage Layer Abstraction
//!
//! This module provides an abstraction over object storage backends holding
//! raw image bytes, allowing the system to use different implementations
//! (local files, in-memory) without affecting the gallery service.
//!
//! Keys are flat strings using `/` as a separator, e.g. `summer-trip/<uuid>.jpg`.

pub mod local_store;
pub mod mock_store;
pub mod config;


use chrono::{DateTime, Utc};

use crate::error::StoreResult;

/// Object key type
pub type ObjectKey = String;

/// Listing entry for a stored object
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectInfo {
    pub key: ObjectKey,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
}

/// Object bytes together with the content type they are served with
#[derive(Debug, Clone)]
pub struct BlobObject {
    pub data: Vec<u8>,
    pub content_type: String,
}

/// Trait defining the blob storage interface
pub trait BlobStorage: Send + Sync {
    /// Store bytes under `key`, replacing any previous object. Returns the hex MD5 etag.
    fn put_object(&self, key: &str, data: &[u8], content_type: &str) -> StoreResult<String>;

    /// Retrieve an object, `StoreError::NotFound` if absent
    fn get_object(&self, key: &str) -> StoreResult<BlobObject>;

    /// Delete a single object. Deleting an absent key succeeds.
    fn delete_object(&self, key: &str) -> StoreResult<()>;

    /// List every object whose key starts with `prefix`
    fn list_objects(&self, prefix: &str) -> StoreResult<Vec<ObjectInfo>>;

    /// Delete many objects in one call
    fn delete_objects(&self, keys: &[ObjectKey]) -> StoreResult<()> {
        for key in keys {
            self.delete_object(key)?;
        }
        Ok(())
    }
}

/// Hex MD5 of a payload, used as the object etag
pub fn compute_etag(data: &[u8]) -> String {
    hex::encode(md5::compute(data).0)
}

/// Best-effort content type for a key, from its extension
pub fn content_type_for_key(key: &str) -> &'static str {
    let ext = key.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase());
    match ext.as_deref() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("svg") => "image/svg+xml",
        Some("bmp") => "image/bmp",
        Some("avif") => "image/avif",
        Some("tif") | Some("tiff") => "image/tiff",
        Some("ico") => "image/x-icon",
        _ => "application/octet-stream",
    }
}
