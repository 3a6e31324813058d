//! Blob service: section-partitioned image objects on top of the storage abstraction
//!
//! Object keys look like `<section_id>/<uuid>.<ext>` and every object is
//! reachable at `<public_base_url>/<key>`.

use crate::error::{StoreError, StoreResult};
use crate::storage::{BlobObject, BlobStorage, ObjectInfo, ObjectKey};
use std::sync::Arc;
use log::{debug, info};
use uuid::Uuid;

/// Result of storing one image payload
#[derive(Debug, Clone, PartialEq)]
pub struct StoredBlob {
    pub key: ObjectKey,
    pub url: String,
    pub etag: String,
}

/// Blob service that maps section images onto object keys and public URLs
pub struct BlobService {
    storage: Arc<dyn BlobStorage>,
    public_base_url: String,
}

impl BlobService {
    /// Create a new blob service with injected storage backend
    pub fn new(storage: Arc<dyn BlobStorage>, public_base_url: &str) -> Self {
        Self {
            storage,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Public URL for an object key
    pub fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_base_url, key)
    }

    /// Recover the object key from a public URL
    pub fn key_from_url(&self, url: &str) -> StoreResult<ObjectKey> {
        url.strip_prefix(&self.public_base_url)
            .and_then(|rest| rest.strip_prefix('/'))
            .filter(|key| !key.is_empty())
            .map(str::to_string)
            .ok_or_else(|| StoreError::InvalidKey(format!("URL outside public base: {}", url)))
    }

    /// Store an image for a section under a fresh unique key
    pub fn put(&self, section_id: &str, data: &[u8], content_type: &str, original_filename: &str) -> StoreResult<StoredBlob> {
        let extension = file_extension(original_filename, content_type);
        let key = format!("{}/{}.{}", section_id, Uuid::new_v4(), extension);
        let etag = self.storage.put_object(&key, data, content_type)?;
        let url = self.public_url(&key);
        info!("Stored image {} ({} bytes) for section {}", key, data.len(), section_id);
        Ok(StoredBlob { key, url, etag })
    }

    /// Object key behind an image URL recorded in `section_id`.
    ///
    /// URLs minted under an earlier `public_base_url` still resolve: the key
    /// is the `<section_id>/<name>` tail of the URL.
    pub fn image_key(&self, section_id: &str, url: &str) -> StoreResult<ObjectKey> {
        if let Ok(key) = self.key_from_url(url) {
            return Ok(key);
        }
        let marker = format!("/{}/", section_id);
        if let Some(pos) = url.rfind(&marker) {
            let key = &url[pos + 1..];
            let name = &key[section_id.len() + 1..];
            if !name.is_empty() && !name.contains('/') {
                debug!("Resolved {} outside the public base as {}", url, key);
                return Ok(key.to_string());
            }
        }
        Err(StoreError::InvalidKey(format!(
            "URL does not name an object of section {}: {}",
            section_id, url
        )))
    }

    /// Delete the object behind an image URL; an already absent object is not an error
    pub fn delete(&self, section_id: &str, public_url: &str) -> StoreResult<()> {
        let key = self.image_key(section_id, public_url)?;
        self.storage.delete_object(&key)?;
        info!("Deleted image object {}", key);
        Ok(())
    }

    /// Delete every object under `<section_id>/`
    pub fn delete_prefix(&self, section_id: &str) -> StoreResult<usize> {
        let prefix = format!("{}/", section_id);
        let keys: Vec<ObjectKey> = self
            .storage
            .list_objects(&prefix)?
            .into_iter()
            .map(|object| object.key)
            .collect();
        if keys.is_empty() {
            debug!("No objects under prefix {}", prefix);
            return Ok(0);
        }
        self.storage.delete_objects(&keys)?;
        info!("Deleted {} objects under prefix {}", keys.len(), prefix);
        Ok(keys.len())
    }

    /// Fetch an object for serving
    pub fn fetch(&self, key: &str) -> StoreResult<BlobObject> {
        self.storage.get_object(key)
    }

    /// Every stored object, across all sections
    pub fn list_all(&self) -> StoreResult<Vec<ObjectInfo>> {
        self.storage.list_objects("")
    }

    /// Delete a batch of objects by key
    pub fn delete_keys(&self, keys: &[ObjectKey]) -> StoreResult<()> {
        self.storage.delete_objects(keys)
    }
}

/// Extension for a new object key.
///
/// Uses the uploaded filename's extension when it has one, otherwise falls
/// back to the content type, then to `bin`.
pub fn file_extension(original_filename: &str, content_type: &str) -> String {
    let from_name = original_filename
        .rsplit_once('.')
        .map(|(_, ext)| {
            ext.chars()
                .filter(char::is_ascii_alphanumeric)
                .map(|c| c.to_ascii_lowercase())
                .collect::<String>()
        })
        .filter(|ext| !ext.is_empty());
    if let Some(ext) = from_name {
        return ext;
    }

    let subtype = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();
    match subtype.as_str() {
        "image/jpeg" | "image/jpg" | "image/pjpeg" => "jpg",
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "image/svg+xml" => "svg",
        "image/bmp" => "bmp",
        "image/avif" => "avif",
        "image/tiff" => "tiff",
        _ => "bin",
    }
    .to_string()
}
