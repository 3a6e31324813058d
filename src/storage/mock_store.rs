//! Mock implementation of BlobStorage for testing

use crate::error::{StoreError, StoreResult};
use crate::storage::{compute_etag, BlobObject, BlobStorage, ObjectInfo, ObjectKey};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use log::info;

#[derive(Debug, Clone)]
struct MockObject {
    data: Vec<u8>,
    content_type: String,
    last_modified: DateTime<Utc>,
}

/// In-memory blob store. Clones share the same underlying map.
///
/// Writes and deletes can be switched to fail, which lets tests break a
/// saga halfway through.
#[derive(Clone, Default)]
pub struct MockBlobStore {
    objects: Arc<Mutex<BTreeMap<ObjectKey, MockObject>>>,
    fail_writes: Arc<AtomicBool>,
    fail_deletes: Arc<AtomicBool>,
}

impl MockBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of objects in the store
    pub fn object_count(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    /// Check if an object exists
    pub fn contains(&self, key: &str) -> bool {
        self.objects.lock().unwrap().contains_key(key)
    }

    /// All keys currently stored
    pub fn keys(&self) -> Vec<ObjectKey> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }

    /// Clear all data from the store
    pub fn clear(&self) {
        self.objects.lock().unwrap().clear();
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    /// Backdate an object, for exercising grace periods
    pub fn set_last_modified(&self, key: &str, when: DateTime<Utc>) {
        if let Some(object) = self.objects.lock().unwrap().get_mut(key) {
            object.last_modified = when;
        }
    }

    fn check_deletes(&self) -> StoreResult<()> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("mock blob store rejects deletes".to_string()));
        }
        Ok(())
    }
}

impl BlobStorage for MockBlobStore {
    fn put_object(&self, key: &str, data: &[u8], content_type: &str) -> StoreResult<String> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("mock blob store rejects writes".to_string()));
        }
        let object = MockObject {
            data: data.to_vec(),
            content_type: content_type.to_string(),
            last_modified: Utc::now(),
        };
        self.objects.lock().unwrap().insert(key.to_string(), object);
        info!("Mock: Stored object {} with size {}", key, data.len());
        Ok(compute_etag(data))
    }

    fn get_object(&self, key: &str) -> StoreResult<BlobObject> {
        self.objects
            .lock()
            .unwrap()
            .get(key)
            .map(|object| BlobObject {
                data: object.data.clone(),
                content_type: object.content_type.clone(),
            })
            .ok_or_else(|| StoreError::NotFound(format!("Object not found: {}", key)))
    }

    fn delete_object(&self, key: &str) -> StoreResult<()> {
        self.check_deletes()?;
        self.objects.lock().unwrap().remove(key);
        info!("Mock: Deleted object {}", key);
        Ok(())
    }

    fn list_objects(&self, prefix: &str) -> StoreResult<Vec<ObjectInfo>> {
        let objects = self.objects.lock().unwrap();
        Ok(objects
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, object)| ObjectInfo {
                key: key.clone(),
                size: object.data.len() as u64,
                last_modified: object.last_modified,
            })
            .collect())
    }

    fn delete_objects(&self, keys: &[ObjectKey]) -> StoreResult<()> {
        self.check_deletes()?;
        let mut objects = self.objects.lock().unwrap();
        for key in keys {
            objects.remove(key);
        }
        info!("Mock: Bulk deleted {} objects", keys.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_blob_store_basic_operations() {
        let store = MockBlobStore::new();
        assert_eq!(store.object_count(), 0);

        store.put_object("trip/1.png", b"png bytes", "image/png").unwrap();
        assert!(store.contains("trip/1.png"));

        let object = store.get_object("trip/1.png").unwrap();
        assert_eq!(object.data, b"png bytes");
        assert_eq!(object.content_type, "image/png");

        store.delete_object("trip/1.png").unwrap();
        assert!(!store.contains("trip/1.png"));
        assert!(store.get_object("trip/1.png").is_err());
    }

    #[test]
    fn test_mock_blob_store_failure_switches() {
        let store = MockBlobStore::new();
        store.set_fail_writes(true);
        assert!(matches!(store.put_object("a/b.png", b"x", "image/png"), Err(StoreError::Unavailable(_))));
        store.set_fail_writes(false);
        store.put_object("a/b.png", b"x", "image/png").unwrap();

        store.set_fail_deletes(true);
        assert!(store.delete_object("a/b.png").is_err());
        assert!(store.delete_objects(&["a/b.png".to_string()]).is_err());
        assert!(store.contains("a/b.png"));
    }

    #[test]
    fn test_mock_blob_store_clones_share_state() {
        let store = MockBlobStore::new();
        let handle = store.clone();
        store.put_object("a/b.png", b"x", "image/png").unwrap();
        assert_eq!(handle.object_count(), 1);
        handle.clear();
        assert_eq!(store.object_count(), 0);
    }
}
