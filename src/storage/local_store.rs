//! Local filesystem blob storage implementation
//!
//! Each object is one file at `<base_path>/<key>`; `/` in keys becomes a
//! directory level, so a section's images share one directory. The content
//! type given at upload is kept in a `<key>.content-type` sidecar file.
//! Directories left empty by a delete are removed.

use crate::error::{StoreError, StoreResult};
use crate::storage::{compute_etag, content_type_for_key, BlobObject, BlobStorage, ObjectInfo};
use chrono::{DateTime, Utc};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Component, Path, PathBuf};
use log::{debug, info};

/// Temporary files are written next to their target with this suffix, then renamed
const PARTIAL_SUFFIX: &str = ".partial";

/// Sidecar holding the object's content type
const CONTENT_TYPE_SUFFIX: &str = ".content-type";

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

/// Write `data` to `path` through a temporary file and a rename
fn write_atomic(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let partial = with_suffix(path, PARTIAL_SUFFIX);
    let mut file = match fs::File::create(&partial) {
        Ok(file) => file,
        // The directory was pruned by a concurrent delete
        Err(e) if e.kind() == ErrorKind::NotFound => {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::File::create(&partial)?
        }
        Err(e) => return Err(e),
    };
    file.write_all(data)?;
    file.sync_all()?;
    drop(file);
    fs::rename(&partial, path)
}

fn is_reserved_name(key: &str) -> bool {
    key.ends_with(PARTIAL_SUFFIX) || key.ends_with(CONTENT_TYPE_SUFFIX)
}

/// Local filesystem blob store
pub struct LocalBlobStore {
    base_path: PathBuf,
}

impl LocalBlobStore {
    /// Open a store rooted at `base_path`, creating the directory if needed
    pub fn open<P: AsRef<Path>>(base_path: P) -> StoreResult<Self> {
        let base_path = base_path.as_ref().to_path_buf();
        if !base_path.exists() {
            fs::create_dir_all(&base_path)?;
            info!("Created blob storage directory: {}", base_path.display());
        }
        Ok(Self { base_path })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Map a key onto a path under the base directory, rejecting anything that could escape it
    fn object_path(&self, key: &str) -> StoreResult<PathBuf> {
        if key.is_empty() || key.ends_with('/') || is_reserved_name(key) {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        let relative = Path::new(key);
        for component in relative.components() {
            match component {
                Component::Normal(_) => {}
                _ => return Err(StoreError::InvalidKey(key.to_string())),
            }
        }
        Ok(self.base_path.join(relative))
    }

    /// Key for a file found while walking the base directory
    fn key_for_path(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.base_path).ok()?;
        let parts: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        Some(parts.join("/"))
    }

    /// Remove now-empty directories above a deleted object, up to the base path
    fn prune_empty_dirs(&self, path: &Path) {
        let mut dir = path.parent();
        while let Some(current) = dir {
            if current == self.base_path || !current.starts_with(&self.base_path) {
                break;
            }
            // Fails while anything is left inside, which ends the walk
            if fs::remove_dir(current).is_err() {
                break;
            }
            debug!("Removed empty directory {}", current.display());
            dir = current.parent();
        }
    }

    fn walk(&self, dir: &Path, prefix: &str, out: &mut Vec<ObjectInfo>) -> StoreResult<()> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                self.walk(&path, prefix, out)?;
                continue;
            }
            if !file_type.is_file() {
                continue;
            }
            let Some(key) = self.key_for_path(&path) else { continue };
            if is_reserved_name(&key) || !key.starts_with(prefix) {
                continue;
            }
            let metadata = entry.metadata()?;
            let last_modified: DateTime<Utc> = metadata
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now());
            out.push(ObjectInfo { key, size: metadata.len(), last_modified });
        }
        Ok(())
    }
}

impl BlobStorage for LocalBlobStore {
    fn put_object(&self, key: &str, data: &[u8], content_type: &str) -> StoreResult<String> {
        let path = self.object_path(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Sidecar first: once the object is visible its type is too
        write_atomic(&with_suffix(&path, CONTENT_TYPE_SUFFIX), content_type.as_bytes())?;
        write_atomic(&path, data)?;

        let etag = compute_etag(data);
        debug!("Stored object {} ({} bytes, {}, etag {})", key, data.len(), content_type, etag);
        Ok(etag)
    }

    fn get_object(&self, key: &str) -> StoreResult<BlobObject> {
        let path = self.object_path(key)?;
        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StoreError::NotFound(format!("Object not found: {}", key)))
            }
            Err(e) => return Err(e.into()),
        };
        let content_type = match fs::read_to_string(with_suffix(&path, CONTENT_TYPE_SUFFIX)) {
            Ok(content_type) if !content_type.trim().is_empty() => content_type.trim().to_string(),
            Ok(_) => content_type_for_key(key).to_string(),
            Err(e) if e.kind() == ErrorKind::NotFound => content_type_for_key(key).to_string(),
            Err(e) => return Err(e.into()),
        };
        Ok(BlobObject { data, content_type })
    }

    fn delete_object(&self, key: &str) -> StoreResult<()> {
        let path = self.object_path(key)?;
        match fs::remove_file(&path) {
            Ok(()) => debug!("Deleted object {}", key),
            Err(e) if e.kind() == ErrorKind::NotFound => debug!("Object {} already absent", key),
            Err(e) => return Err(e.into()),
        }
        match fs::remove_file(with_suffix(&path, CONTENT_TYPE_SUFFIX)) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        self.prune_empty_dirs(&path);
        Ok(())
    }

    fn list_objects(&self, prefix: &str) -> StoreResult<Vec<ObjectInfo>> {
        let mut objects = Vec::new();
        self.walk(&self.base_path, prefix, &mut objects)?;
        objects.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(objects)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> (tempfile::TempDir, LocalBlobStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::open(dir.path().join("blobs")).unwrap();
        (dir, store)
    }

    #[test]
    fn test_local_store_basic_operations() {
        let (_dir, store) = temp_store();
        let key = "summer-trip/abc.jpg";
        let data = b"not really a jpeg";

        let etag = store.put_object(key, data, "image/jpeg").unwrap();
        assert_eq!(etag, compute_etag(data));
        assert!(store.base_path().join("summer-trip").join("abc.jpg").is_file());

        let object = store.get_object(key).unwrap();
        assert_eq!(object.data, data);
        assert_eq!(object.content_type, "image/jpeg");

        store.delete_object(key).unwrap();
        assert!(matches!(store.get_object(key), Err(StoreError::NotFound(_))));
        assert!(store.list_objects("summer-trip/").unwrap().is_empty());
    }

    #[test]
    fn test_local_store_keeps_content_type_in_sidecar() {
        let (_dir, store) = temp_store();
        store.put_object("trip/photo.heic", b"heic", "image/heic").unwrap();
        assert!(store.base_path().join("trip").join("photo.heic.content-type").is_file());

        let keys: Vec<_> = store.list_objects("").unwrap().into_iter().map(|o| o.key).collect();
        assert_eq!(keys, vec!["trip/photo.heic"]);
        assert!(matches!(
            store.put_object("trip/photo.heic.content-type", b"x", "image/png"),
            Err(StoreError::InvalidKey(_))
        ));

        // Objects without a sidecar fall back to the extension
        fs::write(store.base_path().join("trip").join("legacy.png"), b"png").unwrap();
        assert_eq!(store.get_object("trip/legacy.png").unwrap().content_type, "image/png");
    }

    #[test]
    fn test_local_store_prunes_empty_section_directories() {
        let (_dir, store) = temp_store();
        store.put_object("trip/a.png", b"a", "image/png").unwrap();
        store.put_object("trip/b.png", b"b", "image/png").unwrap();
        let section_dir = store.base_path().join("trip");

        store.delete_object("trip/a.png").unwrap();
        assert!(section_dir.is_dir());

        store.delete_objects(&["trip/b.png".to_string()]).unwrap();
        assert!(!section_dir.exists());
        assert!(store.base_path().is_dir());

        // The section can be written again after its directory is gone
        store.put_object("trip/c.png", b"c", "image/png").unwrap();
        assert_eq!(store.get_object("trip/c.png").unwrap().data, b"c");
    }

    #[test]
    fn test_local_store_delete_absent_is_ok() {
        let (_dir, store) = temp_store();
        assert!(store.delete_object("nowhere/missing.png").is_ok());
    }

    #[test]
    fn test_local_store_rejects_escaping_keys() {
        let (_dir, store) = temp_store();
        for key in ["../etc/passwd", "/abs/path.png", "a/../../b.png", "", "dir/", "a/b.png.partial"] {
            assert!(
                matches!(store.put_object(key, b"x", "image/png"), Err(StoreError::InvalidKey(_))),
                "key {:?} should be rejected",
                key
            );
        }
    }

    #[test]
    fn test_local_store_list_by_prefix() {
        let (_dir, store) = temp_store();
        store.put_object("a/1.png", b"1", "image/png").unwrap();
        store.put_object("a/2.png", b"22", "image/png").unwrap();
        store.put_object("ab/3.png", b"333", "image/png").unwrap();

        let listed = store.list_objects("a/").unwrap();
        let keys: Vec<_> = listed.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, vec!["a/1.png", "a/2.png"]);
        assert_eq!(listed[1].size, 2);

        assert_eq!(store.list_objects("").unwrap().len(), 3);
        assert!(store.list_objects("zzz/").unwrap().is_empty());
    }
}
