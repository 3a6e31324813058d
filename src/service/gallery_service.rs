//! Gallery service: keeps section records and image objects consistent
//!
//! Every operation here is a short sequence of calls against two stores that
//! share no transaction. The ordering is picked so that a failure halfway
//! through can leave an unreferenced object behind (cleaned up later by
//! `reconcile` or a section delete) but never a record pointing at an image
//! that was already removed, with one exception: a section whose objects were
//! purged but whose record delete failed. That error is surfaced so the
//! caller can retry the delete.
//!
//! Known races, left as they are:
//! - `create_section` checks for an existing record and then writes; two
//!   concurrent creators can both pass the check. Backends that reject
//!   duplicate writes turn the loser into `AlreadyExists`.
//! - `delete_image` resolves the image's list index right before the
//!   positional remove. A concurrent remove on the same section can shift
//!   the list in between.

use crate::error::{GalleryError, GalleryResult};
use crate::metadata::{section_id_from_name, Image, Section, SectionStorage};
use crate::service::blob_service::BlobService;
use chrono::{Duration, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use log::{debug, error, info, warn};
use uuid::Uuid;

/// An image payload as received at the HTTP boundary
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub data: Vec<u8>,
    pub content_type: String,
    pub filename: String,
}

/// Outcome of a successful upload
#[derive(Debug, Clone, Serialize)]
pub struct UploadedImage {
    pub image: Image,
    pub section: Section,
}

/// Summary of one reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    pub objects_scanned: usize,
    pub referenced: usize,
    pub orphans_removed: usize,
    /// Unreferenced objects still inside the grace period
    pub orphans_pending: usize,
}

pub struct GalleryService {
    sections: Arc<dyn SectionStorage>,
    blobs: BlobService,
}

impl GalleryService {
    /// Create a new gallery service over injected stores
    pub fn new(sections: Arc<dyn SectionStorage>, blobs: BlobService) -> Self {
        Self { sections, blobs }
    }

    pub fn blobs(&self) -> &BlobService {
        &self.blobs
    }

    pub fn list_sections(&self) -> GalleryResult<Vec<Section>> {
        self.sections
            .list_sections()
            .map_err(|e| GalleryError::from_store("fetch gallery data", e))
    }

    pub fn get_section(&self, section_id: &str) -> GalleryResult<Option<Section>> {
        self.sections
            .get_section(section_id)
            .map_err(|e| GalleryError::from_store("fetch section", e))
    }

    fn require_section(&self, section_id: &str, operation: &'static str) -> GalleryResult<Section> {
        self.sections
            .get_section(section_id)
            .map_err(|e| GalleryError::from_store(operation, e))?
            .ok_or_else(|| GalleryError::NotFound("Section not found".to_string()))
    }

    /// Create an empty section whose id is derived from `name`
    pub fn create_section(&self, name: &str) -> GalleryResult<Section> {
        const OP: &str = "create section";
        if name.trim().is_empty() {
            return Err(GalleryError::Validation("Section name is required".to_string()));
        }
        let section_id = section_id_from_name(name);
        if section_id.is_empty() {
            return Err(GalleryError::Validation(
                "Section name must contain at least one letter or digit".to_string(),
            ));
        }

        let existing = self
            .sections
            .get_section(&section_id)
            .map_err(|e| GalleryError::from_store(OP, e))?;
        if existing.is_some() {
            warn!("Section already exists: {}", section_id);
            return Err(GalleryError::AlreadyExists("Section already exists".to_string()));
        }

        let section = self
            .sections
            .create_section(&section_id, name)
            .map_err(|e| GalleryError::from_store(OP, e))?;
        info!("Created section {} ({:?})", section_id, name);
        Ok(section)
    }

    /// Store the image object, then append its reference to the section
    pub fn upload_image(&self, section_id: &str, upload: ImageUpload) -> GalleryResult<UploadedImage> {
        const OP: &str = "upload image";
        if section_id.trim().is_empty() || upload.data.is_empty() {
            return Err(GalleryError::Validation("Section ID and image file are required".to_string()));
        }
        let section = self.require_section(section_id, OP)?;

        let stored = self
            .blobs
            .put(section_id, &upload.data, &upload.content_type, &upload.filename)
            .map_err(|e| GalleryError::from_store(OP, e))?;

        let mut image_id = Uuid::new_v4().to_string();
        while section.find_image(&image_id).is_some() {
            image_id = Uuid::new_v4().to_string();
        }
        let image = Image { id: image_id, url: stored.url.clone() };

        match self.sections.append_image(section_id, &image) {
            Ok(section) => {
                info!("Uploaded image {} to section {} as {}", image.id, section_id, stored.key);
                Ok(UploadedImage { image, section })
            }
            Err(e) => {
                error!(
                    "Image object {} stored but section {} was not updated, object left unreferenced: {}",
                    stored.key, section_id, e
                );
                Err(GalleryError::from_store(OP, e))
            }
        }
    }

    /// Purge every object of the section, then delete its record
    pub fn delete_section(&self, section_id: &str) -> GalleryResult<()> {
        const OP: &str = "delete section";
        let section = self.require_section(section_id, OP)?;

        let purged = self
            .blobs
            .delete_prefix(section_id)
            .map_err(|e| GalleryError::from_store(OP, e))?;
        debug!("Purged {} objects for section {} ({} referenced)", purged, section_id, section.images.len());

        self.sections.delete_section(section_id).map_err(|e| {
            error!("Objects of section {} purged but record delete failed: {}", section_id, e);
            GalleryError::from_store(OP, e)
        })?;
        info!("Deleted section {}", section_id);
        Ok(())
    }

    /// Remove the image reference from the section, then delete its object
    pub fn delete_image(&self, section_id: &str, image_id: &str) -> GalleryResult<Section> {
        const OP: &str = "delete image";
        let section = self.require_section(section_id, OP)?;
        let image = section
            .find_image(image_id)
            .cloned()
            .ok_or_else(|| GalleryError::NotFound("Image not found".to_string()))?;

        // Positional remove: resolve the index against the list as it is now
        let current = self.require_section(section_id, OP)?;
        let index = current
            .image_index(image_id)
            .ok_or_else(|| GalleryError::NotFound("Image not found".to_string()))?;
        let updated = self
            .sections
            .remove_image_at(section_id, index)
            .map_err(|e| GalleryError::from_store(OP, e))?;

        self.blobs.delete(section_id, &image.url).map_err(|e| {
            error!(
                "Image {} removed from section {} but its object at {} was not deleted: {}",
                image_id, section_id, image.url, e
            );
            GalleryError::from_store(OP, e)
        })?;

        info!("Deleted image {} from section {}", image_id, section_id);
        Ok(updated)
    }

    /// Delete objects no section references and that are older than `grace_period`
    pub fn reconcile(&self, grace_period: Duration) -> GalleryResult<ReconcileReport> {
        const OP: &str = "reconcile storage";
        let sections = self.list_sections()?;

        let mut referenced = HashSet::new();
        for section in &sections {
            for image in &section.images {
                // An unresolvable reference could shadow any object; delete nothing
                let key = self.blobs.image_key(&section.section_id, &image.url).map_err(|e| {
                    error!(
                        "Reconcile aborted: image {} of section {} has no object key: {}",
                        image.id, section.section_id, e
                    );
                    GalleryError::from_store(OP, e)
                })?;
                referenced.insert(key);
            }
        }

        let objects = self.blobs.list_all().map_err(|e| GalleryError::from_store(OP, e))?;
        let cutoff = Utc::now() - grace_period;
        let mut report = ReconcileReport {
            objects_scanned: objects.len(),
            ..ReconcileReport::default()
        };

        let mut orphans = Vec::new();
        for object in objects {
            if referenced.contains(&object.key) {
                report.referenced += 1;
            } else if object.last_modified <= cutoff {
                orphans.push(object.key);
            } else {
                report.orphans_pending += 1;
            }
        }

        if !orphans.is_empty() {
            self.blobs
                .delete_keys(&orphans)
                .map_err(|e| GalleryError::from_store(OP, e))?;
            for key in &orphans {
                info!("Reconcile removed unreferenced object {}", key);
            }
        }
        report.orphans_removed = orphans.len();
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::mock_store::MockSectionStore;
    use crate::storage::mock_store::MockBlobStore;

    const BASE: &str = "http://127.0.0.1:9710/media";

    struct Fixture {
        sections: MockSectionStore,
        blobs: MockBlobStore,
        service: GalleryService,
    }

    fn fixture() -> Fixture {
        let sections = MockSectionStore::new();
        let blobs = MockBlobStore::new();
        let service = GalleryService::new(
            Arc::new(sections.clone()),
            BlobService::new(Arc::new(blobs.clone()), BASE),
        );
        Fixture { sections, blobs, service }
    }

    fn png(name: &str) -> ImageUpload {
        ImageUpload {
            data: format!("png bytes of {}", name).into_bytes(),
            content_type: "image/png".to_string(),
            filename: format!("{}.png", name),
        }
    }

    fn key_of(url: &str) -> String {
        url.strip_prefix(&format!("{}/", BASE)).unwrap().to_string()
    }

    #[test]
    fn test_create_section_derives_id() {
        let f = fixture();
        let section = f.service.create_section("Summer Trip!").unwrap();
        assert_eq!(section.section_id, "summer-trip");
        assert_eq!(section.name, "Summer Trip!");
        assert!(section.images.is_empty());

        let again = f.service.create_section("Summer  Trip");
        assert!(matches!(again, Err(GalleryError::AlreadyExists(_))));
        assert_eq!(f.sections.len(), 1);
    }

    #[test]
    fn test_create_section_validation() {
        let f = fixture();
        assert!(matches!(f.service.create_section(""), Err(GalleryError::Validation(_))));
        assert!(matches!(f.service.create_section("   "), Err(GalleryError::Validation(_))));
        assert!(matches!(f.service.create_section("?!"), Err(GalleryError::Validation(_))));
        assert!(f.sections.is_empty());
    }

    #[test]
    fn test_create_section_store_failure_is_upstream() {
        let f = fixture();
        f.sections.set_fail_writes(true);
        let err = f.service.create_section("Trip").unwrap_err();
        assert!(matches!(err, GalleryError::UpstreamStore { operation: "create section", .. }));
    }

    #[test]
    fn test_upload_appends_one_image() {
        let f = fixture();
        f.service.create_section("Trip").unwrap();
        let first = f.service.upload_image("trip", png("a")).unwrap();
        let second = f.service.upload_image("trip", png("b")).unwrap();

        assert_eq!(second.section.images.len(), 2);
        assert_ne!(first.image.id, second.image.id);
        assert_eq!(second.section.images[0], first.image);
        assert_eq!(second.section.images[1], second.image);
        assert!(key_of(&second.image.url).starts_with("trip/"));
        assert!(f.blobs.contains(&key_of(&second.image.url)));

        let fetched = f.service.get_section("trip").unwrap().unwrap();
        assert!(fetched.images.iter().any(|i| i.id == first.image.id && i.url == first.image.url));
    }

    #[test]
    fn test_upload_requires_section_and_payload() {
        let f = fixture();
        assert!(matches!(f.service.upload_image("ghost", png("a")), Err(GalleryError::NotFound(_))));
        assert!(matches!(f.service.upload_image("", png("a")), Err(GalleryError::Validation(_))));

        f.service.create_section("Trip").unwrap();
        let empty = ImageUpload { data: Vec::new(), ..png("a") };
        assert!(matches!(f.service.upload_image("trip", empty), Err(GalleryError::Validation(_))));
        assert_eq!(f.blobs.object_count(), 0);
    }

    #[test]
    fn test_upload_blob_failure_leaves_section_untouched() {
        let f = fixture();
        f.service.create_section("Trip").unwrap();
        f.blobs.set_fail_writes(true);

        let err = f.service.upload_image("trip", png("a")).unwrap_err();
        assert!(matches!(err, GalleryError::UpstreamStore { .. }));
        assert!(f.service.get_section("trip").unwrap().unwrap().images.is_empty());
    }

    #[test]
    fn test_upload_append_failure_orphans_object_until_reconcile() {
        let f = fixture();
        f.service.create_section("Trip").unwrap();
        f.sections.set_fail_writes(true);

        let err = f.service.upload_image("trip", png("a")).unwrap_err();
        assert!(matches!(err, GalleryError::UpstreamStore { operation: "upload image", .. }));
        assert!(f.service.get_section("trip").unwrap().unwrap().images.is_empty());
        assert_eq!(f.blobs.object_count(), 1, "object is not rolled back");

        f.sections.set_fail_writes(false);
        let report = f.service.reconcile(Duration::zero()).unwrap();
        assert_eq!(report.orphans_removed, 1);
        assert_eq!(f.blobs.object_count(), 0);
    }

    #[test]
    fn test_delete_image_removes_exactly_one_entry() {
        let f = fixture();
        f.service.create_section("Trip").unwrap();
        let ids: Vec<String> = ["a", "b", "c"]
            .iter()
            .map(|n| f.service.upload_image("trip", png(n)).unwrap().image.id)
            .collect();
        let removed_url = f.service.get_section("trip").unwrap().unwrap().images[1].url.clone();

        let section = f.service.delete_image("trip", &ids[1]).unwrap();
        let remaining: Vec<&str> = section.images.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(remaining, vec![ids[0].as_str(), ids[2].as_str()]);
        assert!(!f.blobs.contains(&key_of(&removed_url)));
        assert_eq!(f.blobs.object_count(), 2);
    }

    #[test]
    fn test_delete_missing_image_leaves_section_unchanged() {
        let f = fixture();
        f.service.create_section("Summer Trip!").unwrap();
        f.service.upload_image("summer-trip", png("a")).unwrap();
        let before = f.service.get_section("summer-trip").unwrap().unwrap();

        let err = f.service.delete_image("summer-trip", "img-404").unwrap_err();
        assert!(matches!(err, GalleryError::NotFound(ref m) if m == "Image not found"));
        assert_eq!(f.service.get_section("summer-trip").unwrap().unwrap(), before);

        let err = f.service.delete_image("ghost", "img-404").unwrap_err();
        assert!(matches!(err, GalleryError::NotFound(ref m) if m == "Section not found"));
    }

    #[test]
    fn test_delete_image_object_failure_never_leaves_dangling_reference() {
        let f = fixture();
        f.service.create_section("Trip").unwrap();
        let uploaded = f.service.upload_image("trip", png("a")).unwrap();
        f.blobs.set_fail_deletes(true);

        let err = f.service.delete_image("trip", &uploaded.image.id).unwrap_err();
        assert!(matches!(err, GalleryError::UpstreamStore { .. }));
        // Reference is gone, object lingers as an orphan
        assert!(f.service.get_section("trip").unwrap().unwrap().images.is_empty());
        assert!(f.blobs.contains(&key_of(&uploaded.image.url)));
    }

    #[test]
    fn test_delete_section_purges_prefix() {
        let f = fixture();
        f.service.create_section("Trip").unwrap();
        f.service.create_section("Trip 2").unwrap();
        f.service.upload_image("trip", png("a")).unwrap();
        f.service.upload_image("trip", png("b")).unwrap();
        let kept = f.service.upload_image("trip-2", png("c")).unwrap();

        f.service.delete_section("trip").unwrap();
        assert!(f.service.get_section("trip").unwrap().is_none());
        assert_eq!(f.blobs.keys(), vec![key_of(&kept.image.url)]);

        assert!(matches!(f.service.delete_section("trip"), Err(GalleryError::NotFound(_))));
    }

    #[test]
    fn test_delete_empty_section() {
        let f = fixture();
        f.service.create_section("Empty").unwrap();
        f.service.delete_section("empty").unwrap();
        assert!(f.sections.is_empty());
    }

    #[test]
    fn test_delete_section_record_failure_is_surfaced() {
        let f = fixture();
        f.service.create_section("Trip").unwrap();
        f.service.upload_image("trip", png("a")).unwrap();
        f.sections.set_fail_writes(true);

        let err = f.service.delete_section("trip").unwrap_err();
        assert!(matches!(err, GalleryError::UpstreamStore { operation: "delete section", .. }));
        assert_eq!(f.blobs.object_count(), 0);
        assert!(f.service.get_section("trip").unwrap().is_some());

        // Retry succeeds
        f.sections.set_fail_writes(false);
        f.service.delete_section("trip").unwrap();
    }

    #[test]
    fn test_reconcile_respects_grace_period_and_references() {
        let f = fixture();
        f.service.create_section("Trip").unwrap();
        let kept = f.service.upload_image("trip", png("a")).unwrap();
        let old = Utc::now() - Duration::hours(2);
        f.blobs.set_last_modified(&key_of(&kept.image.url), old);

        // Unreferenced objects: one old, one fresh
        f.blobs_put("trip/stale.png", old);
        f.blobs_put("gone-section/fresh.png", Utc::now());

        let report = f.service.reconcile(Duration::hours(1)).unwrap();
        assert_eq!(
            report,
            ReconcileReport { objects_scanned: 3, referenced: 1, orphans_removed: 1, orphans_pending: 1 }
        );
        assert!(!f.blobs.contains("trip/stale.png"));
        assert!(f.blobs.contains("gone-section/fresh.png"));
        assert!(f.blobs.contains(&key_of(&kept.image.url)));
    }

    #[test]
    fn test_reconcile_keeps_objects_referenced_under_an_old_base_url() {
        let f = fixture();
        f.service.create_section("Trip").unwrap();
        let uploaded = f.service.upload_image("trip", png("a")).unwrap();
        let key = key_of(&uploaded.image.url);
        f.blobs.set_last_modified(&key, Utc::now() - Duration::hours(2));

        let moved = GalleryService::new(
            Arc::new(f.sections.clone()),
            BlobService::new(Arc::new(f.blobs.clone()), "https://gallery.example.com/media"),
        );
        let report = moved.reconcile(Duration::hours(1)).unwrap();
        assert_eq!(report.referenced, 1);
        assert_eq!(report.orphans_removed, 0);
        assert!(f.blobs.contains(&key));

        // Deleting through the moved service still removes the object
        moved.delete_image("trip", &uploaded.image.id).unwrap();
        assert!(!f.blobs.contains(&key));
    }

    #[test]
    fn test_reconcile_aborts_on_unresolvable_reference() {
        let f = fixture();
        f.service.create_section("Trip").unwrap();
        f.blobs_put("trip/old.png", Utc::now() - Duration::hours(2));
        let foreign = Image { id: "img-1".to_string(), url: "https://elsewhere.example.com/photo.png".to_string() };
        f.sections.append_image("trip", &foreign).unwrap();

        let result = f.service.reconcile(Duration::hours(1));
        assert!(matches!(result, Err(GalleryError::UpstreamStore { .. })));
        assert!(f.blobs.contains("trip/old.png"));
        assert_eq!(f.service.get_section("trip").unwrap().unwrap().images, vec![foreign]);
    }

    impl Fixture {
        fn blobs_put(&self, key: &str, when: chrono::DateTime<Utc>) {
            use crate::storage::BlobStorage;
            self.blobs.put_object(key, b"orphan", "image/png").unwrap();
            self.blobs.set_last_modified(key, when);
        }
    }
}
