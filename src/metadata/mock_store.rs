//! Mock implementation of SectionStorage for testing

use crate::error::{StoreError, StoreResult};
use crate::metadata::{Image, Section, SectionId, SectionStorage};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// In-memory section store. Clones share the same underlying map.
#[derive(Clone, Default)]
pub struct MockSectionStore {
    data: Arc<Mutex<HashMap<SectionId, Section>>>,
    fail_writes: Arc<AtomicBool>,
}

impl MockSectionStore {
    /// Create a new mock section store
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear all data from the store (useful for test cleanup)
    pub fn clear(&self) {
        self.data.lock().unwrap().clear();
    }

    /// Get the number of sections in the store
    pub fn len(&self) -> usize {
        self.data.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Make every mutating call fail with `StoreError::Unavailable`
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writes(&self) -> StoreResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("mock section store rejects writes".to_string()));
        }
        Ok(())
    }
}

impl SectionStorage for MockSectionStore {
    fn list_sections(&self) -> StoreResult<Vec<Section>> {
        Ok(self.data.lock().unwrap().values().cloned().collect())
    }

    fn get_section(&self, section_id: &str) -> StoreResult<Option<Section>> {
        Ok(self.data.lock().unwrap().get(section_id).cloned())
    }

    fn create_section(&self, section_id: &str, name: &str) -> StoreResult<Section> {
        self.check_writes()?;
        let mut data = self.data.lock().unwrap();
        if data.contains_key(section_id) {
            return Err(StoreError::Conflict(section_id.to_string()));
        }
        let section = Section::new(section_id, name);
        data.insert(section_id.to_string(), section.clone());
        Ok(section)
    }

    fn append_image(&self, section_id: &str, image: &Image) -> StoreResult<Section> {
        self.check_writes()?;
        let mut data = self.data.lock().unwrap();
        let section = data
            .get_mut(section_id)
            .ok_or_else(|| StoreError::NotFound("Section not found".to_string()))?;
        section.images.push(image.clone());
        section.touch();
        Ok(section.clone())
    }

    fn remove_image_at(&self, section_id: &str, index: usize) -> StoreResult<Section> {
        self.check_writes()?;
        let mut data = self.data.lock().unwrap();
        let section = data
            .get_mut(section_id)
            .ok_or_else(|| StoreError::NotFound("Section not found".to_string()))?;
        if index >= section.images.len() {
            return Err(StoreError::NotFound("Image not found".to_string()));
        }
        section.images.remove(index);
        section.touch();
        Ok(section.clone())
    }

    fn delete_section(&self, section_id: &str) -> StoreResult<()> {
        self.check_writes()?;
        self.data.lock().unwrap().remove(section_id);
        Ok(())
    }
}
