//! Section Record Storage Abstraction
//!
//! This module provides an abstraction over the document store that keeps one
//! record per gallery section, with the section's ordered list of image
//! references. Backends (SQLite, in-memory) can be swapped without affecting
//! the gallery service.

pub mod sqlite_store;
pub mod mock_store;
pub mod config;

#[cfg(test)]
mod comprehensive_test;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreResult;

/// Section identifier type
pub type SectionId = String;

/// Reference to one stored image
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Image {
    /// Opaque unique token
    pub id: String,
    /// Public retrieval URL of the image blob
    pub url: String,
}

/// A named, ordered collection of image references
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    pub section_id: SectionId,
    pub name: String,
    #[serde(default)]
    pub images: Vec<Image>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Section {
    /// A fresh record with no images
    pub fn new(section_id: &str, name: &str) -> Self {
        let now = Utc::now();
        Self {
            section_id: section_id.to_string(),
            name: name.to_string(),
            images: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Position of the image with `image_id`, if present
    pub fn image_index(&self, image_id: &str) -> Option<usize> {
        self.images.iter().position(|image| image.id == image_id)
    }

    pub fn find_image(&self, image_id: &str) -> Option<&Image> {
        self.images.iter().find(|image| image.id == image_id)
    }

    /// Bump `updated_at` to now without ever moving it backwards
    pub fn touch(&mut self) {
        let now = Utc::now();
        if now > self.updated_at {
            self.updated_at = now;
        }
    }
}

/// Derive a section id from its display name.
///
/// Lowercases the name, collapses every run of characters outside `[a-z0-9]`
/// into one hyphen and trims hyphens from both ends. Returns an empty string
/// when the name has no alphanumeric characters.
pub fn section_id_from_name(name: &str) -> SectionId {
    let mut id = String::with_capacity(name.len());
    let mut pending_hyphen = false;
    for c in name.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if pending_hyphen && !id.is_empty() {
                id.push('-');
            }
            pending_hyphen = false;
            id.push(c);
        } else {
            pending_hyphen = true;
        }
    }
    id
}

/// Trait defining the section record storage interface
pub trait SectionStorage: Send + Sync {
    /// Full scan of all section records, in no particular order
    fn list_sections(&self) -> StoreResult<Vec<Section>>;

    /// Point lookup; `Ok(None)` when the section does not exist
    fn get_section(&self, section_id: &str) -> StoreResult<Option<Section>>;

    /// Write a new empty record. Backends whose writes reject duplicates report `StoreError::Conflict`.
    fn create_section(&self, section_id: &str, name: &str) -> StoreResult<Section>;

    /// Atomically append one image to the record and refresh `updated_at`
    fn append_image(&self, section_id: &str, image: &Image) -> StoreResult<Section>;

    /// Atomically remove the image at `index` and refresh `updated_at`
    fn remove_image_at(&self, section_id: &str, index: usize) -> StoreResult<Section>;

    /// Delete the record; deleting an absent section succeeds
    fn delete_section(&self, section_id: &str) -> StoreResult<()>;
}
