//! Multipart form reader for image uploads
//!
//! The form has two fields: `sectionId` (text) and `image` (file). The image
//! must declare an `image/*` content type and fit within the configured size
//! limit; both checks happen while streaming, before the gallery service is
//! called.

use actix_multipart::{Field, Multipart};
use bytes::BytesMut;
use futures::StreamExt;
use log::{debug, warn};

use crate::config::UploadConfig;
use crate::error::GalleryError;
use crate::service::gallery_service::ImageUpload;

/// Upper bound for plain text fields such as `sectionId`
const MAX_TEXT_FIELD_BYTES: usize = 1024;

/// A fully read upload form
#[derive(Debug)]
pub struct UploadForm {
    pub section_id: String,
    pub image: ImageUpload,
}

fn malformed(e: impl std::fmt::Display) -> GalleryError {
    GalleryError::Validation(format!("Malformed multipart body: {}", e))
}

/// Read a field into memory, failing once it grows past `limit` bytes
async fn read_field(field: &mut Field, limit: usize, name: &str) -> Result<Vec<u8>, GalleryError> {
    let mut bytes = BytesMut::new();
    while let Some(chunk) = field.next().await {
        let chunk = chunk.map_err(malformed)?;
        if bytes.len() + chunk.len() > limit {
            warn!("Form field {} exceeds {} bytes", name, limit);
            return Err(GalleryError::Validation(format!(
                "Field '{}' exceeds the {} byte limit",
                name, limit
            )));
        }
        bytes.extend_from_slice(&chunk);
    }
    Ok(bytes.to_vec())
}

async fn drain_field(field: &mut Field) -> Result<(), GalleryError> {
    while let Some(chunk) = field.next().await {
        chunk.map_err(malformed)?;
    }
    Ok(())
}

/// Stream the multipart payload into an `UploadForm`
pub async fn read_upload_form(mut payload: Multipart, limits: &UploadConfig) -> Result<UploadForm, GalleryError> {
    let mut section_id: Option<String> = None;
    let mut image: Option<ImageUpload> = None;

    while let Some(field) = payload.next().await {
        let mut field = field.map_err(malformed)?;
        let (name, filename) = match field.content_disposition() {
            Some(cd) => (
                cd.get_name().unwrap_or_default().to_string(),
                cd.get_filename().map(str::to_string),
            ),
            None => (String::new(), None),
        };

        match name.as_str() {
            "sectionId" => {
                let raw = read_field(&mut field, MAX_TEXT_FIELD_BYTES, "sectionId").await?;
                let value = String::from_utf8(raw)
                    .map_err(|_| GalleryError::Validation("sectionId must be UTF-8 text".to_string()))?;
                section_id = Some(value.trim().to_string());
            }
            "image" => {
                let content_type = field
                    .content_type()
                    .map(|mime| mime.essence_str().to_string())
                    .unwrap_or_default();
                if !content_type.starts_with("image/") {
                    warn!("Rejected upload with content type {:?}", content_type);
                    return Err(GalleryError::Validation("Only image files are allowed".to_string()));
                }
                let data = read_field(&mut field, limits.max_image_bytes, "image").await?;
                debug!("Received image {:?} ({} bytes, {})", filename, data.len(), content_type);
                image = Some(ImageUpload {
                    data,
                    content_type,
                    filename: filename.unwrap_or_default(),
                });
            }
            other => {
                debug!("Skipping unexpected form field {:?}", other);
                drain_field(&mut field).await?;
            }
        }
    }

    match (section_id, image) {
        (Some(section_id), Some(image)) if !section_id.is_empty() && !image.data.is_empty() => {
            Ok(UploadForm { section_id, image })
        }
        _ => Err(GalleryError::Validation("Section ID and image file are required".to_string())),
    }
}
