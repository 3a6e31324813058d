// HTTP surface of the gallery
//
// Reads are public. Every write handler authorizes the operator before it
// looks at the request body.

pub mod upload;

use actix_web::{delete, get, post, web, HttpRequest, HttpResponse};
use chrono::Utc;
use log::{debug, info, warn};
use serde::Deserialize;
use serde_json::json;

use crate::app_state::AppState;
use crate::auth::{authorize_request, verify_credentials, Credentials};
use crate::error::{GalleryError, StoreError};

/// Body of `POST /api/gallery/section`
#[derive(Debug, Deserialize)]
struct CreateSectionRequest {
    #[serde(default)]
    name: Option<String>,
}

/// Per-request log context.
///
/// `log_mdc` is thread-local and actix workers serve many requests on one
/// thread, so the keys are cleared when a handler starts and again when it
/// returns.
struct LogContext;

impl LogContext {
    const KEYS: [&'static str; 2] = ["operator", "section"];

    fn enter() -> Self {
        Self::clear();
        LogContext
    }

    fn snapshot() -> Vec<(&'static str, String)> {
        Self::KEYS
            .iter()
            .filter_map(|key| log_mdc::get(*key, |value| value.map(|v| (*key, v.to_string()))))
            .collect()
    }

    /// Re-establish a snapshot on another thread
    fn restore(entries: Vec<(&'static str, String)>) -> Self {
        let context = Self::enter();
        for (key, value) in entries {
            log_mdc::insert(key, value);
        }
        context
    }

    fn clear() {
        for key in Self::KEYS {
            log_mdc::remove(key);
        }
    }
}

impl Drop for LogContext {
    fn drop(&mut self) {
        Self::clear();
    }
}

/// Run store-bound work on actix's blocking pool, carrying the log context along
async fn run_blocking<T, F>(operation: &'static str, work: F) -> Result<T, GalleryError>
where
    F: FnOnce() -> Result<T, GalleryError> + Send + 'static,
    T: Send + 'static,
{
    let context = LogContext::snapshot();
    web::block(move || {
        let _log_context = LogContext::restore(context);
        work()
    })
    .await
    .map_err(|e| GalleryError::UpstreamStore {
        operation,
        source: StoreError::Unavailable(e.to_string()),
    })?
}

/// Register every gallery route on the application
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(health)
        .service(media)
        .service(
            web::scope("/api/gallery")
                .service(list_sections)
                .service(login)
                .service(create_section)
                .service(upload_image)
                .service(delete_section)
                .service(delete_image),
        );
}

#[get("/health")]
async fn health() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "OK",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

/// Serve a stored image by object key
#[get("/media/{key:.*}")]
async fn media(path: web::Path<String>, app_state: web::Data<AppState>) -> Result<HttpResponse, GalleryError> {
    let _log_context = LogContext::enter();
    let key = path.into_inner();
    debug!("GET media {}", key);

    let service = app_state.gallery_service.clone();
    let object = run_blocking("fetch image", move || {
        service.blobs().fetch(&key).map_err(|e| match e {
            StoreError::NotFound(_) | StoreError::InvalidKey(_) => GalleryError::NotFound("Image not found".to_string()),
            other => GalleryError::from_store("fetch image", other),
        })
    })
    .await?;

    Ok(HttpResponse::Ok()
        .content_type(object.content_type)
        .insert_header(("Cache-Control", "public, max-age=31536000, immutable"))
        .body(object.data))
}

#[get("")]
async fn list_sections(app_state: web::Data<AppState>) -> Result<HttpResponse, GalleryError> {
    let _log_context = LogContext::enter();
    let service = app_state.gallery_service.clone();
    let sections = run_blocking("fetch gallery data", move || service.list_sections()).await?;
    debug!("Listing {} sections", sections.len());
    Ok(HttpResponse::Ok().json(sections))
}

/// Check operator credentials sent in the body
#[post("/auth")]
async fn login(body: web::Bytes, app_state: web::Data<AppState>) -> Result<HttpResponse, GalleryError> {
    let _log_context = LogContext::enter();
    let credentials: Credentials = serde_json::from_slice(&body)
        .map_err(|_| GalleryError::Auth("Username and password required".to_string()))?;
    verify_credentials(&app_state.config.auth, &credentials)?;

    info!("Operator {} authenticated", credentials.username);
    Ok(HttpResponse::Ok().json(json!({
        "status": "authenticated",
        "username": credentials.username,
    })))
}

#[post("/section")]
async fn create_section(
    req: HttpRequest,
    body: web::Bytes,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, GalleryError> {
    let _log_context = LogContext::enter();
    authorize_request(&req, &app_state.config.auth)?;

    let request: CreateSectionRequest = serde_json::from_slice(&body).map_err(|e| {
        warn!("Rejected section body: {}", e);
        GalleryError::Validation("Section name is required".to_string())
    })?;
    let name = request.name.unwrap_or_default();

    let service = app_state.gallery_service.clone();
    let section = run_blocking("create section", move || service.create_section(&name)).await?;
    log_mdc::insert("section", &section.section_id);
    Ok(HttpResponse::Created().json(section))
}

#[post("/image")]
async fn upload_image(
    req: HttpRequest,
    payload: actix_multipart::Multipart,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, GalleryError> {
    let _log_context = LogContext::enter();
    authorize_request(&req, &app_state.config.auth)?;

    let form = upload::read_upload_form(payload, &app_state.config.upload).await?;
    log_mdc::insert("section", &form.section_id);

    let service = app_state.gallery_service.clone();
    let uploaded = run_blocking("upload image", move || service.upload_image(&form.section_id, form.image)).await?;
    Ok(HttpResponse::Created().json(json!({
        "message": "Image uploaded successfully",
        "image": uploaded.image,
        "section": uploaded.section,
    })))
}

#[delete("/section/{section_id}")]
async fn delete_section(
    req: HttpRequest,
    path: web::Path<String>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, GalleryError> {
    let _log_context = LogContext::enter();
    authorize_request(&req, &app_state.config.auth)?;

    let section_id = path.into_inner();
    log_mdc::insert("section", &section_id);

    let service = app_state.gallery_service.clone();
    run_blocking("delete section", move || service.delete_section(&section_id)).await?;
    Ok(HttpResponse::Ok().json(json!({ "message": "Section deleted successfully" })))
}

#[delete("/image/{section_id}/{image_id}")]
async fn delete_image(
    req: HttpRequest,
    path: web::Path<(String, String)>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, GalleryError> {
    let _log_context = LogContext::enter();
    authorize_request(&req, &app_state.config.auth)?;

    let (section_id, image_id) = path.into_inner();
    log_mdc::insert("section", &section_id);

    let service = app_state.gallery_service.clone();
    let section = run_blocking("delete image", move || service.delete_image(&section_id, &image_id)).await?;
    Ok(HttpResponse::Ok().json(json!({
        "message": "Image deleted successfully",
        "section": section,
    })))
}
