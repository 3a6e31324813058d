// Operator authentication
//
// The gallery has a single operator identity configured in `AuthConfig`.
// Write routes carry it as an HTTP Basic `Authorization` header; the login
// route accepts it in the request body. Both paths compare against the same
// configured pair.

use actix_web::HttpRequest;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use log::{info, warn};

use crate::config::AuthConfig;
use crate::error::GalleryError;

/// Credentials presented by a client
#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Decode a `Basic <base64(user:pass)>` header value
pub fn parse_basic_authorization(header: &str) -> Result<Credentials, GalleryError> {
    let encoded = header
        .strip_prefix("Basic ")
        .ok_or_else(|| GalleryError::Auth("Authentication required".to_string()))?;

    let decoded = STANDARD
        .decode(encoded.trim())
        .map_err(|_| GalleryError::Auth("Invalid credentials".to_string()))?;
    let decoded = String::from_utf8(decoded)
        .map_err(|_| GalleryError::Auth("Invalid credentials".to_string()))?;

    // Passwords may contain ':'; the username may not
    let (username, password) = decoded
        .split_once(':')
        .ok_or_else(|| GalleryError::Auth("Invalid credentials".to_string()))?;

    Ok(Credentials {
        username: username.to_string(),
        password: password.to_string(),
    })
}

/// Compare presented credentials against the configured operator
pub fn verify_credentials(config: &AuthConfig, credentials: &Credentials) -> Result<(), GalleryError> {
    if !config.is_configured() {
        warn!("Rejecting credentials: operator identity is not configured");
        return Err(GalleryError::Auth("Invalid credentials".to_string()));
    }
    if credentials.username != config.username || credentials.password != config.password {
        warn!("Invalid credentials for user: {}", credentials.username);
        return Err(GalleryError::Auth("Invalid credentials".to_string()));
    }
    Ok(())
}

/// Authorize a write request from its Basic `Authorization` header
pub fn authorize_request(req: &HttpRequest, config: &AuthConfig) -> Result<Credentials, GalleryError> {
    let header = req
        .headers()
        .get("Authorization")
        .ok_or_else(|| {
            warn!("Missing Authorization header on {}", req.path());
            GalleryError::Auth("Authentication required".to_string())
        })?
        .to_str()
        .map_err(|_| GalleryError::Auth("Authentication required".to_string()))?;

    let credentials = parse_basic_authorization(header)?;
    verify_credentials(config, &credentials)?;

    log_mdc::insert("operator", &credentials.username);
    info!("Authorized operator {} for {} {}", credentials.username, req.method(), req.path());
    Ok(credentials)
}

/// Header value for the given credentials, for clients and tests
pub fn basic_authorization_value(username: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{}:{}", username, password)))
}
