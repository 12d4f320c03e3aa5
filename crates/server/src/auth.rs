//! Bearer API-key authentication middleware: extract config synchronously
//! (no `.await` while holding the lock), skip public paths, constant-time
//! compare the provided key.
//!
//! Resolution and verification are split into two pure functions
//! (`resolve`, `verify_bearer`) returning a small [`AuthError`] taxonomy
//! with its own status-code mapping, rather than building an axum
//! `Response` inline at each branch.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::extract::Request;
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use parking_lot::RwLock;

use ragflow_config::Settings;

/// Paths reachable without a key: health/readiness probes and metrics
/// scraping run before any client would have a key to present.
const PUBLIC_PATHS: &[&str] = &["/health", "/ready", "/metrics"];

static AUTH_DISABLED_WARNED: AtomicBool = AtomicBool::new(false);

/// What `resolve` decided the request needs, before any header is read.
enum AuthOutcome {
    Allow,
    RequireKey(String),
}

#[derive(Debug)]
enum AuthError {
    ServerMisconfigured(&'static str),
    MissingCredentials,
    MalformedCredentials,
    InvalidKey,
}

impl AuthError {
    fn status(&self) -> StatusCode {
        match self {
            AuthError::ServerMisconfigured(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AuthError::MissingCredentials | AuthError::InvalidKey => StatusCode::UNAUTHORIZED,
            AuthError::MalformedCredentials => StatusCode::BAD_REQUEST,
        }
    }

    fn message(&self) -> &'static str {
        match self {
            AuthError::ServerMisconfigured(_) => "server authentication not configured",
            AuthError::MissingCredentials => "missing Authorization header",
            AuthError::MalformedCredentials => "invalid Authorization header format, expected: Bearer <token>",
            AuthError::InvalidKey => "invalid API key",
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        if let AuthError::ServerMisconfigured(reason) = &self {
            tracing::error!("{reason}");
        }
        (self.status(), self.message()).into_response()
    }
}

/// Decides, from config alone, whether this path needs a key and which key
/// is expected. Reads the config lock synchronously and drops it before
/// returning, so the caller never holds it across an `.await`.
fn resolve(config: &Arc<RwLock<Settings>>, path: &str) -> Result<AuthOutcome, AuthError> {
    let config_guard = config.read();
    let auth_config = &config_guard.server.auth;

    if !auth_config.enabled {
        if !AUTH_DISABLED_WARNED.swap(true, Ordering::Relaxed) {
            tracing::warn!("API authentication is disabled; set RAGFLOW__SERVER__AUTH__ENABLED=true for production");
        }
        return Ok(AuthOutcome::Allow);
    }

    if PUBLIC_PATHS.iter().any(|p| path.starts_with(p)) {
        return Ok(AuthOutcome::Allow);
    }

    match &auth_config.api_key {
        Some(key) if !key.is_empty() => Ok(AuthOutcome::RequireKey(key.clone())),
        _ => Err(AuthError::ServerMisconfigured("auth is enabled but no API key is configured")),
    }
}

/// Reads the `Authorization` header off `request` and compares it against
/// `expected_key` in constant time.
fn verify_bearer(request: &Request, expected_key: &str) -> Result<(), AuthError> {
    let header_value = request.headers().get(header::AUTHORIZATION).and_then(|v| v.to_str().ok());

    match header_value {
        Some(value) if value.starts_with("Bearer ") => {
            let provided_key = &value[7..];
            if constant_time_compare(provided_key.as_bytes(), expected_key.as_bytes()) {
                Ok(())
            } else {
                tracing::warn!("invalid API key presented");
                Err(AuthError::InvalidKey)
            }
        }
        Some(_) => Err(AuthError::MalformedCredentials),
        None => Err(AuthError::MissingCredentials),
    }
}

pub async fn auth_middleware(request: Request, next: Next) -> Response {
    let config = match request.extensions().get::<Arc<RwLock<Settings>>>() {
        Some(cfg) => cfg.clone(),
        None => {
            tracing::error!("config extension missing from request");
            return AuthError::ServerMisconfigured("config extension missing from request").into_response();
        }
    };

    let path = request.uri().path().to_string();
    let outcome = resolve(&config, &path);

    match outcome {
        Ok(AuthOutcome::Allow) => next.run(request).await,
        Ok(AuthOutcome::RequireKey(expected_key)) => match verify_bearer(&request, &expected_key) {
            Ok(()) => next.run(request).await,
            Err(err) => err.into_response(),
        },
        Err(err) => err.into_response(),
    }
}

fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_time_compare_matches_equal_keys() {
        assert!(constant_time_compare(b"secret", b"secret"));
    }

    #[test]
    fn constant_time_compare_rejects_mismatch() {
        assert!(!constant_time_compare(b"secret", b"secre"));
        assert!(!constant_time_compare(b"secret", b"secreT"));
    }

    #[test]
    fn auth_error_status_codes_match_taxonomy() {
        assert_eq!(AuthError::ServerMisconfigured("x").status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(AuthError::MissingCredentials.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(AuthError::InvalidKey.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(AuthError::MalformedCredentials.status(), StatusCode::BAD_REQUEST);
    }
}
