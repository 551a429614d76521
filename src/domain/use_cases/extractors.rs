use actix_web::{web, FromRequest, HttpRequest};
use futures_util::future::{ready, Ready};

use crate::{errors::AppError, AppState};

pub const ADMIN_KEY_HEADER: &str = "X-Admin-Key";

/// Extractor guarding operator-only endpoints.
/// Returns 403 unless `X-Admin-Key` matches the configured admin key.
/// With no admin key configured every request is refused.
/// Usage: Add `_admin: AdminKey` as a parameter to your handler function.
#[derive(Debug)]
pub struct AdminKey;

impl FromRequest for AdminKey {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut actix_web::dev::Payload) -> Self::Future {
        let expected = req
            .app_data::<web::Data<AppState>>()
            .and_then(|state| state.admin_api_key.clone());

        let provided = req
            .headers()
            .get(ADMIN_KEY_HEADER)
            .and_then(|value| value.to_str().ok());

        match (expected, provided) {
            (Some(expected), Some(provided)) if keys_match(expected.as_bytes(), provided.as_bytes()) => {
                ready(Ok(AdminKey))
            }
            (None, _) => {
                tracing::warn!("Admin endpoint called but no admin key is configured");
                ready(Err(AppError::ForbiddenAccess.into()))
            }
            _ => {
                tracing::warn!("Rejected admin request for path: {}", req.path());
                ready(Err(AppError::ForbiddenAccess.into()))
            }
        }
    }
}

/// Compares without short-circuiting on the first differing byte.
fn keys_match(expected: &[u8], provided: &[u8]) -> bool {
    if expected.len() != provided.len() {
        return false;
    }
    expected
        .iter()
        .zip(provided)
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}
