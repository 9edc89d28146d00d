use actix_web::{dev::Payload, web, FromRequest, HttpRequest};
use std::future::{ready, Ready};

use crate::auth::token::tokens_match;
use crate::error::AppError;
use crate::state::AppState;

/// Extractor guarding write endpoints with the configured API token.
///
/// When no token is configured every request is accepted.
///
/// Usage in handlers:
/// ```ignore
/// async fn my_handler(_auth: ApiAuth) -> HttpResponse {
///     // only reached with a valid Bearer token
/// }
/// ```
pub struct ApiAuth;

impl FromRequest for ApiAuth {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(authorize(req))
    }
}

fn authorize(req: &HttpRequest) -> Result<ApiAuth, AppError> {
    let state = req
        .app_data::<web::Data<AppState>>()
        .ok_or_else(|| AppError::Internal("Application state not configured".to_string()))?;

    let Some(expected) = state.config.security.api_token.as_deref() else {
        return Ok(ApiAuth);
    };

    let header = req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("Missing Authorization header".to_string()))?;

    let token = header.strip_prefix("Bearer ").ok_or_else(|| {
        AppError::Unauthorized(
            "Invalid Authorization header format, expected 'Bearer <token>'".to_string(),
        )
    })?;

    if !tokens_match(expected, token.trim()) {
        return Err(AppError::Unauthorized("Invalid Bearer token".to_string()));
    }

    Ok(ApiAuth)
}
