use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use super::{ApiError, AppState};

pub const ADMIN_KEY_HEADER: &str = "X-Admin-Key";

/// Guards the admin routes with the static key from `server.admin_key`.
///
/// An empty configured key disables the admin surface entirely.
pub async fn admin_middleware(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Response {
    let expected = state.config().read().await.server.admin_key.clone();

    match extract_admin_key(&headers) {
        Some(key) if !expected.is_empty() && key == expected => next.run(request).await,
        _ => ApiError::Unauthorized("Invalid admin key".to_string()).into_response(),
    }
}

fn extract_admin_key(headers: &HeaderMap) -> Option<String> {
    if let Some(value) = headers.get(ADMIN_KEY_HEADER)
        && let Ok(key) = value.to_str()
    {
        return Some(key.trim().to_string());
    }

    if let Some(value) = headers.get("Authorization")
        && let Ok(auth) = value.to_str()
        && let Some(token) = auth.strip_prefix("Bearer ")
    {
        return Some(token.trim().to_string());
    }

    None
}
