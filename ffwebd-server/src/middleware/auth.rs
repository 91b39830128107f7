//! Bearer-token authentication for the `/api/v1` surface.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::state::AppState;

pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Response {
    if !state.config.auth_enable {
        return next.run(req).await;
    }

    let header = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    match authorize(header, &state.config.auth_key) {
        Ok(()) => next.run(req).await,
        Err(message) => {
            (StatusCode::UNAUTHORIZED, Json(json!({ "error": message }))).into_response()
        }
    }
}

/// Check an `Authorization` header value against the configured key.
/// The scheme comparison is case-insensitive; the key comparison is
/// exact.
fn authorize(header: Option<&str>, key: &str) -> Result<(), &'static str> {
    let Some(header) = header else {
        return Err("Authorization header required");
    };
    let parts: Vec<&str> = header.split(' ').collect();
    if parts.len() != 2 || !parts[0].eq_ignore_ascii_case("bearer") {
        return Err("Invalid Authorization header format");
    }
    if parts[1] != key {
        return Err("Invalid token");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_header_is_rejected() {
        assert_eq!(authorize(None, "123456"), Err("Authorization header required"));
    }

    #[test]
    fn malformed_headers_are_rejected() {
        for bad in ["123456", "Bearer", "Bearer a b", "Basic 123456"] {
            assert_eq!(
                authorize(Some(bad), "123456"),
                Err("Invalid Authorization header format"),
                "header {bad:?} should be malformed"
            );
        }
    }

    #[test]
    fn wrong_key_is_rejected() {
        assert_eq!(authorize(Some("Bearer nope"), "123456"), Err("Invalid token"));
        // The key comparison is exact, including case.
        assert_eq!(authorize(Some("Bearer ABC"), "abc"), Err("Invalid token"));
    }

    #[test]
    fn scheme_is_case_insensitive() {
        for scheme in ["Bearer", "bearer", "BEARER", "bEaReR"] {
            assert_eq!(authorize(Some(&format!("{scheme} 123456")), "123456"), Ok(()));
        }
    }
}
