//! Shared request-extraction helpers for the two authentication schemes:
//! virtual tokens on proxy routes, session JWTs on dashboard routes.

use axum::http::HeaderMap;

use crate::error::ApiError;

/// Extracts a bearer token from `Authorization: Bearer <token>`. Missing or
/// malformed → `Unauthorized` (step 1).
pub fn extract_bearer_token(headers: &HeaderMap) -> Result<&str, ApiError> {
    let raw = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError::Unauthorized)?;
    raw.strip_prefix("Bearer ").ok_or(ApiError::Unauthorized)
}

/// Extracts a dashboard session token from either the `token` cookie or an
/// `Authorization: Bearer` header.
pub fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    if let Ok(token) = extract_bearer_token(headers) {
        return Some(token.to_string());
    }
    let cookie_header = headers.get(axum::http::header::COOKIE)?.to_str().ok()?;
    cookie_header.split(';').find_map(|part| {
        let part = part.trim();
        part.strip_prefix("token=").map(|v| v.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn extracts_bearer_token() {
        let mut headers = HeaderMap::new();
        headers.insert(axum::http::header::AUTHORIZATION, HeaderValue::from_static("Bearer lum_abc"));
        assert_eq!(extract_bearer_token(&headers).unwrap(), "lum_abc");
    }

    #[test]
    fn missing_authorization_header_is_unauthorized() {
        let headers = HeaderMap::new();
        assert!(extract_bearer_token(&headers).is_err());
    }

    #[test]
    fn session_token_falls_back_to_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(axum::http::header::COOKIE, HeaderValue::from_static("other=1; token=abc.def.ghi"));
        assert_eq!(extract_session_token(&headers).unwrap(), "abc.def.ghi");
    }
}
