//! Carries the session token between client and server: a `jwt` cookie on
//! the way out, a bearer header or the same cookie on the way in.

use axum::http::header::{AUTHORIZATION, COOKIE};
use axum::http::{HeaderMap, HeaderValue};
use chrono::{DateTime, Duration, Utc};

use crate::error::AppError;

pub const SESSION_COOKIE_NAME: &str = "jwt";

const LOGGED_OUT_VALUE: &str = "loggedout";

/// `Set-Cookie` value for a freshly issued token. Always `HttpOnly`;
/// `Secure` only when the deployment serves HTTPS (production).
pub fn session_cookie(
    token: &str,
    expires_in_days: i64,
    secure: bool,
    now: DateTime<Utc>,
) -> Result<HeaderValue, AppError> {
    build_cookie(token, now + Duration::days(expires_in_days), secure)
}

/// Overwrites the session with a dummy value that expires in ten seconds.
pub fn logout_cookie(secure: bool, now: DateTime<Utc>) -> Result<HeaderValue, AppError> {
    build_cookie(LOGGED_OUT_VALUE, now + Duration::seconds(10), secure)
}

fn build_cookie(value: &str, expires: DateTime<Utc>, secure: bool) -> Result<HeaderValue, AppError> {
    let mut cookie = format!(
        "{SESSION_COOKIE_NAME}={value}; Path=/; Expires={}; HttpOnly; SameSite=Lax",
        expires.format("%a, %d %b %Y %H:%M:%S GMT")
    );
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
        .map_err(|e| AppError::Internal(format!("invalid session cookie: {e}")))
}

/// Prefers `Authorization: Bearer`, falls back to the session cookie.
pub fn extract_token(headers: &HeaderMap) -> Option<String> {
    bearer_token(headers).or_else(|| cookie_token(headers))
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = value.trim().strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

fn cookie_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| key.trim() == SESSION_COOKIE_NAME)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
