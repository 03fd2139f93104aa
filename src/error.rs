use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use http_body_util::BodyExt;
use serde_json::json;

use crate::config::Environment;
use crate::html;

const RATE_LIMIT_MESSAGE: &str = "Too many requests from this IP, please try again in an hour!";

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("Token is invalid or has expired")]
    InvalidOrExpiredToken,

    #[error("{0}")]
    Unauthorized(String),

    #[error("Invalid token. Please log in again!")]
    InvalidToken,

    #[error("Your token has expired! Please log in again.")]
    TokenExpired,

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Delivery(String),

    #[error("internal: {0}")]
    Internal(String),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::InvalidOrExpiredToken => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) | AppError::InvalidToken | AppError::TokenExpired => {
                StatusCode::UNAUTHORIZED
            }
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Delivery(_) | AppError::Internal(_) | AppError::Sqlx(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Operational errors carry a message that is safe to show to clients.
    pub fn is_operational(&self) -> bool {
        !matches!(self, AppError::Internal(_) | AppError::Sqlx(_))
    }
}

/// What the error normalizer needs to render a failure. Attached to the
/// response by `AppError::into_response`, consumed by `normalize_errors`.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub status: StatusCode,
    pub message: String,
    pub operational: bool,
    pub detail: String,
}

impl ErrorReport {
    fn status_label(&self) -> &'static str {
        if self.status.is_client_error() {
            "fail"
        } else {
            "error"
        }
    }

    fn public_message(&self, environment: Environment) -> &str {
        if environment.is_production() && !self.operational {
            "Something went very wrong!"
        } else {
            &self.message
        }
    }

    fn to_json(&self, environment: Environment) -> serde_json::Value {
        let mut body = json!({
            "status": self.status_label(),
            "message": self.public_message(environment),
        });
        if !environment.is_production() {
            body["error"] = json!(self.detail);
        }
        body
    }

    fn to_html(&self, environment: Environment) -> String {
        let message = if environment.is_production() && !self.operational {
            "Please try again later."
        } else {
            &self.message
        };
        html::error_page(self.status, message)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let report = ErrorReport {
            status: self.status_code(),
            message: self.to_string(),
            operational: self.is_operational(),
            detail: format!("{self:?}"),
        };
        let body = axum::Json(json!({
            "status": report.status_label(),
            "message": report.public_message(Environment::Production),
        }));
        let mut response = (report.status, body).into_response();
        response.extensions_mut().insert(report);
        response
    }
}

/// Single collector for failures. Every 4xx/5xx leaving the router is
/// rewritten as `{status, message}` JSON under `/api` and as an HTML error
/// page elsewhere. Responses produced by the framework itself (extractor
/// rejections, the rate limiter, body limits) have no `ErrorReport`; their
/// plain-text body becomes the message.
pub async fn normalize_errors(
    State(environment): State<Environment>,
    req: Request,
    next: Next,
) -> Response {
    let is_api = req.uri().path().starts_with("/api");
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let response = next.run(req).await;
    let status = response.status();
    if !(status.is_client_error() || status.is_server_error()) {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let report = match parts.extensions.remove::<ErrorReport>() {
        Some(report) => report,
        None => {
            let bytes = body
                .collect()
                .await
                .map(http_body_util::Collected::to_bytes)
                .unwrap_or_default();
            bare_report(status, &String::from_utf8_lossy(&bytes))
        }
    };

    if status.is_server_error() {
        tracing::error!("{} {} -> {} {}", method, path, status, report.detail);
    } else {
        tracing::debug!("{} {} -> {} {}", method, path, status, report.message);
    }

    parts.headers.remove(CONTENT_LENGTH);
    let body = if is_api {
        parts
            .headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Body::from(report.to_json(environment).to_string())
    } else {
        parts
            .headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("text/html; charset=utf-8"));
        Body::from(report.to_html(environment))
    };
    Response::from_parts(parts, body)
}

fn bare_report(status: StatusCode, body: &str) -> ErrorReport {
    let message = if status == StatusCode::TOO_MANY_REQUESTS {
        RATE_LIMIT_MESSAGE.to_string()
    } else if body.trim().is_empty() {
        status
            .canonical_reason()
            .unwrap_or("Request failed")
            .to_string()
    } else {
        body.trim().to_string()
    };
    ErrorReport {
        status,
        operational: status.is_client_error(),
        detail: body.trim().to_string(),
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::middleware;
    use axum::routing::get;
    use axum::Router;
    use tower::ServiceExt;

    fn router(environment: Environment) -> Router {
        Router::new()
            .route(
                "/api/forbidden",
                get(|| async { Err::<(), _>(AppError::Forbidden("nope".into())) }),
            )
            .route(
                "/api/boom",
                get(|| async { Err::<(), _>(AppError::Internal("db exploded".into())) }),
            )
            .route(
                "/api/teapot",
                get(|| async { (StatusCode::IM_A_TEAPOT, "short and stout") }),
            )
            .route(
                "/page",
                get(|| async { Err::<(), _>(AppError::NotFound("<b>gone</b>".into())) }),
            )
            .route(
                "/page/boom",
                get(|| async { Err::<(), _>(AppError::Internal("secret".into())) }),
            )
            .layer(middleware::from_fn_with_state(environment, normalize_errors))
    }

    async fn call(environment: Environment, uri: &str) -> (StatusCode, String, String) {
        let response = router(environment)
            .oneshot(axum::http::Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, content_type, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[test]
    fn taxonomy_maps_to_status_codes() {
        assert_eq!(AppError::Validation("x".into()).status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::InvalidOrExpiredToken.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::Unauthorized("x".into()).status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::TokenExpired.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::Forbidden("x".into()).status_code(), StatusCode::FORBIDDEN);
        assert_eq!(AppError::NotFound("x".into()).status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            AppError::Delivery("x".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert!(AppError::Delivery("x".into()).is_operational());
        assert!(!AppError::Internal("x".into()).is_operational());

        let db = AppError::from(sqlx::Error::PoolTimedOut);
        assert_eq!(db.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!db.is_operational());
    }

    #[tokio::test]
    async fn client_errors_are_fail_json_on_api_routes() {
        let (status, content_type, body) = call(Environment::Production, "/api/forbidden").await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(content_type, "application/json");
        let body: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(body["status"], "fail");
        assert_eq!(body["message"], "nope");
        assert!(body.get("error").is_none());
    }

    #[tokio::test]
    async fn production_hides_internal_errors() {
        let (status, _, body) = call(Environment::Production, "/api/boom").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let body: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(body["status"], "error");
        assert_eq!(body["message"], "Something went very wrong!");
        assert!(!body.to_string().contains("db exploded"));
    }

    #[tokio::test]
    async fn development_includes_detail() {
        let (_, _, body) = call(Environment::Development, "/api/boom").await;
        let body: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(body["message"], "internal: db exploded");
        assert!(body["error"].as_str().unwrap().contains("Internal"));
    }

    #[tokio::test]
    async fn bare_framework_errors_are_normalized() {
        let (status, content_type, body) = call(Environment::Production, "/api/teapot").await;
        assert_eq!(status, StatusCode::IM_A_TEAPOT);
        assert_eq!(content_type, "application/json");
        let body: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(body["status"], "fail");
        assert_eq!(body["message"], "short and stout");
    }

    #[tokio::test]
    async fn view_routes_render_escaped_html() {
        let (status, content_type, body) = call(Environment::Development, "/page").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(content_type.starts_with("text/html"));
        assert!(body.contains("&lt;b&gt;gone&lt;/b&gt;"));
        assert!(!body.contains("<b>gone</b>"));
    }

    #[tokio::test]
    async fn view_routes_hide_internal_errors_in_production() {
        let (_, _, body) = call(Environment::Production, "/page/boom").await;
        assert!(body.contains("Please try again later."));
        assert!(!body.contains("secret"));
    }

    #[test]
    fn rate_limit_gets_a_friendly_message() {
        let report = bare_report(StatusCode::TOO_MANY_REQUESTS, "Too Many Requests! Wait for 36s");
        assert_eq!(report.message, RATE_LIMIT_MESSAGE);
        assert!(report.operational);
    }
}
