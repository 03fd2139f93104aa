//! Request pipeline. Every request passes the stages in `ORDER`, outermost
//! first; responses travel back through them in reverse.

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::header::{self, HeaderName};
use axum::http::{HeaderValue, Method, Uri};
use axum::middleware;
use axum::Router;
use tower_governor::governor::GovernorConfigBuilder;
use tower_governor::key_extractor::SmartIpKeyExtractor;
use tower_governor::GovernorLayer;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::error::{normalize_errors, AppError};
use crate::routes;
use crate::AppState;

/// Request bodies larger than this are rejected with 413.
pub const BODY_LIMIT_BYTES: usize = 10 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Opens a request span. Sees every request, including rejected ones.
    Trace,
    /// Adds the hardening headers to every response that does not already
    /// carry them, error pages included.
    SecurityHeaders,
    /// Answers preflights and decorates responses with CORS headers.
    Cors,
    /// Rewrites every 4xx/5xx coming back from the inner stages into the
    /// JSON or HTML error shape. Must sit outside rate and body limits so
    /// their rejections are normalized too.
    ErrorNormalizer,
    /// Per-IP budget for `/api` requests; exhausted budgets get 429.
    RateLimit,
    /// Caps request bodies on `/api` at `BODY_LIMIT_BYTES`.
    BodyLimit,
    /// API and page handlers.
    Routes,
    /// Anything no route matched becomes a 404 `AppError`.
    NotFound,
}

pub const ORDER: [Stage; 8] = [
    Stage::Trace,
    Stage::SecurityHeaders,
    Stage::Cors,
    Stage::ErrorNormalizer,
    Stage::RateLimit,
    Stage::BodyLimit,
    Stage::Routes,
    Stage::NotFound,
];

impl Stage {
    /// Stages wrapping only the API router rather than the whole app.
    fn is_api_only(self) -> bool {
        matches!(self, Stage::RateLimit | Stage::BodyLimit)
    }

    fn apply(self, router: Router<AppState>, state: &AppState) -> Router<AppState> {
        match self {
            Stage::Trace => router.layer(TraceLayer::new_for_http()),
            Stage::SecurityHeaders => security_headers()
                .into_iter()
                .fold(router, |router, (name, value)| {
                    router.layer(SetResponseHeaderLayer::if_not_present(name, value))
                }),
            Stage::Cors => router.layer(cors(&state.config.cors_origins)),
            Stage::ErrorNormalizer => router.layer(middleware::from_fn_with_state(
                state.config.environment,
                normalize_errors,
            )),
            Stage::RateLimit => rate_limited(router, state.config.rate_limit_per_hour),
            Stage::BodyLimit => router.layer(DefaultBodyLimit::max(BODY_LIMIT_BYTES)),
            Stage::Routes => router
                .merge(routes::site_router(state.clone()))
                .merge(routes::health_router()),
            Stage::NotFound => router.fallback(not_found),
        }
    }
}

/// Assembles the application. Layers added later wrap the ones added
/// before, so stages are applied innermost first.
pub fn build(state: AppState) -> Router {
    let api = ORDER
        .iter()
        .rev()
        .filter(|stage| stage.is_api_only())
        .fold(routes::api_router(state.clone()), |router, stage| {
            stage.apply(router, &state)
        });

    let app = ORDER
        .iter()
        .rev()
        .filter(|stage| !stage.is_api_only())
        .fold(api, |router, stage| stage.apply(router, &state));

    app.with_state(state)
}

fn security_headers() -> Vec<(HeaderName, HeaderValue)> {
    vec![
        (header::X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff")),
        (header::X_FRAME_OPTIONS, HeaderValue::from_static("SAMEORIGIN")),
        (header::REFERRER_POLICY, HeaderValue::from_static("no-referrer")),
        (header::X_XSS_PROTECTION, HeaderValue::from_static("0")),
        (
            header::STRICT_TRANSPORT_SECURITY,
            HeaderValue::from_static("max-age=15552000; includeSubDomains"),
        ),
        (
            HeaderName::from_static("cross-origin-opener-policy"),
            HeaderValue::from_static("same-origin"),
        ),
    ]
}

fn cors(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }

    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("ignoring invalid CORS origin {origin:?}");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
}

fn rate_limited(router: Router<AppState>, per_hour: u32) -> Router<AppState> {
    if per_hour == 0 {
        tracing::info!("API rate limiting disabled");
        return router;
    }

    // One token per hour / per_hour, bucket size per_hour.
    let replenish_ms = (3_600_000 / u64::from(per_hour)).max(1);
    let Some(config) = GovernorConfigBuilder::default()
        .key_extractor(SmartIpKeyExtractor)
        .per_millisecond(replenish_ms)
        .burst_size(per_hour)
        .finish()
    else {
        tracing::warn!(per_hour, "invalid rate limit, API rate limiting disabled");
        return router;
    };

    router.layer(GovernorLayer {
        config: Arc::new(config),
    })
}

async fn not_found(uri: Uri) -> AppError {
    AppError::NotFound(format!("Can't find {uri} on this server!"))
}
