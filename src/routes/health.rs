use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::AppState;

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "environment": if state.config.environment.is_production() { "production" } else { "development" },
    }))
}

#[cfg(test)]
mod tests {
    use crate::testing::TestApp;
    use axum::http::StatusCode;

    #[tokio::test]
    async fn reports_liveness() {
        let app = TestApp::new();
        let res = app.get("/health", None).await;
        assert_eq!(res.status, StatusCode::OK);
        let body = res.json();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["environment"], "development");
        assert_eq!(res.headers["x-content-type-options"], "nosniff");
    }
}
