//! Shared fixtures for router-level tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE, SET_COOKIE};
use axum::http::{HeaderMap, Method, Request, StatusCode};
use axum::Router;
use chrono::Duration;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use crate::auth::{hash_password, Role};
use crate::config::{Config, Environment};
use crate::mail::{Email, MailError, Mailer};
use crate::store::{MemoryUserStore, NewUser, User, UserStore};
use crate::{pipeline, AppState};

pub fn test_config(environment: Environment) -> Config {
    Config {
        environment,
        listen_addr: "127.0.0.1:3000".into(),
        database_url: None,
        database_max_connections: 1,
        jwt_secret: "test-secret-that-is-at-least-32-characters".into(),
        jwt_expires_in: Duration::days(90),
        jwt_cookie_expires_in_days: 90,
        password_reset_ttl: Duration::minutes(10),
        rate_limit_per_hour: 0,
        cors_origins: Vec::new(),
        email_api_url: None,
        email_api_key: None,
        email_from: "Natours <test@natours.io>".into(),
    }
}

/// Captures outgoing mail; can be switched to fail every delivery.
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<Email>>,
    failing: AtomicBool,
}

impl RecordingMailer {
    pub fn fail_deliveries(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<Email> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: &Email) -> Result<(), MailError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(MailError::Transport("smtp unreachable".into()));
        }
        self.sent.lock().unwrap().push(email.clone());
        Ok(())
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_str(&self.body).unwrap()
    }

    pub fn set_cookie(&self) -> Option<String> {
        self.headers
            .get(SET_COOKIE)
            .map(|v| v.to_str().unwrap().to_string())
    }

    pub fn token(&self) -> String {
        self.json()["token"].as_str().unwrap().to_string()
    }
}

pub struct TestApp {
    pub state: AppState,
    pub mailer: Arc<RecordingMailer>,
    router: Router,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(test_config(Environment::Development))
    }

    pub fn with_config(config: Config) -> Self {
        Self::with_store(config, Arc::new(MemoryUserStore::new()))
    }

    pub fn with_store(config: Config, users: Arc<dyn UserStore>) -> Self {
        let mailer = Arc::new(RecordingMailer::default());
        let state = AppState::new(config, users, mailer.clone());
        let router = pipeline::build(state.clone());
        Self {
            state,
            mailer,
            router,
        }
    }

    pub async fn send(&self, req: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        TestResponse {
            status,
            headers,
            body: String::from_utf8(bytes.to_vec()).unwrap(),
        }
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> TestResponse {
        let mut req = Request::builder().method(Method::GET).uri(uri);
        if let Some(token) = token {
            req = req.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        self.send(req.body(Body::empty()).unwrap()).await
    }

    pub async fn json(
        &self,
        method: Method,
        uri: &str,
        body: Value,
        token: Option<&str>,
    ) -> TestResponse {
        let mut req = Request::builder()
            .method(method)
            .uri(uri)
            .header(CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            req = req.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        self.send(req.body(Body::from(body.to_string())).unwrap())
            .await
    }
}

pub async fn seed_user(state: &AppState, email: &str, password: &str, role: Role) -> User {
    state
        .users
        .insert(NewUser {
            name: "Test User".into(),
            email: email.into(),
            password_hash: hash_password(password).await.unwrap(),
            role,
        })
        .await
        .unwrap()
}
