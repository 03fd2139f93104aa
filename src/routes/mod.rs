mod auth;
mod health;
mod users;
mod views;

use axum::middleware;
use axum::routing::{delete, get, patch, post};
use axum::Router;

use crate::auth::{is_logged_in, protect};
use crate::AppState;

/// JSON API under `/api/v1`.
pub fn api_router(state: AppState) -> Router<AppState> {
    let public = Router::new()
        .route("/signup", post(auth::signup))
        .route("/login", post(auth::login))
        .route("/logout", get(auth::logout))
        .route("/forgotPassword", post(auth::forgot_password))
        .route("/resetPassword/{token}", patch(auth::reset_password));

    let authenticated = Router::new()
        .route("/updateMyPassword", patch(auth::update_my_password))
        .route("/me", get(users::get_me))
        .route("/updateMe", patch(users::update_me))
        .route("/deleteMe", delete(users::delete_me))
        .route("/", get(users::list))
        .route("/{id}", get(users::get_user).delete(users::delete_user))
        .layer(middleware::from_fn_with_state(state, protect));

    Router::new().nest("/api/v1/users", public.merge(authenticated))
}

/// Server-rendered pages.
pub fn site_router(state: AppState) -> Router<AppState> {
    let browsing = Router::new()
        .route("/", get(views::overview))
        .route("/login", get(views::login_form))
        .layer(middleware::from_fn_with_state(state.clone(), is_logged_in));

    let account = Router::new()
        .route("/me", get(views::account))
        .layer(middleware::from_fn_with_state(state, protect));

    browsing.merge(account)
}

pub fn health_router() -> Router<AppState> {
    Router::new().route("/health", get(health::health))
}
