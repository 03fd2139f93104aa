mod jwt;
mod password;
pub mod reset;
mod roles;
pub mod session;

pub use jwt::TokenIssuer;
pub use password::{hash_password, verify_password};
pub use roles::Role;

use std::convert::Infallible;

use axum::extract::{FromRequestParts, OptionalFromRequestParts, Request, State};
use axum::http::request::Parts;
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;

use crate::error::AppError;
use crate::store::User;
use crate::AppState;

const NOT_LOGGED_IN: &str = "You are not logged in! Please log in to get access.";

/// The user bound to the request by `protect` (or `is_logged_in`).
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

/// Runs the full session chain: extract the token, verify it, load the
/// user, reject tokens issued before the last password change. Steps run
/// in order and the first failure ends the chain.
pub async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<User, AppError> {
    let token = session::extract_token(headers)
        .ok_or_else(|| AppError::Unauthorized(NOT_LOGGED_IN.into()))?;

    let claims = state.tokens.verify(&token)?;

    let user = state.users.find_by_id(claims.sub).await?.ok_or_else(|| {
        AppError::Unauthorized("The user belonging to this token no longer exist.".into())
    })?;

    if user.changed_password_after(claims.iat) {
        return Err(AppError::Unauthorized(
            "User recently changed password! Please log in again.".into(),
        ));
    }

    Ok(user)
}

/// Middleware that requires a valid session and binds `CurrentUser`.
pub async fn protect(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let user = authenticate(&state, req.headers()).await?;
    req.extensions_mut().insert(CurrentUser(user));
    Ok(next.run(req).await)
}

/// Best-effort variant of `protect` for rendered pages: binds the user when
/// the session is valid and otherwise lets the request through untouched.
pub async fn is_logged_in(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    match authenticate(&state, req.headers()).await {
        Ok(user) => {
            req.extensions_mut().insert(CurrentUser(user));
        }
        Err(e) => tracing::trace!("no logged in user: {e}"),
    }
    next.run(req).await
}

/// Role gate. Takes the authenticated user explicitly, so it can only be
/// reached from a handler that already extracted `CurrentUser`.
pub fn restrict_to(allowed: &[Role], user: &CurrentUser) -> Result<(), AppError> {
    if allowed.contains(&user.0.role) {
        Ok(())
    } else {
        tracing::debug!(user_id = %user.0.id, role = %user.0.role, "role not permitted");
        Err(AppError::Forbidden(
            "You do not have permission to perform this action".into(),
        ))
    }
}

/// Only succeeds on routes behind `protect`; elsewhere it rejects as
/// not logged in.
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentUser>()
            .cloned()
            .ok_or_else(|| AppError::Unauthorized(NOT_LOGGED_IN.into()))
    }
}

impl<S> OptionalFromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> Result<Option<Self>, Self::Rejection> {
        Ok(parts.extensions.get::<CurrentUser>().cloned())
    }
}
