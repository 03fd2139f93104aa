use axum::extract::{Path, State};
use axum::http::header::{HOST, SET_COOKIE};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::reset::{self, ResetToken};
use crate::auth::{hash_password, session, verify_password, CurrentUser, Role};
use crate::error::AppError;
use crate::mail::Email;
use crate::store::validate::{self, NewUserInput};
use crate::store::{NewUser, User};
use crate::AppState;

const BAD_CREDENTIALS: &str = "Incorrect email or password";

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    pub password: Option<String>,
    pub password_confirm: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePasswordRequest {
    pub password_current: Option<String>,
    pub password: Option<String>,
    pub password_confirm: Option<String>,
}

/// Issues a session token for `user` and returns it both in the body and as
/// the session cookie.
fn send_token(state: &AppState, user: &User, status: StatusCode) -> Result<Response, AppError> {
    let token = state.tokens.issue(user.id)?;
    let cookie = session::session_cookie(
        &token,
        state.config.jwt_cookie_expires_in_days,
        state.config.environment.is_production(),
        Utc::now(),
    )?;

    let body = Json(json!({
        "status": "success",
        "token": token,
        "data": { "user": user },
    }));
    Ok((status, [(SET_COOKIE, cookie)], body).into_response())
}

pub async fn signup(
    State(state): State<AppState>,
    Json(input): Json<NewUserInput>,
) -> Result<Response, AppError> {
    input.validate()?;

    let password_hash = hash_password(input.password.as_deref().unwrap_or_default()).await?;
    let user = state
        .users
        .insert(NewUser {
            name: input.name.unwrap_or_default().trim().to_string(),
            email: validate::normalize_email(input.email.as_deref().unwrap_or_default()),
            password_hash,
            role: Role::User,
        })
        .await?;

    tracing::info!(user_id = %user.id, "user signed up");
    send_token(&state, &user, StatusCode::CREATED)
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Response, AppError> {
    let email = req.email.filter(|e| !e.trim().is_empty());
    let password = req.password.filter(|p| !p.is_empty());
    let (Some(email), Some(password)) = (email, password) else {
        return Err(AppError::Validation(
            "Please provide email and password!".into(),
        ));
    };

    let user = state
        .users
        .find_by_email(&validate::normalize_email(&email))
        .await?
        .ok_or_else(|| AppError::Unauthorized(BAD_CREDENTIALS.into()))?;

    if !verify_password(&password, &user.password_hash).await? {
        tracing::debug!(user_id = %user.id, "login with wrong password");
        return Err(AppError::Unauthorized(BAD_CREDENTIALS.into()));
    }

    send_token(&state, &user, StatusCode::OK)
}

pub async fn logout(State(state): State<AppState>) -> Result<Response, AppError> {
    let cookie = session::logout_cookie(state.config.environment.is_production(), Utc::now())?;
    Ok((
        [(SET_COOKIE, cookie)],
        Json(json!({ "status": "success" })),
    )
        .into_response())
}

pub async fn forgot_password(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ForgotPasswordRequest>,
) -> Result<Json<Value>, AppError> {
    let email = req
        .email
        .map(|e| validate::normalize_email(&e))
        .filter(|e| !e.is_empty())
        .ok_or_else(|| AppError::Validation("Please provide your email".into()))?;

    // A distinct 404 tells the caller whether the address is registered.
    let user = state
        .users
        .find_by_email(&email)
        .await?
        .ok_or_else(|| AppError::NotFound("There is no user with email address.".into()))?;

    let ttl = state.config.password_reset_ttl;
    let token = ResetToken::generate();
    state
        .users
        .set_reset(user.id, &token.digest, Utc::now() + ttl)
        .await?;

    let url = reset_url(&state, &headers, &token.plaintext);
    let message = Email {
        to: user.email.clone(),
        subject: format!(
            "Your password reset token (valid for {} min)",
            ttl.num_minutes()
        ),
        body: format!(
            "Forgot your password? Submit a PATCH request with your new password and \
             passwordConfirm to: {url}\nIf you didn't forget your password, please ignore this email!"
        ),
    };

    if let Err(e) = state.mailer.send(&message).await {
        tracing::error!(user_id = %user.id, "password reset email failed: {e}");
        if let Err(e) = state.users.clear_reset(user.id).await {
            tracing::error!(user_id = %user.id, "failed to clear reset token: {e}");
        }
        return Err(AppError::Delivery(
            "There was an error sending the email. Try again later!".into(),
        ));
    }

    tracing::info!(user_id = %user.id, "password reset token sent");
    Ok(Json(json!({
        "status": "success",
        "message": "Token sent to email!",
    })))
}

fn reset_url(state: &AppState, headers: &HeaderMap, token: &str) -> String {
    let scheme = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("http");
    let host = headers
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or(&state.config.listen_addr);
    format!("{scheme}://{host}/api/v1/users/resetPassword/{token}")
}

pub async fn reset_password(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Json(req): Json<ResetPasswordRequest>,
) -> Result<Response, AppError> {
    let now = Utc::now();
    let user = state
        .users
        .find_by_reset_digest(&reset::digest(&token), now)
        .await?
        .ok_or(AppError::InvalidOrExpiredToken)?;

    let mut problems = Vec::new();
    validate::password_problems(
        req.password.as_deref(),
        req.password_confirm.as_deref(),
        &mut problems,
    );
    validate::into_result(&problems)?;

    let password_hash = hash_password(req.password.as_deref().unwrap_or_default()).await?;
    let user = state
        .users
        .set_password(user.id, &password_hash, now)
        .await?;

    tracing::info!(user_id = %user.id, "password reset");
    send_token(&state, &user, StatusCode::OK)
}

pub async fn update_my_password(
    State(state): State<AppState>,
    CurrentUser(current): CurrentUser,
    Json(req): Json<UpdatePasswordRequest>,
) -> Result<Response, AppError> {
    // Re-read so the check runs against the stored hash.
    let user = state.users.find_by_id(current.id).await?.ok_or_else(|| {
        AppError::Unauthorized("The user belonging to this token no longer exist.".into())
    })?;

    let password_current = req.password_current.unwrap_or_default();
    if !verify_password(&password_current, &user.password_hash).await? {
        return Err(AppError::Unauthorized(
            "Your current password is wrong.".into(),
        ));
    }

    let mut problems = Vec::new();
    validate::password_problems(
        req.password.as_deref(),
        req.password_confirm.as_deref(),
        &mut problems,
    );
    validate::into_result(&problems)?;

    let password_hash = hash_password(req.password.as_deref().unwrap_or_default()).await?;
    let user = state
        .users
        .set_password(user.id, &password_hash, Utc::now())
        .await?;

    tracing::info!(user_id = %user.id, "password updated");
    send_token(&state, &user, StatusCode::OK)
}
