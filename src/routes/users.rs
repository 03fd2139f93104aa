use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::auth::{restrict_to, CurrentUser, Role};
use crate::error::AppError;
use crate::store::validate;
use crate::AppState;

const NO_DOCUMENT: &str = "No document found with that ID";

/// Fields a user may change about themselves. Password fields are only
/// captured so their presence can be rejected.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMeRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub password_confirm: Option<String>,
}

pub async fn get_me(CurrentUser(user): CurrentUser) -> Json<Value> {
    Json(json!({
        "status": "success",
        "data": { "user": user },
    }))
}

pub async fn update_me(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(req): Json<UpdateMeRequest>,
) -> Result<Json<Value>, AppError> {
    if req.password.is_some() || req.password_confirm.is_some() {
        return Err(AppError::Validation(
            "This route is not for password updates. Please use /updateMyPassword.".into(),
        ));
    }

    let mut problems = Vec::new();
    if req.name.is_some() {
        validate::name_problems(req.name.as_deref(), &mut problems);
    }
    if req.email.is_some() {
        validate::email_problems(req.email.as_deref(), &mut problems);
    }
    validate::into_result(&problems)?;

    let name = req.name.map(|name| name.trim().to_string());
    let email = req.email.map(|email| validate::normalize_email(&email));
    let user = state
        .users
        .update_profile(user.id, name.as_deref(), email.as_deref())
        .await?;

    Ok(Json(json!({
        "status": "success",
        "data": { "user": user },
    })))
}

pub async fn delete_me(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<StatusCode, AppError> {
    state.users.deactivate(user.id).await?;
    tracing::info!(user_id = %user.id, "account deactivated");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<Json<Value>, AppError> {
    restrict_to(&[Role::Admin], &current)?;

    let users = state.users.list().await?;
    Ok(Json(json!({
        "status": "success",
        "results": users.len(),
        "data": { "users": users },
    })))
}

pub async fn get_user(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    restrict_to(&[Role::Admin], &current)?;

    let user = state
        .users
        .find_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound(NO_DOCUMENT.into()))?;
    Ok(Json(json!({
        "status": "success",
        "data": { "user": user },
    })))
}

pub async fn delete_user(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    restrict_to(&[Role::Admin], &current)?;

    if !state.users.delete(id).await? {
        return Err(AppError::NotFound(NO_DOCUMENT.into()));
    }
    tracing::info!(user_id = %id, deleted_by = %current.0.id, "user deleted");
    Ok(StatusCode::NO_CONTENT)
}
