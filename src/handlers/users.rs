use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::Deserialize;

use super::{json_body, path_param, query_params};
use crate::app::AppState;
use crate::envelope::{ApiResponse, Paginated, Pagination};
use crate::error::ApiError;
use crate::store::users::{build_user, NewUser};
use crate::store::{User, UserFilter, UserPatch};

#[derive(Debug, Default, Deserialize)]
pub struct UserQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
    #[serde(flatten)]
    pub filter: UserFilter,
}

#[derive(Debug, Default, Deserialize)]
pub struct IdBody {
    pub id: Option<u64>,
}

type UserResponse = Json<ApiResponse<User>>;

/// GET /api/users
pub async fn list(
    Extension(state): Extension<AppState>,
    query: Result<Query<UserQuery>, QueryRejection>,
) -> Result<Json<ApiResponse<Paginated<User>>>, ApiError> {
    let query = query_params(query)?;
    let pagination = Pagination::from_query(query.page.as_deref(), query.limit.as_deref());

    let (items, total) = state
        .users
        .lock()
        .await
        .list(|u| query.filter.matches(u), pagination);

    Ok(Json(ApiResponse::ok(
        Paginated::new(items, total, pagination),
        "users listed",
    )))
}

/// GET /api/users/:id
pub async fn get(
    Extension(state): Extension<AppState>,
    id: Result<Path<u64>, PathRejection>,
) -> Result<UserResponse, ApiError> {
    let id = path_param(id)?;
    let user = state.users.lock().await.get(id)?.clone();
    Ok(Json(ApiResponse::ok(user, "user found")))
}

/// POST /api/users
pub async fn create(
    Extension(state): Extension<AppState>,
    payload: Result<Json<NewUser>, JsonRejection>,
) -> Result<(StatusCode, UserResponse), ApiError> {
    let (name, email) = json_body(payload)?.validate()?;
    let user = state
        .users
        .lock()
        .await
        .create(|id| build_user(id, name, email))?;

    tracing::info!(id = user.id, "user created");
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(user, "user created"))))
}

/// PUT /api/users/:id
pub async fn update(
    Extension(state): Extension<AppState>,
    id: Result<Path<u64>, PathRejection>,
    payload: Result<Json<UserPatch>, JsonRejection>,
) -> Result<UserResponse, ApiError> {
    let id = path_param(id)?;
    apply_update(&state, id, json_body(payload)?).await
}

/// PUT /api/users with the id in the body
pub async fn update_from_body(
    Extension(state): Extension<AppState>,
    payload: Result<Json<UserPatch>, JsonRejection>,
) -> Result<UserResponse, ApiError> {
    let patch = json_body(payload)?;
    let id = patch
        .id
        .ok_or_else(|| ApiError::validation("user id is required"))?;
    apply_update(&state, id, patch).await
}

async fn apply_update(state: &AppState, id: u64, patch: UserPatch) -> Result<UserResponse, ApiError> {
    patch.validate()?;
    let user = state.users.lock().await.update(id, |u| patch.apply(u))?;
    tracing::info!(id, "user updated");
    Ok(Json(ApiResponse::ok(user, "user updated")))
}

/// DELETE /api/users/:id
pub async fn delete(
    Extension(state): Extension<AppState>,
    id: Result<Path<u64>, PathRejection>,
) -> Result<UserResponse, ApiError> {
    let id = path_param(id)?;
    remove(&state, id).await
}

/// DELETE /api/users with the id in the body
pub async fn delete_from_body(
    Extension(state): Extension<AppState>,
    payload: Result<Json<IdBody>, JsonRejection>,
) -> Result<UserResponse, ApiError> {
    let id = json_body(payload)?
        .id
        .ok_or_else(|| ApiError::validation("user id is required"))?;
    remove(&state, id).await
}

async fn remove(state: &AppState, id: u64) -> Result<UserResponse, ApiError> {
    let user = state.users.lock().await.delete(id)?;
    tracing::info!(id, "user deleted");
    Ok(Json(ApiResponse::ok(user, "user deleted")))
}
