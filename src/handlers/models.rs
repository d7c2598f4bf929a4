use axum::extract::rejection::PathRejection;
use axum::extract::Path;
use axum::{Extension, Json};

use super::{path_param, ModelList};
use crate::app::AppState;
use crate::envelope::ApiResponse;
use crate::error::ApiError;
use crate::relay::unavailable;
use crate::types::ModelInfo;

/// 获取可用的模型列表
pub async fn list_models(
    Extension(state): Extension<AppState>,
) -> Result<Json<ApiResponse<ModelList>>, ApiError> {
    if !state.ollama.check_health().await {
        return Err(unavailable(state.ollama.as_ref()));
    }

    let models = state.ollama.list_models().await;
    tracing::debug!(count = models.len(), "listed Ollama models");
    Ok(Json(ApiResponse::ok(ModelList::from(models), "models listed")))
}

/// 获取特定模型的详细信息
pub async fn get_model(
    Extension(state): Extension<AppState>,
    name: Result<Path<String>, PathRejection>,
) -> Result<Json<ApiResponse<ModelInfo>>, ApiError> {
    let name = path_param(name)?;
    if name.trim().is_empty() {
        return Err(ApiError::validation("model name must not be empty"));
    }

    if !state.ollama.check_health().await {
        return Err(unavailable(state.ollama.as_ref()));
    }

    let model = state
        .ollama
        .list_models()
        .await
        .into_iter()
        .find(|m| m.name == name)
        .ok_or_else(|| ApiError::NotFound(format!("model not found: {name}")))?;

    Ok(Json(ApiResponse::ok(model, "model found")))
}
