use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::envelope::ApiResponse;
use crate::error::ApiError;
use crate::relay::completion_status;
use crate::types::{CompletionResponse, ModelInfo, Usage};

pub mod chat;
pub mod models;
pub mod openllm;
pub mod products;
pub mod system;
pub mod users;

/// Turns axum's plain-text body rejection into an `INVALID_REQUEST` envelope.
pub(crate) fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| ApiError::invalid_request(rejection.body_text()))
}

pub(crate) fn path_param<T>(param: Result<Path<T>, PathRejection>) -> Result<T, ApiError> {
    param
        .map(|Path(value)| value)
        .map_err(|rejection| ApiError::invalid_request(rejection.body_text()))
}

pub(crate) fn query_params<T>(
    query: Result<Query<T>, QueryRejection>,
) -> Result<T, ApiError> {
    query
        .map(|Query(value)| value)
        .map_err(|rejection| ApiError::invalid_request(rejection.body_text()))
}

#[derive(Debug, Serialize)]
pub struct CompletionData {
    pub content: String,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

/// 200 with the generated text, or 500 with the upstream error.
pub(crate) fn completion_response(resp: CompletionResponse) -> Response {
    let status = completion_status(&resp);
    let body = match resp.data() {
        Some(content) if resp.is_success() => ApiResponse::ok(
            CompletionData {
                content: content.to_string(),
                model: resp.model().to_string(),
                usage: resp.usage(),
            },
            "completion succeeded",
        ),
        _ => ApiResponse::failure(
            "UPSTREAM_ERROR",
            resp.error().unwrap_or("upstream request failed"),
        ),
    };
    (status, Json(body)).into_response()
}

#[derive(Debug, Serialize)]
pub struct ModelList {
    pub models: Vec<ModelInfo>,
    pub count: usize,
}

impl From<Vec<ModelInfo>> for ModelList {
    fn from(models: Vec<ModelInfo>) -> Self {
        Self {
            count: models.len(),
            models,
        }
    }
}
