use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};

use super::{json_body, path_param, query_params};
use crate::app::AppState;
use crate::envelope::{ApiResponse, Paginated, Pagination};
use crate::error::ApiError;
use crate::store::products::{build_product, NewProduct};
use crate::store::{Product, ProductFilter, ProductPatch};

#[derive(Debug, Default, Deserialize)]
pub struct ProductQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
    #[serde(flatten)]
    pub filter: ProductFilter,
}

#[derive(Debug, Deserialize)]
pub struct BulkUpdate {
    pub updates: Option<Vec<ProductPatch>>,
}

#[derive(Debug, Deserialize)]
pub struct BulkDelete {
    pub ids: Option<Vec<u64>>,
}

#[derive(Debug, Serialize)]
pub struct BulkUpdated {
    pub updated: Vec<Product>,
    pub errors: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct BulkDeleted {
    pub deleted: Vec<Product>,
    pub errors: Vec<String>,
}

type ProductResponse = Json<ApiResponse<Product>>;

/// 获取产品列表（支持分页和筛选）
pub async fn list(
    Extension(state): Extension<AppState>,
    query: Result<Query<ProductQuery>, QueryRejection>,
) -> Result<Json<ApiResponse<Paginated<Product>>>, ApiError> {
    let query = query_params(query)?;
    let pagination = Pagination::from_query(query.page.as_deref(), query.limit.as_deref());

    let (items, total) = state
        .products
        .lock()
        .await
        .list(|p| query.filter.matches(p), pagination);

    Ok(Json(ApiResponse::ok(
        Paginated::new(items, total, pagination),
        "products listed",
    )))
}

pub async fn get(
    Extension(state): Extension<AppState>,
    id: Result<Path<u64>, PathRejection>,
) -> Result<ProductResponse, ApiError> {
    let id = path_param(id)?;
    let product = state.products.lock().await.get(id)?.clone();
    Ok(Json(ApiResponse::ok(product, "product found")))
}

pub async fn create(
    Extension(state): Extension<AppState>,
    payload: Result<Json<NewProduct>, JsonRejection>,
) -> Result<(StatusCode, ProductResponse), ApiError> {
    let valid = json_body(payload)?.validate()?;
    let product = state
        .products
        .lock()
        .await
        .create(|id| build_product(id, valid))?;

    tracing::info!(id = product.id, "product created");
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(product, "product created"))))
}

pub async fn update(
    Extension(state): Extension<AppState>,
    id: Result<Path<u64>, PathRejection>,
    payload: Result<Json<ProductPatch>, JsonRejection>,
) -> Result<ProductResponse, ApiError> {
    let id = path_param(id)?;
    let patch = json_body(payload)?;
    patch.validate()?;

    let product = state
        .products
        .lock()
        .await
        .update(id, |p| patch.apply(p))?;
    Ok(Json(ApiResponse::ok(product, "product updated")))
}

pub async fn delete(
    Extension(state): Extension<AppState>,
    id: Result<Path<u64>, PathRejection>,
) -> Result<ProductResponse, ApiError> {
    let id = path_param(id)?;
    let product = state.products.lock().await.delete(id)?;
    Ok(Json(ApiResponse::ok(product, "product deleted")))
}

/// 批量更新产品，逐条应用并收集错误
pub async fn bulk_update(
    Extension(state): Extension<AppState>,
    payload: Result<Json<BulkUpdate>, JsonRejection>,
) -> Result<Json<ApiResponse<BulkUpdated>>, ApiError> {
    let updates = json_body(payload)?
        .updates
        .ok_or_else(|| ApiError::validation("updates must be an array"))?;

    let mut result = BulkUpdated {
        updated: Vec::new(),
        errors: Vec::new(),
    };
    {
        let mut products = state.products.lock().await;
        for patch in updates {
            let Some(id) = patch.id else {
                result.errors.push("missing product id".to_string());
                continue;
            };
            if let Err(e) = patch.validate() {
                result.errors.push(format!("product {id}: {e}"));
                continue;
            }
            match products.update(id, |p| patch.apply(p)) {
                Ok(product) => result.updated.push(product),
                Err(e) => result.errors.push(e.to_string()),
            }
        }
    }

    if !result.errors.is_empty() && result.updated.is_empty() {
        return Err(ApiError::validation(result.errors.join(", ")));
    }

    let message = format!("updated {} products", result.updated.len());
    Ok(Json(ApiResponse::ok(result, message)))
}

/// 批量删除产品
pub async fn bulk_delete(
    Extension(state): Extension<AppState>,
    payload: Result<Json<BulkDelete>, JsonRejection>,
) -> Result<Json<ApiResponse<BulkDeleted>>, ApiError> {
    let ids = json_body(payload)?
        .ids
        .ok_or_else(|| ApiError::validation("ids must be an array"))?;

    let mut result = BulkDeleted {
        deleted: Vec::new(),
        errors: Vec::new(),
    };
    {
        let mut products = state.products.lock().await;
        for id in ids {
            match products.delete(id) {
                Ok(product) => result.deleted.push(product),
                Err(e) => result.errors.push(e.to_string()),
            }
        }
    }

    if !result.errors.is_empty() && result.deleted.is_empty() {
        return Err(ApiError::validation(result.errors.join(", ")));
    }

    let message = format!("deleted {} products", result.deleted.len());
    Ok(Json(ApiResponse::ok(result, message)))
}
