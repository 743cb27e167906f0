//! Product API Handlers

use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
};

use crate::core::ServerState;
use crate::services::{FallbackReason, Guarded};
use crate::utils::{AppError, AppResult, ErrorCode};
use shared::models::{ProductRequest, ProductResponse};

/// Degraded result: the operation did not run or did not take effect
fn degraded(reason: FallbackReason) -> AppError {
    let code = match reason {
        FallbackReason::Timeout => ErrorCode::TimeoutError,
        FallbackReason::Rejected => ErrorCode::SystemBusy,
        FallbackReason::CircuitOpen | FallbackReason::Failure(_) => ErrorCode::ServiceUnavailable,
    };
    AppError::with_message(code, format!("Product service unavailable ({reason})"))
        .with_detail("fallback", reason.to_string())
}

fn product_not_found(id: i64) -> AppError {
    AppError::with_message(ErrorCode::ProductNotFound, format!("Product not found: {id}"))
        .with_detail("id", id)
}

fn body(payload: Result<Json<ProductRequest>, JsonRejection>) -> AppResult<ProductRequest> {
    payload
        .map(|Json(req)| req)
        .map_err(|e| AppError::invalid_request(e.body_text()))
}

/// GET /api/v1/products - 获取所有商品
pub async fn list(State(state): State<ServerState>) -> AppResult<Json<Vec<ProductResponse>>> {
    match state.products.list().await {
        Guarded::Completed(products) => Ok(Json(
            products.into_iter().map(ProductResponse::from).collect(),
        )),
        Guarded::Fallback(reason) => Err(degraded(reason)),
    }
}

/// GET /api/v1/products/:id - 获取单个商品
pub async fn get_by_id(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
) -> AppResult<Json<ProductResponse>> {
    match state.products.get_by_id(id).await {
        Guarded::Completed(Some(product)) => Ok(Json(product.into())),
        Guarded::Completed(None) => Err(product_not_found(id)),
        Guarded::Fallback(reason) => Err(degraded(reason)),
    }
}

/// POST /api/v1/products - 创建商品
pub async fn create(
    State(state): State<ServerState>,
    payload: Result<Json<ProductRequest>, JsonRejection>,
) -> AppResult<(StatusCode, Json<ProductResponse>)> {
    let req = body(payload)?;
    match state.products.create(req).await? {
        Guarded::Completed(product) => Ok((StatusCode::CREATED, Json(product.into()))),
        Guarded::Fallback(reason) => Err(degraded(reason)),
    }
}

/// PUT /api/v1/products/:id - 更新商品 (全量替换)
pub async fn update(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
    payload: Result<Json<ProductRequest>, JsonRejection>,
) -> AppResult<Json<ProductResponse>> {
    let req = body(payload)?;
    match state.products.update(id, req).await? {
        Guarded::Completed(Some(product)) => Ok(Json(product.into())),
        Guarded::Completed(None) => Err(product_not_found(id)),
        Guarded::Fallback(reason) => Err(degraded(reason)),
    }
}
