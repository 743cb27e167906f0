//! 健康检查路由
//!
//! | 路径 | 方法 | 说明 |
//! |------|------|------|
//! | /health | GET | 熔断器状态 + 商品数量 |
//!
//! # 响应示例
//!
//! ```json
//! {
//!   "status": "ok",
//!   "version": "0.1.0",
//!   "product_count": 42,
//!   "breakers": [{ "name": "product_service", "state": "CLOSED", ... }]
//! }
//! ```

use axum::{Json, Router, extract::State, routing::get};
use serde::Serialize;

use crate::core::ServerState;
use crate::services::{BreakerMetrics, CircuitState};

pub fn router() -> Router<ServerState> {
    Router::new().route("/health", get(health))
}

#[derive(Serialize)]
pub struct HealthResponse {
    /// ok | degraded
    status: &'static str,
    version: &'static str,
    /// None when the store could not be read
    product_count: Option<u64>,
    breakers: Vec<BreakerMetrics>,
}

/// GET /health
///
/// Reads the product count through the worker pool but outside the breaker,
/// so the probe neither trips nor is blocked by it.
pub async fn health(State(state): State<ServerState>) -> Json<HealthResponse> {
    let store = state.store.clone();
    let product_count = match state
        .executor
        .run(move || Ok(store.count_products()?))
        .await
    {
        Ok(count) => Some(count),
        Err(e) => {
            tracing::warn!(error = %e, "Health check could not count products");
            None
        }
    };

    let breakers = state.breakers.metrics();
    let healthy = product_count.is_some()
        && breakers.iter().all(|b| b.state == CircuitState::Closed);

    Json(HealthResponse {
        status: if healthy { "ok" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        product_count,
        breakers,
    })
}
