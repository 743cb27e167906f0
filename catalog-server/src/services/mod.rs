//! Services Module
//!
//! - [`BlockingExecutor`] - bounded bridge from async code to blocking storage
//! - [`CircuitBreaker`] - failure-rate breaker shared per operation group
//! - [`ProductService`] - product reads/writes guarded by both

pub mod circuit_breaker;
pub mod error;
pub mod executor;
pub mod guarded;
pub mod product_service;

pub use circuit_breaker::{
    BreakerMetrics, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerRegistry, CircuitState,
};
pub use error::{ServiceError, ServiceResult};
pub use executor::BlockingExecutor;
pub use guarded::{FallbackReason, Guarded};
pub use product_service::{PRODUCT_SERVICE_GROUP, ProductService};
