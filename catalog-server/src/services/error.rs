//! Service error taxonomy
//!
//! Client-class errors describe a bad request and always reach the caller
//! unchanged. Infrastructure-class errors are counted by the circuit breaker
//! and replaced by a fallback result.

use crate::db::StorageError;
use crate::utils::{AppError, ErrorCode};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    // ── client-class ────────────────────────────────────────────────
    #[error("{message}")]
    Validation { field: String, message: String },

    #[error("Category not found: {0}")]
    CategoryNotFound(String),

    #[error("Duplicate entry or data integrity violation - materialId: {0}")]
    DuplicateMaterialId(String),

    /// Unique key lost a race and the winner could not be read back
    #[error("Conflict: {0}")]
    Conflict(String),

    // ── infrastructure-class ────────────────────────────────────────
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Worker pool saturated, call rejected")]
    Rejected,

    #[error("Circuit breaker '{0}' is open")]
    CircuitOpen(String),

    #[error("Worker failed: {0}")]
    Worker(String),
}

impl ServiceError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Counted by the breaker and absorbed into a fallback
    pub fn is_infrastructure(&self) -> bool {
        matches!(
            self,
            Self::Storage(_) | Self::Timeout(_) | Self::Rejected | Self::CircuitOpen(_) | Self::Worker(_)
        )
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Validation { field, message } => {
                AppError::validation(message).with_detail("field", field)
            }
            ServiceError::CategoryNotFound(name) => {
                AppError::with_message(ErrorCode::CategoryNotFound, format!("Category not found: {name}"))
                    .with_detail("category_name", name)
            }
            ServiceError::DuplicateMaterialId(material_id) => AppError::with_message(
                ErrorCode::MaterialIdExists,
                "Duplicate entry or data integrity violation - materialId.",
            )
            .with_detail("material_id", material_id),
            ServiceError::Conflict(msg) => {
                AppError::with_message(ErrorCode::CurrencyCodeConflict, msg)
            }
            ServiceError::Storage(e) => AppError::database(e.to_string()),
            ServiceError::Timeout(after) => AppError::with_message(
                ErrorCode::TimeoutError,
                format!("Call timed out after {}ms", after.as_millis()),
            ),
            ServiceError::Rejected => AppError::new(ErrorCode::SystemBusy),
            ServiceError::CircuitOpen(name) => {
                AppError::service_unavailable(format!("Circuit breaker '{name}' is open"))
            }
            ServiceError::Worker(msg) => AppError::internal(msg),
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;
