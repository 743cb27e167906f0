//! Results of breaker-guarded operations
//!
//! A fallback keeps its cause, so "empty because the store is down" never
//! looks like "empty because nothing matched".

use super::error::ServiceError;
use serde::Serialize;

/// Why a guarded call produced its fallback instead of a value
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum FallbackReason {
    /// Breaker rejected the call without running it
    CircuitOpen,
    /// Call exceeded the breaker's timeout
    Timeout,
    /// Worker pool queue was full
    Rejected,
    /// Store or worker failure
    Failure(String),
}

impl FallbackReason {
    /// Map an infrastructure error to its fallback reason (None for client-class errors)
    pub fn from_error(err: &ServiceError) -> Option<Self> {
        match err {
            ServiceError::CircuitOpen(_) => Some(Self::CircuitOpen),
            ServiceError::Timeout(_) => Some(Self::Timeout),
            ServiceError::Rejected => Some(Self::Rejected),
            ServiceError::Storage(e) => Some(Self::Failure(e.to_string())),
            ServiceError::Worker(msg) => Some(Self::Failure(msg.clone())),
            ServiceError::Validation { .. }
            | ServiceError::CategoryNotFound(_)
            | ServiceError::DuplicateMaterialId(_)
            | ServiceError::Conflict(_) => None,
        }
    }
}

impl std::fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CircuitOpen => write!(f, "circuit open"),
            Self::Timeout => write!(f, "timeout"),
            Self::Rejected => write!(f, "worker pool saturated"),
            Self::Failure(msg) => write!(f, "failure: {msg}"),
        }
    }
}

/// Outcome of a guarded service operation
#[derive(Debug, Clone, PartialEq)]
#[must_use]
pub enum Guarded<T> {
    Completed(T),
    Fallback(FallbackReason),
}

impl<T> Guarded<T> {
    pub fn completed(self) -> Option<T> {
        match self {
            Self::Completed(value) => Some(value),
            Self::Fallback(_) => None,
        }
    }
}

impl<T: Default> Guarded<T> {
    /// The plain "empty on fallback" view
    pub fn into_value(self) -> T {
        match self {
            Self::Completed(value) => value,
            Self::Fallback(_) => T::default(),
        }
    }
}

/// Split a guarded call's result into value, fallback, or client error
pub(crate) fn guard<T>(result: Result<T, ServiceError>) -> Result<Guarded<T>, ServiceError> {
    match result {
        Ok(value) => Ok(Guarded::Completed(value)),
        Err(err) => match FallbackReason::from_error(&err) {
            Some(reason) => {
                tracing::warn!(error = %err, %reason, "Serving fallback");
                Ok(Guarded::Fallback(reason))
            }
            None => Err(err),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_value_defaults_on_fallback() {
        let empty: Guarded<Option<i32>> = Guarded::Fallback(FallbackReason::CircuitOpen);
        assert_eq!(empty.into_value(), None);

        let list: Guarded<Vec<i32>> = Guarded::Fallback(FallbackReason::Timeout);
        assert!(list.into_value().is_empty());

        assert_eq!(Guarded::Completed(Some(3)).into_value(), Some(3));
    }

    #[test]
    fn test_guard_splits_errors() {
        let ok = guard(Ok(1)).unwrap();
        assert_eq!(ok, Guarded::Completed(1));

        let fallback = guard::<i32>(Err(ServiceError::Rejected)).unwrap();
        assert_eq!(fallback, Guarded::Fallback(FallbackReason::Rejected));

        let client = guard::<i32>(Err(ServiceError::CategoryNotFound("X".into())));
        assert!(matches!(client, Err(ServiceError::CategoryNotFound(_))));
    }

    #[test]
    fn test_reason_serialization() {
        let json = serde_json::to_value(FallbackReason::Failure("disk".into())).unwrap();
        assert_eq!(json["reason"], "failure");
        assert_eq!(json["detail"], "disk");

        let json = serde_json::to_value(FallbackReason::CircuitOpen).unwrap();
        assert_eq!(json["reason"], "circuit_open");
    }
}
