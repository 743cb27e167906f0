//! Shared types for the catalog workspace
//!
//! Domain models, the unified error system and small utilities used by
//! catalog-server and its API clients.

pub mod error;
pub mod models;
pub mod util;

// Re-exports
pub use axum::Json;
pub use http;
pub use serde::{Deserialize, Serialize};
