//! Data models
//!
//! Shared between catalog-server and API clients.
//! All IDs are `i64`, issued by the store's sequence counter.

pub mod category;
pub mod currency;
pub mod product;

// Re-exports
pub use category::*;
pub use currency::*;
pub use product::*;
