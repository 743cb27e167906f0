//! Currency Model

use serde::{Deserialize, Serialize};

/// Currency entity, identified by its unique `code` (e.g. "EUR")
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Currency {
    pub id: i64,
    pub code: String,
}
