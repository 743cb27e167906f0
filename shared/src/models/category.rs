//! Category Model

use serde::{Deserialize, Serialize};

/// Category entity, identified by its unique `name`
///
/// Categories form a closed taxonomy: the API never creates them implicitly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
}
