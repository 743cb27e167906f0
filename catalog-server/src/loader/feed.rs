//! Bulk feed format
//!
//! ```json
//! { "products": [
//!     { "materialId": "M1", "name": "Foo", "price": 10,
//!       "currency": { "code": "USD" }, "category": { "name": "Cat1" } }
//! ] }
//! ```
//!
//! `currency` / `category` may also be given as a bare string.

use rust_decimal::Decimal;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct FeedDocument {
    pub products: Vec<FeedRecord>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedRecord {
    pub material_id: String,
    pub name: String,
    pub price: Decimal,
    pub currency: CurrencyRef,
    pub category: CategoryRef,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum CurrencyRef {
    Object { code: String },
    Code(String),
}

impl CurrencyRef {
    pub fn code(&self) -> &str {
        match self {
            Self::Object { code } | Self::Code(code) => code,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum CategoryRef {
    Object { name: String },
    Name(String),
}

impl CategoryRef {
    pub fn name(&self) -> &str {
        match self {
            Self::Object { name } | Self::Name(name) => name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_parse_object_refs() {
        let doc: FeedDocument = serde_json::from_str(
            r#"{"products":[{"materialId":"M1","name":"Foo","price":10,
                "currency":{"code":"USD"},"category":{"name":"Cat1"}}]}"#,
        )
        .unwrap();
        let record = &doc.products[0];
        assert_eq!(record.material_id, "M1");
        assert_eq!(record.price, Decimal::from(10));
        assert_eq!(record.currency.code(), "USD");
        assert_eq!(record.category.name(), "Cat1");
    }

    #[test]
    fn test_parse_plain_string_refs_and_string_price() {
        let doc: FeedDocument = serde_json::from_str(
            r#"{"products":[{"materialId":"M2","name":"Bar","price":"5.25",
                "currency":"EUR","category":"Cat2"}]}"#,
        )
        .unwrap();
        let record = &doc.products[0];
        assert_eq!(record.price, Decimal::from_str("5.25").unwrap());
        assert_eq!(record.currency, CurrencyRef::Code("EUR".into()));
        assert_eq!(record.category.name(), "Cat2");
    }

    #[test]
    fn test_missing_field_is_error() {
        let result: Result<FeedDocument, _> = serde_json::from_str(
            r#"{"products":[{"materialId":"M3","price":1,"currency":"EUR","category":"Cat2"}]}"#,
        );
        assert!(result.is_err());
    }
}
