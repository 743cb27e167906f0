//! Product Model

use super::{Category, Currency};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Product row as persisted
///
/// Currency and category are held by id only; the rows themselves live in
/// their own tables and are shared by every product that references them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    /// Business identifier, globally unique
    pub material_id: String,
    pub name: String,
    pub price: Decimal,
    /// Currency reference (id)
    pub currency_id: i64,
    /// Category reference (id)
    pub category_id: i64,
    /// Last successful create/update (Unix millis), stamped by the service
    pub last_modified_at: i64,
}

/// Product payload for insertion (id is issued by the store)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewProduct {
    pub material_id: String,
    pub name: String,
    pub price: Decimal,
    pub currency_id: i64,
    pub category_id: i64,
    pub last_modified_at: i64,
}

/// Product with its currency and category rows resolved
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductFull {
    pub id: i64,
    pub material_id: String,
    pub name: String,
    pub price: Decimal,
    pub currency: Currency,
    pub category: Category,
    pub last_modified_at: i64,
}

impl ProductFull {
    /// Join a product row with its reference rows
    pub fn from_parts(product: Product, currency: Currency, category: Category) -> Self {
        Self {
            id: product.id,
            material_id: product.material_id,
            name: product.name,
            price: product.price,
            currency,
            category,
            last_modified_at: product.last_modified_at,
        }
    }
}

/// Create / update product payload
///
/// All fields are required; an update replaces every mutable field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductRequest {
    pub material_id: String,
    pub name: String,
    pub price: Decimal,
    pub currency_code: String,
    pub category_name: String,
}

/// Flattened product view returned by the API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductResponse {
    pub id: i64,
    pub material_id: String,
    pub name: String,
    pub price: Decimal,
    pub currency_code: String,
    pub category_name: String,
    pub last_modified_at: i64,
}

impl From<ProductFull> for ProductResponse {
    fn from(p: ProductFull) -> Self {
        Self {
            id: p.id,
            material_id: p.material_id,
            name: p.name,
            price: p.price,
            currency_code: p.currency.code,
            category_name: p.category.name,
            last_modified_at: p.last_modified_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn sample_full() -> ProductFull {
        ProductFull {
            id: 7,
            material_id: "M1".to_string(),
            name: "Foo".to_string(),
            price: Decimal::from_str("10.50").unwrap(),
            currency: Currency {
                id: 1,
                code: "USD".to_string(),
            },
            category: Category {
                id: 2,
                name: "Cat1".to_string(),
            },
            last_modified_at: 1_700_000_000_000,
        }
    }

    #[test]
    fn test_response_flattens_references() {
        let response = ProductResponse::from(sample_full());
        assert_eq!(response.id, 7);
        assert_eq!(response.currency_code, "USD");
        assert_eq!(response.category_name, "Cat1");
        assert_eq!(response.price, Decimal::from_str("10.50").unwrap());
    }

    #[test]
    fn test_response_keeps_exact_price() {
        let json = serde_json::to_value(ProductResponse::from(sample_full())).unwrap();
        assert_eq!(json["price"], "10.50");
        assert_eq!(json["materialId"], "M1");
        assert_eq!(json["currencyCode"], "USD");
        assert_eq!(json["categoryName"], "Cat1");
    }

    #[test]
    fn test_request_accepts_numeric_and_string_price() {
        let numeric: ProductRequest = serde_json::from_str(
            r#"{"materialId":"M2","name":"Bar","price":5,"currencyCode":"EUR","categoryName":"Cat1"}"#,
        )
        .unwrap();
        assert_eq!(numeric.price, Decimal::from(5));

        let text: ProductRequest = serde_json::from_str(
            r#"{"materialId":"M2","name":"Bar","price":"5.25","currencyCode":"EUR","categoryName":"Cat1"}"#,
        )
        .unwrap();
        assert_eq!(text.price, Decimal::from_str("5.25").unwrap());
    }

    #[test]
    fn test_request_rejects_missing_price() {
        let result: Result<ProductRequest, _> = serde_json::from_str(
            r#"{"materialId":"M2","name":"Bar","currencyCode":"EUR","categoryName":"Cat1"}"#,
        );
        assert!(result.is_err());
    }
}
