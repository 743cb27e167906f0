//! Input validation helpers
//!
//! Centralized text length constants and validation functions for
//! product payloads. Rejections happen before any store access.

use crate::services::ServiceError;
use rust_decimal::Decimal;
use shared::models::ProductRequest;

// ── Text length limits ──────────────────────────────────────────────

/// Entity names: product name, material id, category name
pub const MAX_NAME_LEN: usize = 200;

/// Currency codes (ISO 4217 is 3, but feeds carry free-form codes)
pub const MAX_CODE_LEN: usize = 32;

// ── Validation helpers ──────────────────────────────────────────────

/// Validate that a required string is non-empty and within the length limit.
pub fn validate_required_text(value: &str, field: &str, max_len: usize) -> Result<(), ServiceError> {
    if value.trim().is_empty() {
        return Err(ServiceError::validation(field, format!("{field} must not be empty")));
    }
    let len = value.chars().count();
    if len > max_len {
        return Err(ServiceError::validation(
            field,
            format!("{field} is too long ({len} chars, max {max_len})"),
        ));
    }
    Ok(())
}

/// Prices are non-negative
pub fn validate_price(price: Decimal) -> Result<(), ServiceError> {
    if price.is_sign_negative() && !price.is_zero() {
        return Err(ServiceError::validation(
            "price",
            format!("price must not be negative (got {price})"),
        ));
    }
    Ok(())
}

/// Validate a full create / update payload
pub fn validate_product_request(req: &ProductRequest) -> Result<(), ServiceError> {
    validate_required_text(&req.material_id, "materialId", MAX_NAME_LEN)?;
    validate_required_text(&req.name, "name", MAX_NAME_LEN)?;
    validate_price(req.price)?;
    validate_required_text(&req.currency_code, "currencyCode", MAX_CODE_LEN)?;
    validate_required_text(&req.category_name, "categoryName", MAX_NAME_LEN)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn request() -> ProductRequest {
        ProductRequest {
            material_id: "M1".to_string(),
            name: "Foo".to_string(),
            price: Decimal::from_str("10.50").unwrap(),
            currency_code: "USD".to_string(),
            category_name: "Cat1".to_string(),
        }
    }

    #[test]
    fn test_valid_request() {
        assert!(validate_product_request(&request()).is_ok());
    }

    #[test]
    fn test_zero_price_allowed() {
        let mut req = request();
        req.price = Decimal::ZERO;
        assert!(validate_product_request(&req).is_ok());
    }

    #[test]
    fn test_negative_price_rejected() {
        let mut req = request();
        req.price = Decimal::from_str("-0.01").unwrap();
        let err = validate_product_request(&req).unwrap_err();
        assert!(matches!(err, ServiceError::Validation { ref field, .. } if field == "price"));
    }

    #[test]
    fn test_blank_fields_rejected() {
        let mut req = request();
        req.name = "   ".to_string();
        assert!(validate_product_request(&req).is_err());

        let mut req = request();
        req.currency_code = String::new();
        let err = validate_product_request(&req).unwrap_err();
        assert!(matches!(err, ServiceError::Validation { ref field, .. } if field == "currencyCode"));

        let mut req = request();
        req.material_id = String::new();
        assert!(validate_product_request(&req).is_err());
    }

    #[test]
    fn test_too_long_rejected() {
        let long = "x".repeat(MAX_NAME_LEN + 1);
        assert!(validate_required_text(&long, "name", MAX_NAME_LEN).is_err());
        let exact = "x".repeat(MAX_NAME_LEN);
        assert!(validate_required_text(&exact, "name", MAX_NAME_LEN).is_ok());
    }
}
