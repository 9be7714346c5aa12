//! Validation utilities for the plastics back office
//!
//! The field validators return `validator::ValidationError` so request
//! structs can reference them with `#[validate(custom = "...")]`.

use std::borrow::Cow;

use validator::ValidationError;

/// Most labels a single generation request may print
pub const MAX_LABELS_PER_REQUEST: i32 = 500;

fn invalid(code: &'static str, message: &'static str) -> ValidationError {
    let mut err = ValidationError::new(code);
    err.message = Some(Cow::Borrowed(message));
    err
}

/// Product codes are 1-50 uppercase letters, digits, `-`, `_` or `.`
pub fn validate_product_code(code: &str) -> Result<(), ValidationError> {
    if code.is_empty() || code.len() > 50 {
        return Err(invalid("product_code", "Product code must be 1-50 characters"));
    }
    if !code
        .chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || matches!(c, '-' | '_' | '.'))
    {
        return Err(invalid(
            "product_code",
            "Product code must be uppercase alphanumeric",
        ));
    }
    Ok(())
}

/// Colours must have at least one non-blank character
pub fn validate_colour(colour: &str) -> Result<(), ValidationError> {
    let trimmed = colour.trim();
    if trimmed.is_empty() {
        return Err(invalid("colour", "Colour is required"));
    }
    if trimmed.len() > 50 {
        return Err(invalid("colour", "Colour must be at most 50 characters"));
    }
    Ok(())
}

/// Scanned barcode strings: non-blank, no whitespace, at most 100 chars
pub fn validate_barcode(barcode: &str) -> Result<(), ValidationError> {
    if barcode.is_empty() || barcode.len() > 100 {
        return Err(invalid("barcode", "Barcode must be 1-100 characters"));
    }
    if barcode.chars().any(char::is_whitespace) {
        return Err(invalid("barcode", "Barcode must not contain whitespace"));
    }
    Ok(())
}

/// Free-text reasons and names must not be blank
pub fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(invalid("blank", "Value must not be blank"));
    }
    Ok(())
}

/// Red must not exceed amber when both are set
pub fn validate_threshold_bounds(red: Option<i32>, amber: Option<i32>) -> Result<(), &'static str> {
    if red.is_some_and(|r| r < 0) || amber.is_some_and(|a| a < 0) {
        return Err("Thresholds cannot be negative");
    }
    if let (Some(red), Some(amber)) = (red, amber) {
        if red > amber {
            return Err("Red threshold must not exceed amber threshold");
        }
    }
    Ok(())
}
