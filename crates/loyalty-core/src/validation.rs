//! # Validation Module
//!
//! Input validation for catalog data, accounts, coupons and cart edits.
//!
//! Where each rule is enforced:
//!
//! | Rule                          | Checked by                              |
//! |-------------------------------|-----------------------------------------|
//! | quantity within cart limits   | `Cart::add_item`, `Cart::update_quantity`|
//! | product name, price, category | `ProductRepository::insert`             |
//! | coupon code, discount shape   | seed binary, before insert              |
//! | email, starting balance       | seed binary, before insert              |
//!
//! SQLite CHECK and UNIQUE constraints back these up for rows written by
//! anything else.
//!
//! ## Usage
//! ```rust
//! use loyalty_core::validation::{validate_coupon_code, validate_quantity};
//!
//! validate_coupon_code("PERCENT10").unwrap();
//! validate_quantity(5).unwrap();
//! ```

use crate::error::ValidationError;
use crate::types::Discount;
use crate::MAX_ITEM_QUANTITY;

pub type ValidationResult<T> = Result<T, ValidationError>;

const MAX_PRODUCT_NAME: usize = 200;
const MAX_CATEGORY: usize = 80;
const MAX_COUPON_CODE: usize = 32;

// =============================================================================
// String Validators
// =============================================================================

/// Checks a catalog product name: non-blank, at most 200 characters.
///
/// ```rust
/// use loyalty_core::validation::validate_product_name;
///
/// assert!(validate_product_name("Arepa reina pepiada").is_ok());
/// assert!(validate_product_name("").is_err());
/// ```
pub fn validate_product_name(name: &str) -> ValidationResult<()> {
    match name.trim().chars().count() {
        0 => Err(ValidationError::Required { field: "product name".into() }),
        n if n > MAX_PRODUCT_NAME => Err(ValidationError::TooLong {
            field: "product name".into(),
            max: MAX_PRODUCT_NAME,
        }),
        _ => Ok(()),
    }
}

/// Validates and normalizes a category label.
///
/// A blank category falls back to [`DEFAULT_CATEGORY`](crate::DEFAULT_CATEGORY).
/// The catalog's "all" pseudo-category cannot be used as a real one.
///
/// ## Returns
/// The trimmed category to store.
pub fn validate_category(category: &str) -> ValidationResult<String> {
    let category = category.trim();

    if category.is_empty() {
        return Ok(crate::DEFAULT_CATEGORY.to_string());
    }

    if category == crate::ALL_CATEGORIES {
        return Err(ValidationError::InvalidFormat {
            field: "category".to_string(),
            reason: format!("'{}' is reserved", crate::ALL_CATEGORIES),
        });
    }

    if category.chars().count() > MAX_CATEGORY {
        return Err(ValidationError::TooLong {
            field: "category".into(),
            max: MAX_CATEGORY,
        });
    }

    Ok(category.to_string())
}

/// Validates an account email.
///
/// Only the shape is checked (one `@`, something on each side, a dot in
/// the domain). Deliverability is the identity provider's job.
///
/// ## Example
/// ```rust
/// use loyalty_core::validation::validate_email;
///
/// assert!(validate_email("ana@example.com").is_ok());
/// assert!(validate_email("ana.example.com").is_err());
/// ```
pub fn validate_email(email: &str) -> ValidationResult<()> {
    let email = email.trim();

    if email.is_empty() {
        return Err(ValidationError::Required {
            field: "email".to_string(),
        });
    }

    let invalid = || ValidationError::InvalidFormat {
        field: "email".to_string(),
        reason: "must look like name@domain.tld".to_string(),
    };

    let (local, domain) = email.split_once('@').ok_or_else(invalid)?;
    if local.is_empty()
        || domain.contains('@')
        || !domain.contains('.')
        || domain.starts_with('.')
        || domain.ends_with('.')
        || email.chars().any(char::is_whitespace)
    {
        return Err(invalid());
    }

    Ok(())
}

/// Validates a coupon code as an administrator would create it.
///
/// ## Rules
/// - Not empty after trimming
/// - At most 32 characters
/// - Letters, digits, hyphens and underscores only
///
/// Lookup at checkout is more lenient (any string is normalized and looked
/// up); this only guards what gets stored.
pub fn validate_coupon_code(code: &str) -> ValidationResult<()> {
    let code = code.trim();
    let field = || "coupon code".to_string();

    if code.is_empty() {
        return Err(ValidationError::Required { field: field() });
    }
    if code.chars().count() > MAX_COUPON_CODE {
        return Err(ValidationError::TooLong {
            field: field(),
            max: MAX_COUPON_CODE,
        });
    }
    if let Some(bad) = code
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
    {
        return Err(ValidationError::InvalidFormat {
            field: field(),
            reason: format!("'{bad}' is not allowed, use A-Z, 0-9, '-' or '_'"),
        });
    }

    Ok(())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Quantity check against [`MAX_ITEM_QUANTITY`].
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    validate_quantity_within(qty, MAX_ITEM_QUANTITY)
}

/// Validates a quantity against an explicit maximum (configured limits).
pub fn validate_quantity_within(qty: i64, max: i64) -> ValidationResult<()> {
    match qty {
        q if q <= 0 => Err(ValidationError::MustBePositive { field: "quantity".into() }),
        q if q > max => Err(ValidationError::OutOfRange {
            field: "quantity".into(),
            min: 1,
            max,
        }),
        _ => Ok(()),
    }
}

/// Validates a product price in points.
///
/// ## Rules
/// - Must be non-negative
/// - Zero is allowed (free promotional items)
///
/// ## Example
/// ```rust
/// use loyalty_core::validation::validate_point_price;
///
/// assert!(validate_point_price(250).is_ok());
/// assert!(validate_point_price(0).is_ok());
/// assert!(validate_point_price(-1).is_err());
/// ```
pub fn validate_point_price(points: i64) -> ValidationResult<()> {
    if points < 0 {
        return Err(ValidationError::OutOfRange {
            field: "price_points".to_string(),
            min: 0,
            max: i64::MAX,
        });
    }

    Ok(())
}

/// Validates a point balance (seeding and administrative edits).
pub fn validate_balance(points: i64) -> ValidationResult<()> {
    if points < 0 {
        return Err(ValidationError::OutOfRange {
            field: "points".to_string(),
            min: 0,
            max: i64::MAX,
        });
    }

    Ok(())
}

/// Validates a coupon's discount shape.
///
/// ## Rules
/// - Percent: 1 through 100
/// - Fixed: strictly positive
pub fn validate_discount(discount: &Discount) -> ValidationResult<()> {
    match discount {
        Discount::Percent(pct) if !(1..=100).contains(pct) => Err(ValidationError::OutOfRange {
            field: "discount".to_string(),
            min: 1,
            max: 100,
        }),
        Discount::Fixed(amount) if !amount.is_positive() => Err(ValidationError::MustBePositive {
            field: "discount".to_string(),
        }),
        _ => Ok(()),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
