//! # Error Types
//!
//! Domain-specific error types for loyalty-core.
//!
//! ```text
//! ValidationError ──► CoreError ──────┐
//!                                     ├──► CheckoutError (loyalty-checkout)
//! DbError (loyalty-db) ─► StoreError ─┘        kind + code + message
//! ```
//!
//! `CoreError` and `ValidationError` describe something the user can fix.
//! `StoreError` is whatever a collaborator reports; the checkout engine
//! never shows its text to the user.

use thiserror::Error;

use crate::coupon::CouponRejection;
use crate::points::Points;

// =============================================================================
// Core Error
// =============================================================================

/// A checkout rule refused the request.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Redemption attempted with nothing in the cart.
    #[error("Cart is empty")]
    EmptyCart,

    /// The user's balance does not cover the computed total.
    ///
    /// ## User Workflow
    /// ```text
    /// Cart subtotal 500, FIXED50 applied
    ///      │
    ///      ▼
    /// total = 450, balance = 400
    ///      │
    ///      ▼
    /// InsufficientPoints { available: 400, required: 450 }
    ///      │
    ///      ▼
    /// Cart and coupon stay as they were so the user can adjust
    /// ```
    #[error("Insufficient points: available {available}, required {required}")]
    InsufficientPoints { available: Points, required: Points },

    /// The coupon code failed one of the eligibility predicates.
    #[error("Coupon rejected: {0}")]
    CouponRejected(#[from] CouponRejection),

    /// One or more card top-up fields were left blank.
    #[error("Missing required fields: {}", fields.join(", "))]
    MissingFields { fields: Vec<String> },

    /// The requested top-up amount is not a positive whole number.
    #[error("Invalid point amount: '{input}'")]
    InvalidAmount { input: String },

    /// Adding a new line would exceed the configured number of lines.
    #[error("The cart already holds the maximum of {max} products")]
    CartTooLarge { max: usize },

    /// A line would go above the per-product quantity limit.
    #[error("At most {max} units per product, {requested} requested")]
    QuantityTooLarge { requested: i64, max: i64 },

    /// The line total or cart subtotal would not fit in a point amount.
    #[error("Cart total is too large")]
    AmountOverflow,

    /// Tried to change a line that is not in the cart.
    #[error("Product {0} is not in the cart")]
    ProductNotInCart(String),

    #[error("Invalid input: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// A single field failed a shape check (see [`crate::validation`]).
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("{field} cannot be blank")]
    Required { field: String },

    /// Length in characters, not bytes.
    #[error("{field} is longer than {max} characters")]
    TooLong { field: String, max: usize },

    #[error("{field} must be in {min}..={max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    #[error("{field} must be greater than zero")]
    MustBePositive { field: String },

    #[error("{field} is malformed: {reason}")]
    InvalidFormat { field: String, reason: String },
}

// =============================================================================
// Store Error
// =============================================================================

/// Errors reported by a persistence collaborator.
///
/// The checkout engine treats every variant the same way: the operation is
/// not committed and the user sees a generic failure. The variants exist so
/// logs say what actually went wrong.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing store could not be reached or rejected the call.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// The referenced entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Stored data could not be decoded into a domain type.
    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

impl StoreError {
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        StoreError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }
}

// =============================================================================
// Result Type Aliases
// =============================================================================

pub type CoreResult<T> = Result<T, CoreError>;

/// Result type returned by every collaborator call.
pub type StoreResult<T> = Result<T, StoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
