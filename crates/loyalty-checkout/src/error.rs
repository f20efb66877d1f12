//! # Checkout Error Type
//!
//! What the client receives when a checkout operation fails.
//!
//! ## Error Taxonomy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Flow in the Checkout                           │
//! │                                                                         │
//! │  Source                     kind                  client reaction       │
//! │  ──────                     ────                  ───────────────       │
//! │                                                                         │
//! │  CouponRejection ─┐                                                     │
//! │  MissingFields    ├───────► USER_INPUT_ERROR ───► fix input, no retry   │
//! │  EmptyCart ───────┘                                                     │
//! │                                                                         │
//! │  InsufficientPoints ─┐                                                  │
//! │  coupon re-check ────┼────► STATE_CONFLICT ─────► cart/coupon kept      │
//! │  second submit ──────┘                                                  │
//! │                                                                         │
//! │  StoreError ─────┐                                                      │
//! │  deadline hit ───┴────────► PERSISTENCE_FAILURE ► generic message,      │
//! │                                                   detail only in logs   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Serialization
//! ```json
//! {
//!   "kind": "STATE_CONFLICT",
//!   "code": "INSUFFICIENT_POINTS",
//!   "message": "Insufficient points: available 400 pts, required 450 pts"
//! }
//! ```

use serde::Serialize;
use thiserror::Error;
use ts_rs::TS;

use loyalty_core::{CoreError, StoreError};

/// Result type for engine operations.
pub type CheckoutResult<T> = Result<T, CheckoutError>;

/// Broad class of a checkout failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, TS)]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// The user typed or selected something unusable.
    UserInputError,

    /// The request was fine but the current state does not allow it.
    StateConflict,

    /// A collaborator failed or did not answer in time.
    PersistenceFailure,
}

/// Error returned from every [`CheckoutEngine`](crate::CheckoutEngine) operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, TS)]
#[ts(export)]
pub struct CheckoutError {
    pub kind: ErrorKind,

    /// Machine-readable code, e.g. `INSUFFICIENT_POINTS`
    pub code: String,

    /// Human-readable message for display
    pub message: String,
}

impl CheckoutError {
    pub fn new(kind: ErrorKind, code: impl Into<String>, message: impl Into<String>) -> Self {
        CheckoutError {
            kind,
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn user_input(code: impl Into<String>, message: impl Into<String>) -> Self {
        CheckoutError::new(ErrorKind::UserInputError, code, message)
    }

    pub fn conflict(code: impl Into<String>, message: impl Into<String>) -> Self {
        CheckoutError::new(ErrorKind::StateConflict, code, message)
    }

    /// A second redeem or top-up while one is still running.
    pub fn in_progress() -> Self {
        CheckoutError::conflict(
            "CHECKOUT_IN_PROGRESS",
            "A checkout is already in progress",
        )
    }

    /// The applied coupon failed its re-check at commit time.
    pub fn no_longer_eligible(reason: impl std::fmt::Display) -> Self {
        CheckoutError::conflict(
            "COUPON_NO_LONGER_ELIGIBLE",
            format!("The applied coupon can no longer be used: {}", reason),
        )
    }

    pub fn product_not_found(id: &str) -> Self {
        CheckoutError::user_input("PRODUCT_NOT_FOUND", format!("Product not found: {}", id))
    }

    /// Generic persistence failure. The detail belongs in the logs.
    pub fn persistence() -> Self {
        CheckoutError::new(
            ErrorKind::PersistenceFailure,
            "PERSISTENCE_FAILURE",
            "The operation could not be saved, please try again",
        )
    }

    /// A collaborator call that exceeded its deadline.
    pub fn timeout(operation: &str, timeout_ms: u64) -> Self {
        tracing::error!(operation, timeout_ms, "Collaborator call timed out");
        CheckoutError::persistence()
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn is_persistence_failure(&self) -> bool {
        self.kind == ErrorKind::PersistenceFailure
    }
}

/// Converts collaborator errors. Never shows the store's detail to the user.
impl From<StoreError> for CheckoutError {
    fn from(err: StoreError) -> Self {
        match &err {
            StoreError::NotFound { entity, id } => {
                tracing::error!(entity = %entity, id = %id, "Store record missing");
            }
            StoreError::Unavailable(detail) => {
                tracing::error!("Store unavailable: {}", detail);
            }
            StoreError::Corrupt(detail) => {
                tracing::error!("Corrupt store record: {}", detail);
            }
        }
        CheckoutError::persistence()
    }
}

/// Converts domain rule violations.
impl From<CoreError> for CheckoutError {
    fn from(err: CoreError) -> Self {
        let message = err.to_string();
        match err {
            CoreError::EmptyCart => CheckoutError::user_input("EMPTY_CART", message),
            CoreError::InsufficientPoints { .. } => {
                CheckoutError::conflict("INSUFFICIENT_POINTS", message)
            }
            CoreError::CouponRejected(rejection) => {
                CheckoutError::user_input(rejection.code(), message)
            }
            CoreError::MissingFields { .. } => CheckoutError::user_input("MISSING_FIELDS", message),
            CoreError::InvalidAmount { .. } => CheckoutError::user_input("INVALID_AMOUNT", message),
            CoreError::CartTooLarge { .. } => CheckoutError::user_input("CART_LIMIT", message),
            CoreError::AmountOverflow => CheckoutError::user_input("AMOUNT_OVERFLOW", message),
            CoreError::QuantityTooLarge { .. } => {
                CheckoutError::user_input("QUANTITY_LIMIT", message)
            }
            CoreError::ProductNotInCart(_) => {
                CheckoutError::user_input("PRODUCT_NOT_IN_CART", message)
            }
            CoreError::Validation(_) => CheckoutError::user_input("VALIDATION_ERROR", message),
        }
    }
}

impl std::fmt::Display for CheckoutError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for CheckoutError {}

// =============================================================================
// Config Error
// =============================================================================

/// Failures loading, validating or saving `loyalty.toml`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid checkout configuration: {0}")]
    Invalid(String),

    #[error("Failed to load config: {0}")]
    LoadFailed(String),

    #[error("Failed to save config: {0}")]
    SaveFailed(String),

    #[error("Config I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        ConfigError::LoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for ConfigError {
    fn from(err: toml::ser::Error) -> Self {
        ConfigError::SaveFailed(err.to_string())
    }
}

pub type ConfigResult<T> = Result<T, ConfigError>;
