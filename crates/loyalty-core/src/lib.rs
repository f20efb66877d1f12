//! # loyalty-core: Pure Checkout Logic for the Loyalty Storefront
//!
//! This crate holds every rule of the points checkout as pure functions and
//! plain data types. It performs no I/O; persistence is reached through the
//! async ports in [`store`].
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Loyalty Storefront Architecture                     │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    Mobile client                                │   │
//! │  │    Catalog ──► Cart ──► Coupon ──► Redeem / Card top-up         │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │              loyalty-checkout (CheckoutEngine)                  │   │
//! │  │    session, single-flight, reconciliation, config, tracing      │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ loyalty-core (THIS CRATE) ★                     │   │
//! │  │                                                                 │   │
//! │  │   ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐  │   │
//! │  │   │  types  │ │ points  │ │  cart   │ │ coupon  │ │  card   │  │   │
//! │  │   └─────────┘ └─────────┘ └─────────┘ └─────────┘ └─────────┘  │   │
//! │  │   ┌────────────┐ ┌─────────┐ ┌─────────┐                       │   │
//! │  │   │ validation │ │  store  │ │  error  │                       │   │
//! │  │   └────────────┘ └─────────┘ └─────────┘                       │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │ implements store::*                    │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                loyalty-db (SQLite collaborators)                │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Product, UserAccount, Coupon, PurchaseRecord, CheckoutPhase
//! - [`points`] - Points newtype with integer arithmetic
//! - [`cart`] - Cart, CartItem, CartTotals
//! - [`coupon`] - Coupon validator and discount calculator
//! - [`card`] - Card top-up form validation and brand detection
//! - [`validation`] - Input validators
//! - [`store`] - Collaborator traits
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use chrono::Utc;
//! use loyalty_core::coupon::{calculate_discount, validate_coupon};
//! use loyalty_core::{Coupon, Points};
//!
//! let coupons = vec![Coupon::percent("PERCENT10", 10)];
//! let coupon = validate_coupon("percent10", &coupons, 0, Utc::now()).unwrap();
//!
//! let subtotal = Points::new(1000);
//! let discount = calculate_discount(subtotal, &coupon.discount);
//! assert_eq!(subtotal.saturating_sub_to_zero(discount).value(), 900);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod card;
pub mod cart;
pub mod coupon;
pub mod error;
pub mod points;
pub mod store;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports
// =============================================================================

pub use card::{CardBrand, CardTopUpRequest, ValidatedTopUp};
pub use cart::{Cart, CartItem, CartLimits, CartTotals};
pub use coupon::CouponRejection;
pub use error::{CoreError, CoreResult, StoreError, StoreResult, ValidationError};
pub use points::Points;
pub use store::{AccountStore, CouponStore, HistoryLog, ProductCatalog};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum distinct lines allowed in a single cart.
pub const MAX_CART_ITEMS: usize = 100;

/// Maximum quantity of a single product in the cart.
///
/// ## Business Reason
/// Guards against a stuck "+" button turning into a huge redemption.
pub const MAX_ITEM_QUANTITY: i64 = 999;

/// Category assigned to products stored without one.
pub const DEFAULT_CATEGORY: &str = "Sin categoría";

/// Pseudo-category that selects the whole catalog. Always listed first.
pub const ALL_CATEGORIES: &str = "Todas";
