//! # Domain Types
//!
//! Core domain types used throughout the loyalty storefront.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Product      │   │   UserAccount   │   │     Coupon      │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (UUID)      │   │  id (UUID)      │   │  id (UUID)      │       │
//! │  │  name           │   │  email          │   │  code (UPPER)   │       │
//! │  │  price_points   │   │  points         │   │  discount       │       │
//! │  │  category       │   │  approved       │   │  usage_count    │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │ PurchaseRecord  │   │ PaymentMethod   │   │ CheckoutPhase   │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  items snapshot │   │  Points         │   │  Idle           │       │
//! │  │  subtotal       │   │  Card           │   │  Validating     │       │
//! │  │  discount       │   │  Coupon         │   │  Committing ... │       │
//! │  │  total          │   └─────────────────┘   └─────────────────┘       │
//! │  └─────────────────┘                                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

use crate::card::CardBrand;
use crate::cart::CartItem;
use crate::points::Points;

// =============================================================================
// Product
// =============================================================================

/// A catalog product priced in points.
///
/// Immutable for the duration of a session; only the admin dashboard
/// changes products.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Product {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Display name shown in the catalog and on history entries.
    pub name: String,

    /// Price in whole points.
    pub price_points: i64,

    /// Catalog category (e.g. "Arepas", "Bebidas").
    pub category: String,

    /// Optional description for product details.
    pub description: Option<String>,

    /// Optional image reference (URL or storage object name).
    pub image_ref: Option<String>,
}

impl Product {
    /// Returns the price as a Points value.
    #[inline]
    pub fn price(&self) -> Points {
        Points::new(self.price_points)
    }
}

// =============================================================================
// User Account
// =============================================================================

/// A storefront account and its point balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct UserAccount {
    pub id: String,
    pub email: String,
    pub name: String,
    /// Point balance. Never negative after a successful operation.
    pub points: i64,
    /// Set by an administrator from the dashboard.
    pub approved: bool,
}

impl UserAccount {
    #[inline]
    pub fn balance(&self) -> Points {
        Points::new(self.points)
    }
}

// =============================================================================
// Coupons
// =============================================================================

/// How a coupon reduces the subtotal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "kind", content = "amount", rename_all = "snake_case")]
pub enum Discount {
    /// Percentage of the subtotal, 1 through 100.
    Percent(u32),
    /// Fixed number of points.
    Fixed(Points),
}

/// A discount coupon.
///
/// ## Lifecycle
/// ```text
/// created (active, usage_count = 0)
///      │
///      ▼  committed redemption
/// usage_count += 1 ──► usage_count == usage_limit? ──► is_active = false
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Coupon {
    pub id: String,
    /// Normalized upper-case code, unique across coupons.
    pub code: String,
    pub discount: Discount,
    pub is_active: bool,
    /// The coupon is expired at and after this instant.
    #[ts(as = "Option<String>")]
    pub expires_at: Option<DateTime<Utc>>,
    pub usage_limit: Option<u32>,
    pub usage_count: u32,
    /// Only accounts without purchase history may use it.
    pub welcome_only: bool,
}

impl Coupon {
    /// Creates an active, unlimited coupon with a fresh id.
    pub fn new(code: &str, discount: Discount) -> Self {
        Coupon {
            id: Uuid::new_v4().to_string(),
            code: crate::coupon::normalize_code(code),
            discount,
            is_active: true,
            expires_at: None,
            usage_limit: None,
            usage_count: 0,
            welcome_only: false,
        }
    }

    /// Shorthand for a percentage coupon.
    pub fn percent(code: &str, pct: u32) -> Self {
        Coupon::new(code, Discount::Percent(pct))
    }

    /// Shorthand for a fixed-amount coupon.
    pub fn fixed(code: &str, amount: i64) -> Self {
        Coupon::new(code, Discount::Fixed(Points::new(amount)))
    }

    pub fn with_usage_limit(mut self, limit: u32) -> Self {
        self.usage_limit = Some(limit);
        self
    }

    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn welcome_only(mut self) -> Self {
        self.welcome_only = true;
        self
    }

    /// True once the usage counter has reached the limit.
    pub fn is_exhausted(&self) -> bool {
        self.usage_limit
            .is_some_and(|limit| self.usage_count >= limit)
    }

    /// True if `now` is at or past the expiry.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expiry| now >= expiry)
    }

    /// Records one committed use.
    ///
    /// Increments the counter and deactivates the coupon when the counter
    /// reaches the usage limit. Stores apply this same rule atomically.
    pub fn record_use(&mut self) {
        self.usage_count = self.usage_count.saturating_add(1);
        if self.is_exhausted() {
            self.is_active = false;
        }
    }
}

// =============================================================================
// Payment Method
// =============================================================================

/// How a purchase record was settled.
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Cart paid by debiting the point balance.
    Points,
    /// Simulated card purchase that credited points.
    Card,
    /// The coupon covered the entire subtotal.
    Coupon,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Points => "points",
            PaymentMethod::Card => "card",
            PaymentMethod::Coupon => "coupon",
        }
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Purchase Record
// =============================================================================

/// What a simulated card top-up keeps about the card.
///
/// Never the full number or the CVV.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CardReceipt {
    pub brand: CardBrand,
    pub last4: String,
    pub cardholder_name: String,
}

/// One entry in the append-only purchase history.
///
/// Uses the snapshot pattern: cart lines are copied in, so later catalog
/// edits never change what the history shows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PurchaseRecord {
    /// Time-based id, unique per session.
    pub id: String,
    /// Cart lines at the moment of commit. Empty for top-ups.
    pub items: Vec<CartItem>,
    pub subtotal_points: i64,
    pub discount_points: i64,
    pub coupon_code: Option<String>,
    pub total_points: i64,
    pub payment_method: PaymentMethod,
    /// Present for card top-ups only.
    pub card: Option<CardReceipt>,
    /// Points credited by a card top-up.
    pub points_purchased: Option<i64>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl PurchaseRecord {
    /// True for card top-ups (no cart contents consumed).
    pub fn is_top_up(&self) -> bool {
        self.payment_method == PaymentMethod::Card
    }

    #[inline]
    pub fn total(&self) -> Points {
        Points::new(self.total_points)
    }
}

// =============================================================================
// Checkout Phase
// =============================================================================

/// Phase of a single checkout attempt.
///
/// ```text
/// Idle ──► Validating ──┬──► Rejected                 (terminal, no mutation)
///                       └──► Committing ──┬──► Committed  (one debit, one record)
///                                         └──► Failed     (terminal, no mutation)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutPhase {
    #[default]
    Idle,
    Validating,
    Rejected,
    Committing,
    Committed,
    Failed,
}

impl CheckoutPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CheckoutPhase::Rejected | CheckoutPhase::Committed | CheckoutPhase::Failed
        )
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
