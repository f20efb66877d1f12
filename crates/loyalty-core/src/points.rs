//! # Points Module
//!
//! Provides the `Points` type, the in-app currency every price, balance and
//! discount is expressed in.
//!
//! ## Why a Newtype?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  POINTS ARE WHOLE NUMBERS                                               │
//! │                                                                         │
//! │  Product.price_points ──► CartItem.line_total ──► Cart.subtotal        │
//! │                                                                         │
//! │  Cart.subtotal ──► Coupon discount ──► total ──► balance debit         │
//! │                                                                         │
//! │  A raw i64 can silently be a count, an id or a timestamp.              │
//! │  Points can only be added, subtracted, and scaled by quantities.       │
//! │  Percentages always go through `percent_of` (round half up).           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use loyalty_core::points::Points;
//!
//! let price = Points::new(250);
//! let line = price.multiply_quantity(4);
//! assert_eq!(line.value(), 1000);
//! assert_eq!(line.percent_of(10).value(), 100);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Sub, SubAssign};
use ts_rs::TS;

// =============================================================================
// Points Type
// =============================================================================

/// A quantity of loyalty points.
///
/// ## Design Decisions
/// - **i64 (signed)**: intermediate differences (balance - total) may go
///   negative before being checked; stored balances never do
/// - **Single field tuple struct**: zero-cost abstraction over i64
/// - **Newtype serialization**: the client sees a plain number
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS,
)]
#[ts(export)]
pub struct Points(i64);

impl Points {
    /// Creates a points value.
    #[inline]
    pub const fn new(value: i64) -> Self {
        Points(value)
    }

    /// Returns the raw number of points.
    #[inline]
    pub const fn value(&self) -> i64 {
        self.0
    }

    /// Zero points.
    #[inline]
    pub const fn zero() -> Self {
        Points(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Multiplies a unit price by a quantity.
    ///
    /// Unchecked; carts only hold lines whose totals were verified with
    /// [`checked_multiply_quantity`](Self::checked_multiply_quantity).
    ///
    /// ## Example
    /// ```rust
    /// use loyalty_core::points::Points;
    ///
    /// let unit = Points::new(120);
    /// assert_eq!(unit.multiply_quantity(3).value(), 360);
    /// ```
    #[inline]
    pub const fn multiply_quantity(&self, qty: i64) -> Self {
        Points(self.0 * qty)
    }

    /// Returns `pct`% of this amount, rounded half up to a whole point.
    ///
    /// ## Rounding
    /// Integer math only: `(value * pct + 50) / 100`, widened to i128 so that
    /// large balances cannot overflow. Defined for non-negative values, which
    /// is the only way the checkout uses it (subtotals).
    ///
    /// ```text
    /// 1000 × 10% = 100.0  → 100
    ///   15 × 10% =   1.5  →   2   (half rounds up)
    ///   14 × 10% =   1.4  →   1
    /// ```
    ///
    /// ## Example
    /// ```rust
    /// use loyalty_core::points::Points;
    ///
    /// assert_eq!(Points::new(15).percent_of(10).value(), 2);
    /// assert_eq!(Points::new(14).percent_of(10).value(), 1);
    /// ```
    pub fn percent_of(&self, pct: u32) -> Points {
        let scaled = (self.0 as i128 * pct as i128 + 50) / 100;
        Points(scaled as i64)
    }

    /// Subtracts `other`, flooring the result at zero.
    ///
    /// Used for `total = max(0, subtotal - discount)`.
    #[inline]
    pub fn saturating_sub_to_zero(&self, other: Points) -> Points {
        Points((self.0 - other.0).max(0))
    }

    /// Clamps the value into `[min, max]`.
    #[inline]
    pub fn clamp_between(&self, min: Points, max: Points) -> Points {
        Points(self.0.clamp(min.0, max.0))
    }

    /// Checked addition, `None` on overflow.
    #[inline]
    pub fn checked_add(&self, other: Points) -> Option<Points> {
        self.0.checked_add(other.0).map(Points)
    }

    /// [`multiply_quantity`](Self::multiply_quantity), `None` on overflow.
    pub fn checked_multiply_quantity(&self, qty: i64) -> Option<Points> {
        self.0.checked_mul(qty).map(Points)
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

impl fmt::Display for Points {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} pts", self.0)
    }
}

impl Default for Points {
    fn default() -> Self {
        Points::zero()
    }
}

impl From<i64> for Points {
    fn from(value: i64) -> Self {
        Points(value)
    }
}

impl Add for Points {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Points(self.0 + other.0)
    }
}

impl AddAssign for Points {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Points {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Points(self.0 - other.0)
    }
}

impl SubAssign for Points {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

impl Mul<i64> for Points {
    type Output = Self;

    #[inline]
    fn mul(self, qty: i64) -> Self {
        Points(self.0 * qty)
    }
}

impl Sum for Points {
    fn sum<I: Iterator<Item = Points>>(iter: I) -> Self {
        iter.fold(Points::zero(), |acc, p| acc + p)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
