//! # Coupon Validation and Discounts
//!
//! The two pure functions at the bottom of the checkout dependency chain.
//!
//! ## Validation Order
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  validate_coupon("  percent10 ")                                        │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  trim + upper-case ──► ""?            ──► EMPTY_CODE                    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  exact lookup       ──► missing?       ──► NOT_FOUND                    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  is_active          ──► false?         ──► INACTIVE                     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  expires_at         ──► now >= expiry? ──► EXPIRED                      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  usage_limit        ──► count >= limit?──► USAGE_LIMIT_REACHED          │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  welcome_only       ──► history > 0?   ──► WELCOME_ONLY_RESTRICTED      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Ok(&Coupon)                                                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The first failing predicate wins, so the message a user sees for a given
//! coupon state is always the same.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;

use crate::points::Points;
use crate::types::{Coupon, Discount};

/// Why a coupon code was not accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CouponRejection {
    #[error("no coupon code was entered")]
    EmptyCode,
    #[error("coupon does not exist")]
    NotFound,
    #[error("coupon is not active")]
    Inactive,
    #[error("coupon has expired")]
    Expired,
    #[error("coupon usage limit reached")]
    UsageLimitReached,
    #[error("coupon is only valid on a first purchase")]
    WelcomeOnlyRestricted,
}

impl CouponRejection {
    /// Machine-readable code sent to the client.
    pub fn code(&self) -> &'static str {
        match self {
            CouponRejection::EmptyCode => "EMPTY_CODE",
            CouponRejection::NotFound => "NOT_FOUND",
            CouponRejection::Inactive => "INACTIVE",
            CouponRejection::Expired => "EXPIRED",
            CouponRejection::UsageLimitReached => "USAGE_LIMIT_REACHED",
            CouponRejection::WelcomeOnlyRestricted => "WELCOME_ONLY_RESTRICTED",
        }
    }
}

/// Normalizes a user-typed code: surrounding whitespace removed, upper-cased.
pub fn normalize_code(raw: &str) -> String {
    raw.trim().to_uppercase()
}

/// Finds the coupon matching `raw_code` and checks it can be used.
///
/// ## Arguments
/// * `raw_code` - What the user typed
/// * `coupons` - Every known coupon
/// * `history_len` - Number of records in the user's purchase history
/// * `now` - Current time, passed in so the check stays pure
///
/// ## Example
/// ```rust
/// use chrono::Utc;
/// use loyalty_core::coupon::{validate_coupon, CouponRejection};
/// use loyalty_core::Coupon;
///
/// let coupons = vec![Coupon::percent("PERCENT10", 10), Coupon::fixed("WELCOME", 100).welcome_only()];
///
/// assert!(validate_coupon(" percent10", &coupons, 0, Utc::now()).is_ok());
/// assert_eq!(
///     validate_coupon("welcome", &coupons, 1, Utc::now()),
///     Err(CouponRejection::WelcomeOnlyRestricted)
/// );
/// ```
pub fn validate_coupon<'a>(
    raw_code: &str,
    coupons: &'a [Coupon],
    history_len: usize,
    now: DateTime<Utc>,
) -> Result<&'a Coupon, CouponRejection> {
    let code = normalize_code(raw_code);
    if code.is_empty() {
        return Err(CouponRejection::EmptyCode);
    }

    let coupon = coupons
        .iter()
        .find(|c| c.code == code)
        .ok_or(CouponRejection::NotFound)?;

    if !coupon.is_active {
        return Err(CouponRejection::Inactive);
    }
    if coupon.is_expired_at(now) {
        return Err(CouponRejection::Expired);
    }
    if coupon.is_exhausted() {
        return Err(CouponRejection::UsageLimitReached);
    }
    if coupon.welcome_only && history_len > 0 {
        return Err(CouponRejection::WelcomeOnlyRestricted);
    }

    Ok(coupon)
}

/// Computes the discount a coupon grants on `subtotal`.
///
/// ```text
/// Percent(a): round_half_up(subtotal × a / 100)
/// Fixed(f):   f
/// then clamped to [0, subtotal]
/// ```
///
/// Coupon shapes are checked upstream, so there is no error case.
///
/// ## Example
/// ```rust
/// use loyalty_core::coupon::calculate_discount;
/// use loyalty_core::{Discount, Points};
///
/// let subtotal = Points::new(1000);
/// assert_eq!(calculate_discount(subtotal, &Discount::Percent(10)).value(), 100);
/// assert_eq!(calculate_discount(Points::new(30), &Discount::Fixed(Points::new(50))).value(), 30);
/// ```
pub fn calculate_discount(subtotal: Points, discount: &Discount) -> Points {
    if subtotal.is_negative() {
        return Points::zero();
    }

    let raw = match discount {
        Discount::Percent(pct) => subtotal.percent_of(*pct),
        Discount::Fixed(amount) => *amount,
    };

    raw.clamp_between(Points::zero(), subtotal)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn catalog() -> Vec<Coupon> {
        vec![
            Coupon::percent("PERCENT10", 10),
            Coupon::fixed("FIXED50", 50),
            Coupon::fixed("WELCOME", 100).welcome_only(),
        ]
    }

    #[test]
    fn test_lookup_is_case_and_whitespace_insensitive() {
        let coupons = catalog();
        let found = validate_coupon("  percent10\t", &coupons, 0, Utc::now()).unwrap();
        assert_eq!(found.code, "PERCENT10");
    }

    #[test]
    fn test_empty_code() {
        assert_eq!(
            validate_coupon("   ", &catalog(), 0, Utc::now()),
            Err(CouponRejection::EmptyCode)
        );
    }

    #[test]
    fn test_not_found() {
        assert_eq!(
            validate_coupon("NOPE", &catalog(), 0, Utc::now()),
            Err(CouponRejection::NotFound)
        );
    }

    #[test]
    fn test_inactive() {
        let mut coupons = catalog();
        coupons[0].is_active = false;
        assert_eq!(
            validate_coupon("PERCENT10", &coupons, 0, Utc::now()),
            Err(CouponRejection::Inactive)
        );
    }

    #[test]
    fn test_expired() {
        let now = Utc::now();
        let coupons = vec![Coupon::percent("OLD", 10).with_expiry(now - Duration::days(1))];
        assert_eq!(
            validate_coupon("OLD", &coupons, 0, now),
            Err(CouponRejection::Expired)
        );

        let coupons = vec![Coupon::percent("LATER", 10).with_expiry(now + Duration::days(1))];
        assert!(validate_coupon("LATER", &coupons, 0, now).is_ok());
    }

    #[test]
    fn test_usage_limit_reached() {
        let mut coupon = Coupon::fixed("ONCE", 10).with_usage_limit(1);
        coupon.usage_count = 1;
        assert_eq!(
            validate_coupon("ONCE", &[coupon], 0, Utc::now()),
            Err(CouponRejection::UsageLimitReached)
        );
    }

    #[test]
    fn test_welcome_only_restricted_with_history() {
        let coupons = catalog();
        assert_eq!(
            validate_coupon("WELCOME", &coupons, 1, Utc::now()),
            Err(CouponRejection::WelcomeOnlyRestricted)
        );
        assert_eq!(
            validate_coupon("WELCOME", &coupons, 7, Utc::now()),
            Err(CouponRejection::WelcomeOnlyRestricted)
        );
        assert!(validate_coupon("WELCOME", &coupons, 0, Utc::now()).is_ok());
    }

    #[test]
    fn test_predicate_order_inactive_before_expired() {
        let now = Utc::now();
        let mut coupon = Coupon::percent("BOTH", 10)
            .with_expiry(now - Duration::days(1))
            .with_usage_limit(1)
            .welcome_only();
        coupon.is_active = false;
        coupon.usage_count = 1;

        let coupons = vec![coupon];
        assert_eq!(
            validate_coupon("BOTH", &coupons, 3, now),
            Err(CouponRejection::Inactive)
        );

        let mut reactivated = coupons;
        reactivated[0].is_active = true;
        assert_eq!(
            validate_coupon("BOTH", &reactivated, 3, now),
            Err(CouponRejection::Expired)
        );
    }

    #[test]
    fn test_validation_has_no_side_effects() {
        let coupons = vec![Coupon::fixed("FIXED50", 50).with_usage_limit(3)];
        for _ in 0..2 {
            validate_coupon("FIXED50", &coupons, 0, Utc::now()).unwrap();
        }
        assert_eq!(coupons[0].usage_count, 0);
        assert!(coupons[0].is_active);
    }

    #[test]
    fn test_percent_discount_matches_rounding_rule() {
        for subtotal in [0_i64, 1, 9, 15, 99, 101, 999, 1000, 12_345] {
            for pct in [1_u32, 5, 10, 33, 50, 99, 100] {
                let s = Points::new(subtotal);
                let discount = calculate_discount(s, &Discount::Percent(pct));
                let expected = (subtotal * pct as i64 + 50) / 100;
                assert_eq!(discount.value(), expected, "subtotal {subtotal}, pct {pct}");
                assert!(discount >= Points::zero() && discount <= s);
            }
        }
    }

    #[test]
    fn test_fixed_discount_is_min_of_amount_and_subtotal() {
        for subtotal in [0_i64, 10, 50, 51, 500] {
            for amount in [0_i64, 1, 50, 1000] {
                let discount = calculate_discount(
                    Points::new(subtotal),
                    &Discount::Fixed(Points::new(amount)),
                );
                assert_eq!(discount.value(), amount.min(subtotal));
            }
        }
    }

    #[test]
    fn test_spec_scenarios() {
        let d = calculate_discount(Points::new(1000), &Discount::Percent(10));
        assert_eq!(d.value(), 100);
        assert_eq!(Points::new(1000).saturating_sub_to_zero(d).value(), 900);

        let d = calculate_discount(Points::new(500), &Discount::Fixed(Points::new(50)));
        assert_eq!(d.value(), 50);
    }

    #[test]
    fn test_rejection_codes() {
        assert_eq!(CouponRejection::WelcomeOnlyRestricted.code(), "WELCOME_ONLY_RESTRICTED");
        let json = serde_json::to_string(&CouponRejection::UsageLimitReached).unwrap();
        assert_eq!(json, "\"USAGE_LIMIT_REACHED\"");
    }
}
