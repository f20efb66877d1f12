//! # Checkout Session
//!
//! Everything one user's storefront screen used to keep in local state, in
//! one value owned by the engine.
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │  CheckoutSession                         │
//! │                                          │
//! │  cart            Cart (lines + limits)   │
//! │  applied_coupon  Option<Coupon>          │
//! │                  snapshot taken when the │
//! │                  code was accepted       │
//! └──────────────────────────────────────────┘
//! ```
//!
//! The coupon snapshot only drives the preview. A redemption re-checks the
//! code against a fresh coupon listing before committing.

use loyalty_core::coupon::calculate_discount;
use loyalty_core::{Cart, CartLimits, CartTotals, Coupon, Points};

#[derive(Debug, Clone, Default)]
pub struct CheckoutSession {
    pub cart: Cart,
    pub applied_coupon: Option<Coupon>,
}

impl CheckoutSession {
    pub fn new(limits: CartLimits) -> Self {
        CheckoutSession {
            cart: Cart::with_limits(limits),
            applied_coupon: None,
        }
    }

    /// Discount the applied coupon would grant on the current cart.
    pub fn discount_preview(&self) -> Points {
        self.applied_coupon
            .as_ref()
            .map(|coupon| calculate_discount(self.cart.subtotal(), &coupon.discount))
            .unwrap_or_else(Points::zero)
    }

    pub fn totals(&self) -> CartTotals {
        CartTotals::new(&self.cart, self.discount_preview())
    }

    pub fn applied_code(&self) -> Option<&str> {
        self.applied_coupon.as_ref().map(|c| c.code.as_str())
    }

    /// Empties cart and coupon after a committed redemption.
    pub fn reset(&mut self) {
        self.cart.clear();
        self.applied_coupon = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loyalty_core::Product;

    fn product(id: &str, price_points: i64) -> Product {
        Product {
            id: id.to_string(),
            name: id.to_string(),
            price_points,
            category: "Arepas".to_string(),
            description: None,
            image_ref: None,
        }
    }

    #[test]
    fn test_preview_without_coupon() {
        let mut session = CheckoutSession::new(CartLimits::default());
        session.cart.add_item(&product("a", 250), 2).unwrap();

        let totals = session.totals();
        assert_eq!(totals.subtotal_points, 500);
        assert_eq!(totals.discount_points, 0);
        assert_eq!(totals.total_points, 500);
    }

    #[test]
    fn test_preview_follows_cart_changes() {
        let mut session = CheckoutSession::new(CartLimits::default());
        session.applied_coupon = Some(Coupon::percent("PERCENT10", 10));
        session.cart.add_item(&product("a", 1000), 1).unwrap();
        assert_eq!(session.totals().total_points, 900);

        session.cart.add_item(&product("b", 5), 1).unwrap();
        // 10% of 1005 rounds half up to 101
        assert_eq!(session.discount_preview().value(), 101);
        assert_eq!(session.applied_code(), Some("PERCENT10"));
    }

    #[test]
    fn test_reset_clears_cart_and_coupon() {
        let mut session = CheckoutSession::new(CartLimits::default());
        session.applied_coupon = Some(Coupon::fixed("FIXED50", 50));
        session.cart.add_item(&product("a", 100), 1).unwrap();

        session.reset();
        assert!(session.cart.is_empty());
        assert!(session.applied_coupon.is_none());
    }
}
