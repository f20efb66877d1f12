//! # Cart
//!
//! The redemption cart and its totals.
//!
//! ```text
//! add_to_cart(id)        qty += 1, or a new line at qty 1
//! remove_from_cart(id)   qty -= 1, the line is dropped at 0
//! redeem() committed     cleared by the engine
//! cart_totals()          read only
//! ```

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::points::Points;
use crate::types::Product;
use crate::validation::{validate_point_price, validate_quantity_within};
use crate::{MAX_CART_ITEMS, MAX_ITEM_QUANTITY};

/// A line in the cart.
///
/// ## Design Notes
/// The product's name, category and price are frozen when the line is
/// created. The history record stores these snapshots, so a later catalog
/// edit never rewrites what the user redeemed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub product_id: String,
    pub name: String,
    pub category: String,
    /// Price in points at time of adding (frozen).
    pub unit_price_points: i64,
    /// Always > 0 while the line exists.
    pub quantity: i64,
}

impl CartItem {
    pub fn from_product(product: &Product, quantity: i64) -> Self {
        CartItem {
            product_id: product.id.clone(),
            name: product.name.clone(),
            category: product.category.clone(),
            unit_price_points: product.price_points,
            quantity,
        }
    }

    #[inline]
    pub fn unit_price(&self) -> Points {
        Points::new(self.unit_price_points)
    }

    /// Unit price × quantity.
    #[inline]
    pub fn line_total(&self) -> Points {
        self.unit_price().multiply_quantity(self.quantity)
    }
}

/// Size limits applied to a cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLimits {
    /// Maximum distinct lines.
    pub max_items: usize,
    /// Maximum units of one product.
    pub max_quantity: i64,
}

impl Default for CartLimits {
    fn default() -> Self {
        CartLimits {
            max_items: MAX_CART_ITEMS,
            max_quantity: MAX_ITEM_QUANTITY,
        }
    }
}

/// The redemption cart.
///
/// ## Invariants
/// - Lines are unique by `product_id` (adding the same product increases quantity)
/// - Quantity is > 0 (a line that reaches 0 is removed)
/// - At most `limits.max_items` lines, `limits.max_quantity` units per line
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
    items: Vec<CartItem>,
    #[serde(skip)]
    limits: CartLimits,
}

impl Cart {
    /// Creates a new empty cart with the default limits.
    pub fn new() -> Self {
        Cart::default()
    }

    /// Creates a new empty cart with custom limits.
    pub fn with_limits(limits: CartLimits) -> Self {
        Cart {
            items: Vec::new(),
            limits,
        }
    }

    /// Adds `quantity` units of a product, merging with an existing line.
    pub fn add_item(&mut self, product: &Product, quantity: i64) -> CoreResult<()> {
        validate_quantity_within(quantity, self.limits.max_quantity)?;
        validate_point_price(product.price_points)?;

        let max_quantity = self.limits.max_quantity;
        let existing = self
            .items
            .iter()
            .find(|line| line.product_id == product.id)
            .map(|line| (line.unit_price(), line.quantity));

        if let Some((unit_price, current)) = existing {
            let merged = current.saturating_add(quantity);
            if merged > max_quantity {
                return Err(CoreError::QuantityTooLarge {
                    requested: merged,
                    max: max_quantity,
                });
            }
            self.ensure_subtotal_fits(&product.id, unit_price, merged)?;
            if let Some(line) = self.line_mut(&product.id) {
                line.quantity = merged;
            }
        } else if self.items.len() >= self.limits.max_items {
            return Err(CoreError::CartTooLarge {
                max: self.limits.max_items,
            });
        } else {
            self.ensure_subtotal_fits(&product.id, product.price(), quantity)?;
            self.items.push(CartItem::from_product(product, quantity));
        }
        Ok(())
    }

    /// Removes one unit of a product; the line disappears when it hits zero.
    ///
    /// ## Returns
    /// The remaining quantity of that product (0 if the line was removed).
    pub fn remove_one(&mut self, product_id: &str) -> CoreResult<i64> {
        let position = self
            .items
            .iter()
            .position(|line| line.product_id == product_id)
            .ok_or_else(|| CoreError::ProductNotInCart(product_id.to_string()))?;

        let remaining = match self.items.get_mut(position) {
            Some(item) => {
                item.quantity -= 1;
                item.quantity
            }
            None => 0,
        };

        if remaining <= 0 {
            self.items.remove(position);
            return Ok(0);
        }
        Ok(remaining)
    }

    /// Sets the quantity of a line. Zero removes the line.
    pub fn update_quantity(&mut self, product_id: &str, quantity: i64) -> CoreResult<()> {
        if quantity == 0 {
            return self.remove_item(product_id);
        }

        validate_quantity_within(quantity, self.limits.max_quantity)?;

        let unit_price = self
            .items
            .iter()
            .find(|line| line.product_id == product_id)
            .map(CartItem::unit_price)
            .ok_or_else(|| CoreError::ProductNotInCart(product_id.to_string()))?;
        self.ensure_subtotal_fits(product_id, unit_price, quantity)?;

        if let Some(line) = self.line_mut(product_id) {
            line.quantity = quantity;
        }
        Ok(())
    }

    /// Removes a line entirely.
    pub fn remove_item(&mut self, product_id: &str) -> CoreResult<()> {
        match self.items.iter().position(|line| line.product_id == product_id) {
            Some(at) => {
                self.items.remove(at);
                Ok(())
            }
            None => Err(CoreError::ProductNotInCart(product_id.to_string())),
        }
    }

    /// Fails if setting `product_id` to `quantity` units would overflow the
    /// line total or the subtotal. Keeps `subtotal()` free of overflow.
    fn ensure_subtotal_fits(
        &self,
        product_id: &str,
        unit_price: Points,
        quantity: i64,
    ) -> CoreResult<()> {
        let line_total = unit_price
            .checked_multiply_quantity(quantity)
            .ok_or(CoreError::AmountOverflow)?;

        self.items
            .iter()
            .filter(|line| line.product_id != product_id)
            .try_fold(line_total, |acc, line| acc.checked_add(line.line_total()))
            .map(|_| ())
            .ok_or(CoreError::AmountOverflow)
    }

    fn line_mut(&mut self, product_id: &str) -> Option<&mut CartItem> {
        self.items.iter_mut().find(|line| line.product_id == product_id)
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn items(&self) -> &[CartItem] {
        &self.items
    }

    /// Number of distinct lines.
    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    /// Sum of all quantities.
    pub fn total_quantity(&self) -> i64 {
        self.items.iter().map(|line| line.quantity).sum()
    }

    /// Sum of price × quantity over every line.
    pub fn subtotal(&self) -> Points {
        self.items.iter().map(CartItem::line_total).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Cart totals summary for the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct CartTotals {
    pub item_count: usize,
    pub total_quantity: i64,
    pub subtotal_points: i64,
    pub discount_points: i64,
    pub total_points: i64,
}

impl CartTotals {
    /// Builds totals for a cart and an already-computed discount.
    ///
    /// `total = max(0, subtotal - discount)`.
    pub fn new(cart: &Cart, discount: Points) -> Self {
        let subtotal = cart.subtotal();
        CartTotals {
            item_count: cart.item_count(),
            total_quantity: cart.total_quantity(),
            subtotal_points: subtotal.value(),
            discount_points: discount.value(),
            total_points: subtotal.saturating_sub_to_zero(discount).value(),
        }
    }

    #[inline]
    pub fn total(&self) -> Points {
        Points::new(self.total_points)
    }
}

impl From<&Cart> for CartTotals {
    fn from(cart: &Cart) -> Self {
        CartTotals::new(cart, Points::zero())
    }
}
