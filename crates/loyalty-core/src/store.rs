//! # Collaborator Ports
//!
//! The async traits the checkout engine calls out through. Core defines the
//! contracts; `loyalty-db` implements them on SQLite and
//! `loyalty-checkout::memory` implements them in memory.
//!
//! ```text
//! ┌──────────────────────────┐        ┌──────────────────────────────────┐
//! │  CheckoutEngine          │        │  Implementations                 │
//! │                          │        │                                  │
//! │  Arc<dyn AccountStore>  ─┼──────► │  SqliteAccountStore / InMemory   │
//! │  Arc<dyn CouponStore>   ─┼──────► │  SqliteCouponStore  / InMemory   │
//! │  Arc<dyn ProductCatalog>─┼──────► │  SqliteProductCatalog / InMemory │
//! │  Arc<dyn HistoryLog>    ─┼──────► │  SqliteHistoryLog   / InMemory   │
//! └──────────────────────────┘        └──────────────────────────────────┘
//! ```
//!
//! Every method may fail with a [`StoreError`]; the engine reports any of
//! them as a persistence failure.

use async_trait::async_trait;

use crate::error::StoreResult;
use crate::points::Points;
use crate::types::{Coupon, Product, PurchaseRecord};

/// Reads and writes a user's point balance.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Current balance of the account.
    async fn get_balance(&self, user_id: &str) -> StoreResult<Points>;

    /// Overwrites the balance. Callers compute the new value themselves.
    async fn set_balance(&self, user_id: &str, balance: Points) -> StoreResult<()>;
}

/// Coupon listing and usage bookkeeping.
#[async_trait]
pub trait CouponStore: Send + Sync {
    async fn list_coupons(&self) -> StoreResult<Vec<Coupon>>;

    /// Increments the usage counter by one, and deactivates the coupon in
    /// the same step when the counter reaches its limit.
    ///
    /// Only called after a redemption committed.
    async fn increment_usage(&self, coupon_id: &str) -> StoreResult<()>;
}

/// Read-only product catalog.
#[async_trait]
pub trait ProductCatalog: Send + Sync {
    async fn list_products(&self) -> StoreResult<Vec<Product>>;
}

/// Append-only purchase history for one device or session.
#[async_trait]
pub trait HistoryLog: Send + Sync {
    async fn append(&self, record: &PurchaseRecord) -> StoreResult<()>;

    /// Every record, newest first.
    async fn list_all(&self) -> StoreResult<Vec<PurchaseRecord>>;

    /// Number of stored records.
    async fn len(&self) -> StoreResult<usize> {
        Ok(self.list_all().await?.len())
    }
}
