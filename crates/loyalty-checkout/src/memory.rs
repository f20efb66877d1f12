//! # In-Memory Collaborators
//!
//! Process-local implementations of the store traits, for demos and tests.
//!
//! Each store carries a [`Faults`] switchboard so a test can make calls fail
//! or stall and watch the engine's compensation and deadline handling.
//!
//! ```text
//! InMemoryStores::new()
//!     .with_account("u-1", 1000)
//!     .with_coupon(Coupon::percent("PERCENT10", 10))
//!     .with_product(product)
//!     .collaborators()  ──►  CheckoutEngine::with_settings(..)
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use loyalty_core::{
    AccountStore, Coupon, CouponStore, HistoryLog, Points, Product, ProductCatalog,
    PurchaseRecord, StoreError, StoreResult,
};

use crate::engine::Collaborators;

// =============================================================================
// Fault Injection
// =============================================================================

/// Failure and latency switches shared by every call on one store.
#[derive(Debug, Default)]
pub struct Faults {
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    delay_ms: AtomicU64,
}

impl Faults {
    pub fn fail_reads(&self, on: bool) {
        self.fail_reads.store(on, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, on: bool) {
        self.fail_writes.store(on, Ordering::SeqCst);
    }

    /// Every call sleeps this long before doing anything.
    pub fn delay(&self, delay: Duration) {
        let ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.delay_ms.store(ms, Ordering::SeqCst);
    }

    async fn before_read(&self, operation: &str) -> StoreResult<()> {
        self.pause().await;
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(format!("injected failure in {}", operation)));
        }
        Ok(())
    }

    async fn before_write(&self, operation: &str) -> StoreResult<()> {
        self.pause().await;
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(format!("injected failure in {}", operation)));
        }
        Ok(())
    }

    async fn pause(&self) {
        let ms = self.delay_ms.load(Ordering::SeqCst);
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }
}

// =============================================================================
// Accounts
// =============================================================================

#[derive(Debug, Default)]
pub struct InMemoryAccountStore {
    balances: RwLock<HashMap<String, Points>>,
    writes: AtomicU64,
    pub faults: Faults,
}

impl InMemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, user_id: &str, balance: Points) {
        self.balances
            .write()
            .await
            .insert(user_id.to_string(), balance);
    }

    /// Number of successful `set_balance` calls.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AccountStore for InMemoryAccountStore {
    async fn get_balance(&self, user_id: &str) -> StoreResult<Points> {
        self.faults.before_read("get_balance").await?;
        self.balances
            .read()
            .await
            .get(user_id)
            .copied()
            .ok_or_else(|| StoreError::not_found("Account", user_id))
    }

    async fn set_balance(&self, user_id: &str, balance: Points) -> StoreResult<()> {
        self.faults.before_write("set_balance").await?;
        if balance.is_negative() {
            return Err(StoreError::Unavailable(format!(
                "negative balance rejected for {}",
                user_id
            )));
        }

        let mut balances = self.balances.write().await;
        let slot = balances
            .get_mut(user_id)
            .ok_or_else(|| StoreError::not_found("Account", user_id))?;
        *slot = balance;
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// =============================================================================
// Coupons
// =============================================================================

#[derive(Debug, Default)]
pub struct InMemoryCouponStore {
    coupons: RwLock<Vec<Coupon>>,
    pub faults: Faults,
}

impl InMemoryCouponStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, coupon: Coupon) {
        self.coupons.write().await.push(coupon);
    }

    pub async fn get(&self, code: &str) -> Option<Coupon> {
        self.coupons
            .read()
            .await
            .iter()
            .find(|c| c.code == code)
            .cloned()
    }

    /// Replaces a stored coupon, matched by id (admin edits in tests).
    pub async fn update(&self, coupon: Coupon) {
        let mut coupons = self.coupons.write().await;
        if let Some(slot) = coupons.iter_mut().find(|c| c.id == coupon.id) {
            *slot = coupon;
        }
    }
}

#[async_trait]
impl CouponStore for InMemoryCouponStore {
    async fn list_coupons(&self) -> StoreResult<Vec<Coupon>> {
        self.faults.before_read("list_coupons").await?;
        Ok(self.coupons.read().await.clone())
    }

    async fn increment_usage(&self, coupon_id: &str) -> StoreResult<()> {
        self.faults.before_write("increment_usage").await?;
        let mut coupons = self.coupons.write().await;
        let coupon = coupons
            .iter_mut()
            .find(|c| c.id == coupon_id)
            .ok_or_else(|| StoreError::not_found("Coupon", coupon_id))?;
        coupon.record_use();
        Ok(())
    }
}

// =============================================================================
// Catalog
// =============================================================================

#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    products: RwLock<Vec<Product>>,
    pub faults: Faults,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, product: Product) {
        self.products.write().await.push(product);
    }
}

#[async_trait]
impl ProductCatalog for InMemoryCatalog {
    async fn list_products(&self) -> StoreResult<Vec<Product>> {
        self.faults.before_read("list_products").await?;
        Ok(self.products.read().await.clone())
    }
}

// =============================================================================
// History
// =============================================================================

#[derive(Debug, Default)]
pub struct InMemoryHistoryLog {
    records: RwLock<Vec<PurchaseRecord>>,
    pub faults: Faults,
}

impl InMemoryHistoryLog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HistoryLog for InMemoryHistoryLog {
    async fn append(&self, record: &PurchaseRecord) -> StoreResult<()> {
        self.faults.before_write("append").await?;
        self.records.write().await.push(record.clone());
        Ok(())
    }

    async fn list_all(&self) -> StoreResult<Vec<PurchaseRecord>> {
        self.faults.before_read("list_all").await?;
        Ok(self.records.read().await.iter().rev().cloned().collect())
    }

    async fn len(&self) -> StoreResult<usize> {
        self.faults.before_read("len").await?;
        Ok(self.records.read().await.len())
    }
}

// =============================================================================
// Bundle
// =============================================================================

/// The four in-memory stores, kept as concrete handles so a test can seed
/// them and inspect them after the engine ran.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStores {
    pub accounts: Arc<InMemoryAccountStore>,
    pub coupons: Arc<InMemoryCouponStore>,
    pub catalog: Arc<InMemoryCatalog>,
    pub history: Arc<InMemoryHistoryLog>,
}

impl InMemoryStores {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn with_account(self, user_id: &str, points: i64) -> Self {
        self.accounts.insert(user_id, Points::new(points)).await;
        self
    }

    pub async fn with_coupon(self, coupon: Coupon) -> Self {
        self.coupons.insert(coupon).await;
        self
    }

    pub async fn with_product(self, product: Product) -> Self {
        self.catalog.insert(product).await;
        self
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators::new(
            self.accounts.clone(),
            self.coupons.clone(),
            self.catalog.clone(),
            self.history.clone(),
        )
    }
}
