//! # Checkout Engine
//!
//! Drives one user's storefront session: catalog browsing, cart edits, coupon
//! application, redemptions and card top-ups.
//!
//! ## Redemption Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         redeem()                                        │
//! │                                                                         │
//! │  single-flight ── busy ──────────────────────► CHECKOUT_IN_PROGRESS     │
//! │       │                                                                 │
//! │       ▼  Validating  (cancellable)                                      │
//! │  cart empty? ─────────────────────────────────► EMPTY_CART             │
//! │  coupon re-check (fresh listing) ─── fails ──► COUPON_NO_LONGER_ELIGIBLE│
//! │  discount, total = max(0, subtotal - discount)                          │
//! │  get_balance < total ─────────────────────────► INSUFFICIENT_POINTS     │
//! │       │                                                                 │
//! │       ▼  Committing  (spawned, runs to completion)                      │
//! │  set_balance(balance - total)                                           │
//! │  history.append(record) ── fails ──► set_balance(balance), FAILED      │
//! │  coupons.increment_usage(id) ── fails ──► warn!, still COMMITTED       │
//! │  clear cart + coupon                                                    │
//! │       │                                                                 │
//! │       ▼  Committed                                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Deadlines
//! Every collaborator call runs under `tokio::time::timeout`. An elapsed
//! deadline is a persistence failure and is not retried.
//!
//! ## Cancellation
//! Dropping the future returned by `redeem`/`top_up` before the commit stage
//! abandons the attempt with no side effects and puts the phase back to
//! `Idle`. From the first balance write on,
//! the work runs in its own task and finishes even if the caller goes away.

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{watch, Mutex, OwnedMutexGuard};
use tracing::{debug, error, info, warn};
use ts_rs::TS;

use loyalty_core::card::validate_top_up;
use loyalty_core::coupon::{calculate_discount, validate_coupon};
use loyalty_core::{
    AccountStore, CardTopUpRequest, CartItem, CartLimits, CartTotals, CheckoutPhase, CoreError,
    CouponStore, HistoryLog, PaymentMethod, Points, Product, ProductCatalog, PurchaseRecord,
    StoreResult, ALL_CATEGORIES, DEFAULT_CATEGORY,
};

use crate::config::CheckoutConfig;
use crate::error::{CheckoutError, CheckoutResult};
use crate::session::CheckoutSession;

// =============================================================================
// Collaborators
// =============================================================================

/// The persistence collaborators the engine calls out through.
#[derive(Clone)]
pub struct Collaborators {
    pub accounts: Arc<dyn AccountStore>,
    pub coupons: Arc<dyn CouponStore>,
    pub catalog: Arc<dyn ProductCatalog>,
    pub history: Arc<dyn HistoryLog>,
}

impl Collaborators {
    pub fn new(
        accounts: Arc<dyn AccountStore>,
        coupons: Arc<dyn CouponStore>,
        catalog: Arc<dyn ProductCatalog>,
        history: Arc<dyn HistoryLog>,
    ) -> Self {
        Collaborators {
            accounts,
            coupons,
            catalog,
            history,
        }
    }
}

/// What a committed redemption or top-up hands back to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutReceipt {
    pub record: PurchaseRecord,

    /// Balance after the commit
    pub balance_points: i64,
}

// =============================================================================
// Engine
// =============================================================================

pub struct CheckoutEngine {
    user_id: String,
    stores: Collaborators,
    timeout: Duration,
    session: Arc<Mutex<CheckoutSession>>,
    phase: Arc<watch::Sender<CheckoutPhase>>,
    in_flight: Arc<AtomicBool>,
    record_seq: AtomicU64,
}

impl CheckoutEngine {
    /// Creates an engine for `user_id` using the limits and deadline in `config`.
    pub fn new(user_id: impl Into<String>, stores: Collaborators, config: &CheckoutConfig) -> Self {
        Self::with_settings(
            user_id,
            stores,
            config.cart_limits(),
            config.persistence_timeout(),
        )
    }

    pub fn with_settings(
        user_id: impl Into<String>,
        stores: Collaborators,
        limits: CartLimits,
        timeout: Duration,
    ) -> Self {
        let (phase, _) = watch::channel(CheckoutPhase::Idle);
        CheckoutEngine {
            user_id: user_id.into(),
            stores,
            timeout,
            session: Arc::new(Mutex::new(CheckoutSession::new(limits))),
            phase: Arc::new(phase),
            in_flight: Arc::new(AtomicBool::new(false)),
            record_seq: AtomicU64::new(0),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Phase of the most recent redeem or top-up attempt.
    pub fn phase(&self) -> CheckoutPhase {
        *self.phase.borrow()
    }

    /// Receiver that observes every phase transition.
    pub fn subscribe_phase(&self) -> watch::Receiver<CheckoutPhase> {
        self.phase.subscribe()
    }

    // =========================================================================
    // Catalog
    // =========================================================================

    /// Products sorted by name, optionally restricted to one category.
    ///
    /// `None` and `"Todas"` both mean every category.
    pub async fn products(&self, category: Option<&str>) -> CheckoutResult<Vec<Product>> {
        let mut products: Vec<Product> = self
            .call("list_products", self.stores.catalog.list_products())
            .await?
            .into_iter()
            .map(with_default_category)
            .collect();

        if let Some(category) = category.filter(|c| *c != ALL_CATEGORIES) {
            products.retain(|p| p.category == category);
        }
        products.sort_by(|a, b| a.name.cmp(&b.name));

        debug!(count = products.len(), ?category, "Listed catalog");
        Ok(products)
    }

    /// Distinct categories, alphabetical, preceded by `"Todas"`.
    pub async fn categories(&self) -> CheckoutResult<Vec<String>> {
        let products = self
            .call("list_products", self.stores.catalog.list_products())
            .await?;

        let distinct: BTreeSet<String> = products
            .into_iter()
            .map(|p| with_default_category(p).category)
            .collect();

        Ok(std::iter::once(ALL_CATEGORIES.to_string())
            .chain(distinct)
            .collect())
    }

    // =========================================================================
    // Cart
    // =========================================================================

    /// Adds one unit of a catalog product.
    pub async fn add_to_cart(&self, product_id: &str) -> CheckoutResult<CartTotals> {
        let product = self
            .call("list_products", self.stores.catalog.list_products())
            .await?
            .into_iter()
            .find(|p| p.id == product_id)
            .map(with_default_category)
            .ok_or_else(|| CheckoutError::product_not_found(product_id))?;

        let mut session = self.session.lock().await;
        session.cart.add_item(&product, 1)?;

        debug!(user_id = %self.user_id, product_id = %product_id, "Added to cart");
        Ok(session.totals())
    }

    /// Removes one unit; the line disappears at zero.
    pub async fn remove_from_cart(&self, product_id: &str) -> CheckoutResult<CartTotals> {
        let mut session = self.session.lock().await;
        let remaining = session.cart.remove_one(product_id)?;

        debug!(user_id = %self.user_id, product_id = %product_id, remaining, "Removed from cart");
        Ok(session.totals())
    }

    pub async fn cart_items(&self) -> Vec<CartItem> {
        self.session.lock().await.cart.items().to_vec()
    }

    /// Totals with the discount of the applied coupon, if any.
    pub async fn cart_totals(&self) -> CartTotals {
        self.session.lock().await.totals()
    }

    // =========================================================================
    // Coupons
    // =========================================================================

    /// Validates `code` and attaches the coupon to the session.
    ///
    /// Never touches the coupon's usage counter.
    pub async fn apply_coupon(&self, code: &str) -> CheckoutResult<CartTotals> {
        let coupons = self
            .call("list_coupons", self.stores.coupons.list_coupons())
            .await?;
        let history_len = self.call("history_len", self.stores.history.len()).await?;

        let coupon = validate_coupon(code, &coupons, history_len, Utc::now())
            .map_err(|reason| {
                info!(user_id = %self.user_id, code = %code, reason = reason.code(), "Coupon rejected");
                CheckoutError::from(CoreError::from(reason))
            })?
            .clone();

        info!(user_id = %self.user_id, code = %coupon.code, "Coupon applied");

        let mut session = self.session.lock().await;
        session.applied_coupon = Some(coupon);
        Ok(session.totals())
    }

    pub async fn remove_coupon(&self) -> CartTotals {
        let mut session = self.session.lock().await;
        if let Some(coupon) = session.applied_coupon.take() {
            debug!(user_id = %self.user_id, code = %coupon.code, "Coupon removed");
        }
        session.totals()
    }

    // =========================================================================
    // Account
    // =========================================================================

    pub async fn balance(&self) -> CheckoutResult<Points> {
        self.call("get_balance", self.stores.accounts.get_balance(&self.user_id))
            .await
    }

    /// Purchase history, newest first.
    pub async fn history(&self) -> CheckoutResult<Vec<PurchaseRecord>> {
        self.call("list_history", self.stores.history.list_all())
            .await
    }

    // =========================================================================
    // Redemption
    // =========================================================================

    /// Exchanges the cart for points.
    ///
    /// ## Errors
    /// * `EMPTY_CART` - Nothing to redeem
    /// * `COUPON_NO_LONGER_ELIGIBLE` - The applied coupon failed its re-check
    /// * `INSUFFICIENT_POINTS` - Balance below the total; cart and coupon kept
    /// * `CHECKOUT_IN_PROGRESS` - Another redeem or top-up is running
    /// * `PERSISTENCE_FAILURE` - A collaborator failed or timed out
    pub async fn redeem(&self) -> CheckoutResult<CheckoutReceipt> {
        let flight = self.begin_attempt()?;
        let session = self.session.clone().lock_owned().await;

        let plan = match self.plan_redemption(&session).await {
            Ok(plan) => plan,
            Err(err) => return Err(self.abandon(err)),
        };

        self.commit(flight, plan, Some(session)).await
    }

    async fn plan_redemption(&self, session: &CheckoutSession) -> CheckoutResult<CommitPlan> {
        if session.cart.is_empty() {
            return Err(CoreError::EmptyCart.into());
        }

        let subtotal = session.cart.subtotal();

        let coupon = match &session.applied_coupon {
            None => None,
            Some(applied) => {
                let coupons = self
                    .call("list_coupons", self.stores.coupons.list_coupons())
                    .await?;
                let history_len = self.call("history_len", self.stores.history.len()).await?;

                let fresh = validate_coupon(&applied.code, &coupons, history_len, Utc::now())
                    .map_err(|reason| {
                        info!(
                            user_id = %self.user_id,
                            code = %applied.code,
                            reason = reason.code(),
                            "Applied coupon failed re-check"
                        );
                        CheckoutError::no_longer_eligible(reason)
                    })?;
                Some(fresh.clone())
            }
        };

        let discount = coupon
            .as_ref()
            .map(|c| calculate_discount(subtotal, &c.discount))
            .unwrap_or_else(Points::zero);
        let total = subtotal.saturating_sub_to_zero(discount);

        let balance = self
            .call("get_balance", self.stores.accounts.get_balance(&self.user_id))
            .await?;

        if balance < total {
            info!(user_id = %self.user_id, %balance, %total, "Insufficient points");
            return Err(CoreError::InsufficientPoints {
                available: balance,
                required: total,
            }
            .into());
        }

        let payment_method = if coupon.is_some() && subtotal.is_positive() && discount == subtotal {
            PaymentMethod::Coupon
        } else {
            PaymentMethod::Points
        };

        let now = Utc::now();
        let record = PurchaseRecord {
            id: self.next_record_id(now),
            items: session.cart.items().to_vec(),
            subtotal_points: subtotal.value(),
            discount_points: discount.value(),
            coupon_code: coupon.as_ref().map(|c| c.code.clone()),
            total_points: total.value(),
            payment_method,
            card: None,
            points_purchased: None,
            created_at: now,
        };

        Ok(CommitPlan {
            record,
            previous: balance,
            new_balance: balance - total,
            coupon_id: coupon.map(|c| c.id),
        })
    }

    // =========================================================================
    // Card Top-Up
    // =========================================================================

    /// Credits points bought with a simulated card payment.
    ///
    /// No money moves; the card is only validated and summarized on the record.
    ///
    /// ## Errors
    /// * `MISSING_FIELDS` - One or more blank form fields
    /// * `INVALID_AMOUNT` - Amount is not a positive whole number
    /// * `CHECKOUT_IN_PROGRESS` - Another redeem or top-up is running
    /// * `PERSISTENCE_FAILURE` - A collaborator failed or timed out
    pub async fn top_up(&self, request: &CardTopUpRequest) -> CheckoutResult<CheckoutReceipt> {
        let flight = self.begin_attempt()?;

        let plan = match self.plan_top_up(request).await {
            Ok(plan) => plan,
            Err(err) => return Err(self.abandon(err)),
        };

        self.commit(flight, plan, None).await
    }

    async fn plan_top_up(&self, request: &CardTopUpRequest) -> CheckoutResult<CommitPlan> {
        let top_up = validate_top_up(request)?;

        let balance = self
            .call("get_balance", self.stores.accounts.get_balance(&self.user_id))
            .await?;
        let new_balance = balance.checked_add(top_up.points).ok_or_else(|| {
            CoreError::InvalidAmount {
                input: request.points.trim().to_string(),
            }
        })?;

        let now = Utc::now();
        let record = PurchaseRecord {
            id: self.next_record_id(now),
            items: Vec::new(),
            subtotal_points: 0,
            discount_points: 0,
            coupon_code: None,
            total_points: 0,
            payment_method: PaymentMethod::Card,
            card: Some(top_up.receipt()),
            points_purchased: Some(top_up.points.value()),
            created_at: now,
        };

        Ok(CommitPlan {
            record,
            previous: balance,
            new_balance,
            coupon_id: None,
        })
    }

    // =========================================================================
    // Attempt Lifecycle
    // =========================================================================

    fn begin_attempt(&self) -> CheckoutResult<FlightGuard> {
        let guard = FlightGuard::acquire(&self.in_flight, &self.phase).ok_or_else(|| {
            debug!(user_id = %self.user_id, "Rejecting concurrent checkout attempt");
            CheckoutError::in_progress()
        })?;
        self.phase.send_replace(CheckoutPhase::Validating);
        Ok(guard)
    }

    /// Ends an attempt that failed before committing.
    fn abandon(&self, err: CheckoutError) -> CheckoutError {
        let phase = if err.is_persistence_failure() {
            CheckoutPhase::Failed
        } else {
            CheckoutPhase::Rejected
        };
        self.phase.send_replace(phase);
        err
    }

    /// Runs the commit stage in its own task so it cannot be cancelled halfway.
    async fn commit(
        &self,
        flight: FlightGuard,
        plan: CommitPlan,
        session: Option<OwnedMutexGuard<CheckoutSession>>,
    ) -> CheckoutResult<CheckoutReceipt> {
        self.phase.send_replace(CheckoutPhase::Committing);

        let committer = Committer {
            stores: self.stores.clone(),
            user_id: self.user_id.clone(),
            timeout: self.timeout,
        };
        let phase = Arc::clone(&self.phase);

        let task = tokio::spawn(async move {
            let _flight = flight;
            let mut session = session;

            let result = committer.run(plan).await;
            match &result {
                Ok(_) => {
                    if let Some(session) = session.as_mut() {
                        session.reset();
                    }
                    phase.send_replace(CheckoutPhase::Committed);
                }
                Err(_) => {
                    phase.send_replace(CheckoutPhase::Failed);
                }
            }
            result
        });

        task.await.unwrap_or_else(|err| {
            error!(user_id = %self.user_id, error = %err, "Commit task did not finish");
            self.phase.send_replace(CheckoutPhase::Failed);
            Err(CheckoutError::persistence())
        })
    }

    fn next_record_id(&self, at: DateTime<Utc>) -> String {
        let seq = self.record_seq.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{}-{}", at.timestamp_millis(), seq)
    }

    async fn call<T>(
        &self,
        operation: &'static str,
        fut: impl Future<Output = StoreResult<T>>,
    ) -> CheckoutResult<T> {
        bounded(self.timeout, operation, fut).await
    }
}

// =============================================================================
// Commit Stage
// =============================================================================

/// Everything decided before the first write.
#[derive(Debug)]
struct CommitPlan {
    record: PurchaseRecord,
    previous: Points,
    new_balance: Points,
    coupon_id: Option<String>,
}

struct Committer {
    stores: Collaborators,
    user_id: String,
    timeout: Duration,
}

impl Committer {
    async fn run(self, plan: CommitPlan) -> CheckoutResult<CheckoutReceipt> {
        let CommitPlan {
            record,
            previous,
            new_balance,
            coupon_id,
        } = plan;

        if let Err(err) = bounded(
            self.timeout,
            "set_balance",
            self.stores.accounts.set_balance(&self.user_id, new_balance),
        )
        .await
        {
            // the write may have landed before the error was reported
            self.restore_balance(previous).await;
            return Err(err);
        }

        if let Err(err) = bounded(self.timeout, "append_history", self.stores.history.append(&record)).await {
            self.restore_balance(previous).await;
            return Err(err);
        }

        if let Some(coupon_id) = coupon_id {
            self.record_coupon_use(&coupon_id).await;
        }

        info!(
            user_id = %self.user_id,
            record_id = %record.id,
            method = %record.payment_method,
            total = record.total_points,
            balance = new_balance.value(),
            "Checkout committed"
        );

        Ok(CheckoutReceipt {
            record,
            balance_points: new_balance.value(),
        })
    }

    async fn restore_balance(&self, previous: Points) {
        warn!(user_id = %self.user_id, previous = previous.value(), "Restoring balance");

        if let Err(err) = bounded(
            self.timeout,
            "restore_balance",
            self.stores.accounts.set_balance(&self.user_id, previous),
        )
        .await
        {
            error!(
                user_id = %self.user_id,
                previous = previous.value(),
                code = %err.code,
                "Balance restore failed, account needs manual reconciliation"
            );
        }
    }

    /// Usage is counted after the fact. A failure here is logged and kept.
    async fn record_coupon_use(&self, coupon_id: &str) {
        match tokio::time::timeout(self.timeout, self.stores.coupons.increment_usage(coupon_id)).await {
            Ok(Ok(())) => debug!(coupon_id = %coupon_id, "Coupon usage recorded"),
            Ok(Err(err)) => warn!(coupon_id = %coupon_id, error = %err, "Coupon usage increment failed"),
            Err(_) => warn!(coupon_id = %coupon_id, "Coupon usage increment timed out"),
        }
    }
}

// =============================================================================
// Helpers
// =============================================================================

async fn bounded<T>(
    timeout: Duration,
    operation: &'static str,
    fut: impl Future<Output = StoreResult<T>>,
) -> CheckoutResult<T> {
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result.map_err(|err| {
            debug!(operation, "Collaborator call failed");
            CheckoutError::from(err)
        }),
        Err(_) => Err(CheckoutError::timeout(
            operation,
            u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        )),
    }
}

fn with_default_category(mut product: Product) -> Product {
    if product.category.trim().is_empty() {
        product.category = DEFAULT_CATEGORY.to_string();
    }
    product
}

/// Held for the whole of one redeem or top-up attempt.
struct FlightGuard {
    flag: Arc<AtomicBool>,
    phase: Arc<watch::Sender<CheckoutPhase>>,
}

impl FlightGuard {
    fn acquire(flag: &Arc<AtomicBool>, phase: &Arc<watch::Sender<CheckoutPhase>>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| FlightGuard {
                flag: Arc::clone(flag),
                phase: Arc::clone(phase),
            })
    }
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        // still Validating here means the caller dropped the attempt mid-plan
        self.phase.send_if_modified(|phase| {
            if *phase == CheckoutPhase::Validating {
                *phase = CheckoutPhase::Idle;
                true
            } else {
                false
            }
        });
        self.flag.store(false, Ordering::Release);
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::memory::InMemoryStores;
    use loyalty_core::{CardBrand, Coupon};

    const USER: &str = "user-1";

    fn product(id: &str, name: &str, price_points: i64, category: &str) -> Product {
        Product {
            id: id.to_string(),
            name: name.to_string(),
            price_points,
            category: category.to_string(),
            description: None,
            image_ref: None,
        }
    }

    fn engine(stores: &InMemoryStores) -> CheckoutEngine {
        CheckoutEngine::with_settings(
            USER,
            stores.collaborators(),
            CartLimits::default(),
            Duration::from_millis(500),
        )
    }

    /// Arepa at 250, Chicha at 120, Quesillo at 160, account with `points`.
    async fn stores_with_balance(points: i64) -> InMemoryStores {
        InMemoryStores::new()
            .with_account(USER, points)
            .await
            .with_product(product("arepa", "Arepa reina pepiada", 250, "Arepas"))
            .await
            .with_product(product("chicha", "Chicha", 120, "Bebidas"))
            .await
            .with_product(product("quesillo", "Quesillo", 160, "Postres"))
            .await
    }

    async fn add(engine: &CheckoutEngine, product_id: &str, times: usize) {
        for _ in 0..times {
            engine.add_to_cart(product_id).await.unwrap();
        }
    }

    fn card_request(points: &str) -> CardTopUpRequest {
        CardTopUpRequest {
            cardholder_name: "Ana Pérez".to_string(),
            card_number: "4111 1111 1111 1111".to_string(),
            expiry: "12/30".to_string(),
            cvv: "123".to_string(),
            points: points.to_string(),
        }
    }

    // -------------------------------------------------------------------------
    // Redemption
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_percent_coupon_spends_whole_balance() {
        let stores = stores_with_balance(900)
            .await
            .with_coupon(Coupon::percent("PERCENT10", 10))
            .await;
        let engine = engine(&stores);
        add(&engine, "arepa", 4).await;

        let preview = engine.apply_coupon("percent10").await.unwrap();
        assert_eq!(preview.subtotal_points, 1000);
        assert_eq!(preview.discount_points, 100);
        assert_eq!(preview.total_points, 900);

        let receipt = engine.redeem().await.unwrap();
        assert_eq!(receipt.balance_points, 0);
        assert_eq!(receipt.record.total_points, 900);
        assert_eq!(receipt.record.payment_method, PaymentMethod::Points);
        assert_eq!(receipt.record.coupon_code.as_deref(), Some("PERCENT10"));
        assert_eq!(receipt.record.items[0].quantity, 4);

        assert_eq!(engine.balance().await.unwrap(), Points::zero());
        assert_eq!(stores.coupons.get("PERCENT10").await.unwrap().usage_count, 1);
        assert_eq!(engine.history().await.unwrap().len(), 1);
        assert!(engine.cart_items().await.is_empty());
        assert_eq!(engine.cart_totals().await.discount_points, 0);
        assert_eq!(engine.phase(), CheckoutPhase::Committed);
    }

    #[tokio::test]
    async fn test_insufficient_points_keeps_cart_and_coupon() {
        let stores = stores_with_balance(400)
            .await
            .with_coupon(Coupon::fixed("FIXED50", 50))
            .await;
        let engine = engine(&stores);
        add(&engine, "arepa", 2).await;
        engine.apply_coupon("FIXED50").await.unwrap();

        let err = engine.redeem().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StateConflict);
        assert_eq!(err.code(), "INSUFFICIENT_POINTS");

        assert_eq!(engine.balance().await.unwrap().value(), 400);
        assert_eq!(stores.accounts.write_count(), 0);
        assert!(engine.history().await.unwrap().is_empty());
        assert_eq!(stores.coupons.get("FIXED50").await.unwrap().usage_count, 0);

        let totals = engine.cart_totals().await;
        assert_eq!(totals.subtotal_points, 500);
        assert_eq!(totals.total_points, 450);
        assert_eq!(engine.phase(), CheckoutPhase::Rejected);
    }

    #[tokio::test]
    async fn test_empty_cart_is_rejected_without_side_effects() {
        let stores = stores_with_balance(100).await;
        let engine = engine(&stores);

        let err = engine.redeem().await.unwrap_err();
        assert_eq!(err.code(), "EMPTY_CART");
        assert_eq!(err.kind(), ErrorKind::UserInputError);
        assert_eq!(stores.accounts.write_count(), 0);
    }

    #[tokio::test]
    async fn test_coupon_covering_subtotal_pays_with_coupon() {
        let stores = stores_with_balance(0)
            .await
            .with_coupon(Coupon::fixed("GRATIS", 1000))
            .await;
        let engine = engine(&stores);
        add(&engine, "chicha", 1).await;
        engine.apply_coupon("GRATIS").await.unwrap();

        let receipt = engine.redeem().await.unwrap();
        assert_eq!(receipt.record.payment_method, PaymentMethod::Coupon);
        assert_eq!(receipt.record.discount_points, 120);
        assert_eq!(receipt.record.total_points, 0);
        assert_eq!(receipt.balance_points, 0);
        // the zero-point write still happens
        assert_eq!(stores.accounts.write_count(), 1);
    }

    #[tokio::test]
    async fn test_redeem_without_coupon() {
        let stores = stores_with_balance(1000).await;
        let engine = engine(&stores);
        add(&engine, "chicha", 2).await;
        add(&engine, "quesillo", 1).await;

        let receipt = engine.redeem().await.unwrap();
        assert_eq!(receipt.record.subtotal_points, 400);
        assert_eq!(receipt.record.discount_points, 0);
        assert!(receipt.record.coupon_code.is_none());
        assert_eq!(receipt.balance_points, 600);
    }

    // -------------------------------------------------------------------------
    // Coupons
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_welcome_coupon_rejected_after_first_purchase() {
        let stores = stores_with_balance(1000)
            .await
            .with_coupon(Coupon::fixed("WELCOME", 100).welcome_only())
            .await;
        let engine = engine(&stores);

        add(&engine, "chicha", 1).await;
        engine.redeem().await.unwrap();

        let err = engine.apply_coupon("WELCOME").await.unwrap_err();
        assert_eq!(err.code(), "WELCOME_ONLY_RESTRICTED");
        assert_eq!(err.kind(), ErrorKind::UserInputError);
    }

    #[tokio::test]
    async fn test_validating_twice_never_counts_usage() {
        let stores = stores_with_balance(1000)
            .await
            .with_coupon(Coupon::percent("PERCENT10", 10).with_usage_limit(1))
            .await;
        let engine = engine(&stores);

        engine.apply_coupon("PERCENT10").await.unwrap();
        engine.apply_coupon(" percent10 ").await.unwrap();

        let stored = stores.coupons.get("PERCENT10").await.unwrap();
        assert_eq!(stored.usage_count, 0);
        assert!(stored.is_active);
    }

    #[tokio::test]
    async fn test_usage_limit_deactivates_after_nth_commit() {
        let stores = stores_with_balance(10_000)
            .await
            .with_coupon(Coupon::fixed("TWICE", 20).with_usage_limit(2))
            .await;
        let engine = engine(&stores);

        for round in 1..=2 {
            add(&engine, "chicha", 1).await;
            engine.apply_coupon("TWICE").await.unwrap();
            engine.redeem().await.unwrap();

            if round == 1 {
                let stored = stores.coupons.get("TWICE").await.unwrap();
                assert_eq!(stored.usage_count, 1);
                assert!(stored.is_active);
            }
        }

        let stored = stores.coupons.get("TWICE").await.unwrap();
        assert_eq!(stored.usage_count, 2);
        assert!(!stored.is_active);
        assert_eq!(engine.apply_coupon("TWICE").await.unwrap_err().code(), "INACTIVE");
    }

    #[tokio::test]
    async fn test_coupon_revoked_before_commit() {
        let stores = stores_with_balance(1000)
            .await
            .with_coupon(Coupon::percent("PERCENT10", 10))
            .await;
        let engine = engine(&stores);
        add(&engine, "arepa", 1).await;
        engine.apply_coupon("PERCENT10").await.unwrap();

        let mut revoked = stores.coupons.get("PERCENT10").await.unwrap();
        revoked.is_active = false;
        stores.coupons.update(revoked).await;

        let err = engine.redeem().await.unwrap_err();
        assert_eq!(err.code(), "COUPON_NO_LONGER_ELIGIBLE");
        assert_eq!(err.kind(), ErrorKind::StateConflict);
        assert_eq!(engine.balance().await.unwrap().value(), 1000);
        assert_eq!(engine.cart_items().await.len(), 1);
        assert_eq!(engine.cart_totals().await.discount_points, 25);
    }

    #[tokio::test]
    async fn test_unknown_and_blank_codes() {
        let stores = stores_with_balance(0).await;
        let engine = engine(&stores);

        assert_eq!(engine.apply_coupon("NOPE").await.unwrap_err().code(), "NOT_FOUND");
        assert_eq!(engine.apply_coupon("   ").await.unwrap_err().code(), "EMPTY_CODE");
    }

    #[tokio::test]
    async fn test_remove_coupon_clears_preview() {
        let stores = stores_with_balance(0)
            .await
            .with_coupon(Coupon::fixed("FIXED50", 50))
            .await;
        let engine = engine(&stores);
        add(&engine, "arepa", 1).await;
        engine.apply_coupon("FIXED50").await.unwrap();

        let totals = engine.remove_coupon().await;
        assert_eq!(totals.discount_points, 0);
        assert_eq!(totals.total_points, 250);
    }

    // -------------------------------------------------------------------------
    // Top-up
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_top_up_credits_and_records_card() {
        let stores = stores_with_balance(100).await;
        let engine = engine(&stores);

        let receipt = engine.top_up(&card_request("500")).await.unwrap();
        assert_eq!(receipt.balance_points, 600);
        assert_eq!(engine.balance().await.unwrap().value(), 600);

        let history = engine.history().await.unwrap();
        assert_eq!(history.len(), 1);
        let record = &history[0];
        assert_eq!(record.payment_method, PaymentMethod::Card);
        assert_eq!(record.points_purchased, Some(500));
        assert!(record.items.is_empty());

        let card = record.card.as_ref().unwrap();
        assert_eq!(card.brand, CardBrand::Visa);
        assert_eq!(card.last4, "1111");
        assert_eq!(card.cardholder_name, "Ana Pérez");
        assert_eq!(engine.phase(), CheckoutPhase::Committed);
    }

    #[tokio::test]
    async fn test_top_up_rejects_bad_forms() {
        let stores = stores_with_balance(100).await;
        let engine = engine(&stores);

        let mut blank = card_request("");
        blank.cvv = " ".to_string();
        let err = engine.top_up(&blank).await.unwrap_err();
        assert_eq!(err.code(), "MISSING_FIELDS");
        assert!(err.message.contains("cvv"));
        assert!(err.message.contains("points"));

        for amount in ["abc", "0", "-5", "12.5"] {
            let err = engine.top_up(&card_request(amount)).await.unwrap_err();
            assert_eq!(err.code(), "INVALID_AMOUNT", "amount {:?}", amount);
        }

        assert_eq!(engine.phase(), CheckoutPhase::Rejected);
        assert_eq!(engine.balance().await.unwrap().value(), 100);
        assert!(engine.history().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_top_up_counts_as_history_for_welcome() {
        let stores = stores_with_balance(0)
            .await
            .with_coupon(Coupon::fixed("WELCOME", 100).welcome_only())
            .await;
        let engine = engine(&stores);

        engine.top_up(&card_request("50")).await.unwrap();
        assert_eq!(
            engine.apply_coupon("WELCOME").await.unwrap_err().code(),
            "WELCOME_ONLY_RESTRICTED"
        );
    }

    #[tokio::test]
    async fn test_record_ids_are_unique() {
        let stores = stores_with_balance(0).await;
        let engine = engine(&stores);

        let a = engine.top_up(&card_request("1")).await.unwrap();
        let b = engine.top_up(&card_request("1")).await.unwrap();
        assert_ne!(a.record.id, b.record.id);
        assert!(b.record.id.ends_with("-2"));
    }

    // -------------------------------------------------------------------------
    // Failures, deadlines, single-flight
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_history_failure_restores_balance() {
        let stores = stores_with_balance(1000)
            .await
            .with_coupon(Coupon::fixed("FIXED50", 50))
            .await;
        stores.history.faults.fail_writes(true);
        let engine = engine(&stores);
        add(&engine, "arepa", 2).await;
        engine.apply_coupon("FIXED50").await.unwrap();

        let err = engine.redeem().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PersistenceFailure);
        assert_eq!(err.code(), "PERSISTENCE_FAILURE");

        // debit then restore
        assert_eq!(stores.accounts.write_count(), 2);
        assert_eq!(engine.balance().await.unwrap().value(), 1000);
        assert_eq!(stores.coupons.get("FIXED50").await.unwrap().usage_count, 0);
        assert_eq!(engine.cart_items().await.len(), 1);
        assert_eq!(engine.phase(), CheckoutPhase::Failed);
    }

    #[tokio::test]
    async fn test_top_up_history_failure_restores_balance() {
        let stores = stores_with_balance(10).await;
        stores.history.faults.fail_writes(true);
        let engine = engine(&stores);

        let err = engine.top_up(&card_request("500")).await.unwrap_err();
        assert!(err.is_persistence_failure());
        assert_eq!(engine.balance().await.unwrap().value(), 10);
    }

    #[tokio::test]
    async fn test_usage_increment_failure_still_commits() {
        let stores = stores_with_balance(1000)
            .await
            .with_coupon(Coupon::fixed("FIXED50", 50))
            .await;
        let engine = engine(&stores);
        add(&engine, "arepa", 1).await;
        engine.apply_coupon("FIXED50").await.unwrap();
        stores.coupons.faults.fail_writes(true);

        let receipt = engine.redeem().await.unwrap();
        assert_eq!(receipt.balance_points, 800);
        assert_eq!(stores.coupons.get("FIXED50").await.unwrap().usage_count, 0);
        assert_eq!(engine.history().await.unwrap().len(), 1);
        assert_eq!(engine.phase(), CheckoutPhase::Committed);
    }

    #[tokio::test]
    async fn test_balance_read_failure_is_persistence_failure() {
        let stores = stores_with_balance(1000).await;
        let engine = engine(&stores);
        add(&engine, "arepa", 1).await;
        stores.accounts.faults.fail_reads(true);

        let err = engine.redeem().await.unwrap_err();
        assert!(err.is_persistence_failure());
        assert_eq!(engine.phase(), CheckoutPhase::Failed);
        assert_eq!(stores.accounts.write_count(), 0);
        assert_eq!(engine.cart_items().await.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_store_hits_deadline() {
        let stores = stores_with_balance(1000).await;
        let engine = engine(&stores);
        add(&engine, "arepa", 1).await;
        stores.accounts.faults.delay(Duration::from_secs(10));

        let err = engine.redeem().await.unwrap_err();
        assert_eq!(err.code(), "PERSISTENCE_FAILURE");
        assert_eq!(engine.phase(), CheckoutPhase::Failed);

        stores.accounts.faults.delay(Duration::ZERO);
        assert_eq!(engine.balance().await.unwrap().value(), 1000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_attempt_while_in_flight_is_rejected() {
        let stores = stores_with_balance(1000).await;
        let engine = engine(&stores);
        add(&engine, "arepa", 1).await;
        stores.accounts.faults.delay(Duration::from_millis(100));
        let request = card_request("10");

        let (first, second, top_up) = tokio::join!(
            engine.redeem(),
            engine.redeem(),
            engine.top_up(&request)
        );

        assert_eq!(first.unwrap().balance_points, 750);
        assert_eq!(second.unwrap_err().code(), "CHECKOUT_IN_PROGRESS");
        assert_eq!(top_up.unwrap_err().code(), "CHECKOUT_IN_PROGRESS");
        assert_eq!(engine.history().await.unwrap().len(), 1);
        assert_eq!(engine.phase(), CheckoutPhase::Committed);

        // the guard is released once the attempt finishes
        engine.top_up(&card_request("10")).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_before_commit_has_no_effect() {
        let stores = stores_with_balance(1000).await;
        let engine = engine(&stores);
        add(&engine, "arepa", 1).await;
        stores.accounts.faults.delay(Duration::from_millis(200));

        let abandoned = tokio::time::timeout(Duration::from_millis(50), engine.redeem()).await;
        assert!(abandoned.is_err());
        assert_eq!(stores.accounts.write_count(), 0);
        assert_eq!(engine.phase(), CheckoutPhase::Idle);

        stores.accounts.faults.delay(Duration::ZERO);
        let receipt = engine.redeem().await.unwrap();
        assert_eq!(receipt.balance_points, 750);
    }

    #[tokio::test]
    async fn test_phase_subscribers_see_final_phase() {
        let stores = stores_with_balance(1000).await;
        let engine = engine(&stores);
        let mut phases = engine.subscribe_phase();
        assert_eq!(*phases.borrow(), CheckoutPhase::Idle);

        engine.top_up(&card_request("5")).await.unwrap();
        assert!(phases.has_changed().unwrap());
        assert_eq!(*phases.borrow_and_update(), CheckoutPhase::Committed);
    }

    // -------------------------------------------------------------------------
    // Catalog and cart
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_catalog_sorted_filtered_and_categorized() {
        let stores = stores_with_balance(0)
            .await
            .with_product(product("misterio", "Bebida misteriosa", 10, ""))
            .await;
        let engine = engine(&stores);

        let names: Vec<String> = engine
            .products(None)
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(
            names,
            vec!["Arepa reina pepiada", "Bebida misteriosa", "Chicha", "Quesillo"]
        );

        let drinks = engine.products(Some("Bebidas")).await.unwrap();
        assert_eq!(drinks.len(), 1);
        assert_eq!(engine.products(Some(ALL_CATEGORIES)).await.unwrap().len(), 4);

        let uncategorized = engine.products(Some(DEFAULT_CATEGORY)).await.unwrap();
        assert_eq!(uncategorized[0].id, "misterio");

        assert_eq!(
            engine.categories().await.unwrap(),
            vec![ALL_CATEGORIES, "Arepas", "Bebidas", "Postres", DEFAULT_CATEGORY]
        );
    }

    #[tokio::test]
    async fn test_add_and_remove_one_unit() {
        let stores = stores_with_balance(0).await;
        let engine = engine(&stores);

        engine.add_to_cart("arepa").await.unwrap();
        let totals = engine.add_to_cart("arepa").await.unwrap();
        assert_eq!(totals.item_count, 1);
        assert_eq!(totals.total_quantity, 2);

        let totals = engine.remove_from_cart("arepa").await.unwrap();
        assert_eq!(totals.total_quantity, 1);
        let totals = engine.remove_from_cart("arepa").await.unwrap();
        assert_eq!(totals.item_count, 0);

        assert_eq!(
            engine.remove_from_cart("arepa").await.unwrap_err().code(),
            "PRODUCT_NOT_IN_CART"
        );
        assert_eq!(
            engine.add_to_cart("ghost").await.unwrap_err().code(),
            "PRODUCT_NOT_FOUND"
        );
    }

    #[tokio::test]
    async fn test_cart_limits_from_settings() {
        let stores = stores_with_balance(0).await;
        let engine = CheckoutEngine::with_settings(
            USER,
            stores.collaborators(),
            CartLimits {
                max_items: 1,
                max_quantity: 2,
            },
            Duration::from_millis(500),
        );

        add(&engine, "arepa", 2).await;
        assert_eq!(engine.add_to_cart("arepa").await.unwrap_err().code(), "QUANTITY_LIMIT");
        assert_eq!(engine.add_to_cart("chicha").await.unwrap_err().code(), "CART_LIMIT");
    }

    #[tokio::test]
    async fn test_oversized_price_cannot_overflow_the_total() {
        let stores = stores_with_balance(10)
            .await
            .with_product(product("oro", "Arepa de oro", i64::MAX / 2 + 1, "Arepas"))
            .await;
        let engine = engine(&stores);

        engine.add_to_cart("oro").await.unwrap();
        let err = engine.add_to_cart("oro").await.unwrap_err();
        assert_eq!(err.code(), "AMOUNT_OVERFLOW");
        assert_eq!(err.kind(), ErrorKind::UserInputError);

        let totals = engine.cart_totals().await;
        assert_eq!(totals.total_quantity, 1);
        assert_eq!(totals.total_points, i64::MAX / 2 + 1);
        assert_eq!(engine.redeem().await.unwrap_err().code(), "INSUFFICIENT_POINTS");
        assert_eq!(stores.accounts.write_count(), 0);
    }

    // -------------------------------------------------------------------------
    // SQLite collaborators
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_redeem_against_sqlite() {
        use loyalty_core::UserAccount;
        use loyalty_db::{Database, DbConfig};

        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.accounts()
            .insert(&UserAccount {
                id: USER.to_string(),
                email: "demo@loyalty.test".to_string(),
                name: "Demo".to_string(),
                points: 900,
                approved: true,
            })
            .await
            .unwrap();
        db.products()
            .insert(&product("arepa", "Arepa reina pepiada", 250, "Arepas"))
            .await
            .unwrap();
        db.coupons()
            .insert(&Coupon::percent("PERCENT10", 10).with_usage_limit(1))
            .await
            .unwrap();

        let stores = Collaborators::new(
            Arc::new(db.accounts()),
            Arc::new(db.coupons()),
            Arc::new(db.products()),
            Arc::new(db.history("tablet-1")),
        );
        let engine = CheckoutEngine::new(USER, stores, &CheckoutConfig::default());

        add(&engine, "arepa", 4).await;
        engine.apply_coupon("percent10").await.unwrap();
        let receipt = engine.redeem().await.unwrap();

        assert_eq!(receipt.balance_points, 0);
        assert_eq!(engine.balance().await.unwrap(), Points::zero());

        let coupon = db.coupons().get_by_code("PERCENT10").await.unwrap().unwrap();
        assert_eq!(coupon.usage_count, 1);
        assert!(!coupon.is_active);

        let history = engine.history().await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].id, receipt.record.id);
        assert_eq!(history[0].total_points, 900);
    }
}
