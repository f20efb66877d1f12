//! # loyalty-checkout: Checkout Engine for the Loyalty Storefront
//!
//! Orchestrates one user's checkout against injected collaborators: catalog,
//! cart, coupons, point redemption, card top-ups and purchase history.
//!
//! ## Module Organization
//! ```text
//! loyalty_checkout/
//! ├── lib.rs      ◄─── You are here (exports + tracing setup)
//! ├── engine.rs   ◄─── CheckoutEngine, Collaborators, commit stage
//! ├── session.rs  ◄─── CheckoutSession (cart + applied coupon)
//! ├── config.rs   ◄─── loyalty.toml + LOYALTY_* overrides
//! ├── memory.rs   ◄─── In-memory stores with fault injection
//! └── error.rs    ◄─── CheckoutError (kind + code + message), ConfigError
//! ```
//!
//! ## Startup Sequence
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  1. init_tracing()              RUST_LOG or "info,loyalty=debug,..."   │
//! │  2. CheckoutConfig::load(None)  defaults → loyalty.toml → env          │
//! │  3. Build collaborators         loyalty-db repositories or memory      │
//! │  4. CheckoutEngine::new(user, collaborators, &config)                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example Usage
//! ```rust,ignore
//! use loyalty_checkout::{init_tracing, CheckoutConfig, CheckoutEngine, Collaborators};
//!
//! init_tracing();
//! let config = CheckoutConfig::load(None)?;
//! let db = loyalty_db::Database::new(loyalty_db::DbConfig::new("loyalty.db")).await?;
//! let stores = Collaborators::new(
//!     Arc::new(db.accounts()),
//!     Arc::new(db.coupons()),
//!     Arc::new(db.products()),
//!     Arc::new(db.history(config.device_id())),
//! );
//! let engine = CheckoutEngine::new(user_id, stores, &config);
//! engine.add_to_cart(&product_id).await?;
//! engine.apply_coupon("percent10").await?;
//! let receipt = engine.redeem().await?;
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod memory;
pub mod session;

pub use config::CheckoutConfig;
pub use engine::{CheckoutEngine, CheckoutReceipt, Collaborators};
pub use error::{CheckoutError, CheckoutResult, ConfigError, ConfigResult, ErrorKind};
pub use session::CheckoutSession;

use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is not set.
pub const DEFAULT_LOG_FILTER: &str = "info,loyalty=debug,sqlx=warn";

/// Initializes the tracing subscriber for structured logging.
///
/// ## Log Levels
/// - `RUST_LOG=debug` - Show debug messages
/// - `RUST_LOG=loyalty_checkout=trace` - Trace for the engine only
/// - Default: [`DEFAULT_LOG_FILTER`]
///
/// Calling it again once a subscriber is installed does nothing.
pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    if tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .is_err()
    {
        tracing::debug!("Tracing subscriber already installed");
    }
}
