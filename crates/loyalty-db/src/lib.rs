//! # loyalty-db: SQLite Collaborators for the Loyalty Checkout
//!
//! This crate stores accounts, products, coupons and purchase history in
//! SQLite and exposes them through the loyalty-core collaborator traits.
//!
//! ## Where It Sits
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Loyalty Data Flow                                │
//! │                                                                         │
//! │  CheckoutEngine::redeem()                                              │
//! │       │  AccountStore / CouponStore / ProductCatalog / HistoryLog      │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    loyalty-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌────────────────┐   ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories  │   │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │                │   │  (embedded)  │  │   │
//! │  │   │               │    │ AccountRepo    │   │              │  │   │
//! │  │   │ SqlitePool    │◄───│ CouponRepo     │   │ 001_initial  │  │   │
//! │  │   │ WAL mode      │    │ ProductRepo    │   │   _schema    │  │   │
//! │  │   │               │    │ HistoryRepo    │   │              │  │   │
//! │  │   └───────────────┘    └────────────────┘   └──────────────┘  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite file (storage.database_path in loyalty.toml)                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`pool`]: `DbConfig` and the `Database` handle
//! - [`migrations`]: schema files compiled in with `sqlx::migrate!`
//! - [`error`]: `DbError` and its mapping into `StoreError`
//! - [`repository`]: one repository per collaborator trait
//!
//! ## Usage
//!
//! ```rust,ignore
//! use loyalty_db::{Database, DbConfig};
//! use loyalty_core::ProductCatalog;
//!
//! let db = Database::new(DbConfig::new("loyalty.db")).await?;
//! let products = db.products().list_products().await?;
//! let history = db.history("tablet-1");
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig, TableCounts};

pub use repository::account::AccountRepository;
pub use repository::coupon::CouponRepository;
pub use repository::history::HistoryRepository;
pub use repository::product::ProductRepository;
