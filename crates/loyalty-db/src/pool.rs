//! # Storefront Database
//!
//! Opens the SQLite file behind the storefront and hands out the four
//! repositories the checkout engine talks to.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Opening the Storefront DB                          │
//! │                                                                         │
//! │  [storage] database_path (loyalty.toml)                                 │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  DbConfig::new(path)          DbConfig::in_memory()   (tests)          │
//! │       │                              │                                  │
//! │       └──────────────┬───────────────┘                                  │
//! │                      ▼                                                  │
//! │  Database::new(config) ── WAL, busy timeout, foreign keys, migrations  │
//! │                      │                                                  │
//! │     ┌────────────────┼────────────────┬─────────────────────┐          │
//! │     ▼                ▼                ▼                     ▼          │
//! │  accounts()       coupons()       products()       history(device_id)  │
//! │  AccountStore     CouponStore     ProductCatalog   HistoryLog          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Two kiosks may share one file. WAL lets the history listing of one run
//! while the other writes a balance, and the busy timeout makes a writer wait
//! for the lock instead of failing straight away.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::migrations;
use crate::repository::account::AccountRepository;
use crate::repository::coupon::CouponRepository;
use crate::repository::history::HistoryRepository;
use crate::repository::product::ProductRepository;

// =============================================================================
// Configuration
// =============================================================================

/// How to open the storefront database.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// SQLite file; `None` opens a private in-memory database.
    pub database_path: Option<PathBuf>,

    pub max_connections: u32,

    /// How long a writer waits on a locked database before giving up.
    pub busy_timeout: Duration,

    /// How long `Database::new` waits for a pooled connection.
    pub acquire_timeout: Duration,

    pub run_migrations: bool,
}

impl DbConfig {
    /// File-backed database, created on first open.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DbConfig {
            database_path: Some(path.into()),
            max_connections: 4,
            busy_timeout: Duration::from_secs(5),
            acquire_timeout: Duration::from_secs(10),
            run_migrations: true,
        }
    }

    /// Fresh in-memory database with the schema applied.
    ///
    /// A single connection, since every SQLite connection to `:memory:`
    /// would otherwise see its own empty database.
    pub fn in_memory() -> Self {
        DbConfig {
            database_path: None,
            max_connections: 1,
            busy_timeout: Duration::from_secs(1),
            acquire_timeout: Duration::from_secs(5),
            run_migrations: true,
        }
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    pub fn run_migrations(mut self, run: bool) -> Self {
        self.run_migrations = run;
        self
    }

    fn connect_options(&self) -> SqliteConnectOptions {
        let options = match &self.database_path {
            Some(path) => SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal),
            None => SqliteConnectOptions::new()
                .in_memory(true)
                .journal_mode(SqliteJournalMode::Memory),
        };

        options
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(self.busy_timeout)
            .foreign_keys(true)
    }
}

// =============================================================================
// Database
// =============================================================================

/// Row counts of the storefront tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TableCounts {
    pub accounts: i64,
    pub products: i64,
    pub coupons: i64,
    pub purchases: i64,
}

/// Handle on the storefront database.
///
/// | Accessor            | Repository          | Trait            |
/// |---------------------|---------------------|------------------|
/// | `accounts()`        | `AccountRepository` | `AccountStore`   |
/// | `coupons()`         | `CouponRepository`  | `CouponStore`    |
/// | `products()`        | `ProductRepository` | `ProductCatalog` |
/// | `history(device)`   | `HistoryRepository` | `HistoryLog`     |
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Opens the database and, unless disabled, applies pending migrations.
    pub async fn new(config: DbConfig) -> DbResult<Self> {
        match &config.database_path {
            Some(path) => info!(path = %path.display(), "Opening storefront database"),
            None => info!("Opening in-memory storefront database"),
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect_with(config.connect_options())
            .await
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;

        debug!(
            max_connections = config.max_connections,
            busy_timeout_ms = config.busy_timeout.as_millis() as u64,
            "Storefront pool ready"
        );

        let db = Database { pool };
        if config.run_migrations {
            db.run_migrations().await?;
        }

        Ok(db)
    }

    /// Applies pending migrations; a no-op when the schema is current.
    pub async fn run_migrations(&self) -> DbResult<()> {
        migrations::run_migrations(&self.pool).await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn accounts(&self) -> AccountRepository {
        AccountRepository::new(self.pool.clone())
    }

    pub fn coupons(&self) -> CouponRepository {
        CouponRepository::new(self.pool.clone())
    }

    pub fn products(&self) -> ProductRepository {
        ProductRepository::new(self.pool.clone())
    }

    /// Purchase history written by `device_id`.
    pub fn history(&self, device_id: impl Into<String>) -> HistoryRepository {
        HistoryRepository::new(self.pool.clone(), device_id)
    }

    /// Row counts across all devices, for the seed binary and diagnostics.
    pub async fn table_counts(&self) -> DbResult<TableCounts> {
        let (accounts, products, coupons, purchases): (i64, i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                (SELECT COUNT(*) FROM accounts),
                (SELECT COUNT(*) FROM products),
                (SELECT COUNT(*) FROM coupons),
                (SELECT COUNT(*) FROM purchase_history)
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(TableCounts {
            accounts,
            products,
            coupons,
            purchases,
        })
    }

    /// Round-trips a trivial query.
    pub async fn ping(&self) -> DbResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Closes every pooled connection. Later calls on any repository fail.
    pub async fn close(&self) {
        info!("Closing storefront database");
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_database_starts_empty() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        db.ping().await.unwrap();
        assert_eq!(db.table_counts().await.unwrap(), TableCounts::default());
    }

    #[tokio::test]
    async fn test_in_memory_databases_are_isolated() {
        let a = Database::new(DbConfig::in_memory()).await.unwrap();
        let b = Database::new(DbConfig::in_memory()).await.unwrap();

        a.coupons()
            .insert(&loyalty_core::Coupon::fixed("ONLY_A", 5))
            .await
            .unwrap();

        assert_eq!(a.table_counts().await.unwrap().coupons, 1);
        assert_eq!(b.table_counts().await.unwrap().coupons, 0);
    }

    #[tokio::test]
    async fn test_closed_database_rejects_queries() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.close().await;

        assert!(db.ping().await.is_err());
    }

    #[test]
    fn test_file_config_defaults() {
        let config = DbConfig::new("/tmp/loyalty.db")
            .max_connections(2)
            .busy_timeout(Duration::from_millis(250));

        assert_eq!(config.database_path, Some(PathBuf::from("/tmp/loyalty.db")));
        assert_eq!(config.max_connections, 2);
        assert_eq!(config.busy_timeout, Duration::from_millis(250));
        assert!(config.run_migrations);
        assert!(DbConfig::in_memory().database_path.is_none());
    }
}
