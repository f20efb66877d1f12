//! # Coupon Repository
//!
//! Coupon storage and the atomic usage counter.
//!
//! ## Usage Increment
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  UPDATE coupons                                                         │
//! │  SET usage_count = usage_count + 1,                                     │
//! │      is_active   = CASE WHEN usage_limit IS NOT NULL                    │
//! │                          AND usage_count + 1 >= usage_limit             │
//! │                         THEN 0 ELSE is_active END                       │
//! │  WHERE id = ?                                                           │
//! │                                                                         │
//! │  One statement: two devices redeeming the last use of a coupon cannot  │
//! │  both read the old counter and write the same new value.               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbError, DbResult};
use loyalty_core::coupon::normalize_code;
use loyalty_core::{Coupon, CouponStore, Discount, Points, StoreResult};

#[derive(Debug, sqlx::FromRow)]
struct CouponRow {
    id: String,
    code: String,
    discount_kind: String,
    discount_amount: i64,
    is_active: bool,
    expires_at: Option<DateTime<Utc>>,
    usage_limit: Option<i64>,
    usage_count: i64,
    welcome_only: bool,
}

impl TryFrom<CouponRow> for Coupon {
    type Error = DbError;

    fn try_from(row: CouponRow) -> Result<Self, Self::Error> {
        let discount = match row.discount_kind.as_str() {
            "percent" => Discount::Percent(to_u32(row.discount_amount, &row.code)?),
            "fixed" => Discount::Fixed(Points::new(row.discount_amount)),
            other => {
                return Err(DbError::Decode(format!(
                    "coupon {} has unknown discount kind '{}'",
                    row.code, other
                )))
            }
        };

        let usage_limit = row
            .usage_limit
            .map(|limit| to_u32(limit, &row.code))
            .transpose()?;

        Ok(Coupon {
            id: row.id,
            usage_count: to_u32(row.usage_count, &row.code)?,
            code: row.code,
            discount,
            is_active: row.is_active,
            expires_at: row.expires_at,
            usage_limit,
            welcome_only: row.welcome_only,
        })
    }
}

fn to_u32(value: i64, code: &str) -> DbResult<u32> {
    u32::try_from(value)
        .map_err(|_| DbError::Decode(format!("coupon {} has out-of-range value {}", code, value)))
}

fn discount_columns(discount: &Discount) -> (&'static str, i64) {
    match discount {
        Discount::Percent(pct) => ("percent", i64::from(*pct)),
        Discount::Fixed(amount) => ("fixed", amount.value()),
    }
}

const SELECT_COUPON: &str = r#"
    SELECT id, code, discount_kind, discount_amount, is_active,
           expires_at, usage_limit, usage_count, welcome_only
    FROM coupons
"#;

/// Repository for coupon database operations.
#[derive(Debug, Clone)]
pub struct CouponRepository {
    pool: SqlitePool,
}

impl CouponRepository {
    /// Creates a new CouponRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CouponRepository { pool }
    }

    /// Inserts a new coupon. The code is stored normalized.
    ///
    /// ## Returns
    /// * `Err(DbError::UniqueViolation)` - Code already exists
    pub async fn insert(&self, coupon: &Coupon) -> DbResult<()> {
        let code = normalize_code(&coupon.code);
        debug!(code = %code, "Inserting coupon");

        let (kind, amount) = discount_columns(&coupon.discount);

        sqlx::query(
            r#"
            INSERT INTO coupons (
                id, code, discount_kind, discount_amount, is_active,
                expires_at, usage_limit, usage_count, welcome_only, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&coupon.id)
        .bind(&code)
        .bind(kind)
        .bind(amount)
        .bind(coupon.is_active)
        .bind(coupon.expires_at)
        .bind(coupon.usage_limit.map(i64::from))
        .bind(i64::from(coupon.usage_count))
        .bind(coupon.welcome_only)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Gets a coupon by code (normalized before the lookup).
    pub async fn get_by_code(&self, code: &str) -> DbResult<Option<Coupon>> {
        let row = sqlx::query_as::<_, CouponRow>(&format!("{SELECT_COUPON} WHERE code = ?1"))
            .bind(normalize_code(code))
            .fetch_optional(&self.pool)
            .await?;

        row.map(Coupon::try_from).transpose()
    }

    /// Lists every coupon ordered by code.
    pub async fn list_all(&self) -> DbResult<Vec<Coupon>> {
        let rows = sqlx::query_as::<_, CouponRow>(&format!("{SELECT_COUPON} ORDER BY code"))
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Coupon::try_from).collect()
    }

    /// Counts coupons.
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM coupons")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Increments usage and deactivates at the limit, in one statement.
    pub async fn record_use(&self, coupon_id: &str) -> DbResult<()> {
        debug!(coupon_id = %coupon_id, "Recording coupon use");

        let result = sqlx::query(
            r#"
            UPDATE coupons
            SET usage_count = usage_count + 1,
                is_active = CASE
                    WHEN usage_limit IS NOT NULL AND usage_count + 1 >= usage_limit THEN 0
                    ELSE is_active
                END
            WHERE id = ?1
            "#,
        )
        .bind(coupon_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Coupon", coupon_id));
        }

        Ok(())
    }
}

#[async_trait]
impl CouponStore for CouponRepository {
    async fn list_coupons(&self) -> StoreResult<Vec<Coupon>> {
        Ok(self.list_all().await?)
    }

    async fn increment_usage(&self, coupon_id: &str) -> StoreResult<()> {
        Ok(self.record_use(coupon_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use chrono::Duration;

    async fn repo() -> CouponRepository {
        Database::new(DbConfig::in_memory()).await.unwrap().coupons()
    }

    #[tokio::test]
    async fn test_insert_and_list_round_trip() {
        let repo = repo().await;
        let expiry = Utc::now() + Duration::days(30);
        let percent = Coupon::percent("percent10", 10).with_expiry(expiry);
        let welcome = Coupon::fixed("WELCOME", 100).welcome_only().with_usage_limit(1);

        repo.insert(&percent).await.unwrap();
        repo.insert(&welcome).await.unwrap();

        let coupons = repo.list_coupons().await.unwrap();
        assert_eq!(coupons.len(), 2);
        assert_eq!(coupons[0].code, "PERCENT10");
        assert_eq!(coupons[0].discount, Discount::Percent(10));
        assert_eq!(
            coupons[0].expires_at.map(|e| e.timestamp()),
            Some(expiry.timestamp())
        );
        assert_eq!(coupons[1], welcome);
    }

    #[tokio::test]
    async fn test_get_by_code_normalizes() {
        let repo = repo().await;
        repo.insert(&Coupon::fixed("FIXED50", 50)).await.unwrap();

        let found = repo.get_by_code("  fixed50 ").await.unwrap().unwrap();
        assert_eq!(found.discount, Discount::Fixed(Points::new(50)));
        assert!(repo.get_by_code("NOPE").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_increment_deactivates_exactly_at_limit() {
        let repo = repo().await;
        let coupon = Coupon::fixed("TWICE", 20).with_usage_limit(2);
        repo.insert(&coupon).await.unwrap();

        repo.increment_usage(&coupon.id).await.unwrap();
        let after_one = repo.get_by_code("TWICE").await.unwrap().unwrap();
        assert_eq!(after_one.usage_count, 1);
        assert!(after_one.is_active);

        repo.increment_usage(&coupon.id).await.unwrap();
        let after_two = repo.get_by_code("TWICE").await.unwrap().unwrap();
        assert_eq!(after_two.usage_count, 2);
        assert!(!after_two.is_active);
    }

    #[tokio::test]
    async fn test_increment_unlimited_stays_active() {
        let repo = repo().await;
        let coupon = Coupon::percent("OPEN", 5);
        repo.insert(&coupon).await.unwrap();

        for _ in 0..3 {
            repo.increment_usage(&coupon.id).await.unwrap();
        }
        let stored = repo.get_by_code("OPEN").await.unwrap().unwrap();
        assert_eq!(stored.usage_count, 3);
        assert!(stored.is_active);
    }

    #[tokio::test]
    async fn test_increment_unknown_coupon_fails() {
        let repo = repo().await;
        assert!(repo.increment_usage("missing").await.is_err());
    }

    #[tokio::test]
    async fn test_duplicate_code_rejected() {
        let repo = repo().await;
        repo.insert(&Coupon::fixed("DUP", 1)).await.unwrap();
        assert!(matches!(
            repo.insert(&Coupon::fixed("dup", 2)).await,
            Err(DbError::UniqueViolation { .. })
        ));
        assert_eq!(repo.count().await.unwrap(), 1);
    }
}
