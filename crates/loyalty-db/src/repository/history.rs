//! # Purchase History Repository
//!
//! Append-only purchase log, one stream per device.
//!
//! ## Storage Shape
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  purchase_history                                                       │
//! │                                                                         │
//! │  id          device_id  items_json          total  method  card_json   │
//! │  ──────────  ─────────  ──────────────────  ─────  ──────  ─────────── │
//! │  17..-2      tablet-1   []                  0      card    {visa,...}  │
//! │  17..-1      tablet-1   [{"productId":..}]  900    points  NULL        │
//! │                                                                         │
//! │  append()   → INSERT only (there is no UPDATE or DELETE)               │
//! │  list_all() → WHERE device_id = ? ORDER BY rowid DESC (append order)   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbError, DbResult};
use loyalty_core::{CardReceipt, CartItem, HistoryLog, PaymentMethod, PurchaseRecord, StoreResult};

#[derive(Debug, sqlx::FromRow)]
struct HistoryRow {
    id: String,
    items_json: String,
    subtotal_points: i64,
    discount_points: i64,
    coupon_code: Option<String>,
    total_points: i64,
    payment_method: PaymentMethod,
    card_json: Option<String>,
    points_purchased: Option<i64>,
    created_at: DateTime<Utc>,
}

impl TryFrom<HistoryRow> for PurchaseRecord {
    type Error = DbError;

    fn try_from(row: HistoryRow) -> Result<Self, Self::Error> {
        let items: Vec<CartItem> = serde_json::from_str(&row.items_json)?;
        let card: Option<CardReceipt> = row
            .card_json
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?;

        Ok(PurchaseRecord {
            id: row.id,
            items,
            subtotal_points: row.subtotal_points,
            discount_points: row.discount_points,
            coupon_code: row.coupon_code,
            total_points: row.total_points,
            payment_method: row.payment_method,
            card,
            points_purchased: row.points_purchased,
            created_at: row.created_at,
        })
    }
}

/// Purchase history of one device.
#[derive(Debug, Clone)]
pub struct HistoryRepository {
    pool: SqlitePool,
    device_id: String,
}

impl HistoryRepository {
    /// Creates a history repository scoped to `device_id`.
    pub fn new(pool: SqlitePool, device_id: impl Into<String>) -> Self {
        HistoryRepository {
            pool,
            device_id: device_id.into(),
        }
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Inserts a record.
    ///
    /// ## Returns
    /// * `Err(DbError::UniqueViolation)` - A record with this id already exists
    pub async fn insert(&self, record: &PurchaseRecord) -> DbResult<()> {
        debug!(
            device_id = %self.device_id,
            record_id = %record.id,
            method = %record.payment_method,
            "Appending purchase record"
        );

        let items_json = serde_json::to_string(&record.items)?;
        let card_json = record.card.as_ref().map(serde_json::to_string).transpose()?;

        sqlx::query(
            r#"
            INSERT INTO purchase_history (
                id, device_id, items_json, subtotal_points, discount_points,
                coupon_code, total_points, payment_method, card_json,
                points_purchased, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(&record.id)
        .bind(&self.device_id)
        .bind(items_json)
        .bind(record.subtotal_points)
        .bind(record.discount_points)
        .bind(&record.coupon_code)
        .bind(record.total_points)
        .bind(record.payment_method)
        .bind(card_json)
        .bind(record.points_purchased)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Every record of this device, newest first.
    pub async fn list(&self) -> DbResult<Vec<PurchaseRecord>> {
        let rows = sqlx::query_as::<_, HistoryRow>(
            r#"
            SELECT id, items_json, subtotal_points, discount_points, coupon_code,
                   total_points, payment_method, card_json, points_purchased, created_at
            FROM purchase_history
            WHERE device_id = ?1
            ORDER BY rowid DESC
            "#,
        )
        .bind(&self.device_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(PurchaseRecord::try_from).collect()
    }

    /// Number of records of this device.
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM purchase_history WHERE device_id = ?1")
                .bind(&self.device_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }
}

#[async_trait]
impl HistoryLog for HistoryRepository {
    async fn append(&self, record: &PurchaseRecord) -> StoreResult<()> {
        Ok(self.insert(record).await?)
    }

    async fn list_all(&self) -> StoreResult<Vec<PurchaseRecord>> {
        Ok(self.list().await?)
    }

    async fn len(&self) -> StoreResult<usize> {
        Ok(self.count().await? as usize)
    }
}
