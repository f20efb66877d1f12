//! # Account Repository
//!
//! Account rows and the point balance the checkout reads and writes.
//!
//! ## Balance Writes
//! ```text
//! CheckoutEngine                      accounts
//! ──────────────                      ────────
//! get_balance(user)   ──SELECT────►   points = 900
//! (engine computes 900 - 900 = 0)
//! set_balance(user,0) ──UPDATE────►   points = 0   (CHECK points >= 0)
//! ```
//!
//! The engine owns the arithmetic; this repository only stores the result.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbError, DbResult};
use loyalty_core::{AccountStore, Points, StoreResult, UserAccount};

#[derive(Debug, sqlx::FromRow)]
struct AccountRow {
    id: String,
    email: String,
    name: String,
    points: i64,
    approved: bool,
}

impl From<AccountRow> for UserAccount {
    fn from(row: AccountRow) -> Self {
        UserAccount {
            id: row.id,
            email: row.email,
            name: row.name,
            points: row.points,
            approved: row.approved,
        }
    }
}

/// Repository for account database operations.
#[derive(Debug, Clone)]
pub struct AccountRepository {
    pool: SqlitePool,
}

impl AccountRepository {
    /// Creates a new AccountRepository.
    pub fn new(pool: SqlitePool) -> Self {
        AccountRepository { pool }
    }

    /// Inserts a new account.
    ///
    /// ## Returns
    /// * `Err(DbError::UniqueViolation)` - Email already registered
    pub async fn insert(&self, account: &UserAccount) -> DbResult<()> {
        debug!(email = %account.email, "Inserting account");

        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO accounts (id, email, name, points, approved, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
            "#,
        )
        .bind(&account.id)
        .bind(&account.email)
        .bind(&account.name)
        .bind(account.points)
        .bind(account.approved)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Gets an account by its ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<UserAccount>> {
        let row = sqlx::query_as::<_, AccountRow>(
            "SELECT id, email, name, points, approved FROM accounts WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(UserAccount::from))
    }

    /// Gets an account by email (how the storefront resolves the signed-in user).
    pub async fn get_by_email(&self, email: &str) -> DbResult<Option<UserAccount>> {
        let row = sqlx::query_as::<_, AccountRow>(
            "SELECT id, email, name, points, approved FROM accounts WHERE email = ?1",
        )
        .bind(email.trim())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(UserAccount::from))
    }

    /// Counts accounts.
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM accounts")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn read_points(&self, user_id: &str) -> DbResult<i64> {
        sqlx::query_scalar::<_, i64>("SELECT points FROM accounts WHERE id = ?1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("Account", user_id))
    }

    async fn write_points(&self, user_id: &str, points: i64) -> DbResult<()> {
        debug!(user_id = %user_id, points, "Writing balance");

        let result = sqlx::query("UPDATE accounts SET points = ?2, updated_at = ?3 WHERE id = ?1")
            .bind(user_id)
            .bind(points)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Account", user_id));
        }

        Ok(())
    }
}

#[async_trait]
impl AccountStore for AccountRepository {
    async fn get_balance(&self, user_id: &str) -> StoreResult<Points> {
        Ok(Points::new(self.read_points(user_id).await?))
    }

    async fn set_balance(&self, user_id: &str, balance: Points) -> StoreResult<()> {
        Ok(self.write_points(user_id, balance.value()).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use loyalty_core::StoreError;
    use uuid::Uuid;

    fn account(email: &str, points: i64) -> UserAccount {
        UserAccount {
            id: Uuid::new_v4().to_string(),
            email: email.to_string(),
            name: "Demo".to_string(),
            points,
            approved: true,
        }
    }

    #[tokio::test]
    async fn test_balance_round_trip_through_store_trait() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.accounts();
        let acct = account("demo@loyalty.test", 900);
        repo.insert(&acct).await.unwrap();

        assert_eq!(repo.get_balance(&acct.id).await.unwrap().value(), 900);
        repo.set_balance(&acct.id, Points::zero()).await.unwrap();
        assert_eq!(repo.get_balance(&acct.id).await.unwrap(), Points::zero());

        let by_email = repo.get_by_email("demo@loyalty.test").await.unwrap().unwrap();
        assert_eq!(by_email.points, 0);
    }

    #[tokio::test]
    async fn test_unknown_account_is_not_found() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.accounts();

        assert!(matches!(
            repo.get_balance("missing").await,
            Err(StoreError::NotFound { .. })
        ));
        assert!(matches!(
            repo.set_balance("missing", Points::new(5)).await,
            Err(StoreError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_negative_balance_is_rejected_by_schema() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.accounts();
        let acct = account("a@b.co", 10);
        repo.insert(&acct).await.unwrap();

        assert!(repo.set_balance(&acct.id, Points::new(-1)).await.is_err());
        assert_eq!(repo.get_balance(&acct.id).await.unwrap().value(), 10);
    }

    #[tokio::test]
    async fn test_duplicate_email() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.accounts();
        repo.insert(&account("dup@x.io", 0)).await.unwrap();

        assert!(matches!(
            repo.insert(&account("dup@x.io", 0)).await,
            Err(DbError::UniqueViolation { .. })
        ));
        assert_eq!(repo.count().await.unwrap(), 1);
    }
}
