//! # Database Error Types
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  sqlx::Error / MigrateError / serde_json::Error                         │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  DbError (this module)        repositories and the seed binary         │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  StoreError (loyalty-core)    what the collaborator traits return      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  CheckoutError PERSISTENCE_FAILURE, generic text for the client         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use loyalty_core::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    /// Unknown account on a balance read/write, unknown coupon on a usage increment.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Duplicate coupon code, email or purchase id.
    #[error("Duplicate value for {constraint}")]
    UniqueViolation { constraint: String },

    /// A CHECK constraint (negative balance, percent outside 1..=100) or a
    /// validator refused the row.
    #[error("Constraint violated: {0}")]
    ConstraintViolation(String),

    /// SQLITE_BUSY outlasted the busy timeout.
    #[error("Database is locked by another writer")]
    Locked,

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// A stored row could not be turned back into a domain value.
    #[error("Corrupt row: {0}")]
    Decode(String),

    #[error("Timed out waiting for a pooled connection")]
    PoolExhausted,

    #[error("Internal database error: {0}")]
    Internal(String),
}

impl DbError {
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }
}

/// SQLite reports constraint failures as text:
/// `UNIQUE constraint failed: coupons.code`, `CHECK constraint failed: points >= 0`.
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::not_found("Row", "unknown"),

            sqlx::Error::Database(db_err) => {
                let msg = db_err.message();
                if let Some(constraint) = msg.strip_prefix("UNIQUE constraint failed: ") {
                    DbError::UniqueViolation {
                        constraint: constraint.to_string(),
                    }
                } else if msg.starts_with("CHECK constraint failed") {
                    DbError::ConstraintViolation(msg.to_string())
                } else if msg.contains("database is locked") {
                    DbError::Locked
                } else {
                    DbError::QueryFailed(msg.to_string())
                }
            }

            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                DbError::Decode(err.to_string())
            }

            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,

            sqlx::Error::PoolClosed => DbError::ConnectionFailed("pool is closed".to_string()),

            _ => DbError::Internal(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

/// Line items and card receipts are stored as JSON.
impl From<serde_json::Error> for DbError {
    fn from(err: serde_json::Error) -> Self {
        DbError::Decode(err.to_string())
    }
}

impl From<DbError> for StoreError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => StoreError::NotFound { entity, id },
            DbError::Decode(msg) => StoreError::Corrupt(msg),
            other => StoreError::Unavailable(other.to_string()),
        }
    }
}

pub type DbResult<T> = Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_error_maps_to_store_error() {
        let store: StoreError = DbError::not_found("Account", "u-1").into();
        assert!(matches!(store, StoreError::NotFound { .. }));

        let store: StoreError = DbError::Decode("bad json".into()).into();
        assert!(matches!(store, StoreError::Corrupt(_)));

        let store: StoreError = DbError::Locked.into();
        assert!(matches!(store, StoreError::Unavailable(msg) if msg.contains("locked")));
    }

    #[test]
    fn test_row_not_found_is_not_found() {
        let err: DbError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, DbError::NotFound { .. }));
    }

    #[test]
    fn test_bad_json_is_decode() {
        let err: DbError = serde_json::from_str::<Vec<i64>>("[1,").unwrap_err().into();
        assert!(matches!(err, DbError::Decode(_)));
    }
}
