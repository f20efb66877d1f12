//! # Product Repository
//!
//! Catalog storage.
//!
//! ## Key Operations
//! - Catalog listing sorted by name (what the storefront shows)
//! - Category filter and distinct category list
//! - Insert for the admin dashboard and the seed binary
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  products                                                               │
//! │                                                                         │
//! │  Arepa reina pepiada | 250 | Arepas   │                                 │
//! │  Chicha              | 120 | Bebidas  │  list_all()   ORDER BY name     │
//! │  Tequeños x6         | 300 | Pasapalos│  categories() DISTINCT category │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use loyalty_core::validation::{validate_category, validate_point_price, validate_product_name};
use loyalty_core::{Product, ProductCatalog, StoreResult};

#[derive(Debug, sqlx::FromRow)]
struct ProductRow {
    id: String,
    name: String,
    price_points: i64,
    category: String,
    description: Option<String>,
    image_ref: Option<String>,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Product {
            id: row.id,
            name: row.name,
            price_points: row.price_points,
            category: row.category,
            description: row.description,
            image_ref: row.image_ref,
        }
    }
}

/// Repository for product database operations.
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    /// Creates a new ProductRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    /// Inserts a new product after validating name, price and category.
    ///
    /// A blank category is stored as the default category.
    ///
    /// ## Returns
    /// The product as stored.
    pub async fn insert(&self, product: &Product) -> DbResult<Product> {
        debug!(name = %product.name, "Inserting product");

        validate_product_name(&product.name).map_err(validation_error)?;
        validate_point_price(product.price_points).map_err(validation_error)?;
        let category = validate_category(&product.category).map_err(validation_error)?;

        let stored = Product {
            name: product.name.trim().to_string(),
            category,
            ..product.clone()
        };

        sqlx::query(
            r#"
            INSERT INTO products (
                id, name, price_points, category, description, image_ref, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&stored.id)
        .bind(&stored.name)
        .bind(stored.price_points)
        .bind(&stored.category)
        .bind(&stored.description)
        .bind(&stored.image_ref)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(stored)
    }

    /// Lists every product sorted by name.
    pub async fn list_all(&self) -> DbResult<Vec<Product>> {
        let rows = sqlx::query_as::<_, ProductRow>(
            r#"
            SELECT id, name, price_points, category, description, image_ref
            FROM products
            ORDER BY name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        debug!(count = rows.len(), "Listed products");
        Ok(rows.into_iter().map(Product::from).collect())
    }

    /// Lists the products of one category sorted by name.
    pub async fn list_by_category(&self, category: &str) -> DbResult<Vec<Product>> {
        let rows = sqlx::query_as::<_, ProductRow>(
            r#"
            SELECT id, name, price_points, category, description, image_ref
            FROM products
            WHERE category = ?1
            ORDER BY name
            "#,
        )
        .bind(category)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Product::from).collect())
    }

    /// Gets a product by its ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Product>> {
        let row = sqlx::query_as::<_, ProductRow>(
            r#"
            SELECT id, name, price_points, category, description, image_ref
            FROM products
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Product::from))
    }

    /// Distinct categories in alphabetical order.
    pub async fn categories(&self) -> DbResult<Vec<String>> {
        let categories: Vec<String> =
            sqlx::query_scalar("SELECT DISTINCT category FROM products ORDER BY category")
                .fetch_all(&self.pool)
                .await?;
        Ok(categories)
    }

    /// Counts products (for diagnostics and the seed binary).
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

fn validation_error(err: loyalty_core::ValidationError) -> DbError {
    DbError::ConstraintViolation(err.to_string())
}

#[async_trait]
impl ProductCatalog for ProductRepository {
    async fn list_products(&self) -> StoreResult<Vec<Product>> {
        Ok(self.list_all().await?)
    }
}

/// Helper to generate a new product ID.
pub fn generate_product_id() -> String {
    Uuid::new_v4().to_string()
}
