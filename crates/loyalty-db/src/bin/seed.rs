//! # Seed Data Generator
//!
//! Populates a database with a demo catalog, a demo account and the
//! standard coupons.
//!
//! ## Usage
//! ```bash
//! cargo run -p loyalty-db --bin seed
//!
//! # Specify database path and starting balance
//! cargo run -p loyalty-db --bin seed -- --db ./data/loyalty.db --points 2000
//! ```
//!
//! ## Generated Data
//! - Products across Arepas, Bebidas, Pasapalos and Postres
//! - Account `demo@loyalty.test` (approved)
//! - Coupons: PERCENT10 (10%), FIXED50 (50 points), WELCOME (100 points,
//!   first purchase only)

use std::env;

use loyalty_core::validation::{validate_balance, validate_coupon_code, validate_discount, validate_email};
use loyalty_core::{Coupon, Product, UserAccount};
use loyalty_db::migrations::migration_status;
use loyalty_db::repository::product::generate_product_id;
use loyalty_db::{Database, DbConfig};
use uuid::Uuid;

/// Demo catalog: (category, name, price in points, description)
const CATALOG: &[(&str, &str, i64, &str)] = &[
    ("Arepas", "Arepa reina pepiada", 250, "Pollo, aguacate y mayonesa"),
    ("Arepas", "Arepa pabellón", 300, "Carne mechada, caraotas, plátano y queso"),
    ("Arepas", "Arepa de queso", 180, "Queso blanco rallado"),
    ("Arepas", "Arepa dominó", 200, "Caraotas negras y queso"),
    ("Bebidas", "Chicha", 120, "Bebida de arroz con canela"),
    ("Bebidas", "Papelón con limón", 100, "Panela y limón"),
    ("Bebidas", "Malta", 90, ""),
    ("Pasapalos", "Tequeños x6", 300, "Palitos de queso envueltos en masa"),
    ("Pasapalos", "Empanada de carne", 150, ""),
    ("Postres", "Quesillo", 160, "Flan venezolano"),
    ("Postres", "Torta tres leches", 200, ""),
];

const DEMO_EMAIL: &str = "demo@loyalty.test";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    let mut db_path = String::from("./loyalty_dev.db");
    let mut points: i64 = 1000;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--points" | "-p" => {
                if i + 1 < args.len() {
                    points = args[i + 1].parse().unwrap_or(1000);
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Loyalty Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>      Database file path (default: ./loyalty_dev.db)");
                println!("  -p, --points <N>     Demo account balance (default: 1000)");
                println!("  -h, --help           Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    validate_balance(points)?;

    println!("🌱 Loyalty Seed Data Generator");
    println!("==============================");
    println!("Database: {}", db_path);
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;
    let (total, applied) = migration_status(db.pool()).await?;
    println!("✓ Connected to database");
    println!("✓ Migrations applied ({}/{})", applied, total);

    // Products
    if db.products().count().await? > 0 {
        println!("⚠ Catalog already has products, skipping");
    } else {
        for (category, name, price_points, description) in CATALOG {
            let product = Product {
                id: generate_product_id(),
                name: name.to_string(),
                price_points: *price_points,
                category: category.to_string(),
                description: (!description.is_empty()).then(|| description.to_string()),
                image_ref: None,
            };
            if let Err(e) = db.products().insert(&product).await {
                eprintln!("Failed to insert {}: {}", product.name, e);
            }
        }
        println!("✓ Inserted {} products", db.products().count().await?);
    }

    // Account
    validate_email(DEMO_EMAIL)?;
    if db.accounts().get_by_email(DEMO_EMAIL).await?.is_some() {
        println!("⚠ Account {} already exists, skipping", DEMO_EMAIL);
    } else {
        let account = UserAccount {
            id: Uuid::new_v4().to_string(),
            email: DEMO_EMAIL.to_string(),
            name: "Cliente Demo".to_string(),
            points,
            approved: true,
        };
        db.accounts().insert(&account).await?;
        println!("✓ Account {} ({} points, id {})", DEMO_EMAIL, points, account.id);
    }

    // Coupons
    let coupons = [
        Coupon::percent("PERCENT10", 10),
        Coupon::fixed("FIXED50", 50),
        Coupon::fixed("WELCOME", 100).welcome_only(),
    ];
    for coupon in &coupons {
        validate_coupon_code(&coupon.code)?;
        validate_discount(&coupon.discount)?;

        if db.coupons().get_by_code(&coupon.code).await?.is_some() {
            println!("⚠ Coupon {} already exists, skipping", coupon.code);
            continue;
        }
        db.coupons().insert(coupon).await?;
        println!("✓ Coupon {}", coupon.code);
    }

    let counts = db.table_counts().await?;
    println!();
    println!(
        "✓ Seed complete! {} accounts, {} products, {} coupons, {} purchases",
        counts.accounts, counts.products, counts.coupons, counts.purchases
    );

    Ok(())
}
