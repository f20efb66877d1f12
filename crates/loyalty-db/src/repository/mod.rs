//! # Repository Module
//!
//! SQLite implementations of the loyalty-core collaborator traits.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repositories and Ports                               │
//! │                                                                         │
//! │  CheckoutEngine                                                        │
//! │       │                                                                 │
//! │       │  accounts.get_balance(user)  (AccountStore)                    │
//! │       ▼                                                                 │
//! │  AccountRepository                                                     │
//! │  ├── insert / get_by_id / get_by_email   ← seed + admin paths          │
//! │  └── AccountStore impl                   ← checkout path               │
//! │       │                                                                 │
//! │       │  SQL Query                                                      │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! | Repository                                      | Implements       | Table            |
//! |-------------------------------------------------|------------------|------------------|
//! | [`AccountRepository`](account::AccountRepository) | `AccountStore`   | accounts         |
//! | [`CouponRepository`](coupon::CouponRepository)    | `CouponStore`    | coupons          |
//! | [`ProductRepository`](product::ProductRepository) | `ProductCatalog` | products         |
//! | [`HistoryRepository`](history::HistoryRepository) | `HistoryLog`     | purchase_history |

pub mod account;
pub mod coupon;
pub mod history;
pub mod product;
