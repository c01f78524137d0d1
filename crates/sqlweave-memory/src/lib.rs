//! In-memory reference driver for sqlweave.
//!
//! `MemoryDatabase` evaluates [`QuerySpec`](sqlweave_query::QuerySpec)s
//! directly against tables of [`Row`](sqlweave_core::Row)s. It implements
//! the full [`Driver`](sqlweave_query::Driver) contract and is what the
//! sqlweave test-suite runs against.
//!
//! # Semantics
//!
//! - Conditions follow SQL: `AND` binds tighter than `OR`, comparisons with
//!   NULL are UNKNOWN, and `LIKE` supports `%`, `_` and `\` escapes.
//! - Column-to-column `=` compares key identity (`Value::join_key`), so a
//!   join pairs the same rows relation hydration would.
//! - Tables are schemaless. A column a row does not carry reads as NULL.
//! - Raw fragments (`filter_raw`, `select_raw`, ...) are rejected with a
//!   driver error; locks and `INTO` are accepted and ignored.
//! - A seeded `shuffle` orders rows by a SipHash of the seed and the row's
//!   content, so the same seed and rows always give the same order.
//!
//! # Example
//!
//! ```rust,ignore
//! use sqlweave_memory::MemoryDatabase;
//! use sqlweave_query::QuerySpec;
//! use sqlweave_core::{Cx, row};
//!
//! let db = MemoryDatabase::new();
//! db.seed("users", [row! {"id" => 1, "name" => "Ann"}]);
//!
//! let cx = Cx::for_testing();
//! let users = QuerySpec::table("users").get(&cx, &db).await;
//! ```

pub mod config;
pub mod database;
mod eval;
mod select;

pub use config::MemoryConfig;
pub use database::MemoryDatabase;
