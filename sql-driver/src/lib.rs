//! # sql-driver
//!
//! A capability-polymorphic database driver layer for interactive query tools.
//!
//! ## Features
//!
//! - One [`Driver`] contract for running queries and inspecting schema
//! - Row-less statements report their own affected row count, so every query produces a visible result
//! - Deterministic schema structure trees built from flat metadata rows
//! - Optional live database switching through the [`DatabaseSwitcher`] capability
//! - Cancellation and deadlines through [`Context`]
//! - Adapters for SQLite and PostgreSQL, plus an Axum layer serving any driver
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use sql_driver::{connect, Context, DriverOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), sql_driver::DriverError> {
//!     let driver = connect("sqlite::memory:", &DriverOptions::default()).await?;
//!
//!     let mut rows = driver.query(&Context::background(), "SELECT 1 AS one").await?;
//!     while rows.has_next() {
//!         println!("{:?}", rows.next_row()?);
//!     }
//!
//!     for schema in driver.structure().await? {
//!         println!("{}: {} objects", schema.name, schema.children.len());
//!     }
//!
//!     driver.close().await;
//!     Ok(())
//! }
//! ```

// Public modules
pub mod api;
pub mod config;
pub mod context;
pub mod database;
pub mod layer;
pub mod schema;
pub mod stream;

// Public exports
pub use config::DriverOptions;
pub use context::{CancelHandle, Context};
pub use database::client::{Client, Handle, Session};
pub use database::connect;
pub use database::target::ConnectionTarget;
pub use database::traits::{DatabaseSwitcher, Driver, DriverError};
pub use layer::DriverLayer;
pub use schema::{Column, DatabaseList, Meta, Row, Structure, StructureType, TableOptions};
pub use stream::ResultStream;

#[cfg(feature = "sqlite")]
pub use database::sqlite::SqliteDriver;

#[cfg(feature = "postgres")]
pub use database::postgres::PostgresDriver;
