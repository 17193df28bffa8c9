//! Database abstraction layer
//!
//! This module provides the backend-agnostic driver contract, the execution
//! engine every adapter is built on, and the adapters themselves.

pub mod client;
pub mod structure;
pub mod switch;
pub mod target;
pub mod traits;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "postgres")]
pub mod postgres;

// Re-export the main traits
pub use traits::{DatabaseSwitcher, Driver, DriverError};

use crate::config::DriverOptions;
use target::ConnectionTarget;

/// Open a driver for a connection URL, picking the adapter by scheme
///
/// # Example
///
/// ```rust,no_run
/// use sql_driver::{connect, Context, DriverOptions};
///
/// # async fn example() -> Result<(), sql_driver::DriverError> {
/// let driver = connect("sqlite::memory:", &DriverOptions::default()).await?;
/// let rows = driver.query(&Context::background(), "SELECT 1").await?;
/// # Ok(())
/// # }
/// ```
pub async fn connect(address: &str, options: &DriverOptions) -> Result<Box<dyn Driver>, DriverError> {
    let target = ConnectionTarget::parse(address)?;
    tracing::info!(address = %target, "opening driver");

    match target.scheme() {
        #[cfg(feature = "sqlite")]
        "sqlite" => Ok(Box::new(
            sqlite::SqliteDriver::connect(&target, options.clone()).await?,
        )),
        #[cfg(feature = "postgres")]
        "postgres" | "postgresql" => Ok(Box::new(
            postgres::PostgresDriver::connect(target, options.clone()).await?,
        )),
        scheme => Err(DriverError::InvalidTarget(format!(
            "unsupported scheme '{}'",
            scheme
        ))),
    }
}
