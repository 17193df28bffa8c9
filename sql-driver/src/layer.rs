//! DriverLayer - Axum integration
//!
//! This module mounts the API of a [`Driver`] into an Axum application.

use crate::api::{create_api_router, ApiState};
use crate::config::DriverOptions;
use crate::database::traits::Driver;
use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Layer exposing a driver over HTTP
///
/// # Example
///
/// ```rust,no_run
/// use axum::Router;
/// use sql_driver::{connect, DriverLayer, DriverOptions};
///
/// # async fn example() -> Result<(), sql_driver::DriverError> {
/// let options = DriverOptions::default();
/// let driver = connect("sqlite::memory:", &options).await?;
/// let app = Router::new().merge(DriverLayer::new("/sql", driver.into(), options).into_router());
/// # Ok(())
/// # }
/// ```
pub struct DriverLayer {
    base_path: String,
    state: ApiState,
}

impl DriverLayer {
    /// Create a new layer at the given base path
    ///
    /// # Arguments
    ///
    /// * `base_path` - The URL path the API is mounted under (e.g., "/sql")
    /// * `driver` - Any driver implementation
    /// * `options` - Limits applied to served queries
    pub fn new(base_path: impl Into<String>, driver: Arc<dyn Driver>, options: DriverOptions) -> Self {
        Self {
            base_path: base_path.into(),
            state: ApiState::new(driver, options),
        }
    }

    /// Convert into an Axum Router that can be merged
    ///
    /// The returned router serves the API at `{base_path}/api/*` with
    /// permissive CORS and request tracing.
    pub fn into_router(self) -> Router {
        Router::new()
            .nest(&format!("{}/api", self.base_path), create_api_router(self.state))
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
    }
}
