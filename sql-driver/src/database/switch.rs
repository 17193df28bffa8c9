//! Live database switching
//!
//! [`DatabaseSelector`] tracks the connection target of a switch-capable
//! adapter and runs the open-then-swap protocol against its [`Client`].

use crate::database::client::{Client, Handle};
use crate::database::target::ConnectionTarget;
use crate::database::traits::DriverError;
use std::future::Future;
use tokio::sync::{Mutex, MutexGuard};

/// Connection target of a switch-capable adapter
pub struct DatabaseSelector {
    target: Mutex<ConnectionTarget>,
    parameter: &'static str,
}

impl DatabaseSelector {
    /// `parameter` is the query parameter that selects the database
    pub fn new(target: ConnectionTarget, parameter: &'static str) -> Self {
        Self {
            target: Mutex::new(target),
            parameter,
        }
    }

    /// Lock the current target
    ///
    /// Holding the guard keeps switches out, which lets adapters read
    /// several catalog queries against one consistent connection.
    pub async fn lock(&self) -> MutexGuard<'_, ConnectionTarget> {
        self.target.lock().await
    }

    pub async fn target(&self) -> ConnectionTarget {
        self.target.lock().await.clone()
    }

    /// Point `client` at database `name`
    ///
    /// `open` receives the rewritten target and must establish a new handle.
    /// Only when it succeeds is the handle swapped into the client and the
    /// target committed. Concurrent selections are serialized.
    pub async fn select<H, F, Fut>(
        &self,
        client: &Client<H>,
        name: &str,
        open: F,
    ) -> Result<(), DriverError>
    where
        H: Handle,
        F: FnOnce(ConnectionTarget) -> Fut,
        Fut: Future<Output = Result<H, DriverError>>,
    {
        let mut target = self.target.lock().await;
        if client.is_closed() {
            return Err(DriverError::Closed);
        }

        let next = target.with_parameter(self.parameter, name);
        tracing::info!(database = name, address = %next, "switching database");

        let handle = match open(next.clone()).await {
            Ok(handle) => handle,
            Err(error) => {
                tracing::warn!(database = name, %error, "database switch failed");
                return Err(DriverError::ConnectionSwitchFailed {
                    database: name.to_string(),
                    source: Box::new(error),
                });
            }
        };

        client.swap(handle).await;
        *target = next;
        Ok(())
    }
}
