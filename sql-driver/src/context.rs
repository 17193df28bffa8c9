//! Query context: cancellation and deadlines
//!
//! A [`Context`] is passed into every query. Running a future under it races
//! the future against the deadline and the cancellation token; whichever
//! fires first wins and the query future is dropped, which aborts the
//! in-flight backend call.

use crate::database::traits::DriverError;
use std::future::{pending, Future};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

/// Cancellation and deadline scope for a query
#[derive(Debug, Clone, Default)]
pub struct Context {
    deadline: Option<Instant>,
    cancellation: Option<watch::Receiver<bool>>,
}

/// Cancels every [`Context`] derived from the one that created it
#[derive(Debug)]
pub struct CancelHandle {
    sender: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }
}

impl Context {
    /// A context that never expires and cannot be cancelled
    pub fn background() -> Self {
        Self::default()
    }

    /// Bound the context by a timeout from now
    ///
    /// An earlier existing deadline is kept.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(existing) => existing.min(deadline),
            None => deadline,
        });
        self
    }

    /// Make the context cancellable
    ///
    /// Replaces any cancellation token the context already carried.
    pub fn with_cancel(mut self) -> (Self, CancelHandle) {
        let (sender, receiver) = watch::channel(false);
        self.cancellation = Some(receiver);
        (self, CancelHandle { sender })
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .map(|receiver| *receiver.borrow())
            .unwrap_or(false)
    }

    /// Run a future under this context
    ///
    /// # Errors
    ///
    /// [`DriverError::Cancelled`] or [`DriverError::DeadlineExceeded`] if the
    /// context ends before the future completes, otherwise the future's own
    /// result.
    pub async fn run<F, T>(&self, future: F) -> Result<T, DriverError>
    where
        F: Future<Output = Result<T, DriverError>>,
    {
        if self.is_cancelled() {
            return Err(DriverError::Cancelled);
        }

        let deadline = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = wait_for_cancel(self.cancellation.clone()) => Err(DriverError::Cancelled),
            _ = deadline => Err(DriverError::DeadlineExceeded),
            result = future => result,
        }
    }
}

async fn wait_for_cancel(receiver: Option<watch::Receiver<bool>>) {
    let Some(mut receiver) = receiver else {
        return pending().await;
    };

    loop {
        if *receiver.borrow_and_update() {
            return;
        }
        // Sender dropped without cancelling: this context can no longer be cancelled
        if receiver.changed().await.is_err() {
            return pending().await;
        }
    }
}
