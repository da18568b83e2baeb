// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Delivery failure notification.
//!
//! Failures reach subscribers through two routes: observers called inline
//! on the task that saw the failure, and unbounded channels drained by the
//! host. A panicking observer is contained and logged.

use crate::error::DeliveryFailure;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::mpsc;
use tracing::error;

/// Receives every unrecoverable delivery failure.
pub trait FailureObserver: Send + Sync {
    fn on_failure(&self, failure: &DeliveryFailure);
}

impl<F> FailureObserver for F
where
    F: Fn(&DeliveryFailure) + Send + Sync,
{
    fn on_failure(&self, failure: &DeliveryFailure) {
        self(failure);
    }
}

#[derive(Default)]
struct Subscribers {
    observers: Vec<Arc<dyn FailureObserver>>,
    channels: Vec<mpsc::UnboundedSender<Arc<DeliveryFailure>>>,
}

#[derive(Default)]
pub struct ErrorReporter {
    subscribers: RwLock<Subscribers>,
}

impl ErrorReporter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_observer(&self, observer: Arc<dyn FailureObserver>) {
        self.subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .observers
            .push(observer);
    }

    /// Opens a channel receiving every subsequent failure.
    ///
    /// The channel closes when the reporter is cleared.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<Arc<DeliveryFailure>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .channels
            .push(tx);
        rx
    }

    /// Notifies every subscriber. Failures nobody listens to are logged.
    pub fn report(&self, failure: DeliveryFailure) {
        let failure = Arc::new(failure);
        let (observers, delivered) = {
            let mut subscribers = self
                .subscribers
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            subscribers
                .channels
                .retain(|tx| tx.send(Arc::clone(&failure)).is_ok());
            (subscribers.observers.clone(), subscribers.channels.len())
        };

        if observers.is_empty() && delivered == 0 {
            error!("HEC | {}", failure);
            return;
        }

        // Observers run outside the lock so they may subscribe or clear
        for observer in observers {
            let notified = catch_unwind(AssertUnwindSafe(|| observer.on_failure(&failure)));
            if notified.is_err() {
                error!("HEC | Failure observer panicked while handling: {}", failure);
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        let subscribers = self
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers.observers.len() + subscribers.channels.len()
    }

    /// Drops every observer and closes every channel.
    pub fn clear(&self) {
        let mut subscribers = self
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers.observers.clear();
        subscribers.channels.clear();
    }
}
