// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;
use tokio::runtime::Handle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Background task calling `tick` at a fixed period until stopped.
///
/// The first call happens one full period after start. `tick` returning
/// `false` ends the task as well.
pub struct PeriodicFlush {
    cancel_token: CancellationToken,
}

impl PeriodicFlush {
    /// Returns `None` when `period` is zero: time-based flushing is disabled.
    pub fn start<F>(runtime: &Handle, period: Duration, tick: F) -> Option<Self>
    where
        F: Fn() -> bool + Send + 'static,
    {
        if period.is_zero() {
            return None;
        }

        let cancel_token = CancellationToken::new();
        let cancelled = cancel_token.clone();
        runtime.spawn(async move {
            let mut flush_interval = interval(period);
            flush_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            flush_interval.tick().await; // discard first tick

            loop {
                tokio::select! {
                    () = cancelled.cancelled() => break,
                    _ = flush_interval.tick() => {
                        if !tick() {
                            break;
                        }
                    }
                }
            }
            debug!("HEC | Periodic flush stopped");
        });

        Some(Self { cancel_token })
    }

    /// Stops future ticks. A tick already running is not interrupted.
    pub fn stop(&self) {
        self.cancel_token.cancel();
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}

impl Drop for PeriodicFlush {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}
