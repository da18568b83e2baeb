// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Poll period of the blocking and async idle waits.
pub const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Counts dispatched sends that have not completed yet.
#[derive(Debug, Clone, Default)]
pub struct OutstandingWork {
    count: Arc<AtomicUsize>,
}

/// Marks one unit of work in flight until dropped.
#[derive(Debug)]
#[must_use = "the work is considered finished as soon as the guard is dropped"]
pub struct WorkGuard {
    count: Arc<AtomicUsize>,
}

impl Drop for WorkGuard {
    fn drop(&mut self) {
        self.count.fetch_sub(1, Ordering::AcqRel);
    }
}

impl OutstandingWork {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&self) -> WorkGuard {
        self.count.fetch_add(1, Ordering::AcqRel);
        WorkGuard {
            count: Arc::clone(&self.count),
        }
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    /// Blocks the calling thread until no work is in flight.
    ///
    /// Must not be called from a task on a current-thread runtime that also
    /// drives the sends, or it will never return.
    pub fn wait_idle_blocking(&self) {
        while self.count() > 0 {
            std::thread::sleep(IDLE_POLL_INTERVAL);
        }
    }

    pub async fn wait_idle(&self) {
        while self.count() > 0 {
            tokio::time::sleep(IDLE_POLL_INTERVAL).await;
        }
    }
}
