// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Hands drained batches to the transport off the caller's thread.
//!
//! In [`SendMode::Parallel`] every batch is an independent task. In
//! [`SendMode::Sequential`] each task first awaits the task spawned before it,
//! so the transport sees batches in the order `dispatch` was called:
//!
//! ```text
//!   dispatch(B1) ──> task1: post(B1)
//!   dispatch(B2) ──> task2: await task1, post(B2)
//!   dispatch(B3) ──> task3: await task2, post(B3)
//! ```

use crate::buffer::Batch;
use crate::config::SendMode;
use crate::error::DeliveryFailure;
use crate::outstanding::{OutstandingWork, WorkGuard};
use crate::reporter::ErrorReporter;
use crate::transport::Handler;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub struct Dispatcher {
    mode: SendMode,
    runtime: Handle,
    token: Arc<str>,
    transport: Mutex<Option<Arc<dyn Handler>>>,
    /// Most recently spawned send, awaited by the next one.
    tail: Mutex<Option<JoinHandle<()>>>,
    outstanding: OutstandingWork,
    reporter: Arc<ErrorReporter>,
}

impl Dispatcher {
    #[must_use]
    pub fn new(
        mode: SendMode,
        runtime: Handle,
        token: &str,
        transport: Arc<dyn Handler>,
        outstanding: OutstandingWork,
        reporter: Arc<ErrorReporter>,
    ) -> Self {
        Self {
            mode,
            runtime,
            token: Arc::from(token),
            transport: Mutex::new(Some(transport)),
            tail: Mutex::new(None),
            outstanding,
            reporter,
        }
    }

    #[must_use]
    pub fn mode(&self) -> SendMode {
        self.mode
    }

    /// Schedules delivery of `batch` and returns immediately.
    ///
    /// In sequential mode the caller must serialize calls to keep drain order
    /// equal to delivery order.
    pub fn dispatch(&self, batch: Batch) {
        let transport = self
            .transport
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let Some(transport) = transport else {
            warn!(
                "HEC | Dropping batch #{} of {} events: transport released",
                batch.sequence, batch.events
            );
            return;
        };

        let work = self.outstanding.begin();
        let token = Arc::clone(&self.token);
        let reporter = Arc::clone(&self.reporter);

        match self.mode {
            SendMode::Parallel => {
                self.runtime
                    .spawn(deliver(transport, token, batch, reporter, work));
            }
            SendMode::Sequential => {
                let mut tail = self.tail.lock().unwrap_or_else(PoisonError::into_inner);
                let previous = tail.take();
                *tail = Some(self.runtime.spawn(async move {
                    if let Some(previous) = previous {
                        // A failed or panicked predecessor still releases its successor
                        let _ = previous.await;
                    }
                    deliver(transport, token, batch, reporter, work).await;
                }));
            }
        }
    }

    /// Releases the transport. Sends already scheduled keep their own handle
    /// and run to completion; later dispatches are dropped.
    pub fn release_transport(&self) {
        self.transport
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

async fn deliver(
    transport: Arc<dyn Handler>,
    token: Arc<str>,
    batch: Batch,
    reporter: Arc<ErrorReporter>,
    _work: WorkGuard,
) {
    let events = batch.payload.clone();
    match transport.post(&token, batch.payload).await {
        Ok(reply) if reply.is_success() => {
            debug!(
                "HEC | Delivered batch #{} ({} events, {} bytes)",
                batch.sequence,
                batch.events,
                events.len()
            );
        }
        result => reporter.report(DeliveryFailure::from_result(result, events)),
    }
}
