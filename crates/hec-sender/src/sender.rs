// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The public engine.
//!
//! ```text
//!   send ─> prepare ─> [buffer lock: append, check, drain] ─> dispatcher ─> chain
//!                                                   ^
//!   periodic trigger ─────> flush ──────────────────┘
//! ```
//!
//! `send` never waits on the network. Delivery failures surface only through
//! [`HecSender::on_error`] and [`HecSender::subscribe`].

use crate::buffer::BatchBuffer;
use crate::config::SenderConfig;
use crate::dispatcher::Dispatcher;
use crate::error::{ConfigError, DeliveryFailure, SendError};
use crate::http::get_client;
use crate::metadata::MetadataCache;
use crate::outstanding::OutstandingWork;
use crate::record::{Metadata, Record};
use crate::reporter::{ErrorReporter, FailureObserver};
use crate::retry::RetryMiddleware;
use crate::serializer::EventSerializer;
use crate::transport::{chain, Handler, HttpTransport, Middleware};
use crate::trigger::PeriodicFlush;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::sync::mpsc;
use tracing::debug;

pub struct HecSender {
    inner: Arc<Inner>,
}

struct Inner {
    serializer: EventSerializer,
    buffer: BatchBuffer,
    dispatcher: Dispatcher,
    outstanding: OutstandingWork,
    reporter: Arc<ErrorReporter>,
    metadata: MetadataCache,
    trigger: Mutex<Option<PeriodicFlush>>,
    closed: AtomicBool,
}

impl Inner {
    fn flush(&self) {
        let mut buffer = self.buffer.lock();
        if let Some(batch) = buffer.drain() {
            debug!(
                "HEC | Flushing batch #{} with {} events",
                batch.sequence, batch.events
            );
            self.dispatcher.dispatch(batch);
        }
    }

    fn stop_trigger(&self) {
        let trigger = self
            .trigger
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(trigger) = trigger {
            trigger.stop();
        }
    }
}

impl HecSender {
    /// Builds a sender running its deliveries on the current tokio runtime.
    pub fn new(config: SenderConfig) -> Result<Self, ConfigError> {
        let runtime = Handle::try_current().map_err(|_| ConfigError::NoRuntime)?;
        Self::with_handle(config, runtime)
    }

    /// Builds a sender posting over HTTP, with deliveries spawned on `runtime`.
    pub fn with_handle(config: SenderConfig, runtime: Handle) -> Result<Self, ConfigError> {
        let url = config.validate()?;
        let client = get_client(&config).map_err(|e| ConfigError::HttpClient(e.to_string()))?;
        let transport = HttpTransport::new(
            client,
            url,
            config.channel.as_deref(),
            config.max_connections_per_server,
        )
        .map_err(|e| ConfigError::InvalidValue {
            name: "channel",
            value: e.to_string(),
        })?;
        debug!("HEC | Posting events to {}", transport.url());
        Ok(Self::with_transport(config, runtime, Arc::new(transport)))
    }

    /// Builds a sender around any base handler. Retry and the configured
    /// middlewares are still layered on top of it.
    #[must_use]
    pub fn with_transport(config: SenderConfig, runtime: Handle, base: Arc<dyn Handler>) -> Self {
        let mut middlewares: Vec<Arc<dyn Middleware>> =
            vec![Arc::new(RetryMiddleware::new(config.retries_on_error))];
        middlewares.extend(config.middlewares.iter().cloned());
        let handler = chain(&middlewares, base);

        let outstanding = OutstandingWork::new();
        let reporter = Arc::new(ErrorReporter::new());
        let dispatcher = Dispatcher::new(
            config.send_mode,
            runtime.clone(),
            &config.token,
            handler,
            outstanding.clone(),
            Arc::clone(&reporter),
        );

        let limits = config.batch.resolve();
        debug!(
            "HEC | Sender started: mode {:?}, interval {:?}, max {} bytes / {} events, {} retries",
            config.send_mode,
            config.batch.interval,
            limits.max_bytes,
            limits.max_count,
            config.retries_on_error
        );

        let inner = Arc::new(Inner {
            metadata: MetadataCache::new(&config.default_metadata),
            serializer: EventSerializer::new(config.default_metadata, config.formatter),
            buffer: BatchBuffer::new(limits),
            dispatcher,
            outstanding,
            reporter,
            trigger: Mutex::new(None),
            closed: AtomicBool::new(false),
        });

        let weak = Arc::downgrade(&inner);
        let trigger = PeriodicFlush::start(&runtime, config.batch.interval, move || {
            match weak.upgrade() {
                Some(inner) => {
                    inner.flush();
                    true
                }
                None => false,
            }
        });
        *inner.trigger.lock().unwrap_or_else(PoisonError::into_inner) = trigger;

        Self { inner }
    }

    /// Buffers `record`, flushing when a size or count threshold is reached.
    ///
    /// Fails only for local errors. On a serialization error the buffer is
    /// left as it was before the call.
    pub fn send(&self, record: Record) -> Result<(), SendError> {
        if self.is_closed() {
            return Err(SendError::Closed);
        }
        let prepared = self
            .inner
            .serializer
            .prepare(record)
            .map_err(SendError::InvalidRecord)?;

        let mut buffer = self.inner.buffer.lock();
        // Checked again under the lock so close never strands a record
        if self.is_closed() {
            return Err(SendError::Closed);
        }
        buffer.append(&self.inner.serializer, &prepared)?;
        if buffer.should_flush() {
            if let Some(batch) = buffer.drain() {
                self.inner.dispatcher.dispatch(batch);
            }
        }
        Ok(())
    }

    /// Dispatches whatever is buffered without waiting for delivery.
    pub fn flush(&self) {
        self.inner.flush();
    }

    /// Flushes, then blocks the calling thread until every dispatched send
    /// has completed.
    ///
    /// On a current-thread runtime that also drives the deliveries this never
    /// returns; use [`HecSender::flush_and_wait`] from async code.
    pub fn flush_sync(&self) {
        self.flush();
        match Handle::try_current() {
            Ok(current) if current.runtime_flavor() == RuntimeFlavor::MultiThread => {
                tokio::task::block_in_place(|| self.inner.outstanding.wait_idle_blocking());
            }
            _ => self.inner.outstanding.wait_idle_blocking(),
        }
    }

    /// Flushes, then waits until every dispatched send has completed.
    pub async fn flush_and_wait(&self) {
        self.flush();
        self.inner.outstanding.wait_idle().await;
    }

    /// Stops the periodic trigger, dispatches what is buffered, releases the
    /// transport and drops every failure subscriber.
    ///
    /// Sends already in flight are not cancelled. Later calls do nothing.
    pub fn close(&self) {
        {
            let mut buffer = self.inner.buffer.lock();
            if self.inner.closed.swap(true, Ordering::AcqRel) {
                return;
            }
            if let Some(batch) = buffer.drain() {
                self.inner.dispatcher.dispatch(batch);
            }
        }
        self.inner.stop_trigger();
        self.inner.dispatcher.release_transport();
        self.inner.reporter.clear();
        debug!("HEC | Sender closed");
    }

    /// Flushes, waits for every send to complete, then closes.
    ///
    /// Failures of the final batches still reach the subscribers.
    pub async fn shutdown(&self) {
        self.inner.stop_trigger();
        self.flush_and_wait().await;
        self.close();
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Registers an observer called on the task that saw the failure.
    pub fn on_error<O>(&self, observer: O)
    where
        O: FailureObserver + 'static,
    {
        self.inner.reporter.add_observer(Arc::new(observer));
    }

    /// Opens a channel receiving every later delivery failure. The channel
    /// closes when the sender does.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<Arc<DeliveryFailure>> {
        self.inner.reporter.subscribe()
    }

    /// Cached metadata for a partition key such as a logger name.
    pub fn metadata_for(&self, key: &str) -> Arc<Metadata> {
        self.inner.metadata.get(key)
    }

    /// Number of dispatched sends not yet completed.
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.inner.outstanding.count()
    }

    /// Number of records buffered and not yet dispatched.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.inner.buffer.lock().len()
    }
}

impl Drop for HecSender {
    fn drop(&mut self) {
        self.close();
    }
}
