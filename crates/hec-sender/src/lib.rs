// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! # HEC Sender
//!
//! Batching, non-blocking delivery of structured log records to an HTTP
//! Event Collector.
//!
//! Records are serialized into a shared buffer and flushed when a size or
//! count threshold is reached, or when the periodic trigger fires. Flushed
//! batches are posted off the caller's thread, either in parallel or strictly
//! in drain order, through a middleware chain that includes bounded retries.
//! Delivery failures are reported to subscribers, never returned to `send`.
//!
//! ```rust,ignore
//! use hec_sender::{BatchSettings, HecSender, Record, SenderConfig};
//!
//! let mut config = SenderConfig::new("https://splunk.example.com:8088", token);
//! config.batch = BatchSettings::recommended();
//! config.retries_on_error = 2;
//!
//! let sender = HecSender::new(config)?;
//! sender.on_error(|failure: &hec_sender::DeliveryFailure| eprintln!("{failure}"));
//! sender.send(Record::now().with_level("Info").with_rendered_message("started"))?;
//! sender.shutdown().await;
//! ```

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

/// Batch buffer: append, threshold check and atomic drain
pub mod buffer;

/// Sender configuration, batch thresholds and environment loading
pub mod config;

/// Parallel and sequential delivery of drained batches
pub mod dispatcher;

/// Configuration, send and delivery error types
pub mod error;

/// HTTP client construction: TLS override, proxy, pooling
pub mod http;

/// Bounded per-partition metadata cache
pub mod metadata;

/// Counter of in-flight sends
pub mod outstanding;

/// Record model and timestamp formatting
pub mod record;

/// Delivery failure subscribers
pub mod reporter;

/// Immediate bounded retry middleware
pub mod retry;

/// Public engine facade
pub mod sender;

/// JSON event envelope
pub mod serializer;

/// Handler and middleware traits, base HTTP transport
pub mod transport;

/// Periodic flush trigger
pub mod trigger;

pub use config::{BatchSettings, ProxyConfig, SendMode, SenderConfig};
pub use error::{ConfigError, DeliveryFailure, SendError, TransportError};
pub use record::{ExceptionInfo, Metadata, Properties, Record, Value};
pub use sender::HecSender;
pub use transport::{Handler, HandlerResult, Middleware, Reply};
