// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::transport::Reply;
use bytes::Bytes;
use reqwest::StatusCode;
use std::fmt;

/// Errors raised while building a sender from its configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid endpoint URL '{url}': {reason}")]
    InvalidEndpoint { url: String, reason: String },

    #[error("HEC token is not set")]
    MissingToken,

    #[error("Invalid value '{value}' for {name}")]
    InvalidValue { name: &'static str, value: String },

    #[error("No tokio runtime available to run background deliveries")]
    NoRuntime,

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(String),
}

/// Errors surfaced synchronously to the caller of `send`.
///
/// Delivery failures are never reported here; they go to the error reporter.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("Sender is closed")]
    Closed,

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Failed to serialize record: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Failure of a single transport attempt.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("{0}")]
    Custom(String),
}

/// An unrecoverable delivery failure, handed to every error observer.
#[derive(Debug)]
pub struct DeliveryFailure {
    /// Response status, `None` when no response was received.
    pub status: Option<StatusCode>,
    /// Transport-level cause, if the request never produced a response.
    pub cause: Option<TransportError>,
    /// Body the collector replied with.
    pub reply: Option<String>,
    pub response: Option<Reply>,
    /// The exact serialized payload that failed.
    pub events: Bytes,
}

impl DeliveryFailure {
    pub(crate) fn from_result(result: Result<Reply, TransportError>, events: Bytes) -> Self {
        match result {
            Ok(reply) => Self {
                status: Some(reply.status),
                cause: None,
                reply: (!reply.body.is_empty()).then(|| reply.body.clone()),
                response: Some(reply),
                events,
            },
            Err(cause) => Self {
                status: match &cause {
                    TransportError::Network(e) => e.status(),
                    TransportError::Custom(_) => None,
                },
                cause: Some(cause),
                reply: None,
                response: None,
                events,
            },
        }
    }

    /// The failed payload as text.
    #[must_use]
    pub fn events_lossy(&self) -> String {
        String::from_utf8_lossy(&self.events).into_owned()
    }
}

impl fmt::Display for DeliveryFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.status, &self.reply, &self.cause) {
            (Some(status), Some(reply), _) => {
                write!(f, "Failed to send request: {status} - {reply}")
            }
            (Some(status), None, _) => write!(f, "Failed to send request: {status}"),
            (None, _, Some(cause)) => write!(f, "Failed to send request: {cause}"),
            (None, _, None) => write!(f, "Failed to send request"),
        }
    }
}

impl std::error::Error for DeliveryFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_ref()
            .map(|cause| cause as &(dyn std::error::Error + 'static))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderMap;

    #[test]
    fn test_delivery_failure_from_rejection() {
        let reply = Reply {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            headers: HeaderMap::new(),
            body: "Server is busy".to_string(),
        };
        let failure = DeliveryFailure::from_result(Ok(reply), Bytes::from_static(b"{}"));

        assert_eq!(failure.status, Some(StatusCode::INTERNAL_SERVER_ERROR));
        assert_eq!(failure.reply.as_deref(), Some("Server is busy"));
        assert!(failure.cause.is_none());
        assert_eq!(failure.events_lossy(), "{}");
        assert_eq!(
            failure.to_string(),
            "Failed to send request: 500 Internal Server Error - Server is busy"
        );
    }

    #[test]
    fn test_delivery_failure_from_transport_error() {
        let failure = DeliveryFailure::from_result(
            Err(TransportError::Custom("connection refused".to_string())),
            Bytes::new(),
        );

        assert!(failure.status.is_none());
        assert!(failure.response.is_none());
        assert!(std::error::Error::source(&failure).is_some());
        assert_eq!(failure.to_string(), "Failed to send request: connection refused");
    }

    #[test]
    fn test_error_display() {
        assert_eq!(SendError::Closed.to_string(), "Sender is closed");
        assert_eq!(ConfigError::MissingToken.to_string(), "HEC token is not set");
    }
}
