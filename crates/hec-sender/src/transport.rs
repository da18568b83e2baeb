// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Transport seam and middleware chain.
//!
//! A [`Handler`] posts one serialized batch. A [`Middleware`] wraps the next
//! handler and may inspect or alter the call and its result. [`chain`]
//! composes middlewares around a base handler, innermost-last:
//!
//! ```text
//!   retry ──> user middleware ──> ... ──> HttpTransport ──> collector
//! ```

use crate::error::TransportError;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{StatusCode, Url};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::debug;

/// Scheme prefix of the authorization header.
pub const AUTHORIZATION_SCHEME: &str = "Splunk";
pub const CHANNEL_HEADER: &str = "X-Splunk-Request-Channel";
pub const CONTENT_TYPE_JSON: &str = "application/json; charset=utf-8";

/// What came back from the collector.
#[derive(Debug, Clone)]
pub struct Reply {
    pub status: StatusCode,
    pub headers: HeaderMap,
    /// Response body. Only read for non-success responses.
    pub body: String,
}

impl Reply {
    /// The collector accepts a batch with `200 OK` only.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == StatusCode::OK
    }
}

pub type HandlerResult = Result<Reply, TransportError>;

/// Posts a batch with the given token.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn post(&self, token: &str, events: Bytes) -> HandlerResult;
}

/// Wraps the next link of the chain.
#[async_trait]
pub trait Middleware: Send + Sync {
    async fn handle(&self, token: &str, events: Bytes, next: &dyn Handler) -> HandlerResult;
}

struct Link {
    middleware: Arc<dyn Middleware>,
    next: Arc<dyn Handler>,
}

#[async_trait]
impl Handler for Link {
    async fn post(&self, token: &str, events: Bytes) -> HandlerResult {
        self.middleware
            .handle(token, events, self.next.as_ref())
            .await
    }
}

/// Builds the handler chain. The first middleware is the outermost.
#[must_use]
pub fn chain(middlewares: &[Arc<dyn Middleware>], base: Arc<dyn Handler>) -> Arc<dyn Handler> {
    middlewares.iter().rev().fold(base, |next, middleware| {
        Arc::new(Link {
            middleware: Arc::clone(middleware),
            next,
        }) as Arc<dyn Handler>
    })
}

/// The innermost link: one HTTP POST per call.
pub struct HttpTransport {
    client: reqwest::Client,
    url: Url,
    channel: Option<HeaderValue>,
    permits: Option<Arc<Semaphore>>,
}

impl HttpTransport {
    /// `max_concurrent` caps in-flight requests; 0 leaves them uncapped.
    pub fn new(
        client: reqwest::Client,
        url: Url,
        channel: Option<&str>,
        max_concurrent: usize,
    ) -> Result<Self, TransportError> {
        let channel = channel
            .map(|c| {
                HeaderValue::from_str(c)
                    .map_err(|e| TransportError::Custom(format!("invalid channel header: {e}")))
            })
            .transpose()?;
        Ok(Self {
            client,
            url,
            channel,
            permits: (max_concurrent > 0).then(|| Arc::new(Semaphore::new(max_concurrent))),
        })
    }

    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    fn headers(&self, token: &str) -> Result<HeaderMap, TransportError> {
        let mut headers = HeaderMap::new();
        let authorization = HeaderValue::from_str(&format!("{AUTHORIZATION_SCHEME} {token}"))
            .map_err(|e| TransportError::Custom(format!("invalid token: {e}")))?;
        headers.insert(AUTHORIZATION, authorization);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(CONTENT_TYPE_JSON));
        if let Some(channel) = &self.channel {
            headers.insert(CHANNEL_HEADER, channel.clone());
        }
        Ok(headers)
    }
}

#[async_trait]
impl Handler for HttpTransport {
    async fn post(&self, token: &str, events: Bytes) -> HandlerResult {
        let _permit = match &self.permits {
            Some(permits) => Some(
                permits
                    .acquire()
                    .await
                    .map_err(|e| TransportError::Custom(e.to_string()))?,
            ),
            None => None,
        };

        let len = events.len();
        let response = self
            .client
            .post(self.url.clone())
            .headers(self.headers(token)?)
            .body(events)
            .send()
            .await?;

        let status = response.status();
        let headers = response.headers().clone();
        debug!("HEC | Posted {len} bytes, collector replied {status}");

        // Don't read response body unless needed
        let body = if status == StatusCode::OK {
            String::new()
        } else {
            response.text().await.unwrap_or_default()
        };

        Ok(Reply {
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Records every call and answers with a fixed status.
    pub(crate) struct RecordingHandler {
        pub status: StatusCode,
        pub calls: Mutex<Vec<(String, Bytes)>>,
    }

    impl RecordingHandler {
        pub(crate) fn new(status: StatusCode) -> Self {
            Self {
                status,
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Handler for RecordingHandler {
        async fn post(&self, token: &str, events: Bytes) -> HandlerResult {
            self.calls.lock().unwrap().push((token.to_string(), events));
            Ok(Reply {
                status: self.status,
                headers: HeaderMap::new(),
                body: String::new(),
            })
        }
    }

    struct Tag(&'static str);

    #[async_trait]
    impl Middleware for Tag {
        async fn handle(&self, token: &str, events: Bytes, next: &dyn Handler) -> HandlerResult {
            let mut tagged = events.to_vec();
            tagged.extend_from_slice(self.0.as_bytes());
            next.post(token, Bytes::from(tagged)).await
        }
    }

    struct RewriteToken;

    #[async_trait]
    impl Middleware for RewriteToken {
        async fn handle(&self, token: &str, events: Bytes, next: &dyn Handler) -> HandlerResult {
            next.post(&format!("{token}-rewritten"), events).await
        }
    }

    #[tokio::test]
    async fn test_chain_without_middleware_calls_base() {
        let base = Arc::new(RecordingHandler::new(StatusCode::OK));
        let handler = chain(&[], base.clone());

        let reply = handler.post("token", Bytes::from_static(b"{}")).await.unwrap();

        assert!(reply.is_success());
        assert_eq!(base.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_chain_runs_outermost_first() {
        let base = Arc::new(RecordingHandler::new(StatusCode::OK));
        let middlewares: Vec<Arc<dyn Middleware>> =
            vec![Arc::new(Tag("a")), Arc::new(Tag("b")), Arc::new(RewriteToken)];
        let handler = chain(&middlewares, base.clone());

        handler.post("token", Bytes::from_static(b"x")).await.unwrap();

        let calls = base.calls.lock().unwrap();
        assert_eq!(calls[0].0, "token-rewritten");
        assert_eq!(calls[0].1, Bytes::from_static(b"xab"));
    }

    #[test]
    fn test_headers_carry_scheme_and_channel() {
        let transport = HttpTransport::new(
            reqwest::Client::new(),
            Url::parse("http://localhost:8088/services/collector/event/1.0").unwrap(),
            Some("b1e3c1c8-1f2b-4a8e-9d53-2c9f0e0e1a11"),
            0,
        )
        .unwrap();

        let headers = transport.headers("abc").unwrap();
        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "Splunk abc");
        assert_eq!(headers.get(CONTENT_TYPE).unwrap(), CONTENT_TYPE_JSON);
        assert_eq!(
            headers.get(CHANNEL_HEADER).unwrap(),
            "b1e3c1c8-1f2b-4a8e-9d53-2c9f0e0e1a11"
        );
    }

    #[test]
    fn test_invalid_channel_is_rejected() {
        let result = HttpTransport::new(
            reqwest::Client::new(),
            Url::parse("http://localhost:8088/").unwrap(),
            Some("bad\nchannel"),
            0,
        );
        assert!(result.is_err());
    }
}
