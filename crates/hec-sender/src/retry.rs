// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::transport::{Handler, HandlerResult, Middleware};
use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

/// Resends a failed batch immediately, up to `max_retries` extra times.
///
/// A network error or a non-2xx reply counts as a failure. The payload is
/// never altered between attempts, and the last result is returned as is.
#[derive(Debug, Clone, Copy)]
pub struct RetryMiddleware {
    max_retries: u32,
}

impl RetryMiddleware {
    #[must_use]
    pub fn new(max_retries: u32) -> Self {
        Self { max_retries }
    }

    #[must_use]
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }
}

#[async_trait]
impl Middleware for RetryMiddleware {
    async fn handle(&self, token: &str, events: Bytes, next: &dyn Handler) -> HandlerResult {
        let mut attempts = 0;
        loop {
            attempts += 1;
            let result = next.post(token, events.clone()).await;
            let failed = match &result {
                Ok(reply) => !reply.is_success(),
                Err(_) => true,
            };
            if !failed || attempts > self.max_retries {
                if failed && self.max_retries > 0 {
                    debug!("HEC | Giving up after {attempts} attempts");
                }
                return result;
            }
            match &result {
                Ok(reply) => debug!("HEC | Attempt {attempts} rejected with {}, retrying", reply.status),
                Err(e) => debug!("HEC | Attempt {attempts} failed: {e}, retrying"),
            }
        }
    }
}
