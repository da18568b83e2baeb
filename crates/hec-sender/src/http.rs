// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! HTTP client construction.
//!
//! TLS validation and proxy routing are applied here, once, to the client
//! owned by a single sender. Nothing is registered process-wide.

use crate::config::{ProxyConfig, SenderConfig};
use core::time::Duration;
use std::error::Error;
use tracing::{debug, error};

/// Builds the sender's HTTP client.
///
/// An unusable proxy configuration is logged and the client falls back to a
/// direct connection.
pub fn get_client(config: &SenderConfig) -> Result<reqwest::Client, Box<dyn Error>> {
    match build_client(config, true) {
        Ok(client) => Ok(client),
        Err(e) => {
            error!(
                "HEC | Unable to parse proxy configuration: {}, falling back to direct connection",
                e
            );
            build_client(config, false)
        }
    }
}

fn build_client(config: &SenderConfig, allow_proxy: bool) -> Result<reqwest::Client, Box<dyn Error>> {
    let mut client = reqwest::Client::builder()
        .use_rustls_tls()
        .timeout(config.timeout)
        .pool_idle_timeout(Some(Duration::from_secs(270)))
        // Detect dead connections
        .tcp_keepalive(Some(Duration::from_secs(120)));

    if config.max_connections_per_server > 0 {
        client = client.pool_max_idle_per_host(config.max_connections_per_server);
    }

    if config.ignore_tls_errors {
        debug!("HEC | TLS certificate validation disabled for this sender");
        client = client.danger_accept_invalid_certs(true);
    }

    client = if allow_proxy {
        apply_proxy(client, &config.proxy)?
    } else {
        client.no_proxy()
    };

    Ok(client.build()?)
}

fn apply_proxy(
    client: reqwest::ClientBuilder,
    proxy: &ProxyConfig,
) -> Result<reqwest::ClientBuilder, Box<dyn Error>> {
    if !proxy.use_proxy {
        return Ok(client.no_proxy());
    }
    if proxy.url.trim().is_empty() {
        // System proxy settings apply
        return Ok(client);
    }

    let mut route = reqwest::Proxy::all(proxy.url.trim())?;
    if !proxy.user.is_empty() {
        route = route.basic_auth(&proxy.user, &proxy.password);
    }
    Ok(client.proxy(route))
}
