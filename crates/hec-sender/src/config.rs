// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Sender configuration.
//!
//! Values are supplied by the host collaborator; [`SenderConfig::from_env`]
//! is a convenience loader for binaries that configure through `HEC_*`
//! environment variables.

use crate::error::ConfigError;
use crate::record::Metadata;
use crate::serializer::EventFormatter;
use crate::transport::Middleware;
use reqwest::Url;
use std::env;
use std::fmt::{self, Debug};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Fixed collector path appended to the configured endpoint.
pub const HEC_EVENT_PATH: &str = "/services/collector/event/1.0";

/// Recommended flush interval when batching is wanted.
pub const DEFAULT_BATCH_INTERVAL: Duration = Duration::from_secs(10);
/// Recommended byte threshold when batching is wanted.
pub const DEFAULT_BATCH_SIZE_BYTES: usize = 10 * 1024;
/// Recommended event count threshold when batching is wanted.
pub const DEFAULT_BATCH_SIZE_COUNT: usize = 10;

/// Interval used by [`SenderConfig::from_env`] when a size or count
/// threshold is set without an explicit interval.
pub const ENV_FALLBACK_BATCH_INTERVAL: Duration = Duration::from_millis(250);

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_MAX_CONNECTIONS_PER_SERVER: usize = 10;

/// Delivery discipline for drained batches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SendMode {
    /// Every batch is an independent request; arrival order is not kept.
    Parallel,
    /// Each batch is sent only after the previous one finished.
    #[default]
    Sequential,
}

impl FromStr for SendMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "parallel" => Ok(SendMode::Parallel),
            "sequential" => Ok(SendMode::Sequential),
            _ => Err(ConfigError::InvalidValue {
                name: "send mode",
                value: s.to_string(),
            }),
        }
    }
}

/// Proxy routing for the transport.
#[derive(Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    /// `false` disables every proxy, including system-wide ones.
    pub use_proxy: bool,
    /// Explicit proxy URL. Empty means the system proxy is used.
    pub url: String,
    pub user: String,
    pub password: String,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            use_proxy: true,
            url: String::new(),
            user: String::new(),
            password: String::new(),
        }
    }
}

impl ProxyConfig {
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            use_proxy: false,
            ..Default::default()
        }
    }
}

impl Debug for ProxyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyConfig")
            .field("use_proxy", &self.use_proxy)
            .field("url", &self.url)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Batching thresholds as configured. Zero disables a dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchSettings {
    pub interval: Duration,
    pub max_bytes: usize,
    pub max_count: usize,
}

impl BatchSettings {
    #[must_use]
    pub fn recommended() -> Self {
        Self {
            interval: DEFAULT_BATCH_INTERVAL,
            max_bytes: DEFAULT_BATCH_SIZE_BYTES,
            max_count: DEFAULT_BATCH_SIZE_COUNT,
        }
    }

    /// Computes the effective size and count limits.
    ///
    /// A timer without thresholds makes both unbounded. A single configured
    /// threshold makes the other one unbounded. With nothing configured both
    /// limits stay zero and every append flushes.
    #[must_use]
    pub fn resolve(&self) -> BatchLimits {
        let mut max_bytes = self.max_bytes;
        let mut max_count = self.max_count;

        if !self.interval.is_zero() && max_bytes == 0 && max_count == 0 {
            max_bytes = usize::MAX;
            max_count = usize::MAX;
        }

        if max_count == 0 && max_bytes > 0 {
            max_count = usize::MAX;
        } else if max_bytes == 0 && max_count > 0 {
            max_bytes = usize::MAX;
        }

        BatchLimits {
            max_bytes,
            max_count,
        }
    }

    #[must_use]
    pub fn is_batching(&self) -> bool {
        self.max_bytes > 0 || self.max_count > 0
    }
}

/// Effective flush limits. `usize::MAX` means unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchLimits {
    pub max_bytes: usize,
    pub max_count: usize,
}

impl BatchLimits {
    #[must_use]
    pub fn is_reached(&self, count: usize, bytes: usize) -> bool {
        count >= self.max_count || bytes >= self.max_bytes
    }
}

/// Everything the sender needs, resolved once at construction.
#[derive(Clone)]
pub struct SenderConfig {
    /// Base collector URL, e.g. `https://splunk.example.com:8088`.
    pub endpoint: String,
    pub token: String,
    /// Value of the `X-Splunk-Request-Channel` header.
    pub channel: Option<String>,
    pub send_mode: SendMode,
    pub batch: BatchSettings,
    pub retries_on_error: u32,
    /// Accept invalid TLS certificates. Scoped to this sender's client.
    pub ignore_tls_errors: bool,
    pub proxy: ProxyConfig,
    /// Caps concurrent requests and idle pooled connections. Defaults to 10,
    /// 0 = no cap.
    pub max_connections_per_server: usize,
    pub timeout: Duration,
    /// Metadata for records that carry none.
    pub default_metadata: Metadata,
    pub formatter: Option<EventFormatter>,
    /// Run inside the retry middleware, first entry outermost.
    pub middlewares: Vec<Arc<dyn Middleware>>,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            token: String::new(),
            channel: None,
            send_mode: SendMode::default(),
            batch: BatchSettings::default(),
            retries_on_error: 0,
            ignore_tls_errors: false,
            proxy: ProxyConfig::default(),
            max_connections_per_server: DEFAULT_MAX_CONNECTIONS_PER_SERVER,
            timeout: DEFAULT_TIMEOUT,
            default_metadata: Metadata::default(),
            formatter: None,
            middlewares: Vec::new(),
        }
    }
}

impl Debug for SenderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SenderConfig")
            .field("endpoint", &self.endpoint)
            .field("token", &"<redacted>")
            .field("channel", &self.channel)
            .field("send_mode", &self.send_mode)
            .field("batch", &self.batch)
            .field("retries_on_error", &self.retries_on_error)
            .field("ignore_tls_errors", &self.ignore_tls_errors)
            .field("proxy", &self.proxy)
            .field("max_connections_per_server", &self.max_connections_per_server)
            .field("timeout", &self.timeout)
            .field("default_metadata", &self.default_metadata)
            .field("formatter", &self.formatter.is_some())
            .field("middlewares", &self.middlewares.len())
            .finish()
    }
}

impl SenderConfig {
    #[must_use]
    pub fn new(endpoint: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            token: token.into(),
            ..Default::default()
        }
    }

    /// Checks required values and returns the full collector URL.
    pub fn validate(&self) -> Result<Url, ConfigError> {
        if self.token.trim().is_empty() {
            return Err(ConfigError::MissingToken);
        }
        event_url(&self.endpoint)
    }

    /// Loads configuration from `HEC_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let endpoint = env::var("HEC_URL").unwrap_or_default();
        let token = env::var("HEC_TOKEN").unwrap_or_default();
        let channel = non_empty_var("HEC_CHANNEL");

        let send_mode = match non_empty_var("HEC_SEND_MODE") {
            Some(mode) => mode.parse()?,
            None => SendMode::Sequential,
        };

        let max_bytes = parse_var::<usize>("HEC_BATCH_SIZE_BYTES")?.unwrap_or(0);
        let max_count = parse_var::<usize>("HEC_BATCH_SIZE_COUNT")?.unwrap_or(0);
        let interval = match parse_var::<u64>("HEC_BATCH_INTERVAL_MS")? {
            Some(ms) => Duration::from_millis(ms),
            None if max_bytes == 0 && max_count == 0 => Duration::ZERO,
            None => ENV_FALLBACK_BATCH_INTERVAL,
        };

        let proxy = if parse_bool_var("HEC_USE_PROXY")?.unwrap_or(true) {
            ProxyConfig {
                use_proxy: true,
                url: env::var("HEC_PROXY_URL").unwrap_or_default(),
                user: env::var("HEC_PROXY_USER").unwrap_or_default(),
                password: env::var("HEC_PROXY_PASSWORD").unwrap_or_default(),
            }
        } else {
            ProxyConfig::disabled()
        };

        let config = Self {
            endpoint,
            token,
            channel,
            send_mode,
            batch: BatchSettings {
                interval,
                max_bytes,
                max_count,
            },
            retries_on_error: parse_var::<u32>("HEC_RETRIES_ON_ERROR")?.unwrap_or(0),
            ignore_tls_errors: parse_bool_var("HEC_IGNORE_SSL_ERRORS")?.unwrap_or(false),
            proxy,
            max_connections_per_server: parse_var::<usize>("HEC_MAX_CONNECTIONS_PER_SERVER")?
                .unwrap_or(DEFAULT_MAX_CONNECTIONS_PER_SERVER),
            timeout: parse_var::<u64>("HEC_TIMEOUT_SECS")?
                .map_or(DEFAULT_TIMEOUT, Duration::from_secs),
            default_metadata: Metadata::new(
                non_empty_var("HEC_INDEX"),
                None,
                non_empty_var("HEC_SOURCETYPE"),
                None,
            ),
            formatter: None,
            middlewares: Vec::new(),
        };

        config.validate()?;
        Ok(config)
    }
}

/// Joins the fixed collector path onto `endpoint`.
pub fn event_url(endpoint: &str) -> Result<Url, ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidEndpoint {
        url: endpoint.to_string(),
        reason: reason.to_string(),
    };

    let base = Url::parse(endpoint.trim()).map_err(|e| invalid(&e.to_string()))?;
    if base.scheme() != "http" && base.scheme() != "https" {
        return Err(invalid("scheme must be http or https"));
    }
    if base.host_str().map_or(true, str::is_empty) {
        return Err(invalid("missing host"));
    }
    base.join(HEC_EVENT_PATH)
        .map_err(|e| invalid(&e.to_string()))
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|val| val.trim().to_string())
        .filter(|val| !val.is_empty())
}

fn parse_var<T: FromStr>(name: &'static str) -> Result<Option<T>, ConfigError> {
    match non_empty_var(name) {
        None => Ok(None),
        Some(value) => value
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { name, value }),
    }
}

fn parse_bool_var(name: &'static str) -> Result<Option<bool>, ConfigError> {
    match non_empty_var(name) {
        None => Ok(None),
        Some(value) => match value.to_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(Some(true)),
            "false" | "0" | "no" => Ok(Some(false)),
            _ => Err(ConfigError::InvalidValue { name, value }),
        },
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serial_test::serial;

    const ALL_VARS: &[&str] = &[
        "HEC_URL",
        "HEC_TOKEN",
        "HEC_CHANNEL",
        "HEC_SEND_MODE",
        "HEC_BATCH_SIZE_BYTES",
        "HEC_BATCH_SIZE_COUNT",
        "HEC_BATCH_INTERVAL_MS",
        "HEC_USE_PROXY",
        "HEC_PROXY_URL",
        "HEC_PROXY_USER",
        "HEC_PROXY_PASSWORD",
        "HEC_RETRIES_ON_ERROR",
        "HEC_IGNORE_SSL_ERRORS",
        "HEC_MAX_CONNECTIONS_PER_SERVER",
        "HEC_TIMEOUT_SECS",
        "HEC_INDEX",
        "HEC_SOURCETYPE",
    ];

    fn clear_env() {
        for var in ALL_VARS {
            env::remove_var(var);
        }
    }

    #[test]
    fn test_resolve_no_batching() {
        let limits = BatchSettings::default().resolve();
        assert_eq!(limits.max_bytes, 0);
        assert_eq!(limits.max_count, 0);
        assert!(limits.is_reached(1, 10));
    }

    #[test]
    fn test_resolve_interval_only_is_unbounded() {
        let limits = BatchSettings {
            interval: Duration::from_millis(250),
            ..Default::default()
        }
        .resolve();
        assert_eq!(limits.max_bytes, usize::MAX);
        assert_eq!(limits.max_count, usize::MAX);
        assert!(!limits.is_reached(10_000, 10_000_000));
    }

    #[test]
    fn test_resolve_single_threshold_promotes_other() {
        let limits = BatchSettings {
            interval: Duration::from_millis(250),
            max_bytes: 0,
            max_count: 5,
        }
        .resolve();
        assert_eq!(limits.max_count, 5);
        assert_eq!(limits.max_bytes, usize::MAX);

        let limits = BatchSettings {
            interval: Duration::from_millis(250),
            max_bytes: 1024,
            max_count: 0,
        }
        .resolve();
        assert_eq!(limits.max_count, usize::MAX);
        assert_eq!(limits.max_bytes, 1024);
    }

    #[test]
    fn test_event_url_appends_collector_path() {
        let url = event_url("https://splunk.example.com:8088").unwrap();
        assert_eq!(
            url.as_str(),
            "https://splunk.example.com:8088/services/collector/event/1.0"
        );

        let url = event_url("http://localhost:8088/ignored/path").unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:8088/services/collector/event/1.0"
        );
    }

    #[test]
    fn test_event_url_rejects_bad_endpoints() {
        assert!(event_url("").is_err());
        assert!(event_url("not a url").is_err());
        assert!(event_url("ftp://splunk.example.com").is_err());
    }

    #[test]
    fn test_validate_requires_token() {
        let config = SenderConfig::new("http://localhost:8088", "  ");
        assert!(matches!(config.validate(), Err(ConfigError::MissingToken)));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let mut config = SenderConfig::new("http://localhost:8088", "secret-token");
        config.proxy.password = "proxy-secret".to_string();
        let debug = format!("{config:?}");
        assert!(!debug.contains("secret-token"));
        assert!(!debug.contains("proxy-secret"));
    }

    #[test]
    fn test_send_mode_from_str() {
        assert_eq!("Parallel".parse::<SendMode>().unwrap(), SendMode::Parallel);
        assert_eq!(" sequential ".parse::<SendMode>().unwrap(), SendMode::Sequential);
        assert!("ordered".parse::<SendMode>().is_err());
    }

    #[test]
    #[serial]
    fn test_from_env_defaults() {
        clear_env();
        env::set_var("HEC_URL", "http://localhost:8088");
        env::set_var("HEC_TOKEN", "b9e45a2a-1093-4572-9a9d-2ef2baabafb5");

        let config = SenderConfig::from_env().unwrap();
        assert_eq!(config.send_mode, SendMode::Sequential);
        assert_eq!(config.batch, BatchSettings::default());
        assert_eq!(config.retries_on_error, 0);
        assert!(config.proxy.use_proxy);
        assert!(config.channel.is_none());
        assert_eq!(config.max_connections_per_server, 10);
        clear_env();
    }

    #[test]
    #[serial]
    fn test_from_env_connection_cap_override() {
        clear_env();
        env::set_var("HEC_URL", "http://localhost:8088");
        env::set_var("HEC_TOKEN", "token");
        env::set_var("HEC_MAX_CONNECTIONS_PER_SERVER", "0");

        let config = SenderConfig::from_env().unwrap();
        assert_eq!(config.max_connections_per_server, 0);
        assert_eq!(SenderConfig::default().max_connections_per_server, 10);
        clear_env();
    }

    #[test]
    #[serial]
    fn test_from_env_threshold_implies_interval() {
        clear_env();
        env::set_var("HEC_URL", "http://localhost:8088");
        env::set_var("HEC_TOKEN", "token");
        env::set_var("HEC_BATCH_SIZE_COUNT", "50");
        env::set_var("HEC_USE_PROXY", "false");
        env::set_var("HEC_SEND_MODE", "parallel");
        env::set_var("HEC_INDEX", "main");

        let config = SenderConfig::from_env().unwrap();
        assert_eq!(config.batch.interval, ENV_FALLBACK_BATCH_INTERVAL);
        assert_eq!(config.batch.max_count, 50);
        assert!(!config.proxy.use_proxy);
        assert_eq!(config.send_mode, SendMode::Parallel);
        assert_eq!(config.default_metadata.index.as_deref(), Some("main"));
        clear_env();
    }

    #[test]
    #[serial]
    fn test_from_env_rejects_invalid_numbers() {
        clear_env();
        env::set_var("HEC_URL", "http://localhost:8088");
        env::set_var("HEC_TOKEN", "token");
        env::set_var("HEC_RETRIES_ON_ERROR", "many");

        let err = SenderConfig::from_env().unwrap_err();
        assert_eq!(err.to_string(), "Invalid value 'many' for HEC_RETRIES_ON_ERROR");
        clear_env();
    }

    #[test]
    #[serial]
    fn test_from_env_requires_url() {
        clear_env();
        env::set_var("HEC_TOKEN", "token");
        assert!(matches!(
            SenderConfig::from_env(),
            Err(ConfigError::InvalidEndpoint { .. })
        ));
        clear_env();
    }
}
