// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Per-partition metadata resolution.
//!
//! Metadata is resolved once per partition key (usually a logger or source
//! name) and cached. The cache is bounded; overflowing it is treated as a
//! pathological case and the whole cache is cleared rather than evicted.

use crate::record::Metadata;
use std::collections::HashMap;
use std::env;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::warn;

/// Upper bound on cached partition keys.
pub const DEFAULT_METADATA_CACHE_CAPACITY: usize = 1000;

/// Source type stamped on resolved metadata.
pub const DEFAULT_SOURCE_TYPE: &str = "_json";

pub type MetadataResolver = Box<dyn Fn(&str) -> Metadata + Send + Sync>;

pub struct MetadataCache {
    capacity: usize,
    entries: RwLock<HashMap<String, Arc<Metadata>>>,
    resolver: MetadataResolver,
}

impl MetadataCache {
    /// A cache resolving keys with [`default_resolver`].
    #[must_use]
    pub fn new(defaults: &Metadata) -> Self {
        Self::with_resolver(DEFAULT_METADATA_CACHE_CAPACITY, default_resolver(defaults))
    }

    #[must_use]
    pub fn with_resolver(capacity: usize, resolver: MetadataResolver) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: RwLock::new(HashMap::new()),
            resolver,
        }
    }

    /// Returns the cached metadata for `key`, resolving it on a miss.
    pub fn get(&self, key: &str) -> Arc<Metadata> {
        {
            let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(metadata) = entries.get(key) {
                return Arc::clone(metadata);
            }
        }

        let metadata = Arc::new((self.resolver)(key));
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = entries.get(key) {
            return Arc::clone(existing);
        }
        if entries.len() >= self.capacity {
            warn!(
                "HEC | Metadata cache reached {} entries, clearing it",
                self.capacity
            );
            entries.clear();
        }
        entries.insert(key.to_string(), Arc::clone(&metadata));
        metadata
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

/// Resolves `key` to `source = key` (absent for the empty key), taking
/// index, source type and host from `defaults`. A missing source type falls
/// back to `_json` and a missing host to the local host name.
#[must_use]
pub fn default_resolver(defaults: &Metadata) -> MetadataResolver {
    let index = defaults.index.clone();
    let source_type = defaults
        .source_type
        .clone()
        .unwrap_or_else(|| DEFAULT_SOURCE_TYPE.to_string());
    let host = defaults.host.clone().or_else(get_hostname);
    Box::new(move |key: &str| {
        Metadata::new(
            index.clone(),
            (!key.is_empty()).then(|| key.to_string()),
            Some(source_type.clone()),
            host.clone(),
        )
    })
}

/// Best-effort local host name.
///
/// Tries `COMPUTERNAME`, `HOSTNAME`, then the system host name; blank values
/// are skipped.
#[must_use]
pub fn get_hostname() -> Option<String> {
    lookup("COMPUTERNAME", || env::var("COMPUTERNAME").ok())
        .or_else(|| lookup("HOSTNAME", || env::var("HOSTNAME").ok()))
        .or_else(|| lookup("system", system_hostname))
}

fn system_hostname() -> Option<String> {
    match hostname::get() {
        Ok(name) => Some(name.to_string_lossy().into_owned()),
        Err(e) => {
            warn!("HEC | Failed to get system host name: {e}");
            None
        }
    }
}

fn lookup(kind: &str, f: impl FnOnce() -> Option<String>) -> Option<String> {
    let value = f()?;
    let trimmed = value.trim();
    if trimmed.is_empty() {
        tracing::debug!("HEC | Ignoring empty host name from {kind}");
        return None;
    }
    Some(trimmed.to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_cache(capacity: usize) -> (MetadataCache, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let cache = MetadataCache::with_resolver(
            capacity,
            Box::new(move |key| {
                counter.fetch_add(1, Ordering::SeqCst);
                Metadata::new(None, Some(key.to_string()), None, None)
            }),
        );
        (cache, calls)
    }

    #[test]
    fn test_get_caches_per_key() {
        let (cache, calls) = counting_cache(10);

        let first = cache.get("orders");
        let second = cache.get("orders");

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(first.source.as_deref(), Some("orders"));
    }

    #[test]
    fn test_overflow_clears_whole_cache() {
        let (cache, calls) = counting_cache(3);
        let original = cache.get("a");
        cache.get("b");
        cache.get("c");
        assert_eq!(cache.len(), 3);

        cache.get("d");
        assert_eq!(cache.len(), 1);

        let recomputed = cache.get("a");
        assert!(!Arc::ptr_eq(&original, &recomputed));
        assert_eq!(calls.load(Ordering::SeqCst), 5);
        assert!(cache.len() <= 3);
    }

    #[test]
    fn test_never_exceeds_capacity() {
        let (cache, _) = counting_cache(DEFAULT_METADATA_CACHE_CAPACITY);
        for i in 0..(DEFAULT_METADATA_CACHE_CAPACITY * 3) {
            cache.get(&format!("logger-{i}"));
            assert!(cache.len() <= DEFAULT_METADATA_CACHE_CAPACITY);
        }
    }

    #[test]
    #[serial]
    fn test_default_resolver() {
        env::set_var("COMPUTERNAME", "  build-host  ");
        let cache = MetadataCache::new(&Metadata::new(
            Some("main".to_string()),
            None,
            None,
            None,
        ));

        let named = cache.get("MyApp.Orders");
        assert_eq!(named.index.as_deref(), Some("main"));
        assert_eq!(named.source.as_deref(), Some("MyApp.Orders"));
        assert_eq!(named.source_type.as_deref(), Some(DEFAULT_SOURCE_TYPE));
        assert_eq!(named.host.as_deref(), Some("build-host"));

        let unnamed = cache.get("");
        assert!(unnamed.source.is_none());
        env::remove_var("COMPUTERNAME");
    }

    #[test]
    #[serial]
    fn test_get_hostname_skips_blank_values() {
        env::set_var("COMPUTERNAME", "   ");
        env::set_var("HOSTNAME", "container-1");
        assert_eq!(get_hostname().as_deref(), Some("container-1"));
        env::remove_var("COMPUTERNAME");
        env::remove_var("HOSTNAME");
    }

    #[test]
    #[serial]
    fn test_get_hostname_falls_back_to_system_name() {
        env::remove_var("COMPUTERNAME");
        env::remove_var("HOSTNAME");

        let expected = hostname::get().unwrap().to_string_lossy().trim().to_string();
        assert!(!expected.is_empty());
        assert_eq!(get_hostname(), Some(expected));
    }

    #[test]
    #[serial]
    fn test_default_resolver_uses_configured_source_type_and_host() {
        env::set_var("COMPUTERNAME", "build-host");
        let cache = MetadataCache::new(&Metadata::new(
            Some("main".to_string()),
            Some("ignored".to_string()),
            Some("custom:type".to_string()),
            Some("edge-1".to_string()),
        ));

        let metadata = cache.get("orders");
        assert_eq!(metadata.index.as_deref(), Some("main"));
        assert_eq!(metadata.source.as_deref(), Some("orders"));
        assert_eq!(metadata.source_type.as_deref(), Some("custom:type"));
        assert_eq!(metadata.host.as_deref(), Some("edge-1"));
        env::remove_var("COMPUTERNAME");
    }
}
