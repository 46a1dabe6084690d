use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::storage::base::DEFAULT_PAGE_SIZE;

/// Tunables shared by the page cache, heap files and the statistics layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Bytes per page; constant for the lifetime of every file opened with it
    pub page_size: usize,
    /// Maximum number of resident pages in the cache
    pub cache_pages: usize,
    /// How long `get_page` waits for a lock before aborting the caller
    pub lock_timeout: Duration,
    /// Cost of reading one page, used by scan cost estimates
    pub io_cost_per_page: f64,
    /// Buckets per column histogram
    pub histogram_buckets: usize,
    /// fsync table files after the commit flush
    pub sync_on_commit: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            page_size: DEFAULT_PAGE_SIZE,
            cache_pages: 50,
            lock_timeout: Duration::from_secs(2),
            io_cost_per_page: 1000.0,
            histogram_buckets: 100,
            sync_on_commit: true,
        }
    }
}

impl Config {
    /// Defaults overridden by `CINDER_*` environment variables
    pub fn from_env() -> Self {
        let mut config = Config::default();
        if let Some(v) = env_parse::<usize>("CINDER_PAGE_SIZE") {
            config.page_size = v;
        }
        if let Some(v) = env_parse::<usize>("CINDER_CACHE_PAGES") {
            config.cache_pages = v;
        }
        if let Some(v) = env_parse::<u64>("CINDER_LOCK_TIMEOUT_MS") {
            config.lock_timeout = Duration::from_millis(v);
        }
        if let Some(v) = env_parse::<f64>("CINDER_IO_COST_PER_PAGE") {
            config.io_cost_per_page = v;
        }
        if let Some(v) = env_parse::<usize>("CINDER_HISTOGRAM_BUCKETS") {
            config.histogram_buckets = v;
        }
        if let Some(v) = env_parse::<bool>("CINDER_SYNC_ON_COMMIT") {
            config.sync_on_commit = v;
        }
        config
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_cache_pages(mut self, cache_pages: usize) -> Self {
        self.cache_pages = cache_pages;
        self
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn with_io_cost_per_page(mut self, cost: f64) -> Self {
        self.io_cost_per_page = cost;
        self
    }

    pub fn with_histogram_buckets(mut self, buckets: usize) -> Self {
        self.histogram_buckets = buckets;
        self
    }

    pub fn with_sync_on_commit(mut self, sync: bool) -> Self {
        self.sync_on_commit = sync;
        self
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(key, value = %raw, "ignoring unparsable config override");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_overrides_defaults() {
        let config = Config::default()
            .with_page_size(13)
            .with_cache_pages(3)
            .with_lock_timeout(Duration::from_millis(50));
        assert_eq!(config.page_size, 13);
        assert_eq!(config.cache_pages, 3);
        assert_eq!(config.lock_timeout, Duration::from_millis(50));
        assert_eq!(config.histogram_buckets, 100);
    }

    #[test]
    fn test_config_serde_encoding() {
        let config = Config::default().with_cache_pages(7);
        let bytes = bincode::serde::encode_to_vec(&config, bincode::config::standard())
            .expect("encode config");
        let (decoded, _): (Config, usize) =
            bincode::serde::decode_from_slice(&bytes, bincode::config::standard())
                .expect("decode config");
        assert_eq!(decoded, config);
    }
}
