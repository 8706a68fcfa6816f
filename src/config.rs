// src/config.rs

//! Runtime settings passed explicitly to every _rawloglib_ component.
//!
//! There are no global settings. A [`RawlogConfig`] is created once, usually
//! by the driver program from command-line options, wrapped in an
//! [`Arc`], and handed to each constructor:
//! [`RawlogStore::new`], [`LogView::new`], [`StreamIngestor::start`],
//! and [`QueryEvaluator::new`].
//!
//! [`Arc`]: std::sync::Arc
//! [`RawlogStore::new`]: crate::readers::rawlogstore::RawlogStore::new
//! [`LogView::new`]: crate::readers::logview::LogView::new
//! [`StreamIngestor::start`]: crate::readers::streamingestor::StreamIngestor::start
//! [`QueryEvaluator::new`]: crate::query::QueryEvaluator::new

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use ::lazy_static::lazy_static;

/// Named integer log-level constants usable in query expressions,
/// e.g. `level >= WARNING`.
pub type LevelTable = BTreeMap<String, i64>;

/// Largest payload a length prefix may announce, `2^20` bytes.
/// A larger prefix is treated as corruption and triggers a resync.
pub const RECORD_LEN_MAX: u32 = 1 << 20;

lazy_static! {
    /// The default [`LevelTable`].
    pub static ref LEVELS_DEFAULT: LevelTable = {
        let mut m = LevelTable::new();
        m.insert(String::from("NOTSET"), 0);
        m.insert(String::from("TRACE"), 5);
        m.insert(String::from("DEBUG"), 10);
        m.insert(String::from("INFO"), 20);
        m.insert(String::from("WARNING"), 30);
        m.insert(String::from("WARN"), 30);
        m.insert(String::from("ERROR"), 40);
        m.insert(String::from("CRITICAL"), 50);
        m.insert(String::from("FATAL"), 50);

        m
    };
}

/// Settings for the store, the visibility index, the query evaluator and
/// the stream listener.
#[derive(Clone, Debug)]
pub struct RawlogConfig {
    /// Length prefixes greater than this are corrupt.
    pub max_record_len: u32,
    /// Level constants visible to query expressions.
    pub levels: LevelTable,
    /// Capacity of the `VisibilityIndex` sequence→row LRU cache.
    pub visibility_cache_sz: usize,
    /// Capacity of the `QueryEvaluator` compiled-query LRU cache.
    pub query_cache_sz: usize,
    /// Capacity of the bounded queue between the listener thread and the
    /// interactive thread.
    pub listener_queue_capacity: usize,
    /// Socket read timeout; upper bound on how long `stop()` waits for the
    /// listener loop to notice.
    pub listener_poll_interval: Duration,
    /// Bounded wait when joining the listener thread.
    pub listener_join_timeout: Duration,
    /// If `true` then live-appended rows are tested against the active
    /// filter. If `false` they are inserted hidden until the filter is
    /// re-applied.
    pub filter_live_rows: bool,
}

impl RawlogConfig {
    pub const VISIBILITY_CACHE_SZ_DEFAULT: usize = 4096;
    pub const QUERY_CACHE_SZ_DEFAULT: usize = 32;
    pub const LISTENER_QUEUE_CAPACITY_DEFAULT: usize = 1024;
    pub const LISTENER_POLL_INTERVAL_DEFAULT: Duration = Duration::from_millis(200);
    pub const LISTENER_JOIN_TIMEOUT_DEFAULT: Duration = Duration::from_secs(2);

    /// Look up a level constant by name.
    pub fn level(&self, name: &str) -> Option<i64> {
        self.levels.get(name).copied()
    }

    /// Level number of the first name found, or `0`.
    /// Used for synthesized diagnostic records.
    pub(crate) fn level_or_zero(&self, names: &[&str]) -> i64 {
        names
            .iter()
            .find_map(|name| self.level(name))
            .unwrap_or(0)
    }

    /// Convenience for wrapping in the `Arc` the constructors take.
    pub fn into_arc(self) -> Arc<RawlogConfig> {
        Arc::new(self)
    }
}

impl Default for RawlogConfig {
    fn default() -> Self {
        Self {
            max_record_len: RECORD_LEN_MAX,
            levels: LEVELS_DEFAULT.clone(),
            visibility_cache_sz: RawlogConfig::VISIBILITY_CACHE_SZ_DEFAULT,
            query_cache_sz: RawlogConfig::QUERY_CACHE_SZ_DEFAULT,
            listener_queue_capacity: RawlogConfig::LISTENER_QUEUE_CAPACITY_DEFAULT,
            listener_poll_interval: RawlogConfig::LISTENER_POLL_INTERVAL_DEFAULT,
            listener_join_timeout: RawlogConfig::LISTENER_JOIN_TIMEOUT_DEFAULT,
            filter_live_rows: false,
        }
    }
}
