pub mod sqlite;

use crate::app::Result;
use crate::domain::{Destination, FeedConfig, FeedOverview, NewDestination};

pub use sqlite::SqliteStore;

/// Catalog access needed to converge the schema.
pub trait SchemaCatalog {
    fn table_exists(&self, name: &str) -> Result<bool>;
    fn execute_batch(&self, sql: &str) -> Result<()>;
}

/// Record of entries already delivered, keyed by `(feed_id, guid)`.
pub trait Ledger {
    fn has_been_sent(&self, feed_id: i64, guid: &str) -> Result<bool>;
    /// Returns `true` when a new record was written.
    fn record_sent(&self, feed_id: i64, guid: &str, title: &str) -> Result<bool>;
}

/// Read side used by the poller.
pub trait FeedCatalog {
    fn active_feeds(&self) -> Result<Vec<FeedConfig>>;
    fn destination(&self, id: i64) -> Result<Option<Destination>>;
    fn feed_overviews(&self) -> Result<Vec<FeedOverview>>;
}

/// Write side used by the registration flow.
pub trait FeedRegistry {
    /// Insert or refresh a destination by channel id, returning its row id.
    fn upsert_destination(&self, destination: &NewDestination) -> Result<i64>;
    /// Returns `false` when the feed is already registered for that destination.
    fn insert_feed(&self, feed: &FeedConfig) -> Result<bool>;
}
