use chrono::{DateTime, Utc};

/// Ledger row proving an entry of a feed was delivered.
#[derive(Debug, Clone)]
pub struct SentRecord {
    pub feed_id: i64,
    pub guid: String,
    pub title: String,
    pub sent_at: DateTime<Utc>,
}
