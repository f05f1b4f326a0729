use chrono::{DateTime, Utc};

/// Format used when the owner skips the format step of registration.
pub const DEFAULT_FORMAT: &str = "**{{.Title}}**\n{{.Link}}";

/// A registered feed and how its entries should be rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedConfig {
    pub id: i64,
    pub url: String,
    pub format: String,
    pub destination_id: Option<i64>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl FeedConfig {
    pub fn new(url: String, format: String, destination_id: i64) -> Self {
        Self {
            id: 0,
            url,
            format,
            destination_id: Some(destination_id),
            active: true,
            created_at: Utc::now(),
        }
    }
}

/// Row shape used by the `feeds` listing command.
#[derive(Debug, Clone)]
pub struct FeedOverview {
    pub feed: FeedConfig,
    pub channel_id: Option<String>,
    pub label: Option<String>,
    pub sent_count: i64,
}

impl FeedOverview {
    pub fn display_destination(&self) -> String {
        match (&self.label, &self.channel_id) {
            (Some(label), Some(channel)) if !label.is_empty() => format!("#{} ({})", label, channel),
            (_, Some(channel)) => channel.clone(),
            _ => "(no destination)".to_string(),
        }
    }
}
