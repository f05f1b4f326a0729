/// A chat channel that rendered entries are delivered to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub id: i64,
    /// External identifier of the channel (the Discord channel id).
    pub channel_id: String,
    pub guild_id: String,
    pub label: String,
}

/// Destination data collected during registration, before it has a row id.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NewDestination {
    pub channel_id: String,
    pub guild_id: String,
    pub label: String,
}

impl NewDestination {
    pub fn new(channel_id: impl Into<String>) -> Self {
        Self {
            channel_id: channel_id.into(),
            ..Self::default()
        }
    }
}
