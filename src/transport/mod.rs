//! Chat transport seams.
//!
//! The poller and the command router only see [`DeliverySink`] and
//! [`Replier`]; the Discord adapter implements both.

pub mod discord;
pub mod listener;

use async_trait::async_trait;

use crate::app::Result;
use crate::domain::Destination;
use crate::render::RenderedEntry;

pub use discord::DiscordClient;
pub use listener::{Listener, ListenerConfig};

/// Delivers a rendered entry to a destination.
#[async_trait]
pub trait DeliverySink {
    async fn deliver(&self, destination: &Destination, entry: &RenderedEntry) -> Result<()>;
}

/// Sends plain-text replies to a channel.
#[async_trait]
pub trait Replier {
    async fn reply(&self, channel_id: &str, content: &str) -> Result<()>;
}

/// A chat message received from the transport.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InboundMessage {
    pub author_id: String,
    pub author_name: String,
    pub channel_id: String,
    pub guild_id: String,
    pub channel_label: String,
    pub content: String,
}

impl InboundMessage {
    pub fn new(
        author_id: impl Into<String>,
        channel_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            author_id: author_id.into(),
            channel_id: channel_id.into(),
            content: content.into(),
            ..Self::default()
        }
    }
}
