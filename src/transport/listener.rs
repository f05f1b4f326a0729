use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, info_span, warn, Instrument, Span};

use crate::app::Result;
use crate::bot::Router;
use crate::transport::discord::{DiscordClient, DiscordMessage, DiscordUser};
use crate::transport::InboundMessage;

const PAGE_SIZE: u8 = 50;

#[derive(Debug, Clone)]
pub struct ListenerConfig {
    pub channels: Vec<String>,
    pub interval: Duration,
}

/// Per-channel polling state.
#[derive(Debug, Clone, Default)]
struct ChannelCursor {
    after: Option<u64>,
    /// Set once the newest existing message is known; unpositioned channels are not drained.
    positioned: bool,
    guild_id: String,
    label: String,
}

/// Polls control channels for new messages and hands them to the router.
pub struct Listener {
    client: Arc<DiscordClient>,
    /// The bot's own account; its messages are never dispatched.
    me: DiscordUser,
    router: Arc<Router>,
    config: ListenerConfig,
    span: Span,
}

impl Listener {
    pub fn new(
        client: Arc<DiscordClient>,
        me: DiscordUser,
        router: Arc<Router>,
        config: ListenerConfig,
    ) -> Self {
        Self {
            client,
            me,
            router,
            config,
            span: info_span!("listener"),
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let span = self.span.clone();
        async move {
            if self.config.channels.is_empty() {
                warn!("No control channels configured; commands will not be received");
                return Ok(());
            }

            info!(
                "Listening for commands as {} on {} channel(s)",
                self.me.username,
                self.config.channels.len()
            );

            let mut cursors = HashMap::new();
            for channel_id in &self.config.channels {
                cursors.insert(channel_id.clone(), self.prime(channel_id).await);
            }

            let mut timer = interval(self.config.interval);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = timer.tick() => {}
                    _ = shutdown.changed() => break,
                }

                self.tick(&mut cursors).await;
            }

            info!("Listener stopped");
            Ok(())
        }
        .instrument(span)
        .await
    }

    /// Look up channel metadata and start after the newest existing message.
    async fn prime(&self, channel_id: &str) -> ChannelCursor {
        let mut cursor = ChannelCursor::default();

        match self.client.channel(channel_id).await {
            Ok(channel) => {
                cursor.label = channel.name.unwrap_or_default();
                cursor.guild_id = channel.guild_id.unwrap_or_default();
            }
            Err(e) => warn!("Failed to look up channel {}: {}", channel_id, e),
        }

        self.position(channel_id, &mut cursor).await;
        cursor
    }

    async fn position(&self, channel_id: &str, cursor: &mut ChannelCursor) {
        match self.client.messages_after(channel_id, None, 1).await {
            Ok(messages) => {
                cursor.after = messages.last().map(DiscordMessage::snowflake);
                cursor.positioned = true;
            }
            Err(e) => warn!(
                "Failed to read latest message in {}: {}; retrying next tick",
                channel_id, e
            ),
        }
    }

    async fn tick(&self, cursors: &mut HashMap<String, ChannelCursor>) {
        for channel_id in &self.config.channels {
            let Some(cursor) = cursors.get_mut(channel_id) else {
                continue;
            };
            if cursor.positioned {
                self.drain(channel_id, cursor).await;
            } else {
                self.position(channel_id, cursor).await;
            }
        }
    }

    async fn drain(&self, channel_id: &str, cursor: &mut ChannelCursor) {
        let messages = match self
            .client
            .messages_after(channel_id, cursor.after, PAGE_SIZE)
            .await
        {
            Ok(messages) => messages,
            Err(e) => {
                error!("Failed to poll channel {}: {}", channel_id, e);
                return;
            }
        };

        for message in messages {
            cursor.after = Some(cursor.after.map_or(message.snowflake(), |after| {
                after.max(message.snowflake())
            }));

            if message.author.id == self.me.id {
                continue;
            }

            debug!("Message {} from {}", message.id, message.author.id);
            let inbound = to_inbound(message, cursor);
            self.router.handle(&inbound).await;
        }
    }
}

fn to_inbound(message: DiscordMessage, cursor: &ChannelCursor) -> InboundMessage {
    InboundMessage {
        author_id: message.author.id,
        author_name: message.author.username,
        channel_id: message.channel_id,
        guild_id: message.guild_id.unwrap_or_else(|| cursor.guild_id.clone()),
        channel_label: cursor.label.clone(),
        content: message.content,
    }
}
