use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::app::{Result, RunnelError};
use crate::domain::Destination;
use crate::render::RenderedEntry;
use crate::transport::{DeliverySink, Replier};

pub const DEFAULT_API_BASE: &str = "https://discord.com/api/v10";

/// Colour of delivered embeds.
pub const EMBED_COLOR: u32 = 0x00ff00;

const MAX_DESCRIPTION: usize = 4096;
const MAX_FIELD_NAME: usize = 256;
const MAX_FIELD_VALUE: usize = 1024;
const MAX_FIELDS: usize = 25;
const MAX_CONTENT: usize = 2000;

/// Discord rejects empty field names and values; this renders as blank.
const BLANK: &str = "\u{200b}";

#[derive(Debug, Clone, Serialize)]
pub struct EmbedPayload {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub title: String,
    pub description: String,
    pub color: u32,
    pub timestamp: String,
    pub fields: Vec<EmbedFieldPayload>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmbedFieldPayload {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

#[derive(Debug, Serialize)]
struct CreateMessage<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    embeds: Vec<EmbedPayload>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiscordUser {
    pub id: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub bot: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiscordChannel {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub guild_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiscordMessage {
    pub id: String,
    pub channel_id: String,
    pub author: DiscordUser,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub guild_id: Option<String>,
}

impl DiscordMessage {
    /// Snowflake ids sort chronologically.
    pub fn snowflake(&self) -> u64 {
        self.id.parse().unwrap_or(0)
    }
}

/// Minimal Discord REST client used for delivery, replies and inbound polling.
pub struct DiscordClient {
    client: Client,
    api_base: String,
    token: String,
}

impl DiscordClient {
    pub fn new(token: impl Into<String>, api_base: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .user_agent(concat!("DiscordBot (runnel, ", env!("CARGO_PKG_VERSION"), ")"))
            .build()?;

        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.header("Authorization", format!("Bot {}", self.token))
    }

    async fn checked(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(RunnelError::Transport(format!("Discord returned {}: {}", status, body)))
    }

    async fn create_message(&self, channel_id: &str, message: &CreateMessage<'_>) -> Result<()> {
        let url = format!("{}/channels/{}/messages", self.api_base, channel_id);
        let response = self
            .authorized(self.client.post(&url))
            .json(message)
            .send()
            .await?;
        Self::checked(response).await?;
        Ok(())
    }

    /// The bot's own user, used to ignore its own messages.
    pub async fn current_user(&self) -> Result<DiscordUser> {
        let url = format!("{}/users/@me", self.api_base);
        let response = self.authorized(self.client.get(&url)).send().await?;
        Ok(Self::checked(response).await?.json().await?)
    }

    pub async fn channel(&self, channel_id: &str) -> Result<DiscordChannel> {
        let url = format!("{}/channels/{}", self.api_base, channel_id);
        let response = self.authorized(self.client.get(&url)).send().await?;
        Ok(Self::checked(response).await?.json().await?)
    }

    /// Messages of a channel newer than `after`, oldest first.
    pub async fn messages_after(
        &self,
        channel_id: &str,
        after: Option<u64>,
        limit: u8,
    ) -> Result<Vec<DiscordMessage>> {
        let mut url = format!(
            "{}/channels/{}/messages?limit={}",
            self.api_base, channel_id, limit
        );
        if let Some(after) = after {
            url.push_str(&format!("&after={}", after));
        }

        let response = self.authorized(self.client.get(&url)).send().await?;
        let mut messages: Vec<DiscordMessage> = Self::checked(response).await?.json().await?;
        messages.sort_by_key(DiscordMessage::snowflake);
        Ok(messages)
    }
}

#[async_trait]
impl DeliverySink for DiscordClient {
    async fn deliver(&self, destination: &Destination, entry: &RenderedEntry) -> Result<()> {
        let message = CreateMessage {
            content: None,
            embeds: vec![embed_payload(entry, &Utc::now().to_rfc3339())],
        };
        self.create_message(&destination.channel_id, &message).await?;
        debug!("Delivered embed to channel {}", destination.channel_id);
        Ok(())
    }
}

#[async_trait]
impl Replier for DiscordClient {
    async fn reply(&self, channel_id: &str, content: &str) -> Result<()> {
        let content = truncate(content, MAX_CONTENT);
        let message = CreateMessage {
            content: Some(&content),
            embeds: Vec::new(),
        };
        self.create_message(channel_id, &message).await
    }
}

/// Build the embed for a rendered entry, applying Discord's size limits.
pub fn embed_payload(entry: &RenderedEntry, timestamp: &str) -> EmbedPayload {
    EmbedPayload {
        title: truncate(&entry.title, MAX_FIELD_NAME),
        description: truncate(&entry.description, MAX_DESCRIPTION),
        color: EMBED_COLOR,
        timestamp: timestamp.to_string(),
        fields: entry
            .fields
            .iter()
            .take(MAX_FIELDS)
            .map(|field| EmbedFieldPayload {
                name: non_blank(truncate(&field.name, MAX_FIELD_NAME)),
                value: non_blank(truncate(&field.value, MAX_FIELD_VALUE)),
                inline: field.inline,
            })
            .collect(),
    }
}

fn non_blank(s: String) -> String {
    if s.trim().is_empty() {
        BLANK.to_string()
    } else {
        s
    }
}

/// Cut `s` to at most `max` characters.
pub fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}
