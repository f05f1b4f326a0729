//! Command routing for inbound chat messages.

pub mod session;

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, info_span, warn, Instrument, Span};

use crate::app::{Result, RunnelError};
use crate::domain::{FeedConfig, NewDestination};
use crate::store::FeedRegistry;
use crate::transport::{InboundMessage, Replier};

pub use session::{
    Advance, Registration, RegistrationSession, RegistrationStep, SessionStore, PROMPT_FORMAT,
    PROMPT_URL,
};

pub const PONG: &str = "Pong!";
pub const NOT_AUTHORIZED: &str = "❌ You are not authorized to add feeds.";
pub const FEED_ADDED: &str = "✅ RSS feed added successfully!";
pub const FEED_EXISTS: &str = "ℹ️ This feed is already registered for this channel.";
pub const SESSION_EXPIRED: &str =
    "⌛ Your feed registration timed out. Start again with !rssadd.";

/// Prefix-matched chat commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Ping,
    AddFeed,
}

impl Command {
    const ALL: [Command; 2] = [Command::Ping, Command::AddFeed];

    pub fn prefix(&self) -> &'static str {
        match self {
            Command::Ping => "!ping",
            Command::AddFeed => "!rssadd",
        }
    }

    pub fn parse(content: &str) -> Option<Self> {
        let content = content.trim();
        Self::ALL
            .into_iter()
            .find(|command| content.starts_with(command.prefix()))
    }
}

/// Dispatches messages to commands or to the sender's registration session.
pub struct Router {
    owner_id: String,
    sessions: SessionStore,
    registry: Arc<dyn FeedRegistry + Send + Sync>,
    replier: Arc<dyn Replier + Send + Sync>,
    span: Span,
}

impl Router {
    pub fn new(
        owner_id: impl Into<String>,
        registry: Arc<dyn FeedRegistry + Send + Sync>,
        replier: Arc<dyn Replier + Send + Sync>,
        session_timeout: Duration,
    ) -> Self {
        Self {
            owner_id: owner_id.into(),
            sessions: SessionStore::new(session_timeout),
            registry,
            replier,
            span: info_span!("registration"),
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub async fn handle(&self, message: &InboundMessage) {
        self.dispatch(message).instrument(self.span.clone()).await
    }

    async fn dispatch(&self, message: &InboundMessage) {
        match Command::parse(&message.content) {
            Some(Command::Ping) => {
                self.send(&message.channel_id, PONG).await;
                info!(
                    "Responded to !ping from {} ({})",
                    message.author_name, message.author_id
                );
            }
            Some(Command::AddFeed) => self.start_registration(message).await,
            None => self.continue_registration(message).await,
        }
    }

    fn authorize(&self, user_id: &str) -> Result<()> {
        if user_id == self.owner_id {
            Ok(())
        } else {
            Err(RunnelError::Unauthorized(format!(
                "user {} tried to add a feed",
                user_id
            )))
        }
    }

    async fn start_registration(&self, message: &InboundMessage) {
        if let Err(e) = self.authorize(&message.author_id) {
            warn!("{}", e);
            self.send(&message.channel_id, NOT_AUTHORIZED).await;
            return;
        }

        let purged = self.sessions.purge_expired();
        if purged > 0 {
            info!("Dropped {} expired registration session(s)", purged);
        }

        self.sessions.begin(&message.author_id).await;
        self.send(&message.channel_id, PROMPT_URL).await;
    }

    async fn continue_registration(&self, message: &InboundMessage) {
        let Some(slot) = self.sessions.existing(&message.author_id) else {
            return;
        };

        let mut guard = slot.lock().await;
        let Some(session) = guard.as_mut() else {
            drop(guard);
            self.sessions.release(&message.author_id, &slot);
            return;
        };

        if session.is_expired_at(std::time::Instant::now(), self.sessions.ttl()) {
            *guard = None;
            drop(guard);
            self.sessions.release(&message.author_id, &slot);
            self.send(&message.channel_id, SESSION_EXPIRED).await;
            return;
        }

        let destination = NewDestination {
            channel_id: message.channel_id.clone(),
            guild_id: message.guild_id.clone(),
            label: message.channel_label.clone(),
        };

        match session.advance(&message.content, destination) {
            Advance::Prompt(prompt) => {
                self.send(&message.channel_id, prompt).await;
            }
            Advance::Complete(registration) => {
                // The session ends here whatever the persistence outcome.
                *guard = None;
                let reply = self.persist(&registration);
                self.send(&registration.destination.channel_id, &reply).await;
                drop(guard);
                self.sessions.release(&message.author_id, &slot);
            }
        }
    }

    fn persist(&self, registration: &Registration) -> String {
        let destination_id = match self.registry.upsert_destination(&registration.destination) {
            Ok(id) => id,
            Err(e) => {
                error!("Failed to insert destination: {}", e);
                return format!("❌ Failed to register channel: {}", e);
            }
        };

        let feed = FeedConfig::new(
            registration.url.clone(),
            registration.format.clone(),
            destination_id,
        );

        match self.registry.insert_feed(&feed) {
            Ok(true) => {
                info!("Feed added: {}", registration.url);
                FEED_ADDED.to_string()
            }
            Ok(false) => {
                info!("Feed already registered: {}", registration.url);
                FEED_EXISTS.to_string()
            }
            Err(e) => {
                error!("Failed to insert feed: {}", e);
                format!("❌ Failed to save feed: {}", e)
            }
        }
    }

    async fn send(&self, channel_id: &str, content: &str) {
        if let Err(e) = self.replier.reply(channel_id, content).await {
            error!("Failed to reply in channel {}: {}", channel_id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DEFAULT_FORMAT;
    use crate::schema::{Bootstrapper, DEFAULT_SCHEMA};
    use crate::store::{FeedCatalog, SqliteStore};
    use crate::test_support::{FailingRegistry, RecordingReplier};

    const OWNER: &str = "owner-1";

    fn store() -> Arc<SqliteStore> {
        let store = SqliteStore::in_memory().unwrap();
        Bootstrapper::new(DEFAULT_SCHEMA).run(&store).unwrap();
        Arc::new(store)
    }

    fn router(
        registry: Arc<dyn FeedRegistry + Send + Sync>,
        replier: Arc<RecordingReplier>,
    ) -> Router {
        Router::new(OWNER, registry, replier, Duration::from_secs(600))
    }

    fn from(user: &str, content: &str) -> InboundMessage {
        let mut message = InboundMessage::new(user, "chan-1", content);
        message.channel_label = "news".into();
        message
    }

    #[test]
    fn test_command_parse_is_prefix_matched() {
        assert_eq!(Command::parse("!ping"), Some(Command::Ping));
        assert_eq!(Command::parse("  !rssadd now"), Some(Command::AddFeed));
        assert_eq!(Command::parse("ping"), None);
        assert_eq!(Command::parse("https://example.com"), None);
    }

    #[tokio::test]
    async fn test_ping() {
        let replier = Arc::new(RecordingReplier::default());
        let router = router(store(), replier.clone());

        router.handle(&from("anyone", "!ping")).await;
        assert_eq!(replier.replies(), vec![("chan-1".to_string(), PONG.to_string())]);
    }

    #[tokio::test]
    async fn test_owner_registration_with_default_format() {
        let store = store();
        let replier = Arc::new(RecordingReplier::default());
        let router = router(store.clone(), replier.clone());

        router.handle(&from(OWNER, "!rssadd")).await;
        router.handle(&from(OWNER, "https://example.com/feed.xml")).await;
        router.handle(&from(OWNER, "skip")).await;

        let texts: Vec<String> = replier.replies().into_iter().map(|(_, t)| t).collect();
        assert_eq!(texts, vec![PROMPT_URL, PROMPT_FORMAT, FEED_ADDED]);

        let feeds = store.active_feeds().unwrap();
        assert_eq!(feeds.len(), 1);
        assert_eq!(feeds[0].url, "https://example.com/feed.xml");
        assert_eq!(feeds[0].format, DEFAULT_FORMAT);
        assert!(feeds[0].active);

        let destination = store.destination(feeds[0].destination_id.unwrap()).unwrap().unwrap();
        assert_eq!(destination.channel_id, "chan-1");
        assert_eq!(destination.label, "news");
        assert!(router.sessions().is_empty());
    }

    #[tokio::test]
    async fn test_owner_registration_with_custom_format() {
        let store = store();
        let replier = Arc::new(RecordingReplier::default());
        let router = router(store.clone(), replier.clone());

        router.handle(&from(OWNER, "!rssadd")).await;
        router.handle(&from(OWNER, "https://example.com/feed.xml")).await;
        router.handle(&from(OWNER, "{{.Title}} by {{.Author}}")).await;

        assert_eq!(store.active_feeds().unwrap()[0].format, "{{.Title}} by {{.Author}}");
    }

    #[tokio::test]
    async fn test_non_owner_is_rejected_without_session() {
        let store = store();
        let replier = Arc::new(RecordingReplier::default());
        let router = router(store.clone(), replier.clone());

        router.handle(&from("intruder", "!rssadd")).await;
        router.handle(&from("intruder", "https://example.com/feed.xml")).await;

        assert_eq!(
            replier.replies(),
            vec![("chan-1".to_string(), NOT_AUTHORIZED.to_string())]
        );
        assert!(router.sessions().existing("intruder").is_none());
        assert!(store.active_feeds().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_messages_without_session_are_ignored() {
        let replier = Arc::new(RecordingReplier::default());
        let router = router(store(), replier.clone());

        router.handle(&from(OWNER, "hello there")).await;
        assert!(replier.replies().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_registration_is_reported() {
        let store = store();
        let replier = Arc::new(RecordingReplier::default());
        let router = router(store.clone(), replier.clone());

        for _ in 0..2 {
            router.handle(&from(OWNER, "!rssadd")).await;
            router.handle(&from(OWNER, "https://example.com/feed.xml")).await;
            router.handle(&from(OWNER, "skip")).await;
        }

        assert_eq!(replier.replies().last().unwrap().1, FEED_EXISTS);
        assert_eq!(store.active_feeds().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_persistence_failure_is_reported_and_session_discarded() {
        let replier = Arc::new(RecordingReplier::default());
        let router = router(Arc::new(FailingRegistry), replier.clone());

        router.handle(&from(OWNER, "!rssadd")).await;
        router.handle(&from(OWNER, "https://example.com/feed.xml")).await;
        router.handle(&from(OWNER, "skip")).await;

        let last = replier.replies().last().unwrap().1.clone();
        assert!(last.starts_with("❌ Failed to register channel:"));
        assert!(router.sessions().existing(OWNER).is_none());

        router.handle(&from(OWNER, "skip")).await;
        assert_eq!(replier.replies().len(), 3);
    }

    #[tokio::test]
    async fn test_expired_session_is_discarded() {
        let store = store();
        let replier = Arc::new(RecordingReplier::default());
        let router = Router::new(OWNER, store.clone(), replier.clone(), Duration::ZERO);

        router.handle(&from(OWNER, "!rssadd")).await;
        router.handle(&from(OWNER, "https://example.com/feed.xml")).await;

        assert_eq!(replier.replies().last().unwrap().1, SESSION_EXPIRED);
        assert!(router.sessions().is_empty());
        assert!(store.active_feeds().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_restart_replaces_session() {
        let store = store();
        let replier = Arc::new(RecordingReplier::default());
        let router = router(store.clone(), replier.clone());

        router.handle(&from(OWNER, "!rssadd")).await;
        router.handle(&from(OWNER, "https://old.example/feed.xml")).await;
        router.handle(&from(OWNER, "!rssadd")).await;
        router.handle(&from(OWNER, "https://new.example/feed.xml")).await;
        router.handle(&from(OWNER, "skip")).await;

        let feeds = store.active_feeds().unwrap();
        assert_eq!(feeds.len(), 1);
        assert_eq!(feeds[0].url, "https://new.example/feed.xml");
    }
}
