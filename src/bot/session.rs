//! Feed registration sessions.
//!
//! A session walks an owner through two replies: the feed URL, then an
//! optional format. Sessions are keyed by user id; each key has its own async
//! lock so that one user's messages are applied one at a time.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::Mutex as AsyncMutex;

use crate::domain::{NewDestination, DEFAULT_FORMAT};

pub const DEFAULT_SESSION_TIMEOUT_SECS: u64 = 10 * 60;

pub const PROMPT_URL: &str = "Please send the RSS feed URL:";
pub const PROMPT_FORMAT: &str =
    "Feed URL received. Send a custom format or type 'skip' to use default:";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationStep {
    AwaitingUrl,
    AwaitingFormat,
}

/// Everything needed to persist a new feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub url: String,
    pub format: String,
    pub destination: NewDestination,
}

/// Result of feeding one reply into a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advance {
    /// The session continues; send this prompt.
    Prompt(&'static str),
    /// All data collected.
    Complete(Registration),
}

#[derive(Debug, Clone)]
pub struct RegistrationSession {
    step: RegistrationStep,
    url: String,
    format: String,
    destination: NewDestination,
    last_activity: Instant,
}

impl Default for RegistrationSession {
    fn default() -> Self {
        Self::new()
    }
}

impl RegistrationSession {
    pub fn new() -> Self {
        Self {
            step: RegistrationStep::AwaitingUrl,
            url: String::new(),
            format: String::new(),
            destination: NewDestination::default(),
            last_activity: Instant::now(),
        }
    }

    pub fn step(&self) -> RegistrationStep {
        self.step
    }

    pub fn is_expired_at(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.last_activity) >= ttl
    }

    /// Apply a reply. `destination` is the channel the reply came from.
    pub fn advance(&mut self, content: &str, destination: NewDestination) -> Advance {
        self.last_activity = Instant::now();

        match self.step {
            RegistrationStep::AwaitingUrl => {
                self.url = content.trim().to_string();
                self.destination = destination;
                self.format = DEFAULT_FORMAT.to_string();
                self.step = RegistrationStep::AwaitingFormat;
                Advance::Prompt(PROMPT_FORMAT)
            }
            RegistrationStep::AwaitingFormat => {
                if !content.trim().eq_ignore_ascii_case("skip") {
                    self.format = content.to_string();
                }
                Advance::Complete(Registration {
                    url: self.url.clone(),
                    format: self.format.clone(),
                    destination: self.destination.clone(),
                })
            }
        }
    }
}

pub type SessionSlot = Arc<AsyncMutex<Option<RegistrationSession>>>;

/// Registration sessions keyed by user id.
pub struct SessionStore {
    ttl: Duration,
    slots: Mutex<HashMap<String, SessionSlot>>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_SESSION_TIMEOUT_SECS))
    }
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn slots(&self) -> std::sync::MutexGuard<'_, HashMap<String, SessionSlot>> {
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Slot for `user_id`, created empty if absent.
    pub fn slot(&self, user_id: &str) -> SessionSlot {
        self.slots()
            .entry(user_id.to_string())
            .or_default()
            .clone()
    }

    /// Slot for `user_id` only if one exists.
    pub fn existing(&self, user_id: &str) -> Option<SessionSlot> {
        self.slots().get(user_id).cloned()
    }

    /// Drop the slot if it is still the one the caller worked on.
    pub fn release(&self, user_id: &str, slot: &SessionSlot) {
        let mut slots = self.slots();
        if slots.get(user_id).is_some_and(|current| Arc::ptr_eq(current, slot)) {
            slots.remove(user_id);
        }
    }

    /// Start (or restart) a session for `user_id`.
    pub async fn begin(&self, user_id: &str) {
        let slot = self.slot(user_id);
        let mut session = slot.lock().await;
        *session = Some(RegistrationSession::new());
    }

    /// Remove sessions idle for longer than the timeout. Returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let ttl = self.ttl;
        let mut slots = self.slots();
        let before = slots.len();

        slots.retain(|_, slot| match slot.try_lock() {
            Ok(session) => session
                .as_ref()
                .is_some_and(|s| !s.is_expired_at(now, ttl)),
            // Busy slots are in use right now.
            Err(_) => true,
        });

        before - slots.len()
    }

    pub fn len(&self) -> usize {
        self.slots().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel() -> NewDestination {
        NewDestination {
            channel_id: "c-1".into(),
            guild_id: "g-1".into(),
            label: "news".into(),
        }
    }

    #[test]
    fn test_url_then_skip_keeps_default_format() {
        let mut session = RegistrationSession::new();
        assert_eq!(session.step(), RegistrationStep::AwaitingUrl);

        let prompt = session.advance(" https://example.com/feed.xml ", channel());
        assert_eq!(prompt, Advance::Prompt(PROMPT_FORMAT));
        assert_eq!(session.step(), RegistrationStep::AwaitingFormat);

        match session.advance("SKIP", channel()) {
            Advance::Complete(registration) => {
                assert_eq!(registration.url, "https://example.com/feed.xml");
                assert_eq!(registration.format, DEFAULT_FORMAT);
                assert_eq!(registration.destination, channel());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_custom_format_is_stored_verbatim() {
        let mut session = RegistrationSession::new();
        session.advance("https://example.com/feed.xml", channel());

        match session.advance("{{.Title}}\nField: By={{.Author}}", channel()) {
            Advance::Complete(registration) => {
                assert_eq!(registration.format, "{{.Title}}\nField: By={{.Author}}");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_destination_comes_from_url_step() {
        let mut session = RegistrationSession::new();
        session.advance("https://example.com/feed.xml", channel());

        match session.advance("skip", NewDestination::new("elsewhere")) {
            Advance::Complete(registration) => assert_eq!(registration.destination, channel()),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_expiry() {
        let session = RegistrationSession::new();
        let ttl = Duration::from_secs(60);
        assert!(!session.is_expired_at(Instant::now(), ttl));
        assert!(session.is_expired_at(Instant::now() + Duration::from_secs(61), ttl));
    }

    #[test]
    fn test_begin_and_release() {
        let store = SessionStore::default();
        tokio_test::block_on(store.begin("owner"));
        assert_eq!(store.len(), 1);

        let slot = store.existing("owner").unwrap();
        assert!(tokio_test::block_on(slot.lock()).is_some());

        store.release("owner", &slot);
        assert!(store.existing("owner").is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_release_ignores_replaced_slot() {
        let store = SessionStore::default();
        let stale = store.slot("owner");
        store.release("owner", &stale);
        let fresh = store.slot("owner");

        store.release("owner", &stale);
        assert!(store.existing("owner").is_some_and(|s| Arc::ptr_eq(&s, &fresh)));
    }

    #[test]
    fn test_purge_expired() {
        let store = SessionStore::new(Duration::ZERO);
        tokio_test::block_on(store.begin("a"));
        tokio_test::block_on(store.begin("b"));

        assert_eq!(store.purge_expired(), 2);
        assert!(store.is_empty());

        let lasting = SessionStore::new(Duration::from_secs(600));
        tokio_test::block_on(lasting.begin("a"));
        assert_eq!(lasting.purge_expired(), 0);
    }
}
