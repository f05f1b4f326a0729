//! # Runnel
//!
//! A Discord bot that posts new RSS/Atom entries to channels.
//!
//! ## Architecture
//!
//! ```text
//! Store → Poller → Fetcher → Normalizer → Ledger filter → Renderer → Discord
//! Discord → Listener → Router → Registration session → Store
//! ```
//!
//! - [`schema`]: converges the database to the declared tables at startup
//! - [`poller`]: timer loop delivering entries not yet in the ledger
//! - [`render`]: `{{.Key}}` templates into embed description and fields
//! - [`bot`]: `!ping` and the owner-only `!rssadd` registration flow
//! - [`transport`]: Discord REST adapter and inbound message listener
//!
//! ## Quick Start
//!
//! ```bash
//! export DATABASE_URL=sqlite://runnel.db
//! export DISCORD_TOKEN=...
//! export DISCORD_OWNER_ID=...
//!
//! # Create tables
//! runnel bootstrap
//!
//! # Check how a feed would look
//! runnel preview https://blog.rust-lang.org/feed.xml
//!
//! # Start the bot
//! runnel run
//! ```

/// Application context and error handling.
///
/// The [`AppContext`](app::AppContext) struct wires together the store, the
/// feed source and configuration, and builds the poller and router.
pub mod app;

/// Owner-only feed registration over chat.
///
/// - [`Router`](bot::Router): dispatches `!ping`, `!rssadd` and session replies
/// - [`SessionStore`](bot::SessionStore): per-user sessions with idle expiry
pub mod bot;

/// Command-line interface using clap.
///
/// - `run` - poll feeds and listen for commands
/// - `bootstrap` - create missing tables
/// - `feeds` - list registered feeds
/// - `preview <url>` - render a feed without posting
pub mod cli;

/// Configuration management.
///
/// Loads from `~/.config/runnel/config.toml`; secrets come from the
/// environment via [`Credentials`](config::Credentials).
pub mod config;

/// Core domain models.
///
/// - [`FeedConfig`](domain::FeedConfig): a registered feed and its template
/// - [`Destination`](domain::Destination): the channel entries are posted to
/// - [`FeedEntry`](domain::FeedEntry): one normalized feed entry
/// - [`SentRecord`](domain::SentRecord): ledger row for a delivered entry
pub mod domain;

/// HTTP fetching of feed documents.
pub mod fetcher;

pub mod logging;

/// Feed parsing and normalization.
///
/// Converts RSS 0.9x/1.0/2.0, Atom 0.3/1.0, and JSON Feed 1.0
/// into [`FeedEntry`](domain::FeedEntry) values.
pub mod normalizer;

pub mod poller;

pub mod render;

pub mod schema;

/// SQLite persistence behind narrow capability traits.
///
/// - [`Ledger`](store::Ledger), [`FeedCatalog`](store::FeedCatalog),
///   [`FeedRegistry`](store::FeedRegistry), [`SchemaCatalog`](store::SchemaCatalog)
/// - [`SqliteStore`](store::SqliteStore): SQLite implementation of all four
pub mod store;

pub mod transport;

#[cfg(test)]
mod test_support;
