use std::sync::Arc;

use tracing::{info, info_span};

use crate::app::error::Result;
use crate::bot::Router;
use crate::config::{format_interval, Config};
use crate::fetcher::http_fetcher::HttpFetcher;
use crate::fetcher::{FeedSource, Fetcher, HttpFeedSource};
use crate::poller::Poller;
use crate::schema::{BootstrapReport, Bootstrapper, DEFAULT_SCHEMA};
use crate::store::sqlite::SqliteStore;
use crate::transport::{DeliverySink, Replier};

/// Wires the store, feed source and configuration together.
///
/// Construction bootstraps the schema, so a context only exists once the
/// store has every table the rest of the crate relies on.
pub struct AppContext {
    pub config: Config,
    pub store: Arc<SqliteStore>,
    pub source: Arc<dyn FeedSource + Send + Sync>,
    pub bootstrap: BootstrapReport,
}

impl AppContext {
    pub fn open(config: Config, database_url: &str) -> Result<Self> {
        let store = Arc::new(SqliteStore::connect(database_url)?);
        Self::with_store(config, store)
    }

    pub fn in_memory(config: Config) -> Result<Self> {
        Self::with_store(config, Arc::new(SqliteStore::in_memory()?))
    }

    fn with_store(config: Config, store: Arc<SqliteStore>) -> Result<Self> {
        let bootstrap = Self::bootstrapper(&config)?.run(store.as_ref())?;
        if !bootstrap.is_noop() {
            info!("Created tables: {}", bootstrap.created.join(", "));
        }

        let fetcher: Arc<dyn Fetcher + Send + Sync> = Arc::new(HttpFetcher::new()?);
        let source = Arc::new(HttpFeedSource::new(fetcher));

        Ok(Self {
            config,
            store,
            source,
            bootstrap,
        })
    }

    pub fn bootstrapper(config: &Config) -> Result<Bootstrapper> {
        match &config.store.schema_path {
            Some(path) => Ok(Bootstrapper::from_file(path)?
                .with_span(info_span!("bootstrap", schema = %path.display()))),
            None => Ok(Bootstrapper::new(DEFAULT_SCHEMA)),
        }
    }

    pub fn poller(&self, sink: Arc<dyn DeliverySink + Send + Sync>) -> Poller {
        Poller::new(
            self.store.clone(),
            self.store.clone(),
            self.source.clone(),
            sink,
        )
        .with_interval(self.config.poller.interval)
        .with_poll_on_start(self.config.poller.poll_on_start)
        .with_span(info_span!(
            "poller",
            interval = %format_interval(self.config.poller.interval.as_secs())
        ))
    }

    pub fn router(&self, owner_id: &str, replier: Arc<dyn Replier + Send + Sync>) -> Router {
        Router::new(
            owner_id,
            self.store.clone(),
            replier,
            self.config.registration.session_timeout,
        )
        .with_span(info_span!("registration", owner = %owner_id))
    }
}
