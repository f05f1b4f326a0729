pub mod http_fetcher;

use std::sync::Arc;

use async_trait::async_trait;

use crate::app::Result;
use crate::domain::FeedEntry;
use crate::normalizer::Normalizer;

pub use http_fetcher::HttpFetcher;

/// Downloads raw feed documents.
#[async_trait]
pub trait Fetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

/// Produces the current entries of a feed.
#[async_trait]
pub trait FeedSource {
    async fn fetch_entries(&self, url: &str) -> Result<Vec<FeedEntry>>;
}

/// Feed source backed by a [`Fetcher`] and the feed normalizer.
pub struct HttpFeedSource {
    fetcher: Arc<dyn Fetcher + Send + Sync>,
    normalizer: Normalizer,
}

impl HttpFeedSource {
    pub fn new(fetcher: Arc<dyn Fetcher + Send + Sync>) -> Self {
        Self {
            fetcher,
            normalizer: Normalizer::new(),
        }
    }
}

#[async_trait]
impl FeedSource for HttpFeedSource {
    async fn fetch_entries(&self, url: &str) -> Result<Vec<FeedEntry>> {
        let body = self.fetcher.fetch(url).await?;
        let entries = self.normalizer.normalize(&body)?;
        tracing::debug!("Parsed {} entries from {}", entries.len(), url);
        Ok(entries)
    }
}
