use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

/// Extension elements of an entry: namespace -> key -> values.
pub type Extensions = BTreeMap<String, BTreeMap<String, Vec<String>>>;

/// One entry of a fetched feed, as seen by the renderer and the ledger.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedEntry {
    pub guid: String,
    pub title: String,
    pub link: String,
    pub description: String,
    pub published: Option<DateTime<Utc>>,
    pub author: Option<String>,
    pub extensions: Extensions,
}

impl FeedEntry {
    pub fn new(guid: impl Into<String>) -> Self {
        Self {
            guid: guid.into(),
            ..Self::default()
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.link = link.into();
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn with_extension(
        mut self,
        namespace: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.push_extension(namespace, key, value);
        self
    }

    pub fn push_extension(
        &mut self,
        namespace: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<String>,
    ) {
        self.extensions
            .entry(namespace.into())
            .or_default()
            .entry(key.into())
            .or_default()
            .push(value.into());
    }

    /// Derive a stable guid for entries whose source provides neither an id nor a link.
    pub fn fallback_guid(title: &str, published: Option<DateTime<Utc>>) -> String {
        let mut hasher = Sha256::new();
        hasher.update(title.as_bytes());
        if let Some(published) = published {
            hasher.update(published.to_rfc3339().as_bytes());
        }
        hex::encode(hasher.finalize())
    }

    pub fn display_title(&self) -> &str {
        if self.title.is_empty() {
            "(Untitled)"
        } else {
            &self.title
        }
    }
}
