use chrono::Utc;
use feed_rs::model::{Category, Entry, MediaObject, Person};
use feed_rs::parser;
use html_escape::decode_html_entities;

use crate::app::{Result, RunnelError};
use crate::domain::FeedEntry;

/// Namespace under which Media RSS data is exposed to templates.
pub const MEDIA_NAMESPACE: &str = "media";
/// Dublin Core elements (`dc:creator`, `dc:date`, `dc:subject`).
pub const DC_NAMESPACE: &str = "dc";
/// RSS content module (`content:encoded`).
pub const CONTENT_NAMESPACE: &str = "content";

#[derive(Clone)]
pub struct Normalizer;

impl Default for Normalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Normalizer {
    pub fn new() -> Self {
        Self
    }

    /// Parse an RSS, Atom or JSON Feed document into entries, in document order.
    pub fn normalize(&self, body: &[u8]) -> Result<Vec<FeedEntry>> {
        let feed = parser::parse(body).map_err(|e| RunnelError::FeedParse(e.to_string()))?;
        Ok(feed.entries.into_iter().map(Self::entry).collect())
    }

    fn entry(entry: Entry) -> FeedEntry {
        let title = entry
            .title
            .map(|t| decode_html_entities(&t.content).to_string())
            .unwrap_or_default();
        let link = entry
            .links
            .first()
            .map(|l| l.href.clone())
            .unwrap_or_default();
        let published = entry
            .published
            .or(entry.updated)
            .map(|dt| dt.with_timezone(&Utc));

        let guid = if !entry.id.is_empty() {
            entry.id.clone()
        } else if !link.is_empty() {
            link.clone()
        } else {
            FeedEntry::fallback_guid(&title, published)
        };

        let mut normalized = FeedEntry {
            guid,
            title,
            link,
            description: entry
                .summary
                .map(|s| decode_html_entities(&s.content).to_string())
                .unwrap_or_default(),
            published,
            author: entry
                .authors
                .first()
                .map(|a| a.name.clone())
                .filter(|name| !name.is_empty()),
            ..FeedEntry::default()
        };

        Self::dublin_core_extensions(&mut normalized, &entry.authors, &entry.categories);
        if let Some(body) = entry.content.as_ref().and_then(|c| c.body.as_ref()) {
            normalized.push_extension(CONTENT_NAMESPACE, "encoded", body.clone());
        }
        for media in &entry.media {
            Self::media_extensions(&mut normalized, media);
        }

        normalized
    }

    fn dublin_core_extensions(entry: &mut FeedEntry, authors: &[Person], categories: &[Category]) {
        for author in authors.iter().filter(|a| !a.name.is_empty()) {
            entry.push_extension(DC_NAMESPACE, "creator", author.name.clone());
        }
        if let Some(published) = entry.published {
            entry.push_extension(DC_NAMESPACE, "date", published.to_rfc3339());
        }
        for category in categories.iter().filter(|c| !c.term.is_empty()) {
            entry.push_extension(DC_NAMESPACE, "subject", category.term.clone());
        }
    }

    fn media_extensions(entry: &mut FeedEntry, media: &MediaObject) {
        if let Some(title) = &media.title {
            entry.push_extension(MEDIA_NAMESPACE, "title", title.content.clone());
        }
        if let Some(description) = &media.description {
            entry.push_extension(MEDIA_NAMESPACE, "description", description.content.clone());
        }
        for thumbnail in &media.thumbnails {
            entry.push_extension(MEDIA_NAMESPACE, "thumbnail", thumbnail.image.uri.clone());
        }
        for content in &media.content {
            if let Some(url) = &content.url {
                entry.push_extension(MEDIA_NAMESPACE, "content", url.to_string());
            }
        }
        for credit in &media.credits {
            entry.push_extension(MEDIA_NAMESPACE, "credit", credit.entity.clone());
        }
    }
}
