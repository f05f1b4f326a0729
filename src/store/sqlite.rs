use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, info};

use crate::app::{Result, RunnelError};
use crate::domain::{Destination, FeedConfig, FeedOverview, NewDestination, SentRecord};
use crate::store::{FeedCatalog, FeedRegistry, Ledger, SchemaCatalog};

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening database at {:?}", path);

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    pub fn in_memory() -> Result<Self> {
        debug!("Opening in-memory database");
        Self::from_connection(Connection::open_in_memory()?)
    }

    /// Open a store from a connection string.
    ///
    /// Accepts `sqlite::memory:`, `:memory:`, `sqlite://<path>`, `sqlite:<path>`
    /// or a bare filesystem path.
    pub fn connect(url: &str) -> Result<Self> {
        let url = url.trim();
        if url.is_empty() {
            return Err(RunnelError::Config("empty database connection string".into()));
        }

        let location = url
            .strip_prefix("sqlite://")
            .or_else(|| url.strip_prefix("sqlite:"))
            .unwrap_or(url);

        match location {
            ":memory:" | "memory:" | "" => Self::in_memory(),
            path => Self::new(path),
        }
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON")?;
        let _: i64 = conn.query_row("PRAGMA busy_timeout = 5000", [], |row| row.get(0))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| RunnelError::LockPoisoned)
    }

    fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
            .or_else(|| {
                NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                    .ok()
                    .map(|naive| naive.and_utc())
            })
    }

    fn feed_from_row(row: &Row<'_>) -> rusqlite::Result<FeedConfig> {
        Ok(FeedConfig {
            id: row.get(0)?,
            url: row.get(1)?,
            format: row.get(2)?,
            destination_id: row.get(3)?,
            active: row.get::<_, i64>(4)? != 0,
            created_at: row
                .get::<_, String>(5)
                .ok()
                .and_then(|s| Self::parse_datetime(&s))
                .unwrap_or_else(Utc::now),
        })
    }

    /// Delivered entries of a feed, most recent first.
    pub fn sent_records(&self, feed_id: i64, limit: usize) -> Result<Vec<SentRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT feed_id, guid, title, sent_at FROM sent_items
             WHERE feed_id = ?1 ORDER BY id DESC LIMIT ?2",
        )?;

        let records = stmt
            .query_map(params![feed_id, limit as i64], |row| {
                Ok(SentRecord {
                    feed_id: row.get(0)?,
                    guid: row.get(1)?,
                    title: row.get(2)?,
                    sent_at: row
                        .get::<_, String>(3)
                        .ok()
                        .and_then(|s| Self::parse_datetime(&s))
                        .unwrap_or_else(Utc::now),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(records)
    }
}

impl SchemaCatalog for SqliteStore {
    fn table_exists(&self, name: &str) -> Result<bool> {
        let conn = self.conn()?;
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1 COLLATE NOCASE)",
            params![name],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    fn execute_batch(&self, sql: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute_batch(sql)?;
        Ok(())
    }
}

impl Ledger for SqliteStore {
    fn has_been_sent(&self, feed_id: i64, guid: &str) -> Result<bool> {
        let conn = self.conn()?;
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM sent_items WHERE feed_id = ?1 AND guid = ?2)",
            params![feed_id, guid],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    fn record_sent(&self, feed_id: i64, guid: &str, title: &str) -> Result<bool> {
        let conn = self.conn()?;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO sent_items (feed_id, guid, title, sent_at) VALUES (?1, ?2, ?3, ?4)",
            params![feed_id, guid, title, Utc::now().to_rfc3339()],
        )?;
        Ok(inserted > 0)
    }
}

impl FeedCatalog for SqliteStore {
    fn active_feeds(&self) -> Result<Vec<FeedConfig>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, url, format, destination_id, active, created_at
             FROM feeds WHERE active = 1",
        )?;

        let feeds = stmt
            .query_map([], Self::feed_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(feeds)
    }

    fn destination(&self, id: i64) -> Result<Option<Destination>> {
        let conn = self.conn()?;
        let result = conn
            .query_row(
                "SELECT id, channel_id, guild_id, name FROM destinations WHERE id = ?1",
                params![id],
                |row| {
                    Ok(Destination {
                        id: row.get(0)?,
                        channel_id: row.get(1)?,
                        guild_id: row.get(2)?,
                        label: row.get(3)?,
                    })
                },
            )
            .optional()?;

        Ok(result)
    }

    fn feed_overviews(&self) -> Result<Vec<FeedOverview>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT f.id, f.url, f.format, f.destination_id, f.active, f.created_at,
                    d.channel_id, d.name,
                    (SELECT COUNT(*) FROM sent_items s WHERE s.feed_id = f.id)
             FROM feeds f
             LEFT JOIN destinations d ON d.id = f.destination_id
             ORDER BY f.id",
        )?;

        let overviews = stmt
            .query_map([], |row| {
                Ok(FeedOverview {
                    feed: Self::feed_from_row(row)?,
                    channel_id: row.get(6)?,
                    label: row.get(7)?,
                    sent_count: row.get(8)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(overviews)
    }
}

impl FeedRegistry for SqliteStore {
    fn upsert_destination(&self, destination: &NewDestination) -> Result<i64> {
        let conn = self.conn()?;
        let id: i64 = conn.query_row(
            "INSERT INTO destinations (channel_id, guild_id, name, created_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(channel_id) DO UPDATE SET name = excluded.name, guild_id = excluded.guild_id
             RETURNING id",
            params![
                destination.channel_id,
                destination.guild_id,
                destination.label,
                Utc::now().to_rfc3339()
            ],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    fn insert_feed(&self, feed: &FeedConfig) -> Result<bool> {
        let conn = self.conn()?;
        let inserted = conn.execute(
            "INSERT INTO feeds (url, format, destination_id, active, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT DO NOTHING",
            params![
                feed.url,
                feed.format,
                feed.destination_id,
                feed.active as i64,
                feed.created_at.to_rfc3339()
            ],
        )?;
        Ok(inserted > 0)
    }
}
