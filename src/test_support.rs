//! Fakes shared by unit tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use crate::app::{Result, RunnelError};
use crate::domain::{Destination, FeedConfig, FeedEntry, NewDestination};
use crate::fetcher::FeedSource;
use crate::render::RenderedEntry;
use crate::store::FeedRegistry;
use crate::transport::{DeliverySink, Replier};

/// Records every reply as `(channel_id, content)`.
#[derive(Default)]
pub struct RecordingReplier {
    replies: Mutex<Vec<(String, String)>>,
}

impl RecordingReplier {
    pub fn replies(&self) -> Vec<(String, String)> {
        self.replies.lock().unwrap().clone()
    }
}

#[async_trait]
impl Replier for RecordingReplier {
    async fn reply(&self, channel_id: &str, content: &str) -> Result<()> {
        self.replies
            .lock()
            .unwrap()
            .push((channel_id.to_string(), content.to_string()));
        Ok(())
    }
}

/// Registry whose writes always fail.
pub struct FailingRegistry;

impl FeedRegistry for FailingRegistry {
    fn upsert_destination(&self, _destination: &NewDestination) -> Result<i64> {
        Err(RunnelError::Config("database is read-only".into()))
    }

    fn insert_feed(&self, _feed: &FeedConfig) -> Result<bool> {
        Err(RunnelError::Config("database is read-only".into()))
    }
}

/// Serves canned entries per URL; unknown URLs fail like a dead host.
#[derive(Default)]
pub struct StaticSource {
    feeds: Mutex<HashMap<String, Vec<FeedEntry>>>,
}

impl StaticSource {
    pub fn with_feed(self, url: &str, entries: Vec<FeedEntry>) -> Self {
        self.set(url, entries);
        self
    }

    pub fn set(&self, url: &str, entries: Vec<FeedEntry>) {
        self.feeds.lock().unwrap().insert(url.to_string(), entries);
    }
}

#[async_trait]
impl FeedSource for StaticSource {
    async fn fetch_entries(&self, url: &str) -> Result<Vec<FeedEntry>> {
        self.feeds
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| RunnelError::Transport(format!("connection refused: {}", url)))
    }
}

/// Collects deliveries; channels listed in `failing` reject them.
#[derive(Default)]
pub struct RecordingSink {
    delivered: Mutex<Vec<(String, RenderedEntry)>>,
    failing: Mutex<Vec<String>>,
}

impl RecordingSink {
    pub fn fail_channel(&self, channel_id: &str) {
        self.failing.lock().unwrap().push(channel_id.to_string());
    }

    pub fn heal(&self) {
        self.failing.lock().unwrap().clear();
    }

    pub fn delivered(&self) -> Vec<(String, RenderedEntry)> {
        self.delivered.lock().unwrap().clone()
    }
}

#[async_trait]
impl DeliverySink for RecordingSink {
    async fn deliver(&self, destination: &Destination, entry: &RenderedEntry) -> Result<()> {
        if self.failing.lock().unwrap().contains(&destination.channel_id) {
            return Err(RunnelError::Transport("Discord returned 503".into()));
        }
        self.delivered
            .lock()
            .unwrap()
            .push((destination.channel_id.clone(), entry.clone()));
        Ok(())
    }
}

/// Minimal HTTP/1.1 server on a loopback port. `route` maps a request line
/// (`GET /path?query HTTP/1.1`) to a status and JSON body.
pub struct FakeHttp {
    pub base: String,
    requests: Arc<Mutex<Vec<String>>>,
}

impl FakeHttp {
    pub async fn start<F>(route: F) -> Self
    where
        F: Fn(&str) -> (u16, String) + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let requests = Arc::new(Mutex::new(Vec::new()));
        let route = Arc::new(route);

        let seen = requests.clone();
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                let seen = seen.clone();
                let route = route.clone();
                tokio::spawn(async move {
                    Self::respond(socket, seen, &*route).await;
                });
            }
        });

        Self { base, requests }
    }

    async fn respond<F>(mut socket: TcpStream, seen: Arc<Mutex<Vec<String>>>, route: &F)
    where
        F: Fn(&str) -> (u16, String),
    {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        let header_end = loop {
            let n = socket.read(&mut chunk).await.unwrap_or(0);
            if n == 0 {
                return;
            }
            buf.extend_from_slice(&chunk[..n]);
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
        };

        let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
        let content_length = head
            .lines()
            .filter_map(|line| line.split_once(':'))
            .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
            .and_then(|(_, value)| value.trim().parse::<usize>().ok())
            .unwrap_or(0);
        while buf.len() < header_end + content_length {
            let n = socket.read(&mut chunk).await.unwrap_or(0);
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
        }

        let line = head.lines().next().unwrap_or_default().to_string();
        let (status, body) = route(&line);
        seen.lock().unwrap().push(line);

        let response = format!(
            "HTTP/1.1 {} Fake\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        );
        let _ = socket.write_all(response.as_bytes()).await;
        let _ = socket.shutdown().await;
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}
