//! Instrumented fakes shared by the integration tests.
//!
//! `ScriptedSource` plays back a per-feed script (latency plus result) and
//! records how many fetches overlap; `RecordingStore` keeps upserted articles
//! in memory and can be told to reject specific identities. A shared
//! `TaskGauge` follows each feed from fetch start to its last write.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bloghub::crawl::{
    ArticleStore, FeedEndpoint, FeedRegistry, FeedSource, FetchError, PersistError, Persisted,
    RawArticle, RegistryError,
};

pub fn endpoint(n: usize) -> FeedEndpoint {
    FeedEndpoint::from(format!("https://blog{n}.example.com/feed.xml"))
}

pub fn article(feed: &FeedEndpoint, guid: &str) -> RawArticle {
    RawArticle {
        identity: bloghub::feed::article_identity(feed, guid),
        feed: feed.clone(),
        guid: guid.to_string(),
        title: format!("Post {guid}"),
        url: Some(format!("{feed}/{guid}")),
        published: Some(1_700_000_000),
        summary: Some("Summary".to_string()),
        content: None,
        image_url: None,
    }
}

// ============================================================================
// Whole-task concurrency
// ============================================================================

/// Counts feeds with outstanding work: the fetch itself plus one unit per
/// article still waiting to be written.
#[derive(Default)]
pub struct TaskGauge {
    pending: Mutex<HashMap<FeedEndpoint, usize>>,
    max_open: AtomicUsize,
}

impl TaskGauge {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn open(&self, feed: &FeedEndpoint, units: usize) {
        let mut pending = self.pending.lock().unwrap();
        pending.insert(feed.clone(), units);
        self.max_open.fetch_max(pending.len(), Ordering::SeqCst);
    }

    fn release(&self, feed: &FeedEndpoint, units: usize) {
        let mut pending = self.pending.lock().unwrap();
        if let Some(left) = pending.get_mut(feed) {
            *left = left.saturating_sub(units);
            if *left == 0 {
                pending.remove(feed);
            }
        }
    }

    /// Highest number of feeds that were between fetch start and final write
    /// at the same instant.
    pub fn max_open(&self) -> usize {
        self.max_open.load(Ordering::SeqCst)
    }
}

// ============================================================================
// Fetch/Parse
// ============================================================================

#[derive(Clone)]
pub struct Script {
    pub delay: Duration,
    pub result: Result<Vec<RawArticle>, u16>,
}

impl Script {
    pub fn articles(delay_ms: u64, articles: Vec<RawArticle>) -> Self {
        Self {
            delay: Duration::from_millis(delay_ms),
            result: Ok(articles),
        }
    }

    pub fn status(delay_ms: u64, status: u16) -> Self {
        Self {
            delay: Duration::from_millis(delay_ms),
            result: Err(status),
        }
    }
}

#[derive(Default)]
pub struct ScriptedSource {
    scripts: HashMap<FeedEndpoint, Script>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    started: Mutex<Vec<FeedEndpoint>>,
    gauge: Option<Arc<TaskGauge>>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, endpoint: FeedEndpoint, script: Script) -> Self {
        self.scripts.insert(endpoint, script);
        self
    }

    pub fn with_gauge(mut self, gauge: Arc<TaskGauge>) -> Self {
        self.gauge = Some(gauge);
        self
    }

    /// Highest number of fetches observed running at the same instant.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Endpoints in the order their fetch began.
    pub fn started(&self) -> Vec<FeedEndpoint> {
        self.started.lock().unwrap().clone()
    }
}

#[async_trait]
impl FeedSource for ScriptedSource {
    async fn fetch(&self, endpoint: &FeedEndpoint) -> Result<Vec<RawArticle>, FetchError> {
        self.started.lock().unwrap().push(endpoint.clone());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let script = self
            .scripts
            .get(endpoint)
            .cloned()
            .unwrap_or_else(|| Script::articles(0, Vec::new()));
        let units = 1 + script.result.as_ref().map_or(0, Vec::len);
        if let Some(gauge) = &self.gauge {
            gauge.open(endpoint, units);
        }
        tokio::time::sleep(script.delay).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        if let Some(gauge) = &self.gauge {
            let done = if script.result.is_ok() { 1 } else { units };
            gauge.release(endpoint, done);
        }
        script.result.map_err(FetchError::HttpStatus)
    }
}

// ============================================================================
// Persistence
// ============================================================================

#[derive(Default)]
pub struct RecordingStore {
    articles: Mutex<HashMap<String, RawArticle>>,
    reject: HashSet<String>,
    calls: AtomicUsize,
    delay: Duration,
    gauge: Option<Arc<TaskGauge>>,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rejecting(identities: &[&str]) -> Self {
        Self {
            reject: identities.iter().map(|s| s.to_string()).collect(),
            ..Self::default()
        }
    }

    /// Every write takes `delay_ms` before it lands.
    pub fn with_delay(mut self, delay_ms: u64) -> Self {
        self.delay = Duration::from_millis(delay_ms);
        self
    }

    pub fn with_gauge(mut self, gauge: Arc<TaskGauge>) -> Self {
        self.gauge = Some(gauge);
        self
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.articles.lock().unwrap().contains_key(identity)
    }

    pub fn len(&self) -> usize {
        self.articles.lock().unwrap().len()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ArticleStore for RecordingStore {
    async fn create_or_update(&self, article: &RawArticle) -> Result<Persisted, PersistError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.delay.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(gauge) = &self.gauge {
            gauge.release(&article.feed, 1);
        }

        if self.reject.contains(&article.identity) {
            return Err(PersistError::Storage("constraint violated".into()));
        }
        let previous = self
            .articles
            .lock()
            .unwrap()
            .insert(article.identity.clone(), article.clone());
        Ok(if previous.is_some() {
            Persisted::Updated
        } else {
            Persisted::Created
        })
    }
}

// ============================================================================
// Registry
// ============================================================================

pub struct StaticRegistry(pub Result<Vec<FeedEndpoint>, String>);

#[async_trait]
impl FeedRegistry for StaticRegistry {
    async fn list_feeds(&self) -> Result<Vec<FeedEndpoint>, RegistryError> {
        self.0.clone().map_err(RegistryError::Storage)
    }
}
