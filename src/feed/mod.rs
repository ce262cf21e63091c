//! Reflected prices: a polled, authenticated odds feed.
//!
//! Each poll sends the etags of everything cached; the service answers with
//! only the items that changed, which are merged over the cache.

pub mod book;

pub use book::OddsBook;

use crate::error::FeedError;
use async_lock::RwLock;
use reqwest::Client;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

#[derive(Debug, Clone)]
pub struct FeedConfig {
    pub url: String,
    pub api_key: String,
    pub interval: Duration,
}

impl FeedConfig {
    pub fn new(url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            api_key: api_key.into(),
            interval: Duration::from_millis(30_000),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

/// Poller and cache for reflector odds.
pub struct ReflectedPrices {
    config: FeedConfig,
    client: Client,
    book: Arc<RwLock<OddsBook>>,
    /// Bumped after every successful poll.
    updates: watch::Sender<u64>,
}

impl ReflectedPrices {
    pub fn new(config: FeedConfig) -> Result<Self, FeedError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(2)
            .build()?;
        let (updates, _) = watch::channel(0);
        Ok(Self {
            config,
            client,
            book: Arc::new(RwLock::new(OddsBook::default())),
            updates,
        })
    }

    /// Current cache. Cheap: the book is shared, not copied.
    pub async fn snapshot(&self) -> OddsBook {
        self.book.read().await.clone()
    }

    pub async fn get_odds(&self, event_id: &str) -> Option<crate::pricing::EventOdds> {
        self.book.read().await.get_odds(event_id)
    }

    /// Receiver that changes after each successful poll.
    pub fn updates(&self) -> watch::Receiver<u64> {
        self.updates.subscribe()
    }

    /// One poll. Returns how many items the service sent back.
    pub async fn poll_once(&self) -> Result<usize, FeedError> {
        let etags = self.book.read().await.etags();

        let resp = self
            .client
            .post(&self.config.url)
            .bearer_auth(&self.config.api_key)
            .json(&etags)
            .send()
            .await?;

        let status = resp.status();
        if status.as_u16() != 200 {
            let body = resp.text().await.unwrap_or_default();
            return Err(FeedError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let items: Map<String, Value> = resp.json().await?;
        let count = items.len();
        self.book.write().await.merge(items);
        self.updates.send_modify(|generation| *generation += 1);

        tracing::debug!(items = count, "Reflector poll merged");
        Ok(count)
    }

    /// Poll immediately and then every interval until `shutdown` flips to
    /// true. Failures are logged and the last known odds kept.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.poll_once().await {
                        tracing::error!(error = %e, "Error hitting reflector");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::debug!("Reflector poller stopped");
    }
}
