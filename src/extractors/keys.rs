//! Rotating decryption keys published by third parties.
//!
//! A single background task owns the refresh loop and writes the latest key
//! behind a lock. Readers take a snapshot and never wait on the network.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::ScrapeError;

const MIN_BACKOFF: Duration = Duration::from_secs(5);

#[async_trait::async_trait]
pub trait KeySource: Send + Sync + 'static {
    type Key: Clone + Send + Sync + 'static;

    fn name(&self) -> &'static str;

    async fn load(&self) -> Result<Self::Key, ScrapeError>;
}

pub struct KeyRotation<K> {
    current: Arc<RwLock<Option<K>>>,
    task: Option<JoinHandle<()>>,
}

impl<K: Clone + Send + Sync + 'static> KeyRotation<K> {
    /// Starts the refresh loop. The first load happens immediately.
    ///
    /// A failed load is retried with doubling backoff, capped at `refresh`,
    /// while readers keep the last good key.
    pub fn spawn<S>(source: S, refresh: Duration) -> Self
    where
        S: KeySource<Key = K>,
    {
        let current = Arc::new(RwLock::new(None));
        let slot = Arc::clone(&current);
        let refresh = refresh.max(MIN_BACKOFF);

        let task = tokio::spawn(async move {
            let mut backoff = MIN_BACKOFF;
            loop {
                match source.load().await {
                    Ok(key) => {
                        let first = slot.read().await.is_none();
                        *slot.write().await = Some(key);
                        if first {
                            info!(source = source.name(), "Decryption key loaded");
                        } else {
                            debug!(source = source.name(), "Decryption key refreshed");
                        }
                        backoff = MIN_BACKOFF;
                        tokio::time::sleep(refresh).await;
                    }
                    Err(e) => {
                        warn!(
                            source = source.name(),
                            error = %e,
                            retry_in_secs = backoff.as_secs(),
                            "Failed to refresh decryption key"
                        );
                        tokio::time::sleep(backoff).await;
                        backoff = (backoff * 2).min(refresh);
                    }
                }
            }
        });

        Self {
            current,
            task: Some(task),
        }
    }

    /// A key that never changes.
    #[must_use]
    pub fn fixed(key: K) -> Self {
        Self {
            current: Arc::new(RwLock::new(Some(key))),
            task: None,
        }
    }

    /// No key at all; every reader sees `None`.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            current: Arc::new(RwLock::new(None)),
            task: None,
        }
    }

    pub async fn current(&self) -> Option<K> {
        self.current.read().await.clone()
    }
}

impl<K> Drop for KeyRotation<K> {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
