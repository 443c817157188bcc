//! Persistent priority queue of scrape jobs plus the worker pool draining it.
//!
//! Delivery is at-least-once: a job is only deleted after its handler
//! returns, and jobs left `running` by a dead process are re-queued on start.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::QueueConfig;
use crate::db::{Enqueued, QueueCounts, Store};
use crate::entities::scrape_jobs;

/// Lower runs first.
pub mod priority {
    pub const MANUAL: i32 = 1;
    pub const NEW_ANIME: i32 = 2;
    pub const UNSCRAPED_FINISHED: i32 = 3;
    pub const REFETCHED: i32 = 4;
    pub const RELEASING_CHECK: i32 = 6;
    pub const RELATION_REPAIR: i32 = 7;
    pub const ROUTINE: i32 = 8;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    /// Scrape episodes and sources for the listed anime.
    Scrape,
    /// Re-read catalog relation edges for the listed anime.
    Relations,
}

impl JobKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Scrape => "scrape",
            Self::Relations => "relations",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "scrape" => Some(Self::Scrape),
            "relations" => Some(Self::Relations),
            _ => None,
        }
    }
}

/// Queue message body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeJob {
    pub anime_ids: Vec<String>,
    #[serde(default)]
    pub info_only: bool,
}

impl ScrapeJob {
    #[must_use]
    pub const fn new(anime_ids: Vec<String>, info_only: bool) -> Self {
        Self {
            anime_ids,
            info_only,
        }
    }
}

/// `kind:infoOnly:sorted-ids`, identical for payloads that would do the same work.
#[must_use]
pub fn fingerprint(kind: JobKind, job: &ScrapeJob) -> String {
    let mut ids: Vec<&str> = job.anime_ids.iter().map(String::as_str).collect();
    ids.sort_unstable();
    ids.dedup();
    format!("{}:{}:{}", kind.as_str(), job.info_only, ids.join(","))
}

pub struct JobQueue {
    store: Store,
    config: QueueConfig,
}

impl JobQueue {
    #[must_use]
    pub const fn new(store: Store, config: QueueConfig) -> Self {
        Self { store, config }
    }

    pub async fn enqueue(&self, kind: JobKind, job: &ScrapeJob, priority: i32) -> Result<Enqueued> {
        let payload = serde_json::to_string(job)?;
        let enqueued = self
            .store
            .enqueue_job(
                kind.as_str(),
                &payload,
                &fingerprint(kind, job),
                priority,
                self.config.max_attempts,
            )
            .await?;

        debug!(
            job_id = enqueued.id,
            kind = kind.as_str(),
            priority,
            anime = job.anime_ids.len(),
            deduplicated = enqueued.deduplicated,
            "Job enqueued"
        );
        Ok(enqueued)
    }

    /// Splits `ids` into jobs of at most `batch_size` anime each.
    pub async fn enqueue_batched(
        &self,
        kind: JobKind,
        ids: &[String],
        info_only: bool,
        priority: i32,
        batch_size: usize,
    ) -> Result<usize> {
        let mut jobs = 0;
        for chunk in ids.chunks(batch_size.max(1)) {
            self.enqueue(kind, &ScrapeJob::new(chunk.to_vec(), info_only), priority)
                .await?;
            jobs += 1;
        }
        Ok(jobs)
    }

    pub async fn counts(&self) -> Result<QueueCounts> {
        self.store.queue_counts().await
    }

    pub async fn recover(&self) -> Result<u64> {
        let recovered = self.store.recover_running_jobs().await?;
        if recovered > 0 {
            info!(recovered, "Re-queued jobs left running by a previous process");
        }
        Ok(recovered)
    }

    async fn claim(&self) -> Result<Option<scrape_jobs::Model>> {
        self.store.claim_next_job().await
    }

    /// Runs one claimed job through `handler` and settles it.
    async fn settle(&self, job: scrape_jobs::Model, handler: &dyn JobHandler) -> Result<()> {
        let start = Instant::now();
        info!(event = "job_started", job_id = job.id, kind = %job.kind, priority = job.priority, attempt = job.attempts, "Scrape job started");

        let outcome = match JobKind::parse(&job.kind) {
            Some(kind) => match serde_json::from_str::<ScrapeJob>(&job.payload) {
                Ok(payload) => handler.handle(kind, &payload).await,
                Err(e) => Err(anyhow::Error::new(e).context("Malformed job payload")),
            },
            None => Err(anyhow::anyhow!("Unknown job kind {}", job.kind)),
        };

        let duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        match outcome {
            Ok(()) => {
                self.store.complete_job(job.id).await?;
                metrics::counter!("scrape_jobs_total", "outcome" => "completed").increment(1);
                info!(event = "job_finished", job_id = job.id, duration_ms, "Scrape job finished");
            }
            Err(e) => {
                let attempts = i64::from(job.attempts.max(1));
                let backoff = chrono::Duration::seconds(
                    i64::try_from(self.config.retry_backoff_secs).unwrap_or(i64::MAX / attempts)
                        * attempts,
                );
                let parked = self.store.fail_job(&job, &format!("{e:#}"), backoff).await?;
                let outcome = if parked { "failed" } else { "retried" };
                metrics::counter!("scrape_jobs_total", "outcome" => outcome).increment(1);
                error!(event = "job_failed", job_id = job.id, duration_ms, parked, error = %e, "Scrape job failed");
            }
        }
        Ok(())
    }

    /// Processes jobs on the current task until nothing is eligible.
    pub async fn drain(&self, handler: &dyn JobHandler) -> Result<usize> {
        let mut processed = 0;
        while let Some(job) = self.claim().await? {
            self.settle(job, handler).await?;
            processed += 1;
        }
        Ok(processed)
    }
}

/// Consumes one job message. Errors send the job to the retry path.
#[async_trait::async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, kind: JobKind, job: &ScrapeJob) -> Result<()>;
}

/// N worker slots polling the queue.
pub struct WorkerPool {
    queue: Arc<JobQueue>,
    handler: Arc<dyn JobHandler>,
    running: Arc<RwLock<bool>>,
}

impl WorkerPool {
    #[must_use]
    pub fn new(queue: Arc<JobQueue>, handler: Arc<dyn JobHandler>) -> Self {
        Self {
            queue,
            handler,
            running: Arc::new(RwLock::new(false)),
        }
    }

    pub async fn start(&self) -> Vec<JoinHandle<()>> {
        *self.running.write().await = true;
        let slots = self.queue.config.concurrency.max(1);
        let poll = Duration::from_millis(self.queue.config.poll_interval_ms.max(50));
        info!(slots, "Starting scrape workers");

        (0..slots)
            .map(|slot| {
                let queue = Arc::clone(&self.queue);
                let handler = Arc::clone(&self.handler);
                let running = Arc::clone(&self.running);
                tokio::spawn(async move {
                    while *running.read().await {
                        match queue.claim().await {
                            Ok(Some(job)) => {
                                if let Err(e) = queue.settle(job, handler.as_ref()).await {
                                    error!(slot, error = %e, "Failed to settle job");
                                    tokio::time::sleep(poll).await;
                                }
                            }
                            Ok(None) => tokio::time::sleep(poll).await,
                            Err(e) => {
                                warn!(slot, error = %e, "Failed to poll job queue");
                                tokio::time::sleep(poll).await;
                            }
                        }
                    }
                    debug!(slot, "Scrape worker stopped");
                })
            })
            .collect()
    }

    pub async fn stop(&self) {
        info!("Stopping scrape workers...");
        *self.running.write().await = false;
    }

    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }
}

/// Decodes a stored payload, for inspection commands.
pub fn decode_payload(job: &scrape_jobs::Model) -> Result<ScrapeJob> {
    serde_json::from_str(&job.payload).with_context(|| format!("Job {} payload", job.id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_ignores_id_order() {
        let a = ScrapeJob::new(vec!["b".to_string(), "a".to_string()], false);
        let b = ScrapeJob::new(vec!["a".to_string(), "b".to_string(), "a".to_string()], false);
        assert_eq!(fingerprint(JobKind::Scrape, &a), "scrape:false:a,b");
        assert_eq!(fingerprint(JobKind::Scrape, &a), fingerprint(JobKind::Scrape, &b));

        let info = ScrapeJob::new(vec!["a".to_string(), "b".to_string()], true);
        assert_ne!(fingerprint(JobKind::Scrape, &a), fingerprint(JobKind::Scrape, &info));
        assert_ne!(fingerprint(JobKind::Scrape, &a), fingerprint(JobKind::Relations, &a));
    }

    #[test]
    fn test_payload_wire_shape() {
        let job = ScrapeJob::new(vec!["A1".to_string()], false);
        assert_eq!(
            serde_json::to_string(&job).unwrap(),
            r#"{"animeIds":["A1"],"infoOnly":false}"#
        );
        let parsed: ScrapeJob = serde_json::from_str(r#"{"animeIds":["A1"]}"#).unwrap();
        assert!(!parsed.info_only);
    }

    #[test]
    fn test_priority_order() {
        let order = [
            priority::MANUAL,
            priority::NEW_ANIME,
            priority::UNSCRAPED_FINISHED,
            priority::REFETCHED,
            priority::RELEASING_CHECK,
            priority::RELATION_REPAIR,
            priority::ROUTINE,
        ];
        assert!(order.windows(2).all(|w| w[0] < w[1]));
    }
}
