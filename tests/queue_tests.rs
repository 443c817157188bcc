mod common;

use std::sync::Mutex;

use anisync::config::QueueConfig;
use anisync::services::queue::priority;
use anisync::services::{JobHandler, JobKind, JobQueue, ScrapeJob};
use common::temp_store;

/// Records the anime ids of every job it sees, in order.
#[derive(Default)]
struct Recorder {
    seen: Mutex<Vec<String>>,
    fail_on: Option<String>,
}

#[async_trait::async_trait]
impl JobHandler for Recorder {
    async fn handle(&self, _kind: JobKind, job: &ScrapeJob) -> anyhow::Result<()> {
        let id = job.anime_ids.join(",");
        self.seen.lock().unwrap().push(id.clone());
        if self.fail_on.as_deref() == Some(id.as_str()) {
            anyhow::bail!("upstream down");
        }
        Ok(())
    }
}

fn config() -> QueueConfig {
    QueueConfig {
        max_attempts: 2,
        retry_backoff_secs: 0,
        ..QueueConfig::default()
    }
}

fn job(id: &str) -> ScrapeJob {
    ScrapeJob::new(vec![id.to_string()], false)
}

#[tokio::test]
async fn test_higher_priority_runs_first() {
    let queue = JobQueue::new(temp_store().await, config());

    queue.enqueue(JobKind::Scrape, &job("routine"), priority::ROUTINE).await.unwrap();
    queue.enqueue(JobKind::Scrape, &job("new"), priority::NEW_ANIME).await.unwrap();
    queue.enqueue(JobKind::Scrape, &job("manual"), priority::MANUAL).await.unwrap();
    queue
        .enqueue(JobKind::Scrape, &job("releasing"), priority::RELEASING_CHECK)
        .await
        .unwrap();

    let recorder = Recorder::default();
    assert_eq!(queue.drain(&recorder).await.unwrap(), 4);

    let seen = recorder.seen.lock().unwrap().clone();
    assert_eq!(seen, vec!["manual", "new", "releasing", "routine"]);
    assert_eq!(queue.counts().await.unwrap().pending, 0);
}

#[tokio::test]
async fn test_identical_jobs_are_deduplicated() {
    let queue = JobQueue::new(temp_store().await, config());

    let a = ScrapeJob::new(vec!["b".to_string(), "a".to_string()], false);
    let b = ScrapeJob::new(vec!["a".to_string(), "b".to_string()], false);
    let info = ScrapeJob::new(vec!["a".to_string(), "b".to_string()], true);

    let first = queue.enqueue(JobKind::Scrape, &a, priority::ROUTINE).await.unwrap();
    let second = queue.enqueue(JobKind::Scrape, &b, priority::MANUAL).await.unwrap();
    let third = queue.enqueue(JobKind::Scrape, &info, priority::ROUTINE).await.unwrap();

    assert!(!first.deduplicated);
    assert!(second.deduplicated);
    assert_eq!(first.id, second.id);
    assert!(!third.deduplicated);
    assert_eq!(queue.counts().await.unwrap().pending, 2);
}

#[tokio::test]
async fn test_failed_job_retries_then_parks() {
    let queue = JobQueue::new(temp_store().await, config());
    queue.enqueue(JobKind::Scrape, &job("flaky"), priority::ROUTINE).await.unwrap();

    let recorder = Recorder {
        fail_on: Some("flaky".to_string()),
        ..Recorder::default()
    };
    queue.drain(&recorder).await.unwrap();

    assert_eq!(recorder.seen.lock().unwrap().len(), 2);
    let counts = queue.counts().await.unwrap();
    assert_eq!(counts.pending, 0);
    assert_eq!(counts.failed, 1);
}

#[tokio::test]
async fn test_batched_enqueue_splits_ids() {
    let queue = JobQueue::new(temp_store().await, config());
    let ids: Vec<String> = (0..7).map(|i| format!("anime-{i}")).collect();

    let jobs = queue
        .enqueue_batched(JobKind::Scrape, &ids, false, priority::ROUTINE, 3)
        .await
        .unwrap();

    assert_eq!(jobs, 3);
    assert_eq!(queue.counts().await.unwrap().pending, 3);
}
