//! Message-passing front for [`InformationService`].
//!
//! Callers submit an [`InformationTask`] and await the reply on a oneshot
//! channel. A dispatcher task pulls tasks off the channel and runs each one
//! under a semaphore, so at most `workers` catalog syncs run at once.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Semaphore, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::information::{FollowUp, InformationService, RefetchReport, ResyncReport};
use super::queue::{JobKind, JobQueue, ScrapeJob};

type Reply<T> = oneshot::Sender<Result<T>>;

pub enum InformationTask {
    Refetch {
        reply: Reply<RefetchReport>,
    },
    Resync {
        ids: Option<Vec<String>>,
        reply: Reply<ResyncReport>,
    },
    FetchSpecific {
        anilist_id: i32,
        force: bool,
        reply: Reply<String>,
    },
    /// Paced; ids that fail are logged and left out of the reply.
    FetchSpecificBatch {
        anilist_ids: Vec<i32>,
        reply: Reply<Vec<String>>,
    },
    /// Paced; returns the number of anime whose edges were read.
    FetchRelations {
        anime_ids: Vec<String>,
        reply: Reply<usize>,
    },
}

impl InformationTask {
    const fn name(&self) -> &'static str {
        match self {
            Self::Refetch { .. } => "refetch",
            Self::Resync { .. } => "resync",
            Self::FetchSpecific { .. } => "fetch_specific",
            Self::FetchSpecificBatch { .. } => "fetch_specific_batch",
            Self::FetchRelations { .. } => "fetch_relations",
        }
    }
}

#[derive(Clone)]
pub struct InformationWorker {
    tx: mpsc::Sender<InformationTask>,
}

impl InformationWorker {
    /// Spawns the dispatcher. It stops once every handle has been dropped.
    #[must_use]
    pub fn spawn(
        service: Arc<InformationService>,
        workers: usize,
        pacing: Duration,
    ) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<InformationTask>(100);
        let permits = Arc::new(Semaphore::new(workers.max(1)));

        let dispatcher = tokio::spawn(async move {
            while let Some(task) = rx.recv().await {
                let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
                    break;
                };
                let service = Arc::clone(&service);
                tokio::spawn(async move {
                    let _permit = permit;
                    let name = task.name();
                    debug!(task = name, "Information task started");
                    run(&service, task, pacing).await;
                    debug!(task = name, "Information task finished");
                });
            }
            info!("Information worker stopped");
        });

        (Self { tx }, dispatcher)
    }

    async fn submit<T>(&self, build: impl FnOnce(Reply<T>) -> InformationTask) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(build(reply))
            .await
            .map_err(|_| anyhow::anyhow!("Information worker is not running"))?;
        rx.await.context("Information worker dropped the task")?
    }

    pub async fn refetch(&self) -> Result<RefetchReport> {
        self.submit(|reply| InformationTask::Refetch { reply }).await
    }

    pub async fn resync(&self, ids: Option<Vec<String>>) -> Result<ResyncReport> {
        self.submit(|reply| InformationTask::Resync { ids, reply }).await
    }

    pub async fn fetch_specific(&self, anilist_id: i32, force: bool) -> Result<String> {
        self.submit(|reply| InformationTask::FetchSpecific {
            anilist_id,
            force,
            reply,
        })
        .await
    }

    pub async fn fetch_specific_batch(&self, anilist_ids: Vec<i32>) -> Result<Vec<String>> {
        self.submit(|reply| InformationTask::FetchSpecificBatch { anilist_ids, reply })
            .await
    }

    pub async fn fetch_relations(&self, anime_ids: Vec<String>) -> Result<usize> {
        self.submit(|reply| InformationTask::FetchRelations { anime_ids, reply })
            .await
    }

    /// Carries out follow-up work: scrapes go to the queue, resyncs run here.
    pub async fn dispatch_follow_ups(
        &self,
        queue: &JobQueue,
        follow_ups: Vec<FollowUp>,
        batch_size: usize,
    ) -> Result<usize> {
        let mut enqueued = 0;
        for follow_up in follow_ups {
            match follow_up {
                FollowUp::Scrape {
                    anime_ids,
                    priority,
                    info_only,
                } => {
                    let jobs = queue
                        .enqueue_batched(JobKind::Scrape, &anime_ids, info_only, priority, batch_size)
                        .await?;
                    debug!(jobs, priority, "Follow-up scrapes enqueued");
                    enqueued += jobs;
                }
                FollowUp::Resync { anime_ids } => {
                    if let Err(e) = self.resync(Some(anime_ids)).await {
                        warn!(error = %e, "Follow-up resync failed");
                    }
                }
            }
        }
        Ok(enqueued)
    }
}

async fn run(service: &InformationService, task: InformationTask, pacing: Duration) {
    // A dropped receiver means the caller gave up; nothing to report to.
    match task {
        InformationTask::Refetch { reply } => {
            let _ = reply.send(service.refetch().await);
        }
        InformationTask::Resync { ids, reply } => {
            let _ = reply.send(service.resync(ids.as_deref()).await);
        }
        InformationTask::FetchSpecific {
            anilist_id,
            force,
            reply,
        } => {
            let _ = reply.send(service.fetch_anime_by_anilist_id(anilist_id, force).await);
        }
        InformationTask::FetchSpecificBatch { anilist_ids, reply } => {
            let mut ids = Vec::with_capacity(anilist_ids.len());
            for (i, anilist_id) in anilist_ids.into_iter().enumerate() {
                if i > 0 {
                    tokio::time::sleep(pacing).await;
                }
                match service.fetch_anime_by_anilist_id(anilist_id, false).await {
                    Ok(id) => ids.push(id),
                    Err(e) => error!(anilist_id, error = %e, "Catalog fetch failed"),
                }
            }
            let _ = reply.send(Ok(ids));
        }
        InformationTask::FetchRelations { anime_ids, reply } => {
            let mut done = 0;
            for (i, anime_id) in anime_ids.iter().enumerate() {
                if i > 0 {
                    tokio::time::sleep(pacing).await;
                }
                match service.fetch_relations(anime_id).await {
                    Ok(_) => done += 1,
                    Err(e) => warn!(anime_id, error = %e, "Relation fetch failed"),
                }
            }
            let _ = reply.send(Ok(done));
        }
    }
}

/// Queue handler routing each job kind to its consumer.
pub struct JobRouter {
    processor: Arc<super::processor::ScrapeProcessor>,
    information: InformationWorker,
}

impl JobRouter {
    #[must_use]
    pub const fn new(
        processor: Arc<super::processor::ScrapeProcessor>,
        information: InformationWorker,
    ) -> Self {
        Self {
            processor,
            information,
        }
    }
}

#[async_trait::async_trait]
impl super::queue::JobHandler for JobRouter {
    async fn handle(&self, kind: JobKind, job: &ScrapeJob) -> Result<()> {
        match kind {
            JobKind::Scrape => {
                self.processor.process(job).await?;
            }
            JobKind::Relations => {
                self.information
                    .fetch_relations(job.anime_ids.clone())
                    .await?;
            }
        }
        Ok(())
    }
}
