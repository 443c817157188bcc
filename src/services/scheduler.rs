use anyhow::Result;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::Duration;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

use crate::config::SchedulerConfig;
use crate::db::Store;
use crate::models::AnimeStatus;
use crate::services::information_worker::InformationWorker;
use crate::services::queue::{JobKind, JobQueue, priority};

/// The periodic selections. Each one only enqueues or delegates; none scrapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduledTask {
    Refetch,
    Resync,
    ResyncReleasing,
    ReleasingCheck,
    UnscrapedFinished,
    FinishedCheck,
    RelationRepair,
    WeeklySweep,
}

impl ScheduledTask {
    pub const ALL: [Self; 8] = [
        Self::Refetch,
        Self::Resync,
        Self::ResyncReleasing,
        Self::ReleasingCheck,
        Self::UnscrapedFinished,
        Self::FinishedCheck,
        Self::RelationRepair,
        Self::WeeklySweep,
    ];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Refetch => "refetch",
            Self::Resync => "resync",
            Self::ResyncReleasing => "resync_releasing",
            Self::ReleasingCheck => "releasing_check",
            Self::UnscrapedFinished => "unscraped_finished",
            Self::FinishedCheck => "finished_check",
            Self::RelationRepair => "relation_repair",
            Self::WeeklySweep => "weekly_sweep",
        }
    }
}

impl FromStr for ScheduledTask {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.name() == s)
            .ok_or_else(|| format!("Unknown scheduled task: {s}"))
    }
}

/// Runs the selection behind each scheduled task.
#[derive(Clone)]
pub struct Dispatcher {
    store: Store,
    queue: Arc<JobQueue>,
    information: InformationWorker,
    playable_plugins: usize,
    batch_size: usize,
}

impl Dispatcher {
    #[must_use]
    pub const fn new(
        store: Store,
        queue: Arc<JobQueue>,
        information: InformationWorker,
        playable_plugins: usize,
        batch_size: usize,
    ) -> Self {
        Self {
            store,
            queue,
            information,
            playable_plugins,
            batch_size,
        }
    }

    /// Returns the number of queue jobs the task produced.
    pub async fn run(&self, task: ScheduledTask) -> Result<usize> {
        match task {
            ScheduledTask::Refetch => {
                let report = self.information.refetch().await?;
                self.information
                    .dispatch_follow_ups(&self.queue, report.follow_ups(), self.batch_size)
                    .await
            }
            ScheduledTask::Resync => {
                self.information.resync(None).await?;
                Ok(0)
            }
            ScheduledTask::ResyncReleasing => {
                let ids = self
                    .store
                    .list_anime_ids_by_status(&[AnimeStatus::Releasing])
                    .await?;
                if !ids.is_empty() {
                    self.information.resync(Some(ids)).await?;
                }
                Ok(0)
            }
            ScheduledTask::ReleasingCheck => {
                let ids = self
                    .store
                    .list_under_sourced_releasing(self.playable_plugins)
                    .await?;
                self.enqueue(JobKind::Scrape, &ids, priority::RELEASING_CHECK).await
            }
            ScheduledTask::UnscrapedFinished => {
                let ids = self.store.list_finished_never_updated().await?;
                self.enqueue(JobKind::Scrape, &ids, priority::UNSCRAPED_FINISHED)
                    .await
            }
            ScheduledTask::FinishedCheck => {
                let ids = self
                    .store
                    .list_anime_ids_by_status(&[AnimeStatus::Finished])
                    .await?;
                self.enqueue(JobKind::Scrape, &ids, priority::ROUTINE).await
            }
            ScheduledTask::RelationRepair => {
                let ids = self.store.list_missing_sequence_edges().await?;
                self.enqueue(JobKind::Relations, &ids, priority::RELATION_REPAIR)
                    .await
            }
            ScheduledTask::WeeklySweep => {
                let ids = self
                    .store
                    .list_anime_ids_by_status(&[AnimeStatus::Releasing, AnimeStatus::Finished])
                    .await?;
                self.enqueue(JobKind::Scrape, &ids, priority::ROUTINE).await
            }
        }
    }

    async fn enqueue(&self, kind: JobKind, ids: &[String], priority: i32) -> Result<usize> {
        self.queue
            .enqueue_batched(kind, ids, false, priority, self.batch_size)
            .await
    }
}

pub async fn run_logged(dispatcher: &Dispatcher, task: ScheduledTask) {
    let start = std::time::Instant::now();
    info!(event = "job_started", job_name = task.name(), "Starting scheduled task");

    match dispatcher.run(task).await {
        Ok(jobs) => info!(
            event = "job_finished",
            job_name = task.name(),
            jobs,
            duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
            "Scheduled task finished"
        ),
        Err(e) => {
            error!(event = "job_failed", job_name = task.name(), error = %e, "Scheduled task failed");
        }
    }
}

pub struct Scheduler {
    dispatcher: Dispatcher,
    config: SchedulerConfig,
    running: Arc<RwLock<bool>>,
}

impl Scheduler {
    #[must_use]
    pub fn new(dispatcher: Dispatcher, config: SchedulerConfig) -> Self {
        Self {
            dispatcher,
            config,
            running: Arc::new(RwLock::new(false)),
        }
    }

    /// Blocks until [`Scheduler::stop`] is called.
    pub async fn start(&self) -> Result<()> {
        if !self.config.enabled {
            info!("Scheduler is disabled in config");
            return Ok(());
        }

        *self.running.write().await = true;
        info!("Starting background scheduler");

        let mut sched = JobScheduler::new().await?;

        for (name, cron) in self.config.cron_expressions() {
            let task: ScheduledTask = name.parse().map_err(anyhow::Error::msg)?;
            let dispatcher = self.dispatcher.clone();
            let running = Arc::clone(&self.running);

            let job = Job::new_async(cron, move |_uuid, _lock| {
                let dispatcher = dispatcher.clone();
                let running = Arc::clone(&running);
                Box::pin(async move {
                    if !*running.read().await {
                        return;
                    }
                    run_logged(&dispatcher, task).await;
                })
            })?;

            sched.add(job).await?;
            info!(task = name, cron, "Scheduled task registered");
        }

        sched.start().await?;

        loop {
            if !*self.running.read().await {
                break;
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }

        sched.shutdown().await?;
        Ok(())
    }

    pub async fn stop(&self) {
        info!("Stopping scheduler...");
        *self.running.write().await = false;
    }

    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }

    pub async fn run_once(&self, task: ScheduledTask) -> Result<usize> {
        info!(task = task.name(), "Running scheduled task manually");
        self.dispatcher.run(task).await
    }
}
