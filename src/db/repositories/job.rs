use crate::entities::{prelude::*, scrape_jobs};
use anyhow::Result;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
};

pub const STATUS_PENDING: &str = "pending";
pub const STATUS_RUNNING: &str = "running";
pub const STATUS_FAILED: &str = "failed";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Enqueued {
    pub id: i64,
    /// An identical job was already pending or running and absorbed this one.
    pub deduplicated: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueCounts {
    pub pending: u64,
    pub running: u64,
    pub failed: u64,
}

/// Persistent priority queue. Lower `priority` is dequeued first, then oldest.
pub struct JobRepository {
    conn: DatabaseConnection,
}

impl JobRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn enqueue(
        &self,
        kind: &str,
        payload: &str,
        fingerprint: &str,
        priority: i32,
        max_attempts: i32,
    ) -> Result<Enqueued> {
        let in_flight = ScrapeJobs::find()
            .filter(scrape_jobs::Column::Fingerprint.eq(fingerprint))
            .filter(scrape_jobs::Column::Status.is_in([STATUS_PENDING, STATUS_RUNNING]))
            .one(&self.conn)
            .await?;

        if let Some(job) = in_flight {
            if job.status == STATUS_PENDING && priority < job.priority {
                ScrapeJobs::update_many()
                    .col_expr(scrape_jobs::Column::Priority, Expr::value(priority))
                    .col_expr(scrape_jobs::Column::UpdatedAt, Expr::value(crate::db::now()))
                    .filter(scrape_jobs::Column::Id.eq(job.id))
                    .filter(scrape_jobs::Column::Status.eq(STATUS_PENDING))
                    .exec(&self.conn)
                    .await?;
            }
            return Ok(Enqueued {
                id: job.id,
                deduplicated: true,
            });
        }

        let now = crate::db::now();
        let created = ScrapeJobs::insert(scrape_jobs::ActiveModel {
            kind: Set(kind.to_string()),
            payload: Set(payload.to_string()),
            fingerprint: Set(fingerprint.to_string()),
            priority: Set(priority),
            status: Set(STATUS_PENDING.to_string()),
            attempts: Set(0),
            max_attempts: Set(max_attempts),
            last_error: Set(None),
            run_after: Set(now.clone()),
            created_at: Set(now.clone()),
            updated_at: Set(now),
            ..Default::default()
        })
        .exec(&self.conn)
        .await?;

        Ok(Enqueued {
            id: created.last_insert_id,
            deduplicated: false,
        })
    }

    /// Claims the most urgent eligible job.
    ///
    /// The claim is a conditional update on `status = 'pending'`; when another
    /// worker wins the race the next candidate is tried.
    pub async fn claim_next(&self) -> Result<Option<scrape_jobs::Model>> {
        for _ in 0..5 {
            let now = crate::db::now();
            let Some(candidate) = ScrapeJobs::find()
                .filter(scrape_jobs::Column::Status.eq(STATUS_PENDING))
                .filter(scrape_jobs::Column::RunAfter.lte(now.clone()))
                .order_by_asc(scrape_jobs::Column::Priority)
                .order_by_asc(scrape_jobs::Column::CreatedAt)
                .order_by_asc(scrape_jobs::Column::Id)
                .one(&self.conn)
                .await?
            else {
                return Ok(None);
            };

            let claimed = ScrapeJobs::update_many()
                .col_expr(scrape_jobs::Column::Status, Expr::value(STATUS_RUNNING))
                .col_expr(
                    scrape_jobs::Column::Attempts,
                    Expr::col(scrape_jobs::Column::Attempts).add(1),
                )
                .col_expr(scrape_jobs::Column::UpdatedAt, Expr::value(now))
                .filter(scrape_jobs::Column::Id.eq(candidate.id))
                .filter(scrape_jobs::Column::Status.eq(STATUS_PENDING))
                .exec(&self.conn)
                .await?;

            if claimed.rows_affected == 1 {
                return Ok(ScrapeJobs::find_by_id(candidate.id).one(&self.conn).await?);
            }
        }

        Ok(None)
    }

    /// Completed jobs are removed; no history is kept.
    pub async fn complete(&self, id: i64) -> Result<()> {
        ScrapeJobs::delete_by_id(id).exec(&self.conn).await?;
        Ok(())
    }

    /// Returns the job to the queue after `backoff`, or parks it as failed
    /// once its attempts are used up. Returns true when the job was parked.
    pub async fn fail(&self, job: &scrape_jobs::Model, error: &str, backoff: chrono::Duration) -> Result<bool> {
        let exhausted = job.attempts >= job.max_attempts;
        let status = if exhausted { STATUS_FAILED } else { STATUS_PENDING };

        ScrapeJobs::update(scrape_jobs::ActiveModel {
            id: Set(job.id),
            status: Set(status.to_string()),
            last_error: Set(Some(error.to_string())),
            run_after: Set(crate::db::timestamp(chrono::Utc::now() + backoff)),
            updated_at: Set(crate::db::now()),
            ..Default::default()
        })
        .exec(&self.conn)
        .await?;

        Ok(exhausted)
    }

    /// Jobs left running by a previous process go back to pending.
    pub async fn recover_running(&self) -> Result<u64> {
        let result = ScrapeJobs::update_many()
            .col_expr(scrape_jobs::Column::Status, Expr::value(STATUS_PENDING))
            .col_expr(scrape_jobs::Column::UpdatedAt, Expr::value(crate::db::now()))
            .filter(scrape_jobs::Column::Status.eq(STATUS_RUNNING))
            .exec(&self.conn)
            .await?;
        Ok(result.rows_affected)
    }

    pub async fn get(&self, id: i64) -> Result<Option<scrape_jobs::Model>> {
        Ok(ScrapeJobs::find_by_id(id).one(&self.conn).await?)
    }

    pub async fn list_pending(&self) -> Result<Vec<scrape_jobs::Model>> {
        Ok(ScrapeJobs::find()
            .filter(scrape_jobs::Column::Status.eq(STATUS_PENDING))
            .order_by_asc(scrape_jobs::Column::Priority)
            .order_by_asc(scrape_jobs::Column::CreatedAt)
            .all(&self.conn)
            .await?)
    }

    pub async fn counts(&self) -> Result<QueueCounts> {
        let count = |status: &'static str| {
            ScrapeJobs::find()
                .filter(scrape_jobs::Column::Status.eq(status))
                .count(&self.conn)
        };
        Ok(QueueCounts {
            pending: count(STATUS_PENDING).await?,
            running: count(STATUS_RUNNING).await?,
            failed: count(STATUS_FAILED).await?,
        })
    }
}
