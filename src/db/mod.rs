use crate::entities::{anime, episodes, relations, scrape_jobs, sources, websites};
use crate::models::{AnimeRecord, AnimeStatus, EpisodeMeta, RelationType};
use anyhow::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Statement};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use std::time::Duration;
use tracing::info;

pub mod migrator;
pub mod repositories;

pub use repositories::job::{Enqueued, QueueCounts};
pub use repositories::source::NewSource;

/// Fixed-width RFC 3339 (microseconds, `Z`) so stored timestamps compare as strings.
#[must_use]
pub fn timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[must_use]
pub fn now() -> String {
    timestamp(Utc::now())
}

#[must_use]
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

#[derive(Clone)]
pub struct Store {
    pub conn: DatabaseConnection,
}

impl Store {
    pub async fn new(db_url: &str) -> Result<Self> {
        Self::with_pool_options(db_url, 5, 1).await
    }

    pub async fn with_pool_options(
        db_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self> {
        use sea_orm_migration::MigratorTrait;

        if !db_url.starts_with(":memory:") && !db_url.contains(":memory:") {
            let path_str = db_url.trim_start_matches("sqlite:");
            let path_str = path_str.split('?').next().unwrap_or(path_str);
            if let Some(parent) = Path::new(path_str).parent() {
                tokio::fs::create_dir_all(parent).await.ok();
            }
            if !Path::new(path_str).exists() {
                std::fs::File::create(path_str)?;
            }
        }

        let mut opt = ConnectOptions::new(db_url.to_string());
        opt.max_connections(max_connections)
            .min_connections(min_connections)
            .connect_timeout(Duration::from_secs(10))
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(300))
            .max_lifetime(Duration::from_secs(600))
            .sqlx_logging(false);

        let conn = Database::connect(opt).await?;

        conn.execute_unprepared("PRAGMA journal_mode = WAL").await?;
        conn.execute_unprepared("PRAGMA busy_timeout = 5000").await?;

        migrator::Migrator::up(&conn, None).await?;

        info!(
            "Database connected & migrations applied (pool: {}-{})",
            min_connections, max_connections
        );

        Ok(Self { conn })
    }

    pub async fn ping(&self) -> Result<()> {
        let backend = self.conn.get_database_backend();
        self.conn
            .query_one(Statement::from_string(backend, "SELECT 1".to_string()))
            .await?;
        Ok(())
    }

    fn anime_repo(&self) -> repositories::anime::AnimeRepository {
        repositories::anime::AnimeRepository::new(self.conn.clone())
    }

    fn episode_repo(&self) -> repositories::episode::EpisodeRepository {
        repositories::episode::EpisodeRepository::new(self.conn.clone())
    }

    fn source_repo(&self) -> repositories::source::SourceRepository {
        repositories::source::SourceRepository::new(self.conn.clone())
    }

    fn relation_repo(&self) -> repositories::relation::RelationRepository {
        repositories::relation::RelationRepository::new(self.conn.clone())
    }

    fn website_repo(&self) -> repositories::website::WebsiteRepository {
        repositories::website::WebsiteRepository::new(self.conn.clone())
    }

    fn cache_repo(&self) -> repositories::cache::CacheRepository {
        repositories::cache::CacheRepository::new(self.conn.clone())
    }

    fn job_repo(&self) -> repositories::job::JobRepository {
        repositories::job::JobRepository::new(self.conn.clone())
    }

    // ========================================================================
    // Anime
    // ========================================================================

    pub async fn get_anime(&self, id: &str) -> Result<Option<anime::Model>> {
        self.anime_repo().get(id).await
    }

    pub async fn get_anime_by_anilist_id(&self, anilist_id: i32) -> Result<Option<anime::Model>> {
        self.anime_repo().get_by_anilist_id(anilist_id).await
    }

    pub async fn get_anime_many(&self, ids: &[String]) -> Result<Vec<anime::Model>> {
        self.anime_repo().get_many(ids).await
    }

    pub async fn create_anime(&self, record: &AnimeRecord) -> Result<(anime::Model, bool)> {
        self.anime_repo().create(record).await
    }

    pub async fn update_anime_from_catalog(
        &self,
        existing: &anime::Model,
        record: &AnimeRecord,
        allow_decrease: bool,
    ) -> Result<anime::Model> {
        self.anime_repo()
            .update_from_catalog(existing, record, allow_decrease)
            .await
    }

    pub async fn anime_genres(&self, anime_id: &str) -> Result<Vec<String>> {
        self.anime_repo().genres_for(anime_id).await
    }

    pub async fn set_anime_mappings(
        &self,
        id: &str,
        mappings: &BTreeMap<String, serde_json::Value>,
    ) -> Result<()> {
        self.anime_repo().set_mappings(id, mappings).await
    }

    pub async fn record_scrape_progress(
        &self,
        id: &str,
        checked: &HashMap<String, String>,
        last_episode_update: Option<&str>,
    ) -> Result<()> {
        self.anime_repo()
            .record_scrape_progress(id, checked, last_episode_update)
            .await
    }

    pub async fn list_anime_ids_by_status(&self, statuses: &[AnimeStatus]) -> Result<Vec<String>> {
        self.anime_repo().list_ids_by_status(statuses).await
    }

    pub async fn list_anime_ids_excluding_status(&self, status: AnimeStatus) -> Result<Vec<String>> {
        self.anime_repo().list_ids_excluding_status(status).await
    }

    pub async fn list_finished_never_updated(&self) -> Result<Vec<String>> {
        self.anime_repo().list_finished_never_updated().await
    }

    pub async fn list_under_sourced_releasing(&self, playable_plugins: usize) -> Result<Vec<String>> {
        self.anime_repo()
            .list_under_sourced_releasing(playable_plugins)
            .await
    }

    pub async fn list_missing_sequence_edges(&self) -> Result<Vec<String>> {
        self.anime_repo().list_missing_sequence_edges().await
    }

    pub async fn count_anime(&self) -> Result<u64> {
        self.anime_repo().count().await
    }

    // ========================================================================
    // Episodes
    // ========================================================================

    pub async fn get_episode(&self, id: &str) -> Result<Option<episodes::Model>> {
        self.episode_repo().get(id).await
    }

    pub async fn find_episode(&self, anime_id: &str, number: i32) -> Result<Option<episodes::Model>> {
        self.episode_repo().find(anime_id, number).await
    }

    pub async fn list_episodes(&self, anime_id: &str) -> Result<Vec<episodes::Model>> {
        self.episode_repo().list_for_anime(anime_id).await
    }

    pub async fn count_episodes_for_anime(&self, anime_id: &str) -> Result<u64> {
        self.episode_repo().count_for_anime(anime_id).await
    }

    pub async fn episode_numbers_sourced_by(
        &self,
        anime_id: &str,
        website_id: &str,
        upto: i32,
    ) -> Result<BTreeSet<i32>> {
        self.episode_repo()
            .numbers_sourced_by(anime_id, website_id, upto)
            .await
    }

    pub async fn find_or_create_episode(
        &self,
        anime_id: &str,
        number: i32,
        title: Option<&str>,
    ) -> Result<(episodes::Model, bool)> {
        self.episode_repo()
            .find_or_create(anime_id, number, title)
            .await
    }

    pub async fn fill_episode_title_if_missing(&self, id: &str, title: &str) -> Result<bool> {
        self.episode_repo().fill_title_if_missing(id, title).await
    }

    pub async fn upsert_aired_episode(
        &self,
        anime_id: &str,
        number: i32,
        aired_at: Option<&str>,
    ) -> Result<episodes::Model> {
        self.episode_repo()
            .upsert_aired(anime_id, number, aired_at)
            .await
    }

    pub async fn apply_episode_meta(&self, anime_id: &str, meta: &EpisodeMeta) -> Result<bool> {
        self.episode_repo().apply_meta(anime_id, meta).await
    }

    pub async fn count_episodes(&self) -> Result<u64> {
        self.episode_repo().count().await
    }

    // ========================================================================
    // Sources & websites
    // ========================================================================

    pub async fn get_source_with_website(
        &self,
        id: &str,
    ) -> Result<Option<(sources::Model, websites::Model)>> {
        self.source_repo().get_with_website(id).await
    }

    pub async fn find_source(
        &self,
        episode_id: &str,
        website_id: &str,
    ) -> Result<Option<sources::Model>> {
        self.source_repo().find(episode_id, website_id).await
    }

    pub async fn list_sources_for_episode(&self, episode_id: &str) -> Result<Vec<sources::Model>> {
        self.source_repo().list_for_episode(episode_id).await
    }

    pub async fn create_source_if_absent(&self, source: &NewSource) -> Result<Option<sources::Model>> {
        self.source_repo().create_if_absent(source).await
    }

    pub async fn count_sources(&self) -> Result<u64> {
        self.source_repo().count().await
    }

    pub async fn upsert_website(&self, website: &websites::Model) -> Result<()> {
        self.website_repo().upsert(website).await
    }

    pub async fn get_website(&self, id: &str) -> Result<Option<websites::Model>> {
        self.website_repo().get(id).await
    }

    pub async fn list_websites(&self) -> Result<Vec<websites::Model>> {
        self.website_repo().list().await
    }

    // ========================================================================
    // Relations
    // ========================================================================

    pub async fn find_relation(
        &self,
        relation_type: RelationType,
        anime_id: &str,
    ) -> Result<Option<relations::Model>> {
        self.relation_repo().find(relation_type, anime_id).await
    }

    pub async fn find_or_create_relation(
        &self,
        relation_type: RelationType,
        anime_id: &str,
    ) -> Result<relations::Model> {
        self.relation_repo()
            .find_or_create(relation_type, anime_id)
            .await
    }

    pub async fn link_relation(&self, anime_id: &str, relation_id: &str) -> Result<()> {
        self.relation_repo().link(anime_id, relation_id).await
    }

    pub async fn relations_linked_from(&self, anime_id: &str) -> Result<Vec<relations::Model>> {
        self.relation_repo().linked_from(anime_id).await
    }

    // ========================================================================
    // Cache
    // ========================================================================

    pub async fn cache_get(&self, key: &str) -> Result<Option<String>> {
        self.cache_repo().get(key).await
    }

    pub async fn cache_set(&self, key: &str, value: &str, ttl: chrono::Duration) -> Result<()> {
        self.cache_repo().set(key, value, ttl).await
    }

    pub async fn cache_delete(&self, key: &str) -> Result<()> {
        self.cache_repo().delete(key).await
    }

    pub async fn cache_purge_expired(&self) -> Result<u64> {
        self.cache_repo().purge_expired().await
    }

    // ========================================================================
    // Job queue
    // ========================================================================

    pub async fn enqueue_job(
        &self,
        kind: &str,
        payload: &str,
        fingerprint: &str,
        priority: i32,
        max_attempts: i32,
    ) -> Result<Enqueued> {
        self.job_repo()
            .enqueue(kind, payload, fingerprint, priority, max_attempts)
            .await
    }

    pub async fn claim_next_job(&self) -> Result<Option<scrape_jobs::Model>> {
        self.job_repo().claim_next().await
    }

    pub async fn complete_job(&self, id: i64) -> Result<()> {
        self.job_repo().complete(id).await
    }

    pub async fn fail_job(
        &self,
        job: &scrape_jobs::Model,
        error: &str,
        backoff: chrono::Duration,
    ) -> Result<bool> {
        self.job_repo().fail(job, error, backoff).await
    }

    pub async fn recover_running_jobs(&self) -> Result<u64> {
        self.job_repo().recover_running().await
    }

    pub async fn get_job(&self, id: i64) -> Result<Option<scrape_jobs::Model>> {
        self.job_repo().get(id).await
    }

    pub async fn list_pending_jobs(&self) -> Result<Vec<scrape_jobs::Model>> {
        self.job_repo().list_pending().await
    }

    pub async fn queue_counts(&self) -> Result<QueueCounts> {
        self.job_repo().counts().await
    }
}
