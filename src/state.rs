use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use crate::clients::anilist::{AnilistClient, CatalogApi};
use crate::clients::http::HttpFetcher;
use crate::clients::malsync::MalSyncClient;
use crate::clients::mappings::MappingClient;
use crate::clients::proxy::ProxyPool;
use crate::clients::webhook::{DisabledNotifier, UpdateNotifier, WebhookNotifier};
use crate::config::Config;
use crate::db::Store;
use crate::extractors::{ExtractorSet, KeyRotation, RapidCloudKeySource};
use crate::metadata::{AnidbProvider, MetaProvider, MetaService, TvdbProvider};
use crate::scrapers::ScraperRegistry;
use crate::services::{
    DbCache, Dispatcher, InformationService, InformationWorker, JobQueue, JobRouter,
    KeyValueCache, ScrapeProcessor, SourceService,
};

/// Build a shared HTTP client with reasonable defaults for API calls.
/// Reused by every HTTP-based collaborator so connections are pooled.
pub fn build_shared_http_client(timeout_seconds: u64, user_agent: &str) -> anyhow::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_seconds))
        .user_agent(user_agent)
        .pool_max_idle_per_host(10)
        .cookie_store(true)
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to build shared HTTP client: {e}"))
}

/// The pieces that talk to third parties. Tests swap these for fakes.
pub struct Collaborators {
    pub client: reqwest::Client,
    pub http: HttpFetcher,
    pub catalog: Arc<dyn CatalogApi>,
    pub registry: ScraperRegistry,
    pub notifier: Arc<dyn UpdateNotifier>,
    pub rapidcloud_key: Arc<KeyRotation<String>>,
}

impl Collaborators {
    /// Production wiring. Spawns the key refresh tasks.
    pub fn production(config: &Config) -> anyhow::Result<Self> {
        let client = build_shared_http_client(
            config.scraper.request_timeout_secs.max(1) * 6,
            &config.scraper.user_agent,
        )?;

        let proxies = Arc::new(ProxyPool::new(
            client.clone(),
            config.scraper.proxy_lists.clone(),
            Duration::from_secs(config.scraper.proxy_refresh_minutes * 60),
        ));
        let http = HttpFetcher::new(client.clone(), proxies, &config.scraper);

        let registry = ScraperRegistry::standard(&http, ExtractorSet::standard(&http), &config.scraper);

        let rapidcloud_key = Arc::new(KeyRotation::spawn(
            RapidCloudKeySource::new(http.clone(), &config.scraper.rapidcloud_key_url),
            Duration::from_secs(config.scraper.key_refresh_minutes * 60),
        ));

        let notifier: Arc<dyn UpdateNotifier> = if config.notifications.enabled {
            Arc::new(WebhookNotifier::new(
                client.clone(),
                &config.notifications.webhook_url,
                &config.notifications.username,
            ))
        } else {
            Arc::new(DisabledNotifier)
        };

        Ok(Self {
            catalog: Arc::new(AnilistClient::with_shared_client(
                client.clone(),
                &config.catalog.anilist_url,
            )),
            client,
            http,
            registry,
            notifier,
            rapidcloud_key,
        })
    }
}

#[derive(Clone)]
pub struct SharedState {
    pub config: Arc<RwLock<Config>>,

    pub store: Store,

    pub registry: ScraperRegistry,

    pub queue: Arc<JobQueue>,

    pub information: InformationWorker,

    pub processor: Arc<ScrapeProcessor>,

    pub sources: Arc<SourceService>,

    pub dispatcher: Dispatcher,
}

impl SharedState {
    pub async fn new(config: Config) -> anyhow::Result<(Self, JoinHandle<()>)> {
        let store = Store::with_pool_options(
            &config.general.database_path,
            config.general.max_db_connections,
            config.general.min_db_connections,
        )
        .await?;
        let collaborators = Collaborators::production(&config)?;
        Ok(Self::from_parts(config, store, collaborators))
    }

    /// Wires the services together. The returned handle is the information
    /// worker's dispatcher task.
    #[must_use]
    pub fn from_parts(
        config: Config,
        store: Store,
        collaborators: Collaborators,
    ) -> (Self, JoinHandle<()>) {
        let Collaborators {
            client,
            http,
            catalog,
            registry,
            notifier,
            rapidcloud_key,
        } = collaborators;

        let cache: Arc<dyn KeyValueCache> = Arc::new(DbCache::new(store.clone()));
        let mappings = Arc::new(MappingClient::new(
            http.clone(),
            Arc::clone(&cache),
            config.mapping.clone(),
        ));

        let primary: Vec<Arc<dyn MetaProvider>> = vec![Arc::new(TvdbProvider::new(
            http.clone(),
            Arc::clone(&mappings),
            &config.metadata,
        ))];
        let backup: Vec<Arc<dyn MetaProvider>> =
            vec![Arc::new(AnidbProvider::new(http.clone(), &config.metadata))];
        let meta = Arc::new(MetaService::new(store.clone(), primary, backup));

        let information = Arc::new(InformationService::new(
            store.clone(),
            catalog,
            mappings,
            Arc::clone(&meta),
            config.catalog.clone(),
        ));
        let (information, worker_task) = InformationWorker::spawn(
            information,
            config.queue.concurrency,
            Duration::from_millis(config.catalog.batch_delay_ms),
        );

        let processor = Arc::new(ScrapeProcessor::new(
            store.clone(),
            registry.clone(),
            MalSyncClient::new(http, &config.scraper.malsync_url),
            meta,
            notifier,
            &config.scraper,
        ));

        let sources = Arc::new(SourceService::new(
            store.clone(),
            cache,
            registry.clone(),
            client,
            rapidcloud_key,
            &config.source,
        ));

        let queue = Arc::new(JobQueue::new(store.clone(), config.queue.clone()));
        let dispatcher = Dispatcher::new(
            store.clone(),
            Arc::clone(&queue),
            information.clone(),
            registry.playable_count(),
            config.scheduler.batch_size,
        );

        let state = Self {
            config: Arc::new(RwLock::new(config)),
            store,
            registry,
            queue,
            information,
            processor,
            sources,
            dispatcher,
        };
        (state, worker_task)
    }

    pub async fn config(&self) -> Config {
        self.config.read().await.clone()
    }

    /// Queue handler for the worker pool.
    #[must_use]
    pub fn job_router(&self) -> Arc<JobRouter> {
        Arc::new(JobRouter::new(
            Arc::clone(&self.processor),
            self.information.clone(),
        ))
    }

    /// Upserts one `websites` row per registered plugin.
    pub async fn seed_websites(&self) -> anyhow::Result<()> {
        for website in self.registry.website_rows() {
            self.store.upsert_website(&website).await?;
        }
        Ok(())
    }
}
