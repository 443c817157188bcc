use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,

    pub server: ServerConfig,

    pub scheduler: SchedulerConfig,

    pub queue: QueueConfig,

    pub scraper: ScraperConfig,

    pub catalog: CatalogConfig,

    pub mapping: MappingConfig,

    pub metadata: MetadataConfig,

    pub source: SourceConfig,

    pub notifications: NotificationConfig,

    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub database_path: String,

    pub log_level: String,

    #[serde(default)]
    pub suppress_connection_errors: bool,

    /// Number of tokio worker threads (default: 4)
    /// Set to 0 to use the number of CPU cores
    pub worker_threads: usize,

    pub max_db_connections: u32,

    pub min_db_connections: u32,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            database_path: "sqlite:data/anisync.db".to_string(),
            log_level: "info".to_string(),
            suppress_connection_errors: false,
            worker_threads: 4,
            max_db_connections: 8,
            min_db_connections: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub enabled: bool,

    pub port: u16,

    pub cors_allowed_origins: Vec<String>,

    /// Static key expected in the `x-admin-key` header for admin routes.
    /// Admin routes are rejected while this is empty.
    pub admin_key: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 3000,
            cors_allowed_origins: vec!["http://localhost:3000".to_string()],
            admin_key: String::new(),
        }
    }
}

/// Cron expressions use the six-field format (`sec min hour day month weekday`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub enabled: bool,

    /// Pull the two-season airing window from the catalog.
    pub refetch_cron: String,

    /// Re-derive provider mappings for every non-releasing anime.
    pub resync_cron: String,

    /// Re-derive provider mappings for releasing anime only.
    pub resync_releasing_cron: String,

    /// Releasing anime whose fully sourced episode count lags behind.
    pub releasing_check_cron: String,

    /// Finished anime that were never scraped.
    pub unscraped_finished_cron: String,

    /// Every finished anime, checked rarely.
    pub finished_check_cron: String,

    /// Anime missing PREQUEL or SEQUEL edges.
    pub relation_repair_cron: String,

    /// Catch-all sweep over releasing and finished anime.
    pub weekly_sweep_cron: String,

    /// Anime IDs per enqueued job.
    pub batch_size: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            refetch_cron: "0 */10 * * * *".to_string(),
            resync_cron: "0 0 */12 * * *".to_string(),
            resync_releasing_cron: "0 30 * * * *".to_string(),
            releasing_check_cron: "0 0 * * * *".to_string(),
            unscraped_finished_cron: "0 */30 * * * *".to_string(),
            finished_check_cron: "0 0 3 * * Mon".to_string(),
            relation_repair_cron: "0 15 */12 * * *".to_string(),
            weekly_sweep_cron: "0 0 4 * * Sun".to_string(),
            batch_size: 50,
        }
    }
}

impl SchedulerConfig {
    #[must_use]
    pub fn cron_expressions(&self) -> [(&'static str, &str); 8] {
        [
            ("refetch", self.refetch_cron.as_str()),
            ("resync", self.resync_cron.as_str()),
            ("resync_releasing", self.resync_releasing_cron.as_str()),
            ("releasing_check", self.releasing_check_cron.as_str()),
            ("unscraped_finished", self.unscraped_finished_cron.as_str()),
            ("finished_check", self.finished_check_cron.as_str()),
            ("relation_repair", self.relation_repair_cron.as_str()),
            ("weekly_sweep", self.weekly_sweep_cron.as_str()),
        ]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Worker slots consuming the job queue concurrently.
    pub concurrency: usize,

    pub poll_interval_ms: u64,

    pub max_attempts: i32,

    /// Delay before a failed job becomes eligible again, multiplied by the attempt count.
    pub retry_backoff_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            concurrency: 3,
            poll_interval_ms: 1000,
            max_attempts: 3,
            retry_backoff_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScraperConfig {
    pub user_agent: String,

    pub request_timeout_secs: u64,

    pub max_retries: u32,

    pub retry_delay_ms: u64,

    /// Plain-text proxy list endpoints, one `host:port` per line.
    /// The map key is the proxy scheme (`http`, `socks4`, `socks5`).
    pub proxy_lists: HashMap<String, String>,

    pub proxy_refresh_minutes: u64,

    /// Skip FINISHED anime older than a year when checked within this many weeks.
    pub quarantine_weeks: i64,

    /// Skip HIATUS anime whose next airing is at least this many days away.
    pub hiatus_skip_days: i64,

    pub malsync_url: String,

    /// Per-plugin overrides of the built-in `enabled` flag, keyed by plugin name.
    pub plugin_overrides: HashMap<String, bool>,

    pub gogoanime_url: String,

    pub gogoanime_ajax_url: String,

    pub gogoanime_consumet_url: String,

    pub nineanime_url: String,

    pub nineanime_keys_url: String,

    pub rapidcloud_key_url: String,

    pub key_refresh_minutes: u64,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            user_agent: crate::clients::http::USER_AGENT.to_string(),
            request_timeout_secs: 5,
            max_retries: 3,
            retry_delay_ms: 1500,
            proxy_lists: HashMap::new(),
            proxy_refresh_minutes: 15,
            quarantine_weeks: 4,
            hiatus_skip_days: 3,
            malsync_url: "https://api.malsync.moe".to_string(),
            plugin_overrides: HashMap::new(),
            gogoanime_url: "https://www1.gogoanime.ee".to_string(),
            gogoanime_ajax_url: "https://ajax.gogo-load.com/ajax".to_string(),
            gogoanime_consumet_url: "https://api.consumet.org/anime/gogoanime".to_string(),
            nineanime_url: "https://9anime.id".to_string(),
            nineanime_keys_url:
                "https://raw.githubusercontent.com/chenkaslowankiya/BruvFlow/main/keys.json"
                    .to_string(),
            rapidcloud_key_url:
                "https://raw.githubusercontent.com/consumet/rapidclown/main/key.txt".to_string(),
            key_refresh_minutes: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub anilist_url: String,

    /// Pause between paged catalog requests.
    pub page_delay_ms: u64,

    /// Pause between single-anime fetches in batch operations.
    pub batch_delay_ms: u64,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            anilist_url: "https://graphql.anilist.co".to_string(),
            page_delay_ms: 500,
            batch_delay_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MappingConfig {
    pub provider_ids_url: String,

    pub provider_ids_ttl_hours: i64,

    pub tvdb_mapping_url: String,

    pub tvdb_mapping_ttl_hours: i64,
}

impl Default for MappingConfig {
    fn default() -> Self {
        Self {
            provider_ids_url:
                "https://raw.githubusercontent.com/Fribb/anime-lists/master/anime-list-full.json"
                    .to_string(),
            provider_ids_ttl_hours: 12,
            tvdb_mapping_url:
                "https://raw.githubusercontent.com/Anime-Lists/anime-lists/master/anime-list-full.xml"
                    .to_string(),
            tvdb_mapping_ttl_hours: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataConfig {
    pub tvdb_enabled: bool,

    pub tvdb_url: String,

    pub anidb_enabled: bool,

    pub anidb_url: String,

    pub anidb_client: String,

    pub anidb_client_version: String,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            tvdb_enabled: true,
            tvdb_url: "https://thetvdb.com".to_string(),
            anidb_enabled: true,
            anidb_url: "http://api.anidb.net:9001/httpapi".to_string(),
            anidb_client: String::new(),
            anidb_client_version: "1".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub cache_ttl_hours: i64,

    /// Upstream CDN links are assumed to expire after this long.
    pub upstream_validity_hours: i64,

    pub liveness_timeout_ms: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            cache_ttl_hours: 4,
            upstream_validity_hours: 6,
            liveness_timeout_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub enabled: bool,

    pub webhook_url: String,

    pub username: String,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            webhook_url: String::new(),
            username: "anisync".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub metrics_enabled: bool,

    pub loki_enabled: bool,

    pub loki_url: String,

    pub loki_labels: HashMap<String, String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        let mut labels = HashMap::new();
        labels.insert("app".to_string(), "anisync".to_string());

        Self {
            metrics_enabled: true,
            loki_enabled: false,
            loki_url: "http://localhost:3100".to_string(),
            loki_labels: labels,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let paths = Self::config_paths();

        for path in &paths {
            if path.exists() {
                info!("Loading config from: {}", path.display());
                return Self::load_from_path(path);
            }
        }

        info!("No config file found, using defaults");
        Ok(Self::default())
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Config saved to: {}", path.display());
        Ok(())
    }

    fn config_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("config.toml")];

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("anisync").join("config.toml"));
        }

        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".anisync").join("config.toml"));
        }

        paths
    }

    fn default_config_path() -> PathBuf {
        PathBuf::from("config.toml")
    }

    pub fn create_default_if_missing() -> Result<bool> {
        let path = Self::default_config_path();
        if path.exists() {
            Ok(false)
        } else {
            let config = Self::default();
            config.save_to_path(&path)?;
            info!("Created default config file: {}", path.display());
            Ok(true)
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.queue.concurrency == 0 {
            anyhow::bail!("Queue concurrency must be > 0");
        }

        if self.scheduler.batch_size == 0 {
            anyhow::bail!("Scheduler batch size must be > 0");
        }

        if self.source.cache_ttl_hours <= 0
            || self.source.cache_ttl_hours >= self.source.upstream_validity_hours
        {
            anyhow::bail!(
                "Source cache TTL ({}h) must be positive and shorter than the upstream validity window ({}h)",
                self.source.cache_ttl_hours,
                self.source.upstream_validity_hours
            );
        }

        if self.notifications.enabled && self.notifications.webhook_url.is_empty() {
            anyhow::bail!("Webhook URL cannot be empty when notifications are enabled");
        }

        if self.scheduler.enabled {
            for (name, expr) in self.scheduler.cron_expressions() {
                tokio_cron_scheduler::Job::new(expr, |_, _| {})
                    .map_err(|e| anyhow::anyhow!("Invalid cron expression for {name}: {e}"))?;
            }
        }

        Ok(())
    }
}
