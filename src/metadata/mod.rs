//! Episode metadata backfill from external providers.
//!
//! Primary providers run first. Backup providers only run when the primary
//! pass left episodes without title, variations, description or air date;
//! images are ignored for that decision since backups never supply them.

pub mod anidb;
pub mod tvdb;

use anyhow::Result;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::db::Store;
use crate::entities::{anime, episodes};
use crate::models::{AnimeFormat, EpisodeMeta};

pub use anidb::AnidbProvider;
pub use tvdb::TvdbProvider;

#[async_trait::async_trait]
pub trait MetaProvider: Send + Sync {
    fn name(&self) -> &'static str;

    fn enabled(&self) -> bool {
        true
    }

    /// Metadata for the episodes of `anime` not listed in `excluded`.
    async fn load_meta(
        &self,
        anime: &anime::Model,
        episodes: &[episodes::Model],
        excluded: &BTreeSet<i32>,
    ) -> Result<Vec<EpisodeMeta>>;
}

/// What one synchronisation pass did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub primary_updates: usize,
    pub backup_ran: bool,
    pub backup_updates: usize,
    /// Episodes still missing a non-image field afterwards.
    pub incomplete: usize,
}

pub struct MetaService {
    store: Store,
    primary: Vec<Arc<dyn MetaProvider>>,
    backup: Vec<Arc<dyn MetaProvider>>,
}

impl MetaService {
    #[must_use]
    pub fn new(
        store: Store,
        primary: Vec<Arc<dyn MetaProvider>>,
        backup: Vec<Arc<dyn MetaProvider>>,
    ) -> Self {
        Self {
            store,
            primary,
            backup,
        }
    }

    /// Backfills episode metadata for one anime.
    ///
    /// Without `force`, episodes that already carry every field are skipped.
    #[instrument(skip(self, anime), fields(anime_id = %anime.id))]
    pub async fn synchronize(
        &self,
        anime: &anime::Model,
        use_backup: bool,
        force: bool,
    ) -> Result<SyncReport> {
        let mut report = SyncReport::default();
        if anime.parsed_format() == AnimeFormat::Movie {
            return Ok(report);
        }

        let episodes = self.store.list_episodes(&anime.id).await?;
        if episodes.is_empty() {
            return Ok(report);
        }

        let excluded: BTreeSet<i32> = if force {
            BTreeSet::new()
        } else {
            episodes
                .iter()
                .filter(|e| e.has_complete_meta())
                .map(|e| e.number)
                .collect()
        };

        for provider in self.primary.iter().filter(|p| p.enabled()) {
            report.primary_updates += self.run(provider.as_ref(), anime, &episodes, &excluded).await;
        }

        let episodes = self.store.list_episodes(&anime.id).await?;
        let filled: BTreeSet<i32> = episodes
            .iter()
            .filter(|e| e.has_meta_except_image())
            .map(|e| e.number)
            .collect();

        if use_backup && filled.len() != episodes.len() {
            report.backup_ran = true;
            for provider in self.backup.iter().filter(|p| p.enabled()) {
                report.backup_updates += self.run(provider.as_ref(), anime, &episodes, &filled).await;
            }
        }

        report.incomplete = self
            .store
            .list_episodes(&anime.id)
            .await?
            .iter()
            .filter(|e| !e.has_meta_except_image())
            .count();

        info!(
            event = "meta_sync_finished",
            primary_updates = report.primary_updates,
            backup_ran = report.backup_ran,
            backup_updates = report.backup_updates,
            incomplete = report.incomplete,
            "Episode metadata synchronised"
        );
        Ok(report)
    }

    /// Runs one provider and writes what it found. Provider failures are logged, not returned.
    async fn run(
        &self,
        provider: &dyn MetaProvider,
        anime: &anime::Model,
        episodes: &[episodes::Model],
        excluded: &BTreeSet<i32>,
    ) -> usize {
        let metas = match provider.load_meta(anime, episodes, excluded).await {
            Ok(metas) => metas,
            Err(e) => {
                warn!(provider = provider.name(), error = %e, "Metadata provider failed");
                return 0;
            }
        };

        let mut updated = 0;
        for meta in metas.iter().filter(|m| !excluded.contains(&m.number)) {
            match self.store.apply_episode_meta(&anime.id, meta).await {
                Ok(true) => updated += 1,
                Ok(false) => {}
                Err(e) => warn!(provider = provider.name(), number = meta.number, error = %e, "Failed to store episode metadata"),
            }
        }
        debug!(provider = provider.name(), updated, "Provider pass finished");
        updated
    }
}

/// The AniDB id stored in the anime's provider mappings.
pub(crate) fn anidb_id(anime: &anime::Model) -> Option<i32> {
    anime.mapping_id("anidb")?.parse().ok()
}
