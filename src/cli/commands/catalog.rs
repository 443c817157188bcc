//! Catalog import commands

use crate::state::SharedState;

pub async fn cmd_refetch(state: &SharedState) -> anyhow::Result<()> {
    println!("Walking the catalog...");

    let report = state.information.refetch().await?;
    let batch_size = state.config.read().await.scheduler.batch_size;
    let jobs = state
        .information
        .dispatch_follow_ups(&state.queue, report.follow_ups(), batch_size)
        .await?;

    println!(
        "Created {} anime, updated {}, queued {} scrape jobs",
        report.created.len(),
        report.updated.len(),
        jobs
    );
    Ok(())
}

pub async fn cmd_resync(state: &SharedState, ids: Vec<String>) -> anyhow::Result<()> {
    let ids = if ids.is_empty() { None } else { Some(ids) };
    let report = state.information.resync(ids).await?;

    println!(
        "Mapped {} | Unmapped {} | Metadata synced {}",
        report.mapped, report.unmapped, report.meta_synced
    );
    Ok(())
}

pub async fn cmd_fetch(state: &SharedState, anilist_id: i32, force: bool) -> anyhow::Result<()> {
    let id = state.information.fetch_specific(anilist_id, force).await?;

    match state.store.get_anime(&id).await? {
        Some(anime) => println!(
            "✓ {} [{}] ({})",
            anime.title().preferred().unwrap_or("Untitled"),
            anime.id,
            anime.status
        ),
        None => println!("AniList {anilist_id} did not produce an anime"),
    }
    Ok(())
}

pub async fn cmd_relations(state: &SharedState, anime_ids: Vec<String>) -> anyhow::Result<()> {
    let requested = anime_ids.len();
    let done = state.information.fetch_relations(anime_ids).await?;
    println!("Relations refreshed for {done}/{requested} anime");
    Ok(())
}
