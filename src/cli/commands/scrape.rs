use crate::services::ScrapeJob;
use crate::state::SharedState;

/// Runs the scrape in-process instead of going through the queue.
pub async fn cmd_scrape(
    state: &SharedState,
    anime_ids: Vec<String>,
    info_only: bool,
) -> anyhow::Result<()> {
    let job = ScrapeJob::new(anime_ids, info_only);
    let updates = state.processor.process(&job).await?;

    if updates.is_empty() {
        println!("No new episodes found.");
        return Ok(());
    }

    println!("New episodes ({}):", updates.len());
    for update in updates {
        println!(
            "  {} - Episode {} [{}]",
            update.anime,
            update.episode_number,
            update.website
        );
    }
    Ok(())
}
