use crate::state::SharedState;

pub async fn cmd_anime_info(state: &SharedState, id: &str) -> anyhow::Result<()> {
    let Some(anime) = state.store.get_anime(id).await? else {
        println!("Anime {id} not found.");
        return Ok(());
    };

    let title = anime.title();
    println!("{}", title.preferred().unwrap_or("Untitled"));
    println!("{:-<60}", "");
    println!("  ID: {} | AniList: {}", anime.id, anime.anilist_id);
    println!(
        "  Status: {} | Format: {} | Episodes aired: {}",
        anime.status, anime.format, anime.current_episode
    );
    if let Some(updated) = &anime.last_episode_update {
        println!("  Last episode update: {updated}");
    }

    let episodes = state.store.list_episodes(&anime.id).await?;
    println!();
    println!("Episodes ({})", episodes.len());
    for episode in episodes {
        let sources = state.store.list_sources_for_episode(&episode.id).await?;
        println!(
            "  {:>4}  {}  ({} sources)",
            episode.number,
            episode.title.as_deref().unwrap_or("-"),
            sources.len()
        );
    }
    Ok(())
}
