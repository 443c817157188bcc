use crate::services::ScheduledTask;
use crate::state::SharedState;

pub async fn cmd_queue(state: &SharedState) -> anyhow::Result<()> {
    let counts = state.queue.counts().await?;

    println!("Storage");
    println!("{:-<40}", "");
    println!("  Anime:    {}", state.store.count_anime().await?);
    println!("  Episodes: {}", state.store.count_episodes().await?);
    println!("  Sources:  {}", state.store.count_sources().await?);
    println!();
    println!("Queue");
    println!("{:-<40}", "");
    println!("  Pending:  {}", counts.pending);
    println!("  Running:  {}", counts.running);
    println!("  Failed:   {}", counts.failed);

    let pending = state.store.list_pending_jobs().await?;
    for job in pending.iter().take(10) {
        println!(
            "  #{} {} p{} attempts {}",
            job.id, job.kind, job.priority, job.attempts
        );
    }
    Ok(())
}

/// Runs the task's selection, then drains whatever it queued.
pub async fn cmd_run_task(state: &SharedState, name: &str) -> anyhow::Result<()> {
    let task: ScheduledTask = name.parse().map_err(anyhow::Error::msg)?;

    let jobs = state.dispatcher.run(task).await?;
    println!("{} queued {} jobs", task.name(), jobs);

    if jobs > 0 {
        let router = state.job_router();
        let processed = state.queue.drain(router.as_ref()).await?;
        println!("Processed {processed} jobs");
    }
    Ok(())
}
