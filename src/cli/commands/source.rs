use crate::state::SharedState;

pub async fn cmd_source(state: &SharedState, id: &str) -> anyhow::Result<()> {
    let source = state.sources.get_source(id).await?;

    println!("{}", source.url);
    println!("  Website: {}", source.website);
    if let Some(referer) = &source.referer {
        println!("  Referer: {referer}");
    }
    if let Some(subtitle) = &source.subtitle {
        println!("  Subtitle: {subtitle}");
    }
    for (name, value) in &source.headers {
        println!("  Header: {name}: {value}");
    }
    Ok(())
}
