pub mod prelude;

pub mod anime;
pub mod anime_genres;
pub mod anime_relations;
pub mod cache_entries;
pub mod episodes;
pub mod genres;
pub mod relations;
pub mod scrape_jobs;
pub mod sources;
pub mod websites;
