pub use super::anime::Entity as Anime;
pub use super::anime_genres::Entity as AnimeGenres;
pub use super::anime_relations::Entity as AnimeRelations;
pub use super::cache_entries::Entity as CacheEntries;
pub use super::episodes::Entity as Episodes;
pub use super::genres::Entity as Genres;
pub use super::relations::Entity as Relations;
pub use super::scrape_jobs::Entity as ScrapeJobs;
pub use super::sources::Entity as Sources;
pub use super::websites::Entity as Websites;
