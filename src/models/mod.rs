//! Domain types shared by the scrape pipeline.
//!
//! Database rows live in [`crate::entities`]; these are the shapes that flow
//! between scrapers, extractors and services.

pub mod anime;
pub mod episode;
pub mod source;

pub use anime::{AnimeFormat, AnimeRecord, AnimeStatus, AnimeTitle, RelationType, TitleVariants};
pub use episode::{EpisodeMeta, ScrapedEpisode};
pub use source::{RawSource, ResolvedSource, SourceParams, SourceType, Subtitle};
