mod catalog;
mod info;
mod queue;
mod scrape;
mod source;

pub use catalog::{cmd_fetch, cmd_refetch, cmd_relations, cmd_resync};
pub use info::cmd_anime_info;
pub use queue::{cmd_queue, cmd_run_task};
pub use scrape::cmd_scrape;
pub use source::cmd_source;
