//! Command-line interface for anisync.

mod commands;

use clap::{Parser, Subcommand};

/// anisync - anime catalog and streaming source aggregator
#[derive(Parser)]
#[command(name = "anisync")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the queue workers, scheduler and admin API
    #[command(alias = "-d", alias = "--daemon")]
    Daemon,

    /// Walk the catalog and import or update every title
    Refetch,

    /// Refresh mappings and metadata
    Resync {
        /// Anime ids to resync. All anime when omitted.
        ids: Vec<String>,
    },

    /// Import a single title by its AniList id
    Fetch {
        anilist_id: i32,
        /// Update even if the title is already stored
        #[arg(long)]
        force: bool,
    },

    /// Rebuild the relation graph around the given anime
    Relations {
        #[arg(required = true)]
        anime_ids: Vec<String>,
    },

    /// Scrape episodes and sources for the given anime now
    Scrape {
        #[arg(required = true)]
        anime_ids: Vec<String>,
        /// Only run plugins that provide episode information
        #[arg(long)]
        info_only: bool,
    },

    /// Resolve a stored source to a playable URL
    Source { id: String },

    /// Run one scheduled task immediately
    Run {
        /// Task name, e.g. releasing_check or relation_repair
        task: String,
    },

    /// Show queue and storage counters
    #[command(alias = "stats")]
    Queue,

    /// Show an anime with its episodes
    #[command(alias = "i")]
    Info { id: String },

    /// Create default config file
    #[command(alias = "--init")]
    Init,
}

pub use commands::*;
