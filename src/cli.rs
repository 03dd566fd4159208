use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::types::LogLevel;

#[derive(Parser, Debug)]
#[command(
    name = "drive-wallpapers",
    about = "Browse and cache a Google Drive wallpaper gallery"
)]
pub struct Cli {
    #[command(flatten)]
    pub drive: DriveArgs,

    /// Path of the local cache database
    #[arg(long, global = true, default_value = "~/.drive-wallpapers/cache.db")]
    pub cache_db: String,

    /// Log level (overridden by RUST_LOG)
    #[arg(long, global = true, value_enum, default_value = "info")]
    pub log_level: LogLevel,

    #[command(subcommand)]
    pub command: Command,
}

/// Remote gallery settings. Only commands that talk to Drive need them.
#[derive(Args, Debug, Clone)]
pub struct DriveArgs {
    /// Drive API key
    #[arg(long, global = true, env = "DRIVE_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Id of the Drive folder holding the category folders
    #[arg(long, global = true, env = "DRIVE_ROOT_FOLDER_ID")]
    pub root_folder_id: Option<String>,

    /// Drive REST base URL
    #[arg(
        long,
        global = true,
        default_value = crate::drive::DEFAULT_API_BASE_URL
    )]
    pub api_base_url: String,

    /// Entries requested per listing page (server default when unset)
    #[arg(long, global = true)]
    pub page_size: Option<u32>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List categories (fetched from Drive when the cache is empty)
    Categories {
        /// Refresh from Drive even if cached
        #[arg(long)]
        refresh: bool,
    },

    /// List the pictures of one category
    Pictures {
        category_id: String,

        /// Refresh from Drive even if cached
        #[arg(long)]
        refresh: bool,
    },

    /// List favourite pictures across all categories
    Favourites,

    /// Flip the favourite flag of a cached picture
    Toggle { picture_id: String },

    /// Download one image to a file
    Fetch {
        image_id: String,

        /// Destination file
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Show cache row counts
    Status,

    /// Print categories (or one category's pictures) whenever the cache changes
    Watch {
        category_id: Option<String>,

        /// Follow favourites across all categories instead
        #[arg(long, conflicts_with = "category_id")]
        favourites: bool,
    },

    /// Delete the cache database
    ClearCache {
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
}
