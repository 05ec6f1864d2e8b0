//! Command-line interface for anisync.

mod commands;

pub use commands::{cmd_check, cmd_history, cmd_init, cmd_parse, cmd_run};

use crate::constants::limits;
use crate::models::ListStatus;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// anisync - keeps a local anime library in step with an `AniList` watch list
#[derive(Parser)]
#[command(name = "anisync")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to a config file instead of the default search locations
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Reconcile one watch-list bucket (the default command)
    #[command(alias = "r")]
    Run {
        /// Watch-list status to reconcile, defaults to `anilist.default_status`
        #[arg(long, short)]
        status: Option<ListStatus>,

        /// Log every decision without fetching or persisting anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Write a default config file if none exists
    Init,

    /// Show recently fetched or queued releases
    #[command(alias = "h")]
    History {
        /// Number of entries to show
        #[arg(default_value_t = limits::DEFAULT_HISTORY_LIMIT)]
        limit: u64,
    },

    /// Report whether a release name was already processed
    #[command(alias = "c")]
    Check {
        /// Exact release name
        #[arg(required = true)]
        name: Vec<String>,
    },

    /// Show how a raw release name is parsed
    #[command(alias = "p")]
    Parse {
        /// Raw release name
        #[arg(required = true)]
        name: Vec<String>,
    },
}

impl Default for Commands {
    fn default() -> Self {
        Self::Run {
            status: None,
            dry_run: false,
        }
    }
}
