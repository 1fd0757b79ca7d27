use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::utils::LogLevel;

struct DefaultArgs;

impl DefaultArgs {
    pub const INPUT: &'static str = "-";
}

/// Offline AWS recon pipelines.
#[derive(Clone, Parser)]
#[command(name = "reconchain")]
#[command(about = "Run recon chains over AWS access keys and resource descriptions.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub common: CommonArgs,
}

#[derive(Clone, Subcommand)]
pub enum Commands {
    /// Decode the owning account ID of access key IDs.
    AccountId {
        /// AWS access key ID(s). Can specify multiple: -k KEY1 KEY2
        #[arg(long = "access-key-id", short = 'k', num_args = 1.., required = true)]
        keys: Vec<String>,

        /// Also report accounts that belong to known parties (e.g. canary tokens).
        #[arg(long)]
        lookup: bool,

        /// JSON file of extra known accounts ([{id, owner, source, description}]).
        #[arg(long)]
        known_accounts_file: Option<String>,
    },

    /// Scan resource descriptions for embedded access keys.
    ScanResources {
        /// JSON lines or JSON array of resources. `-` reads stdin.
        #[arg(long, short = 'i', default_value = DefaultArgs::INPUT)]
        input: String,

        /// Resources processed concurrently.
        #[arg(long, short = 'w')]
        workers: Option<i64>,

        /// Process one resource at a time; output follows input order.
        #[arg(long, num_args = 0..=1, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
        sequential: Option<bool>,

        /// Write findings here instead of stdout.
        #[arg(long, short = 'o')]
        output_file: Option<PathBuf>,
    },
}

/// Options shared by every command.
#[derive(Clone, Args)]
pub struct CommonArgs {
    /// Config file. Default: `.reconchain.toml` in the current directory.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level.
    #[arg(long, value_enum, global = true)]
    pub log_level: Option<LogLevel>,

    /// Verbose output (same as --log-level debug).
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// AWS profile to use.
    #[arg(long, short = 'p', global = true)]
    pub profile: Option<String>,

    /// Override the default AWS profile directory.
    #[arg(long, global = true)]
    pub profile_dir: Option<String>,

    /// AWS regions, comma separated.
    #[arg(long, short = 'r', value_delimiter = ',', num_args = 1.., global = true)]
    pub regions: Vec<String>,

    /// Directory for API response cache files.
    #[arg(long, global = true)]
    pub cache_dir: Option<String>,

    /// TTL for cached responses in seconds.
    #[arg(long, global = true)]
    pub cache_ttl: Option<i64>,

    /// Extension of cache files.
    #[arg(long, global = true)]
    pub cache_ext: Option<String>,

    /// Disable API response caching.
    #[arg(long, num_args = 0..=1, default_missing_value = "true", value_parser = clap::value_parser!(bool), global = true)]
    pub disable_cache: Option<bool>,

    /// Cache error responses.
    #[arg(long, num_args = 0..=1, default_missing_value = "true", value_parser = clap::value_parser!(bool), global = true)]
    pub cache_error_resp: Option<bool>,
}
