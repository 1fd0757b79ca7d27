//! CLI entry: resolve options (config file, then flags, then environment) and dispatch.

use anyhow::{Context, Result};
use log::{debug, warn};
use std::env;

use crate::Opts;
use crate::engine::arg_parser::{Cli, Commands, CommonArgs};
use crate::engine::handlers::{handle_account_id, handle_scan_resources};
use crate::pipeline::CancelToken;
use crate::utils::config::PROFILE_ENV;
use crate::utils::{
    LogLevel, apply_file_to_opts, default_config_path, load_reconchain_toml, setup_logging,
};

/// Overwrite opts field from a CLI flag when given.
macro_rules! apply_flag {
    ($common:expr, $opts:expr, $field:ident) => {
        if let Some(v) = $common.$field.clone() {
            $opts.$field = Some(v);
        }
    };
}

fn apply_common_to_opts(common: &CommonArgs, opts: &mut Opts) {
    if let Some(level) = common.log_level {
        opts.log_level = level;
    }
    if common.verbose {
        opts.log_level = LogLevel::Debug;
    }
    apply_flag!(common, opts, profile);
    apply_flag!(common, opts, profile_dir);
    if !common.regions.is_empty() {
        opts.regions = Some(common.regions.clone());
    }
    apply_flag!(common, opts, cache_dir);
    apply_flag!(common, opts, cache_ttl);
    apply_flag!(common, opts, cache_ext);
    apply_flag!(common, opts, disable_cache);
    apply_flag!(common, opts, cache_error_resp);
}

/// Build run options: config file first, CLI flags over it, `AWS_PROFILE` as last resort.
pub fn setup_opts(cli: &Cli) -> Result<Opts> {
    let mut opts = Opts::default();
    let path = match &cli.common.config {
        Some(p) => p.clone(),
        None => default_config_path(&env::current_dir().context("failed to read current dir")?),
    };
    if let Some(file) = load_reconchain_toml(&path) {
        apply_file_to_opts(&file, &mut opts);
    }
    apply_common_to_opts(&cli.common, &mut opts);
    match &cli.command {
        Commands::AccountId {
            known_accounts_file: Some(f),
            ..
        } => opts.known_accounts_file = Some(f.clone()),
        Commands::ScanResources {
            workers, sequential, ..
        } => {
            if workers.is_some() {
                opts.workers = *workers;
            }
            if let Some(seq) = sequential {
                opts.sequential = *seq;
            }
        }
        _ => {}
    }
    if opts.profile.is_none() {
        opts.profile = env::var(PROFILE_ENV).ok().filter(|p| !p.trim().is_empty());
    }
    Ok(opts)
}

/// Run the selected command. Ctrl+C cancels every running chain.
pub fn handle_run(cli: &Cli) -> Result<()> {
    let _ = dotenvy::dotenv();
    let opts = setup_opts(cli)?;
    setup_logging(opts.log_level);
    debug!("{} CONFIG:{:#?}", env!("CARGO_PKG_NAME").to_uppercase(), opts);

    let cancel = CancelToken::new();
    let handler = cancel.clone();
    ctrlc::set_handler(move || {
        warn!("Interrupted; cancelling running chains");
        handler.cancel();
    })
    .context("set Ctrl+C handler")?;

    match &cli.command {
        Commands::AccountId { keys, lookup, .. } => handle_account_id(keys, *lookup, &opts, &cancel),
        Commands::ScanResources {
            input, output_file, ..
        } => handle_scan_resources(input, output_file.as_deref(), &opts, &cancel),
    }
}
