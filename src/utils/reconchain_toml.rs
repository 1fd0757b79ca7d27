//! Load `.reconchain.toml` (CLI only). The library never reads it; callers pass chain args.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::Opts;
use crate::utils::LogLevel;
use crate::utils::config::PackagePaths;

#[derive(Debug, Default, Deserialize)]
pub struct ReconchainToml {
    #[serde(default)]
    settings: SettingsSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct SettingsSection {
    log_level: Option<LogLevel>,
    workers: Option<i64>,
    profile: Option<String>,
    profile_dir: Option<String>,
    regions: Option<Vec<String>>,
    cache_dir: Option<String>,
    cache_ttl: Option<i64>,
    cache_ext: Option<String>,
    disable_cache: Option<bool>,
    cache_error_resp: Option<bool>,
    known_accounts_file: Option<String>,
    sequential: Option<bool>,
}

/// Default config file location: `.reconchain.toml` in `dir`.
pub fn default_config_path(dir: &Path) -> PathBuf {
    dir.join(PackagePaths::get().config_filename())
}

/// Load the config file at `path`. None if the file is missing, unreadable or malformed
/// (malformed files are logged).
pub fn load_reconchain_toml(path: &Path) -> Option<ReconchainToml> {
    let s = std::fs::read_to_string(path).ok()?;
    toml::from_str(&s)
        .map_err(|e| log::warn!("{}: {}", path.display(), e))
        .ok()
}

/// Overwrite opts field from file when present.
macro_rules! apply_file_opt {
    ($section:expr, $opts:expr, some $field:ident) => {
        if let Some(v) = $section.$field.clone() {
            $opts.$field = Some(v);
        }
    };
    ($section:expr, $opts:expr, $field:ident) => {
        if let Some(v) = $section.$field.clone() {
            $opts.$field = v;
        }
    };
}

/// Apply file config to opts (only fields present in the file). Call before applying CLI flags.
pub fn apply_file_to_opts(file: &ReconchainToml, opts: &mut Opts) {
    let s = &file.settings;
    apply_file_opt!(s, opts, log_level);
    apply_file_opt!(s, opts, some workers);
    apply_file_opt!(s, opts, some profile);
    apply_file_opt!(s, opts, some profile_dir);
    apply_file_opt!(s, opts, some regions);
    apply_file_opt!(s, opts, some cache_dir);
    apply_file_opt!(s, opts, some cache_ttl);
    apply_file_opt!(s, opts, some cache_ext);
    apply_file_opt!(s, opts, some disable_cache);
    apply_file_opt!(s, opts, some cache_error_resp);
    apply_file_opt!(s, opts, some known_accounts_file);
    apply_file_opt!(s, opts, sequential);
}
