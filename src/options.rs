//! Standard parameter descriptors shared by links and the CLI.

use std::env;

use crate::pipeline::Param;
use crate::utils::config::{DEFAULT_WORKERS, PackagePaths};

pub fn profile() -> Param {
    Param::string("profile", "AWS profile to use").with_shortcode("p")
}

pub fn profile_dir() -> Param {
    Param::string(
        "profile-dir",
        "Set to override the default AWS profile directory",
    )
}

pub fn regions() -> Param {
    Param::string_list("regions", "AWS regions to scan")
        .with_default(vec!["all"])
        .with_shortcode("r")
}

pub fn cache_dir() -> Param {
    let dir = env::temp_dir().join(PackagePaths::get().cache_dir_name());
    Param::string("cache-dir", "Directory to store API response cache files")
        .with_default(dir.to_string_lossy().into_owned())
}

pub fn cache_ext() -> Param {
    Param::string("cache-ext", "Name of AWS API response cache files extension")
        .with_default(".aws-cache")
}

pub fn cache_ttl() -> Param {
    Param::int("cache-ttl", "TTL for cached responses in seconds").with_default(3600)
}

pub fn cache_error_resp() -> Param {
    Param::bool("cache-error-resp", "Cache error response").with_default(false)
}

pub fn disable_cache() -> Param {
    Param::bool("disable-cache", "Disable API response caching").with_default(false)
}

pub fn workers() -> Param {
    Param::int("workers", "Number of concurrent resource workers")
        .with_default(DEFAULT_WORKERS as i64)
        .with_shortcode("w")
}

pub fn access_key_id() -> Param {
    Param::string_list("access-key-id", "AWS access key ID").with_shortcode("k")
}

pub fn known_accounts_file() -> Param {
    Param::string(
        "known-accounts-file",
        "JSON file of known accounts ([{id, owner, source, description}])",
    )
}

pub fn output_file() -> Param {
    Param::string("output-file", "Write results to this file instead of stdout")
}

/// Provider identity and caching parameters every recon link accepts.
pub fn recon_base_options() -> Vec<Param> {
    vec![
        profile(),
        profile_dir(),
        regions(),
        cache_dir(),
        cache_ext(),
        cache_ttl(),
        cache_error_resp(),
        disable_cache(),
    ]
}
