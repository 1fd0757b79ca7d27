//! Application configuration constants.

use std::sync::OnceLock;

// ---- Package / paths (from CARGO_PKG_NAME, cached) ----

/// Package-derived names: built once from `CARGO_PKG_NAME`, then cached.
pub struct PackagePaths {
    pkg_name: &'static str,
    config_filename: String,
    cache_dir_name: String,
}

static PACKAGE_PATHS: OnceLock<PackagePaths> = OnceLock::new();

impl PackagePaths {
    pub fn get() -> &'static PackagePaths {
        PACKAGE_PATHS.get_or_init(|| {
            let pkg = env!("CARGO_PKG_NAME");
            PackagePaths {
                pkg_name: pkg,
                config_filename: format!(".{pkg}.toml"),
                cache_dir_name: format!("{pkg}-cache"),
            }
        })
    }

    pub fn pkg_name(&self) -> &str {
        self.pkg_name
    }

    /// Config file looked up in the working directory.
    pub fn config_filename(&self) -> &str {
        &self.config_filename
    }

    /// Default API response cache directory, under the system temp dir.
    pub fn cache_dir_name(&self) -> &str {
        &self.cache_dir_name
    }
}

// ---- Channels ----

/// Capacity of every inter-link channel unless a chain overrides it.
pub const DEFAULT_CHANNEL_CAP: usize = 1;

// ---- Worker pool ----

/// Child chains the concurrent processor runs at once when `workers` is unset or not positive.
pub const DEFAULT_WORKERS: usize = 20;

/// Environment variable consulted for the AWS profile when none is configured.
pub const PROFILE_ENV: &str = "AWS_PROFILE";
