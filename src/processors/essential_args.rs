//! Allow-sets of parameters a child chain may inherit from its parent.

use log::debug;

use crate::pipeline::Args;

/// Provider identity, region selection and caching policy. Used by [`ResourceChainProcessor`].
///
/// [`ResourceChainProcessor`]: super::ResourceChainProcessor
pub const RESOURCE_CHAIN_ARGS: &[&str] = &[
    "profile",
    "profile-dir",
    "regions",
    "cache-dir",
    "cache-ttl",
    "disable-cache",
    "cache-ext",
    "cache-error-resp",
];

/// [`RESOURCE_CHAIN_ARGS`] without `profile-dir`. Used by [`PublicResourcesProcessor`].
///
/// [`PublicResourcesProcessor`]: super::PublicResourcesProcessor
pub const PUBLIC_RESOURCE_ARGS: &[&str] = &[
    "profile",
    "regions",
    "cache-dir",
    "cache-ttl",
    "disable-cache",
    "cache-ext",
    "cache-error-resp",
];

/// Azure child chains carry caching policy and their own worker count, no AWS identity.
pub const AZURE_RESOURCE_CHAIN_ARGS: &[&str] = &[
    "cache-dir",
    "cache-ttl",
    "disable-cache",
    "cache-ext",
    "cache-error-resp",
    "worker-count",
];

/// The subset of `args` whose keys are in `allow`. Everything else is dropped.
pub fn essential_args(args: &Args, allow: &[&str]) -> Args {
    args.iter()
        .filter(|(key, _)| {
            let keep = allow.contains(&key.as_str());
            if !keep {
                debug!("not forwarding '{}' to child chain", key);
            }
            keep
        })
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}
