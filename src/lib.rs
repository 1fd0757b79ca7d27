//! Reconchain: typed recon pipelines of links, with per-resource child chains run
//! sequentially or on a bounded worker pool.

pub mod engine;
pub mod error;
pub mod links;
pub mod options;
pub mod pipeline;
pub mod processors;
pub mod types;
pub mod utils;

/// Re-export types for API
pub use types::*;

pub use error::ChainError;
pub use pipeline::{CancelToken, Chain, Config, Link, LinkContext, Param};

/// Result alias used by the public reconchain API (links, CLI)
pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, Error>;
