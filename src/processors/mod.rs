//! Links that run a child chain per resource and stream its outputs into the parent chain.

pub mod concurrent;
pub mod dispatcher;
pub mod essential_args;
pub mod pool;
pub mod sequential;

pub use concurrent::PublicResourcesProcessor;
pub use dispatcher::{ChainRegistry, ResourceDispatcher};
pub use essential_args::{
    AZURE_RESOURCE_CHAIN_ARGS, PUBLIC_RESOURCE_ARGS, RESOURCE_CHAIN_ARGS, essential_args,
};
pub use sequential::ResourceChainProcessor;
