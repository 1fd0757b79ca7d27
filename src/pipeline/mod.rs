//! Pipeline substrate: links, chains, typed item forwarding, parameters and cancellation.

pub mod cancel;
pub mod chain;
pub mod config;
pub mod link;
pub mod params;

pub use cancel::CancelToken;
pub use chain::{Chain, ChainBuilder};
pub use config::{
    Config, with_arg, with_args, with_channel_capacity, with_context, with_inherited_args,
};
pub use link::{Item, Link, LinkContext};
pub use params::{Args, BoundArgs, Param, ParamKind};
