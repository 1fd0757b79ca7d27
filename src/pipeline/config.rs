//! Configuration overlays applied to a chain before it starts.

use serde_json::Value;

use super::cancel::CancelToken;
use super::params::Args;

/// One overlay for [`Chain::with_configs`](super::Chain::with_configs). Overlays are applied in
/// order; for argument keys the last writer wins.
#[derive(Clone, Debug)]
pub enum Config {
    /// Arguments every key of which must be declared by some link in the chain.
    Args(Args),
    /// Arguments inherited from a parent chain; keys no link declares are dropped.
    InheritedArgs(Args),
    /// Cancellation context for the chain (and, transitively, its child chains).
    Context(CancelToken),
    /// Capacity of every inter-link channel, including the chain's input and output.
    ChannelCapacity(usize),
}

pub fn with_args(args: Args) -> Config {
    Config::Args(args)
}

pub fn with_arg(name: &str, value: impl Into<Value>) -> Config {
    Config::Args(Args::from([(name.to_string(), value.into())]))
}

pub fn with_inherited_args(args: Args) -> Config {
    Config::InheritedArgs(args)
}

pub fn with_context(token: CancelToken) -> Config {
    Config::Context(token)
}

pub fn with_channel_capacity(cap: usize) -> Config {
    Config::ChannelCapacity(cap)
}
