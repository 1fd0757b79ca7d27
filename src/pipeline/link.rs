//! The link authoring surface: the [`Link`] trait, its type-erased form, and the per-link
//! context used to read arguments and send items downstream.

use crossbeam_channel::{Sender, select};
use std::any::{Any, type_name};
use std::sync::Arc;

use crate::error::ChainError;

use super::cancel::CancelToken;
use super::params::{Args, BoundArgs, Param};

/// A value in flight between links. Links receive it downcast to their declared input type.
pub type Item = Box<dyn Any + Send>;

/// One processing stage of a chain.
///
/// The chain drives every link on its own thread: `initialize` once, `process` for each input,
/// `complete` once the input is exhausted, then `close` (also after failures).
pub trait Link: Send + 'static {
    /// Input type this link accepts. Anything else arriving on its channel is a `TypeMismatch`.
    type Input: Any + Send;

    fn name(&self) -> String {
        let full = type_name::<Self>();
        let base = full.split('<').next().unwrap_or(full);
        base.rsplit("::").next().unwrap_or(base).to_string()
    }

    fn params(&self) -> Vec<Param> {
        Vec::new()
    }

    fn initialize(&mut self, _args: &BoundArgs) -> anyhow::Result<()> {
        Ok(())
    }

    fn process(&mut self, input: Self::Input, ctx: &LinkContext) -> anyhow::Result<()>;

    fn complete(&mut self, _ctx: &LinkContext) -> anyhow::Result<()> {
        Ok(())
    }

    fn close(&mut self) {}
}

/// Object-safe form of [`Link`] stored by the chain.
pub(crate) trait DynLink: Send {
    fn name(&self) -> String;
    fn params(&self) -> Vec<Param>;
    fn initialize(&mut self, args: &BoundArgs) -> Result<(), ChainError>;
    fn process_item(&mut self, item: Item, ctx: &LinkContext) -> Result<(), ChainError>;
    fn complete(&mut self, ctx: &LinkContext) -> Result<(), ChainError>;
    fn close(&mut self);
}

impl<L: Link> DynLink for L {
    fn name(&self) -> String {
        Link::name(self)
    }

    fn params(&self) -> Vec<Param> {
        Link::params(self)
    }

    fn initialize(&mut self, args: &BoundArgs) -> Result<(), ChainError> {
        Link::initialize(self, args).map_err(|e| ChainError::from_link(&Link::name(self), e))
    }

    fn process_item(&mut self, item: Item, ctx: &LinkContext) -> Result<(), ChainError> {
        match item.downcast::<L::Input>() {
            Ok(input) => Link::process(self, *input, ctx).map_err(|e| ChainError::from_link(ctx.name(), e)),
            Err(_) => Err(ChainError::TypeMismatch {
                link: ctx.name().to_string(),
                expected: type_name::<L::Input>(),
            }),
        }
    }

    fn complete(&mut self, ctx: &LinkContext) -> Result<(), ChainError> {
        Link::complete(self, ctx).map_err(|e| ChainError::from_link(ctx.name(), e))
    }

    fn close(&mut self) {
        Link::close(self)
    }
}

/// Handle a running link uses to read its arguments and forward items.
///
/// Cloning is cheap; clones share the downstream channel, so a link may hand a clone to
/// worker threads that send on its behalf.
#[derive(Clone)]
pub struct LinkContext {
    name: Arc<str>,
    args: Arc<BoundArgs>,
    chain_args: Arc<Args>,
    output: Sender<Item>,
    cancel: CancelToken,
}

impl LinkContext {
    pub(crate) fn new(
        name: &str,
        args: BoundArgs,
        chain_args: Arc<Args>,
        output: Sender<Item>,
        cancel: CancelToken,
    ) -> Self {
        Self {
            name: Arc::from(name),
            args: Arc::new(args),
            chain_args,
            output,
            cancel,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Arguments bound to this link's declared parameters.
    pub fn args(&self) -> &BoundArgs {
        &self.args
    }

    /// Every argument set on the chain, declared by this link or not.
    pub fn chain_args(&self) -> &Args {
        &self.chain_args
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Move `item` to the next link. Blocks while the downstream channel is full; returns
    /// `Cancelled` if the chain is aborting and `SendFailed` if downstream has gone away.
    pub fn send<T: Any + Send>(&self, item: T) -> Result<(), ChainError> {
        self.send_item(Box::new(item))
    }

    /// [`send`](Self::send) for an already type-erased item.
    pub fn send_item(&self, item: Item) -> Result<(), ChainError> {
        if self.cancel.is_cancelled() {
            return Err(ChainError::Cancelled);
        }
        select! {
            send(self.output, item) -> res => res.map_err(|_| {
                ChainError::SendFailed(format!("{}: downstream channel closed", self.name))
            }),
            recv(self.cancel.done()) -> _ => Err(ChainError::Cancelled),
        }
    }
}
