//! Sequential resource-chain processor: one child chain at a time, outputs in input order.

use log::{debug, error};
use std::any::{Any, type_name};
use std::marker::PhantomData;
use std::sync::{Mutex, PoisonError};

use crate::error::ChainError;
use crate::options::recon_base_options;
use crate::pipeline::{Chain, Config, Link, LinkContext, Param};
use crate::types::ResourceChainPair;

use super::essential_args::{RESOURCE_CHAIN_ARGS, essential_args};

/// Runs the child chain of each incoming [`ResourceChainPair`] to completion and forwards its
/// `O` outputs downstream before taking the next pair.
pub struct ResourceChainProcessor<O> {
    allowed: &'static [&'static str],
    _output: PhantomData<fn() -> O>,
}

impl<O> ResourceChainProcessor<O> {
    pub fn new() -> Self {
        Self {
            allowed: RESOURCE_CHAIN_ARGS,
            _output: PhantomData,
        }
    }

    /// Replace the set of parent args forwarded into child chains.
    pub fn with_allowed_args(mut self, allowed: &'static [&'static str]) -> Self {
        self.allowed = allowed;
        self
    }
}

impl<O> Default for ResourceChainProcessor<O> {
    fn default() -> Self {
        Self::new()
    }
}

impl<O: Any + Send> Link for ResourceChainProcessor<O> {
    type Input = ResourceChainPair;

    fn params(&self) -> Vec<Param> {
        recon_base_options()
    }

    fn process(&mut self, pair: ResourceChainPair, ctx: &LinkContext) -> anyhow::Result<()> {
        drive_child::<O>(pair, ctx, self.allowed, None)?;
        Ok(())
    }
}

/// Build, seed and drain the child chain of `pair`, forwarding each `O` it emits through `ctx`.
///
/// Outputs are consumed while the child runs and only then is the child waited on: its links
/// block on full channels, so waiting first would never return. With `send_lock`, every
/// forward to the parent happens under that lock.
pub(crate) fn drive_child<O: Any + Send>(
    pair: ResourceChainPair,
    ctx: &LinkContext,
    allowed: &[&str],
    send_lock: Option<&Mutex<()>>,
) -> Result<(), ChainError> {
    let ResourceChainPair {
        resource,
        constructor,
        args,
    } = pair;
    debug!("processing resource chain for {}", resource);

    let mut child = constructor();
    child.with_configs([
        Config::InheritedArgs(essential_args(&args, allowed)),
        Config::Context(ctx.cancel_token().clone()),
    ]);

    let label = resource.to_string();
    if let Err(e) = child.send(resource) {
        error!("failed to send {} to its chain: {}", label, e);
        child.close();
        child.wait();
        return Err(child_outcome(&child, &label).err().unwrap_or(e));
    }
    child.close();

    while let Some(output) = child.recv_as::<O>() {
        debug!("forwarding {} from {}", type_name::<O>(), label);
        let sent = match send_lock {
            Some(lock) => {
                let _held = lock.lock().unwrap_or_else(PoisonError::into_inner);
                ctx.send(output)
            }
            None => ctx.send(output),
        };
        if let Err(e) = sent {
            if !e.is_cancelled() {
                error!("failed to forward output of {}: {}", label, e);
            }
            child.cancel();
            child.wait();
            return Err(e);
        }
    }

    child.wait();
    child_outcome(&child, &label)?;
    debug!("completed resource chain for {}", label);
    Ok(())
}

/// The child's error as seen by the parent: `Cancelled` passes through, anything else is
/// wrapped as `ChildFailed` for `resource`.
fn child_outcome(child: &Chain, resource: &str) -> Result<(), ChainError> {
    match child.error() {
        None => Ok(()),
        Some(ChainError::Cancelled) => Err(ChainError::Cancelled),
        Some(e) => Err(ChainError::ChildFailed {
            resource: resource.to_string(),
            source: Box::new(e),
        }),
    }
}

