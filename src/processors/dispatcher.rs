//! Routes resources to the child chain registered for their type.

use log::{debug, warn};
use std::collections::HashMap;
use std::sync::Arc;

use crate::options::recon_base_options;
use crate::pipeline::{Chain, Link, LinkContext, Param};
use crate::types::{ChainFactory, Resource, ResourceChainPair};

/// Resource type name → constructor of the child chain that handles it.
#[derive(Clone, Default)]
pub struct ChainRegistry {
    factories: HashMap<String, ChainFactory>,
}

impl ChainRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(mut self, type_name: &str, factory: F) -> Self
    where
        F: Fn() -> Chain + Send + Sync + 'static,
    {
        self.factories.insert(type_name.to_string(), Arc::new(factory));
        self
    }

    pub fn get(&self, type_name: &str) -> Option<&ChainFactory> {
        self.factories.get(type_name)
    }

    pub fn supports(&self, type_name: &str) -> bool {
        self.factories.contains_key(type_name)
    }

    /// Registered type names, sorted.
    pub fn types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }
}

/// Turns each incoming [`Resource`] into a [`ResourceChainPair`] for a resource-chain
/// processor. Pairs carry every argument of the dispatching chain; the processor decides
/// which of them reach the child. Unsupported resource types are skipped.
pub struct ResourceDispatcher {
    registry: ChainRegistry,
}

impl ResourceDispatcher {
    pub fn new(registry: ChainRegistry) -> Self {
        Self { registry }
    }
}

impl Link for ResourceDispatcher {
    type Input = Resource;

    fn params(&self) -> Vec<Param> {
        recon_base_options()
    }

    fn process(&mut self, resource: Resource, ctx: &LinkContext) -> anyhow::Result<()> {
        let Some(factory) = self.registry.get(&resource.type_name) else {
            warn!("no chain registered for {}, skipping {}", resource.type_name, resource.identifier);
            return Ok(());
        };
        debug!("dispatching {}", resource);
        let pair = ResourceChainPair::from_factory(resource, factory, ctx.chain_args().clone());
        ctx.send(pair)?;
        Ok(())
    }
}
