//! Find access key IDs embedded in resource payloads.

use anyhow::Result;
use log::debug;
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::LazyLock;

use crate::pipeline::{Chain, Link, LinkContext};
use crate::processors::ChainRegistry;
use crate::types::{AccessKeyFinding, Resource};

use super::access_key::account_id_from_access_key;

/// `AKIA`/`ASIA` followed by 16 base32 characters, as a whole word.
static ACCESS_KEY_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\b(?:AKIA|ASIA)[A-Z2-7]{16}\b").ok());

/// Access-key-shaped tokens in `text`, in order of appearance.
pub fn find_access_keys(text: &str) -> Vec<&str> {
    match ACCESS_KEY_RE.as_ref() {
        Some(re) => re.find_iter(text).map(|m| m.as_str()).collect(),
        None => Vec::new(),
    }
}

fn collect_strings<'a>(value: &'a Value, out: &mut Vec<&'a str>) {
    match value {
        Value::String(s) => out.push(s),
        Value::Array(items) => items.iter().for_each(|v| collect_strings(v, out)),
        Value::Object(map) => map.values().for_each(|v| collect_strings(v, out)),
        _ => {}
    }
}

/// Walks each resource's payload and emits one [`AccessKeyFinding`] per distinct key.
#[derive(Default)]
pub struct ResourceKeyScanner;

impl ResourceKeyScanner {
    pub fn new() -> Self {
        Self
    }
}

impl Link for ResourceKeyScanner {
    type Input = Resource;

    fn process(&mut self, resource: Resource, ctx: &LinkContext) -> Result<()> {
        let mut strings = Vec::new();
        collect_strings(&resource.payload, &mut strings);

        let keys: BTreeSet<&str> = strings.into_iter().flat_map(find_access_keys).collect();
        debug!("{}: {} access key(s) found", resource, keys.len());
        for key in keys {
            ctx.send(AccessKeyFinding {
                resource_type: resource.type_name.clone(),
                resource_id: resource.identifier.clone(),
                access_key: key.to_string(),
                account_id: account_id_from_access_key(key).ok().flatten(),
            })?;
        }
        Ok(())
    }
}

/// Resource types whose payloads commonly carry credentials (user data, environment
/// variables, templates, task and state machine definitions).
pub const SCANNED_RESOURCE_TYPES: [&str; 11] = [
    "AWS::EC2::Instance",
    "AWS::Lambda::Function",
    "AWS::CloudFormation::Stack",
    "AWS::Logs::LogGroup",
    "AWS::Logs::MetricFilter",
    "AWS::Logs::SubscriptionFilter",
    "AWS::Logs::Destination",
    "AWS::ECR::Repository",
    "AWS::ECS::TaskDefinition",
    "AWS::SSM::Document",
    "AWS::StepFunctions::StateMachine",
];

/// Registry routing every type in [`SCANNED_RESOURCE_TYPES`] to a key-scanning child chain.
pub fn key_scan_registry() -> ChainRegistry {
    SCANNED_RESOURCE_TYPES
        .iter()
        .fold(ChainRegistry::new(), |registry, type_name| {
            registry.register(type_name, || {
                Chain::builder().link(ResourceKeyScanner::new()).build()
            })
        })
}
