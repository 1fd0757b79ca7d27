//! Public item types that flow between links.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use crate::pipeline::{Args, Chain};
use crate::utils::LogLevel;

/// A cloud resource handed to a per-resource child chain. Immutable while in flight.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    /// Provider type name, e.g. `AWS::Lambda::Function`.
    #[serde(alias = "TypeName")]
    pub type_name: String,
    #[serde(alias = "Identifier")]
    pub identifier: String,
    #[serde(default, alias = "Region", skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, alias = "AccountId", skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    /// Opaque provider payload (resource properties).
    #[serde(default, alias = "Properties", alias = "properties")]
    pub payload: Value,
}

impl Resource {
    pub fn new(type_name: &str, identifier: &str) -> Self {
        Self {
            type_name: type_name.to_string(),
            identifier: identifier.to_string(),
            region: None,
            account_id: None,
            payload: Value::Null,
        }
    }

    pub fn with_region(mut self, region: &str) -> Self {
        self.region = Some(region.to_string());
        self
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.type_name, self.identifier)
    }
}

/// Builds a fresh child chain; called once per pair.
pub type ChainConstructor = Box<dyn FnOnce() -> Chain + Send>;

/// Shareable chain factory, as stored in a registry. Turned into a [`ChainConstructor`] per pair.
pub type ChainFactory = Arc<dyn Fn() -> Chain + Send + Sync>;

/// What to build for one resource: the resource, its child-chain constructor, and the
/// arguments of the chain that produced the pair.
pub struct ResourceChainPair {
    pub resource: Resource,
    pub constructor: ChainConstructor,
    pub args: Args,
}

impl ResourceChainPair {
    pub fn new<F>(resource: Resource, constructor: F, args: Args) -> Self
    where
        F: FnOnce() -> Chain + Send + 'static,
    {
        Self {
            resource,
            constructor: Box::new(constructor),
            args,
        }
    }

    pub fn from_factory(resource: Resource, factory: &ChainFactory, args: Args) -> Self {
        let factory = Arc::clone(factory);
        Self::new(resource, move || factory(), args)
    }
}

impl fmt::Debug for ResourceChainPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceChainPair")
            .field("resource", &self.resource)
            .field("args", &self.args)
            .finish_non_exhaustive()
    }
}

/// A publicly known AWS account (vendor, canary service, ...).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KnownAccount {
    pub id: String,
    pub owner: String,
    #[serde(default)]
    pub source: Value,
    #[serde(default)]
    pub description: String,
}

/// An access key found inside a resource, attributed to its owning account when decodable.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessKeyFinding {
    pub resource_type: String,
    pub resource_id: String,
    pub access_key: String,
    pub account_id: Option<String>,
}

/// Run options (CLI). Config file values are applied first, then command-line flags.
#[derive(Clone, Debug, Default)]
pub struct Opts {
    pub log_level: LogLevel,
    /// Concurrent child chains; None uses the processor default.
    pub workers: Option<i64>,
    /// AWS profile; falls back to `AWS_PROFILE` when unset.
    pub profile: Option<String>,
    pub profile_dir: Option<String>,
    pub regions: Option<Vec<String>>,
    pub cache_dir: Option<String>,
    pub cache_ttl: Option<i64>,
    pub cache_ext: Option<String>,
    pub disable_cache: Option<bool>,
    pub cache_error_resp: Option<bool>,
    /// JSON file of extra known accounts for the account lookup.
    pub known_accounts_file: Option<String>,
    /// Process resources one at a time, keeping output in input order.
    pub sequential: bool,
}

impl Opts {
    /// Chain arguments for every option that is set, keyed by parameter name.
    pub fn chain_args(&self) -> Args {
        let mut args = Args::new();
        let mut put = |name: &str, value: Option<Value>| {
            if let Some(v) = value {
                args.insert(name.to_string(), v);
            }
        };
        put("profile", self.profile.clone().map(Value::from));
        put("profile-dir", self.profile_dir.clone().map(Value::from));
        put("regions", self.regions.clone().map(Value::from));
        put("cache-dir", self.cache_dir.clone().map(Value::from));
        put("cache-ttl", self.cache_ttl.map(Value::from));
        put("cache-ext", self.cache_ext.clone().map(Value::from));
        put("disable-cache", self.disable_cache.map(Value::from));
        put("cache-error-resp", self.cache_error_resp.map(Value::from));
        args
    }
}
