//! Match account IDs against publicly known accounts.

use anyhow::{Context, Result};
use log::{debug, info};
use serde_json::Value;
use std::fs;

use crate::options::known_accounts_file;
use crate::pipeline::{BoundArgs, Link, LinkContext, Param};
use crate::types::KnownAccount;

/// AWS accounts owned by the Canary Tokens service.
pub const CANARY_TOKEN_ACCOUNTS: [&str; 9] = [
    "052310077262",
    "171436882533",
    "534261010715",
    "595918472158",
    "717712589309",
    "819147034852",
    "992382622183",
    "730335385048",
    "266735846894",
];

/// Built-in known accounts.
pub fn builtin_known_accounts() -> Vec<KnownAccount> {
    CANARY_TOKEN_ACCOUNTS
        .iter()
        .map(|id| KnownAccount {
            id: id.to_string(),
            owner: "Thinkst".to_string(),
            source: Value::Null,
            description: "Canary Tokens AWS account".to_string(),
        })
        .collect()
}

/// Load `[{id, owner, source, description}, ...]` from a JSON file.
pub fn load_known_accounts(path: &str) -> Result<Vec<KnownAccount>> {
    let raw = fs::read_to_string(path).with_context(|| format!("failed to read {}", path))?;
    serde_json::from_str(&raw).with_context(|| format!("failed to parse known accounts in {}", path))
}

/// Emits the [`KnownAccount`] record for each account ID that belongs to a known party.
/// Unknown IDs produce nothing.
#[derive(Default)]
pub struct KnownAccountId {
    accounts: Vec<KnownAccount>,
}

impl KnownAccountId {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Link for KnownAccountId {
    type Input = String;

    fn params(&self) -> Vec<Param> {
        vec![known_accounts_file()]
    }

    fn initialize(&mut self, args: &BoundArgs) -> Result<()> {
        let mut accounts = Vec::new();
        if let Some(path) = args.get_opt::<String>("known-accounts-file")? {
            accounts = load_known_accounts(&path)?;
            info!("loaded {} known account(s) from {}", accounts.len(), path);
        }
        accounts.extend(builtin_known_accounts());
        self.accounts = accounts;
        Ok(())
    }

    fn process(&mut self, id: String, ctx: &LinkContext) -> Result<()> {
        match self.accounts.iter().find(|a| a.id == id) {
            Some(account) => {
                debug!("{} is a known account of {}", id, account.owner);
                ctx.send(account.clone())?;
            }
            None => debug!("{} is not a known account", id),
        }
        Ok(())
    }
}
