//! Access key ID → owning AWS account ID, decoded offline from the key itself.

use anyhow::{Context, Result, bail};
use data_encoding::BASE32_NOPAD;
use log::{debug, info};

use crate::options::access_key_id;
use crate::pipeline::{BoundArgs, Link, LinkContext, Param};

/// Prefixes of long-term (`AKIA`) and temporary (`ASIA`) access keys.
const KEY_PREFIXES: [&str; 2] = ["AKIA", "ASIA"];
const ACCOUNT_MASK: u64 = 0x7fff_ffff_ff80;

/// Account ID encoded in an access key ID.
///
/// `Ok(None)` for strings that are not AKIA/ASIA keys; an error when the part after the prefix
/// is not valid base32 or too short to carry an account.
pub fn account_id_from_access_key(key: &str) -> Result<Option<String>> {
    let Some(body) = KEY_PREFIXES.iter().find_map(|p| key.strip_prefix(p)) else {
        return Ok(None);
    };
    let decoded = BASE32_NOPAD
        .decode(body.as_bytes())
        .with_context(|| format!("failed to decode AWS key ID {}", key))?;
    if decoded.len() < 6 {
        bail!("AWS key ID {} is too short to hold an account ID", key);
    }
    let mut buf = [0u8; 8];
    buf[2..].copy_from_slice(&decoded[..6]);
    let account = (u64::from_be_bytes(buf) & ACCOUNT_MASK) >> 7;
    Ok(Some(account.to_string()))
}

/// Emits the account ID of every access key it receives. Strings that are not access keys are
/// skipped. Keys given through `access-key-id` are decoded once the input is exhausted.
#[derive(Default)]
pub struct AccessKeyToAccountId {
    param_keys: Vec<String>,
}

impl AccessKeyToAccountId {
    pub fn new() -> Self {
        Self::default()
    }

    fn emit(&self, key: &str, ctx: &LinkContext) -> Result<()> {
        match account_id_from_access_key(key)? {
            Some(account) => {
                debug!("{} belongs to account {}", key, account);
                ctx.send(account)?;
            }
            None => debug!("skipping non-AKIA/ASIA key {}", key),
        }
        Ok(())
    }
}

impl Link for AccessKeyToAccountId {
    type Input = String;

    fn params(&self) -> Vec<Param> {
        vec![access_key_id()]
    }

    fn initialize(&mut self, args: &BoundArgs) -> Result<()> {
        self.param_keys = args.get_opt("access-key-id")?.unwrap_or_default();
        if !self.param_keys.is_empty() {
            info!("got {} access key ID(s) from parameters", self.param_keys.len());
        }
        Ok(())
    }

    fn process(&mut self, key: String, ctx: &LinkContext) -> Result<()> {
        self.emit(&key, ctx)
    }

    fn complete(&mut self, ctx: &LinkContext) -> Result<()> {
        for key in std::mem::take(&mut self.param_keys) {
            self.emit(&key, ctx)?;
        }
        Ok(())
    }
}
