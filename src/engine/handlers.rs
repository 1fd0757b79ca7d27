//! Command handlers for account-id and scan-resources.

use anyhow::{Context, Result, bail};
use log::{debug, info, warn};
use serde::Serialize;
use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::Path;
use std::thread;

use crate::links::{AccessKeyToAccountId, KnownAccountId, key_scan_registry};
use crate::pipeline::{CancelToken, Chain, Config, with_arg};
use crate::processors::{PublicResourcesProcessor, ResourceChainProcessor, ResourceDispatcher};
use crate::types::{AccessKeyFinding, KnownAccount, Opts, Resource};

fn write_json_line<W: Write, T: Serialize>(out: &mut W, value: &T) -> Result<()> {
    serde_json::to_writer(&mut *out, value)?;
    writeln!(out)?;
    Ok(())
}

/// Fail with the chain's error, if it recorded one.
fn chain_result(chain: &Chain) -> Result<()> {
    match chain.error() {
        Some(e) if e.is_cancelled() => bail!("interrupted"),
        Some(e) => Err(e).context("chain failed"),
        None => Ok(()),
    }
}

/// Decode each key's account ID; with `lookup`, report only accounts of known parties.
pub fn handle_account_id(
    keys: &[String],
    lookup: bool,
    opts: &Opts,
    cancel: &CancelToken,
) -> Result<()> {
    let mut builder = Chain::builder()
        .link(AccessKeyToAccountId::new())
        .config(Config::Context(cancel.clone()))
        .config(with_arg("access-key-id", keys));
    if lookup {
        builder = builder.link(KnownAccountId::new());
        if let Some(path) = &opts.known_accounts_file {
            builder = builder.config(with_arg("known-accounts-file", path.as_str()));
        }
    }
    let chain = builder.build();
    chain.close();

    let stdout = io::stdout();
    let mut out = stdout.lock();
    if lookup {
        let mut found = 0usize;
        while let Some(account) = chain.recv_as::<KnownAccount>() {
            write_json_line(&mut out, &account)?;
            found += 1;
        }
        info!("{} known account(s) matched", found);
    } else {
        while let Some(account_id) = chain.recv_as::<String>() {
            writeln!(out, "{}", account_id)?;
        }
    }
    chain.wait();
    chain_result(&chain)
}

/// Resources from a JSON array or JSON lines.
pub fn parse_resources(raw: &str) -> Result<Vec<Resource>> {
    let trimmed = raw.trim_start();
    if trimmed.starts_with('[') {
        return serde_json::from_str(trimmed).context("failed to parse resource array");
    }
    raw.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line).with_context(|| format!("line {}: invalid resource", i + 1))
        })
        .collect()
}

fn read_input(input: &str) -> Result<String> {
    let mut raw = String::new();
    if input == "-" {
        io::stdin().read_to_string(&mut raw).context("failed to read stdin")?;
    } else {
        raw = std::fs::read_to_string(input).with_context(|| format!("failed to read {}", input))?;
    }
    Ok(raw)
}

/// Build the dispatcher → processor chain used for key scanning.
pub fn scan_chain(opts: &Opts, cancel: &CancelToken) -> Chain {
    let mut args = opts.chain_args();
    let builder = Chain::builder().link(ResourceDispatcher::new(key_scan_registry()));
    let builder = if opts.sequential {
        builder.link(ResourceChainProcessor::<AccessKeyFinding>::new())
    } else {
        if let Some(workers) = opts.workers {
            args.insert("workers".to_string(), workers.into());
        }
        builder.link(PublicResourcesProcessor::<AccessKeyFinding>::new())
    };
    builder
        .config(Config::Context(cancel.clone()))
        .with_args(args)
        .build()
}

/// Scan resources for embedded access keys and write findings as JSON lines.
pub fn handle_scan_resources(
    input: &str,
    output_file: Option<&Path>,
    opts: &Opts,
    cancel: &CancelToken,
) -> Result<()> {
    let resources = parse_resources(&read_input(input)?)?;
    info!("scanning {} resource(s)", resources.len());

    let mut out: Box<dyn Write> = match output_file {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("failed to create {}", path.display()))?,
        )),
        None => Box::new(BufWriter::new(io::stdout())),
    };

    let chain = scan_chain(opts, cancel);
    let mut findings = 0usize;
    thread::scope(|s| -> Result<()> {
        // Feed while draining: the chain blocks on full channels.
        s.spawn(|| {
            for resource in resources {
                if let Err(e) = chain.send(resource) {
                    warn!("stopped feeding resources: {}", e);
                    break;
                }
            }
            chain.close();
        });
        while let Some(finding) = chain.recv_as::<AccessKeyFinding>() {
            if let Err(e) = write_json_line(&mut out, &finding) {
                // Unblock the feeder before the scope joins it.
                chain.cancel();
                return Err(e);
            }
            findings += 1;
        }
        Ok(())
    })?;
    chain.wait();
    out.flush()?;
    debug!("{} finding(s) written", findings);
    chain_result(&chain)
}
