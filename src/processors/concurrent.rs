//! Concurrent resource-chain processor: up to `workers` child chains in flight at once.

use anyhow::Context;
use crossbeam_utils::sync::WaitGroup;
use log::{debug, error, warn};
use std::any::Any;
use std::marker::PhantomData;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

use crate::error::{ChainError, panic_message};
use crate::options::{recon_base_options, workers};
use crate::pipeline::{BoundArgs, Link, LinkContext, Param};
use crate::types::ResourceChainPair;
use crate::utils::config::DEFAULT_WORKERS;

use super::essential_args::PUBLIC_RESOURCE_ARGS;
use super::pool::Semaphore;
use super::sequential::drive_child;

/// Shared state of the worker pool, created at initialize.
struct WorkerPool {
    slots: Semaphore,
    /// Taken when the pool is drained; every worker holds a clone until it exits.
    group: Option<WaitGroup>,
    send_lock: Arc<Mutex<()>>,
    failures: Arc<Mutex<Vec<ChainError>>>,
    spawned: AtomicUsize,
}

impl WorkerPool {
    /// Block until every spawned worker has finished.
    fn drain(&mut self) {
        if let Some(group) = self.group.take() {
            group.wait();
        }
    }
}

/// Runs each incoming pair's child chain on its own worker thread, at most `workers` at once.
///
/// `process` returns as soon as a worker slot is taken, so it blocks upstream only while every
/// slot is busy. Outputs of different resources interleave; each resource's outputs keep their
/// order. A failing or panicking worker is logged and counted without stopping its peers; the
/// count is reported by `complete`, which returns only after every worker has finished.
pub struct PublicResourcesProcessor<O> {
    allowed: &'static [&'static str],
    pool: Option<WorkerPool>,
    _output: PhantomData<fn() -> O>,
}

impl<O> PublicResourcesProcessor<O> {
    pub fn new() -> Self {
        Self {
            allowed: PUBLIC_RESOURCE_ARGS,
            pool: None,
            _output: PhantomData,
        }
    }

    pub fn with_allowed_args(mut self, allowed: &'static [&'static str]) -> Self {
        self.allowed = allowed;
        self
    }
}

impl<O> Default for PublicResourcesProcessor<O> {
    fn default() -> Self {
        Self::new()
    }
}

/// `workers` as configured, with non-positive values falling back to the default.
fn worker_count(args: &BoundArgs) -> Result<usize, ChainError> {
    let requested: i64 = args.get_opt("workers")?.unwrap_or(DEFAULT_WORKERS as i64);
    if requested <= 0 {
        warn!(
            "workers must be positive (got {}), using {}",
            requested, DEFAULT_WORKERS
        );
        return Ok(DEFAULT_WORKERS);
    }
    Ok(requested as usize)
}

impl<O: Any + Send> Link for PublicResourcesProcessor<O> {
    type Input = ResourceChainPair;

    fn params(&self) -> Vec<Param> {
        let mut params = recon_base_options();
        params.push(workers());
        params
    }

    fn initialize(&mut self, args: &BoundArgs) -> anyhow::Result<()> {
        let count = worker_count(args)?;
        debug!("starting resource worker pool with {} slot(s)", count);
        self.pool = Some(WorkerPool {
            slots: Semaphore::new(count),
            group: Some(WaitGroup::new()),
            send_lock: Arc::new(Mutex::new(())),
            failures: Arc::new(Mutex::new(Vec::new())),
            spawned: AtomicUsize::new(0),
        });
        Ok(())
    }

    fn process(&mut self, pair: ResourceChainPair, ctx: &LinkContext) -> anyhow::Result<()> {
        let Some(pool) = &self.pool else {
            return Err(ChainError::NotInitialized(ctx.name().to_string()).into());
        };
        let Some(group) = pool.group.clone() else {
            return Err(ChainError::LinkInternal {
                link: ctx.name().to_string(),
                message: "worker pool already drained".to_string(),
            }
            .into());
        };

        let permit = pool.slots.acquire(ctx.cancel_token())?;
        let id = pool.spawned.fetch_add(1, Ordering::Relaxed);
        let label = pair.resource.to_string();
        let allowed = self.allowed;
        let send_lock = Arc::clone(&pool.send_lock);
        let failures = Arc::clone(&pool.failures);
        let ctx = ctx.clone();

        thread::Builder::new()
            .name(format!("resource-worker-{}", id))
            .spawn(move || {
                // Dropped in reverse: ctx, then the slot, then the wait-group entry.
                let _group = group;
                let _slot = permit;
                let ctx = ctx;

                let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                    drive_child::<O>(pair, &ctx, allowed, Some(send_lock.as_ref()))
                }));
                let failure = match outcome {
                    Ok(Ok(())) => None,
                    Ok(Err(e)) if e.is_cancelled() => {
                        debug!("worker for {} cancelled", label);
                        None
                    }
                    Ok(Err(e)) => {
                        error!("worker for {} failed: {}", label, e);
                        Some(e)
                    }
                    Err(payload) => {
                        let message = panic_message(payload.as_ref());
                        error!("worker for {} panicked: {}", label, message);
                        Some(ChainError::LinkInternal {
                            link: ctx.name().to_string(),
                            message: format!("worker for {} panicked: {}", label, message),
                        })
                    }
                };
                if let Some(e) = failure {
                    failures
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .push(e);
                }
            })
            .context("failed to spawn resource worker")?;
        Ok(())
    }

    fn complete(&mut self, _ctx: &LinkContext) -> anyhow::Result<()> {
        let Some(pool) = &mut self.pool else {
            return Ok(());
        };
        pool.drain();
        let errors = std::mem::take(&mut *pool.failures.lock().unwrap_or_else(PoisonError::into_inner));
        debug!(
            "all {} resource worker(s) finished, {} failed",
            pool.spawned.load(Ordering::Relaxed),
            errors.len()
        );
        if errors.is_empty() {
            return Ok(());
        }
        Err(ChainError::WorkersFailed {
            failed: errors.len(),
            errors,
        }
        .into())
    }

    fn close(&mut self) {
        if let Some(pool) = &mut self.pool {
            pool.drain();
        }
    }
}
