//! Chains: an ordered list of links connected by bounded channels, one thread per link.

use crossbeam_channel::{Receiver, Sender, bounded, select};
use log::{debug, error, warn};
use std::any::{Any, type_name};
use std::collections::BTreeSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::thread::{self, JoinHandle};

use crate::error::ChainError;
use crate::utils::config::DEFAULT_CHANNEL_CAP;

use super::cancel::CancelToken;
use super::config::Config;
use super::link::{DynLink, Item, Link, LinkContext};
use super::params::{Args, BoundArgs, Param};

/// Errors recorded by a chain's links, shared with every link thread.
#[derive(Clone, Default)]
struct ErrorSink(Arc<Mutex<Vec<ChainError>>>);

impl ErrorSink {
    fn record(&self, err: ChainError) {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).push(err);
    }

    fn all(&self) -> Vec<ChainError> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// First fatal error, or a composite when there are several. `Cancelled` only surfaces
    /// when nothing else went wrong.
    fn summary(&self) -> Option<ChainError> {
        let errors = self.all();
        let mut fatal: Vec<ChainError> = errors.iter().filter(|e| !e.is_cancelled()).cloned().collect();
        match fatal.len() {
            0 => errors.into_iter().next(),
            1 => fatal.pop(),
            _ => Some(ChainError::Aggregate(fatal)),
        }
    }
}

/// Run a link hook, turning a panic into `LinkInternal`.
fn guarded<F>(link: &str, f: F) -> Result<(), ChainError>
where
    F: FnOnce() -> Result<(), ChainError>,
{
    panic::catch_unwind(AssertUnwindSafe(f))
        .unwrap_or_else(|payload| Err(ChainError::from_panic(link, payload.as_ref())))
}

/// Everything a chain needs before it starts; consumed on start.
struct Setup {
    links: Vec<Box<dyn DynLink>>,
    args: Args,
    strict_keys: BTreeSet<String>,
    capacity: usize,
}

/// Builder for [`Chain`]: links in pipeline order plus configuration overlays.
pub struct ChainBuilder {
    links: Vec<Box<dyn DynLink>>,
    configs: Vec<Config>,
}

impl ChainBuilder {
    pub fn link<L: Link>(mut self, link: L) -> Self {
        self.links.push(Box::new(link));
        self
    }

    pub fn config(mut self, config: Config) -> Self {
        self.configs.push(config);
        self
    }

    pub fn with_args(self, args: Args) -> Self {
        self.config(Config::Args(args))
    }

    pub fn build(self) -> Chain {
        let mut chain = Chain {
            setup: Mutex::new(Some(Setup {
                links: self.links,
                args: Args::new(),
                strict_keys: BTreeSet::new(),
                capacity: DEFAULT_CHANNEL_CAP,
            })),
            cancel: CancelToken::new(),
            input: Mutex::new(None),
            output: OnceLock::new(),
            handles: Mutex::new(Vec::new()),
            errors: ErrorSink::default(),
            args: OnceLock::new(),
        };
        chain.with_configs(self.configs);
        chain
    }
}

/// A pipeline of links presented as one unit: `send` seeds, `close`, drain with `recv_as`,
/// `wait`, then inspect `error`.
///
/// The chain starts lazily on the first `send`, `close`, `recv`/`recv_as` or `wait`. Starting
/// binds arguments, runs `initialize` on every link in order, and spawns one thread per link.
/// Outputs must be drained before (or while) waiting: links block on full channels.
pub struct Chain {
    setup: Mutex<Option<Setup>>,
    cancel: CancelToken,
    input: Mutex<Option<Sender<Item>>>,
    output: OnceLock<Receiver<Item>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    errors: ErrorSink,
    args: OnceLock<Arc<Args>>,
}

impl Chain {
    pub fn builder() -> ChainBuilder {
        ChainBuilder {
            links: Vec::new(),
            configs: Vec::new(),
        }
    }

    /// Apply configuration overlays. Only effective before the chain starts.
    pub fn with_configs<I>(&mut self, configs: I) -> &mut Self
    where
        I: IntoIterator<Item = Config>,
    {
        let Some(setup) = self
            .setup
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .as_mut()
        else {
            warn!("chain already started; configuration ignored");
            return self;
        };
        for config in configs {
            match config {
                Config::Args(args) => {
                    for (key, value) in args {
                        setup.strict_keys.insert(key.clone());
                        setup.args.insert(key, value);
                    }
                }
                Config::InheritedArgs(args) => setup.args.extend(args),
                // The chain cancels its own token on failure; a child keeps that local.
                Config::Context(token) => self.cancel = token.child(),
                Config::ChannelCapacity(cap) => setup.capacity = cap,
            }
        }
        self
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Abort the chain: blocking sends and receives in every link return promptly.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Arguments the chain runs with (after start: only keys some link declares).
    pub fn args(&self) -> Args {
        if let Some(args) = self.args.get() {
            return args.as_ref().clone();
        }
        self.setup
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|s| s.args.clone())
            .unwrap_or_default()
    }

    /// Deliver a seed item to the first link. Blocks under backpressure.
    pub fn send<T: Any + Send>(&self, item: T) -> Result<(), ChainError> {
        self.ensure_started();
        if self.cancel.is_cancelled() {
            return Err(ChainError::Cancelled);
        }
        let tx = self
            .input
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| ChainError::SendFailed("chain input is closed".to_string()))?;
        let item: Item = Box::new(item);
        select! {
            send(tx, item) -> res => res.map_err(|_| {
                ChainError::SendFailed("first link has stopped".to_string())
            }),
            recv(self.cancel.done()) -> _ => Err(ChainError::Cancelled),
        }
    }

    /// Signal end of input.
    pub fn close(&self) {
        self.ensure_started();
        self.input
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    /// Next item from the last link, or `None` once the chain has finished and drained.
    pub fn recv(&self) -> Option<Item> {
        self.ensure_started();
        self.output.get()?.recv().ok()
    }

    /// Next output of type `T`. Items of any other type are dropped and recorded as
    /// `TypeMismatch`; `None` once the chain has finished and drained.
    pub fn recv_as<T: Any>(&self) -> Option<T> {
        loop {
            let item = self.recv()?;
            match item.downcast::<T>() {
                Ok(value) => return Some(*value),
                Err(_) => {
                    let err = ChainError::TypeMismatch {
                        link: "chain output".to_string(),
                        expected: type_name::<T>(),
                    };
                    warn!("dropping output: {}", err);
                    self.errors.record(err);
                }
            }
        }
    }

    /// Close the input and block until every link has completed and closed.
    pub fn wait(&self) {
        self.close();
        let handles = std::mem::take(&mut *self.handles.lock().unwrap_or_else(PoisonError::into_inner));
        for handle in handles {
            if handle.join().is_err() {
                self.errors.record(ChainError::LinkInternal {
                    link: "chain".to_string(),
                    message: "link thread panicked".to_string(),
                });
            }
        }
    }

    /// First recorded fatal error (composite if several); inspect after [`wait`](Self::wait).
    pub fn error(&self) -> Option<ChainError> {
        self.errors.summary()
    }

    /// Every error recorded so far, in recording order.
    pub fn errors(&self) -> Vec<ChainError> {
        self.errors.all()
    }

    fn ensure_started(&self) {
        let mut guard = self.setup.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(setup) = guard.take() {
            self.launch(setup);
        }
    }

    fn abort_startup(&self, err: ChainError) {
        error!("chain startup failed: {}", err);
        self.errors.record(err);
        self.cancel.cancel();
        let (_, rx) = bounded::<Item>(0);
        let _ = self.output.set(rx);
    }

    fn launch(&self, setup: Setup) {
        let Setup {
            mut links,
            mut args,
            strict_keys,
            capacity,
        } = setup;

        let params: Vec<Vec<Param>> = links.iter().map(|l| l.params()).collect();
        let declared: BTreeSet<&str> = params.iter().flatten().map(Param::name).collect();
        if let Some(unknown) = strict_keys.iter().find(|k| !declared.contains(k.as_str())) {
            return self.abort_startup(ChainError::UnknownParam(unknown.clone()));
        }
        args.retain(|key, _| {
            let keep = declared.contains(key.as_str());
            if !keep {
                debug!("no link declares inherited parameter '{}', dropping it", key);
            }
            keep
        });

        let bound = match params
            .iter()
            .map(|p| BoundArgs::bind(p, &args))
            .collect::<Result<Vec<_>, _>>()
        {
            Ok(bound) => bound,
            Err(e) => return self.abort_startup(e),
        };

        for i in 0..links.len() {
            let name = links[i].name();
            let link = &mut links[i];
            if let Err(e) = guarded(&name, || link.initialize(&bound[i])) {
                for started in links.iter_mut().take(i + 1) {
                    started.close();
                }
                return self.abort_startup(e);
            }
        }

        let chain_args = Arc::new(args);
        let _ = self.args.set(Arc::clone(&chain_args));

        let (input_tx, mut upstream) = bounded::<Item>(capacity);
        let mut prev_closed: Option<Receiver<()>> = None;
        let mut handles = Vec::with_capacity(links.len());
        for (link, bound) in links.into_iter().zip(bound) {
            let (tx, rx) = bounded::<Item>(capacity);
            let (closed_tx, closed_rx) = bounded::<()>(0);
            let name = link.name();
            let worker = LinkWorker {
                link,
                input: upstream,
                ctx: LinkContext::new(&name, bound, Arc::clone(&chain_args), tx, self.cancel.clone()),
                errors: self.errors.clone(),
                prev_closed: prev_closed.take(),
                _closed: closed_tx,
            };
            handles.push(thread::spawn(move || worker.run()));
            upstream = rx;
            prev_closed = Some(closed_rx);
        }
        debug!("chain started with {} link(s)", handles.len());

        *self.input.lock().unwrap_or_else(PoisonError::into_inner) = Some(input_tx);
        let _ = self.output.set(upstream);
        *self.handles.lock().unwrap_or_else(PoisonError::into_inner) = handles;
    }
}

impl Drop for Chain {
    fn drop(&mut self) {
        let handles = std::mem::take(self.handles.get_mut().unwrap_or_else(PoisonError::into_inner));
        if handles.is_empty() {
            return;
        }
        self.input.get_mut().unwrap_or_else(PoisonError::into_inner).take();
        self.cancel.cancel();
        for handle in handles {
            let _ = handle.join();
        }
    }
}

enum Next {
    Item(Item),
    Closed,
    Cancelled,
}

/// One link running on its own thread.
struct LinkWorker {
    link: Box<dyn DynLink>,
    input: Receiver<Item>,
    ctx: LinkContext,
    errors: ErrorSink,
    /// Disconnects once the upstream link has closed.
    prev_closed: Option<Receiver<()>>,
    /// Dropped with the worker, after `close`.
    _closed: Sender<()>,
}

impl LinkWorker {
    fn run(mut self) {
        let name = self.ctx.name().to_string();
        let mut aborted = false;
        loop {
            if self.ctx.cancel_token().is_cancelled() {
                self.errors.record(ChainError::Cancelled);
                aborted = true;
                break;
            }
            let next = select! {
                recv(self.input) -> msg => match msg {
                    Ok(item) => Next::Item(item),
                    Err(_) => Next::Closed,
                },
                recv(self.ctx.cancel_token().done()) -> _ => Next::Cancelled,
            };
            match next {
                Next::Item(item) => {
                    let (link, ctx) = (&mut self.link, &self.ctx);
                    if let Err(e) = guarded(&name, || link.process_item(item, ctx)) {
                        self.fail(&name, e, false);
                        aborted = true;
                        break;
                    }
                }
                Next::Closed => break,
                Next::Cancelled => {
                    self.errors.record(ChainError::Cancelled);
                    aborted = true;
                    break;
                }
            }
        }

        if !aborted {
            let (link, ctx) = (&mut self.link, &self.ctx);
            if let Err(e) = guarded(&name, || link.complete(ctx)) {
                self.fail(&name, e, true);
            }
        }

        // Close in pipeline order.
        if let Some(prev) = self.prev_closed.take() {
            let _ = prev.recv();
        }
        let link = &mut self.link;
        if let Err(e) = guarded(&name, || {
            link.close();
            Ok(())
        }) {
            error!("{}: close failed: {}", name, e);
        }
        debug!("{}: closed", name);
    }

    /// Record `err`. Unless the input was already exhausted and the error leaves peers
    /// unaffected, the chain is cancelled so blocked links return.
    fn fail(&self, name: &str, err: ChainError, input_done: bool) {
        match err.is_cancelled() {
            true => debug!("{}: cancelled", name),
            false => error!("{}: {}", name, err),
        }
        let abort = !input_done || err.aborts_chain();
        self.errors.record(err);
        if abort {
            self.ctx.cancel_token().cancel();
        }
    }
}
