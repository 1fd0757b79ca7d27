//! Processor tests: per-resource child chains run sequentially and on the bounded worker pool.

use crossbeam_channel::{Receiver, bounded};
use reconchain::ChainError;
use reconchain::pipeline::{
    Args, BoundArgs, CancelToken, Chain, Link, LinkContext, Param, with_arg,
};
use reconchain::processors::pool::Semaphore;
use reconchain::processors::{
    ChainRegistry, PUBLIC_RESOURCE_ARGS, PublicResourcesProcessor, RESOURCE_CHAIN_ARGS,
    ResourceChainProcessor, ResourceDispatcher, essential_args,
};
use reconchain::{Resource, ResourceChainPair};
use serde_json::json;
use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

const TYPE: &str = "Test::Thing";

fn within<T: Send + 'static>(secs: u64, f: impl FnOnce() -> T + Send + 'static) -> T {
    let (tx, rx) = bounded(1);
    thread::spawn(move || {
        let _ = tx.send(f());
    });
    rx.recv_timeout(Duration::from_secs(secs))
        .expect("processor did not finish in time (deadlock?)")
}

/// Feed `inputs` from a helper thread while draining every `T` the chain emits.
fn run<I: Any + Send, T: Any>(chain: &Chain, inputs: Vec<I>) -> Vec<T> {
    let out = thread::scope(|s| {
        s.spawn(|| {
            for item in inputs {
                if chain.send(item).is_err() {
                    break;
                }
            }
            chain.close();
        });
        let mut out = Vec::new();
        while let Some(v) = chain.recv_as::<T>() {
            out.push(v);
        }
        out
    });
    chain.wait();
    out
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct Out {
    resource: String,
    seq: usize,
}

/// Emits `count` outputs per resource, in sequence.
struct Emit {
    count: usize,
}

impl Link for Emit {
    type Input = Resource;

    fn process(&mut self, resource: Resource, ctx: &LinkContext) -> anyhow::Result<()> {
        for seq in 0..self.count {
            ctx.send(Out {
                resource: resource.identifier.clone(),
                seq,
            })?;
        }
        Ok(())
    }
}

fn emitter(count: usize) -> Chain {
    Chain::builder().link(Emit { count }).build()
}

fn resource(i: usize) -> Resource {
    Resource::new(TYPE, &format!("r{}", i))
}

fn pairs(n: usize, count: usize) -> Vec<ResourceChainPair> {
    (0..n)
        .map(|i| ResourceChainPair::new(resource(i), move || emitter(count), Args::new()))
        .collect()
}

fn sequential() -> Chain {
    Chain::builder()
        .link(ResourceChainProcessor::<Out>::new())
        .build()
}

fn concurrent(workers: i64) -> Chain {
    Chain::builder()
        .link(PublicResourcesProcessor::<Out>::new())
        .config(with_arg("workers", workers))
        .build()
}

fn by_resource(out: &[Out]) -> HashMap<String, Vec<usize>> {
    let mut grouped: HashMap<String, Vec<usize>> = HashMap::new();
    for o in out {
        grouped.entry(o.resource.clone()).or_default().push(o.seq);
    }
    grouped
}

// --- sequential vs concurrent equivalence ---

#[test]
fn test_sequential_output_is_concatenation_in_input_order() {
    let out: Vec<Out> = within(30, || run(&sequential(), pairs(100, 5)));
    let expected: Vec<Out> = (0..100)
        .flat_map(|i| {
            (0..5).map(move |seq| Out {
                resource: format!("r{}", i),
                seq,
            })
        })
        .collect();
    assert_eq!(out, expected);
}

#[test]
fn test_concurrent_matches_sequential_multiset() {
    let mut seq_out: Vec<Out> = within(30, || run(&sequential(), pairs(100, 5)));
    let mut conc_out: Vec<Out> = within(30, || run(&concurrent(8), pairs(100, 5)));
    assert_eq!(conc_out.len(), 500);

    // Each resource's outputs keep their order inside the interleaving.
    for (resource, seqs) in by_resource(&conc_out) {
        assert_eq!(seqs, vec![0, 1, 2, 3, 4], "order broken for {}", resource);
    }

    seq_out.sort();
    conc_out.sort();
    assert_eq!(seq_out, conc_out);
}

// --- bounded parallelism ---

/// Holds each resource for `hold`, tracking how many holds overlap.
struct Hold {
    current: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    hold: Duration,
}

impl Link for Hold {
    type Input = Resource;

    fn process(&mut self, resource: Resource, ctx: &LinkContext) -> anyhow::Result<()> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        thread::sleep(self.hold);
        self.current.fetch_sub(1, Ordering::SeqCst);
        ctx.send(Out {
            resource: resource.identifier,
            seq: 0,
        })?;
        Ok(())
    }
}

#[test]
fn test_worker_bound_is_respected() {
    let current = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let pairs: Vec<ResourceChainPair> = (0..1000)
        .map(|i| {
            let (current, peak) = (Arc::clone(&current), Arc::clone(&peak));
            ResourceChainPair::new(
                resource(i),
                move || {
                    Chain::builder()
                        .link(Hold {
                            current,
                            peak,
                            hold: Duration::from_millis(10),
                        })
                        .build()
                },
                Args::new(),
            )
        })
        .collect();

    let started = Instant::now();
    let out: Vec<Out> = within(120, || run(&concurrent(4), pairs));
    let elapsed = started.elapsed();

    assert_eq!(out.len(), 1000);
    assert!(peak.load(Ordering::SeqCst) <= 4, "peak {}", peak.load(Ordering::SeqCst));
    assert!(elapsed >= Duration::from_millis(2500), "elapsed {:?}", elapsed);
}

#[test]
fn test_semaphore_bounds_permits_and_honours_cancel() {
    let slots = Semaphore::new(2);
    let cancel = CancelToken::new();
    let first = slots.acquire(&cancel).unwrap();
    let _second = slots.acquire(&cancel).unwrap();
    assert_eq!(slots.in_use(), 2);
    drop(first);
    assert_eq!(slots.in_use(), 1);
    let _third = slots.acquire(&cancel).unwrap();

    cancel.cancel_after(Duration::from_millis(50));
    let started = Instant::now();
    assert!(matches!(slots.acquire(&cancel), Err(ChainError::Cancelled)));
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[test]
fn test_non_positive_workers_fall_back_to_default() {
    for workers in [0, -3] {
        let out: Vec<Out> = within(30, move || run(&concurrent(workers), pairs(10, 2)));
        assert_eq!(out.len(), 20);
    }
}

/// Blocks until `gate` disconnects, then emits one output.
struct Gate {
    gate: Receiver<()>,
}

impl Link for Gate {
    type Input = Resource;

    fn process(&mut self, resource: Resource, ctx: &LinkContext) -> anyhow::Result<()> {
        let _ = self.gate.recv();
        ctx.send(Out {
            resource: resource.identifier,
            seq: 0,
        })?;
        Ok(())
    }
}

#[test]
fn test_full_pool_blocks_upstream_without_dropping() {
    let (release, gate) = bounded::<()>(0);
    let pairs: Vec<ResourceChainPair> = (0..6)
        .map(|i| {
            let gate = gate.clone();
            ResourceChainPair::new(
                resource(i),
                move || Chain::builder().link(Gate { gate }).build(),
                Args::new(),
            )
        })
        .collect();
    drop(gate);

    let chain = Arc::new(concurrent(2));
    let sent = Arc::new(AtomicUsize::new(0));
    let feeder = {
        let (chain, sent) = (Arc::clone(&chain), Arc::clone(&sent));
        thread::spawn(move || {
            for pair in pairs {
                chain.send(pair).unwrap();
                sent.fetch_add(1, Ordering::SeqCst);
            }
            chain.close();
        })
    };

    // Two pairs in workers, one held by the blocked processor, one in the input channel.
    thread::sleep(Duration::from_millis(200));
    assert_eq!(sent.load(Ordering::SeqCst), 4);

    drop(release);
    let out: Vec<Out> = within(10, move || {
        let mut out = Vec::new();
        while let Some(o) = chain.recv_as::<Out>() {
            out.push(o);
        }
        chain.wait();
        assert!(chain.error().is_none());
        out
    });
    feeder.join().unwrap();
    assert_eq!(sent.load(Ordering::SeqCst), 6);
    assert_eq!(out.len(), 6);
}

// --- streaming before wait ---

#[test]
fn test_child_emitting_past_channel_capacity_does_not_deadlock() {
    let out: Vec<Out> = within(10, || run(&sequential(), pairs(1, 16)));
    assert_eq!(out.len(), 16);
    assert_eq!(by_resource(&out)["r0"], (0..16).collect::<Vec<_>>());

    let out: Vec<Out> = within(10, || run(&concurrent(1), pairs(3, 16)));
    assert_eq!(out.len(), 48);
}

// --- failures and panics ---

#[test]
fn test_worker_panic_is_isolated() {
    let mut pairs = pairs(50, 5);
    pairs[17] = ResourceChainPair::new(
        resource(17),
        || -> Chain { panic!("constructor exploded") },
        Args::new(),
    );

    let chain = concurrent(8);
    let (out, err) = within(30, move || {
        let out: Vec<Out> = run(&chain, pairs);
        (out, chain.error())
    });

    assert_eq!(out.len(), 49 * 5);
    assert!(out.iter().all(|o| o.resource != "r17"));
    let err = err.expect("panic should be reported at completion");
    assert!(matches!(err, ChainError::WorkersFailed { failed: 1, .. }), "{:?}", err);
    let internal: Vec<&ChainError> = err
        .flatten()
        .into_iter()
        .filter(|e| matches!(e, ChainError::LinkInternal { .. }))
        .collect();
    assert_eq!(internal.len(), 1);
    assert!(internal[0].to_string().contains("constructor exploded"));
}

/// Fails on the resource named `bad`, emits one output otherwise.
struct FailOn {
    bad: &'static str,
}

impl Link for FailOn {
    type Input = Resource;

    fn process(&mut self, resource: Resource, ctx: &LinkContext) -> anyhow::Result<()> {
        if resource.identifier == self.bad {
            anyhow::bail!("cannot handle {}", resource.identifier);
        }
        ctx.send(Out {
            resource: resource.identifier,
            seq: 0,
        })?;
        Ok(())
    }
}

fn failing_pairs(n: usize, bad: &'static str) -> Vec<ResourceChainPair> {
    (0..n)
        .map(|i| {
            ResourceChainPair::new(
                resource(i),
                move || Chain::builder().link(FailOn { bad }).build(),
                Args::new(),
            )
        })
        .collect()
}

#[test]
fn test_sequential_child_failure_aborts_chain() {
    let chain = sequential();
    let (out, err) = within(10, move || {
        let out: Vec<Out> = run(&chain, failing_pairs(10, "r3"));
        (out, chain.error())
    });
    assert_eq!(out.len(), 3);
    match err {
        Some(ChainError::ChildFailed { resource, source }) => {
            assert_eq!(resource, "Test::Thing r3");
            assert!(matches!(*source, ChainError::LinkInternal { .. }));
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[test]
fn test_concurrent_child_failure_is_counted_not_fatal_to_peers() {
    let chain = concurrent(4);
    let (out, err) = within(10, move || {
        let out: Vec<Out> = run(&chain, failing_pairs(10, "r3"));
        (out, chain.error())
    });
    assert_eq!(out.len(), 9);
    match err {
        Some(ChainError::WorkersFailed { failed, errors }) => {
            assert_eq!(failed, 1);
            assert!(matches!(&errors[0], ChainError::ChildFailed { resource, .. } if resource == "Test::Thing r3"));
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

// --- links after a processor ---

/// Forwards every output unchanged and counts `complete` calls.
struct Pass {
    completed: Arc<AtomicUsize>,
}

impl Link for Pass {
    type Input = Out;

    fn process(&mut self, out: Out, ctx: &LinkContext) -> anyhow::Result<()> {
        ctx.send(out)?;
        Ok(())
    }

    fn complete(&mut self, _ctx: &LinkContext) -> anyhow::Result<()> {
        self.completed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[test]
fn test_link_after_sequential_processor_sees_every_output() {
    let completed = Arc::new(AtomicUsize::new(0));
    let chain = Chain::builder()
        .link(ResourceChainProcessor::<Out>::new())
        .link(Pass {
            completed: Arc::clone(&completed),
        })
        .build();
    let (out, err) = within(10, move || {
        let out: Vec<Out> = run(&chain, pairs(20, 3));
        (out, chain.error())
    });
    assert!(err.is_none(), "{:?}", err);
    assert_eq!(out.len(), 60);
    assert_eq!(out[0].resource, "r0");
    assert_eq!(out[59].resource, "r19");
    assert_eq!(completed.load(Ordering::SeqCst), 1);
}

#[test]
fn test_link_after_concurrent_processor_keeps_outputs_when_a_worker_fails() {
    for _ in 0..50 {
        let completed = Arc::new(AtomicUsize::new(0));
        let chain = Chain::builder()
            .link(PublicResourcesProcessor::<Out>::new())
            .link(Pass {
                completed: Arc::clone(&completed),
            })
            .config(with_arg("workers", 4))
            .build();
        let (out, err) = within(10, move || {
            let out: Vec<Out> = run(&chain, failing_pairs(10, "r0"));
            (out, chain.error())
        });
        assert_eq!(out.len(), 9);
        assert!(out.iter().all(|o| o.resource != "r0"));
        assert!(
            matches!(err, Some(ChainError::WorkersFailed { failed: 1, .. })),
            "{:?}",
            err
        );
        assert_eq!(completed.load(Ordering::SeqCst), 1);
    }
}

// --- cancellation ---

/// Blocks until its chain is cancelled.
struct Stall;

impl Link for Stall {
    type Input = Resource;

    fn process(&mut self, _resource: Resource, ctx: &LinkContext) -> anyhow::Result<()> {
        ctx.cancel_token().wait();
        Err(ChainError::Cancelled.into())
    }
}

#[test]
fn test_cancel_releases_workers_and_blocked_upstream() {
    let pairs: Vec<ResourceChainPair> = (0..10)
        .map(|i| ResourceChainPair::new(resource(i), || Chain::builder().link(Stall).build(), Args::new()))
        .collect();
    let chain = Arc::new(concurrent(2));
    let feeder = {
        let chain = Arc::clone(&chain);
        thread::spawn(move || {
            for pair in pairs {
                if chain.send(pair).is_err() {
                    break;
                }
            }
        })
    };
    thread::sleep(Duration::from_millis(100));
    chain.cancel();

    within(5, move || {
        feeder.join().unwrap();
        chain.wait();
        assert_eq!(chain.error(), Some(ChainError::Cancelled));
    });
}

#[test]
fn test_cancel_releases_workers_blocked_on_send() {
    let chain = Arc::new(concurrent(2));
    let feeder = {
        let chain = Arc::clone(&chain);
        thread::spawn(move || {
            // Nobody drains the parent: workers block forwarding outputs.
            for pair in pairs(4, 100) {
                if chain.send(pair).is_err() {
                    break;
                }
            }
        })
    };
    thread::sleep(Duration::from_millis(100));
    chain.cancel();

    within(5, move || {
        feeder.join().unwrap();
        chain.wait();
        assert!(chain.error().is_some_and(|e| e.is_cancelled()));
    });
}

// --- essential args ---

/// Records the args its chain ended up with.
struct ArgsSpy {
    seen: Arc<Mutex<Vec<Args>>>,
}

impl Link for ArgsSpy {
    type Input = Resource;

    fn params(&self) -> Vec<Param> {
        vec![
            Param::string("profile", "Profile"),
            Param::string("profile-dir", "Profile dir"),
            Param::string_list("regions", "Regions"),
            Param::string("output-file", "Output file"),
            Param::int("workers", "Workers"),
        ]
    }

    fn initialize(&mut self, _args: &BoundArgs) -> anyhow::Result<()> {
        Ok(())
    }

    fn process(&mut self, _resource: Resource, ctx: &LinkContext) -> anyhow::Result<()> {
        self.seen.lock().unwrap().push(ctx.chain_args().clone());
        Ok(())
    }
}

fn parent_args() -> Args {
    [
        ("profile".to_string(), json!("p")),
        ("profile-dir".to_string(), json!("/home/p/.aws")),
        ("regions".to_string(), json!(["us-east-1"])),
        ("output-file".to_string(), json!("x")),
        ("workers".to_string(), json!(8)),
    ]
    .into()
}

fn spy_pair(seen: &Arc<Mutex<Vec<Args>>>) -> ResourceChainPair {
    let seen = Arc::clone(seen);
    ResourceChainPair::new(
        resource(0),
        move || Chain::builder().link(ArgsSpy { seen }).build(),
        parent_args(),
    )
}

#[test]
fn test_child_receives_only_allowed_args() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let _: Vec<Out> = within(10, {
        let seen = Arc::clone(&seen);
        move || run(&sequential(), vec![spy_pair(&seen)])
    });
    let _: Vec<Out> = within(10, {
        let seen = Arc::clone(&seen);
        move || run(&concurrent(2), vec![spy_pair(&seen)])
    });

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    let sequential_args: Args = [
        ("profile".to_string(), json!("p")),
        ("profile-dir".to_string(), json!("/home/p/.aws")),
        ("regions".to_string(), json!(["us-east-1"])),
    ]
    .into();
    assert_eq!(seen[0], sequential_args);
    let concurrent_args: Args = [
        ("profile".to_string(), json!("p")),
        ("regions".to_string(), json!(["us-east-1"])),
    ]
    .into();
    assert_eq!(seen[1], concurrent_args);
}

#[test]
fn test_essential_args_filter() {
    let filtered = essential_args(&parent_args(), PUBLIC_RESOURCE_ARGS);
    assert_eq!(
        filtered.keys().map(String::as_str).collect::<Vec<_>>(),
        vec!["profile", "regions"]
    );
    let filtered = essential_args(&parent_args(), RESOURCE_CHAIN_ARGS);
    assert!(filtered.contains_key("profile-dir"));
    assert!(!filtered.contains_key("workers"));
    assert!(essential_args(&Args::new(), RESOURCE_CHAIN_ARGS).is_empty());
}

#[test]
fn test_custom_allow_set() {
    const ONLY_PROFILE: &[&str] = &["profile"];
    let seen = Arc::new(Mutex::new(Vec::new()));
    let chain = Chain::builder()
        .link(ResourceChainProcessor::<Out>::new().with_allowed_args(ONLY_PROFILE))
        .build();
    let pair = spy_pair(&seen);
    let _: Vec<Out> = within(10, move || run(&chain, vec![pair]));
    let seen = seen.lock().unwrap();
    assert_eq!(seen[0].keys().collect::<Vec<_>>(), vec!["profile"]);
}

// --- dispatcher ---

#[test]
fn test_dispatcher_routes_supported_types_and_skips_others() {
    let registry = ChainRegistry::new().register(TYPE, || emitter(2));
    assert!(registry.supports(TYPE));
    assert_eq!(registry.types(), vec![TYPE]);

    let chain = Chain::builder()
        .link(ResourceDispatcher::new(registry))
        .link(ResourceChainProcessor::<Out>::new())
        .config(with_arg("profile", "p"))
        .build();
    let resources = vec![
        resource(0),
        Resource::new("Test::Unsupported", "u0"),
        resource(1),
    ];
    let out: Vec<Out> = within(10, move || {
        let out: Vec<Out> = run(&chain, resources);
        assert!(chain.error().is_none());
        assert_eq!(chain.args().get("profile"), Some(&json!("p")));
        out
    });
    let grouped: BTreeMap<String, Vec<usize>> = out.iter().fold(BTreeMap::new(), |mut acc, o| {
        acc.entry(o.resource.clone()).or_default().push(o.seq);
        acc
    });
    assert_eq!(grouped.len(), 2);
    assert_eq!(grouped["r0"], vec![0, 1]);
    assert_eq!(grouped["r1"], vec![0, 1]);
}

#[test]
fn test_dispatcher_pairs_carry_chain_args() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let registry = {
        let seen = Arc::clone(&seen);
        ChainRegistry::new().register(TYPE, move || {
            Chain::builder()
                .link(ArgsSpy {
                    seen: Arc::clone(&seen),
                })
                .build()
        })
    };
    let chain = Chain::builder()
        .link(ResourceDispatcher::new(registry))
        .link(PublicResourcesProcessor::<Out>::new())
        .config(with_arg("profile", "p"))
        .config(with_arg("profile-dir", "/d"))
        .config(with_arg("workers", 3))
        .build();
    let _: Vec<Out> = within(10, move || run(&chain, vec![resource(0)]));

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    let expected: Args = [("profile".to_string(), json!("p"))].into();
    assert_eq!(seen[0], expected);
}
