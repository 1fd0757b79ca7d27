//! Cancellation context carried by every chain and handed down to child chains.
//!
//! A token is "done" once cancelled: its `done()` receiver disconnects, so it can sit in a
//! `crossbeam_channel::select!` next to any blocking send or receive.

use crossbeam_channel::{Receiver, Sender, after, bounded, select};
use log::debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::thread;
use std::time::Duration;

struct CancelInner {
    cancelled: AtomicBool,
    trigger: Mutex<Option<Sender<()>>>,
    done: Receiver<()>,
    children: Mutex<Vec<Weak<CancelInner>>>,
}

impl CancelInner {
    fn new() -> Self {
        let (tx, rx) = bounded::<()>(0);
        Self {
            cancelled: AtomicBool::new(false),
            trigger: Mutex::new(Some(tx)),
            done: rx,
            children: Mutex::new(Vec::new()),
        }
    }

    fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        // Dropping the only sender disconnects `done` for every waiter.
        drop(
            self.trigger
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take(),
        );
        let children: Vec<_> = self
            .children
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for child in children.iter().filter_map(Weak::upgrade) {
            child.cancel();
        }
    }
}

/// Cloneable cancellation handle. Clones share state; [`CancelToken::child`] creates a token
/// that is cancelled with its parent but can also be cancelled on its own.
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

impl CancelToken {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(CancelInner::new()),
        }
    }

    /// Derive a token that is cancelled whenever `self` is.
    pub fn child(&self) -> Self {
        let child = CancelToken::new();
        {
            let mut children = self
                .inner
                .children
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            children.retain(|w| w.strong_count() > 0);
            children.push(Arc::downgrade(&child.inner));
        }
        // Parent may have been cancelled between creating the child and registering it.
        if self.is_cancelled() {
            child.cancel();
        }
        child
    }

    pub fn cancel(&self) {
        self.inner.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Receiver that never yields a value and disconnects on cancellation.
    pub fn done(&self) -> &Receiver<()> {
        &self.inner.done
    }

    /// Block until cancelled.
    pub fn wait(&self) {
        let _ = self.inner.done.recv();
    }

    /// Cancel this token once `timeout` elapses, unless it is cancelled first.
    pub fn cancel_after(&self, timeout: Duration) {
        let token = self.clone();
        thread::spawn(move || {
            select! {
                recv(token.done()) -> _ => {}
                recv(after(timeout)) -> _ => {
                    debug!("deadline of {:?} reached, cancelling", timeout);
                    token.cancel();
                }
            }
        });
    }
}

