//! Counting semaphore behind the concurrent processor, built on a bounded channel so that
//! acquiring can race cancellation in `select!`.

use crossbeam_channel::{Receiver, Sender, bounded, select};

use crate::error::ChainError;
use crate::pipeline::CancelToken;

/// At most `capacity` permits outstanding. A permit is a message parked in the channel.
#[derive(Clone)]
pub struct Semaphore {
    slots: Sender<()>,
    release: Receiver<()>,
}

/// Held for as long as one worker runs; releases its slot on drop (including during unwind).
pub struct Permit {
    release: Receiver<()>,
}

impl Drop for Permit {
    fn drop(&mut self) {
        let _ = self.release.try_recv();
    }
}

impl Semaphore {
    pub fn new(capacity: usize) -> Self {
        let (slots, release) = bounded::<()>(capacity.max(1));
        Self { slots, release }
    }

    /// Block until a slot is free, or fail with `Cancelled` once `cancel` fires.
    pub fn acquire(&self, cancel: &CancelToken) -> Result<Permit, ChainError> {
        if cancel.is_cancelled() {
            return Err(ChainError::Cancelled);
        }
        select! {
            send(self.slots, ()) -> res => res
                .map(|_| Permit { release: self.release.clone() })
                .map_err(|_| ChainError::Cancelled),
            recv(cancel.done()) -> _ => Err(ChainError::Cancelled),
        }
    }

    /// Permits currently held.
    pub fn in_use(&self) -> usize {
        self.slots.len()
    }
}
