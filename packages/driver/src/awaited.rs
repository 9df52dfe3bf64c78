use crate::error::{Error, Result};
use std::time::Instant;
use tokio::sync::oneshot;

pub type Predicate<T> = Box<dyn Fn(&T) -> bool + Send + Sync>;

pub struct Awaited<T> {
    predicate: Predicate<T>,
    deadline: Option<Instant>,
    callback: oneshot::Sender<Result<T>>,
}

/// Predicated one-shot waiters the scheduler fulfils with matching inbound
/// values. Every entry carries its own deadline; the actor polls
/// [AwaitedRegistry::expire] from its timer arm.
pub struct AwaitedRegistry<T> {
    entries: Vec<Awaited<T>>,
}

impl<T> Default for AwaitedRegistry<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<T> AwaitedRegistry<T> {
    pub fn add(
        &mut self,
        predicate: Predicate<T>,
        deadline: Option<Instant>,
        callback: oneshot::Sender<Result<T>>,
    ) {
        self.entries.push(Awaited {
            predicate,
            deadline,
            callback,
        });
    }

    /// Finds the first entry matching the given value, removes it and
    /// returns its callback channel. Entries whose receiver is gone are
    /// cleaned up on the way.
    pub fn take_matching(&mut self, value: &T) -> Option<oneshot::Sender<Result<T>>> {
        self.entries.retain(|a| !a.callback.is_closed());
        let index = self.entries.iter().position(|a| (a.predicate)(value))?;
        Some(self.entries.remove(index).callback)
    }

    /// Fails all entries whose deadline has passed
    pub fn expire(&mut self, now: Instant) {
        let mut expired = Vec::new();
        self.entries.retain_mut(|entry| {
            let is_expired = entry.deadline.map(|d| now >= d).unwrap_or(false);
            if is_expired {
                // retain_mut lets us steal the callback before dropping
                if let Some(callback) = take_callback(entry) {
                    expired.push(callback);
                }
            }
            !is_expired
        });
        for callback in expired {
            let _ = callback.send(Err(Error::Timeout));
        }
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.entries.iter().filter_map(|e| e.deadline).min()
    }

    /// Cancels all entries, e.g. on shutdown
    pub fn clear(&mut self) {
        for entry in self.entries.drain(..) {
            let _ = entry.callback.send(Err(Error::ShuttingDown));
        }
    }
}

fn take_callback<T>(entry: &mut Awaited<T>) -> Option<oneshot::Sender<Result<T>>> {
    // Replace with a channel nobody listens to
    let (tx, _rx) = oneshot::channel();
    Some(std::mem::replace(&mut entry.callback, tx))
}
