//! Single-flight coordination for concurrent identical requests.
//!
//! Concurrent callers asking for the same key share one underlying
//! operation. The first caller (the leader) spawns the work on the runtime.
//! Every caller, leader included, then waits on a broadcast-once channel:
//!
//! ```text
//!   caller A ──┐
//!   caller B ──┼──► in_flight[key] ──► spawned work ──► watch::send(result)
//!   caller C ──┘          ▲                                   │
//!                         └──────── entry removed ◄───────────┘
//! ```
//!
//! The work runs in its own task, so a caller that stops awaiting does not
//! cancel it. The result is still delivered to everyone else.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::watch;
use tracing::debug;

/// Delivered to waiters when the spawned work ended without a result
/// (it panicked, or the runtime shut down underneath it).
#[derive(Debug, Clone)]
pub struct FlightAborted {
    pub key: String,
}

type Slot<T, E> = Option<Result<T, E>>;
type FlightMap<T, E> = Arc<Mutex<HashMap<String, watch::Receiver<Slot<T, E>>>>>;

/// Coalesces concurrent operations by key.
///
/// The map lock is a plain mutex and is never held across an `.await`.
pub struct SingleFlight<T, E> {
    in_flight: FlightMap<T, E>,
}

/// Removes the coordination entry when the spawned work finishes, including
/// when it unwinds.
struct Deregister<T, E> {
    in_flight: FlightMap<T, E>,
    key: String,
}

impl<T, E> Drop for Deregister<T, E> {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}

impl<T, E> SingleFlight<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + From<FlightAborted> + 'static,
{
    pub fn new() -> Self {
        Self {
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Run `work` for `key`, or join the run already in progress.
    ///
    /// `work` is only invoked when this caller becomes the leader. All
    /// callers that overlap one run receive clones of the same result.
    pub async fn run<F, Fut>(&self, key: &str, work: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let mut receiver = self.join_or_lead(key, work);

        let outcome = match receiver.wait_for(Option::is_some).await {
            Ok(slot) => (*slot).clone(),
            Err(_) => None,
        };

        outcome.unwrap_or_else(|| {
            Err(E::from(FlightAborted {
                key: key.to_string(),
            }))
        })
    }

    /// Number of keys with an operation currently in progress.
    pub fn in_flight_count(&self) -> usize {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether an operation for `key` is in progress.
    pub fn is_in_flight(&self, key: &str) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }

    /// Wait until the operation for `key`, if any, has finished.
    ///
    /// Returns at once when nothing is in flight. The outcome is not
    /// reported; callers only need the side effects to have landed.
    pub async fn settle(&self, key: &str) {
        let receiver = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned();

        if let Some(mut receiver) = receiver {
            debug!(key, "waiting for in-flight operation to settle");
            let _ = receiver.wait_for(Option::is_some).await;
        }
    }

    fn join_or_lead<F, Fut>(&self, key: &str, work: F) -> watch::Receiver<Slot<T, E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let mut in_flight = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(receiver) = in_flight.get(key) {
            debug!(key, "joining in-flight operation");
            return receiver.clone();
        }

        let (sender, receiver) = watch::channel(None);
        in_flight.insert(key.to_string(), receiver.clone());
        drop(in_flight);

        debug!(key, "starting operation");
        let deregister = Deregister {
            in_flight: Arc::clone(&self.in_flight),
            key: key.to_string(),
        };
        let fut = work();

        tokio::spawn(async move {
            let result = fut.await;
            // Deregister before publishing: a caller arriving after this point
            // starts a fresh run rather than reading a finished one.
            drop(deregister);
            sender.send_replace(Some(result));
        });

        receiver
    }
}

impl<T, E> Default for SingleFlight<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + From<FlightAborted> + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
