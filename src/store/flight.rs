//! Singleflight coordination for keyed async work.
//!
//! When several tasks ask for the same key concurrently, exactly one of them
//! (the leader) runs the work. The others wait and receive a clone of the
//! leader's result, success or failure. Nothing is retained once the work
//! finishes: callers commit successful results to their own cache inside
//! the work future, so a later request can find them there.
//!
//! If the leader is cancelled before finishing, waiting tasks wake up and
//! elect a new leader among themselves.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::Notify;

/// Deduplicates concurrent work per key.
pub struct SingleFlight<K, V, E> {
    flights: Mutex<HashMap<K, Arc<Flight<V, E>>>>,
}

struct Flight<V, E> {
    notify: Notify,
    state: Mutex<FlightState<V, E>>,
}

enum FlightState<V, E> {
    Pending,
    Done(Result<V, E>),
    Abandoned,
}

/// Removes the flight from the map and wakes waiters, also on cancellation.
struct LeaderGuard<'a, K: Eq + Hash, V, E> {
    owner: &'a SingleFlight<K, V, E>,
    key: Option<K>,
    flight: Arc<Flight<V, E>>,
}

impl<K: Eq + Hash, V, E> LeaderGuard<'_, K, V, E> {
    fn finish(mut self, result: &Result<V, E>)
    where
        V: Clone,
        E: Clone,
    {
        *lock(&self.flight.state) = FlightState::Done(result.clone());
        self.release();
    }

    fn release(&mut self) {
        if let Some(key) = self.key.take() {
            let mut flights = lock(&self.owner.flights);
            if let Some(current) = flights.get(&key) {
                if Arc::ptr_eq(current, &self.flight) {
                    flights.remove(&key);
                }
            }
            drop(flights);
            self.flight.notify.notify_waiters();
        }
    }
}

impl<K: Eq + Hash, V, E> Drop for LeaderGuard<'_, K, V, E> {
    fn drop(&mut self) {
        if self.key.is_some() {
            {
                let mut state = lock(&self.flight.state);
                if matches!(*state, FlightState::Pending) {
                    *state = FlightState::Abandoned;
                }
            }
            self.release();
        }
    }
}

enum Join<V, E> {
    Leader(Arc<Flight<V, E>>),
    Follower(Arc<Flight<V, E>>),
}

impl<K, V, E> SingleFlight<K, V, E>
where
    K: Eq + Hash + Clone,
    V: Clone,
    E: Clone,
{
    pub fn new() -> Self {
        Self {
            flights: Mutex::new(HashMap::new()),
        }
    }

    /// Run `work` for `key` unless an identical run is already in flight.
    ///
    /// Returns the result and whether this call was the leader that ran
    /// `work`.
    pub async fn run<F, Fut>(&self, key: K, work: F) -> (Result<V, E>, bool)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        loop {
            let join = {
                let mut flights = lock(&self.flights);
                match flights.get(&key) {
                    Some(flight) => Join::Follower(flight.clone()),
                    None => {
                        let flight = Arc::new(Flight {
                            notify: Notify::new(),
                            state: Mutex::new(FlightState::Pending),
                        });
                        flights.insert(key.clone(), flight.clone());
                        Join::Leader(flight)
                    }
                }
            };

            match join {
                Join::Leader(flight) => {
                    let guard = LeaderGuard {
                        owner: self,
                        key: Some(key),
                        flight,
                    };
                    let result = work().await;
                    guard.finish(&result);
                    return (result, true);
                }
                Join::Follower(flight) => {
                    let notified = flight.notify.notified();
                    tokio::pin!(notified);
                    // Register before inspecting state so a wakeup between the
                    // check and the await is not lost.
                    notified.as_mut().enable();

                    let pending = match &*lock(&flight.state) {
                        FlightState::Done(result) => return (result.clone(), false),
                        FlightState::Abandoned => false,
                        FlightState::Pending => true,
                    };

                    if pending {
                        notified.await;
                        if let FlightState::Done(result) = &*lock(&flight.state) {
                            return (result.clone(), false);
                        }
                    }
                    // Leader was cancelled; try again.
                }
            }
        }
    }

    /// Number of keys currently being worked on.
    pub fn in_flight(&self) -> usize {
        lock(&self.flights).len()
    }
}

impl<K, V, E> Default for SingleFlight<K, V, E>
where
    K: Eq + Hash + Clone,
    V: Clone,
    E: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
