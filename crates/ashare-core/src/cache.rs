//! TTL cache for normalized payloads, plus single-flight coalescing.
//!
//! The store keeps JSON-encoded payload strings keyed by
//! `operation|canonical-symbol|params`. TTL is absolute; an expired entry is
//! never served, regardless of capacity pressure. When a capacity is set,
//! the least recently used live entry is evicted first.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};

use tokio::sync::watch;

use crate::DataError;

#[derive(Debug, Clone)]
struct CacheEntry {
    body: String,
    expires_at: Instant,
    last_used: u64,
}

#[derive(Debug)]
struct CacheInner {
    map: HashMap<String, CacheEntry>,
    capacity: Option<usize>,
    /// Logical clock bumped on every access, used for LRU ordering.
    tick: u64,
}

impl CacheInner {
    fn new(capacity: Option<usize>) -> Self {
        Self {
            map: HashMap::new(),
            capacity,
            tick: 0,
        }
    }

    fn get(&mut self, key: &str) -> Option<String> {
        self.tick += 1;
        let tick = self.tick;

        match self.map.get_mut(key) {
            Some(entry) if Instant::now() <= entry.expires_at => {
                entry.last_used = tick;
                Some(entry.body.clone())
            }
            Some(_) => {
                self.map.remove(key);
                None
            }
            None => None,
        }
    }

    fn put(&mut self, key: String, body: String, ttl: Duration) {
        if ttl.is_zero() {
            return;
        }

        self.tick += 1;
        let entry = CacheEntry {
            body,
            expires_at: Instant::now() + ttl,
            last_used: self.tick,
        };
        self.map.insert(key, entry);
        self.enforce_capacity();
    }

    fn enforce_capacity(&mut self) {
        let Some(capacity) = self.capacity else {
            return;
        };

        if self.map.len() > capacity {
            let now = Instant::now();
            self.map.retain(|_, entry| entry.expires_at > now);
        }

        while self.map.len() > capacity {
            let Some(oldest) = self
                .map
                .iter()
                .min_by_key(|(_, entry)| entry.last_used)
                .map(|(key, _)| key.clone())
            else {
                return;
            };
            self.map.remove(&oldest);
        }
    }

    fn clear_expired(&mut self) {
        let now = Instant::now();
        self.map.retain(|_, entry| entry.expires_at > now);
    }
}

/// Thread-safe TTL store shared by the unified source and its fetch tasks.
#[derive(Debug, Clone)]
pub struct CacheStore {
    inner: Arc<tokio::sync::Mutex<CacheInner>>,
}

impl CacheStore {
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            inner: Arc::new(tokio::sync::Mutex::new(CacheInner::new(capacity))),
        }
    }

    /// Returns the cached payload when present and not expired.
    pub async fn get(&self, key: &str) -> Option<String> {
        let mut store = self.inner.lock().await;
        store.get(key)
    }

    /// Stores a payload with an absolute expiry of now + `ttl`.
    /// A zero `ttl` is a no-op.
    pub async fn put(&self, key: String, body: String, ttl: Duration) {
        let mut store = self.inner.lock().await;
        store.put(key, body, ttl);
    }

    pub async fn invalidate(&self, key: &str) {
        let mut store = self.inner.lock().await;
        store.map.remove(key);
    }

    pub async fn clear(&self) {
        let mut store = self.inner.lock().await;
        store.map.clear();
    }

    /// Drops entries past their expiry without touching live ones.
    pub async fn clear_expired(&self) {
        let mut store = self.inner.lock().await;
        store.clear_expired();
    }

    /// Number of live entries; expired-but-unswept entries are not counted.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        let store = self.inner.lock().await;
        store
            .map
            .values()
            .filter(|entry| entry.expires_at > now)
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// Outcome shared between a flight leader and its waiters.
pub type FlightOutcome = Result<String, DataError>;

type FlightSlot = watch::Receiver<Option<FlightOutcome>>;

/// Role assigned to a caller entering the single-flight section for a key.
pub enum Flight {
    /// First caller for the key: owns the sender and must run the fetch,
    /// then hand the outcome to [`SingleFlight::finish`].
    Leader {
        tx: watch::Sender<Option<FlightOutcome>>,
        rx: FlightSlot,
    },
    /// A fetch for the key is already in progress; await its outcome.
    Waiter(FlightSlot),
}

/// Per-key request coalescing: at most one upstream fetch chain per cache
/// key is active at a time, and every concurrent caller for that key shares
/// the leader's outcome.
#[derive(Debug, Default)]
pub struct SingleFlight {
    flights: StdMutex<HashMap<String, FlightSlot>>,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Joins the in-progress flight for `key`, or opens a new one.
    pub fn begin(&self, key: &str) -> Flight {
        let mut flights = self
            .flights
            .lock()
            .expect("single-flight table is not poisoned");

        if let Some(rx) = flights.get(key) {
            return Flight::Waiter(rx.clone());
        }

        let (tx, rx) = watch::channel(None);
        flights.insert(key.to_owned(), rx.clone());
        Flight::Leader { tx, rx }
    }

    /// Closes the flight for `key` and publishes the outcome to all waiters.
    ///
    /// The key is removed before the send so a caller arriving afterwards
    /// starts a fresh fetch instead of observing a finished flight.
    pub fn finish(&self, key: &str, tx: &watch::Sender<Option<FlightOutcome>>, outcome: FlightOutcome) {
        {
            let mut flights = self
                .flights
                .lock()
                .expect("single-flight table is not poisoned");
            flights.remove(key);
        }
        let _ = tx.send(Some(outcome));
    }

    /// Awaits a flight outcome on a waiter (or the leader's own) receiver.
    pub async fn wait(mut rx: FlightSlot) -> FlightOutcome {
        loop {
            if let Some(outcome) = rx.borrow().clone() {
                return outcome;
            }
            if rx.changed().await.is_err() {
                return Err(DataError::Interrupted);
            }
        }
    }

    #[cfg(test)]
    fn in_flight(&self) -> usize {
        self.flights
            .lock()
            .expect("single-flight table is not poisoned")
            .len()
    }
}
