//! Acknowledgement related types and functions.
//!
//! Here are the main types:
//!
//! - [`AckProcessor`]: correlates outgoing requests with their response by ack id.
//! - [`AckResponse`]: the values of a response, decoded on demand.
use std::{
    collections::HashMap,
    sync::{
        Mutex, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use serde::de::DeserializeOwned;
use sockwire_core::{Value, parser::Parse};
use tokio::sync::oneshot;

use crate::{errors::AckError, parser::Parser};

/// Per channel registry of outstanding acknowledgements.
///
/// A wait point is registered before the request is queued so a fast response can never
/// arrive before its waiter. Each id is delivered at most once and consumed at most once.
#[derive(Debug, Default)]
pub struct AckProcessor {
    counter: AtomicU64,
    waiters: Mutex<HashMap<u64, oneshot::Sender<Vec<Value>>>>,
}

/// A registered wait point, consumed by [`AckProcessor::wait`].
#[derive(Debug)]
#[must_use = "a registered ack must be awaited or removed"]
pub struct AckWaiter {
    id: u64,
    rx: oneshot::Receiver<Vec<Value>>,
}

impl AckWaiter {
    /// The ack id of this wait point
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl AckProcessor {
    /// Create an empty processor
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a fresh, strictly increasing id
    pub fn next_id(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Create the wait point for `id`
    pub fn register(&self, id: u64) -> AckWaiter {
        let (tx, rx) = oneshot::channel();
        self.waiters().insert(id, tx);
        AckWaiter { id, rx }
    }

    /// Deliver a response to the waiter of `id`.
    ///
    /// Returns `false` when no waiter exists (late, duplicated or unknown id), the values are dropped.
    pub fn resolve(&self, id: u64, values: Vec<Value>) -> bool {
        let tx = self.waiters().remove(&id);
        match tx {
            Some(tx) => tx.send(values).is_ok(),
            None => false,
        }
    }

    /// Wait for the response of a registered id, for at most `timeout`.
    ///
    /// On timeout the id is deregistered and a later [`resolve`](Self::resolve) is a no-op.
    pub async fn wait(&self, waiter: AckWaiter, timeout: Duration) -> Result<Vec<Value>, AckError> {
        let AckWaiter { id, rx } = waiter;
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(values)) => Ok(values),
            Ok(Err(_)) => Err(AckError::Closed),
            Err(elapsed) => {
                self.remove(id);
                Err(elapsed.into())
            }
        }
    }

    /// Deregister `id`. Removing an unknown id does nothing.
    pub fn remove(&self, id: u64) {
        self.waiters().remove(&id);
    }

    /// Number of outstanding requests
    pub fn pending(&self) -> usize {
        self.waiters().len()
    }

    /// Drop every waiter, they all fail with [`AckError::Closed`]
    pub(crate) fn clear(&self) {
        self.waiters().clear();
    }

    fn waiters(&self) -> std::sync::MutexGuard<'_, HashMap<u64, oneshot::Sender<Vec<Value>>>> {
        // The map stays consistent even if a holder panicked, every operation is a single call
        self.waiters.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// The values of an acknowledgement response.
///
/// They stay raw until they are decoded with the strategy of the channel that received them.
#[derive(Debug, Clone)]
pub struct AckResponse {
    values: Vec<Value>,
    parser: Parser,
}

impl AckResponse {
    pub(crate) fn new(values: Vec<Value>, parser: Parser) -> Self {
        Self { values, parser }
    }

    /// Number of returned values
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the peer returned nothing
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Decode the value at `index`. A missing value decodes as `null`/nil would.
    pub fn get<T: DeserializeOwned>(&self, index: usize) -> Result<T, AckError> {
        match self.values.get(index) {
            Some(value) => Ok(self.parser.decode_value(value)?),
            None => {
                let nil = self.parser.encode_value(&())?;
                Ok(self.parser.decode_value(&nil)?)
            }
        }
    }

    /// Decode all the values as a single sequence, e.g. a tuple `(i32, String)` or a `Vec<T>`
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, AckError> {
        Ok(self.parser.decode_seq(&self.values)?)
    }

    /// The raw values
    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use sockwire_core::Str;

    use super::*;

    fn value(v: &'static str) -> Value {
        Value::Str(Str::from(v))
    }

    #[test]
    fn ids_are_strictly_increasing() {
        let acks = AckProcessor::new();
        let ids: Vec<_> = (0..100).map(|_| acks.next_id()).collect();
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test]
    async fn each_waiter_receives_its_own_value() {
        let acks = Arc::new(AckProcessor::new());
        let mut handles = Vec::new();
        for _ in 0..50 {
            let id = acks.next_id();
            let waiter = acks.register(id);
            let acks = acks.clone();
            handles.push(tokio::spawn(async move {
                let values = acks.wait(waiter, Duration::from_secs(5)).await.unwrap();
                (id, values)
            }));
        }
        // Resolve in reverse order from concurrent tasks
        let mut resolvers = Vec::new();
        for id in (1..=50u64).rev() {
            let acks = acks.clone();
            resolvers.push(tokio::spawn(async move {
                let value = Value::Str(Str::from(id.to_string()));
                assert!(acks.resolve(id, vec![value]));
            }));
        }
        for r in resolvers {
            r.await.unwrap();
        }
        for h in handles {
            let (id, values) = h.await.unwrap();
            assert_eq!(values, vec![Value::Str(Str::from(id.to_string()))]);
        }
        assert_eq!(acks.pending(), 0);
    }

    #[tokio::test]
    async fn timeout_deregisters() {
        let acks = AckProcessor::new();
        let id = acks.next_id();
        let waiter = acks.register(id);
        let start = tokio::time::Instant::now();
        let res = acks.wait(waiter, Duration::from_millis(50)).await;
        let elapsed = start.elapsed();
        assert!(matches!(res, Err(AckError::Timeout)));
        assert!(elapsed >= Duration::from_millis(50));
        assert!(elapsed < Duration::from_millis(500));
        assert_eq!(acks.pending(), 0);
        // late response
        assert!(!acks.resolve(id, vec![value("1")]));
    }

    #[tokio::test]
    async fn duplicate_resolution_is_ignored() {
        let acks = AckProcessor::new();
        let waiter = acks.register(7);
        assert!(acks.resolve(7, vec![value("1")]));
        assert!(!acks.resolve(7, vec![value("2")]));
        let values = acks.wait(waiter, Duration::from_secs(1)).await.unwrap();
        assert_eq!(values, vec![value("1")]);
    }

    #[tokio::test]
    async fn clear_fails_waiters_with_closed() {
        let acks = AckProcessor::new();
        let waiter = acks.register(acks.next_id());
        acks.clear();
        let res = acks.wait(waiter, Duration::from_secs(1)).await;
        assert!(matches!(res, Err(AckError::Closed)));
    }

    #[test]
    fn response_decoding() {
        let res = AckResponse::new(vec![value("1"), value("\"pong\"")], Parser::default());
        assert_eq!(res.len(), 2);
        assert_eq!(res.get::<i32>(0).unwrap(), 1);
        assert_eq!(res.get::<String>(1).unwrap(), "pong");
        assert_eq!(res.get::<Option<String>>(2).unwrap(), None);
        let (n, s): (i32, String) = res.decode().unwrap();
        assert_eq!((n, s.as_str()), (1, "pong"));
        assert!(matches!(res.get::<String>(0), Err(AckError::Decode(_))));
    }
}
