//! In-flight request registry.
//!
//! Concurrent callers asking for the same `(endpoint, discriminator)` share
//! one underlying request. The first caller reserves the key and starts the
//! request; later callers join the same shared future until it settles.
//! The registry entry is removed when the request settles, whatever the
//! outcome, before the result is handed to the waiting callers.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use assist_core::{FetchError, FetchResult};
use futures::channel::oneshot;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, trace};

use crate::cancellable::{CancelHandle, CancellableOperation};
use crate::defer::{DeferGuard, defer};

/// The shared, clonable outcome of an in-flight request.
pub type SharedFetch = Shared<BoxFuture<'static, FetchResult<Arc<Value>>>>;

type RemovalGuard = DeferGuard<Box<dyn FnOnce() + Send>>;

/// De-duplication key: logical endpoint plus a discriminator.
///
/// Two discriminators against the same endpoint are independent.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueueKey {
    endpoint: String,
    discriminator: String,
}

impl QueueKey {
    pub fn new(endpoint: impl Into<String>, discriminator: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            discriminator: discriminator.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn discriminator(&self) -> &str {
        &self.discriminator
    }
}

impl fmt::Display for QueueKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.discriminator.is_empty() {
            f.write_str(&self.endpoint)
        } else {
            write!(f, "{}#{}", self.endpoint, self.discriminator)
        }
    }
}

/// A request other callers can attach to.
#[derive(Clone)]
pub struct Pending {
    future: SharedFetch,
    cancel: CancelHandle,
}

impl Pending {
    pub fn future(&self) -> SharedFetch {
        self.future.clone()
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// A caller-local operation attached to the shared request.
    pub fn into_operation(self) -> CancellableOperation<Arc<Value>> {
        CancellableOperation::from_parts(self.future.boxed(), self.cancel)
    }
}

impl fmt::Debug for Pending {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pending")
            .field("cancel", &self.cancel)
            .finish_non_exhaustive()
    }
}

/// A reserved registry slot waiting for its request.
///
/// Dropping a reservation without [`start`](Self::start)ing it frees the
/// slot and fails every joined caller with [`FetchError::Aborted`].
pub struct Reservation {
    key: QueueKey,
    pending: Pending,
    sender: oneshot::Sender<FetchResult<Arc<Value>>>,
    removal: RemovalGuard,
}

impl Reservation {
    pub fn key(&self) -> &QueueKey {
        &self.key
    }

    /// Drives `operation` to completion on a background task and publishes
    /// its outcome to every caller attached to this key.
    pub fn start(self, operation: CancellableOperation<Arc<Value>>) -> Pending {
        let Reservation {
            key,
            pending,
            sender,
            removal,
        } = self;

        pending.cancel.attach(Arc::new(operation.cancel_handle()));

        tokio::spawn(async move {
            let result = operation.await;
            // Evict first: a caller arriving after this point starts a new
            // request instead of joining a finished one.
            drop(removal);
            trace!(key = %key, ok = result.is_ok(), "In-flight request settled");
            let _ = sender.send(result);
        });

        pending
    }
}

impl fmt::Debug for Reservation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reservation").field("key", &self.key).finish_non_exhaustive()
    }
}

/// Outcome of [`RequestQueue::join_or_register`].
#[derive(Debug)]
pub enum Admission {
    /// A request for the key was already in flight.
    Joined(Pending),
    /// The caller owns the key and must start the request.
    Vacant(Reservation),
}

struct InFlight {
    id: u64,
    pending: Pending,
}

#[derive(Default)]
struct QueueInner {
    calls: Mutex<HashMap<QueueKey, InFlight>>,
    next_id: AtomicU64,
}

/// Registry of in-flight requests.
///
/// Clones share the same registry.
#[derive(Clone, Default)]
pub struct RequestQueue {
    inner: Arc<QueueInner>,
}

impl RequestQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the in-flight request for `key`, if any.
    pub fn lookup(&self, key: &QueueKey) -> Option<Pending> {
        self.inner
            .calls
            .lock()
            .get(key)
            .map(|call| call.pending.clone())
    }

    /// Registers and starts `operation` under `key`.
    ///
    /// If a request for `key` is already in flight the caller is attached to
    /// it instead and `operation` is dropped unpolled.
    pub fn register(&self, key: QueueKey, operation: CancellableOperation<Arc<Value>>) -> Pending {
        match self.join_or_register(key) {
            Admission::Joined(pending) => pending,
            Admission::Vacant(reservation) => reservation.start(operation),
        }
    }

    /// Atomically joins the in-flight request for `key` or reserves the key.
    pub fn join_or_register(&self, key: QueueKey) -> Admission {
        let mut calls = self.inner.calls.lock();
        if let Some(call) = calls.get(&key) {
            debug!(key = %key, "Joining in-flight request");
            return Admission::Joined(call.pending.clone());
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = oneshot::channel();
        let future = receiver
            .map(|received| received.unwrap_or(Err(FetchError::Aborted)))
            .boxed()
            .shared();
        let pending = Pending {
            future,
            cancel: CancelHandle::new(),
        };

        calls.insert(
            key.clone(),
            InFlight {
                id,
                pending: pending.clone(),
            },
        );

        let inner = Arc::clone(&self.inner);
        let removed_key = key.clone();
        let cleanup: Box<dyn FnOnce() + Send> = Box::new(move || {
            let mut calls = inner.calls.lock();
            if calls.get(&removed_key).is_some_and(|call| call.id == id) {
                calls.remove(&removed_key);
            }
        });
        let removal: RemovalGuard = defer(cleanup);

        Admission::Vacant(Reservation {
            key,
            pending,
            sender,
            removal,
        })
    }

    /// Number of requests in flight.
    pub fn len(&self) -> usize {
        self.inner.calls.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.calls.lock().is_empty()
    }

    pub fn contains(&self, key: &QueueKey) -> bool {
        self.inner.calls.lock().contains_key(key)
    }
}

impl fmt::Debug for RequestQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestQueue")
            .field("in_flight", &self.len())
            .finish()
    }
}
