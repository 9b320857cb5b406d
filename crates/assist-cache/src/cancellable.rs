//! Cancellable asynchronous operations.
//!
//! A [`CancellableOperation`] is a future paired with a [`CancelHandle`].
//! The handle knows the primary request behind the future (if any) and any
//! number of secondary operations that must be cancelled along with it.
//! Combinators return a new operation carrying the same handle, so chaining
//! never loses the ability to cancel.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use assist_core::{FetchError, FetchResult};
use futures::future::{BoxFuture, FutureExt};
use parking_lot::Mutex;

use crate::defer::defer;

/// An in-progress transport request that can be aborted.
pub trait RequestHandle: Send + Sync {
    /// True while the request has not completed.
    fn is_pending(&self) -> bool;

    /// Aborts the request.
    fn abort(&self);
}

impl RequestHandle for tokio::task::AbortHandle {
    fn is_pending(&self) -> bool {
        !self.is_finished()
    }

    fn abort(&self) {
        tokio::task::AbortHandle::abort(self)
    }
}

/// Anything that can be cancelled as part of a larger operation.
pub trait Cancellable: Send + Sync {
    fn cancel(&self);
}

#[derive(Default)]
struct CancelTargets {
    request: Option<Arc<dyn RequestHandle>>,
    others: Vec<Arc<dyn Cancellable>>,
}

/// Shared cancellation targets of an operation.
///
/// Clones share the same targets: attaching a request to one clone makes it
/// cancellable through all of them.
#[derive(Clone, Default)]
pub struct CancelHandle {
    targets: Arc<Mutex<CancelTargets>>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the primary request.
    pub fn set_request(&self, request: Arc<dyn RequestHandle>) {
        self.targets.lock().request = Some(request);
    }

    /// Adds a secondary cancellable.
    pub fn attach(&self, cancellable: Arc<dyn Cancellable>) {
        self.targets.lock().others.push(cancellable);
    }

    pub fn has_request(&self) -> bool {
        self.targets.lock().request.is_some()
    }

    /// Aborts the primary request if it is still pending, then cancels
    /// every secondary. Safe to call any number of times.
    pub fn cancel(&self) {
        // Snapshot so secondaries may touch this handle without deadlocking
        let (request, others) = {
            let targets = self.targets.lock();
            (targets.request.clone(), targets.others.clone())
        };

        if let Some(request) = request
            && request.is_pending()
        {
            request.abort();
        }
        for other in others {
            other.cancel();
        }
    }
}

impl Cancellable for CancelHandle {
    fn cancel(&self) {
        CancelHandle::cancel(self)
    }
}

impl fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let targets = self.targets.lock();
        f.debug_struct("CancelHandle")
            .field("has_request", &targets.request.is_some())
            .field("others", &targets.others.len())
            .finish()
    }
}

/// A pending result that can be cancelled.
///
/// # Examples
///
/// ```
/// use assist_cache::CancellableOperation;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let op = CancellableOperation::ready(20).map(|n| n + 1).map(|n| n * 2);
/// let handle = op.cancel_handle();
///
/// assert_eq!(op.await.unwrap(), 42);
/// handle.cancel(); // already settled: no-op
/// # }
/// ```
#[must_use = "operations do nothing unless polled or cancelled"]
pub struct CancellableOperation<T> {
    future: BoxFuture<'static, FetchResult<T>>,
    handle: CancelHandle,
}

impl<T: Send + 'static> CancellableOperation<T> {
    /// Wraps a future without any cancellation target.
    pub fn new<F>(future: F) -> Self
    where
        F: Future<Output = FetchResult<T>> + Send + 'static,
    {
        Self::from_parts(future.boxed(), CancelHandle::new())
    }

    /// Builds an operation from a boxed future and an existing handle.
    pub fn from_parts(future: BoxFuture<'static, FetchResult<T>>, handle: CancelHandle) -> Self {
        Self { future, handle }
    }

    /// An operation that is already resolved.
    pub fn ready(value: T) -> Self {
        Self::new(futures::future::ready(Ok(value)))
    }

    /// An operation that has already failed.
    pub fn failed(error: FetchError) -> Self {
        Self::new(futures::future::ready(Err(error)))
    }

    /// Sets the primary request aborted by [`cancel`](Self::cancel).
    pub fn with_request(self, request: impl RequestHandle + 'static) -> Self {
        self.handle.set_request(Arc::new(request));
        self
    }

    /// Adds secondary cancellables.
    pub fn with_cancellables(self, cancellables: impl IntoIterator<Item = Arc<dyn Cancellable>>) -> Self {
        for cancellable in cancellables {
            self.handle.attach(cancellable);
        }
        self
    }

    pub fn cancel(&self) {
        self.handle.cancel();
    }

    /// Returns a handle that cancels this operation after it has been moved
    /// into an executor.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.handle.clone()
    }

    pub fn has_request(&self) -> bool {
        self.handle.has_request()
    }

    pub fn into_parts(self) -> (BoxFuture<'static, FetchResult<T>>, CancelHandle) {
        (self.future, self.handle)
    }

    /// Transforms the successful value.
    pub fn map<U, F>(self, f: F) -> CancellableOperation<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        let (future, handle) = self.into_parts();
        CancellableOperation::from_parts(future.map(|result| result.map(f)).boxed(), handle)
    }

    /// Chains a fallible transformation of the successful value.
    pub fn and_then<U, F>(self, f: F) -> CancellableOperation<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> FetchResult<U> + Send + 'static,
    {
        let (future, handle) = self.into_parts();
        CancellableOperation::from_parts(future.map(|result| result.and_then(f)).boxed(), handle)
    }

    /// Runs `f` with the value when the operation succeeds.
    pub fn on_success<F>(self, f: F) -> Self
    where
        F: FnOnce(&T) + Send + 'static,
    {
        let (future, handle) = self.into_parts();
        let future = future.inspect(|result| {
            if let Ok(value) = result {
                f(value);
            }
        });
        Self::from_parts(future.boxed(), handle)
    }

    /// Runs `f` with the error when the operation fails.
    pub fn on_failure<F>(self, f: F) -> Self
    where
        F: FnOnce(&FetchError) + Send + 'static,
    {
        let (future, handle) = self.into_parts();
        let future = future.inspect(|result| {
            if let Err(error) = result {
                f(error);
            }
        });
        Self::from_parts(future.boxed(), handle)
    }

    /// Runs `f` once the operation settles, or when it is dropped unsettled.
    pub fn on_settled<F>(self, f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let (future, handle) = self.into_parts();
        let guard = defer(f);
        let future = async move {
            let _guard = guard;
            future.await
        };
        Self::from_parts(future.boxed(), handle)
    }
}

impl<T> Future for CancellableOperation<T> {
    type Output = FetchResult<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.get_mut().future.poll_unpin(cx)
    }
}

impl<T> fmt::Debug for CancellableOperation<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellableOperation")
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}
