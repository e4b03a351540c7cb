//! Request-scoped context, cancellation and the bounded hand-off queue.
//!
//! - `RequestContext` carries a correlation id plus a cancellation token.
//! - `CancellationToken::child` links a token to its parent, so a sync pass can
//!   cancel its own tasks without cancelling the caller.
//! - `BoundedQueue` is a multi-producer queue with backpressure: producers wait
//!   for a free slot, consumers wait for an item.

use crate::{ErrorCode, ErrorEnvelope, Result};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::{Mutex, Notify, Semaphore};

/// A correlation identifier used for logging/telemetry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CorrelationId(Arc<str>);

impl CorrelationId {
    /// Parse a correlation identifier from user input.
    ///
    /// The value is trimmed; empty values are rejected.
    pub fn parse(value: impl AsRef<str>) -> Result<Self> {
        let trimmed = value.as_ref().trim();
        if trimmed.is_empty() {
            return Err(ErrorEnvelope::expected(
                ErrorCode::invalid_input(),
                "correlationId must be non-empty",
            ));
        }
        Ok(Self(Arc::from(trimmed)))
    }

    /// Create a new request id, unique within this process.
    #[must_use]
    pub fn new_request_id() -> Self {
        next_scoped_id(&REQUEST_ID_COUNTER, "req_")
    }

    /// Create a new sync pass id, unique within this process.
    #[must_use]
    pub fn new_sync_id() -> Self {
        next_scoped_id(&SYNC_ID_COUNTER, "sync_")
    }

    /// Borrow the identifier as a string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

static REQUEST_ID_COUNTER: AtomicU64 = AtomicU64::new(1);
static SYNC_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

fn next_scoped_id(counter: &AtomicU64, prefix: &'static str) -> CorrelationId {
    let n = counter.fetch_add(1, Ordering::Relaxed);
    CorrelationId(Arc::from(format!("{prefix}{n}")))
}

/// A clonable cancellation token that can be awaited.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    inner: Arc<CancellationState>,
}

#[derive(Debug)]
struct CancellationState {
    cancelled: AtomicBool,
    notify: Notify,
    parent: Option<CancellationToken>,
}

impl CancellationToken {
    /// Create a new root token in the non-cancelled state.
    #[must_use]
    pub fn new() -> Self {
        Self::with_parent(None)
    }

    fn with_parent(parent: Option<Self>) -> Self {
        Self {
            inner: Arc::new(CancellationState {
                cancelled: AtomicBool::new(false),
                notify: Notify::new(),
                parent,
            }),
        }
    }

    /// Create a token that is cancelled whenever `self` is, but can also be cancelled alone.
    #[must_use]
    pub fn child(&self) -> Self {
        Self::with_parent(Some(self.clone()))
    }

    /// Cancel the token and wake all waiters.
    pub fn cancel(&self) {
        if !self.inner.cancelled.swap(true, Ordering::SeqCst) {
            self.inner.notify.notify_waiters();
        }
    }

    /// Returns true if the token or any ancestor has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
            || self
                .inner
                .parent
                .as_ref()
                .is_some_and(Self::is_cancelled)
    }

    /// Wait until the token (or an ancestor) is cancelled.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            match &self.inner.parent {
                Some(parent) => {
                    let parent_cancelled = Box::pin(parent.cancelled());
                    tokio::select! {
                        () = notified => {},
                        () = parent_cancelled => return,
                    }
                },
                None => notified.await,
            }
        }
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Request-scoped context passed across boundaries.
#[derive(Debug, Clone)]
pub struct RequestContext {
    correlation_id: CorrelationId,
    cancellation: CancellationToken,
}

impl RequestContext {
    /// Create a new request context with a fresh cancellation token.
    #[must_use]
    pub fn new(correlation_id: CorrelationId) -> Self {
        Self {
            correlation_id,
            cancellation: CancellationToken::new(),
        }
    }

    /// Create a context with an auto-generated `req_*` id.
    #[must_use]
    pub fn new_request() -> Self {
        Self::new(CorrelationId::new_request_id())
    }

    /// Create a context with an explicit cancellation token (for sharing cancellation).
    #[must_use]
    pub const fn with_cancellation(
        correlation_id: CorrelationId,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            correlation_id,
            cancellation,
        }
    }

    /// Derive a context with the same correlation id and a child cancellation token.
    #[must_use]
    pub fn child(&self) -> Self {
        Self {
            correlation_id: self.correlation_id.clone(),
            cancellation: self.cancellation.child(),
        }
    }

    /// Return the correlation id.
    #[must_use]
    pub const fn correlation_id(&self) -> &CorrelationId {
        &self.correlation_id
    }

    /// Return a clone of the cancellation token.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    /// Returns true if the request was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Cancel this request.
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    /// Await cancellation.
    pub async fn cancelled(&self) {
        self.cancellation.cancelled().await;
    }

    /// Return a cancellation error when cancelled, including operation metadata.
    pub fn ensure_not_cancelled(&self, operation: &'static str) -> Result<()> {
        if self.is_cancelled() {
            return Err(cancelled_error(operation));
        }
        Ok(())
    }
}

fn cancelled_error(operation: &'static str) -> ErrorEnvelope {
    ErrorEnvelope::cancelled("operation cancelled").with_operation(operation)
}

/// Error returned when a `BoundedQueue` is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("bounded queue is closed")]
pub struct BoundedQueueClosedError;

impl From<BoundedQueueClosedError> for ErrorEnvelope {
    fn from(error: BoundedQueueClosedError) -> Self {
        Self::expected(
            ErrorCode::new("core", "bounded_queue_closed"),
            error.to_string(),
        )
    }
}

/// A bounded async queue with explicit backpressure.
///
/// Items are delivered in enqueue order. Closing the queue rejects new items
/// but keeps queued ones available to consumers.
#[derive(Debug)]
pub struct BoundedQueue<T> {
    shared: Arc<QueueShared<T>>,
}

impl<T> Clone for BoundedQueue<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

#[derive(Debug)]
struct QueueShared<T> {
    capacity: usize,
    state: Mutex<QueueState<T>>,
    free_slots: Semaphore,
    item_ready: Notify,
}

#[derive(Debug)]
struct QueueState<T> {
    items: VecDeque<T>,
    closed: bool,
}

impl<T> BoundedQueue<T> {
    /// Create a new bounded queue.
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(ErrorEnvelope::expected(
                ErrorCode::invalid_input(),
                "capacity must be a positive number",
            ));
        }

        Ok(Self {
            shared: Arc::new(QueueShared {
                capacity,
                state: Mutex::new(QueueState {
                    items: VecDeque::with_capacity(capacity),
                    closed: false,
                }),
                free_slots: Semaphore::new(capacity),
                item_ready: Notify::new(),
            }),
        })
    }

    /// Return the configured capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    /// Return the current queue length.
    pub async fn len(&self) -> usize {
        self.shared.state.lock().await.items.len()
    }

    /// Return true when the queue is empty.
    pub async fn is_empty(&self) -> bool {
        self.shared.state.lock().await.items.is_empty()
    }

    /// Close the queue. Queued items may still be dequeued.
    pub async fn close(&self) {
        let mut state = self.shared.state.lock().await;
        state.closed = true;
        self.shared.free_slots.close();
        drop(state);
        self.shared.item_ready.notify_waiters();
    }

    /// Close the queue and drop all queued items.
    pub async fn close_and_clear(&self) {
        let mut state = self.shared.state.lock().await;
        state.closed = true;
        state.items.clear();
        self.shared.free_slots.close();
        drop(state);
        self.shared.item_ready.notify_waiters();
    }

    /// Enqueue an item, waiting for a free slot when the queue is full.
    pub async fn enqueue(&self, ctx: &RequestContext, item: T) -> Result<()> {
        ctx.ensure_not_cancelled("queue.enqueue")?;

        let permit = tokio::select! {
            () = ctx.cancelled() => return Err(cancelled_error("queue.enqueue")),
            permit = self.shared.free_slots.acquire() => {
                permit.map_err(|_| ErrorEnvelope::from(BoundedQueueClosedError))?
            }
        };

        let mut state = self.shared.state.lock().await;
        if state.closed {
            return Err(BoundedQueueClosedError.into());
        }
        // The slot is returned by `dequeue`, not by dropping the permit.
        permit.forget();
        state.items.push_back(item);
        drop(state);
        self.shared.item_ready.notify_one();
        Ok(())
    }

    /// Dequeue an item, waiting when the queue is empty.
    ///
    /// Returns a closed error once the queue is closed and drained.
    pub async fn dequeue(&self, ctx: &RequestContext) -> Result<T> {
        loop {
            ctx.ensure_not_cancelled("queue.dequeue")?;
            let ready = self.shared.item_ready.notified();
            {
                let mut state = self.shared.state.lock().await;
                if let Some(item) = state.items.pop_front() {
                    self.shared.free_slots.add_permits(1);
                    return Ok(item);
                }
                if state.closed {
                    return Err(BoundedQueueClosedError.into());
                }
            }

            tokio::select! {
                () = ctx.cancelled() => return Err(cancelled_error("queue.dequeue")),
                () = ready => {},
            }
        }
    }
}
