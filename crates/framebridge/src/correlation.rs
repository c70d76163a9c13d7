//! Request correlation: id allocation and matching replies to waiters.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::oneshot;

/// Strictly increasing request ids, starting at 1.
#[derive(Debug, Default)]
pub struct RequestIds {
    last: AtomicU64,
}

impl RequestIds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&self) -> u64 {
        self.last.fetch_add(1, Ordering::SeqCst) + 1
    }
}

/// Outstanding `get`s, keyed by request id. Each entry resolves at most once.
#[derive(Clone, Default)]
pub struct PendingRequests {
    waiters: Arc<DashMap<u64, oneshot::Sender<Value>>>,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a waiter for `id`. Dropping the returned future before the
    /// reply lands removes the entry again.
    pub fn register(&self, id: u64) -> PendingReply {
        let (tx, rx) = oneshot::channel();
        self.waiters.insert(id, tx);
        PendingReply {
            id,
            rx,
            waiters: self.waiters.clone(),
        }
    }

    /// Hand `value` to the waiter for `id`. False if nobody was waiting.
    pub fn resolve(&self, id: u64, value: Value) -> bool {
        match self.waiters.remove(&id) {
            Some((_, tx)) => tx.send(value).is_ok(),
            None => false,
        }
    }

    /// Fail every outstanding waiter.
    pub fn clear(&self) {
        self.waiters.clear();
    }

    pub fn len(&self) -> usize {
        self.waiters.len()
    }
}

/// The eventual reply to one request. Errors if the waiter was cleared.
pub struct PendingReply {
    id: u64,
    rx: oneshot::Receiver<Value>,
    waiters: Arc<DashMap<u64, oneshot::Sender<Value>>>,
}

impl Future for PendingReply {
    type Output = Result<Value, oneshot::error::RecvError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx)
    }
}

impl Drop for PendingReply {
    fn drop(&mut self) {
        self.waiters.remove(&self.id);
    }
}
