//! Contexts and the broadcast-style messaging surface between them.
//!
//! A [`Context`] is one isolated execution context with its own inbox. Anyone
//! holding a handle may post into that inbox, so listeners sanitize all
//! inbound traffic. The transport stamps each delivery with the sender's
//! origin; envelope content never decides who sent a message.

use std::fmt;
use std::sync::{Arc, Weak};

use serde_json::Value;
use tokio::sync::{broadcast, watch};

use framebridge_core::Origin;

use crate::correlation::RequestIds;

pub const DEFAULT_INBOX_CAPACITY: usize = 256;

/// Delivery restriction on a post. The receiving context drops the message
/// unless its own origin matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetOrigin {
    Any,
    Exact(Origin),
}

impl TargetOrigin {
    fn admits(&self, origin: &Origin) -> bool {
        match self {
            Self::Any => true,
            Self::Exact(expected) => expected == origin,
        }
    }
}

/// One delivered message, as seen by the receiving context.
#[derive(Clone)]
pub struct Inbound {
    /// Sender origin, supplied by the transport.
    pub origin: Origin,
    pub data: Value,
    source: Weak<ContextInner>,
}

impl Inbound {
    /// Handle to the sending context, if it still exists.
    pub fn source(&self) -> Option<Context> {
        self.source.upgrade().map(|inner| Context { inner })
    }
}

impl fmt::Debug for Inbound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Inbound")
            .field("origin", &self.origin)
            .field("data", &self.data)
            .finish()
    }
}

struct ContextInner {
    origin: Origin,
    inbox: broadcast::Sender<Inbound>,
    closed: watch::Sender<bool>,
    request_ids: Arc<RequestIds>,
}

#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

impl Context {
    pub fn new(origin: Origin) -> Self {
        Self::with_capacity(origin, DEFAULT_INBOX_CAPACITY)
    }

    pub fn with_capacity(origin: Origin, capacity: usize) -> Self {
        let (inbox, _) = broadcast::channel(capacity.max(1));
        Self {
            inner: Arc::new(ContextInner {
                origin,
                inbox,
                closed: watch::Sender::new(false),
                request_ids: Arc::new(RequestIds::new()),
            }),
        }
    }

    pub fn origin(&self) -> &Origin {
        &self.inner.origin
    }

    /// Start listening. Only messages posted after this call are seen.
    pub fn subscribe(&self) -> broadcast::Receiver<Inbound> {
        self.inner.inbox.subscribe()
    }

    /// Request id sequence shared by every initiator listening on this
    /// context, so their replies can never be confused with one another.
    pub fn request_ids(&self) -> Arc<RequestIds> {
        self.inner.request_ids.clone()
    }

    /// Post `data` from `sender` into this context's inbox. Returns whether
    /// anything was delivered; the sender is never told in the protocol.
    pub fn post_message(&self, sender: &Context, data: Value, target: &TargetOrigin) -> bool {
        if self.is_closed() {
            tracing::trace!(to = %self.origin(), "dropping post to closed context");
            return false;
        }
        if sender.is_closed() {
            tracing::trace!(from = %sender.origin(), "dropping post from closed context");
            return false;
        }
        if !target.admits(self.origin()) {
            tracing::trace!(
                to = %self.origin(),
                target = ?target,
                "dropping post: target origin mismatch"
            );
            return false;
        }
        let inbound = Inbound {
            origin: sender.origin().clone(),
            data,
            source: Arc::downgrade(&sender.inner),
        };
        self.inner.inbox.send(inbound).is_ok()
    }

    /// Detach this context. Later posts to or from it are dropped.
    pub fn close(&self) {
        self.inner.closed.send_replace(true);
    }

    pub fn is_closed(&self) -> bool {
        *self.inner.closed.borrow()
    }

    /// Resolves once this context has been closed.
    pub async fn closed(&self) {
        let mut closed = self.inner.closed.subscribe();
        // The sender lives in `self`, so this cannot fail while we wait.
        let _ = closed.wait_for(|c| *c).await;
    }

    pub fn same_context(&self, other: &Context) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("origin", self.origin())
            .field("closed", &self.is_closed())
            .finish()
    }
}
