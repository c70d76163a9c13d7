//! Host environment collaborator: where embedded contexts come from.
//!
//! The protocol core only needs four things from its host: the initiator's
//! own context, a readiness signal for the host document, a way to create and
//! attach an embedded context for an address (with a load-completion signal),
//! and a way to detach it again. [`LocalHost`] provides all four in-process.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::watch;

use framebridge_core::origin;
use framebridge_core::Origin;

use crate::channel::{Context, DEFAULT_INBOX_CAPACITY};

#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("failed to create embedded context for {address}: {reason}")]
    CreateFailed { address: String, reason: String },
    #[error("embedded context for {0} was detached before it finished loading")]
    LoadAborted(String),
}

pub trait Host: Clone + Send + Sync + 'static {
    /// The initiator's own context.
    fn context(&self) -> Context;

    /// Resolves once the host document can accept an embedded context.
    fn ready(&self) -> impl Future<Output = ()> + Send;

    /// Create and attach an embedded context that loads `address`.
    fn create_responder(
        &self,
        address: &str,
    ) -> impl Future<Output = Result<Frame, HostError>> + Send;

    /// Detach and destroy an embedded context. Safe to call twice.
    fn detach(&self, frame: &Frame);
}

/// An attached embedded context plus its load-completion signal.
#[derive(Debug, Clone)]
pub struct Frame {
    id: u64,
    address: String,
    context: Context,
    loaded: watch::Receiver<bool>,
}

impl Frame {
    pub fn new(id: u64, address: impl Into<String>, context: Context, loaded: watch::Receiver<bool>) -> Self {
        Self {
            id,
            address: address.into(),
            context,
            loaded,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Wait for the embedded context to finish loading.
    pub async fn loaded(&mut self) -> Result<(), HostError> {
        self.loaded
            .wait_for(|done| *done)
            .await
            .map(|_| ())
            .map_err(|_| HostError::LoadAborted(self.address.clone()))
    }
}

// ── In-process host ───────────────────────────────────────────────────────────

/// Script run inside a freshly created embedded context, before it reports
/// load completion. Usually builds a `Responder` and spawns its `accept`.
pub type Loader = Arc<dyn Fn(Context) + Send + Sync>;

struct Served {
    /// Origin the content actually lives at, if not the address's own.
    origin: Option<Origin>,
    loader: Loader,
}

struct Attached {
    context: Context,
    _loaded: watch::Sender<bool>,
}

struct LocalHostInner {
    context: Context,
    capacity: usize,
    ready: watch::Sender<bool>,
    served: DashMap<String, Served>,
    attached: DashMap<u64, Attached>,
    next_frame: AtomicU64,
}

/// In-process host. Embedded contexts are plain [`Context`]s whose origin is
/// resolved from the address they were created for.
#[derive(Clone)]
pub struct LocalHost {
    inner: Arc<LocalHostInner>,
}

impl LocalHost {
    /// A host whose document is already ready.
    pub fn new(origin: Origin) -> Self {
        Self::with_capacity(origin, DEFAULT_INBOX_CAPACITY, true)
    }

    /// A host whose document becomes ready on [`LocalHost::mark_ready`].
    pub fn loading(origin: Origin) -> Self {
        Self::with_capacity(origin, DEFAULT_INBOX_CAPACITY, false)
    }

    pub fn with_capacity(origin: Origin, capacity: usize, ready: bool) -> Self {
        let (ready, _) = watch::channel(ready);
        Self {
            inner: Arc::new(LocalHostInner {
                context: Context::with_capacity(origin, capacity),
                capacity,
                ready,
                served: DashMap::new(),
                attached: DashMap::new(),
                next_frame: AtomicU64::new(1),
            }),
        }
    }

    pub fn mark_ready(&self) {
        self.inner.ready.send_replace(true);
    }

    /// Run `loader` in every embedded context created for `address`.
    pub fn serve<F>(&self, address: impl Into<String>, loader: F)
    where
        F: Fn(Context) + Send + Sync + 'static,
    {
        self.inner.served.insert(
            address.into(),
            Served {
                origin: None,
                loader: Arc::new(loader),
            },
        );
    }

    /// Like [`LocalHost::serve`], but the content ends up at `origin`
    /// regardless of the address, as after a cross-origin redirect.
    pub fn serve_from<F>(&self, address: impl Into<String>, origin: Origin, loader: F)
    where
        F: Fn(Context) + Send + Sync + 'static,
    {
        self.inner.served.insert(
            address.into(),
            Served {
                origin: Some(origin),
                loader: Arc::new(loader),
            },
        );
    }

    /// Number of embedded contexts currently attached.
    pub fn attached(&self) -> usize {
        self.inner.attached.len()
    }
}

impl Host for LocalHost {
    fn context(&self) -> Context {
        self.inner.context.clone()
    }

    fn ready(&self) -> impl Future<Output = ()> + Send {
        let mut ready = self.inner.ready.subscribe();
        async move {
            // The sender lives as long as the host; an error cannot happen
            // while anyone can still call this.
            let _ = ready.wait_for(|r| *r).await;
        }
    }

    fn create_responder(
        &self,
        address: &str,
    ) -> impl Future<Output = Result<Frame, HostError>> + Send {
        let inner = self.inner.clone();
        let address = address.to_string();
        async move {
            let served = inner
                .served
                .get(&address)
                .map(|s| (s.origin.clone(), s.loader.clone()));

            let origin = served
                .as_ref()
                .and_then(|(origin, _)| origin.clone())
                .unwrap_or_else(|| origin::resolve(&address, inner.context.origin()));

            let id = inner.next_frame.fetch_add(1, Ordering::SeqCst);
            let context = Context::with_capacity(origin, inner.capacity);
            let (loaded_tx, loaded_rx) = watch::channel(false);

            tracing::debug!(frame = id, %address, origin = %context.origin(), "attaching embedded context");

            match served {
                Some((_, loader)) => loader(context.clone()),
                None => tracing::debug!(%address, "nothing served at address; frame stays empty"),
            }
            loaded_tx.send_replace(true);

            inner.attached.insert(
                id,
                Attached {
                    context: context.clone(),
                    _loaded: loaded_tx,
                },
            );
            Ok(Frame::new(id, address, context, loaded_rx))
        }
    }

    fn detach(&self, frame: &Frame) {
        if let Some((_, attached)) = self.inner.attached.remove(&frame.id()) {
            attached.context.close();
            tracing::debug!(frame = frame.id(), address = frame.address(), "detached embedded context");
        }
    }
}
