//! Initiator: embeds the responder, pairs with it, then drives it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

use framebridge_core::config::{BridgeConfig, HandshakeConfig};
use framebridge_core::envelope::{self, Envelope, Kind};
use framebridge_core::{origin, HandshakeError, Origin, RpcError};

use crate::channel::{Context, Inbound, TargetOrigin};
use crate::correlation::{PendingRequests, RequestIds};
use crate::events::EventRegistry;
use crate::handshake::{self, HandshakeSession};
use crate::host::{Frame, Host};

/// Builder for the initiator side of a pairing.
#[derive(Debug, Clone)]
pub struct Initiator {
    model: Map<String, Value>,
    handshake: HandshakeConfig,
    request_ids: Option<Arc<RequestIds>>,
}

impl Initiator {
    pub fn new(config: &BridgeConfig) -> Self {
        Self {
            model: Map::new(),
            handshake: config.handshake.clone(),
            request_ids: None,
        }
    }

    /// Defaults offered to the responder during the handshake.
    pub fn model(mut self, model: Map<String, Value>) -> Self {
        self.model = model;
        self
    }

    /// Add a single default to the offered model.
    pub fn default_value<T: Serialize>(mut self, key: impl Into<String>, value: T) -> Result<Self, RpcError> {
        let value = serde_json::to_value(value).map_err(RpcError::Encode)?;
        self.model.insert(key.into(), value);
        Ok(self)
    }

    /// Use `ids` for request ids instead of the host context's own sequence.
    pub fn request_ids(mut self, ids: Arc<RequestIds>) -> Self {
        self.request_ids = Some(ids);
        self
    }

    /// Embed `address` in `host` and pair with whatever loads there.
    ///
    /// On failure the embedded context is detached again; pairing is never
    /// retried automatically.
    pub async fn connect<H: Host>(self, host: &H, address: &str) -> Result<InitiatorApi<H>, HandshakeError> {
        let own = host.context();
        host.ready().await;

        let target = origin::resolve(address, own.origin());
        let mut frame = host
            .create_responder(address)
            .await
            .map_err(|e| HandshakeError::Host(e.to_string()))?;

        // Subscribe before the frame loads so no early reply is missed.
        let mut inbox = own.subscribe();

        tracing::debug!(address, target = %target, "loading embedded context");
        if let Err(e) = frame.loaded().await {
            host.detach(&frame);
            return Err(HandshakeError::Host(e.to_string()));
        }

        let mut session = HandshakeSession::new(target, self.handshake.max_attempts);
        let result = handshake::offer(
            &own,
            frame.context(),
            &mut inbox,
            &mut session,
            &self.model,
            &self.handshake,
        )
        .await;

        match result {
            Ok(child_origin) => {
                let ids = self.request_ids.unwrap_or_else(|| own.request_ids());
                Ok(InitiatorApi::new(host.clone(), own, frame, child_origin, inbox, ids))
            }
            Err(e) => {
                host.detach(&frame);
                Err(e)
            }
        }
    }
}

/// Paired initiator facade: `get`, `call`, `on`, `destroy`.
pub struct InitiatorApi<H: Host> {
    host: H,
    own: Context,
    frame: Frame,
    child_origin: Origin,
    ids: Arc<RequestIds>,
    pending: PendingRequests,
    events: Arc<EventRegistry>,
    listener: JoinHandle<()>,
    destroyed: AtomicBool,
}

impl<H: Host> InitiatorApi<H> {
    fn new(
        host: H,
        own: Context,
        frame: Frame,
        child_origin: Origin,
        inbox: broadcast::Receiver<Inbound>,
        ids: Arc<RequestIds>,
    ) -> Self {
        let pending = PendingRequests::new();
        let events = Arc::new(EventRegistry::new());

        tracing::debug!(child = %child_origin, "registering initiator API");
        let listener = tokio::spawn(listen(inbox, child_origin.clone(), pending.clone(), events.clone()));

        Self {
            host,
            own,
            frame,
            child_origin,
            ids,
            pending,
            events,
            listener,
            destroyed: AtomicBool::new(false),
        }
    }

    /// The responder's authenticated origin.
    pub fn child_origin(&self) -> &Origin {
        &self.child_origin
    }

    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    /// Read `property` from the responder's model. Unknown properties read
    /// as `null`. Waits indefinitely; wrap in a timeout if needed.
    pub async fn get_value(&self, property: &str) -> Result<Value, RpcError> {
        if self.is_destroyed() {
            return Err(RpcError::Destroyed);
        }
        let id = self.ids.next_id();
        let reply = self.pending.register(id);

        tracing::debug!(id, property, "requesting property");
        self.post(Envelope::request(id, property));

        reply.await.map_err(|_| RpcError::Destroyed)
    }

    /// Typed [`InitiatorApi::get_value`].
    pub async fn get<T: DeserializeOwned>(&self, property: &str) -> Result<T, RpcError> {
        let value = self.get_value(property).await?;
        serde_json::from_value(value).map_err(|source| RpcError::Decode {
            property: property.to_string(),
            source,
        })
    }

    /// Invoke `property` on the responder with `data`. No reply comes back.
    pub fn call<T: Serialize>(&self, property: &str, data: T) -> Result<(), RpcError> {
        if self.is_destroyed() {
            return Err(RpcError::Destroyed);
        }
        let data = serde_json::to_value(data).map_err(RpcError::Encode)?;
        tracing::debug!(property, "calling responder");
        self.post(Envelope::call(property, data));
        Ok(())
    }

    /// Handle emissions of `event`. Replaces any earlier handler for it.
    /// Payloads that do not decode as `T` are logged and dropped.
    pub fn on<T, F>(&self, event: &str, handler: F)
    where
        T: DeserializeOwned,
        F: Fn(T) + Send + Sync + 'static,
    {
        let name = event.to_string();
        self.events.register(event, move |data: Value| {
            match serde_json::from_value::<T>(data) {
                Ok(payload) => handler(payload),
                Err(e) => tracing::warn!(event = %name, error = %e, "dropping undecodable event payload"),
            }
        });
    }

    /// Stop listening, fail outstanding `get`s and detach the embedded
    /// context. Calling it again does nothing.
    pub fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::info!(
            child = %self.child_origin,
            outstanding = self.pending.len(),
            "destroying initiator API"
        );
        self.listener.abort();
        self.events.close();
        self.pending.clear();
        self.host.detach(&self.frame);
    }

    fn post(&self, env: Envelope) {
        self.frame.context().post_message(
            &self.own,
            env.to_value(),
            &TargetOrigin::Exact(self.child_origin.clone()),
        );
    }
}

impl<H: Host> Drop for InitiatorApi<H> {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

/// Route trusted replies to waiting `get`s and emissions to handlers.
async fn listen(
    mut inbox: broadcast::Receiver<Inbound>,
    child_origin: Origin,
    pending: PendingRequests,
    events: Arc<EventRegistry>,
) {
    tracing::debug!("awaiting messages from responder");
    loop {
        let inbound = match inbox.recv().await {
            Ok(inbound) => inbound,
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "initiator listener lagged");
                continue;
            }
            Err(RecvError::Closed) => break,
        };

        let env = match envelope::sanitize(&inbound.origin, &inbound.data, &child_origin) {
            Ok(env) => env,
            Err(reason) => {
                tracing::trace!(?reason, origin = %inbound.origin, "dropping untrusted message");
                continue;
            }
        };

        match env.kind {
            Kind::Reply => {
                let Some(id) = env.request_id else {
                    tracing::trace!("reply without request id");
                    continue;
                };
                if !pending.resolve(id, env.value.unwrap_or(Value::Null)) {
                    tracing::trace!(id, "reply for unknown or settled request");
                }
            }
            Kind::Emit => match env.emitted() {
                Some(event) => {
                    tracing::debug!(event = %event.name, "received event emission");
                    events.dispatch(&event.name, event.data);
                }
                None => tracing::trace!("malformed event emission"),
            },
            other => tracing::trace!(kind = other.as_str(), "ignoring message"),
        }
    }
}
