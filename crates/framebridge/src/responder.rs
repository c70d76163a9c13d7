//! Responder: runs inside the embedded context and serves its model.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast::{self, error::RecvError};

use framebridge_core::config::BridgeConfig;
use framebridge_core::envelope::{self, Envelope, Kind};
use framebridge_core::model::{MergePolicy, Model};
use framebridge_core::{HandshakeError, Origin, RpcError};

use crate::channel::{Context, Inbound, TargetOrigin};
use crate::handshake::{self, ResponderState};

/// The responder before pairing. Listening starts at construction, so build
/// it as early as possible inside the embedded context.
pub struct Responder {
    context: Context,
    model: Model,
    merge: MergePolicy,
    inbox: broadcast::Receiver<Inbound>,
    state: ResponderState,
}

impl Responder {
    pub fn new(context: Context, model: Model, config: &BridgeConfig) -> Self {
        let inbox = context.subscribe();
        Self {
            context,
            model,
            merge: config.model.merge,
            inbox,
            state: ResponderState::Waiting,
        }
    }

    /// Wait for the initiator's handshake, then start serving. There is no
    /// responder-side timeout; only detaching the context ends the wait.
    pub async fn accept(mut self) -> Result<ResponderApi, HandshakeError> {
        let accepted = handshake::accept(
            &self.context,
            &mut self.inbox,
            &mut self.model,
            self.merge,
            &mut self.state,
        )
        .await?;
        Ok(ResponderApi::new(
            self.context,
            accepted.parent,
            accepted.parent_origin,
            self.model,
            self.inbox,
        ))
    }
}

/// Paired responder facade. Exposes `emit`.
///
/// Serving `get`/`call` runs in the background until the embedded context is
/// detached by its host. Dropping this handle does not stop it.
pub struct ResponderApi {
    own: Context,
    parent: Context,
    parent_origin: Origin,
    model: Arc<Model>,
}

impl ResponderApi {
    fn new(
        own: Context,
        parent: Context,
        parent_origin: Origin,
        model: Model,
        inbox: broadcast::Receiver<Inbound>,
    ) -> Self {
        let model = Arc::new(model);
        tracing::debug!(parent = %parent_origin, "registering responder API");
        tokio::spawn(serve(
            inbox,
            own.clone(),
            parent.clone(),
            parent_origin.clone(),
            model.clone(),
        ));
        Self {
            own,
            parent,
            parent_origin,
            model,
        }
    }

    /// The initiator's authenticated origin.
    pub fn parent_origin(&self) -> &Origin {
        &self.parent_origin
    }

    /// False once the host has detached the embedded context.
    pub fn is_attached(&self) -> bool {
        !self.own.is_closed()
    }

    /// The model as merged during the handshake.
    pub fn model(&self) -> &Model {
        &self.model
    }

    /// Send `event` to the paired initiator, and only to it. Fails with
    /// [`RpcError::Destroyed`] once the embedded context is detached.
    pub fn emit<T: Serialize>(&self, event: &str, data: T) -> Result<(), RpcError> {
        if !self.is_attached() {
            return Err(RpcError::Destroyed);
        }
        let data = serde_json::to_value(data).map_err(RpcError::Encode)?;
        tracing::debug!(event, "emitting event");
        self.parent.post_message(
            &self.own,
            Envelope::emit(event, data).to_value(),
            &TargetOrigin::Exact(self.parent_origin.clone()),
        );
        Ok(())
    }
}

/// Serve trusted `request` and `call` envelopes from the paired initiator
/// until `own` is detached.
async fn serve(
    mut inbox: broadcast::Receiver<Inbound>,
    own: Context,
    parent: Context,
    parent_origin: Origin,
    model: Arc<Model>,
) {
    tracing::debug!("awaiting requests from initiator");
    loop {
        let received = tokio::select! {
            _ = own.closed() => {
                tracing::debug!(parent = %parent_origin, "embedded context detached; responder stopped");
                break;
            }
            received = inbox.recv() => received,
        };
        let inbound = match received {
            Ok(inbound) => inbound,
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "responder listener lagged");
                continue;
            }
            Err(RecvError::Closed) => break,
        };

        let env = match envelope::sanitize(&inbound.origin, &inbound.data, &parent_origin) {
            Ok(env) => env,
            Err(reason) => {
                tracing::trace!(?reason, origin = %inbound.origin, "dropping untrusted message");
                continue;
            }
        };

        match env.kind {
            Kind::Call => {
                let property = env.property.unwrap_or_default();
                match model.invoke(&property, env.data.unwrap_or(Value::Null)) {
                    Some(running) => {
                        tracing::debug!(property, "invoking model member");
                        tokio::spawn(running);
                    }
                    None => tracing::trace!(property, "ignoring call to non-invocable member"),
                }
            }
            Kind::Request => {
                let Some(id) = env.request_id else {
                    tracing::trace!("request without id");
                    continue;
                };
                let property = env.property.unwrap_or_default();
                tracing::debug!(id, property, "received request");

                let resolving = model.resolve(&property);
                let (own, parent, target) = (
                    own.clone(),
                    parent.clone(),
                    TargetOrigin::Exact(parent_origin.clone()),
                );
                // Reply to the handshake peer, never to whoever sent this.
                tokio::spawn(async move {
                    let value = resolving.await;
                    parent.post_message(&own, Envelope::reply(id, Some(property), value).to_value(), &target);
                });
            }
            Kind::Handshake => tracing::trace!("ignoring repeated handshake offer"),
            other => tracing::trace!(kind = other.as_str(), "ignoring message"),
        }
    }
}
