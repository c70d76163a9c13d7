//! Responder side of the handshake.

use tokio::sync::broadcast::{self, error::RecvError};

use framebridge_core::envelope::{self, Envelope, Kind};
use framebridge_core::model::{MergePolicy, Model};
use framebridge_core::{HandshakeError, Origin};

use super::state::ResponderState;
use crate::channel::{Context, Inbound, TargetOrigin};

/// Outcome of a completed responder handshake.
#[derive(Debug)]
pub struct Accepted {
    /// The initiator's context, taken from the handshake's transport source.
    pub parent: Context,
    /// The initiator's origin. All later traffic must come from here.
    pub parent_origin: Origin,
}

/// Wait for the first tagged `handshake` on `inbox`, reply once, and fold
/// the offered defaults into `model`. Moves `state` from `Waiting` to `Ready`
/// on success and leaves it untouched on failure.
///
/// There is no origin to check until the handshake itself arrives, so this
/// only checks shape and tag. Untagged traffic is ignored; a correctly tagged
/// message of any other known kind fails the pairing. Detaching `own` while
/// waiting fails it with [`HandshakeError::ChannelClosed`].
pub async fn accept(
    own: &Context,
    inbox: &mut broadcast::Receiver<Inbound>,
    model: &mut Model,
    merge: MergePolicy,
    state: &mut ResponderState,
) -> Result<Accepted, HandshakeError> {
    if *state == ResponderState::Ready {
        return Err(HandshakeError::Rejected(Kind::Handshake));
    }
    tracing::debug!(origin = %own.origin(), ?state, "awaiting handshake");

    let (inbound, offer) = loop {
        let received = tokio::select! {
            _ = own.closed() => return Err(HandshakeError::ChannelClosed),
            received = inbox.recv() => received,
        };
        match received {
            Ok(inbound) => match envelope::parse(&inbound.data) {
                Ok(env) if env.kind == Kind::Handshake => break (inbound, env),
                Ok(env) => {
                    tracing::warn!(kind = env.kind.as_str(), origin = %inbound.origin, "unexpected message before handshake");
                    return Err(HandshakeError::Rejected(env.kind));
                }
                Err(reason) => {
                    tracing::trace!(?reason, origin = %inbound.origin, "ignoring message before handshake");
                }
            },
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "handshake listener lagged");
            }
            Err(RecvError::Closed) => return Err(HandshakeError::ChannelClosed),
        }
    };

    tracing::debug!(origin = %inbound.origin, "received handshake from initiator");
    let parent = inbound.source().ok_or(HandshakeError::ChannelClosed)?;
    let parent_origin = inbound.origin;

    parent.post_message(
        own,
        Envelope::handshake_reply().to_value(),
        &TargetOrigin::Exact(parent_origin.clone()),
    );

    if let Some(defaults) = offer.model {
        let offered = defaults.len();
        model.merge_defaults(defaults, merge);
        tracing::debug!(offered, ?merge, "merged model defaults from initiator");
    }

    *state = ResponderState::Ready;
    tracing::info!(parent = %parent_origin, ?state, "paired with initiator");
    Ok(Accepted {
        parent,
        parent_origin,
    })
}
