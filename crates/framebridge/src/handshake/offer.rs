//! Initiator side of the handshake.

use serde_json::{Map, Value};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::{sleep_until, Instant, MissedTickBehavior};

use framebridge_core::config::HandshakeConfig;
use framebridge_core::envelope::{self, Envelope, Kind};
use framebridge_core::{HandshakeError, Origin};

use super::state::HandshakeSession;
use crate::channel::{Context, Inbound, TargetOrigin};

/// Offer `model` to `child` until a trusted `handshake-reply` arrives on
/// `inbox`. Returns the authenticated origin of the responder.
///
/// The first offer goes out immediately, then one per interval until the
/// session's attempt budget is spent. The retry timer lives inside this
/// future, so it stops the moment this returns or is dropped.
pub async fn offer(
    own: &Context,
    child: &Context,
    inbox: &mut broadcast::Receiver<Inbound>,
    session: &mut HandshakeSession,
    model: &Map<String, Value>,
    config: &HandshakeConfig,
) -> Result<Origin, HandshakeError> {
    session.begin();

    let payload = Envelope::handshake(model.clone()).to_value();
    let target = TargetOrigin::Exact(session.target().clone());

    let mut ticker = tokio::time::interval(config.interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // A zero budget never offers; give up right away when rejecting.
    let mut give_up_at: Option<Instant> =
        (session.is_exhausted() && config.reject_on_exhaustion).then(Instant::now);

    loop {
        tokio::select! {
            _ = ticker.tick(), if !session.is_exhausted() => {
                if let Some(attempt) = session.next_attempt() {
                    tracing::debug!(attempt, target = %session.target(), "sending handshake offer");
                    child.post_message(own, payload.clone(), &target);

                    if session.is_exhausted() {
                        if config.reject_on_exhaustion {
                            give_up_at = Some(Instant::now() + config.interval());
                        } else {
                            tracing::debug!(attempts = attempt, "handshake offers exhausted; still listening");
                        }
                    }
                }
            }

            _ = expire(give_up_at) => {
                session.fail();
                tracing::warn!(attempts = session.attempts(), target = %session.target(), "handshake unanswered");
                return Err(HandshakeError::Exhausted { attempts: session.attempts() });
            }

            received = inbox.recv() => match received {
                Ok(inbound) => {
                    match envelope::sanitize(&inbound.origin, &inbound.data, session.target()) {
                        Ok(env) if env.kind == Kind::HandshakeReply => {
                            session.pair();
                            tracing::info!(origin = %inbound.origin, attempts = session.attempts(), "handshake reply received");
                            return Ok(inbound.origin);
                        }
                        Ok(env) => {
                            session.fail();
                            tracing::warn!(kind = env.kind.as_str(), "invalid handshake reply");
                            return Err(HandshakeError::Rejected(env.kind));
                        }
                        Err(reason) => {
                            tracing::trace!(?reason, origin = %inbound.origin, "dropping message during handshake");
                        }
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "handshake listener lagged");
                }
                Err(RecvError::Closed) => {
                    session.fail();
                    return Err(HandshakeError::ChannelClosed);
                }
            },
        }
    }
}

async fn expire(deadline: Option<Instant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}
