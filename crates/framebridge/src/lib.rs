//! framebridge: authenticated handshake and RPC between an initiator
//! context and the responder context it embeds.
//!
//! The initiator side is driven through [`Initiator::connect`], which yields
//! an [`InitiatorApi`] once paired. Code running inside the embedded context
//! builds a [`Responder`] and awaits [`Responder::accept`] for its
//! [`ResponderApi`].

pub mod channel;
pub mod correlation;
pub mod events;
pub mod handshake;
pub mod host;
pub mod initiator;
pub mod responder;

pub use channel::{Context, Inbound, TargetOrigin};
pub use framebridge_core::config::BridgeConfig;
pub use framebridge_core::{HandshakeError, Member, Model, Origin, RpcError};
pub use host::{Frame, Host, HostError, LocalHost};
pub use initiator::{Initiator, InitiatorApi};
pub use responder::{Responder, ResponderApi};
