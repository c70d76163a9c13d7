//! Handshake engine: pairs an initiator with the responder it embeds.
//!
//! The initiator repeatedly offers a `handshake` carrying its model defaults
//! until a trusted `handshake-reply` comes back. The responder waits for the
//! first tagged `handshake`, trusts its sender from then on, replies exactly
//! once and merges the offered defaults into its own model.

mod accept;
mod offer;
mod state;

pub use accept::{accept, Accepted};
pub use offer::offer;
pub use state::{HandshakeSession, InitiatorState, ResponderState};
