//! Error types surfaced to application code.
//!
//! Untrusted messages never become errors; they are dropped at the sanitizer.

use crate::envelope::Kind;

/// Terminal pairing failure. The caller must start over from scratch.
#[derive(Debug, thiserror::Error)]
pub enum HandshakeError {
    /// A trusted message of the wrong kind arrived while pairing.
    #[error("handshake rejected: unexpected {0:?} message")]
    Rejected(Kind),
    /// Every offer went unanswered.
    #[error("handshake failed: no reply after {attempts} attempts")]
    Exhausted { attempts: u32 },
    /// The host could not create or load the embedded context.
    #[error("host error: {0}")]
    Host(String),
    /// Our own inbox closed before pairing completed.
    #[error("channel closed during handshake")]
    ChannelClosed,
}

/// Local failure of a facade operation. Never sent across the channel.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("facade destroyed")]
    Destroyed,
    #[error("failed to encode payload: {0}")]
    Encode(serde_json::Error),
    #[error("failed to decode reply for {property}: {source}")]
    Decode {
        property: String,
        source: serde_json::Error,
    },
}
