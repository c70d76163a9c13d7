//! framebridge-core: origins, the wire envelope, the responder model and
//! configuration. Shared by every framebridge crate; no async runtime here.

pub mod config;
pub mod envelope;
pub mod error;
pub mod model;
pub mod origin;

pub use envelope::{Envelope, Kind, PROTOCOL_TAG};
pub use error::{HandshakeError, RpcError};
pub use model::{Member, Model};
pub use origin::Origin;
