//! Origin resolution: canonical `scheme://host[:port]` identities.
//!
//! An Origin is used purely to authenticate the sender of a message, never to
//! route it. Resolution never fails: an address that does not parse yields
//! the base origin (the resolving context's own origin), and with no base it
//! collapses to the opaque `null` origin.

use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

/// The opaque origin, used when nothing better can be derived.
const NULL_ORIGIN: &str = "null";

/// Canonical scheme + host + port of a context. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Origin(String);

impl Origin {
    /// The opaque origin.
    pub fn null() -> Self {
        Self(NULL_ORIGIN.to_string())
    }

    /// Canonicalize an absolute address. Relative input yields `null`.
    pub fn parse(address: &str) -> Self {
        resolve(address, &Self::null())
    }

    pub fn is_null(&self) -> bool {
        self.0 == NULL_ORIGIN
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ── Resolution ────────────────────────────────────────────────────────────────

/// Derive the Origin of `address`, resolved against `base` when relative.
///
/// Parsing follows the WHATWG URL standard, so backslashes, IDN hosts and
/// numeric IPv4 forms canonicalize the way a browser would. Input that does
/// not parse falls back to `base`.
pub fn resolve(address: &str, base: &Origin) -> Origin {
    let base_url = (!base.is_null()).then(|| Url::parse(base.as_str()).ok()).flatten();

    match Url::options().base_url(base_url.as_ref()).parse(address.trim()) {
        Ok(url) => Origin(url.origin().ascii_serialization()),
        Err(e) => {
            tracing::trace!(address, error = %e, "unparseable address; using base origin");
            base.clone()
        }
    }
}
