//! Transport addresses and remote identity extraction

use std::fmt;
use std::net::SocketAddr;
use tangle_core::FeedRef;
use thiserror::Error;

/// Prefix of the hello line that carries the remote public key
pub const SHS_PREFIX: &str = "shs:";

/// Address errors
#[derive(Debug, Error)]
pub enum AddrError {
    #[error("no shs key in transport address {0}")]
    MissingShs(String),
    #[error("invalid shs key in transport address {addr}: {source}")]
    InvalidKey {
        addr: String,
        #[source]
        source: tangle_core::Error,
    },
}

/// Address of an accepted stream as reported by the transport.
///
/// `handshake` is the first line the dialer sent. The secret-handshake layer
/// sits outside this crate; a dialer announces its key as `shs:<base64>`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransportAddr {
    pub socket: SocketAddr,
    pub handshake: String,
}

impl TransportAddr {
    pub fn new(socket: SocketAddr, handshake: impl Into<String>) -> Self {
        Self {
            socket,
            handshake: handshake.into(),
        }
    }

    /// Build the address a dialer with `feed` would present
    pub fn for_feed(socket: SocketAddr, feed: &FeedRef) -> Self {
        Self::new(socket, hello_line(feed))
    }

    /// Extract the remote feed identity (always tagged with the primary format)
    pub fn feed_ref(&self) -> Result<FeedRef, AddrError> {
        let encoded = self
            .handshake
            .trim()
            .strip_prefix(SHS_PREFIX)
            .ok_or_else(|| AddrError::MissingShs(self.to_string()))?;

        let sigil = format!("@{encoded}.ed25519");
        let feed: FeedRef = sigil.parse().map_err(|source| AddrError::InvalidKey {
            addr: self.to_string(),
            source,
        })?;
        Ok(feed)
    }
}

impl fmt::Display for TransportAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "net:{}~{}", self.socket, self.handshake.trim())
    }
}

/// Hello line announcing `feed`'s key
pub fn hello_line(feed: &FeedRef) -> String {
    let text = FeedRef::ed25519(feed.key).to_string();
    // "@<base64>.ed25519" -> "shs:<base64>"
    let encoded = text
        .trim_start_matches('@')
        .trim_end_matches(".ed25519");
    format!("{SHS_PREFIX}{encoded}")
}
