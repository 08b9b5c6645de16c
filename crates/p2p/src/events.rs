use std::fmt;
use std::net::SocketAddr;

use crate::merkle::DecodedMerkleBlock;
use wire::{Message, VersionMessage};

/// Immutable descriptor of the peer on the far side of a session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteHost {
    pub addr: SocketAddr,
}

impl RemoteHost {
    pub fn new(addr: SocketAddr) -> Self {
        Self { addr }
    }
}

impl fmt::Display for RemoteHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.addr)
    }
}

/// Events a session reports to its manager.
///
/// Within one peer these arrive in dispatch order; between peers sharing a
/// manager channel no ordering is defined.
#[derive(Clone, Debug)]
pub enum ManagerRequest {
    /// The version handshake completed; the payload is the peer's `version`.
    Handshake(RemoteHost, VersionMessage),
    /// A merkle block with its matched transactions, ordered as in the proof.
    MerkleBlockReady(RemoteHost, DecodedMerkleBlock),
    /// A message the session does not interpret, forwarded untouched.
    PassThrough(RemoteHost, Message),
}
