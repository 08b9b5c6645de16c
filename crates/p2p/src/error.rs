use std::io;

use thiserror::Error;

use crate::merkle::MerkleError;
use wire::WireError;

/// Terminal session outcomes.
///
/// No inbound protocol error is recovered locally; every variant except
/// [`SessionError::ChannelClosed`] means the connection is torn down and the
/// manager decides whether to reconnect.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("wire error: {0}")]
    Wire(#[from] WireError),
    #[error("invalid merkle block: {0}")]
    Merkle(#[from] MerkleError),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("duplicate version message")]
    DuplicateVersion,
    #[error("peer protocol version {0} is below the supported minimum")]
    VersionTooOld(i32),
    #[error("{0:?} message received before version handshake")]
    HandshakeRequired(String),
    #[error("channel closed by the other side")]
    ChannelClosed,
}
