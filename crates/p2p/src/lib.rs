//! SPV peer session for the Bitcoin P2P network.
//!
//! One [`PeerSession`] owns one TCP connection.  Inbound bytes run through a
//! streaming [`Framer`], the decoded messages drive a small state machine
//! (version handshake, ping replies, merkle-block reassembly) and everything
//! the session does not interpret is forwarded to an external manager over a
//! bounded channel.  Outbound messages arrive on a second bounded channel and
//! are written by a dedicated task, so neither side ever blocks the other
//! beyond the channel bounds.

mod config;
mod error;
mod events;
mod framing;
mod merkle;
mod session;

pub use config::SessionConfig;
pub use error::SessionError;
pub use events::{ManagerRequest, RemoteHost};
pub use framing::Framer;
pub use merkle::{extract_matches, DecodedMerkleBlock, MerkleError};
pub use session::PeerSession;
