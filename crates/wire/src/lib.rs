//! Bitcoin P2P wire protocol types and codec.
//!
//! Every message on the wire is a 24-byte header (network magic, zero-padded
//! ASCII command, payload length, double-SHA-256 checksum) followed by the
//! payload.  Integers are little-endian and variable-length fields carry a
//! CompactSize prefix.  This crate is pure serialization so that framing and
//! session logic can stay in one place in the `p2p` crate.
//!
//! Protocol reference:
//! https://developer.bitcoin.org/reference/p2p_networking.html

mod decode;
mod encode;
mod error;
mod message;

pub use decode::{decode_header, decode_payload};
pub use encode::encode_message;
pub use error::WireError;
pub use message::{
    BlockHeader, FilterLoadMessage, GetHeadersMessage, InvKind, Inventory, MerkleBlockMessage,
    Message, MessageHeader, NetAddr, RawTx, RejectCode, RejectMessage, Services, VersionMessage,
};

use sha2::{Digest, Sha256};

/// 32-byte hash as used for txids, block hashes and merkle nodes.
///
/// Stored in wire byte order (little-endian); reverse before displaying the
/// way block explorers do.
pub type Hash = [u8; 32];

/// Size of the fixed message header preceding every payload.
pub const HEADER_LEN: usize = 24;

/// Default ceiling on payload length accepted from the wire.
pub const MAX_PAYLOAD_BYTES: usize = 32 * 1024 * 1024;

/// Protocol version this implementation advertises.
pub const PROTOCOL_VERSION: i32 = 70016;

/// Oldest peer protocol version a session will talk to (BIP31 pings and the
/// version/verack handshake semantics this crate relies on).
pub const MIN_PROTOCOL_VERSION: i32 = 60001;

/// Bitcoin network selector.
///
/// The 4-byte magic prefixes every frame and doubles as a stream boundary
/// marker; the codec rejects frames whose magic differs from the configured
/// network.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Network {
    Mainnet,
    Testnet,
    Regtest,
    Signet,
}

impl Network {
    /// Magic bytes as they appear on the wire.
    pub const fn magic(self) -> [u8; 4] {
        match self {
            Network::Mainnet => [0xF9, 0xBE, 0xB4, 0xD9],
            Network::Testnet => [0x0B, 0x11, 0x09, 0x07],
            Network::Regtest => [0xFA, 0xBF, 0xB5, 0xDA],
            Network::Signet => [0x0A, 0x03, 0xCF, 0x40],
        }
    }
}

/// Double SHA-256, the hash construction Bitcoin uses for checksums, txids,
/// block ids and merkle tree nodes.
pub fn double_sha256(bytes: &[u8]) -> Hash {
    let digest = Sha256::digest(Sha256::digest(bytes));
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}
