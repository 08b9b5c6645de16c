use std::fmt::{self, Debug, Formatter};
use std::net::{IpAddr, Ipv4Addr};

use rand::{rngs::OsRng, RngCore};

use crate::{double_sha256, Hash, PROTOCOL_VERSION};

/// Decoded 24-byte message header.
///
/// The magic has already been checked against the configured network by the
/// time this struct exists, so only the command, payload length and checksum
/// are carried forward.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageHeader {
    /// Command name with the zero padding stripped.
    pub command: String,
    /// Payload byte count.
    pub length: u32,
    /// First four bytes of the double-SHA-256 of the payload.
    pub checksum: [u8; 4],
}

/// Service flags advertised in `version` messages.
///
/// A `u64` bitfield; unknown bits are preserved.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Services(u64);

impl Services {
    pub const fn new(bits: u64) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u64 {
        self.0
    }

    pub const fn contains(self, other: Services) -> bool {
        (self.0 & other.0) == other.0
    }

    /// Not a full node; may only relay transactions it originates.
    pub const NONE: Services = Services(0x00);
    /// Full node, can serve full blocks.
    pub const NODE_NETWORK: Services = Services(0x01);
    /// Accepts bloom-filtered connections (BIP111).
    pub const NODE_BLOOM: Services = Services(0x04);
    /// Serves witness data (BIP144).
    pub const NODE_WITNESS: Services = Services(0x08);
    /// Full node limited to the last 288 blocks (BIP159).
    pub const NODE_NETWORK_LIMITED: Services = Services(0x0400);
}

impl From<u64> for Services {
    fn from(bits: u64) -> Self {
        Services::new(bits)
    }
}

impl Debug for Services {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut names = Vec::new();
        if self.contains(Self::NODE_NETWORK) {
            names.push("NODE_NETWORK");
        }
        if self.contains(Self::NODE_BLOOM) {
            names.push("NODE_BLOOM");
        }
        if self.contains(Self::NODE_WITNESS) {
            names.push("NODE_WITNESS");
        }
        if self.contains(Self::NODE_NETWORK_LIMITED) {
            names.push("NODE_NETWORK_LIMITED");
        }
        if names.is_empty() {
            names.push("NONE");
        }
        write!(f, "Services({}) [0x{:016x}]", names.join(" | "), self.0)
    }
}

/// Network address record inside `version` payloads.
///
/// On the wire: services (u64 LE), 16-byte IP with IPv4 in the standard
/// `::ffff:a.b.c.d` mapping, port in big-endian.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NetAddr {
    pub services: Services,
    pub ip: IpAddr,
    pub port: u16,
}

impl NetAddr {
    /// The all-zero address peers send when they do not know (or care about)
    /// an endpoint.
    pub fn unspecified() -> Self {
        Self {
            services: Services::NONE,
            ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 0,
        }
    }
}

/// `version` payload establishing protocol compatibility.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VersionMessage {
    pub version: i32,
    pub services: Services,
    pub timestamp: i64,
    pub addr_recv: NetAddr,
    pub addr_from: NetAddr,
    pub nonce: u64,
    pub user_agent: String,
    pub start_height: i32,
    /// BIP37 relay flag; `None` when the peer omitted the trailing byte.
    pub relay: Option<bool>,
}

impl VersionMessage {
    /// Version message advertising this implementation, with a fresh nonce
    /// and the current time.  Embedders push this on the outbound channel to
    /// open the handshake.
    pub fn local(user_agent: impl Into<String>, start_height: i32) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            services: Services::NONE,
            timestamp: chrono::Utc::now().timestamp(),
            addr_recv: NetAddr::unspecified(),
            addr_from: NetAddr::unspecified(),
            nonce: OsRng.next_u64(),
            user_agent: user_agent.into(),
            start_height,
            // false keeps the peer from flooding us before a filter is loaded
            relay: Some(false),
        }
    }
}

/// 80-byte block header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockHeader {
    pub version: i32,
    pub prev_blockhash: Hash,
    pub merkle_root: Hash,
    pub time: u32,
    pub bits: u32,
    pub nonce: u32,
}

impl BlockHeader {
    /// Block id: double SHA-256 of the serialized 80 bytes.
    pub fn hash(&self) -> Hash {
        let mut bytes = Vec::with_capacity(80);
        bytes.extend_from_slice(&self.version.to_le_bytes());
        bytes.extend_from_slice(&self.prev_blockhash);
        bytes.extend_from_slice(&self.merkle_root);
        bytes.extend_from_slice(&self.time.to_le_bytes());
        bytes.extend_from_slice(&self.bits.to_le_bytes());
        bytes.extend_from_slice(&self.nonce.to_le_bytes());
        double_sha256(&bytes)
    }
}

/// An undecoded transaction as carried by a `tx` message.
///
/// The session never interprets transaction internals; it only needs the
/// serialized bytes and their txid to correlate merkle-block bundles.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawTx(pub Vec<u8>);

impl RawTx {
    /// Double SHA-256 of the serialized bytes.  Matches the txid for the
    /// non-witness serialization a bloom-filtering peer sends.
    pub fn txid(&self) -> Hash {
        double_sha256(&self.0)
    }
}

/// Inventory object kinds used in `inv` and `getdata`.
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InvKind {
    Error = 0,
    Tx = 1,
    Block = 2,
    /// Bloom-filtered block (BIP37); answered with `merkleblock`.
    FilteredBlock = 3,
    CompactBlock = 4,
    WitnessTx = 0x4000_0001,
    WitnessBlock = 0x4000_0002,
    WitnessFilteredBlock = 0x4000_0003,
}

impl InvKind {
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(InvKind::Error),
            1 => Some(InvKind::Tx),
            2 => Some(InvKind::Block),
            3 => Some(InvKind::FilteredBlock),
            4 => Some(InvKind::CompactBlock),
            0x4000_0001 => Some(InvKind::WitnessTx),
            0x4000_0002 => Some(InvKind::WitnessBlock),
            0x4000_0003 => Some(InvKind::WitnessFilteredBlock),
            _ => None,
        }
    }
}

/// One `inv`/`getdata` entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Inventory {
    pub kind: InvKind,
    pub hash: Hash,
}

impl Inventory {
    pub fn filtered_block(hash: Hash) -> Self {
        Self {
            kind: InvKind::FilteredBlock,
            hash,
        }
    }

    pub fn tx(hash: Hash) -> Self {
        Self {
            kind: InvKind::Tx,
            hash,
        }
    }
}

/// `merkleblock` payload: a header plus the partial merkle tree proving
/// which filtered transactions the block contains (BIP37).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MerkleBlockMessage {
    pub header: BlockHeader,
    /// Number of transactions in the full block.
    pub total_tx: u32,
    /// Hashes consumed by the pre-order traversal of the partial tree.
    pub hashes: Vec<Hash>,
    /// Traversal flag bits, LSB-first within each byte.
    pub flags: Vec<u8>,
}

/// `filterload` payload (BIP37).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FilterLoadMessage {
    pub filter: Vec<u8>,
    pub hash_funcs: u32,
    pub tweak: u32,
    pub flags: u8,
}

impl FilterLoadMessage {
    /// BIP37 ceiling on the filter bit field.
    pub const MAX_FILTER_BYTES: usize = 36_000;
    /// BIP37 ceiling on the number of hash functions.
    pub const MAX_HASH_FUNCS: u32 = 50;
}

/// `getheaders` payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GetHeadersMessage {
    pub version: i32,
    /// Block locator, newest first.
    pub locator: Vec<Hash>,
    /// All-zero means "as many as fit".
    pub stop: Hash,
}

impl GetHeadersMessage {
    pub fn new(locator: Vec<Hash>) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            locator,
            stop: [0u8; 32],
        }
    }
}

/// BIP61 reject codes.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RejectCode {
    Malformed = 0x01,
    Invalid = 0x10,
    Obsolete = 0x11,
    Duplicate = 0x12,
    NonStandard = 0x40,
    Dust = 0x41,
    InsufficientFee = 0x42,
    Checkpoint = 0x43,
}

impl RejectCode {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(RejectCode::Malformed),
            0x10 => Some(RejectCode::Invalid),
            0x11 => Some(RejectCode::Obsolete),
            0x12 => Some(RejectCode::Duplicate),
            0x40 => Some(RejectCode::NonStandard),
            0x41 => Some(RejectCode::Dust),
            0x42 => Some(RejectCode::InsufficientFee),
            0x43 => Some(RejectCode::Checkpoint),
            _ => None,
        }
    }
}

/// `reject` payload (BIP61).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RejectMessage {
    /// Command the rejection refers to.
    pub command: String,
    pub code: RejectCode,
    pub reason: String,
    /// Optional extra data, e.g. the hash of a rejected tx or block.
    pub data: Vec<u8>,
}

impl RejectMessage {
    pub fn new(command: impl Into<String>, code: RejectCode, reason: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            code,
            reason: reason.into(),
            data: Vec::new(),
        }
    }
}

/// A decoded Bitcoin P2P message.
///
/// Known commands decode into typed variants; any other printable command
/// survives as [`Message::Other`] and is passed through untouched.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Message {
    Version(VersionMessage),
    VerAck,
    Ping(u64),
    Pong(u64),
    Inv(Vec<Inventory>),
    GetData(Vec<Inventory>),
    GetHeaders(GetHeadersMessage),
    Headers(Vec<BlockHeader>),
    Tx(RawTx),
    MerkleBlock(MerkleBlockMessage),
    FilterLoad(FilterLoadMessage),
    FilterClear,
    Reject(RejectMessage),
    Other { command: String, payload: Vec<u8> },
}

impl Message {
    /// Canonical command name as it appears in the message header.
    pub fn command(&self) -> &str {
        match self {
            Message::Version(_) => "version",
            Message::VerAck => "verack",
            Message::Ping(_) => "ping",
            Message::Pong(_) => "pong",
            Message::Inv(_) => "inv",
            Message::GetData(_) => "getdata",
            Message::GetHeaders(_) => "getheaders",
            Message::Headers(_) => "headers",
            Message::Tx(_) => "tx",
            Message::MerkleBlock(_) => "merkleblock",
            Message::FilterLoad(_) => "filterload",
            Message::FilterClear => "filterclear",
            Message::Reject(_) => "reject",
            Message::Other { command, .. } => command,
        }
    }
}
