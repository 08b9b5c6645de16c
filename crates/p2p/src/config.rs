use wire::Network;

/// Runtime configuration for a peer session.
///
/// Channel capacities are not part of this: the embedder creates both bounded
/// channels and hands the session its ends.
#[derive(Clone, Copy, Debug)]
pub struct SessionConfig {
    /// Network whose magic frames every message.
    pub network: Network,
    /// Hard cap on payload length accepted from the wire, checked before any
    /// payload allocation.
    pub max_payload_bytes: usize,
    /// Socket read buffer size.
    pub read_chunk_bytes: usize,
}

impl SessionConfig {
    pub fn new(network: Network) -> Self {
        Self {
            network,
            max_payload_bytes: wire::MAX_PAYLOAD_BYTES,
            read_chunk_bytes: 8 * 1024,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new(Network::Mainnet)
    }
}
