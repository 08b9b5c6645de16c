use thiserror::Error;

use wire::{double_sha256, Hash, MerkleBlockMessage, RawTx};

/// Structural failures while unpacking a partial merkle tree.
///
/// Any of these means the peer sent a proof that cannot have been produced by
/// an honest node; the connection is torn down.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MerkleError {
    #[error("block claims zero transactions")]
    NoTransactions,
    #[error("more hashes than transactions in the block")]
    TooManyHashes,
    #[error("flag bits exhausted before the traversal completed")]
    MissingFlags,
    #[error("hash list exhausted before the traversal completed")]
    MissingHashes,
    #[error("hashes left over after the traversal")]
    UnusedHashes,
    #[error("flag bytes left over after the traversal")]
    UnusedFlags,
    #[error("non-zero padding bits after the traversal")]
    DirtyPadding,
}

/// A merkle block whose proof has been unpacked, plus the transactions
/// collected for it so far.
///
/// Lives in the session's single in-flight slot between the `merkleblock`
/// message and the flush that hands it to the manager.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodedMerkleBlock {
    /// The message as it came off the wire.
    pub block: MerkleBlockMessage,
    /// Root computed from the partial tree.  The session does not compare it
    /// against the header; chain validation is the manager's business.
    pub merkle_root: Hash,
    /// Txids whose flag marked them as filter matches, in proof order.  The
    /// peer sends each as a separate `tx` message right after the block.
    pub expected_txs: Vec<Hash>,
    /// Transactions collected so far.  After the flush reorders them, this
    /// matches `expected_txs` with never-received entries dropped.
    pub txs: Vec<RawTx>,
}

impl DecodedMerkleBlock {
    pub fn from_message(block: MerkleBlockMessage) -> Result<Self, MerkleError> {
        let (merkle_root, expected_txs) = extract_matches(&block)?;
        Ok(Self {
            block,
            merkle_root,
            expected_txs,
            txs: Vec::new(),
        })
    }

    pub fn expects(&self, txid: &Hash) -> bool {
        self.expected_txs.contains(txid)
    }

    /// Reorders the collected transactions into proof order, dropping
    /// expected hashes that never arrived.
    pub(crate) fn finalize(&mut self) {
        let mut ordered = Vec::with_capacity(self.txs.len());
        for hash in &self.expected_txs {
            if let Some(pos) = self.txs.iter().position(|tx| tx.txid() == *hash) {
                ordered.push(self.txs.swap_remove(pos));
            }
        }
        self.txs = ordered;
    }
}

/// Reconstructs the partial merkle tree of a `merkleblock` (BIP37).
///
/// The flag bit vector describes a pre-order traversal: a zero flag prunes
/// the subtree and consumes one hash for it, a one flag descends (or, at a
/// leaf, consumes one matched txid).  A level with an odd node count hashes
/// its last node with itself.  Returns the computed root and the matched
/// txids in traversal order.
pub fn extract_matches(block: &MerkleBlockMessage) -> Result<(Hash, Vec<Hash>), MerkleError> {
    let total = block.total_tx as usize;
    if total == 0 {
        return Err(MerkleError::NoTransactions);
    }
    if block.hashes.len() > total {
        return Err(MerkleError::TooManyHashes);
    }
    if block.flags.len() * 8 < block.hashes.len() {
        return Err(MerkleError::MissingFlags);
    }

    let mut walker = TreeWalker {
        total,
        hashes: &block.hashes,
        flags: &block.flags,
        bits_used: 0,
        hashes_used: 0,
        matched: Vec::new(),
    };

    // depth of the tree over `total` leaves
    let mut height = 0;
    while walker.width(height) > 1 {
        height += 1;
    }
    let root = walker.descend(height, 0)?;

    if walker.hashes_used != block.hashes.len() {
        return Err(MerkleError::UnusedHashes);
    }
    if (walker.bits_used + 7) / 8 != block.flags.len() {
        return Err(MerkleError::UnusedFlags);
    }
    for bit in walker.bits_used..block.flags.len() * 8 {
        if block.flags[bit / 8] & (1 << (bit % 8)) != 0 {
            return Err(MerkleError::DirtyPadding);
        }
    }

    Ok((root, walker.matched))
}

struct TreeWalker<'a> {
    total: usize,
    hashes: &'a [Hash],
    flags: &'a [u8],
    bits_used: usize,
    hashes_used: usize,
    matched: Vec<Hash>,
}

impl TreeWalker<'_> {
    /// Node count at the given height; leaves are height zero.
    fn width(&self, height: u32) -> usize {
        (self.total + (1 << height) - 1) >> height
    }

    fn next_flag(&mut self) -> Result<bool, MerkleError> {
        if self.bits_used >= self.flags.len() * 8 {
            return Err(MerkleError::MissingFlags);
        }
        let bit = self.flags[self.bits_used / 8] & (1 << (self.bits_used % 8)) != 0;
        self.bits_used += 1;
        Ok(bit)
    }

    fn next_hash(&mut self) -> Result<Hash, MerkleError> {
        let hash = self
            .hashes
            .get(self.hashes_used)
            .copied()
            .ok_or(MerkleError::MissingHashes)?;
        self.hashes_used += 1;
        Ok(hash)
    }

    fn descend(&mut self, height: u32, pos: usize) -> Result<Hash, MerkleError> {
        let flag = self.next_flag()?;
        if !flag {
            // pruned: the next hash stands in for this whole subtree
            return self.next_hash();
        }
        if height == 0 {
            let hash = self.next_hash()?;
            self.matched.push(hash);
            return Ok(hash);
        }
        let left = self.descend(height - 1, pos * 2)?;
        let right = if pos * 2 + 1 < self.width(height - 1) {
            self.descend(height - 1, pos * 2 + 1)?
        } else {
            left
        };
        Ok(combine(&left, &right))
    }
}

fn combine(left: &Hash, right: &Hash) -> Hash {
    let mut concat = [0u8; 64];
    concat[..32].copy_from_slice(left);
    concat[32..].copy_from_slice(right);
    double_sha256(&concat)
}
