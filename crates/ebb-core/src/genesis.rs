//! Genesis block definition.
//!
//! The genesis block is the root of the block tree (height 0): a single
//! coinbase paying the anchor commitment. All values are hardcoded and
//! deterministic so every instance computes the identical block, which is
//! what guarantees the tree has exactly one root.

use std::sync::LazyLock;

use crate::constants::BLOCK_SUBSIDY;
use crate::types::{tx_commitment, Block, BlockHeader, Hash256, OutPoint, Transaction, TxInput, TxOutput};

/// Genesis block timestamp: March 1, 2026 00:00:00 UTC.
pub const GENESIS_TIMESTAMP: u64 = 1_772_323_200;

/// Message embedded in the genesis coinbase witness.
pub const GENESIS_MESSAGE: &[u8] = b"Still water remembers every tide. Ebb genesis 2026.";

/// Cached genesis data, computed once on first access.
struct GenesisData {
    block: Block,
    hash: Hash256,
    coinbase_txid: Hash256,
}

static GENESIS: LazyLock<GenesisData> = LazyLock::new(build_genesis);

fn build_genesis() -> GenesisData {
    let coinbase = build_genesis_coinbase();
    // Hardcoded coinbase — serialization cannot fail.
    let coinbase_txid = coinbase
        .txid()
        .expect("genesis coinbase is hardcoded valid data");

    let block = Block {
        header: BlockHeader {
            version: 1,
            prev_hash: Hash256::ZERO,
            tx_commitment: tx_commitment(&[coinbase_txid]),
            timestamp: GENESIS_TIMESTAMP,
            nonce: 0,
        },
        transactions: vec![coinbase],
    };
    let hash = block.header.hash();

    GenesisData {
        block,
        hash,
        coinbase_txid,
    }
}

fn build_genesis_coinbase() -> Transaction {
    Transaction {
        version: 1,
        inputs: vec![TxInput {
            previous_output: OutPoint::null(),
            witness: GENESIS_MESSAGE.to_vec(),
        }],
        outputs: vec![TxOutput {
            value: BLOCK_SUBSIDY,
            commitment: anchor_commitment(),
        }],
        lock_time: 0,
    }
}

/// The commitment owning the genesis output.
///
/// Derived deterministically as `BLAKE3(b"ebb genesis anchor")` for
/// transparency; a deployment would replace it with a real key commitment.
pub fn anchor_commitment() -> Hash256 {
    Hash256(blake3::hash(b"ebb genesis anchor").into())
}

/// The genesis block (height 0).
pub fn genesis_block() -> &'static Block {
    &GENESIS.block
}

/// The genesis block header hash.
pub fn genesis_hash() -> Hash256 {
    GENESIS.hash
}

/// The transaction ID of the genesis coinbase.
pub fn genesis_coinbase_txid() -> Hash256 {
    GENESIS.coinbase_txid
}

/// Check whether a block is the genesis block by comparing header hashes.
pub fn is_genesis(block: &Block) -> bool {
    block.header.hash() == GENESIS.hash
}

#[cfg(test)]
mod tests {
    use super::*;

    // --- Constants ---

    #[test]
    fn genesis_timestamp_is_mar_1_2026() {
        // 20513 days since the epoch * 86400 sec/day
        assert_eq!(GENESIS_TIMESTAMP, 20513 * 86400);
    }

    #[test]
    fn genesis_message_not_empty() {
        assert!(!GENESIS_MESSAGE.is_empty());
        assert!(GENESIS_MESSAGE.starts_with(b"Still"));
    }

    // --- Block structure ---

    #[test]
    fn genesis_block_deterministic() {
        let a = genesis_block();
        let b = genesis_block();
        assert_eq!(a, b);
    }

    #[test]
    fn genesis_block_has_one_transaction() {
        assert_eq!(genesis_block().transactions.len(), 1);
    }

    #[test]
    fn genesis_coinbase_is_coinbase() {
        let coinbase = genesis_block().coinbase().unwrap();
        assert!(coinbase.is_coinbase());
    }

    #[test]
    fn genesis_coinbase_has_message() {
        let coinbase = &genesis_block().transactions[0];
        assert_eq!(coinbase.inputs[0].witness, GENESIS_MESSAGE);
    }

    #[test]
    fn genesis_coinbase_pays_anchor() {
        let coinbase = &genesis_block().transactions[0];
        assert_eq!(coinbase.outputs.len(), 1);
        assert_eq!(coinbase.outputs[0].value, BLOCK_SUBSIDY);
        assert_eq!(coinbase.outputs[0].commitment, anchor_commitment());
    }

    // --- Header ---

    #[test]
    fn genesis_header_prev_hash_zero() {
        assert!(genesis_block().header.prev_hash.is_zero());
    }

    #[test]
    fn genesis_header_commitment_matches_coinbase() {
        let txid = genesis_block().transactions[0].txid().unwrap();
        assert_eq!(genesis_block().header.tx_commitment, tx_commitment(&[txid]));
    }

    // --- Hash ---

    #[test]
    fn genesis_hash_deterministic() {
        assert_eq!(genesis_hash(), genesis_hash());
    }

    #[test]
    fn genesis_hash_nonzero() {
        assert!(!genesis_hash().is_zero());
    }

    #[test]
    fn genesis_hash_matches_header() {
        assert_eq!(genesis_hash(), genesis_block().header.hash());
    }

    // --- Txid ---

    #[test]
    fn genesis_coinbase_txid_matches_computation() {
        let txid = genesis_block().transactions[0].txid().unwrap();
        assert_eq!(genesis_coinbase_txid(), txid);
    }

    // --- is_genesis ---

    #[test]
    fn is_genesis_true_for_genesis() {
        assert!(is_genesis(genesis_block()));
    }

    #[test]
    fn is_genesis_false_for_modified_genesis() {
        let mut modified = genesis_block().clone();
        modified.header.nonce = 999;
        assert!(!is_genesis(&modified));
    }

    // --- Anchor ---

    #[test]
    fn anchor_commitment_deterministic() {
        assert_eq!(anchor_commitment(), anchor_commitment());
        assert!(!anchor_commitment().is_zero());
    }
}
