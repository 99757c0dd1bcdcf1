//! Shared test helpers for E2E and integration tests.

use std::sync::Arc;

use ebb_chain::{ChainConfig, ChainEngine};
use ebb_core::constants::BLOCK_SUBSIDY;
use ebb_core::traits::{AcceptAll, UniformWeight};
use ebb_core::types::*;

/// Simple output commitment from a seed byte.
pub fn commit(seed: u8) -> Hash256 {
    Hash256([seed; 32])
}

/// Create a coinbase transaction made unique by height and branch tag.
///
/// Both markers go into the witness so parallel branches at the same
/// height never produce colliding txids.
pub fn make_coinbase(height: u64, tag: u8) -> Transaction {
    let mut witness = height.to_le_bytes().to_vec();
    witness.push(tag);
    Transaction {
        version: 1,
        inputs: vec![TxInput {
            previous_output: OutPoint::null(),
            witness,
        }],
        outputs: vec![TxOutput {
            value: BLOCK_SUBSIDY,
            commitment: commit(tag),
        }],
        lock_time: height,
    }
}

/// Create a simple spending transaction consuming the given outpoints.
pub fn make_spend(outpoints: &[OutPoint]) -> Transaction {
    Transaction {
        version: 1,
        inputs: outpoints
            .iter()
            .map(|op| TxInput {
                previous_output: *op,
                witness: vec![0; 64],
            })
            .collect(),
        outputs: vec![TxOutput {
            value: 1,
            commitment: commit(0xFE),
        }],
        lock_time: 0,
    }
}

/// Create a block with a correct transaction commitment.
pub fn make_block(prev_hash: Hash256, txs: Vec<Transaction>) -> Block {
    let txids: Vec<Hash256> = txs.iter().map(|tx| tx.txid().unwrap()).collect();
    Block {
        header: BlockHeader {
            version: 1,
            prev_hash,
            tx_commitment: tx_commitment(&txids),
            timestamp: 1_772_323_200,
            nonce: 0,
        },
        transactions: txs,
    }
}

/// First outpoint of a transaction.
pub fn outpoint_of(tx: &Transaction) -> OutPoint {
    OutPoint {
        txid: tx.txid().unwrap(),
        index: 0,
    }
}

/// Engine with a deterministic never-bypass decider, accepting validator,
/// and uniform block weights.
pub fn test_engine(config: ChainConfig) -> ChainEngine {
    ChainEngine::new(config, Arc::new(AcceptAll), Arc::new(UniformWeight))
        .unwrap()
        .with_bypass_decider(|_| false)
}

/// Extend the chain with `n` coinbase-only blocks from `prev`.
///
/// Returns one `(block_hash, coinbase_outpoint)` pair per block, in
/// chain order.
pub fn grow(
    engine: &mut ChainEngine,
    prev: Hash256,
    start_height: u64,
    n: u64,
    tag: u8,
) -> Vec<(Hash256, OutPoint)> {
    let mut out = Vec::with_capacity(n as usize);
    let mut prev = prev;
    for i in 0..n {
        let cb = make_coinbase(start_height + i, tag);
        let op = outpoint_of(&cb);
        let block = make_block(prev, vec![cb]);
        prev = block.header.hash();
        engine.submit_block(block).unwrap();
        out.push((prev, op));
    }
    out
}
