//! Double-spend screening against a branch-relative view.
//!
//! A candidate block extends some parent, and the parent pins a branch: the
//! blocks strictly between the common ancestor of parent and active tip, and
//! the parent itself. Each input is screened against three layers, nearest
//! first:
//!
//! 1. the block under validation (earlier transactions in it),
//! 2. the branch blocks,
//! 3. the active chain, read through the spend-status cache.
//!
//! The active-chain layer is judged relative to the branch point. A spend
//! that happened on the active chain strictly after the common ancestor
//! never happened as far as this branch is concerned, so the same output
//! may be spent once per fork. Conversely, an output the active chain
//! created after the ancestor does not exist on the branch at all.
//!
//! Every conflict is a rejection; [`SpendConflict`] only varies the
//! diagnostic. A block that extends the active tip is the degenerate case
//! with an empty branch and the ancestor at the tip itself.

use std::collections::HashSet;

use ebb_core::error::CoreError;
use ebb_core::types::{Block, Hash256, OutPoint, Transaction};
use ebb_core::utxo::{SpendStatus, UtxoSet};

use crate::error::{DoubleSpend, SpendConflict};
use crate::spend_cache::SpendStatusCache;

/// Spends and creations visible from a candidate block's position.
///
/// Built once per candidate: seed with the ancestor height, feed the branch
/// blocks through [`record_branch_block`](Self::record_branch_block), then
/// alternate [`validate_inputs`](Self::validate_inputs) and
/// [`record_transaction`](Self::record_transaction) over the block's
/// transactions in order.
#[derive(Debug)]
pub struct BranchView {
    /// Height of the common ancestor of the block's parent and the active
    /// tip. Active-chain facts at or below this height bind the branch.
    ancestor_height: u64,
    branch_spent: HashSet<OutPoint>,
    branch_created: HashSet<OutPoint>,
    block_spent: HashSet<OutPoint>,
    block_created: HashSet<OutPoint>,
}

impl BranchView {
    /// View with an empty branch, anchored at `ancestor_height`.
    pub fn new(ancestor_height: u64) -> Self {
        Self {
            ancestor_height,
            branch_spent: HashSet::new(),
            branch_created: HashSet::new(),
            block_spent: HashSet::new(),
            block_created: HashSet::new(),
        }
    }

    /// Fold a branch block's spends and creations into the view.
    pub fn record_branch_block(&mut self, block: &Block) -> Result<(), CoreError> {
        for tx in &block.transactions {
            let txid = tx.txid()?;
            if !tx.is_coinbase() {
                for input in &tx.inputs {
                    self.branch_spent.insert(input.previous_output);
                }
            }
            for index in 0..tx.outputs.len() as u32 {
                self.branch_created.insert(OutPoint { txid, index });
            }
        }
        Ok(())
    }

    /// Fold a validated transaction of the candidate block into the view.
    ///
    /// Coinbase transactions are recorded too; later transactions may spend
    /// their outputs subject to maturity at connect time.
    pub fn record_transaction(&mut self, txid: Hash256, tx: &Transaction) {
        if !tx.is_coinbase() {
            for input in &tx.inputs {
                self.block_spent.insert(input.previous_output);
            }
        }
        for index in 0..tx.outputs.len() as u32 {
            self.block_created.insert(OutPoint { txid, index });
        }
    }

    /// Height the view is anchored at.
    pub fn ancestor_height(&self) -> u64 {
        self.ancestor_height
    }

    /// Screen a transaction's inputs for conflicting spends.
    ///
    /// Coinbase transactions have no real inputs and pass unconditionally.
    /// For everything else each input must resolve to an output that is
    /// reachable from this branch and not yet consumed by it, the candidate
    /// block, or the pre-ancestor active chain. `bypass` is sampled once per
    /// cache lookup.
    ///
    /// Returns the first conflicting input, classified.
    pub fn validate_inputs(
        &self,
        txid: Hash256,
        tx: &Transaction,
        cache: &SpendStatusCache,
        utxo: &UtxoSet,
        mut bypass: impl FnMut() -> bool,
    ) -> Result<(), DoubleSpend> {
        if tx.is_coinbase() {
            return Ok(());
        }
        let mut seen: HashSet<OutPoint> = HashSet::with_capacity(tx.inputs.len());
        for input in &tx.inputs {
            let op = input.previous_output;
            if !seen.insert(op) || self.block_spent.contains(&op) {
                return Err(DoubleSpend { outpoint: op, txid, conflict: SpendConflict::SameBlock });
            }
            if self.block_created.contains(&op) {
                continue;
            }
            if self.branch_spent.contains(&op) {
                return Err(DoubleSpend { outpoint: op, txid, conflict: SpendConflict::WithinBranch });
            }
            if self.branch_created.contains(&op) {
                continue;
            }
            let available = match cache.query(&op, bypass(), utxo) {
                SpendStatus::Unspent { created_height } => created_height <= self.ancestor_height,
                // Spent after the ancestor is another fork's business; the
                // output must still predate the ancestor to exist here.
                SpendStatus::Spent { spent_height, created_height } => {
                    spent_height > self.ancestor_height && created_height <= self.ancestor_height
                }
                SpendStatus::Unknown => false,
            };
            if !available {
                return Err(DoubleSpend {
                    outpoint: op,
                    txid,
                    conflict: SpendConflict::BeforeBranchPoint,
                });
            }
        }
        Ok(())
    }
}
