//! The authoritative unspent-output set for the active chain.
//!
//! [`UtxoSet::apply`] and [`UtxoSet::undo`] are exact inverses: apply stages
//! a whole block's effects and commits them only if every input resolves, so
//! a failed apply leaves the set untouched. Undo restores the recorded
//! entries byte for byte. Every successful apply or undo bumps a generation
//! counter that the spend-status cache uses for staleness detection.
//!
//! Alongside the live set, the spend history of the active chain is kept as
//! [`SpentMark`]s so that a rejected double-spend can be classified against
//! a branch point. The marks are authoritative state and are rolled back by
//! undo exactly in step with the set itself. Output keys are single-use: a
//! block that recreates an already-seen outpoint, live or spent, fails to
//! apply.

use std::collections::{HashMap, HashSet};

use crate::error::{CoreError, UtxoError};
use crate::types::{Block, Hash256, OutPoint, Transaction, UtxoEntry};

/// Spend status of an outpoint relative to the active chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpendStatus {
    /// Present in the set, spendable.
    Unspent { created_height: u64 },
    /// Was in the set, consumed by a connected block.
    Spent { spent_height: u64, created_height: u64 },
    /// Never seen on the active chain.
    Unknown,
}

impl SpendStatus {
    /// Whether the outpoint has a recorded spend on the active chain.
    pub fn is_spent(&self) -> bool {
        matches!(self, Self::Spent { .. })
    }

    /// Whether the outpoint is currently spendable.
    pub fn is_unspent(&self) -> bool {
        matches!(self, Self::Unspent { .. })
    }
}

/// Where and when an outpoint was consumed on the active chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SpentMark {
    /// Height of the block whose transaction spent the outpoint.
    pub spent_height: u64,
    /// Height of the block that had created it.
    pub created_height: u64,
}

/// Undo data for reverting a connected block.
///
/// Records the entries the block consumed (in spend order) and the outpoints
/// it added, so a disconnect can restore the set loss-free. Outputs created
/// and spent within the same block never touch the set and appear in
/// neither list.
#[derive(Clone, Debug, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub struct BlockUndo {
    /// Hash of the block this undo belongs to.
    pub block_hash: Hash256,
    /// Height the block was connected at.
    pub height: u64,
    /// Entries removed from the set, in the order they were consumed.
    pub spent: Vec<(OutPoint, UtxoEntry)>,
    /// Outpoints inserted into the set.
    pub created: Vec<OutPoint>,
}

impl BlockUndo {
    /// All outpoints whose spend status changed when the block connected.
    pub fn touched_outpoints(&self) -> impl Iterator<Item = &OutPoint> {
        self.spent.iter().map(|(op, _)| op).chain(self.created.iter())
    }
}

/// In-memory UTXO set with generation tracking and spend history.
pub struct UtxoSet {
    /// Live set: outpoint → entry.
    utxos: HashMap<OutPoint, UtxoEntry>,
    /// Spend history of the active chain.
    spent: HashMap<OutPoint, SpentMark>,
    /// Bumped on every successful apply or undo.
    generation: u64,
    /// Confirmations required before a coinbase output may be spent.
    /// Zero disables the rule.
    maturity: u64,
}

impl UtxoSet {
    /// Create an empty set enforcing the given coinbase maturity.
    pub fn new(maturity: u64) -> Self {
        Self {
            utxos: HashMap::new(),
            spent: HashMap::new(),
            generation: 0,
            maturity,
        }
    }

    /// Apply a block's transactions at `height`.
    ///
    /// Stages every spend and creation first and commits only when the whole
    /// block resolves, so partial effects are never observable. Returns the
    /// undo record needed to revert the block.
    ///
    /// # Errors
    ///
    /// - [`UtxoError::MissingOrAlreadySpent`] if any input's outpoint is not
    ///   spendable at this point of the block
    /// - [`UtxoError::ImmatureCoinbaseSpend`] if a coinbase output is spent
    ///   before maturing
    /// - [`UtxoError::DuplicateOutpoint`] if an output reuses the key of a
    ///   live or previously spent entry
    pub fn apply(&mut self, block: &Block, height: u64) -> Result<BlockUndo, CoreError> {
        let block_hash = block.header.hash();

        let mut staged_spent: Vec<(OutPoint, UtxoEntry)> = Vec::new();
        let mut staged_spent_keys: HashSet<OutPoint> = HashSet::new();
        let mut staged_new: HashMap<OutPoint, UtxoEntry> = HashMap::new();
        let mut staged_order: Vec<OutPoint> = Vec::new();

        for tx in &block.transactions {
            self.stage_spends(
                tx,
                height,
                &mut staged_spent,
                &mut staged_spent_keys,
                &mut staged_new,
            )?;
            self.stage_creations(tx, block_hash, height, &mut staged_new, &mut staged_order)?;
        }

        // Whole block resolved; commit.
        self.generation += 1;
        for (op, entry) in &staged_spent {
            self.utxos.remove(op);
            self.spent.insert(
                *op,
                SpentMark {
                    spent_height: height,
                    created_height: entry.height,
                },
            );
        }
        let mut created = Vec::with_capacity(staged_order.len());
        for op in staged_order {
            if let Some(entry) = staged_new.remove(&op) {
                self.utxos.insert(op, entry);
                created.push(op);
            }
        }

        Ok(BlockUndo {
            block_hash,
            height,
            spent: staged_spent,
            created,
        })
    }

    /// Revert a block previously applied with [`apply`](Self::apply).
    ///
    /// Checks the whole undo record against the current contents before
    /// mutating anything, so a mismatch (which indicates corruption or
    /// out-of-order disconnects) leaves the set untouched.
    pub fn undo(&mut self, undo: &BlockUndo) -> Result<(), CoreError> {
        for op in &undo.created {
            if !self.utxos.contains_key(op) {
                return Err(UtxoError::UndoMismatch(format!("created outpoint not in set: {op}")).into());
            }
        }
        for (op, _) in &undo.spent {
            if self.utxos.contains_key(op) {
                return Err(UtxoError::UndoMismatch(format!("spent outpoint still in set: {op}")).into());
            }
            if !self.spent.contains_key(op) {
                return Err(UtxoError::UndoMismatch(format!("no spend mark for: {op}")).into());
            }
        }

        self.generation += 1;
        for op in undo.created.iter().rev() {
            self.utxos.remove(op);
        }
        for (op, entry) in undo.spent.iter().rev() {
            self.utxos.insert(*op, entry.clone());
            self.spent.remove(op);
        }
        Ok(())
    }

    /// Stage the removal of a transaction's inputs.
    ///
    /// Coinbase transactions are skipped (no real inputs). Inputs may
    /// consume outputs created earlier in the same block; those are served
    /// from the staging area and never reach the committed set.
    fn stage_spends(
        &self,
        tx: &Transaction,
        height: u64,
        staged_spent: &mut Vec<(OutPoint, UtxoEntry)>,
        staged_spent_keys: &mut HashSet<OutPoint>,
        staged_new: &mut HashMap<OutPoint, UtxoEntry>,
    ) -> Result<(), CoreError> {
        if tx.is_coinbase() {
            return Ok(());
        }
        for input in &tx.inputs {
            let op = input.previous_output;
            if staged_spent_keys.contains(&op) {
                return Err(UtxoError::MissingOrAlreadySpent(op.to_string()).into());
            }
            if let Some(entry) = staged_new.remove(&op) {
                // Created earlier in this block; consumed without ever
                // entering the set.
                self.check_maturity(&op, &entry, height)?;
                continue;
            }
            let entry = self
                .utxos
                .get(&op)
                .ok_or_else(|| UtxoError::MissingOrAlreadySpent(op.to_string()))?;
            self.check_maturity(&op, entry, height)?;
            staged_spent.push((op, entry.clone()));
            staged_spent_keys.insert(op);
        }
        Ok(())
    }

    /// Stage the outputs a transaction creates.
    ///
    /// Output keys are never reused: a creation whose outpoint is live, or
    /// already present in the spend history, is rejected as a duplicate.
    fn stage_creations(
        &self,
        tx: &Transaction,
        block_hash: Hash256,
        height: u64,
        staged_new: &mut HashMap<OutPoint, UtxoEntry>,
        staged_order: &mut Vec<OutPoint>,
    ) -> Result<(), CoreError> {
        let txid = tx.txid()?;
        let is_coinbase = tx.is_coinbase();
        for (index, output) in tx.outputs.iter().enumerate() {
            let op = OutPoint {
                txid,
                index: index as u32,
            };
            if self.utxos.contains_key(&op)
                || self.spent.contains_key(&op)
                || staged_new.contains_key(&op)
            {
                return Err(UtxoError::DuplicateOutpoint(op.to_string()).into());
            }
            staged_new.insert(
                op,
                UtxoEntry {
                    output: output.clone(),
                    created_in: block_hash,
                    height,
                    is_coinbase,
                },
            );
            staged_order.push(op);
        }
        Ok(())
    }

    fn check_maturity(
        &self,
        op: &OutPoint,
        entry: &UtxoEntry,
        height: u64,
    ) -> Result<(), UtxoError> {
        if entry.is_mature(height, self.maturity) {
            return Ok(());
        }
        Err(UtxoError::ImmatureCoinbaseSpend {
            outpoint: op.to_string(),
            confirmations: height.saturating_sub(entry.height),
            required: self.maturity,
        })
    }

    /// Spend status of an outpoint relative to the active chain.
    pub fn spend_status(&self, op: &OutPoint) -> SpendStatus {
        if let Some(entry) = self.utxos.get(op) {
            return SpendStatus::Unspent {
                created_height: entry.height,
            };
        }
        if let Some(mark) = self.spent.get(op) {
            return SpendStatus::Spent {
                spent_height: mark.spent_height,
                created_height: mark.created_height,
            };
        }
        SpendStatus::Unknown
    }

    /// Look up a live entry. Returns `None` if spent or unknown.
    pub fn get(&self, op: &OutPoint) -> Option<&UtxoEntry> {
        self.utxos.get(op)
    }

    /// Whether the outpoint is currently spendable.
    pub fn contains(&self, op: &OutPoint) -> bool {
        self.utxos.contains_key(op)
    }

    /// Current generation. Starts at zero and bumps on every successful
    /// apply or undo.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Number of unspent outputs.
    pub fn utxo_count(&self) -> usize {
        self.utxos.len()
    }

    /// Number of recorded spends on the active chain.
    pub fn spent_count(&self) -> usize {
        self.spent.len()
    }

    /// Iterate over the live set.
    pub fn iter(&self) -> impl Iterator<Item = (&OutPoint, &UtxoEntry)> {
        self.utxos.iter()
    }
}
