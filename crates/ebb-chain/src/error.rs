//! Error and rejection types for chain management.
use thiserror::Error;

use ebb_core::error::{TransactionError, UtxoError};
use ebb_core::types::{Hash256, OutPoint};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    #[error("orphan block: unknown parent {0}")] OrphanBlock(String),
    #[error("duplicate block: {0}")] DuplicateBlock(String),
    #[error("block not found: {0}")] BlockNotFound(String),
    #[error("no common ancestor between {from} and {to}")] NoCommonAncestor { from: String, to: String },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("invalid config: {0}")] InvalidConfig(String),
    #[error("undo data missing for block: {0}")] MissingUndo(String),
    #[error("chain state flagged for rebuild")] NeedsRebuild,
}

/// Where a conflicting spend sits relative to the block's own branch.
///
/// Purely diagnostic; every classification is a rejection.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpendConflict {
    #[error("spent at or before the branch point")] BeforeBranchPoint,
    #[error("spent within this branch")] WithinBranch,
    #[error("conflicting spend in the same block")] SameBlock,
}

/// A rejected input, with the conflict placed relative to the branch.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("input {outpoint} of tx {txid} conflicts: {conflict}")]
pub struct DoubleSpend {
    pub outpoint: OutPoint,
    pub txid: Hash256,
    pub conflict: SpendConflict,
}

/// Why a block was rejected and marked invalid.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    #[error("invalid transaction: {0}")] InvalidTransaction(#[from] TransactionError),
    #[error(transparent)] DoubleSpend(#[from] DoubleSpend),
    #[error("descends from invalid block {0}")] InvalidAncestor(Hash256),
    #[error("missing or unspendable inputs: {0}")] MissingInputs(#[from] UtxoError),
}

/// A block rejection: the offending block plus the first failure found.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("block {block_hash} rejected: {reason}")]
pub struct BlockRejection {
    pub block_hash: Hash256,
    pub reason: RejectReason,
}

#[derive(Error, Debug)]
pub enum ChainError {
    #[error(transparent)] Core(#[from] ebb_core::error::CoreError),
    #[error(transparent)] Tree(#[from] TreeError),
    #[error(transparent)] Engine(#[from] EngineError),
}
