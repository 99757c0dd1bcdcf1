//! Trait seams for collaborators that live outside the chain-state core.
//!
//! Script execution, signature checking, and the weight metric are supplied
//! by the embedding node. The core only assumes a yes/no verdict per
//! transaction and a totally ordered weight contribution per block.

use crate::error::TransactionError;
use crate::types::{Block, Transaction};

/// External verdict on a transaction's scripts and signatures.
///
/// Runs before spend-status checks. Implementations must not consult the
/// UTXO set; unspentness is the chain state's own responsibility.
pub trait TransactionValidator: Send + Sync {
    /// Accept or reject a transaction on script/signature grounds.
    fn validate_transaction(&self, tx: &Transaction) -> Result<(), TransactionError>;
}

/// Validator that accepts every transaction.
///
/// The default seam for deployments where witness checking happens before
/// blocks reach the chain state.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl TransactionValidator for AcceptAll {
    fn validate_transaction(&self, _tx: &Transaction) -> Result<(), TransactionError> {
        Ok(())
    }
}

/// Source of each block's cumulative-weight contribution.
///
/// The quantity is opaque to the core beyond being totally ordered and
/// summable; proof-of-work and proof-of-stake metrics both fit.
pub trait WeightSource: Send + Sync {
    /// Weight contribution of a single block.
    fn block_weight(&self, block: &Block) -> u128;
}

/// Weight source that assigns every block the same unit weight, making
/// cumulative weight equal to chain height.
#[derive(Debug, Clone, Copy, Default)]
pub struct UniformWeight;

impl WeightSource for UniformWeight {
    fn block_weight(&self, _block: &Block) -> u128 {
        1
    }
}

// Compile-time checks that the traits stay dyn-compatible: the engine holds
// them as boxed trait objects.
fn _assert_validator_object_safe(_: &dyn TransactionValidator) {}
fn _assert_weight_source_object_safe(_: &dyn WeightSource) {}
