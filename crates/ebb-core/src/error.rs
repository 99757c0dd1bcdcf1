//! Error types for the Ebb chain-state core.
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransactionError {
    #[error("serialization: {0}")] Serialization(String),
    #[error("bad hash: {0}")] BadHash(String),
    #[error("witness rejected for input {index} of {txid}")] WitnessRejected { txid: String, index: usize },
    #[error("empty inputs or outputs")] EmptyInputsOrOutputs,
    #[error("value overflow")] ValueOverflow,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UtxoError {
    #[error("missing or already spent: {0}")] MissingOrAlreadySpent(String),
    #[error("immature coinbase spend: {outpoint} has {confirmations} of {required} confirmations")] ImmatureCoinbaseSpend { outpoint: String, confirmations: u64, required: u64 },
    #[error("outpoint created twice: {0}")] DuplicateOutpoint(String),
    #[error("undo does not match set contents: {0}")] UndoMismatch(String),
}

#[derive(Error, Debug)]
pub enum CoreError {
    #[error(transparent)] Transaction(#[from] TransactionError),
    #[error(transparent)] Utxo(#[from] UtxoError),
}
