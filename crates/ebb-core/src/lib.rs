//! # ebb-core
//! Foundation types and the authoritative UTXO set for the Ebb chain state.

pub mod constants;
pub mod error;
pub mod genesis;
pub mod traits;
pub mod types;
pub mod utxo;
