//! # ebb-chain — Block tree, fork choice, and reorg-safe state transitions.
//!
//! This crate organizes candidate blocks into a tree, selects the active
//! chain by cumulative weight with a deterministic tie-break, and drives the
//! disconnect/connect sequences that keep the UTXO set of [`ebb_core`]
//! consistent across reorganizations.
//!
//! The entry point is [`ChainEngine`] (single writer) or its shared
//! [`ChainHandle`] wrapper (one writer, many readers). Blocks arrive in any
//! order: orphans are held until their parent shows up, duplicates are
//! ignored, and double spends are rejected with a diagnostic that places the
//! conflicting spend relative to the block's own branch.

pub mod block_tree;
pub mod config;
pub mod double_spend;
pub mod engine;
pub mod error;
pub mod orphan_pool;
pub mod spend_cache;

pub use block_tree::BlockStatus;
pub use config::ChainConfig;
pub use engine::{ChainEngine, ChainHandle, SubmitOutcome};
pub use error::{BlockRejection, ChainError, DoubleSpend, RejectReason, SpendConflict};
