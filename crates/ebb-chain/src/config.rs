//! Chain engine configuration.
//!
//! Provides [`ChainConfig`] with defaults taken from the protocol constants.
//! The one runtime-tunable knob is `cache_bypass_percent`, which forces a
//! fraction of spend-status queries through the authoritative UTXO set
//! instead of the cache. It must never change an accept/reject outcome,
//! only how often the cache is consulted.

use serde::{Deserialize, Serialize};

use ebb_core::constants::{
    COINBASE_MATURITY, DEFAULT_CACHE_BYPASS_PERCENT, DEFAULT_SPEND_CACHE_CAPACITY,
    MAX_ORPHAN_BLOCKS,
};

use crate::error::EngineError;

/// Configuration for a [`ChainEngine`](crate::engine::ChainEngine) instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainConfig {
    /// Percentage of spend-status queries (0-100) that skip the cache and
    /// read the authoritative UTXO set directly. The result is still
    /// written back to the cache.
    pub cache_bypass_percent: u8,
    /// Confirmations required before a coinbase output may be spent.
    /// Zero disables the rule.
    pub coinbase_maturity: u64,
    /// Maximum number of entries the spend-status cache holds.
    /// Zero disables caching entirely.
    pub spend_cache_capacity: usize,
    /// Maximum number of parentless blocks held for later re-attempt.
    pub max_orphan_blocks: usize,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            cache_bypass_percent: DEFAULT_CACHE_BYPASS_PERCENT,
            coinbase_maturity: COINBASE_MATURITY,
            spend_cache_capacity: DEFAULT_SPEND_CACHE_CAPACITY,
            max_orphan_blocks: MAX_ORPHAN_BLOCKS,
        }
    }
}

impl ChainConfig {
    /// Check all fields are within range.
    ///
    /// # Errors
    ///
    /// [`EngineError::InvalidConfig`] if `cache_bypass_percent` exceeds 100.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.cache_bypass_percent > 100 {
            return Err(EngineError::InvalidConfig(format!(
                "cache_bypass_percent must be 0-100, got {}",
                self.cache_bypass_percent
            )));
        }
        Ok(())
    }
}
