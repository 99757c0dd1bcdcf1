//! Chain-state constants. All monetary values in drops (1 EBB = 10^8 drops).

pub const COIN: u64 = 100_000_000;

/// Coinbase value convention used by the genesis block and test chains.
/// Reward schedules are decided by the block producer, not this crate.
pub const BLOCK_SUBSIDY: u64 = 50 * COIN;

/// Confirmations before a coinbase output may be spent.
pub const COINBASE_MATURITY: u64 = 100;

/// Height of the genesis block.
pub const GENESIS_HEIGHT: u64 = 0;

/// Maximum blocks held while waiting for an unknown parent. Oldest entries
/// are dropped first once the pool is full; peers can resubmit.
pub const MAX_ORPHAN_BLOCKS: usize = 1024;

/// Default capacity of the spend-status cache.
pub const DEFAULT_SPEND_CACHE_CAPACITY: usize = 65_536;

/// Default percentage of spend-status queries forced through the
/// authoritative set instead of the cache. Zero means the cache is always
/// tried first; one hundred disables it entirely.
pub const DEFAULT_CACHE_BYPASS_PERCENT: u8 = 0;
