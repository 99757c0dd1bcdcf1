//! Chain engine: block intake, fork choice, and reorg-safe state switching.
//!
//! [`ChainEngine`] owns the block tree, the UTXO set, the spend-status
//! cache, and the orphan pool, and drives them through a fixed pipeline for
//! every submitted block: duplicate and orphan triage, branch-relative
//! input screening, fork choice by cumulative weight, and, when a heavier
//! branch appears, a disconnect/connect switch that either completes or is
//! unwound without a trace.
//!
//! The engine is a single-writer structure. [`ChainHandle`] wraps it in a
//! reader/writer lock for shared use; queries take the read side and only
//! block submission takes the write side.
//!
//! A failed connect during a switch is recoverable: the offending block is
//! marked invalid and the previous active chain is restored. Internal
//! inconsistencies (missing undo data, a broken tree walk) are not; they
//! flag the engine for rebuild and every later submission fails fast with
//! [`EngineError::NeedsRebuild`].

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use rand::Rng;
use tracing::{debug, info, warn};

use ebb_core::error::CoreError;
use ebb_core::genesis;
use ebb_core::traits::{TransactionValidator, WeightSource};
use ebb_core::types::{Block, Hash256, OutPoint};
use ebb_core::utxo::{BlockUndo, SpendStatus, UtxoSet};

use crate::block_tree::{BlockStatus, BlockTree};
use crate::config::ChainConfig;
use crate::double_spend::BranchView;
use crate::error::{BlockRejection, ChainError, EngineError, RejectReason};
use crate::orphan_pool::OrphanPool;
use crate::spend_cache::{CacheStats, SpendStatusCache};

/// What happened to a submitted block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Connected; the block is now on the active chain.
    Accepted,
    /// Screened fine but sits on a branch lighter than the active chain.
    StoredInactive,
    /// Parent unknown; held for a later re-attempt.
    Orphaned,
    /// Already known, in the tree or the orphan pool. Not a failure.
    Duplicate,
    /// Rejected and marked invalid, with the first failure found.
    Rejected(BlockRejection),
}

/// Decides per spend-status lookup whether to skip the cache, given the
/// configured bypass percentage.
type BypassDecider = Box<dyn Fn(u8) -> bool + Send + Sync>;

fn default_bypass_decider() -> BypassDecider {
    Box::new(|percent| percent > 0 && rand::thread_rng().gen_range(0u8..100) < percent)
}

/// Single-writer chain state engine.
///
/// Starts at the hardcoded genesis block. Blocks may arrive in any order;
/// see [`submit_block`](Self::submit_block) for the intake pipeline.
pub struct ChainEngine {
    tree: BlockTree,
    utxo: UtxoSet,
    cache: SpendStatusCache,
    orphans: OrphanPool,
    /// Undo data per connected block of the active chain. The genesis
    /// block has none; it is never disconnected.
    undo_store: HashMap<Hash256, BlockUndo>,
    active_tip: Hash256,
    validator: Arc<dyn TransactionValidator>,
    weights: Arc<dyn WeightSource>,
    config: ChainConfig,
    bypass_decider: BypassDecider,
    needs_rebuild: bool,
}

impl fmt::Debug for ChainEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainEngine")
            .field("active_tip", &self.active_tip)
            .field("blocks", &self.tree.len())
            .field("needs_rebuild", &self.needs_rebuild)
            .finish_non_exhaustive()
    }
}

impl ChainEngine {
    /// Create an engine with the genesis block connected.
    ///
    /// # Errors
    ///
    /// [`EngineError::InvalidConfig`] if the config is out of range; a
    /// [`CoreError`](ebb_core::error::CoreError) if the genesis block fails
    /// to apply, which only happens if its hardcoded data is broken.
    pub fn new(
        config: ChainConfig,
        validator: Arc<dyn TransactionValidator>,
        weights: Arc<dyn WeightSource>,
    ) -> Result<Self, ChainError> {
        config.validate()?;

        let genesis = genesis::genesis_block().clone();
        let genesis_hash = genesis.header.hash();
        let weight = weights.block_weight(&genesis);

        let mut utxo = UtxoSet::new(config.coinbase_maturity);
        utxo.apply(&genesis, 0)?;

        info!(%genesis_hash, "chain: engine initialized at genesis");
        Ok(Self {
            tree: BlockTree::with_root(genesis, weight),
            utxo,
            cache: SpendStatusCache::new(config.spend_cache_capacity),
            orphans: OrphanPool::new(config.max_orphan_blocks),
            undo_store: HashMap::new(),
            active_tip: genesis_hash,
            validator,
            weights,
            config,
            bypass_decider: default_bypass_decider(),
            needs_rebuild: false,
        })
    }

    /// Replace the cache-bypass decision function.
    ///
    /// The decider receives the configured percentage and rules on one
    /// lookup at a time. The default rolls a uniform 0-99 die per lookup;
    /// a deterministic decider makes cache traffic reproducible.
    pub fn with_bypass_decider(
        mut self,
        decider: impl Fn(u8) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.bypass_decider = Box::new(decider);
        self
    }

    // ------------------------------------------------------------------
    // Block intake
    // ------------------------------------------------------------------

    /// Process one block: triage, screen, store, and re-run fork choice.
    ///
    /// Duplicates and orphans are reported, not errored. A rejection means
    /// the block (and anything descending from it) is permanently invalid.
    /// `Err` is reserved for internal inconsistencies; after one, the
    /// engine refuses further submissions until rebuilt.
    pub fn submit_block(&mut self, block: Block) -> Result<SubmitOutcome, ChainError> {
        if self.needs_rebuild {
            return Err(EngineError::NeedsRebuild.into());
        }
        let result = self.submit_inner(block);
        if result.is_err() {
            // No guarantee the tree and the set still agree.
            self.needs_rebuild = true;
        }
        result
    }

    fn submit_inner(&mut self, block: Block) -> Result<SubmitOutcome, ChainError> {
        let hash = block.header.hash();
        if self.tree.contains(&hash) || self.orphans.contains(&hash) {
            debug!(%hash, "chain: duplicate block ignored");
            return Ok(SubmitOutcome::Duplicate);
        }
        if !self.tree.contains(&block.header.prev_hash) {
            let parent = block.header.prev_hash;
            self.orphans.insert(block);
            debug!(%hash, %parent, "chain: orphan held for missing parent");
            return Ok(SubmitOutcome::Orphaned);
        }

        let outcome = self.attach_block(block)?;
        self.drain_orphans(hash)?;
        Ok(outcome)
    }

    /// Insert a block whose parent is in the tree, screen it, and let fork
    /// choice react.
    fn attach_block(&mut self, block: Block) -> Result<SubmitOutcome, ChainError> {
        let weight = self.weights.block_weight(&block);
        let parent_hash = block.header.prev_hash;
        let hash = self.tree.insert(block, weight)?;

        if self.tree.node(&hash)?.status == BlockStatus::Invalid {
            warn!(%hash, %parent_hash, "chain: block rejected, parent branch is invalid");
            return Ok(SubmitOutcome::Rejected(BlockRejection {
                block_hash: hash,
                reason: RejectReason::InvalidAncestor(parent_hash),
            }));
        }

        if let Some(rejection) = self.screen_block(&hash)? {
            let marked = self.tree.mark_invalid(&hash)?;
            warn!(
                %hash,
                reason = %rejection.reason,
                invalidated = marked.len(),
                "chain: block rejected"
            );
            return Ok(SubmitOutcome::Rejected(rejection));
        }
        self.tree.mark_valid(&hash)?;

        let mut rejections = self.update_best_chain()?;
        if let Some(pos) = rejections.iter().position(|r| r.block_hash == hash) {
            return Ok(SubmitOutcome::Rejected(rejections.swap_remove(pos)));
        }
        match self.tree.node(&hash)?.status {
            // A switch toward this block failed on one of its ancestors.
            BlockStatus::Invalid => Ok(SubmitOutcome::Rejected(BlockRejection {
                block_hash: hash,
                reason: RejectReason::InvalidAncestor(parent_hash),
            })),
            _ if self.tree.is_on_chain(&self.active_tip, &hash)? => Ok(SubmitOutcome::Accepted),
            _ => Ok(SubmitOutcome::StoredInactive),
        }
    }

    /// Screen a stored block's transactions relative to its own branch.
    ///
    /// Builds the branch view from the path between the active tip and the
    /// block's parent: active-chain facts bind only up to the common
    /// ancestor, and the connect side of the path is replayed as branch
    /// context. Validation order per transaction: txid, external validator,
    /// then input screening. Read-only.
    fn screen_block(&self, hash: &Hash256) -> Result<Option<BlockRejection>, ChainError> {
        let node = self.tree.node(hash)?;
        let path = self.tree.path_between(&self.active_tip, &node.parent)?;
        let ancestor_height = self.tree.node(&path.ancestor)?.height;

        let mut view = BranchView::new(ancestor_height);
        for branch_hash in &path.connect {
            view.record_branch_block(&self.tree.node(branch_hash)?.block)?;
        }

        let percent = self.config.cache_bypass_percent;
        let decider = &self.bypass_decider;
        for tx in &node.block.transactions {
            let txid = match tx.txid() {
                Ok(txid) => txid,
                Err(err) => {
                    return Ok(Some(BlockRejection {
                        block_hash: *hash,
                        reason: RejectReason::InvalidTransaction(err),
                    }));
                }
            };
            if let Err(err) = self.validator.validate_transaction(tx) {
                return Ok(Some(BlockRejection {
                    block_hash: *hash,
                    reason: RejectReason::InvalidTransaction(err),
                }));
            }
            if let Err(conflict) =
                view.validate_inputs(txid, tx, &self.cache, &self.utxo, || decider(percent))
            {
                return Ok(Some(BlockRejection {
                    block_hash: *hash,
                    reason: RejectReason::DoubleSpend(conflict),
                }));
            }
            view.record_transaction(txid, tx);
        }
        Ok(None)
    }

    /// Re-attempt every pooled orphan whose ancestry just became available,
    /// breadth-first. Their outcomes are not reported anywhere; the
    /// submitter of an orphan was already told `Orphaned`.
    fn drain_orphans(&mut self, connected: Hash256) -> Result<(), ChainError> {
        let mut queue = VecDeque::from([connected]);
        while let Some(parent) = queue.pop_front() {
            for block in self.orphans.take_children(&parent) {
                let hash = block.header.hash();
                debug!(%hash, %parent, "chain: re-attempting pooled orphan");
                self.attach_block(block)?;
                queue.push_back(hash);
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Fork choice
    // ------------------------------------------------------------------

    /// Point the active chain at the best tip, retrying while switches
    /// fail. Terminates because every failed switch marks at least one
    /// block invalid, shrinking the candidate set.
    fn update_best_chain(&mut self) -> Result<Vec<BlockRejection>, ChainError> {
        let mut rejections = Vec::new();
        loop {
            let best = self.tree.best_tip();
            if best == self.active_tip {
                return Ok(rejections);
            }
            match self.reorg_to(&best)? {
                None => {
                    info!(
                        tip = %self.active_tip,
                        height = self.active_tip_height(),
                        "chain: active tip updated"
                    );
                }
                Some(rejection) => rejections.push(rejection),
            }
        }
    }

    /// Switch the UTXO set from the current active tip to `target`.
    ///
    /// Disconnects the abandoned suffix newest-first, then connects the new
    /// branch oldest-first. If any connect fails, the partial switch is
    /// unwound and the original chain reconnected exactly; the offending
    /// block and its descendants are marked invalid and the rejection
    /// returned. `Err` means the unwind itself could not be completed.
    fn reorg_to(&mut self, target: &Hash256) -> Result<Option<BlockRejection>, ChainError> {
        let path = self.tree.path_between(&self.active_tip, target)?;
        debug!(
            from = %self.active_tip,
            to = %target,
            disconnects = path.disconnect.len(),
            connects = path.connect.len(),
            "chain: switching active chain"
        );

        let mut disconnected: Vec<Hash256> = Vec::with_capacity(path.disconnect.len());
        for hash in &path.disconnect {
            let undo = self
                .undo_store
                .remove(hash)
                .ok_or_else(|| EngineError::MissingUndo(hash.to_string()))?;
            self.utxo.undo(&undo)?;
            self.cache.invalidate(undo.touched_outpoints());
            disconnected.push(*hash);
        }

        let mut connected: Vec<Hash256> = Vec::new();
        let mut failure: Option<BlockRejection> = None;
        for hash in &path.connect {
            let (block, height) = {
                let node = self.tree.node(hash)?;
                (node.block.clone(), node.height)
            };
            match self.verify_and_apply(&block, height) {
                Ok(undo) => {
                    self.cache.invalidate(undo.touched_outpoints());
                    self.undo_store.insert(*hash, undo);
                    connected.push(*hash);
                }
                Err(rejection) => {
                    failure = Some(rejection);
                    break;
                }
            }
        }

        let Some(rejection) = failure else {
            self.active_tip = *target;
            return Ok(None);
        };

        // Unwind the partial connect, newest first.
        for hash in connected.iter().rev() {
            let undo = self
                .undo_store
                .remove(hash)
                .ok_or_else(|| EngineError::MissingUndo(hash.to_string()))?;
            self.utxo.undo(&undo)?;
            self.cache.invalidate(undo.touched_outpoints());
        }
        // Reconnect the original suffix, oldest first. These blocks were
        // connected before, so apply cannot fail here short of corruption.
        for hash in disconnected.iter().rev() {
            let (block, height) = {
                let node = self.tree.node(hash)?;
                (node.block.clone(), node.height)
            };
            let undo = self.utxo.apply(&block, height)?;
            self.cache.invalidate(undo.touched_outpoints());
            self.undo_store.insert(*hash, undo);
        }

        let marked = self.tree.mark_invalid(&rejection.block_hash)?;
        warn!(
            block = %rejection.block_hash,
            reason = %rejection.reason,
            invalidated = marked.len(),
            "chain: branch connect failed, switch unwound"
        );
        Ok(Some(rejection))
    }

    /// Screen and connect one block on top of the current UTXO state.
    ///
    /// Used while switching, where the set already reflects the block's
    /// parent: the branch view is empty and anchored at the parent height.
    /// Every failure is a rejection of this block; maturity and other
    /// spendability rules are enforced by the set itself.
    fn verify_and_apply(&mut self, block: &Block, height: u64) -> Result<BlockUndo, BlockRejection> {
        let block_hash = block.header.hash();
        let mut view = BranchView::new(height.saturating_sub(1));
        let percent = self.config.cache_bypass_percent;

        for tx in &block.transactions {
            let txid = tx.txid().map_err(|err| BlockRejection {
                block_hash,
                reason: RejectReason::InvalidTransaction(err),
            })?;
            let decider = &self.bypass_decider;
            view.validate_inputs(txid, tx, &self.cache, &self.utxo, || decider(percent))
                .map_err(|ds| BlockRejection {
                    block_hash,
                    reason: RejectReason::DoubleSpend(ds),
                })?;
            view.record_transaction(txid, tx);
        }

        self.utxo.apply(block, height).map_err(|err| BlockRejection {
            block_hash,
            reason: match err {
                CoreError::Utxo(err) => RejectReason::MissingInputs(err),
                CoreError::Transaction(err) => RejectReason::InvalidTransaction(err),
            },
        })
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Whether an output has a recorded spend on the active chain.
    ///
    /// Served through the spend-status cache; the bypass decider is
    /// sampled once.
    pub fn is_output_spent(&self, op: &OutPoint) -> bool {
        self.spend_status(op).is_spent()
    }

    /// Full spend status of an output relative to the active chain.
    pub fn spend_status(&self, op: &OutPoint) -> SpendStatus {
        let bypass = (self.bypass_decider)(self.config.cache_bypass_percent);
        self.cache.query(op, bypass, &self.utxo)
    }

    /// Hash of the active chain's tip.
    pub fn active_tip_hash(&self) -> Hash256 {
        self.active_tip
    }

    /// Height of the active chain's tip.
    pub fn active_tip_height(&self) -> u64 {
        self.tree.get(&self.active_tip).map(|n| n.height).unwrap_or(0)
    }

    /// Validation status of a stored block, `None` if unknown.
    pub fn block_status(&self, hash: &Hash256) -> Option<BlockStatus> {
        self.tree.get(hash).map(|n| n.status)
    }

    /// Hash of the active-chain block at `height`, `None` above the tip.
    pub fn block_hash_at_height(&self, height: u64) -> Option<Hash256> {
        self.tree.ancestor_at(&self.active_tip, height).ok()
    }

    /// The stored block for a hash, if known to the tree.
    pub fn block(&self, hash: &Hash256) -> Option<&Block> {
        self.tree.get(hash).map(|n| &n.block)
    }

    /// Counters of the spend-status cache.
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Current UTXO-set generation.
    pub fn utxo_generation(&self) -> u64 {
        self.utxo.generation()
    }

    /// Number of unspent outputs on the active chain.
    pub fn utxo_count(&self) -> usize {
        self.utxo.utxo_count()
    }

    /// Number of pooled orphan blocks.
    pub fn orphan_count(&self) -> usize {
        self.orphans.len()
    }

    /// Number of blocks in the tree, all branches included.
    pub fn block_count(&self) -> usize {
        self.tree.len()
    }

    /// The engine's configuration.
    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    /// Whether an internal inconsistency has been detected. Once set, all
    /// submissions fail until the engine is rebuilt from stored blocks.
    pub fn needs_rebuild(&self) -> bool {
        self.needs_rebuild
    }

    /// Adjust the cache-bypass percentage at runtime.
    ///
    /// # Errors
    ///
    /// [`EngineError::InvalidConfig`] if `percent` exceeds 100.
    pub fn set_cache_bypass_percent(&mut self, percent: u8) -> Result<(), ChainError> {
        if percent > 100 {
            return Err(EngineError::InvalidConfig(format!(
                "cache_bypass_percent must be 0-100, got {percent}"
            ))
            .into());
        }
        debug!(percent, "chain: cache bypass percentage updated");
        self.config.cache_bypass_percent = percent;
        Ok(())
    }
}

/// Cloneable shared handle over a [`ChainEngine`].
///
/// One writer, many readers: submissions and runtime reconfiguration take
/// the write lock, queries take the read lock.
#[derive(Clone, Debug)]
pub struct ChainHandle {
    inner: Arc<RwLock<ChainEngine>>,
}

impl ChainHandle {
    pub fn new(engine: ChainEngine) -> Self {
        Self {
            inner: Arc::new(RwLock::new(engine)),
        }
    }

    /// See [`ChainEngine::submit_block`].
    pub fn submit_block(&self, block: Block) -> Result<SubmitOutcome, ChainError> {
        self.inner.write().submit_block(block)
    }

    /// See [`ChainEngine::set_cache_bypass_percent`].
    pub fn set_cache_bypass_percent(&self, percent: u8) -> Result<(), ChainError> {
        self.inner.write().set_cache_bypass_percent(percent)
    }

    pub fn is_output_spent(&self, op: &OutPoint) -> bool {
        self.inner.read().is_output_spent(op)
    }

    pub fn spend_status(&self, op: &OutPoint) -> SpendStatus {
        self.inner.read().spend_status(op)
    }

    pub fn active_tip_hash(&self) -> Hash256 {
        self.inner.read().active_tip_hash()
    }

    pub fn active_tip_height(&self) -> u64 {
        self.inner.read().active_tip_height()
    }

    pub fn block_status(&self, hash: &Hash256) -> Option<BlockStatus> {
        self.inner.read().block_status(hash)
    }

    pub fn block_hash_at_height(&self, height: u64) -> Option<Hash256> {
        self.inner.read().block_hash_at_height(height)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.inner.read().cache_stats()
    }

    pub fn block_count(&self) -> usize {
        self.inner.read().block_count()
    }

    pub fn orphan_count(&self) -> usize {
        self.inner.read().orphan_count()
    }

    pub fn needs_rebuild(&self) -> bool {
        self.inner.read().needs_rebuild()
    }
}
