//! Block tree: every structurally valid block ever received, keyed by hash.
//!
//! The tree is an arena of [`BlockNode`] records with parent references
//! stored as hash lookups, never direct pointers. It performs no validation
//! beyond linkage; validity is a status flag the engine maintains. A single
//! root (genesis) is guaranteed by construction, so any walk that fails to
//! meet a common ancestor indicates corruption and is reported as
//! [`TreeError::NoCommonAncestor`].

use std::collections::{HashMap, VecDeque};

use ebb_core::types::{Block, Hash256};

use crate::error::TreeError;

/// Validation state of a stored block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockStatus {
    /// Not yet screened.
    Unknown,
    /// Passed input screening; eligible for best-chain selection.
    Valid,
    /// Failed screening or connection, or descends from a block that did.
    /// Never reconsidered.
    Invalid,
}

/// A block and its position in the tree.
///
/// Immutable after insertion except for `status`.
#[derive(Clone, Debug)]
pub struct BlockNode {
    pub hash: Hash256,
    pub parent: Hash256,
    pub height: u64,
    /// Parent's cumulative weight plus this block's own contribution,
    /// saturating at `u128::MAX`.
    pub cumulative_weight: u128,
    pub status: BlockStatus,
    pub block: Block,
}

/// Disconnect/connect sequences between two chain positions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PathBetween {
    /// Deepest block on both paths.
    pub ancestor: Hash256,
    /// Blocks to unwind, starting from `from`, most recent first.
    /// Excludes the ancestor.
    pub disconnect: Vec<Hash256>,
    /// Blocks to connect, ending at `to`, oldest first.
    /// Excludes the ancestor.
    pub connect: Vec<Hash256>,
}

/// Parent-linked forest with one guaranteed root.
pub struct BlockTree {
    nodes: HashMap<Hash256, BlockNode>,
    children: HashMap<Hash256, Vec<Hash256>>,
    root: Hash256,
}

impl BlockTree {
    /// Create a tree holding only the root block at height 0.
    ///
    /// The root starts out `Valid`; it is the one block that is never
    /// re-screened or invalidated.
    pub fn with_root(block: Block, weight: u128) -> Self {
        let hash = block.header.hash();
        let node = BlockNode {
            hash,
            parent: block.header.prev_hash,
            height: 0,
            cumulative_weight: weight,
            status: BlockStatus::Valid,
            block,
        };
        let mut nodes = HashMap::new();
        nodes.insert(hash, node);
        Self {
            nodes,
            children: HashMap::new(),
            root: hash,
        }
    }

    /// Insert a block whose parent is already present.
    ///
    /// Height and cumulative weight derive from the parent; a child of an
    /// `Invalid` parent is itself stored `Invalid`, otherwise `Unknown`.
    /// Returns the block's hash.
    ///
    /// # Errors
    ///
    /// - [`TreeError::DuplicateBlock`] if the hash is already stored
    /// - [`TreeError::OrphanBlock`] if the parent hash is unknown
    pub fn insert(&mut self, block: Block, weight: u128) -> Result<Hash256, TreeError> {
        let hash = block.header.hash();
        if self.nodes.contains_key(&hash) {
            return Err(TreeError::DuplicateBlock(hash.to_string()));
        }
        let parent_hash = block.header.prev_hash;
        let parent = self
            .nodes
            .get(&parent_hash)
            .ok_or_else(|| TreeError::OrphanBlock(parent_hash.to_string()))?;

        let status = if parent.status == BlockStatus::Invalid {
            BlockStatus::Invalid
        } else {
            BlockStatus::Unknown
        };
        let node = BlockNode {
            hash,
            parent: parent_hash,
            height: parent.height + 1,
            cumulative_weight: parent.cumulative_weight.saturating_add(weight),
            status,
            block,
        };
        self.nodes.insert(hash, node);
        self.children.entry(parent_hash).or_default().push(hash);
        Ok(hash)
    }

    /// Whether a block with this hash is stored.
    pub fn contains(&self, hash: &Hash256) -> bool {
        self.nodes.contains_key(hash)
    }

    /// Look up a node, erroring if absent.
    pub fn node(&self, hash: &Hash256) -> Result<&BlockNode, TreeError> {
        self.nodes
            .get(hash)
            .ok_or_else(|| TreeError::BlockNotFound(hash.to_string()))
    }

    /// Look up a node.
    pub fn get(&self, hash: &Hash256) -> Option<&BlockNode> {
        self.nodes.get(hash)
    }

    /// Direct children of a block.
    pub fn children(&self, hash: &Hash256) -> &[Hash256] {
        self.children.get(hash).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Mark a block as having passed screening.
    pub fn mark_valid(&mut self, hash: &Hash256) -> Result<(), TreeError> {
        let node = self
            .nodes
            .get_mut(hash)
            .ok_or_else(|| TreeError::BlockNotFound(hash.to_string()))?;
        node.status = BlockStatus::Valid;
        Ok(())
    }

    /// Mark a block and every descendant as invalid.
    ///
    /// Returns the hashes newly marked, breadth-first starting from `hash`.
    pub fn mark_invalid(&mut self, hash: &Hash256) -> Result<Vec<Hash256>, TreeError> {
        if !self.nodes.contains_key(hash) {
            return Err(TreeError::BlockNotFound(hash.to_string()));
        }
        let mut marked = Vec::new();
        let mut queue = VecDeque::from([*hash]);
        while let Some(h) = queue.pop_front() {
            if let Some(node) = self.nodes.get_mut(&h) {
                if node.status == BlockStatus::Invalid {
                    continue;
                }
                node.status = BlockStatus::Invalid;
                marked.push(h);
                if let Some(kids) = self.children.get(&h) {
                    queue.extend(kids.iter().copied());
                }
            }
        }
        Ok(marked)
    }

    /// Best tip among non-invalid blocks.
    ///
    /// Ordered by cumulative weight, ties broken by the lower block hash,
    /// so every instance holding the same block set selects the same tip
    /// regardless of arrival order.
    pub fn best_tip(&self) -> Hash256 {
        self.nodes
            .values()
            .filter(|n| n.status != BlockStatus::Invalid)
            .max_by(|a, b| {
                a.cumulative_weight
                    .cmp(&b.cumulative_weight)
                    .then_with(|| b.hash.cmp(&a.hash))
            })
            .map(|n| n.hash)
            .unwrap_or(self.root)
    }

    /// Compute the disconnect/connect sequences from `from` to `to`.
    ///
    /// Walks both lineages to their common ancestor. Either sequence may be
    /// empty (pure extension, pure rewind, or `from == to`).
    ///
    /// # Errors
    ///
    /// - [`TreeError::BlockNotFound`] if either endpoint is unknown
    /// - [`TreeError::NoCommonAncestor`] if the walks never meet, which can
    ///   only happen if the single-root invariant is broken
    pub fn path_between(&self, from: &Hash256, to: &Hash256) -> Result<PathBetween, TreeError> {
        let corrupt = || TreeError::NoCommonAncestor {
            from: from.to_string(),
            to: to.to_string(),
        };
        let mut a = self.node(from)?;
        let mut b = self.node(to)?;
        let mut disconnect = Vec::new();
        let mut connect = Vec::new();

        while a.height > b.height {
            disconnect.push(a.hash);
            a = self.get(&a.parent).ok_or_else(corrupt)?;
        }
        while b.height > a.height {
            connect.push(b.hash);
            b = self.get(&b.parent).ok_or_else(corrupt)?;
        }
        while a.hash != b.hash {
            if a.height == 0 {
                return Err(corrupt());
            }
            disconnect.push(a.hash);
            a = self.get(&a.parent).ok_or_else(corrupt)?;
            connect.push(b.hash);
            b = self.get(&b.parent).ok_or_else(corrupt)?;
        }
        connect.reverse();
        Ok(PathBetween {
            ancestor: a.hash,
            disconnect,
            connect,
        })
    }

    /// Hash of the ancestor of `hash` at the given height.
    pub fn ancestor_at(&self, hash: &Hash256, height: u64) -> Result<Hash256, TreeError> {
        let mut node = self.node(hash)?;
        if height > node.height {
            return Err(TreeError::BlockNotFound(format!(
                "no ancestor of {hash} at height {height}"
            )));
        }
        while node.height > height {
            node = self.node(&node.parent)?;
        }
        Ok(node.hash)
    }

    /// Whether `hash` lies on the chain ending at `tip`.
    pub fn is_on_chain(&self, tip: &Hash256, hash: &Hash256) -> Result<bool, TreeError> {
        let target_height = self.node(hash)?.height;
        if target_height > self.node(tip)?.height {
            return Ok(false);
        }
        Ok(self.ancestor_at(tip, target_height)? == *hash)
    }

    /// Root (genesis) hash.
    pub fn root(&self) -> Hash256 {
        self.root
    }

    /// Number of stored blocks.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always false; the root is present from construction.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
