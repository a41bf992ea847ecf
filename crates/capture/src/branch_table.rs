//! Branch deduplication table
//!
//! Assigns dense, stable indices to branch identities in first-occurrence
//! order. Lookup is a hash of the full four-field key; storage is an array
//! indexed by insertion order, bounded by the configured capacity. Nothing
//! is ever evicted.

use crate::error::{CaptureError, CaptureResult};
use brtrace_core::{Branch, MAX_BRANCHES};
use rustc_hash::FxHashMap;

/// Deduplicating, insertion-ordered branch table
#[derive(Debug)]
pub struct BranchTable {
    branches: Vec<Branch>,
    index: FxHashMap<Branch, u32>,
    capacity: u64,
}

impl BranchTable {
    /// Create an empty table holding at most `capacity` branches
    ///
    /// Capacities beyond what an entry can address are clamped to
    /// `MAX_BRANCHES`.
    pub fn new(capacity: u64) -> Self {
        BranchTable {
            branches: Vec::new(),
            index: FxHashMap::default(),
            capacity: capacity.min(MAX_BRANCHES),
        }
    }

    /// Return the index of `branch`, inserting it on first sight
    ///
    /// Fails with `BranchCapacityExceeded` when a new branch would not fit.
    pub fn insert_or_get(&mut self, branch: Branch) -> CaptureResult<u32> {
        if let Some(&idx) = self.index.get(&branch) {
            return Ok(idx);
        }
        let next = self.branches.len() as u64;
        let idx = match u32::try_from(next) {
            Ok(idx) if next < self.capacity => idx,
            _ => {
                return Err(CaptureError::BranchCapacityExceeded {
                    capacity: self.capacity,
                })
            }
        };
        self.branches.push(branch);
        self.index.insert(branch, idx);
        Ok(idx)
    }

    /// Branch at `index`
    pub fn get(&self, index: u32) -> Option<&Branch> {
        self.branches.get(index as usize)
    }

    /// Number of distinct branches
    pub fn len(&self) -> usize {
        self.branches.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.branches.is_empty()
    }

    /// Configured capacity
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// All branches in index order
    pub fn as_slice(&self) -> &[Branch] {
        &self.branches
    }
}
