//! Processed-node tracking.
//!
//! The walker records every node it has fully handled so that later passes
//! from the document root can skip it. Entries are keyed by node identity and
//! hold only a *weak* handle: the set never keeps a node alive, and an entry
//! whose node has been reclaimed counts as absent.
//!
//! ## Invariants
//!
//! - `contains(n)` is true only if `n` was inserted, was not removed or
//!   invalidated since, and the handle stored for `n.key()` is still live. A
//!   new node that reuses the key of a reclaimed one is therefore not
//!   considered visited.
//! - Dead entries are swept whenever the map reaches `sweep_at`, which then
//!   doubles relative to the surviving size. Growth stays proportional to the
//!   live visited population rather than to node churn.

use crate::host::{HostNode, NodeHandle, NodeKey};
use std::collections::HashMap;

const MIN_SWEEP_AT: usize = 256;

/// Weak, identity-keyed set of processed nodes.
#[derive(Debug)]
pub struct VisitedSet<H> {
    entries: HashMap<NodeKey, H>,
    sweep_at: usize,
}

impl<H> Default for VisitedSet<H> {
    fn default() -> Self {
        VisitedSet { entries: HashMap::new(), sweep_at: MIN_SWEEP_AT }
    }
}

impl<H: NodeHandle> VisitedSet<H> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains<N: HostNode<Handle = H>>(&self, node: &N) -> bool {
        self.entries.get(&node.key()).is_some_and(|h| h.is_live())
    }

    pub fn insert<N: HostNode<Handle = H>>(&mut self, node: &N) {
        self.entries.insert(node.key(), node.downgrade());
        if self.entries.len() >= self.sweep_at {
            self.sweep();
        }
    }

    /// Forget `node`. Returns whether it was present.
    pub fn remove<N: HostNode<Handle = H>>(&mut self, node: &N) -> bool {
        self.entries.remove(&node.key()).is_some()
    }

    /// Forget `node` and all of its ancestors.
    ///
    /// Used when a mutation lands on `node`: every processed ancestor would
    /// otherwise hide the change from a walk that starts at the root.
    /// Returns the number of entries dropped.
    pub fn invalidate<N: HostNode<Handle = H>>(&mut self, node: &N) -> usize {
        let mut dropped = 0;
        let mut cursor = Some(node.clone());
        while let Some(current) = cursor {
            if self.remove(&current) {
                dropped += 1;
            }
            cursor = current.parent();
        }
        dropped
    }

    /// Drop entries whose node has been reclaimed.
    pub fn sweep(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, handle| handle.is_live());
        self.sweep_at = (self.entries.len() * 2).max(MIN_SWEEP_AT);
        before - self.entries.len()
    }

    /// Number of stored entries, including dead ones not yet swept.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn live_len(&self) -> usize {
        self.entries.values().filter(|h| h.is_live()).count()
    }
}
