//! Pass metrics.
//!
//! Counters collected by one [`TreeWalker::walk`](super::TreeWalker::walk)
//! call. They are cheap enough to collect on every pass; the controller keeps
//! the last one around for inspection and the CLI prints it.
//!
//! ## Design notes
//!
//! - `visited` counts nodes that were actually inspected; nodes short-circuited
//!   by the visited set land in `skipped_processed` instead, and the subtree
//!   below them is not counted at all.
//! - `skipped_opaque` counts opaque roots, not their descendants.

use std::time::Duration;

/// Timing and counters for a single walk.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PassMetrics {
    /// Elapsed time for the walk.
    pub duration: Duration,
    /// Nodes inspected (entered and not skipped by the visited set).
    pub visited: usize,
    /// Text nodes handed to the rewriter.
    pub text_nodes: usize,
    /// Text nodes whose content was written back.
    pub writes: usize,
    /// Nodes skipped because they were already processed.
    pub skipped_processed: usize,
    /// Opaque subtrees skipped without inspection.
    pub skipped_opaque: usize,
}
