//! Tree walking.
//!
//! A walk visits a subtree in document order and hands each text node to the
//! [`Rewriter`]. It stops at three kinds of node:
//!
//! - nodes already in the [`VisitedSet`] (the whole subtree is skipped),
//! - opaque elements such as `<script>` (never inspected),
//! - text nodes (leaves).
//!
//! Elements are marked visited *after* their children have been handled,
//! rewritten text nodes right after the write. A second walk over an
//! unchanged tree is therefore a sequence of visited-set hits with no writes.
//!
//! The traversal uses an explicit stack instead of recursion so deeply nested
//! documents cannot exhaust the native stack.

use super::metrics::PassMetrics;
use super::rewriter::Rewriter;
use super::visited::VisitedSet;
use crate::host::{HostNode, NodeKind};
use std::time::Instant;

const DEFAULT_OPAQUE_TAGS: &[&str] = &["script", "style", "noscript", "iframe"];

/// Element tags whose subtrees are never inspected. Matching ignores ASCII case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpaqueTags {
    tags: Vec<String>,
}

impl Default for OpaqueTags {
    fn default() -> Self {
        OpaqueTags::new(DEFAULT_OPAQUE_TAGS.iter().copied())
    }
}

impl OpaqueTags {
    pub fn new<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        OpaqueTags { tags: tags.into_iter().map(|t| t.into().to_ascii_lowercase()).collect() }
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t.eq_ignore_ascii_case(tag))
    }
}

enum Step<N> {
    Enter(N),
    Leave(N),
}

/// One walk's worth of borrowed state.
pub struct TreeWalker<'w, N: HostNode> {
    rewriter: &'w Rewriter<'w>,
    opaque: &'w OpaqueTags,
    visited: &'w mut VisitedSet<N::Handle>,
}

impl<'w, N: HostNode> TreeWalker<'w, N> {
    pub fn new(rewriter: &'w Rewriter<'w>, opaque: &'w OpaqueTags, visited: &'w mut VisitedSet<N::Handle>) -> Self {
        TreeWalker { rewriter, opaque, visited }
    }

    /// Walk `root` and everything below it that is not already processed.
    pub fn walk(&mut self, root: &N) -> PassMetrics {
        let started = Instant::now();
        let mut metrics = PassMetrics::default();
        let mut stack = vec![Step::Enter(root.clone())];

        while let Some(step) = stack.pop() {
            match step {
                Step::Enter(node) => self.enter(node, &mut stack, &mut metrics),
                Step::Leave(node) => self.visited.insert(&node),
            }
        }

        metrics.duration = started.elapsed();
        metrics
    }

    fn enter(&mut self, node: N, stack: &mut Vec<Step<N>>, metrics: &mut PassMetrics) {
        if self.visited.contains(&node) {
            metrics.skipped_processed += 1;
            return;
        }
        metrics.visited += 1;

        match node.kind() {
            NodeKind::Text => self.rewrite_text(&node, metrics),
            NodeKind::Element(tag) if self.opaque.contains(tag) => metrics.skipped_opaque += 1,
            NodeKind::Element(_) => {
                stack.push(Step::Leave(node.clone()));
                push_children(&node, stack);
            }
            NodeKind::Document => push_children(&node, stack),
            NodeKind::Comment => {}
        }
    }

    fn rewrite_text(&mut self, node: &N, metrics: &mut PassMetrics) {
        metrics.text_nodes += 1;

        let Some(content) = node.text() else {
            return;
        };
        let out = self.rewriter.rewrite(&content);
        if out.changed {
            node.set_text(&out.text);
            self.visited.insert(node);
            metrics.writes += 1;
        }
    }
}

// Reversed so the first child is popped first.
fn push_children<N: HostNode>(node: &N, stack: &mut Vec<Step<N>>) {
    stack.extend(node.children().into_iter().rev().map(Step::Enter));
}
