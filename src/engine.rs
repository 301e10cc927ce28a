//! Rewriting engine.
//!
//! Everything here is synchronous and host-agnostic: given rules and a subtree,
//! rewrite what matches and remember what has been seen. Scheduling and change
//! notification live one layer up (`coalescer.rs`, `subscriber.rs`,
//! `lifecycle.rs`).
//!
//! ## How the parts work together
//!
//! ```text
//! rules (all)  ──┐
//!               │  CompiledRules::new             (compiled_rules.rs)
//!               └───────────────┬──────────────
//!                               │
//! text ── TriggerInfo::scan ────┼─ select rules whose term occurs (lowercased)
//!         (trigger.rs)          │
//!                               v
//!                     Rewriter::rewrite (rewriter.rs)
//!                       - run triggered matchers in order
//!                       - report `changed`
//!                               ^
//!                               │ one call per text node
//!                     TreeWalker::walk (walker.rs)
//!                       - document order, explicit stack
//!                       - prune opaque tags
//!                       - skip / mark nodes in VisitedSet (visited.rs)
//!                               │
//!                               v
//!                         PassMetrics (metrics.rs)
//! ```
//!
//! ## Responsibilities by module
//!
//! - `compiled_rules.rs`: per-rule metadata (lowercased term) derived once.
//! - `trigger.rs`: the cheap containment pre-check.
//! - `rewriter.rs`: the text-level contract `rewrite(text) -> Rewrite`.
//! - `walker.rs`: the tree-level contract `walk(root) -> PassMetrics`.
//! - `visited.rs`: weak, identity-keyed processed-node tracking.
//! - `metrics.rs`: counters and timing for one pass.

#[path = "engine/compiled_rules.rs"]
mod compiled_rules;
#[path = "engine/metrics.rs"]
mod metrics;
#[path = "engine/rewriter.rs"]
mod rewriter;
#[path = "engine/trigger.rs"]
mod trigger;
#[path = "engine/visited.rs"]
mod visited;
#[path = "engine/walker.rs"]
mod walker;

pub use compiled_rules::CompiledRules;
pub use metrics::PassMetrics;
pub use rewriter::Rewriter;
pub use trigger::TriggerInfo;
pub use visited::VisitedSet;
pub use walker::{OpaqueTags, TreeWalker};
