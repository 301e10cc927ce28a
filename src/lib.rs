extern crate self as wordswap;

use regex::Regex;
use std::borrow::Cow;

#[macro_use]
mod macros;
mod api;
mod coalescer;
mod control;
mod engine;
mod error;
pub mod host;
mod lifecycle;
mod rules;
mod subscriber;

pub use api::{Options, RewriteReport, RuleHit, default_rules, rewrite, rewrite_verbose};
pub use coalescer::{PassGuard, ProcessingGate, defer, throttle};
pub use control::{Ack, ControlMessage, ControlSurface, ENABLED_KEY, JsonFilePreferences, MemoryPreferences, PreferenceStore};
pub use engine::{CompiledRules, OpaqueTags, PassMetrics, Rewriter, TreeWalker, TriggerInfo, VisitedSet};
pub use error::Error;
pub use lifecycle::{Controller, ControllerStats, State};

// --- Rule data --------------------------------------------------------------

/// One entry of the rewrite vocabulary.
///
/// `matcher` is a case-insensitive, word-boundary anchored regex over `term`
/// (built by the `rule!` macro in `src/macros.rs`). `term` is kept lowercased
/// so the trigger scan can do a plain substring test before the regex runs.
#[derive(Debug)]
pub struct RewriteRule {
    pub name: &'static str,
    pub term: &'static str,
    pub matcher: &'static Regex,
    /// Inserted literally; `$` is not a group reference here.
    pub replacement: &'static str,
}

/// Result of running the rule set over one text value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rewrite<'t> {
    /// The rewritten text, or the borrowed input when nothing matched.
    pub text: Cow<'t, str>,
    pub changed: bool,
}

impl<'t> Rewrite<'t> {
    pub(crate) fn unchanged(text: &'t str) -> Self {
        Rewrite { text: Cow::Borrowed(text), changed: false }
    }
}
