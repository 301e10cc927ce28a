use crate::engine::{CompiledRules, OpaqueTags, Rewriter, TriggerInfo};
use crate::host::ObserveOptions;
use crate::{Rewrite, RewriteRule};
use once_cell::sync::Lazy;
use std::time::{Duration, Instant};

static DEFAULT_RULES: Lazy<Vec<RewriteRule>> = Lazy::new(crate::rules::vocabulary::rules::get);
static DEFAULT_REWRITER: Lazy<Rewriter<'static>> = Lazy::new(|| Rewriter::new(CompiledRules::new(&DEFAULT_RULES)));

const DEFAULT_THROTTLE_INTERVAL: Duration = Duration::from_millis(500);
const DEFAULT_STARTUP_GRACE: Duration = Duration::from_millis(100);

/// Options that affect scheduling and traversal.
#[derive(Debug, Clone)]
pub struct Options {
    /// Minimum time between two admitted change-triggered passes.
    pub throttle_interval: Duration,
    /// Delay before the startup state is applied on an already loaded document.
    pub startup_grace: Duration,
    /// Elements whose subtrees are never inspected.
    pub opaque_tags: OpaqueTags,
    /// Which changes the subscriber listens for.
    pub observe: ObserveOptions,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            throttle_interval: DEFAULT_THROTTLE_INTERVAL,
            startup_grace: DEFAULT_STARTUP_GRACE,
            opaque_tags: OpaqueTags::default(),
            observe: ObserveOptions::default(),
        }
    }
}

/// How often one rule matched during [`rewrite_verbose`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleHit {
    pub rule: String,
    pub matches: usize,
}

/// Result from [`rewrite_verbose`].
#[derive(Debug, Clone)]
pub struct RewriteReport {
    /// The input text.
    pub input: String,
    /// The rewritten text (equal to `input` when nothing matched).
    pub output: String,
    pub changed: bool,
    /// Rules that passed the pre-check, with their whole-word match counts.
    pub hits: Vec<RuleHit>,
    pub elapsed: Duration,
}

/// The built-in rewrite vocabulary.
pub fn default_rules() -> &'static [RewriteRule] {
    &DEFAULT_RULES
}

pub(crate) fn default_rewriter() -> &'static Rewriter<'static> {
    &DEFAULT_REWRITER
}

/// Rewrite `text` with the built-in vocabulary.
///
/// # Example
/// ```
/// use wordswap::rewrite;
///
/// let out = rewrite("ISRAEL wins");
/// assert!(out.changed);
/// assert_eq!(out.text, "💩 wins");
/// ```
pub fn rewrite(text: &str) -> Rewrite<'_> {
    DEFAULT_REWRITER.rewrite(text)
}

/// Rewrite `text` and report which rules fired.
///
/// This is for debugging and the CLI; [`rewrite`] does not count matches.
pub fn rewrite_verbose(text: &str) -> RewriteReport {
    let started = Instant::now();
    let compiled = DEFAULT_REWRITER.compiled();

    let hits = TriggerInfo::scan(text, compiled)
        .hits
        .into_iter()
        .map(|id| {
            let rule = compiled.rules[id];
            RuleHit { rule: rule.name.to_string(), matches: rule.matcher.find_iter(text).count() }
        })
        .collect();
    let out = DEFAULT_REWRITER.rewrite(text);

    RewriteReport {
        input: text.to_string(),
        output: out.text.into_owned(),
        changed: out.changed,
        hits,
        elapsed: started.elapsed(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewrite_uses_the_default_vocabulary() {
        let out = rewrite("Mr. Netanyahu spoke");
        assert!(out.changed);
        assert_eq!(out.text, "Mr. 🤡 spoke");
    }

    #[test]
    fn verbose_reports_prechecked_rules_with_counts() {
        let res = rewrite_verbose("Israel, israel and the Israeli press");

        assert!(res.changed);
        assert_eq!(res.output, "💩, 💩 and the Israeli press");
        assert_eq!(res.hits, vec![RuleHit { rule: "israel".to_string(), matches: 2 }]);
    }

    #[test]
    fn verbose_on_plain_text_has_no_hits() {
        let res = rewrite_verbose("quiet afternoon");

        assert!(!res.changed);
        assert_eq!(res.output, res.input);
        assert!(res.hits.is_empty());
    }

    #[test]
    fn default_options_match_the_documented_values() {
        let opts = Options::default();

        assert_eq!(opts.throttle_interval, Duration::from_millis(500));
        assert_eq!(opts.startup_grace, Duration::from_millis(100));
        assert!(opts.opaque_tags.contains("SCRIPT"));
        assert_eq!(opts.observe, ObserveOptions::all());
    }
}
