//! Rule compilation.
//!
//! The *static* side of the engine: structures derived once from the rule
//! list so that the per-text path only does lookups.
//!
//! ## Invariants
//!
//! - `RuleId` is an index into `CompiledRules::rules` and
//!   `CompiledRules::metas`. Those vectors must stay aligned.
//! - `RuleMeta::needle` is always lowercase; the trigger scan compares it
//!   against a lowercased copy of the input.

use crate::RewriteRule;

/// Rule identifier (index into the rules vector).
pub type RuleId = usize;

/// Metadata derived from a rule for the pre-check.
#[derive(Clone, Debug)]
pub struct RuleMeta {
    pub needle: String,
}

/// Pre-compiled rule set.
#[derive(Debug)]
pub struct CompiledRules<'a> {
    pub rules: Vec<&'a RewriteRule>,
    pub metas: Vec<RuleMeta>,
}

impl<'a> CompiledRules<'a> {
    /// Index `rules`, keeping their order.
    ///
    /// Matchers are `&'static` already, so nothing is compiled here beyond
    /// the lowercased needles.
    pub fn new(rules: &'a [RewriteRule]) -> Self {
        let rules: Vec<&RewriteRule> = rules.iter().collect();
        let metas = rules.iter().map(|r| RuleMeta { needle: r.term.to_lowercase() }).collect();

        CompiledRules { rules, metas }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn needles_are_lowercased_and_aligned() {
        let rules = vec![rule! { name: "upper", term: "Israel", replacement: "x" }];
        let compiled = CompiledRules::new(&rules);

        assert_eq!(compiled.len(), 1);
        assert_eq!(compiled.metas[0].needle, "israel");
        assert_eq!(compiled.rules[0].name, "upper");
    }
}
