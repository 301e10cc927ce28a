//! Text-level rewriting.

use super::compiled_rules::CompiledRules;
use super::trigger::TriggerInfo;
use crate::Rewrite;
use regex::NoExpand;
use std::borrow::Cow;

/// Applies a compiled rule set to individual text values.
#[derive(Debug)]
pub struct Rewriter<'a> {
    compiled: CompiledRules<'a>,
}

impl<'a> Rewriter<'a> {
    pub fn new(compiled: CompiledRules<'a>) -> Self {
        Rewriter { compiled }
    }

    pub fn compiled(&self) -> &CompiledRules<'a> {
        &self.compiled
    }

    /// Rewrite `text` with every triggered rule, in rule order.
    ///
    /// Returns the borrowed input and `changed == false` when nothing
    /// matched; callers rely on that to avoid writing back identical content.
    pub fn rewrite<'t>(&self, text: &'t str) -> Rewrite<'t> {
        let trigger = TriggerInfo::scan(text, &self.compiled);
        if trigger.is_empty() {
            return Rewrite::unchanged(text);
        }

        let mut current: Cow<'t, str> = Cow::Borrowed(text);
        for id in trigger.hits {
            let rule = self.compiled.rules[id];
            let replaced = match rule.matcher.replace_all(&current, NoExpand(rule.replacement)) {
                Cow::Borrowed(_) => None,
                Cow::Owned(s) => Some(s),
            };
            if let Some(s) = replaced {
                current = Cow::Owned(s);
            }
        }

        if current == text {
            return Rewrite::unchanged(text);
        }
        Rewrite { text: current, changed: true }
    }
}
