//! Trigger scanning (input pre-classification).
//!
//! Most text in a document contains none of the vocabulary. Before any regex
//! runs, the input is lowercased once and tested for plain substring
//! containment of every rule's needle. Only rules that pass are handed to the
//! matcher.
//!
//! ## Design notes
//!
//! - This is a *heuristic* scan. False positives are expected ("israeli"
//!   contains "israel"); the word-boundary matcher rejects them afterwards.
//! - The scan is a plain lowercase-and-contains check. Case folds that only
//!   the `(?i)` matcher knows about (the long s in "iſrael") do not pass it,
//!   so such text is left alone.

use super::compiled_rules::{CompiledRules, RuleId};

/// Rules whose needle occurs in the scanned input, in rule order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TriggerInfo {
    pub hits: Vec<RuleId>,
}

impl TriggerInfo {
    /// Scan `input` against every rule of `compiled`.
    pub fn scan(input: &str, compiled: &CompiledRules<'_>) -> Self {
        if input.is_empty() {
            return TriggerInfo::default();
        }

        let lower = input.to_lowercase();
        let hits = compiled
            .metas
            .iter()
            .enumerate()
            .filter(|(_, meta)| lower.contains(meta.needle.as_str()))
            .map(|(id, _)| id)
            .collect();

        TriggerInfo { hits }
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::vocabulary;

    #[test]
    fn scan_reports_rules_in_order() {
        let rules = vocabulary::rules::get();
        let compiled = CompiledRules::new(&rules);

        assert_eq!(TriggerInfo::scan("NETANYAHU met Israel", &compiled).hits, vec![0, 1]);
        assert_eq!(TriggerInfo::scan("netanyahu", &compiled).hits, vec![1]);
    }

    #[test]
    fn scan_accepts_partial_words() {
        let rules = vocabulary::rules::get();
        let compiled = CompiledRules::new(&rules);

        // Rejected later by the matcher, not here.
        assert_eq!(TriggerInfo::scan("Israeli", &compiled).hits, vec![0]);
    }

    #[test]
    fn scan_of_plain_text_is_empty() {
        let rules = vocabulary::rules::get();
        let compiled = CompiledRules::new(&rules);

        assert!(TriggerInfo::scan("nothing to see here", &compiled).is_empty());
        assert!(TriggerInfo::scan("", &compiled).is_empty());
    }

    #[test]
    fn scan_does_not_fold_the_long_s() {
        let rules = vocabulary::rules::get();
        let compiled = CompiledRules::new(&rules);

        assert!(rules[0].matcher.is_match("iſrael"));
        assert!(TriggerInfo::scan("iſrael", &compiled).is_empty());
    }
}
