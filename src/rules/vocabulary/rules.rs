use crate::RewriteRule;

/// The fixed rewrite vocabulary.
///
/// Terms are disjoint words, so order only matters for reporting. Every
/// replacement is free of the terms themselves, which keeps a second pass over
/// rewritten text a no-op.
pub fn get() -> Vec<RewriteRule> {
    vec![
        rule! {
            name: "israel",
            term: "israel",
            replacement: "💩",
        },
        rule! {
            name: "netanyahu",
            term: "netanyahu",
            replacement: "🤡",
        },
    ]
}
