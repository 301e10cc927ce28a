#[macro_export]
macro_rules! regex {
    ($pat:expr) => {{
        static RE: once_cell::sync::Lazy<regex::Regex> =
            once_cell::sync::Lazy::new(|| regex::Regex::new($pat).unwrap());
        &*RE
    }};
}

/// Whole-word, case-insensitive matcher for a literal vocabulary term.
///
/// Boundaries are ASCII: a non-ASCII letter right after the term ("Israelé")
/// still ends the word.
#[macro_export]
macro_rules! word {
    ($term:literal) => {
        $crate::regex!(concat!(r"(?i)(?-u:\b)", $term, r"(?-u:\b)"))
    };
}

#[macro_export]
macro_rules! rule {
    (
        name: $name:expr,
        term: $term:literal,
        replacement: $replacement:expr
        $(,)?
    ) => {{
        $crate::RewriteRule { name: $name, term: $term, matcher: $crate::word!($term), replacement: $replacement }
    }};
}
