//! Identifier escaping for labels, relationship types, and property names.
//!
//! Cypher does not allow identifiers as bound parameters, so any identifier
//! that may originate from user, context, or JWT input goes through backtick
//! escaping instead. The normalization step treats unicode-escaped backticks
//! (the six-character sequence backslash-u-0060) the same as literal ones so that
//! pre-escaped input cannot smuggle an identifier break-out past a naive
//! replace.

/// True when the identifier is safe to render without backticks.
pub fn is_safe_identifier(ident: &str) -> bool {
    let mut chars = ident.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Normalizes ``` escape sequences into literal backticks.
///
/// Handles upper/lower case hex digits and an optional doubled backslash in
/// front of the sequence; every such sequence counts as one literal backtick.
fn normalize_backticks(ident: &str) -> String {
    let mut out = String::with_capacity(ident.len());
    let bytes = ident.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        let rest = &ident[i..];
        if let Some(skip) = unicode_backtick_len(rest) {
            out.push('`');
            i += skip;
        } else {
            let c = rest.chars().next().expect("non-empty remainder");
            out.push(c);
            i += c.len_utf8();
        }
    }
    out
}

/// Length of a leading escaped-backtick sequence, if any.
fn unicode_backtick_len(text: &str) -> Option<usize> {
    for prefix in ["\\u0060", "\\U0060", "\\\\u0060", "\\\\U0060"] {
        if let Some(rest) = text.strip_prefix(prefix) {
            let _ = rest;
            return Some(prefix.len());
        }
    }
    None
}

/// Escapes the inner text of an identifier by doubling every backtick.
///
/// Unicode-escaped backticks are normalized first so the result always
/// reflects "a literal backtick appears N times" regardless of how the
/// input spelled them.
pub fn escape_inner(ident: &str) -> String {
    normalize_backticks(ident).replace('`', "``")
}

/// Renders an identifier, wrapping it in backticks unless it is a plain
/// ASCII identifier that needs no quoting.
pub fn escape_identifier(ident: &str) -> String {
    if is_safe_identifier(ident) {
        ident.to_owned()
    } else {
        format!("`{}`", escape_inner(ident))
    }
}

/// Reverses [`escape_inner`]: collapses doubled backticks back to singles.
pub fn unescape_inner(escaped: &str) -> String {
    let mut out = String::with_capacity(escaped.len());
    let mut chars = escaped.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '`' && chars.peek() == Some(&'`') {
            chars.next();
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn plain_identifiers_are_untouched() {
        assert_eq!(escape_identifier("Movie"), "Movie");
        assert_eq!(escape_identifier("_private"), "_private");
        assert_eq!(escape_identifier("ACTED_IN"), "ACTED_IN");
    }

    #[test]
    fn unusual_identifiers_are_quoted() {
        assert_eq!(escape_identifier("Some Label"), "`Some Label`");
        assert_eq!(escape_identifier("1Digit"), "`1Digit`");
        assert_eq!(escape_identifier("uhyvää"), "`uhyvää`");
        assert_eq!(escape_identifier(""), "``");
    }

    #[test]
    fn backticks_are_doubled() {
        assert_eq!(escape_inner("`"), "``");
        assert_eq!(escape_inner("Foo`bar"), "Foo``bar");
        assert_eq!(escape_identifier("Foo`bar"), "`Foo``bar`");
        assert_eq!(escape_inner("``"), "````");
    }

    #[test]
    fn unicode_escapes_count_as_literal_backticks() {
        assert_eq!(escape_inner("\\u0060"), "``");
        assert_eq!(escape_inner("\\U0060"), "``");
        assert_eq!(escape_inner("\\\\u0060"), "``");
        assert_eq!(escape_inner("Movie\\u0060) MATCH"), "Movie``) MATCH");
    }

    #[test]
    fn hostile_label_cannot_break_out() {
        // A label crafted to close the identifier and start a new clause.
        let label = "Movie`) MATCH (n) DETACH DELETE n //";
        let escaped = escape_identifier(label);
        assert_eq!(escaped, "`Movie``) MATCH (n) DETACH DELETE n //`");
        // The only unescaped backticks are the outer delimiters.
        let inner = &escaped[1..escaped.len() - 1];
        let mut run = 0usize;
        for c in inner.chars() {
            if c == '`' {
                run += 1;
            } else {
                assert_eq!(run % 2, 0, "odd backtick run inside identifier");
                run = 0;
            }
        }
        assert_eq!(run % 2, 0);
    }

    #[test]
    fn unescape_recovers_literal_backtick_count() {
        for input in ["`", "Foo`bar", "``", "a`b`c", "\\u0060tail"] {
            let normalized = super::normalize_backticks(input);
            assert_eq!(unescape_inner(&escape_inner(input)), normalized);
        }
    }

    proptest! {
        #[test]
        fn escape_roundtrip_preserves_backtick_count(input in "\\PC*") {
            let normalized = super::normalize_backticks(&input);
            let escaped = escape_inner(&input);
            let expected = normalized.matches('`').count();
            prop_assert_eq!(escaped.matches('`').count(), expected * 2);
            prop_assert_eq!(unescape_inner(&escaped), normalized);
        }

        #[test]
        fn escaped_inner_never_has_odd_backtick_runs(input in "\\PC*") {
            let escaped = escape_inner(&input);
            let mut run = 0usize;
            for c in escaped.chars() {
                if c == '`' {
                    run += 1;
                } else {
                    prop_assert_eq!(run % 2, 0);
                    run = 0;
                }
            }
            prop_assert_eq!(run % 2, 0);
        }
    }
}
