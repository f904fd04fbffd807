//! Rewriting inside string and documentation literal content.
//!
//! A literal's inner text gets the same renaming as live code plus a
//! prose-level cleanup, without ever touching the delimiters:
//!   1. maximal identifier-class runs go through the renamer;
//!   2. standalone control keywords followed by horizontal whitespace
//!      are elided (line starts or after a non-word character);
//!   3. the ``:ref:`async-name``` cross-reference convention is
//!      rewritten by its own literal substring rule; the hyphenated
//!      marker is a reference-syntax convention, not an identifier.
//!
//! The run scanner is a deliberately separate mini-lexer so boundary
//! cases (length-one runs, runs at either end) stay unit-testable.

use std::sync::LazyLock;

use regex::Regex;

use crate::core::rename::Renamer;

/// Keyword plus required trailing whitespace, anchored at line start or
/// after a non-word character. Horizontal whitespace only: a keyword at
/// the end of a line (or of the content) is kept, see module tests.
static KEYWORD_ELISION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)(^|[^\w])(?:async|await)[ \t]+").expect("keyword elision pattern")
});

/// Cross-reference marker carrying the hyphenated form of the marker
/// word, e.g. ``:ref:`async-save``` → ``:ref:`save```.
const REF_MARKER: &str = ":ref:`async-";
const REF_MARKER_REPLACEMENT: &str = ":ref:`";

fn is_ident_char(c: char) -> bool {
    c == '_' || c.is_alphanumeric()
}

/// Rewrite the inner content of a literal (delimiters already removed).
pub fn rewrite_content(content: &str, renamer: &Renamer) -> String {
    let renamed = rewrite_ident_runs(content, renamer);
    let elided = KEYWORD_ELISION.replace_all(&renamed, "$1");
    elided.replace(REF_MARKER, REF_MARKER_REPLACEMENT)
}

/// Rewrite a complete string literal token, prefix and quotes included.
pub fn rewrite_string_token(text: &str, renamer: &Renamer) -> String {
    let prefix_len = leading_alpha_len(text);
    let (prefix, rest) = text.split_at(prefix_len);

    // Single-quoted (delimiter length 1) vs triple-quoted (length 3):
    // first two delimiter characters identical and longer than a quoted
    // empty string.
    let bytes = rest.as_bytes();
    let delim_len = if rest.len() > 2 && bytes[0] == bytes[1] {
        3
    } else {
        1
    };

    let open = &rest[..delim_len];
    let inner = &rest[delim_len..rest.len() - delim_len];
    let rewritten = rewrite_content(inner, renamer);

    format!("{prefix}{open}{rewritten}{open}")
}

/// Rewrite one literal-text segment of an interpolated literal.
/// Escaped braces are ordinary non-identifier characters and survive
/// as written.
pub fn rewrite_segment(text: &str, renamer: &Renamer) -> String {
    rewrite_content(text, renamer)
}

/// Count of leading ASCII alphabetic chars (the literal's prefix).
fn leading_alpha_len(s: &str) -> usize {
    s.bytes().take_while(u8::is_ascii_alphabetic).count()
}

/// Maximal identifier-class runs through the renamer; every other
/// character is copied verbatim.
fn rewrite_ident_runs(content: &str, renamer: &Renamer) -> String {
    let mut out = String::with_capacity(content.len());
    let mut rest = content;

    while !rest.is_empty() {
        match rest.char_indices().find(|(_, c)| is_ident_char(*c)) {
            None => {
                out.push_str(rest);
                break;
            }
            Some((start, _)) => {
                out.push_str(&rest[..start]);
                let tail = &rest[start..];
                let end = tail
                    .char_indices()
                    .find(|(_, c)| !is_ident_char(*c))
                    .map(|(i, _)| i)
                    .unwrap_or(tail.len());
                out.push_str(&renamer.rename(&tail[..end]));
                rest = &tail[end..];
            }
        }
    }

    out
}
