//! Identifier renaming for the async→sync derivation.
//!
//! Lookup order is load-bearing: the exact replacement table is always
//! consulted before the marker-prefix rules, and the prefix rules run in
//! fixed priority order with first-match-wins. The rules are not
//! mutually exclusive over arbitrary strings, so they are kept as an
//! ordered list rather than any unordered dispatch.

use std::borrow::Cow;

use indexmap::IndexMap;

/// Capitalized marker word identifying suspending-variant type names.
pub const MARKER: &str = "Async";
/// Lower-case marker prefix for function/variable/method names.
pub const MARKER_LOWER: &str = "async";

/// One prefix rule: returns the rewritten name when it applies.
type PrefixRule = fn(&str) -> Option<String>;

/// Ordered rule list; earlier rules win.
const PREFIX_RULES: &[PrefixRule] = &[marker_type, marker_private_type, marker_call];

/// `AsyncNode` → `Node`. The marker must be followed by an upper-case
/// letter; `Asyncx` is a deliberate non-match.
fn marker_type(name: &str) -> Option<String> {
    name.strip_prefix(MARKER)
        .filter(|rest| rest.starts_with(char::is_uppercase))
        .map(str::to_string)
}

/// `_AsyncNode` → `_Node`; the leading underscore survives.
fn marker_private_type(name: &str) -> Option<String> {
    name.strip_prefix('_')
        .and_then(marker_type)
        .map(|rest| format!("_{rest}"))
}

/// `async_save` → `save`. Requires the underscore right after the
/// marker; `asyncthing` is a deliberate non-match.
fn marker_call(name: &str) -> Option<String> {
    name.strip_prefix(MARKER_LOWER)
        .and_then(|rest| rest.strip_prefix('_'))
        .filter(|rest| !rest.is_empty())
        .map(str::to_string)
}

/// Replacements the prefix rules cannot express: the dunder protocol
/// pairs, async-generator methods, and stdlib names where the marker
/// sits mid-word.
pub fn default_replacements() -> IndexMap<String, String> {
    [
        ("__aenter__", "__enter__"),
        ("__aexit__", "__exit__"),
        ("__aiter__", "__iter__"),
        ("__anext__", "__next__"),
        ("aiter", "iter"),
        ("anext", "next"),
        ("aclose", "close"),
        ("asend", "send"),
        ("athrow", "throw"),
        ("StopAsyncIteration", "StopIteration"),
        ("asynccontextmanager", "contextmanager"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

/// Pure, total identifier mapping: exact table first, then the prefix
/// rules, else identity.
#[derive(Debug, Clone)]
pub struct Renamer {
    table: IndexMap<String, String>,
}

impl Renamer {
    /// Build from an exact-match table (consulted before the rules).
    pub fn new(table: IndexMap<String, String>) -> Self {
        Self { table }
    }

    /// Built-in table merged under per-rule entries; the caller's
    /// entries win on key collision.
    pub fn with_defaults(extra: &IndexMap<String, String>) -> Self {
        let mut table = default_replacements();
        for (k, v) in extra {
            table.insert(k.clone(), v.clone());
        }
        Self { table }
    }

    pub fn rename<'a>(&self, name: &'a str) -> Cow<'a, str> {
        if let Some(hit) = self.table.get(name) {
            return Cow::Owned(hit.clone());
        }
        for rule in PREFIX_RULES {
            if let Some(renamed) = rule(name) {
                return Cow::Owned(renamed);
            }
        }
        Cow::Borrowed(name)
    }
}

impl Default for Renamer {
    fn default() -> Self {
        Self::new(default_replacements())
    }
}
