//! Token-stream rewriting for one source file.
//!
//! Walks the positional token stream and applies, in one pass:
//! keyword elision with whitespace carry, identifier renaming, and
//! literal-content rewriting. Everything else is re-emitted with its
//! original inter-token whitespace, so untouched code is reproduced
//! byte-for-byte.

use std::path::{Path, PathBuf};

use crate::core::lexer::{LexError, TokenKind, detokenize, leading_whitespace, tokenize};
use crate::core::rename::Renamer;
use crate::core::strings::{rewrite_segment, rewrite_string_token};

/// The two suspension-control keywords removed from the stream.
const ELIDED_KEYWORDS: [&str; 2] = ["async", "await"];

/// Whitespace-carry state for keyword elision. At most one pending
/// leading-whitespace value exists at a time; consecutive suppressed
/// keywords keep only the first captured value.
enum Carry {
    Normal,
    Pending(String),
}

/// One paired (source tree, destination tree) derivation with its
/// identifier table.
#[derive(Debug, Clone)]
pub struct Rule {
    pub source_root: PathBuf,
    pub dest_root: PathBuf,
    pub renamer: Renamer,
}

impl Rule {
    /// Map a path under the source root to its destination-tree twin.
    /// Returns None for paths outside the source root.
    pub fn dest_path(&self, source: &Path) -> Option<PathBuf> {
        source
            .strip_prefix(&self.source_root)
            .ok()
            .map(|rel| self.dest_root.join(rel))
    }

    pub fn rewrite(&self, src: &str) -> Result<String, LexError> {
        rewrite_source(src, &self.renamer)
    }
}

/// Lex, rewrite, and detokenize one file's text.
pub fn rewrite_source(src: &str, renamer: &Renamer) -> Result<String, LexError> {
    let tokens = tokenize(src)?;
    let leads = leading_whitespace(&tokens);

    let mut parts: Vec<(String, String)> = Vec::with_capacity(tokens.len());
    let mut carry = Carry::Normal;

    for (tok, lead) in tokens.iter().zip(leads) {
        if tok.kind == TokenKind::Ident && ELIDED_KEYWORDS.contains(&tok.text.as_str()) {
            // Suppress the keyword; its leading whitespace transfers to
            // the next surviving token.
            if let Carry::Normal = carry {
                carry = Carry::Pending(lead);
            }
            continue;
        }

        let lead = match std::mem::replace(&mut carry, Carry::Normal) {
            Carry::Pending(first) => first,
            Carry::Normal => lead,
        };

        let text = match tok.kind {
            TokenKind::Ident => renamer.rename(&tok.text).into_owned(),
            TokenKind::Str => rewrite_string_token(&tok.text, renamer),
            TokenKind::StringSegment => rewrite_segment(&tok.text, renamer),
            _ => tok.text.clone(),
        };

        parts.push((lead, text));
    }

    Ok(detokenize(parts))
}
