//! Positional lexer and detokenizer for Python sources.
//!
//! Goals:
//!   - Every token carries exact start/end coordinates plus the text of
//!     the physical line it starts on, so inter-token whitespace can be
//!     re-sliced from the original source (tabs survive).
//!   - `detokenize` over the unmodified stream reproduces the input
//!     byte-for-byte; the rewrite pass only ever swaps token text.
//!   - Interpolated literals are split into literal segments and code
//!     tokens so each side can be rewritten with the right rules.
//!
//! Notes:
//!   - Columns are byte offsets within the line, lines are 1-based.
//!   - Physical newlines outside literals become `Newline` tokens and
//!     backslash continuations become synthesized `Continuation`
//!     tokens, so whitespace gaps never span a line boundary.
//!   - Token granularity for numbers and operators is coarser than
//!     CPython's tokenizer; only identifiers and literals need to be
//!     classified exactly, everything else round-trips as-is.

use thiserror::Error;

use crate::infra::line_index::NewlineIndex;

/// Source coordinate: 1-based line, 0-based byte column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pos {
    pub line: usize,
    pub col: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Name or keyword.
    Ident,
    /// Complete string literal including prefix and quotes.
    Str,
    /// Prefix and opening quote of an interpolated literal.
    FStringStart,
    /// Literal text inside an interpolated literal (escaped braces kept).
    StringSegment,
    /// Closing quote of an interpolated literal.
    FStringEnd,
    /// Physical line break.
    Newline,
    /// Synthesized backslash-newline placeholder for folded logical lines.
    Continuation,
    Comment,
    Number,
    /// Single operator or punctuation character.
    Op,
    /// Zero-width end-of-input marker; anchors trailing whitespace.
    EndMarker,
}

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub start: Pos,
    pub end: Pos,
    /// Visible text of the physical line the token starts on
    /// (line terminator excluded).
    pub source_line: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LexError {
    #[error("unterminated string literal at line {line}, column {col}")]
    UnterminatedString { line: usize, col: usize },
    #[error("unterminated interpolation at line {line}, column {col}")]
    UnterminatedInterpolation { line: usize, col: usize },
}

/// Lex `src` into an ordered token stream.
pub fn tokenize(src: &str) -> Result<Vec<Token>, LexError> {
    Lexer::new(src).run()
}

/// Exact whitespace preceding each token, in stream order.
///
/// Same line: slice between the previous token's end column and this
/// token's start column. After a line boundary, the newline/continuation
/// token re-anchored columns at zero, so the slice runs from the start
/// of the token's own line.
pub fn leading_whitespace(tokens: &[Token]) -> Vec<String> {
    let mut out = Vec::with_capacity(tokens.len());
    let mut prev = Pos { line: 1, col: 0 };

    for tok in tokens {
        let lead = if tok.start.line == prev.line {
            tok.source_line
                .get(prev.col..tok.start.col)
                .unwrap_or("")
                .to_string()
        } else {
            tok.source_line
                .get(..tok.start.col)
                .unwrap_or("")
                .to_string()
        };
        prev = tok.end;
        out.push(lead);
    }

    out
}

/// Inverse of the lexer: concatenate (leading-space, token-text) pairs.
pub fn detokenize<I, A, B>(parts: I) -> String
where
    I: IntoIterator<Item = (A, B)>,
    A: AsRef<str>,
    B: AsRef<str>,
{
    let mut out = String::new();
    for (lead, text) in parts {
        out.push_str(lead.as_ref());
        out.push_str(text.as_ref());
    }
    out
}

/// Where a literal segment scan stopped.
enum SegEnd {
    /// Closing quote run reached.
    Quote,
    /// Unescaped `{` opens an interpolation.
    Brace,
}

struct Lexer<'a> {
    src: &'a str,
    bytes: &'a [u8],
    index: NewlineIndex,
    pos: usize,
    line: usize,
    line_start: usize,
    tokens: Vec<Token>,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            bytes: src.as_bytes(),
            index: NewlineIndex::build(src.as_bytes()),
            pos: 0,
            line: 1,
            line_start: 0,
            tokens: Vec::with_capacity(src.len() / 6),
        }
    }

    fn run(mut self) -> Result<Vec<Token>, LexError> {
        while self.pos < self.bytes.len() {
            let b = self.bytes[self.pos];
            match b {
                b' ' | b'\t' => self.pos += 1,
                b'\n' => self.lex_newline(),
                b'\r' if self.bytes.get(self.pos + 1) == Some(&b'\n') => self.lex_newline(),
                b'\\' if self.line_break_follows(self.pos + 1) => self.lex_continuation(),
                b'#' => self.lex_comment(),
                b'\'' | b'"' => self.lex_string(self.pos, self.pos)?,
                b'0'..=b'9' => self.lex_number(),
                b'.' if matches!(self.bytes.get(self.pos + 1).copied(), Some(b'0'..=b'9')) => {
                    self.lex_number()
                }
                _ => {
                    let ch = self.char_here();
                    if ch == '_' || ch.is_alphabetic() {
                        self.lex_name()?;
                    } else {
                        self.lex_op();
                    }
                }
            }
        }

        // Anchor any trailing whitespace that has no token to attach to.
        let at = self.here();
        let source_line = self.line_text(self.line);
        self.tokens.push(Token {
            kind: TokenKind::EndMarker,
            text: String::new(),
            start: at,
            end: at,
            source_line,
        });

        Ok(self.tokens)
    }

    fn here(&self) -> Pos {
        Pos {
            line: self.line,
            col: self.pos - self.line_start,
        }
    }

    fn char_here(&self) -> char {
        self.src[self.pos..].chars().next().unwrap_or('\0')
    }

    fn line_text(&self, line1: usize) -> String {
        self.index
            .line_span(line1, self.bytes)
            .map(|(s, e)| self.src[s..e].to_string())
            .unwrap_or_default()
    }

    fn line_break_follows(&self, at: usize) -> bool {
        match self.bytes.get(at) {
            Some(b'\n') => true,
            Some(b'\r') => self.bytes.get(at + 1) == Some(&b'\n'),
            _ => false,
        }
    }

    /// Advance one byte, maintaining line bookkeeping across '\n'.
    fn advance(&mut self) {
        let b = self.bytes[self.pos];
        self.pos += 1;
        if b == b'\n' {
            self.line += 1;
            self.line_start = self.pos;
        }
    }

    /// Consume a backslash escape, treating CRLF as a single unit.
    fn consume_escape(&mut self) {
        self.pos += 1; // backslash
        if self.pos < self.bytes.len() {
            if self.bytes[self.pos] == b'\r' && self.bytes.get(self.pos + 1) == Some(&b'\n') {
                self.pos += 1;
            }
            self.advance();
        }
    }

    /// Finish a token that started at `start`; end is the current position.
    fn push_at(&mut self, kind: TokenKind, start: Pos, text: String) {
        let end = self.here();
        let source_line = self.line_text(start.line);
        self.tokens.push(Token {
            kind,
            text,
            start,
            end,
            source_line,
        });
    }

    /// Single ASCII character token at the current position.
    fn push_single(&mut self, kind: TokenKind) {
        let start = self.here();
        let text = self.src[self.pos..self.pos + 1].to_string();
        self.pos += 1;
        self.push_at(kind, start, text);
    }

    fn lex_newline(&mut self) {
        let start = self.here();
        let source_line = self.line_text(self.line);

        let mut text = String::new();
        if self.bytes[self.pos] == b'\r' {
            text.push('\r');
            self.pos += 1;
        }
        text.push('\n');
        self.pos += 1;
        self.line += 1;
        self.line_start = self.pos;

        self.tokens.push(Token {
            kind: TokenKind::Newline,
            text,
            start,
            end: Pos {
                line: self.line,
                col: 0,
            },
            source_line,
        });
    }

    /// Backslash-newline: a logical line continues across a physical
    /// break with no token of its own, so synthesize one carrying the
    /// exact source slice to keep column math line-local.
    fn lex_continuation(&mut self) {
        let start = self.here();
        let source_line = self.line_text(self.line);

        let mut text = String::from("\\");
        self.pos += 1;
        if self.bytes[self.pos] == b'\r' {
            text.push('\r');
            self.pos += 1;
        }
        text.push('\n');
        self.pos += 1;
        self.line += 1;
        self.line_start = self.pos;

        self.tokens.push(Token {
            kind: TokenKind::Continuation,
            text,
            start,
            end: Pos {
                line: self.line,
                col: 0,
            },
            source_line,
        });
    }

    fn lex_comment(&mut self) {
        let start = self.here();
        let end = self
            .index
            .end_byte_of_line(self.line, self.bytes)
            .unwrap_or(self.bytes.len());
        let text = self.src[self.pos..end].to_string();
        self.pos = end;
        self.push_at(TokenKind::Comment, start, text);
    }

    fn lex_number(&mut self) {
        let start = self.here();
        let begin = self.pos;

        while self.pos < self.bytes.len() {
            let b = self.bytes[self.pos];
            if b.is_ascii_alphanumeric() || b == b'_' || b == b'.' {
                self.pos += 1;
            } else if (b == b'+' || b == b'-')
                && matches!(self.bytes[self.pos - 1], b'e' | b'E')
                && matches!(self.bytes.get(self.pos + 1).copied(), Some(b'0'..=b'9'))
            {
                // Exponent sign.
                self.pos += 1;
            } else {
                break;
            }
        }

        let text = self.src[begin..self.pos].to_string();
        self.push_at(TokenKind::Number, start, text);
    }

    fn lex_op(&mut self) {
        let start = self.here();
        let len = self.char_here().len_utf8();
        let text = self.src[self.pos..self.pos + len].to_string();
        self.pos += len;
        self.push_at(TokenKind::Op, start, text);
    }

    /// Identifier, or the prefix of a string literal (`r"", f'', rb""`).
    fn lex_name(&mut self) -> Result<(), LexError> {
        let start = self.here();
        let begin = self.pos;
        let mut end = self.pos;

        while end < self.bytes.len() {
            let ch = self.src[end..].chars().next().unwrap_or('\0');
            if ch == '_' || ch.is_alphanumeric() {
                end += ch.len_utf8();
            } else {
                break;
            }
        }

        if matches!(self.bytes.get(end).copied(), Some(b'\'' | b'"'))
            && is_string_prefix(&self.src[begin..end])
        {
            return self.lex_string(begin, end);
        }

        let text = self.src[begin..end].to_string();
        self.pos = end;
        self.push_at(TokenKind::Ident, start, text);
        Ok(())
    }

    /// Lex a string literal whose prefix starts at `begin` and whose
    /// opening quote sits at `quote_pos`. Interpolated literals are
    /// split into start/segment/expression/end tokens.
    fn lex_string(&mut self, begin: usize, quote_pos: usize) -> Result<(), LexError> {
        let start = Pos {
            line: self.line,
            col: begin - self.line_start,
        };
        let prefix = &self.src[begin..quote_pos];
        let interpolated = prefix.bytes().any(|b| b == b'f' || b == b'F');

        let q = self.bytes[quote_pos];
        let triple = self.bytes.get(quote_pos + 1) == Some(&q)
            && self.bytes.get(quote_pos + 2) == Some(&q);
        let delim_len = if triple { 3 } else { 1 };

        self.pos = quote_pos + delim_len;

        if interpolated {
            let text = self.src[begin..self.pos].to_string();
            self.push_at(TokenKind::FStringStart, start, text);
            return self.lex_fstring_body(q, triple, start);
        }

        loop {
            if self.pos >= self.bytes.len() {
                return Err(LexError::UnterminatedString {
                    line: start.line,
                    col: start.col,
                });
            }
            let b = self.bytes[self.pos];
            if b == q {
                if !triple {
                    self.pos += 1;
                    break;
                }
                if self.bytes.get(self.pos + 1) == Some(&q)
                    && self.bytes.get(self.pos + 2) == Some(&q)
                {
                    self.pos += 3;
                    break;
                }
                self.pos += 1;
            } else if b == b'\\' {
                self.consume_escape();
            } else if b == b'\n' && !triple {
                return Err(LexError::UnterminatedString {
                    line: start.line,
                    col: start.col,
                });
            } else {
                self.advance();
            }
        }

        let text = self.src[begin..self.pos].to_string();
        self.push_at(TokenKind::Str, start, text);
        Ok(())
    }

    /// Body of an interpolated literal: alternating literal segments and
    /// `{expression}` token runs, terminated by the closing quote run.
    fn lex_fstring_body(&mut self, q: u8, triple: bool, open: Pos) -> Result<(), LexError> {
        let delim_len = if triple { 3 } else { 1 };

        loop {
            let seg_begin = self.pos;
            let seg_start = self.here();

            let stop = loop {
                if self.pos >= self.bytes.len() {
                    return Err(LexError::UnterminatedString {
                        line: open.line,
                        col: open.col,
                    });
                }
                let b = self.bytes[self.pos];
                if b == q
                    && (!triple
                        || (self.bytes.get(self.pos + 1) == Some(&q)
                            && self.bytes.get(self.pos + 2) == Some(&q)))
                {
                    break SegEnd::Quote;
                }
                match b {
                    // Escaped braces stay inside the literal segment.
                    b'{' if self.bytes.get(self.pos + 1) == Some(&b'{') => self.pos += 2,
                    b'}' if self.bytes.get(self.pos + 1) == Some(&b'}') => self.pos += 2,
                    b'{' => break SegEnd::Brace,
                    b'\\' => self.consume_escape(),
                    b'\n' if !triple => {
                        return Err(LexError::UnterminatedString {
                            line: open.line,
                            col: open.col,
                        });
                    }
                    _ => self.advance(),
                }
            };

            if self.pos > seg_begin {
                let text = self.src[seg_begin..self.pos].to_string();
                self.push_at(TokenKind::StringSegment, seg_start, text);
            }

            match stop {
                SegEnd::Quote => {
                    let dstart = self.here();
                    let text = self.src[self.pos..self.pos + delim_len].to_string();
                    self.pos += delim_len;
                    self.push_at(TokenKind::FStringEnd, dstart, text);
                    return Ok(());
                }
                SegEnd::Brace => {
                    self.push_single(TokenKind::Op);
                    self.lex_fstring_expr(q, triple)?;
                }
            }
        }
    }

    /// Code tokens of one interpolation, through the matching `}`.
    /// A top-level `:` hands off to the format-spec scanner.
    fn lex_fstring_expr(&mut self, q: u8, triple: bool) -> Result<(), LexError> {
        let open = self.here();
        let mut depth = 0usize;

        loop {
            if self.pos >= self.bytes.len() {
                return Err(LexError::UnterminatedInterpolation {
                    line: open.line,
                    col: open.col,
                });
            }
            let b = self.bytes[self.pos];
            match b {
                b' ' | b'\t' => self.pos += 1,
                b'\n' | b'\r' if triple && self.line_break_follows(self.pos) => self.lex_newline(),
                b'\n' | b'\r' => {
                    return Err(LexError::UnterminatedInterpolation {
                        line: open.line,
                        col: open.col,
                    });
                }
                b'\\' if self.line_break_follows(self.pos + 1) => self.lex_continuation(),
                b'}' if depth == 0 => {
                    self.push_single(TokenKind::Op);
                    return Ok(());
                }
                b':' if depth == 0 => {
                    self.push_single(TokenKind::Op);
                    return self.lex_format_spec(q, triple);
                }
                b'(' | b'[' | b'{' => {
                    depth += 1;
                    self.push_single(TokenKind::Op);
                }
                b')' | b']' | b'}' => {
                    depth = depth.saturating_sub(1);
                    self.push_single(TokenKind::Op);
                }
                // The literal's own quote cannot reappear inside a
                // single-line interpolation; the expression is cut short.
                _ if b == q && !triple => {
                    return Err(LexError::UnterminatedInterpolation {
                        line: open.line,
                        col: open.col,
                    });
                }
                b'\'' | b'"' => self.lex_string(self.pos, self.pos)?,
                b'0'..=b'9' => self.lex_number(),
                b'.' if matches!(self.bytes.get(self.pos + 1).copied(), Some(b'0'..=b'9')) => {
                    self.lex_number()
                }
                b'#' => self.lex_op(),
                _ => {
                    let ch = self.char_here();
                    if ch == '_' || ch.is_alphabetic() {
                        self.lex_name()?;
                    } else {
                        self.lex_op();
                    }
                }
            }
        }
    }

    /// Format spec after a top-level `:`. Literal text up to the closing
    /// `}`, with `{` opening a nested interpolation.
    fn lex_format_spec(&mut self, q: u8, triple: bool) -> Result<(), LexError> {
        let open = self.here();

        loop {
            let seg_begin = self.pos;
            let seg_start = self.here();

            let nested = loop {
                if self.pos >= self.bytes.len() {
                    return Err(LexError::UnterminatedInterpolation {
                        line: open.line,
                        col: open.col,
                    });
                }
                let b = self.bytes[self.pos];
                match b {
                    b'}' => break false,
                    b'{' => break true,
                    b'\\' => self.consume_escape(),
                    _ if b == q && !triple => {
                        return Err(LexError::UnterminatedInterpolation {
                            line: open.line,
                            col: open.col,
                        });
                    }
                    b'\n' if !triple => {
                        return Err(LexError::UnterminatedInterpolation {
                            line: open.line,
                            col: open.col,
                        });
                    }
                    _ => self.advance(),
                }
            };

            if self.pos > seg_begin {
                let text = self.src[seg_begin..self.pos].to_string();
                self.push_at(TokenKind::StringSegment, seg_start, text);
            }

            self.push_single(TokenKind::Op);
            if nested {
                self.lex_fstring_expr(q, triple)?;
            } else {
                return Ok(());
            }
        }
    }
}

/// Valid Python string literal prefix (r, b, u, f and two-letter combos).
fn is_string_prefix(s: &str) -> bool {
    !s.is_empty()
        && s.len() <= 2
        && s.bytes()
            .all(|b| matches!(b, b'r' | b'R' | b'b' | b'B' | b'u' | b'U' | b'f' | b'F'))
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn roundtrip(src: &str) -> String {
        let tokens = tokenize(src).expect("lex");
        let leads = leading_whitespace(&tokens);
        detokenize(leads.iter().map(String::as_str).zip(tokens.iter().map(|t| t.text.as_str())))
    }

    #[test]
    fn roundtrip_plain_source() {
        let src = "import os\n\n\ndef foo(a, b=1):\n    return a + b\n";
        assert_eq!(roundtrip(src), src);
    }

    #[test]
    fn roundtrip_preserves_tabs_and_trailing_spaces() {
        let src = "def f():\n\treturn {\t'k':  1}   \n";
        assert_eq!(roundtrip(src), src);
    }

    #[test]
    fn roundtrip_crlf() {
        let src = "a = 1\r\nb = 2\r\n";
        assert_eq!(roundtrip(src), src);
    }

    #[test]
    fn roundtrip_comments_and_blank_lines() {
        let src = "# header\n\nx = 1  # trailing\n   \n# end";
        assert_eq!(roundtrip(src), src);
    }

    #[test]
    fn roundtrip_triple_and_prefixed_strings() {
        let src = "s = '''line1\nline2'''\nr = r\"raw\\n\"\nb = rb'\\x00'\n";
        assert_eq!(roundtrip(src), src);
    }

    #[test]
    fn roundtrip_fstring_with_format_spec() {
        let src = "msg = f\"{name!r:>{width}} = {value:.2f} {{literal}}\"\n";
        assert_eq!(roundtrip(src), src);
    }

    #[test]
    fn roundtrip_no_trailing_newline() {
        let src = "x = 1";
        assert_eq!(roundtrip(src), src);
    }

    #[test]
    fn backslash_continuation_is_synthesized() {
        let src = "total = 1 + \\\n    2\n";
        let tokens = tokenize(src).unwrap();
        assert!(
            tokens
                .iter()
                .any(|t| t.kind == TokenKind::Continuation && t.text == "\\\n")
        );
        assert_eq!(roundtrip(src), src);
    }

    #[test]
    fn string_prefix_stays_attached() {
        let tokens = tokenize("x = r'a'\n").unwrap();
        let s = tokens
            .iter()
            .find(|t| t.kind == TokenKind::Str)
            .expect("string token");
        assert_eq!(s.text, "r'a'");
    }

    #[test]
    fn fstring_splits_into_segments_and_code() {
        let tokens = tokenize("f'pre {user.name} post'\n").unwrap();
        let kinds: Vec<TokenKind> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::FStringStart,
                TokenKind::StringSegment,
                TokenKind::Op,
                TokenKind::Ident,
                TokenKind::Op,
                TokenKind::Ident,
                TokenKind::Op,
                TokenKind::StringSegment,
                TokenKind::FStringEnd,
                TokenKind::Newline,
                TokenKind::EndMarker,
            ]
        );
        let seg = &tokens[1];
        assert_eq!(seg.text, "pre ");
        assert_eq!(tokens[7].text, " post");
    }

    #[test]
    fn escaped_braces_stay_in_segment() {
        let tokens = tokenize("f'{{x}} {y}'\n").unwrap();
        let seg = tokens
            .iter()
            .find(|t| t.kind == TokenKind::StringSegment)
            .unwrap();
        assert_eq!(seg.text, "{{x}} ");
    }

    #[test]
    fn unterminated_string_is_fatal() {
        let err = tokenize("s = 'oops\n").unwrap_err();
        assert!(matches!(err, LexError::UnterminatedString { line: 1, .. }));
    }

    #[test]
    fn unterminated_interpolation_is_fatal() {
        let err = tokenize("s = f'{oops'\n").unwrap_err();
        assert!(matches!(err, LexError::UnterminatedInterpolation { .. }));
    }

    #[test]
    fn multiline_string_keeps_following_gap() {
        let src = "s = '''a\nb'''  # tail\n";
        assert_eq!(roundtrip(src), src);
        let tokens = tokenize(src).unwrap();
        let s = tokens.iter().find(|t| t.kind == TokenKind::Str).unwrap();
        assert_eq!(s.start, Pos { line: 1, col: 4 });
        assert_eq!(s.end, Pos { line: 2, col: 4 });
    }

    proptest! {
        // Quote- and backslash-free fragments: any arrangement must
        // round-trip exactly.
        #[test]
        fn roundtrip_random_safe_source(parts in proptest::collection::vec(
            prop_oneof![
                proptest::string::string_regex("[a-z_][a-z0-9_]{0,8}").unwrap(),
                Just(" ".to_string()),
                Just("\t".to_string()),
                Just("\n".to_string()),
                Just("(".to_string()),
                Just(")".to_string()),
                Just(":".to_string()),
                Just("# note".to_string()),
                Just("123".to_string()),
                Just("+".to_string()),
            ],
            0..40,
        )) {
            let src: String = parts.concat();
            prop_assert_eq!(roundtrip(&src), src);
        }
    }
}
