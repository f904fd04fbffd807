//! Source file I/O with text-encoding preservation.
//!
//! The declared encoding of each input (UTF-8 BOM, or a PEP 263 style
//! coding cookie in the first two lines) travels with the text through
//! the whole rewrite pipeline, and output is written back the same way.
//! The cookie itself is an ordinary comment for the lexer, so it
//! survives rewriting untouched.
//!
//! Only UTF-8 and the Latin-1 family are decoded natively; any other
//! declared codec is a per-file fatal error, surfaced loudly rather
//! than silently mangled.

use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result, bail};
use regex::bytes::Regex;

const UTF8_BOM: &[u8] = b"\xef\xbb\xbf";

/// PEP 263: `coding[:=]\s*([-\w.]+)` somewhere in the first two lines.
static CODING_COOKIE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"coding[:=][ \t]*([-\w.]+)").expect("coding cookie pattern"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    Utf8,
    /// ISO-8859-1: bytes map 1:1 onto the first 256 code points.
    Latin1,
}

/// Declared text encoding of a source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceEncoding {
    pub codec: Codec,
    pub bom: bool,
}

impl Default for SourceEncoding {
    fn default() -> Self {
        Self {
            codec: Codec::Utf8,
            bom: false,
        }
    }
}

/// Decoded file content plus the encoding it arrived in.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub text: String,
    pub encoding: SourceEncoding,
}

/// Read and decode a source file, honoring BOM and coding cookie.
pub fn read_source(path: &Path) -> Result<SourceFile> {
    let bytes =
        fs::read(path).with_context(|| format!("Failed to read file {}", path.display()))?;
    decode(&bytes).with_context(|| format!("Failed to decode {}", path.display()))
}

/// Encode and write text with the same encoding it was read with.
pub fn write_source(path: &Path, text: &str, encoding: &SourceEncoding) -> Result<()> {
    let mut bytes = Vec::with_capacity(text.len() + 3);
    if encoding.bom {
        bytes.extend_from_slice(UTF8_BOM);
    }
    match encoding.codec {
        Codec::Utf8 => bytes.extend_from_slice(text.as_bytes()),
        Codec::Latin1 => {
            for ch in text.chars() {
                let cp = ch as u32;
                if cp > 0xFF {
                    bail!("character {ch:?} is not representable in the declared latin-1 encoding");
                }
                bytes.push(cp as u8);
            }
        }
    }
    fs::write(path, bytes).with_context(|| format!("Failed to write {}", path.display()))
}

/// Decode raw bytes according to their own declared encoding.
pub fn decode(bytes: &[u8]) -> Result<SourceFile> {
    let (bom, body) = match bytes.strip_prefix(UTF8_BOM) {
        Some(rest) => (true, rest),
        None => (false, bytes),
    };

    // A BOM pins the codec; otherwise consult the cookie.
    let codec = if bom {
        Codec::Utf8
    } else {
        match declared_codec_name(body) {
            Some(name) => codec_by_name(&name)?,
            None => Codec::Utf8,
        }
    };

    let text = match codec {
        Codec::Utf8 => std::str::from_utf8(body)
            .context("file is not valid UTF-8")?
            .to_string(),
        Codec::Latin1 => body.iter().map(|&b| b as char).collect(),
    };

    Ok(SourceFile {
        text,
        encoding: SourceEncoding { codec, bom },
    })
}

/// Cookie codec name from the first two physical lines, if any.
fn declared_codec_name(body: &[u8]) -> Option<String> {
    let mut end = body.len();
    let mut newlines = 0;
    for (i, &b) in body.iter().enumerate() {
        if b == b'\n' {
            newlines += 1;
            if newlines == 2 {
                end = i;
                break;
            }
        }
    }

    CODING_COOKIE
        .captures(&body[..end])
        .map(|c| String::from_utf8_lossy(&c[1]).into_owned())
}

fn codec_by_name(name: &str) -> Result<Codec> {
    let lowered = name.to_ascii_lowercase();
    match lowered.as_str() {
        "utf-8" | "utf8" => Ok(Codec::Utf8),
        "latin-1" | "latin1" | "latin" | "iso-8859-1" | "iso8859-1" => Ok(Codec::Latin1),
        other => bail!("unsupported source encoding {other:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_utf8_default() {
        let f = decode(b"x = 1\n").unwrap();
        assert_eq!(f.text, "x = 1\n");
        assert_eq!(f.encoding, SourceEncoding::default());
    }

    #[test]
    fn bom_detected_and_rewritten() {
        let f = decode(b"\xef\xbb\xbfx = 1\n").unwrap();
        assert!(f.encoding.bom);
        assert_eq!(f.text, "x = 1\n");

        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("m.py");
        write_source(&p, &f.text, &f.encoding).unwrap();
        assert_eq!(std::fs::read(&p).unwrap(), b"\xef\xbb\xbfx = 1\n");
    }

    #[test]
    fn latin1_cookie_roundtrip() {
        let src = b"# -*- coding: latin-1 -*-\ns = 'caf\xe9'\n";
        let f = decode(src).unwrap();
        assert_eq!(f.encoding.codec, Codec::Latin1);
        assert!(f.text.contains("café"));

        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("m.py");
        write_source(&p, &f.text, &f.encoding).unwrap();
        assert_eq!(std::fs::read(&p).unwrap(), src.to_vec());
    }

    #[test]
    fn cookie_outside_first_two_lines_is_ignored() {
        let src = b"a = 1\nb = 2\n# coding: latin-1\nc = '\xc3\xa9'\n";
        let f = decode(src).unwrap();
        assert_eq!(f.encoding.codec, Codec::Utf8);
    }

    #[test]
    fn unknown_codec_is_fatal() {
        let err = decode(b"# -*- coding: shift-jis -*-\n").unwrap_err();
        assert!(err.to_string().contains("shift-jis"));
    }

    #[test]
    fn invalid_utf8_is_fatal() {
        assert!(decode(b"s = '\xff'\n").is_err());
    }
}
