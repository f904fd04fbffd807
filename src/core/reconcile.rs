//! Compare-then-promote-or-discard for materialized candidates.
//!
//! A committed destination file is only ever replaced when its byte
//! content would actually change, so regenerate-and-diff churn never
//! touches files whose content is already right. Comparison reads both
//! streams in fixed-size chunks and any I/O failure propagates: a real
//! change must never be skipped silently.

use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tracing::debug;

use crate::core::emit::final_path;

const CHUNK_SIZE: usize = 8 * 1024;

/// What reconciliation did with a candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Candidate replaced (or created) the committed file.
    Promoted(PathBuf),
    /// Committed file already had this content; candidate discarded.
    Unchanged(PathBuf),
}

impl Outcome {
    pub fn final_path(&self) -> &Path {
        match self {
            Outcome::Promoted(p) | Outcome::Unchanged(p) => p,
        }
    }
}

/// Promote the candidate if the committed file is absent or differs;
/// discard it otherwise. The candidate never survives this call.
pub fn reconcile(candidate: &Path) -> Result<Outcome> {
    let dest = destination_of(candidate)?;

    if !dest.exists() {
        fs::rename(candidate, &dest)
            .with_context(|| format!("promote {} into place", dest.display()))?;
        debug!(path = %dest.display(), "promoted new file");
        return Ok(Outcome::Promoted(dest));
    }

    if files_identical(candidate, &dest)? {
        fs::remove_file(candidate)
            .with_context(|| format!("discard candidate {}", candidate.display()))?;
        debug!(path = %dest.display(), "unchanged");
        Ok(Outcome::Unchanged(dest))
    } else {
        fs::rename(candidate, &dest)
            .with_context(|| format!("promote {} into place", dest.display()))?;
        debug!(path = %dest.display(), "promoted changed file");
        Ok(Outcome::Promoted(dest))
    }
}

/// Dry-run variant: report what reconciliation would do, but leave the
/// committed file alone. The candidate is still always removed.
pub fn reconcile_dry(candidate: &Path) -> Result<Outcome> {
    let dest = destination_of(candidate)?;

    let outcome = if dest.exists() && files_identical(candidate, &dest)? {
        Outcome::Unchanged(dest)
    } else {
        Outcome::Promoted(dest)
    };

    fs::remove_file(candidate)
        .with_context(|| format!("discard candidate {}", candidate.display()))?;
    Ok(outcome)
}

fn destination_of(candidate: &Path) -> Result<PathBuf> {
    final_path(candidate)
        .ok_or_else(|| anyhow!("{} is not a marker-suffixed candidate", candidate.display()))
}

/// Byte-for-byte equality in fixed-size chunks.
fn files_identical(a: &Path, b: &Path) -> Result<bool> {
    let meta_a = fs::metadata(a).with_context(|| format!("stat {}", a.display()))?;
    let meta_b = fs::metadata(b).with_context(|| format!("stat {}", b.display()))?;
    if meta_a.len() != meta_b.len() {
        return Ok(false);
    }

    let mut fa = File::open(a).with_context(|| format!("open {}", a.display()))?;
    let mut fb = File::open(b).with_context(|| format!("open {}", b.display()))?;
    let mut buf_a = [0u8; CHUNK_SIZE];
    let mut buf_b = [0u8; CHUNK_SIZE];

    loop {
        let n_a = read_chunk(&mut fa, &mut buf_a).with_context(|| format!("read {}", a.display()))?;
        let n_b = read_chunk(&mut fb, &mut buf_b).with_context(|| format!("read {}", b.display()))?;
        if n_a != n_b || buf_a[..n_a] != buf_b[..n_b] {
            return Ok(false);
        }
        if n_a == 0 {
            return Ok(true);
        }
    }
}

/// Fill `buf` as far as the stream allows; 0 means end-of-stream.
fn read_chunk(f: &mut File, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = f.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}
