//! Materialize rewritten text as a marker-suffixed candidate file.
//!
//! A derived file never lands on its final path directly: it is written
//! to `<dest><MARKER_SUFFIX>` and only the reconciler decides whether it
//! replaces the committed file. The candidate is not an artifact anyone
//! else may read; it exists for the duration of one reconciliation pass.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::infra::io::{SourceEncoding, write_source};

/// Fixed suffix carried by every not-yet-reconciled candidate.
pub const MARKER_SUFFIX: &str = ".new";

/// Candidate path for a destination file.
pub fn candidate_path(dest: &Path) -> PathBuf {
    let mut s = dest.as_os_str().to_os_string();
    s.push(MARKER_SUFFIX);
    PathBuf::from(s)
}

/// Final path of a candidate; None if the suffix is missing.
pub fn final_path(candidate: &Path) -> Option<PathBuf> {
    candidate
        .to_str()
        .and_then(|s| s.strip_suffix(MARKER_SUFFIX))
        .map(PathBuf::from)
}

/// Write `text` to the candidate path for `dest`, creating intermediate
/// directories as needed. Directory creation is idempotent: a directory
/// that already exists (from a prior run or an overlapping rule) is
/// fine; any other creation failure is fatal for this file.
pub fn materialize(dest: &Path, text: &str, encoding: &SourceEncoding) -> Result<PathBuf> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create destination directory {}", parent.display()))?;
    }

    let candidate = candidate_path(dest);
    write_source(&candidate, text, encoding)?;
    Ok(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidate_and_final_are_inverses() {
        let dest = Path::new("out/_sync/client.py");
        let cand = candidate_path(dest);
        assert_eq!(cand, Path::new("out/_sync/client.py.new"));
        assert_eq!(final_path(&cand).unwrap(), dest);
        assert_eq!(final_path(Path::new("out/client.py")), None);
    }

    #[test]
    fn materialize_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("a/b/mod.py");

        let cand = materialize(&dest, "x = 1\n", &SourceEncoding::default()).unwrap();
        assert!(cand.exists());
        assert_eq!(std::fs::read_to_string(&cand).unwrap(), "x = 1\n");

        // Second materialization into the existing directory is fine.
        let again = materialize(&dest, "x = 2\n", &SourceEncoding::default()).unwrap();
        assert_eq!(std::fs::read_to_string(&again).unwrap(), "x = 2\n");
    }
}
