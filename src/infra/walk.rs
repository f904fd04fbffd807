//! Gitignore-aware walker for derivable source files.
//!
//! - Respects .gitignore, .git/info/exclude, and global gitignore
//! - Exclusion globs match both tree-relative paths and bare filenames
//!   (the exclusion list names shared fixture files like conftest.py)
//! - Only files with an accepted extension are returned
//! - Deterministic ordering for stable runs and tests
//!
//! Backed by ripgrep's `ignore` crate and `globset`.

use std::path::{Path, PathBuf};

use anyhow::Result;
use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;

pub struct FileWalker {
    /// Compiled exclusion patterns
    exclude: GlobSet,

    /// Accepted source-file extensions (without the dot)
    extensions: Vec<String>,
}

impl FileWalker {
    pub fn new(exclude: &[String], extensions: &[String]) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        for pattern in exclude {
            builder.add(Glob::new(pattern)?);
        }

        Ok(Self {
            exclude: builder.build()?,
            extensions: extensions.to_vec(),
        })
    }

    /// Traverse files under `root`, respecting ignore rules, exclusion
    /// globs, and the extension filter. Returns a **sorted** list.
    pub fn walk_files<P: AsRef<Path>>(&self, root: P) -> Vec<PathBuf> {
        let root_path = root.as_ref();

        let walker = WalkBuilder::new(root_path)
            .hidden(false) // dotfiles included unless ignored
            .git_ignore(true)
            .git_global(true)
            .git_exclude(true)
            .build();

        let mut out: Vec<PathBuf> = walker
            .filter_map(|res| res.ok())
            .filter(|entry| entry.file_type().is_some_and(|ft| ft.is_file()))
            .map(|entry| entry.into_path())
            .filter(|abs| self.keeps(root_path, abs))
            .collect();

        out.sort();
        out
    }

    fn keeps(&self, root: &Path, abs: &Path) -> bool {
        let rel = abs.strip_prefix(root).unwrap_or(abs);
        if self.exclude.is_match(rel) {
            return false;
        }
        if let Some(name) = abs.file_name()
            && self.exclude.is_match(Path::new(name))
        {
            return false;
        }

        abs.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| self.extensions.iter().any(|want| want == ext))
    }
}
