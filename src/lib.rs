//! **desync** - Derive and maintain the sync variant of an async Python codebase
//!
//! Token-level rewriting with exact whitespace reconstruction: suspension
//! keywords are elided, identifiers renamed by a fixed convention algebra,
//! the same renaming applied inside string and doc literals, and freshly
//! generated output reconciled against the committed tree so unchanged
//! files are never touched.

/// Command-line interface with clap integration
pub mod cli;

/// Shell completion generation
pub mod completion;

/// Core rewrite-and-reconcile pipeline
pub mod core {
    /// Positional lexer and detokenizer (exact round-trip)
    pub mod lexer;
    pub use lexer::{LexError, Token, TokenKind, detokenize, tokenize};

    /// Identifier renaming: exact table + ordered prefix rules
    pub mod rename;
    pub use rename::{Renamer, default_replacements};

    /// Renaming and keyword elision inside literal content
    pub mod strings;

    /// Token-stream rewriting for one file
    pub mod rewrite;
    pub use rewrite::{Rule, rewrite_source};

    /// Candidate-file materialization (marker suffix, tree remapping)
    pub mod emit;
    pub use emit::MARKER_SUFFIX;

    /// Compare-then-promote-or-discard reconciliation
    pub mod reconcile;
    pub use reconcile::Outcome;

    /// External formatter / import-sorter collaborators
    pub mod postproc;

    /// Batch derivation driver
    pub mod generate;
    pub use generate::{ChangeReport, run as generate_run};
}

/// Infrastructure - Configuration, I/O, and walking
pub mod infra {
    /// Configuration management with TOML support
    pub mod config;
    pub use config::{Config, init as config_init, load_config};

    /// Encoding-preserving source read/write
    pub mod io;
    pub use io::{SourceEncoding, SourceFile, read_source, write_source};

    /// CRLF/LF-robust line indexing for token coordinates
    pub mod line_index;
    pub use line_index::NewlineIndex;

    /// Gitignore-aware walking restricted to derivable sources
    pub mod walk;
    pub use walk::FileWalker;
}

// Strategic re-exports for clean CLI interface
pub use cli::{AppContext, Cli, Commands};
pub use crate::core::{ChangeReport, MARKER_SUFFIX, Rule, generate_run, rewrite_source};
pub use infra::{Config, FileWalker, load_config};
