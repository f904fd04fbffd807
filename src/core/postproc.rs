//! External post-processing collaborators.
//!
//! Keyword removal changes line lengths and renaming changes the
//! alphabetical order of imports, so a general-purpose reformatter and
//! an import sorter run over every candidate before reconciliation.
//! Both are external commands and must be semantics-preserving text
//! transforms; from this side they are just the two traits below.
//!
//! Invocation order is fixed: reformatter first (full text on stdin,
//! reformatted text on stdout), then the import sorter (in place on the
//! candidate path).

use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};

use anyhow::{Context, Result, anyhow, bail};
use tracing::debug;

use crate::infra::config::PostprocessConfig;
use crate::infra::io::{read_source, write_source};

/// Full-text reformatting, e.g. `black -`.
pub trait Reformatter {
    fn reformat(&self, text: &str) -> Result<String>;
}

/// In-place import reordering, e.g. `isort <path>`.
pub trait ImportSorter {
    fn sort_imports(&self, path: &Path) -> Result<()>;
}

/// Reformatter backed by a configured argv; text is piped through
/// stdin/stdout and a non-zero exit is fatal for the file.
pub struct CommandReformatter {
    argv: Vec<String>,
}

impl CommandReformatter {
    pub fn new(argv: Vec<String>) -> Result<Self> {
        if argv.is_empty() {
            bail!("formatter command must not be empty");
        }
        Ok(Self { argv })
    }
}

impl Reformatter for CommandReformatter {
    fn reformat(&self, text: &str) -> Result<String> {
        let mut child = Command::new(&self.argv[0])
            .args(&self.argv[1..])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("spawn formatter {:?}", self.argv[0]))?;

        child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("formatter stdin unavailable"))?
            .write_all(text.as_bytes())
            .context("write source to formatter")?;

        let out = child.wait_with_output().context("wait for formatter")?;
        if !out.status.success() {
            bail!(
                "formatter {:?} failed ({}): {}",
                self.argv[0],
                out.status,
                String::from_utf8_lossy(&out.stderr).trim()
            );
        }

        String::from_utf8(out.stdout).context("formatter produced non-UTF-8 output")
    }
}

/// Import sorter backed by a configured argv; the candidate path is
/// appended as the final argument.
pub struct CommandImportSorter {
    argv: Vec<String>,
}

impl CommandImportSorter {
    pub fn new(argv: Vec<String>) -> Result<Self> {
        if argv.is_empty() {
            bail!("import sorter command must not be empty");
        }
        Ok(Self { argv })
    }
}

impl ImportSorter for CommandImportSorter {
    fn sort_imports(&self, path: &Path) -> Result<()> {
        let out = Command::new(&self.argv[0])
            .args(&self.argv[1..])
            .arg(path)
            .output()
            .with_context(|| format!("spawn import sorter {:?}", self.argv[0]))?;

        if !out.status.success() {
            bail!(
                "import sorter {:?} failed on {} ({}): {}",
                self.argv[0],
                path.display(),
                out.status,
                String::from_utf8_lossy(&out.stderr).trim()
            );
        }
        Ok(())
    }
}

/// The configured pair, either side optional.
pub struct Postprocessor {
    formatter: Option<CommandReformatter>,
    sorter: Option<CommandImportSorter>,
}

impl Postprocessor {
    pub fn from_config(cfg: &PostprocessConfig) -> Result<Self> {
        let formatter = cfg
            .formatter
            .clone()
            .map(CommandReformatter::new)
            .transpose()?;
        let sorter = cfg
            .import_sorter
            .clone()
            .map(CommandImportSorter::new)
            .transpose()?;
        Ok(Self { formatter, sorter })
    }

    /// Run the configured collaborators over a candidate file, keeping
    /// its encoding intact.
    pub fn run(&self, candidate: &Path) -> Result<()> {
        if let Some(formatter) = &self.formatter {
            let file = read_source(candidate)?;
            let reformatted = formatter.reformat(&file.text)?;
            write_source(candidate, &reformatted, &file.encoding)?;
            debug!(path = %candidate.display(), "reformatted candidate");
        }
        if let Some(sorter) = &self.sorter {
            sorter.sort_imports(candidate)?;
            debug!(path = %candidate.display(), "sorted imports");
        }
        Ok(())
    }
}
