//! Batch derivation driver.
//!
//! For each configured rule: walk (or take the explicit file list),
//! rewrite every source file, materialize the candidate, run the
//! configured collaborators over it, then reconcile. Files are fully
//! processed one at a time; the rule set is read-only throughout.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use chrono::{DateTime, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use itertools::Itertools;
use owo_colors::OwoColorize;
use serde::Serialize;
use similar::TextDiff;
use tracing::{debug, warn};

use crate::cli::{AppContext, GenerateArgs};
use crate::core::emit::materialize;
use crate::core::postproc::Postprocessor;
use crate::core::reconcile::{Outcome, reconcile, reconcile_dry};
use crate::core::rewrite::Rule;
use crate::infra::config::{Config, load_config};
use crate::infra::io::read_source;
use crate::infra::walk::FileWalker;

/// Machine-readable result of one generate pass.
#[derive(Debug, Serialize)]
pub struct ChangeReport {
    pub generated_at: DateTime<Utc>,
    pub processed: usize,
    pub changed: Vec<PathBuf>,
    pub dry_run: bool,
}

struct WorkItem {
    rule_idx: usize,
    source: PathBuf,
    dest: PathBuf,
}

pub fn run(args: GenerateArgs, ctx: &AppContext) -> Result<ChangeReport> {
    let config = load_config()?;
    run_with_config(args, ctx, &config)
}

/// Driver entry with an explicit configuration (integration tests and
/// embedders use this directly).
pub fn run_with_config(
    args: GenerateArgs,
    ctx: &AppContext,
    config: &Config,
) -> Result<ChangeReport> {
    let rules = config.resolved_rules()?;
    if rules.is_empty() {
        bail!("no derivation rules configured; run `desync init` and edit desync.toml");
    }

    let walker = FileWalker::new(&config.walk.exclude, &config.walk.extensions)?;
    let post = Postprocessor::from_config(&config.postprocess)?;

    let work = collect_work(&args, &rules, &walker)?;

    let progress = if ctx.quiet || args.json {
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new(work.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap()
                .progress_chars("#>-"),
        );
        pb
    };

    let mut changed: Vec<PathBuf> = Vec::new();
    let mut diffs: Vec<String> = Vec::new();

    for item in &work {
        progress.set_message(item.source.display().to_string());
        let (outcome, diff) = process_file(&rules[item.rule_idx], item, &post, ctx, args.diff)?;
        progress.inc(1);

        if let Outcome::Promoted(path) = outcome {
            changed.push(path);
            if let Some(diff) = diff {
                diffs.push(diff);
            }
        }
    }

    progress.finish_and_clear();

    let report = ChangeReport {
        generated_at: Utc::now(),
        processed: work.len(),
        changed,
        dry_run: ctx.dry_run,
    };

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("serialize change report")?
        );
        return Ok(report);
    }

    // One-line notice per promoted file, then any requested diffs.
    let verb = if ctx.dry_run { "would regenerate" } else { "regenerated" };
    for path in &report.changed {
        if ctx.no_color {
            println!("{verb} {}", path.display());
        } else {
            println!("{} {}", verb.green().bold(), path.display());
        }
    }
    for diff in &diffs {
        print!("{diff}");
    }

    if !ctx.quiet {
        if report.changed.is_empty() {
            println!("{} files checked, all up to date", report.processed);
        } else {
            println!(
                "{} files checked, {} regenerated",
                report.processed,
                report.changed.len()
            );
        }
    }

    Ok(report)
}

/// Build the work list: explicit files claimed by their rule, or a full
/// walk of every configured source tree.
fn collect_work(
    args: &GenerateArgs,
    rules: &[Rule],
    walker: &FileWalker,
) -> Result<Vec<WorkItem>> {
    let mut work: Vec<WorkItem> = Vec::new();

    if args.files.is_empty() {
        for (rule_idx, rule) in rules.iter().enumerate() {
            if !rule.source_root.is_dir() {
                bail!("source root {} does not exist", rule.source_root.display());
            }
            for source in walker.walk_files(&rule.source_root) {
                let Some(dest) = rule.dest_path(&source) else {
                    continue;
                };
                work.push(WorkItem {
                    rule_idx,
                    source,
                    dest,
                });
            }
        }
    } else {
        for file in &args.files {
            match claim(rules, file) {
                Some((rule_idx, source, dest)) => work.push(WorkItem {
                    rule_idx,
                    source,
                    dest,
                }),
                None => {
                    warn!(file = %file.display(), "outside all configured source roots; skipped");
                }
            }
        }
    }

    // Explicit lists may repeat files; overlapping rules may not re-derive
    // the same source twice.
    Ok(work
        .into_iter()
        .unique_by(|item| item.source.clone())
        .collect())
}

/// Match an explicit file to the rule whose source root contains it,
/// tolerating `./`-style and symlinked spellings via canonicalization.
fn claim(rules: &[Rule], file: &Path) -> Option<(usize, PathBuf, PathBuf)> {
    for (i, rule) in rules.iter().enumerate() {
        if let Some(dest) = rule.dest_path(file) {
            return Some((i, file.to_path_buf(), dest));
        }
    }

    let canon = dunce::canonicalize(file).ok()?;
    for (i, rule) in rules.iter().enumerate() {
        let Ok(root) = dunce::canonicalize(&rule.source_root) else {
            continue;
        };
        if let Ok(rel) = canon.strip_prefix(&root) {
            return Some((i, canon.clone(), rule.dest_root.join(rel)));
        }
    }
    None
}

fn process_file(
    rule: &Rule,
    item: &WorkItem,
    post: &Postprocessor,
    ctx: &AppContext,
    want_diff: bool,
) -> Result<(Outcome, Option<String>)> {
    debug!(file = %item.source.display(), "deriving");

    let source = read_source(&item.source)?;
    let rewritten = rule
        .rewrite(&source.text)
        .map_err(|e| anyhow!(e))
        .with_context(|| format!("rewrite {}", item.source.display()))?;

    let candidate = materialize(&item.dest, &rewritten, &source.encoding)?;

    // The candidate must not survive this pass, error or not.
    let result = (|| {
        post.run(&candidate)?;
        let diff = if want_diff {
            diff_against_committed(&candidate, &item.dest)?
        } else {
            None
        };
        let outcome = if ctx.dry_run {
            reconcile_dry(&candidate)?
        } else {
            reconcile(&candidate)?
        };
        Ok((outcome, diff))
    })();

    if result.is_err() {
        let _ = fs::remove_file(&candidate);
    }
    result
}

/// Unified diff between the committed file and the candidate content;
/// None when the destination is new or the content is identical.
fn diff_against_committed(candidate: &Path, dest: &Path) -> Result<Option<String>> {
    if !dest.exists() {
        return Ok(None);
    }

    let old = String::from_utf8_lossy(
        &fs::read(dest).with_context(|| format!("read {}", dest.display()))?,
    )
    .into_owned();
    let new = String::from_utf8_lossy(
        &fs::read(candidate).with_context(|| format!("read {}", candidate.display()))?,
    )
    .into_owned();

    if old == new {
        return Ok(None);
    }

    let dest_name = dest.display().to_string();
    let diff = TextDiff::from_lines(&old, &new);
    let text = diff
        .unified_diff()
        .header(&format!("a/{dest_name}"), &format!("b/{dest_name}"))
        .to_string();
    Ok(Some(text))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use indexmap::IndexMap;
    use tempfile::TempDir;

    use super::*;
    use crate::infra::config::RuleConfig;

    fn ctx() -> AppContext {
        AppContext {
            quiet: true,
            no_color: true,
            dry_run: false,
        }
    }

    fn config_for(tmp: &TempDir) -> Config {
        Config {
            rules: vec![RuleConfig {
                source_root: tmp.path().join("_async").display().to_string(),
                dest_root: tmp.path().join("_sync").display().to_string(),
                replacements: IndexMap::new(),
            }],
            ..Config::default()
        }
    }

    fn write(root: &Path, rel: &str, content: &str) {
        let p = root.join(rel);
        fs::create_dir_all(p.parent().unwrap()).unwrap();
        fs::write(p, content).unwrap();
    }

    fn generate_args() -> GenerateArgs {
        GenerateArgs {
            files: Vec::new(),
            diff: false,
            json: false,
        }
    }

    #[test]
    fn derives_walks_and_reports_changes() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "_async/client.py", "async def go():\n    pass\n");

        let report = run_with_config(generate_args(), &ctx(), &config_for(&tmp)).unwrap();
        assert_eq!(report.processed, 1);
        assert_eq!(report.changed.len(), 1);
        assert_eq!(
            fs::read_to_string(tmp.path().join("_sync/client.py")).unwrap(),
            "def go():\n    pass\n"
        );
        // No candidate left behind.
        assert!(!tmp.path().join("_sync/client.py.new").exists());
    }

    #[test]
    fn second_run_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "_async/mod.py", "x = await f()\n");

        let first = run_with_config(generate_args(), &ctx(), &config_for(&tmp)).unwrap();
        assert_eq!(first.changed.len(), 1);

        let second = run_with_config(generate_args(), &ctx(), &config_for(&tmp)).unwrap();
        assert_eq!(second.processed, 1);
        assert!(second.changed.is_empty());
    }

    #[test]
    fn excluded_fixture_files_are_not_derived() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "_async/conftest.py", "fixtures = 1\n");
        write(tmp.path(), "_async/mod.py", "y = 1\n");

        let report = run_with_config(generate_args(), &ctx(), &config_for(&tmp)).unwrap();
        assert_eq!(report.processed, 1);
        assert!(!tmp.path().join("_sync/conftest.py").exists());
    }

    #[test]
    fn explicit_file_outside_roots_is_skipped() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "_async/mod.py", "y = 1\n");
        write(tmp.path(), "elsewhere/other.py", "z = 1\n");

        let args = GenerateArgs {
            files: vec![tmp.path().join("elsewhere/other.py")],
            ..generate_args()
        };
        let report = run_with_config(args, &ctx(), &config_for(&tmp)).unwrap();
        assert_eq!(report.processed, 0);
    }

    #[test]
    fn explicit_file_is_claimed_by_its_rule() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "_async/a.py", "a = await f()\n");
        write(tmp.path(), "_async/b.py", "b = await g()\n");

        let args = GenerateArgs {
            files: vec![tmp.path().join("_async/a.py")],
            ..generate_args()
        };
        let report = run_with_config(args, &ctx(), &config_for(&tmp)).unwrap();
        assert_eq!(report.processed, 1);
        assert!(tmp.path().join("_sync/a.py").exists());
        assert!(!tmp.path().join("_sync/b.py").exists());
    }

    #[test]
    fn dry_run_reports_but_does_not_write() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "_async/mod.py", "x = await f()\n");

        let dry = AppContext {
            dry_run: true,
            ..ctx()
        };
        let report = run_with_config(generate_args(), &dry, &config_for(&tmp)).unwrap();
        assert_eq!(report.changed.len(), 1);
        assert!(report.dry_run);
        assert!(!tmp.path().join("_sync/mod.py").exists());
        assert!(!tmp.path().join("_sync/mod.py.new").exists());
    }

    #[test]
    fn missing_source_root_is_fatal() {
        let tmp = TempDir::new().unwrap();
        let err = run_with_config(generate_args(), &ctx(), &config_for(&tmp)).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn no_rules_is_fatal_with_hint() {
        let config = Config {
            rules: vec![],
            ..Config::default()
        };
        let err = run_with_config(generate_args(), &ctx(), &config).unwrap_err();
        assert!(err.to_string().contains("desync init"));
    }

    #[test]
    fn lex_failure_aborts_that_file_loudly() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "_async/bad.py", "s = 'unterminated\n");

        let err = run_with_config(generate_args(), &ctx(), &config_for(&tmp)).unwrap_err();
        assert!(err.to_string().contains("bad.py"));
    }
}
