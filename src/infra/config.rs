use std::path::PathBuf;

use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::cli::{AppContext, InitArgs};
use crate::core::rename::Renamer;
use crate::core::rewrite::Rule;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Paired source/destination trees to derive
    #[serde(default)]
    pub rules: Vec<RuleConfig>,

    /// Walk settings (exclusions, accepted extensions)
    #[serde(default)]
    pub walk: WalkConfig,

    /// Optional formatter / import-sorter collaborators
    #[serde(default)]
    pub postprocess: PostprocessConfig,
}

/// One (source tree, destination tree) pairing. Roots may use `~` and
/// environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleConfig {
    pub source_root: String,
    pub dest_root: String,

    /// Exact identifier replacements merged over the built-in table
    #[serde(default)]
    pub replacements: IndexMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WalkConfig {
    /// Filenames reserved for shared test fixtures; never derived
    pub exclude: Vec<String>,

    /// Extensions of derivable sources
    pub extensions: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PostprocessConfig {
    /// Reformatter argv; gets the full text on stdin (e.g. ["black", "-"])
    pub formatter: Option<Vec<String>>,

    /// Import sorter argv; the file path is appended (e.g. ["isort"])
    pub import_sorter: Option<Vec<String>>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rules: vec![RuleConfig {
                source_root: "src/_async".to_string(),
                dest_root: "src/_sync".to_string(),
                replacements: IndexMap::new(),
            }],
            walk: WalkConfig::default(),
            postprocess: PostprocessConfig::default(),
        }
    }
}

impl Default for WalkConfig {
    fn default() -> Self {
        Self {
            exclude: vec!["conftest.py".to_string()],
            extensions: vec!["py".to_string()],
        }
    }
}

impl Config {
    /// Expand rule roots and build the immutable rule set used by the
    /// driver. Constructed once per run, never mutated.
    pub fn resolved_rules(&self) -> Result<Vec<Rule>> {
        self.rules
            .iter()
            .map(|rc| {
                Ok(Rule {
                    source_root: expand_path(&rc.source_root)?,
                    dest_root: expand_path(&rc.dest_root)?,
                    renamer: Renamer::with_defaults(&rc.replacements),
                })
            })
            .collect()
    }
}

fn expand_path(raw: &str) -> Result<PathBuf> {
    let expanded = shellexpand::full(raw).with_context(|| format!("expand path {raw:?}"))?;
    Ok(PathBuf::from(expanded.as_ref()))
}

pub fn load_config() -> Result<Config> {
    let mut builder = config::Config::builder();

    // Load from config files in priority order
    let config_paths = ["desync.toml", ".desync.toml"];

    for path in &config_paths {
        if std::path::Path::new(path).exists() {
            builder = builder.add_source(config::File::with_name(path));
            break;
        }
    }

    // Add environment variables with DESYNC_ prefix
    builder = builder.add_source(config::Environment::with_prefix("DESYNC").separator("_"));

    let cfg = builder.build().context("Failed to load configuration")?;
    let parsed: Config = cfg
        .try_deserialize()
        .context("Failed to parse configuration")?;

    Ok(parsed)
}

pub fn init(args: InitArgs, ctx: &AppContext) -> Result<()> {
    let config_path = args.path.join("desync.toml");

    if config_path.exists() && !args.force {
        anyhow::bail!(
            "Config file already exists at {}. Use --force to overwrite.",
            config_path.display()
        );
    }

    let config = Config::default();
    let toml_string =
        toml::to_string_pretty(&config).context("Failed to serialize default config")?;

    std::fs::write(&config_path, toml_string).context("Failed to write config file")?;

    if !ctx.quiet {
        println!("Created config file at {}", config_path.display());
    }
    Ok(())
}
