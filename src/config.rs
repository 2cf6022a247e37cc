use anyhow::{Context, Result};
use regex::Regex;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Name of the project config file.
pub const CONFIG_FILE: &str = "quartodocs.json";

/// Top-level quartodocs.json schema.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuartoDocsConfig {
    /// Quarto executable; looked up on PATH when unset.
    #[serde(default)]
    pub quarto_path: Option<PathBuf>,

    #[serde(default = "default_docs_dir")]
    pub docs_dir: String,

    /// Where rewritten markdown goes. `None` writes next to the source.
    #[serde(default)]
    pub out_dir: Option<String>,

    /// Keep Quarto's intermediate files in the docs dir after an `outDir` build.
    #[serde(default)]
    pub keep_out: bool,

    /// Regex matched against full source paths; matches are not rendered.
    #[serde(default)]
    pub ignore: Option<String>,

    #[serde(default = "default_true")]
    pub normalize_directives: bool,
}

fn default_docs_dir() -> String {
    "docs".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for QuartoDocsConfig {
    fn default() -> Self {
        Self {
            quarto_path: None,
            docs_dir: default_docs_dir(),
            out_dir: None,
            keep_out: false,
            ignore: None,
            normalize_directives: true,
        }
    }
}

impl QuartoDocsConfig {
    /// Compile the `ignore` pattern, if any.
    pub fn ignore_regex(&self) -> Result<Option<Regex>> {
        self.ignore
            .as_deref()
            .map(|pattern| {
                Regex::new(pattern)
                    .with_context(|| format!("Invalid ignore pattern '{pattern}'"))
            })
            .transpose()
    }

    pub fn preprocess_options(&self) -> cell_parse::PreprocessOptions {
        cell_parse::PreprocessOptions {
            normalize_directives: self.normalize_directives,
        }
    }
}

/// Load config from a quartodocs.json file, or return defaults if missing.
pub fn load_config(project_root: &Path) -> Result<QuartoDocsConfig> {
    let config_path = project_root.join(CONFIG_FILE);

    if config_path.exists() {
        let raw = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;
        let config: QuartoDocsConfig = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse {}", config_path.display()))?;
        config.ignore_regex()?;
        Ok(config)
    } else {
        Ok(QuartoDocsConfig::default())
    }
}

/// Find the project root by walking up from `start` looking for
/// quartodocs.json or mkdocs.yml.
pub fn find_project_root(start: &Path) -> Result<PathBuf> {
    let mut dir = start;

    loop {
        if dir.join(CONFIG_FILE).exists() || dir.join("mkdocs.yml").exists() {
            return Ok(dir.to_path_buf());
        }
        match dir.parent() {
            Some(parent) => dir = parent,
            None => {
                anyhow::bail!(
                    "No {} or mkdocs.yml found in {} or any parent directory",
                    CONFIG_FILE,
                    start.display()
                );
            }
        }
    }
}
