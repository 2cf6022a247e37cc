//! Running `quarto render --to=markdown`.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::Command;

/// Locate the Quarto executable: the configured path if given, else `quarto` on PATH.
pub fn resolve_quarto(configured: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = configured {
        if !path.exists() {
            anyhow::bail!("Configured quartoPath '{}' does not exist", path.display());
        }
        return Ok(path.to_path_buf());
    }

    which::which("quarto").context(
        "Could not find 'quarto' on PATH. Install Quarto or set quartoPath in quartodocs.json",
    )
}

/// The markdown file Quarto writes next to `source`.
pub fn rendered_path(source: &Path) -> PathBuf {
    source.with_extension("md")
}

/// Render one `.qmd` file to markdown and return the path of the result.
///
/// Quarto runs inside the source's directory so its artifacts
/// (`<stem>_files/`) land next to the source.
pub fn render_markdown(quarto: &Path, source: &Path) -> Result<PathBuf> {
    let dir = source
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let name = source
        .file_name()
        .ok_or_else(|| anyhow::anyhow!("'{}' has no file name", source.display()))?;

    tracing::info!(source = %source.display(), "rendering");

    let output = Command::new(quarto)
        .current_dir(dir)
        .arg("render")
        .arg(name)
        .arg("--to=markdown")
        .output()
        .with_context(|| format!("Failed to run {}", quarto.display()))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!(
            "quarto render failed for '{}' ({}):\n{}",
            source.display(),
            output.status,
            stderr.trim_end()
        );
    }

    let rendered = rendered_path(source);
    if !rendered.exists() {
        anyhow::bail!(
            "quarto render succeeded but '{}' was not produced",
            rendered.display()
        );
    }

    Ok(rendered)
}
