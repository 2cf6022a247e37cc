//! `quartodocs build`: render every `.qmd` under the docs dir and rewrite the
//! result for MkDocs.
//!
//! Output goes next to each source, or under `outDir` (mirroring relative
//! paths) together with the artifacts Quarto produced. Artifacts left in the
//! docs dir by an `outDir` build are removed unless `keepOut` is set.

use anyhow::{Context, Result};
use colored::Colorize;
use notify::{EventKind, RecursiveMode, Watcher};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::{Duration, Instant};
use walkdir::WalkDir;

use crate::config::QuartoDocsConfig;
use crate::render;
use crate::snapshot::DirSnapshot;

/// Aggregate report from one build.
#[derive(Debug, Default)]
pub struct BuildReport {
    pub written: Vec<PathBuf>,
    pub ignored: usize,
    pub artifacts_copied: usize,
    pub cleaned: usize,
    pub diagnostics: usize,
    pub failed: Vec<(PathBuf, String)>,
    pub warnings: Vec<String>,
}

impl BuildReport {
    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }

    pub fn print_summary(&self) {
        println!();
        println!("{}", "========================================".dimmed());
        if self.has_failures() {
            println!("{}", "Build finished with errors".red().bold());
        } else {
            println!("{}", "Build complete!".green().bold());
        }
        println!();

        let mut parts = vec![format!("{} written", self.written.len())];
        if self.ignored > 0 {
            parts.push(format!("{} ignored", self.ignored));
        }
        if self.artifacts_copied > 0 {
            parts.push(format!("{} artifacts copied", self.artifacts_copied));
        }
        if self.cleaned > 0 {
            parts.push(format!("{} cleaned up", self.cleaned));
        }
        if self.diagnostics > 0 {
            parts.push(format!("{} diagnostics", self.diagnostics));
        }
        println!("Pages: {}", parts.join(", "));

        for (source, message) in &self.failed {
            println!("{} {}: {}", "ERROR:".red(), source.display(), message);
        }
        for w in &self.warnings {
            println!("{} {}", "WARNING:".yellow(), w);
        }
    }
}

/// Find `.qmd` sources under `docs_dir`, skipping paths that match `ignore`.
/// Returns the sources (sorted) and the number skipped.
pub fn discover_sources(docs_dir: &Path, ignore: Option<&Regex>) -> Result<(Vec<PathBuf>, usize)> {
    let mut sources = Vec::new();
    let mut ignored = 0;

    for entry in WalkDir::new(docs_dir).min_depth(1).sort_by_file_name() {
        let entry = entry.with_context(|| format!("Failed to walk {}", docs_dir.display()))?;
        let path = entry.path();
        if !entry.file_type().is_file() || path.extension().is_none_or(|ext| ext != "qmd") {
            continue;
        }
        if ignore.is_some_and(|re| re.is_match(&path.to_string_lossy())) {
            tracing::debug!(source = %path.display(), "ignored");
            ignored += 1;
            continue;
        }
        sources.push(path.to_path_buf());
    }

    Ok((sources, ignored))
}

/// Run a full build of the project rooted at `root`.
pub fn run_build(root: &Path, config: &QuartoDocsConfig, quiet: bool) -> Result<BuildReport> {
    let docs_dir = root.join(&config.docs_dir);
    if !docs_dir.is_dir() {
        anyhow::bail!("Docs directory '{}' does not exist", docs_dir.display());
    }

    let out_dir = config.out_dir.as_ref().map(|d| root.join(d));
    if let Some(out) = &out_dir {
        if out.starts_with(&docs_dir) {
            anyhow::bail!(
                "outDir '{}' must not be inside docsDir '{}'",
                out.display(),
                docs_dir.display()
            );
        }
    }

    let ignore = config.ignore_regex()?;
    let options = config.preprocess_options();
    let mut report = BuildReport::default();

    let (sources, ignored) = discover_sources(&docs_dir, ignore.as_ref())?;
    report.ignored = ignored;

    if sources.is_empty() {
        report
            .warnings
            .push(format!("No .qmd files found under {}", docs_dir.display()));
        return Ok(report);
    }

    let quarto_path = config.quarto_path.as_deref().map(|p| root.join(p));
    let quarto = render::resolve_quarto(quarto_path.as_deref())?;
    tracing::debug!(quarto = %quarto.display(), sources = sources.len(), "starting build");

    if !quiet {
        println!(
            "{} {} {}",
            "quartodocs build".bold(),
            format!("({} sources)", sources.len()).dimmed(),
            format!("- {}", docs_dir.display()).dimmed()
        );
    }

    let snapshot = DirSnapshot::take(&docs_dir)?;
    let mut rendered_outputs = Vec::new();

    for source in &sources {
        match build_one(&quarto, source, &docs_dir, out_dir.as_deref(), &options) {
            Ok((rendered, dest, diagnostics)) => {
                if !quiet {
                    println!("  {} {}", "wrote".green(), dest.display());
                }
                report.diagnostics += diagnostics;
                rendered_outputs.push(rendered);
                report.written.push(dest);
            }
            Err(e) => {
                tracing::warn!(source = %source.display(), "build failed");
                if !quiet {
                    println!("  {} {}", "failed".red(), source.display());
                }
                report.failed.push((source.clone(), format!("{e:#}")));
            }
        }
    }

    if let Some(out) = &out_dir {
        // Raw markdown from failed renders is never published.
        rendered_outputs.extend(
            report
                .failed
                .iter()
                .map(|(source, _)| render::rendered_path(source)),
        );

        for rel in snapshot.new_files()? {
            let path = docs_dir.join(&rel);
            if rendered_outputs.contains(&path) {
                continue;
            }
            let dest = out.join(&rel);
            if let Some(parent) = dest.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            std::fs::copy(&path, &dest)
                .with_context(|| format!("Failed to copy {} to {}", path.display(), dest.display()))?;
            report.artifacts_copied += 1;
        }

        if !config.keep_out {
            report.cleaned = snapshot.remove_new_files()?;
        }
    }

    Ok(report)
}

/// Render, rewrite and write one source. Returns the rendered markdown path,
/// the written destination and the number of parser diagnostics.
fn build_one(
    quarto: &Path,
    source: &Path,
    docs_dir: &Path,
    out_dir: Option<&Path>,
    options: &cell_parse::PreprocessOptions,
) -> Result<(PathBuf, PathBuf, usize)> {
    let rendered = render::render_markdown(quarto, source)?;
    let content = std::fs::read_to_string(&rendered)
        .with_context(|| format!("Failed to read {}", rendered.display()))?;

    let result = cell_parse::parse_with(&content, options)
        .with_context(|| format!("Failed to rewrite {}", rendered.display()))?;
    for diag in &result.diagnostics {
        let line = diag.span.map(|s| s.start_line).unwrap_or(0);
        if diag.severity == cell_parse::Severity::Info {
            tracing::debug!(file = %rendered.display(), line, "{}", diag.message);
        } else {
            tracing::warn!(file = %rendered.display(), line, "{}", diag.message);
        }
    }

    let dest = match out_dir {
        Some(out) => out.join(rendered.strip_prefix(docs_dir).unwrap_or(&rendered)),
        None => rendered.clone(),
    };
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    std::fs::write(&dest, result.doc.to_markdown())
        .with_context(|| format!("Failed to write {}", dest.display()))?;

    Ok((rendered, dest, result.diagnostics.len()))
}

/// Watch the docs dir and rebuild whenever a `.qmd` file is created or saved.
///
/// Debounces rapid events (e.g. editors that write in stages) with a 200ms window.
/// Ctrl+C exits cleanly.
pub fn watch_and_rebuild(root: &Path, config: &QuartoDocsConfig, quiet: bool) -> Result<()> {
    let docs_dir = root.join(&config.docs_dir);

    println!(
        "{} {} for changes (Ctrl+C to stop)",
        "Watching".cyan().bold(),
        docs_dir.display()
    );

    let (tx, rx) = mpsc::channel();
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        if let Ok(event) = res {
            let _ = tx.send(event);
        }
    })?;

    watcher.watch(&docs_dir, RecursiveMode::Recursive)?;

    let mut last_rebuild = Instant::now();
    let debounce = Duration::from_millis(200);

    loop {
        match rx.recv_timeout(Duration::from_secs(1)) {
            Ok(event) => {
                let relevant = matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_));
                let touches_source = event
                    .paths
                    .iter()
                    .any(|p| p.extension().is_some_and(|ext| ext == "qmd"));

                if relevant && touches_source && last_rebuild.elapsed() > debounce {
                    // Small delay to let the editor finish writing
                    std::thread::sleep(Duration::from_millis(50));

                    match run_build(root, config, quiet) {
                        Ok(report) => {
                            if !quiet {
                                report.print_summary();
                            }
                        }
                        Err(e) => {
                            eprintln!("{} {:#}", "Build error:".red().bold(), e);
                        }
                    }
                    // Our own writes fire events too; start the window after the build.
                    last_rebuild = Instant::now();
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                break;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn scratch(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("quartodocs-build-{name}"));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_discover_sources_with_ignore() {
        let docs = scratch("discover");
        std::fs::create_dir_all(docs.join("drafts")).unwrap();
        std::fs::write(docs.join("b.qmd"), "").unwrap();
        std::fs::write(docs.join("a.qmd"), "").unwrap();
        std::fs::write(docs.join("notes.md"), "").unwrap();
        std::fs::write(docs.join("drafts/wip.qmd"), "").unwrap();

        let re = Regex::new("drafts").unwrap();
        let (sources, ignored) = discover_sources(&docs, Some(&re)).unwrap();
        assert_eq!(sources, vec![docs.join("a.qmd"), docs.join("b.qmd")]);
        assert_eq!(ignored, 1);

        let (all, ignored) = discover_sources(&docs, None).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(ignored, 0);

        let _ = std::fs::remove_dir_all(&docs);
    }

    #[test]
    fn test_empty_docs_dir_warns() {
        let root = scratch("empty");
        std::fs::create_dir_all(root.join("docs")).unwrap();

        let report = run_build(&root, &QuartoDocsConfig::default(), true).unwrap();
        assert!(report.written.is_empty());
        assert!(!report.has_failures());
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].contains("No .qmd files"));

        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn test_missing_docs_dir_is_error() {
        let root = scratch("missing");
        let err = run_build(&root, &QuartoDocsConfig::default(), true).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn test_out_dir_inside_docs_dir_is_error() {
        let root = scratch("nested-out");
        std::fs::create_dir_all(root.join("docs")).unwrap();
        let config = QuartoDocsConfig {
            out_dir: Some("docs/site".to_string()),
            ..Default::default()
        };
        let err = run_build(&root, &config, true).unwrap_err();
        assert!(err.to_string().contains("must not be inside"));
        let _ = std::fs::remove_dir_all(&root);
    }
}
