use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod build;
mod config;
mod nav;
mod render;
mod snapshot;

#[derive(Parser)]
#[command(
    name = "quartodocs",
    version,
    about = "Render Quarto documents into MkDocs-ready markdown"
)]
struct Cli {
    /// Suppress non-essential output
    #[arg(long, global = true)]
    quiet: bool,

    /// Show debug logs on stderr
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum RenderFormat {
    /// Rewritten markdown
    Markdown,
    /// Parsed block tree as JSON
    Tree,
}

#[derive(Subcommand)]
enum Commands {
    /// Rewrite an already-rendered Quarto markdown file
    Preprocess {
        /// Path to the rendered .md file
        file: String,

        /// Output format
        #[arg(long, value_enum, default_value = "markdown")]
        format: RenderFormat,

        /// Write to this file instead of stdout
        #[arg(long)]
        out: Option<String>,
    },

    /// Report diagnostics for rendered markdown file(s)
    Check {
        /// Path to the .md file(s)
        files: Vec<String>,

        /// Fail on warnings as well as errors
        #[arg(long)]
        strict: bool,
    },

    /// Render every .qmd under the docs dir and rewrite the output
    Build {
        /// Rebuild whenever a .qmd file changes
        #[arg(long)]
        watch: bool,
    },

    /// Print the mkdocs.yml nav with .qmd entries pointing at .md
    Nav {
        /// Path to mkdocs.yml
        file: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Preprocess { file, format, out } => {
            handle_preprocess(&file, format, out.as_deref(), cli.quiet)?;
        }
        Commands::Check { files, strict } => {
            handle_check(&files, strict)?;
        }
        Commands::Build { watch } => {
            handle_build(watch, cli.quiet)?;
        }
        Commands::Nav { file } => {
            nav::handle_nav(&file)?;
        }
    }

    Ok(())
}

/// Logs go to stderr so stdout stays clean for rewritten output.
/// `RUST_LOG` overrides the default filter.
fn init_logging(verbose: bool) {
    let default = if verbose {
        "quartodocs=debug,cell_parse=debug"
    } else {
        "quartodocs=info,cell_parse=warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(true).compact())
        .try_init();
}

fn handle_preprocess(
    file: &str,
    format: RenderFormat,
    out: Option<&str>,
    quiet: bool,
) -> Result<()> {
    let content =
        std::fs::read_to_string(file).with_context(|| format!("Failed to read '{file}'"))?;

    let root = std::env::current_dir()
        .ok()
        .and_then(|cwd| config::find_project_root(&cwd).ok());
    let options = match root {
        Some(root) => config::load_config(&root)?.preprocess_options(),
        None => config::QuartoDocsConfig::default().preprocess_options(),
    };

    let result = cell_parse::parse_with(&content, &options)
        .with_context(|| format!("Failed to rewrite '{file}'"))?;

    for diag in &result.diagnostics {
        let line_info = match diag.span {
            Some(span) => format!("{}:{}", file, span.start_line),
            None => file.to_string(),
        };
        eprintln!("{}: {}", line_info, diag.message);
    }

    let output = match format {
        RenderFormat::Markdown => result.doc.to_markdown(),
        RenderFormat::Tree => {
            let mut json = serde_json::to_string_pretty(&result.doc)?;
            json.push('\n');
            json
        }
    };

    match out {
        Some(path) => {
            std::fs::write(path, &output).with_context(|| format!("Failed to write '{path}'"))?;
            if !quiet {
                println!("{} {}", "Wrote".green().bold(), path);
            }
        }
        None => print!("{output}"),
    }

    Ok(())
}

fn handle_check(files: &[String], strict: bool) -> Result<()> {
    let mut has_errors = false;

    for file in files {
        let content =
            std::fs::read_to_string(file).with_context(|| format!("Failed to read '{file}'"))?;

        let result = cell_parse::parse(&content)
            .with_context(|| format!("Failed to parse '{file}'"))?;

        let mut all_diagnostics = result.diagnostics;
        all_diagnostics.extend(result.doc.validate());

        if all_diagnostics.is_empty() {
            println!("{}: {}", file, "OK".green());
            continue;
        }

        for diag in &all_diagnostics {
            let severity_str = match diag.severity {
                cell_parse::Severity::Error => {
                    has_errors = true;
                    format!("{}", "error".red().bold())
                }
                cell_parse::Severity::Warning => {
                    has_errors |= strict;
                    format!("{}", "warning".yellow().bold())
                }
                cell_parse::Severity::Info => format!("{}", "info".cyan().bold()),
            };

            let line_info = match diag.span {
                Some(span) => format!("{}:{}", file, span.start_line),
                None => file.to_string(),
            };

            let code_str = match &diag.code {
                Some(c) => format!("[{c}] "),
                None => String::new(),
            };

            println!("{line_info}: {severity_str}: {code_str}{}", diag.message);
        }
    }

    if has_errors {
        std::process::exit(1);
    }

    Ok(())
}

fn handle_build(watch: bool, quiet: bool) -> Result<()> {
    let cwd = std::env::current_dir().context("Failed to get current directory")?;
    let root = config::find_project_root(&cwd)?;
    let config = config::load_config(&root)?;

    let report = build::run_build(&root, &config, quiet)?;
    if !quiet || report.has_failures() {
        report.print_summary();
    }

    if watch {
        return build::watch_and_rebuild(&root, &config, quiet);
    }

    if report.has_failures() {
        anyhow::bail!("{} of the sources failed to build", report.failed.len());
    }

    Ok(())
}
