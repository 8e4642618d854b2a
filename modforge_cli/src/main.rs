use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use modforge_common::{load_config, ForgeConfig};
use modforge_core::{
    copy_archive_fresh, default_record_path, extract_archive, strip, ChecksumGate, CopyReport,
    DiffOptions, Differ, FilterSet, PatchOptions, Patcher,
};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "modforge")]
#[command(author = "Modforge Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Archive filtering, source patching and checksum gating for mod builds", long_about = None)]
struct Cli {
    /// Configuration file (defaults to the per-user modforge.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Copy matching entries of an archive into a new archive
    Copy {
        /// Source archive
        input: PathBuf,

        /// Destination archive (replaced if it exists)
        output: PathBuf,

        /// Glob of entries to keep; repeatable. Nothing given keeps everything
        #[arg(short, long)]
        include: Vec<String>,
    },

    /// Extract matching entries of an archive into a directory
    Extract {
        /// Source archive
        input: PathBuf,

        /// Destination directory (cleared first)
        dir: PathBuf,

        #[arg(short, long)]
        include: Vec<String>,
    },

    /// Write a copy of an archive without the entries that do not match
    Strip {
        /// Source archive
        input: PathBuf,

        /// Destination archive, may be the source itself
        output: PathBuf,

        #[arg(short, long)]
        include: Vec<String>,
    },

    /// Write unified diffs for every baseline file that differs
    Diff {
        baseline: PathBuf,
        modified: PathBuf,

        /// Directory receiving the patch files (cleared first)
        patch_dir: PathBuf,
    },

    /// Rebuild a tree from a baseline plus a directory of patches
    Patch {
        baseline: PathBuf,
        patch_dir: PathBuf,

        /// Output directory (cleared first)
        output: PathBuf,
    },

    /// Report whether a file changed since its checksum was last recorded
    Checksum {
        content: PathBuf,

        /// Record file (defaults to <content>.blake3)
        #[arg(short, long)]
        record: Option<PathBuf>,
    },
}

fn main() {
    // Logs go to stderr so command output on stdout stays clean
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let loaded = load_config(cli.config.as_deref()).context("Failed to load configuration")?;
    if loaded.exists {
        debug!("Using configuration {}", loaded.path.display());
    }
    let config = loaded.config;

    match cli.command {
        Commands::Copy {
            input,
            output,
            include,
        } => {
            let filters = filters_for(include, &config)?;
            let report = copy_archive_fresh(&input, &output, &filters)
                .with_context(|| format!("Copy of {} failed", input.display()))?;
            print_copy_report(&report);
        }
        Commands::Extract {
            input,
            dir,
            include,
        } => {
            let filters = filters_for(include, &config)?;
            let report = extract_archive(&input, &dir, &filters)
                .with_context(|| format!("Extraction of {} failed", input.display()))?;
            print_copy_report(&report);
        }
        Commands::Strip {
            input,
            output,
            include,
        } => {
            let filters = filters_for(include, &config)?;
            let report = strip(&input, &output, &filters)
                .with_context(|| format!("Stripping {} failed", input.display()))?;
            print_copy_report(&report);
        }
        Commands::Diff {
            baseline,
            modified,
            patch_dir,
        } => {
            let differ = Differ::with_options(DiffOptions::from(&config));
            let report = differ
                .diff_trees(&baseline, &modified, &patch_dir)
                .context("Diff failed")?;
            for name in &report.patches_written {
                println!("{}", name);
            }
            info!(
                "{} patches, {} unchanged files",
                report.patches_written.len(),
                report.unchanged
            );
        }
        Commands::Patch {
            baseline,
            patch_dir,
            output,
        } => {
            let patcher = Patcher::with_options(PatchOptions::from(&config));
            let report = patcher
                .apply(&baseline, &patch_dir, &output)
                .context("Patching failed")?;
            println!(
                "copied {} files, patched {}",
                report.files_copied, report.files_patched
            );
        }
        Commands::Checksum { content, record } => {
            let record = record.unwrap_or_else(|| default_record_path(&content));
            run_checksum(&content, &record)?;
        }
    }

    Ok(())
}

/// Command-line globs win; otherwise the configured `include` list applies.
fn filters_for(include: Vec<String>, config: &ForgeConfig) -> Result<FilterSet> {
    let patterns = if include.is_empty() {
        config.include.clone()
    } else {
        include
    };
    FilterSet::new(&patterns).context("Invalid include pattern")
}

fn run_checksum(content: &Path, record: &Path) -> Result<()> {
    let unchanged = ChecksumGate::new()
        .is_unchanged(content, record)
        .with_context(|| format!("Checksum of {} failed", content.display()))?;
    println!("{}", if unchanged { "unchanged" } else { "changed" });
    Ok(())
}

fn print_copy_report(report: &CopyReport) {
    println!("copied {}, skipped {}", report.copied, report.skipped);
}
