use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::ArgAction;
use clap::{Args, Parser, Subcommand};
use dupsafe_core::{
    human_bytes, render_markdown_summary, DocumentDeduplicator, DuplicateDetector,
    DuplicateReport, EngineConfig, HashAlgorithm, ImageDeduplicator, PerceptualVariant,
    SimilarityBand,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "dupsafe",
    version,
    about = "Find exact, visual and textual duplicates and remove them with a restorable backup."
)]
struct Cli {
    /// JSON configuration file.
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Backup store directory (overrides the config file).
    #[arg(long, global = true, value_name = "DIR")]
    backup_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Group byte-identical files under a directory.
    Scan(ScanArgs),
    /// List files with the same content as a given file.
    Find(FindArgs),
    /// Group visually similar images.
    Images(ImagesArgs),
    /// Group documents with near-identical text.
    Documents(DocumentsArgs),
    /// Manage the backup store.
    #[command(subcommand)]
    Backup(BackupCommand),
    /// Back up files, then delete the originals.
    Remove(RemoveArgs),
}

#[derive(Debug, Args)]
struct ScanArgs {
    /// Directory to scan.
    dir: PathBuf,

    /// Hash algorithm (md5, sha256, blake3).
    #[arg(long)]
    algorithm: Option<HashAlgorithm>,

    /// Ignore files smaller than this.
    #[arg(long, value_name = "BYTES")]
    min_size: Option<u64>,

    /// Ignore files larger than this.
    #[arg(long, value_name = "BYTES")]
    max_size: Option<u64>,

    /// Only consider paths matching these globs (repeatable).
    #[arg(long = "include", value_name = "GLOB", num_args = 1.., action = ArgAction::Append)]
    include: Vec<String>,

    /// Skip paths matching these globs (repeatable).
    #[arg(long = "exclude", value_name = "GLOB", num_args = 1.., action = ArgAction::Append)]
    exclude: Vec<String>,

    /// Only scan the top level of the directory.
    #[arg(long)]
    no_recursive: bool,

    /// Also cluster similar images.
    #[arg(long)]
    images: bool,

    /// Also cluster near-identical documents.
    #[arg(long)]
    documents: bool,

    /// Emit progress log events while hashing.
    #[arg(long)]
    progress: bool,

    /// Write the full report as JSON.
    #[arg(long, value_name = "FILE")]
    json: Option<PathBuf>,

    /// Write a markdown summary.
    #[arg(long, value_name = "FILE")]
    md: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct FindArgs {
    /// File whose copies should be found.
    file: PathBuf,

    /// Directory to search.
    dir: PathBuf,
}

#[derive(Debug, Args)]
struct ImagesArgs {
    /// Directory to scan.
    dir: PathBuf,

    /// Fingerprint variant (perceptual, difference, average).
    #[arg(long)]
    variant: Option<PerceptualVariant>,

    /// Maximum Hamming distance for two images to match.
    #[arg(long)]
    threshold: Option<u32>,

    /// Only report images similar to this one.
    #[arg(long, value_name = "FILE")]
    similar_to: Option<PathBuf>,

    /// Only scan the top level of the directory.
    #[arg(long)]
    no_recursive: bool,
}

#[derive(Debug, Args)]
struct DocumentsArgs {
    /// Directory to scan.
    dir: PathBuf,

    /// Minimum cosine similarity for two documents to match.
    #[arg(long)]
    threshold: Option<f32>,

    /// Persist document vectors in this directory.
    #[arg(long, value_name = "DIR")]
    cache_dir: Option<PathBuf>,

    /// Only scan the top level of the directory.
    #[arg(long)]
    no_recursive: bool,
}

#[derive(Debug, Subcommand)]
enum BackupCommand {
    /// Copy files into the backup store.
    Create {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Copy a backup back to its original location or to `--to`.
    Restore {
        backup: PathBuf,
        #[arg(long, value_name = "PATH")]
        to: Option<PathBuf>,
    },
    /// Delete a backup and its manifest entry.
    Forget { backup: PathBuf },
    /// Delete backups older than the given age.
    Cleanup {
        #[arg(long)]
        days: Option<i64>,
    },
    /// Report missing or truncated backups.
    Verify,
    /// List backups, most recent first.
    List,
    /// Show backup store totals.
    Stats,
}

#[derive(Debug, Args)]
struct RemoveArgs {
    #[arg(required = true)]
    files: Vec<PathBuf>,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    if let Some(dir) = cli.backup_dir {
        config.backup.dir = dir;
    }

    match cli.command {
        Commands::Scan(args) => run_scan_command(config, args),
        Commands::Find(args) => run_find_command(config, args),
        Commands::Images(args) => run_images_command(config, args),
        Commands::Documents(args) => run_documents_command(config, args),
        Commands::Backup(command) => run_backup_command(config, command),
        Commands::Remove(args) => run_remove_command(config, args),
    }
}

fn run_scan_command(mut config: EngineConfig, args: ScanArgs) -> Result<()> {
    let ScanArgs {
        dir,
        algorithm,
        min_size,
        max_size,
        include,
        exclude,
        no_recursive,
        images,
        documents,
        progress,
        json,
        md,
    } = args;

    if let Some(algorithm) = algorithm {
        config.hashing.algorithm = algorithm;
    }
    if let Some(min_size) = min_size {
        config.scan.min_size = min_size;
    }
    if max_size.is_some() {
        config.scan.max_size = max_size;
    }
    config.scan.include.extend(include);
    config.scan.exclude.extend(exclude);
    if no_recursive {
        config.scan.recursive = false;
    }
    config.validate()?;

    let recursive = config.scan.recursive;
    let mut detector = DuplicateDetector::new(config.hashing.hasher()?, config.scan.clone());
    let summary = detector.scan_directory_with_progress(&dir, |processed, total| {
        if progress && (processed % 100 == 0 || processed == total) {
            info!(processed, total, "hashing");
        }
    })?;

    let mut report = DuplicateReport::new(summary, detector.statistics(), detector.duplicates());
    if images {
        report.image_clusters = ImageDeduplicator::new(config.images)?.find_duplicates(&dir, recursive)?;
    }
    if documents {
        report.document_clusters =
            DocumentDeduplicator::new(config.documents.clone())?.find_duplicates(&dir, recursive)?;
    }

    println!(
        "Scanned {} file(s) in {} ms: {} hashed, {} skipped by size, {} failed.",
        report.summary.files_seen,
        report.summary.elapsed_ms,
        report.summary.files_hashed,
        report.summary.size_unique_files,
        report.summary.hash_failures
    );
    println!(
        "{} duplicate group(s), {} redundant file(s), {} reclaimable.",
        report.statistics.duplicate_groups,
        report.statistics.duplicate_files - report.statistics.duplicate_groups,
        human_bytes(report.statistics.wasted_space)
    );
    for group in &report.groups {
        println!(
            "- {} x {} ({} reclaimable)",
            group.count,
            human_bytes(group.size),
            human_bytes(group.wasted_space)
        );
        for file in &group.files {
            println!("    {}", file.path.display());
        }
    }
    if images {
        println!("{} similar image cluster(s).", report.image_clusters.len());
    }
    if documents {
        println!(
            "{} similar document cluster(s).",
            report.document_clusters.len()
        );
    }

    if let Some(output) = json {
        let payload = serde_json::to_string_pretty(&report).context("failed to serialize report")?;
        fs::write(&output, payload)
            .with_context(|| format!("failed to write report to {}", output.display()))?;
        println!("Report written to {}", output.display());
    }
    if let Some(md_path) = md {
        fs::write(&md_path, render_markdown_summary(&report)).with_context(|| {
            format!("failed to write markdown summary to {}", md_path.display())
        })?;
        println!("Markdown summary written to {}", md_path.display());
    }

    Ok(())
}

fn run_find_command(config: EngineConfig, args: FindArgs) -> Result<()> {
    let mut detector = DuplicateDetector::new(config.hashing.hasher()?, config.scan);
    let matches = detector.find_duplicates_of_file(&args.file, &args.dir)?;
    if matches.is_empty() {
        println!("No copies of {} under {}", args.file.display(), args.dir.display());
    } else {
        println!("{} cop(ies) of {}:", matches.len(), args.file.display());
        for item in matches {
            println!("- {}", item.path.display());
        }
    }
    Ok(())
}

fn run_images_command(mut config: EngineConfig, args: ImagesArgs) -> Result<()> {
    if let Some(variant) = args.variant {
        config.images.variant = variant;
    }
    if let Some(threshold) = args.threshold {
        config.images.threshold = threshold;
    }
    let matcher = ImageDeduplicator::new(config.images)?;
    let recursive = !args.no_recursive;

    if let Some(target) = args.similar_to {
        let hits = matcher.find_similar(&target, &args.dir, recursive)?;
        println!(
            "{} image(s) similar to {} ({}):",
            hits.len(),
            target.display(),
            config.images.variant
        );
        for (path, distance) in hits {
            println!(
                "- {} (distance {}, {:?})",
                path.display(),
                distance,
                SimilarityBand::from_distance(distance)
            );
        }
        return Ok(());
    }

    let clusters = matcher.find_duplicates(&args.dir, recursive)?;
    println!(
        "{} cluster(s) of similar images ({}, threshold {}):",
        clusters.len(),
        config.images.variant,
        config.images.threshold
    );
    for (index, cluster) in clusters.iter().enumerate() {
        println!(
            "- cluster {} (max distance {}):",
            index + 1,
            cluster.max_distance
        );
        for path in &cluster.paths {
            println!("    {}", path.display());
        }
    }
    Ok(())
}

fn run_documents_command(mut config: EngineConfig, args: DocumentsArgs) -> Result<()> {
    if let Some(threshold) = args.threshold {
        config.documents.similarity_threshold = threshold;
    }
    if args.cache_dir.is_some() {
        config.documents.cache_dir = args.cache_dir;
    }
    let clusters = DocumentDeduplicator::new(config.documents.clone())?
        .find_duplicates(&args.dir, !args.no_recursive)?;

    println!(
        "{} cluster(s) of near-identical documents (threshold {:.2}):",
        clusters.len(),
        config.documents.similarity_threshold
    );
    for (index, cluster) in clusters.iter().enumerate() {
        println!(
            "- cluster {} (similarity {:.3}, ~{} reclaimable):",
            index + 1,
            cluster.average_similarity,
            human_bytes(cluster.estimated_wasted_space)
        );
        for path in &cluster.paths {
            println!("    {}", path.display());
        }
    }
    Ok(())
}

fn run_backup_command(config: EngineConfig, command: BackupCommand) -> Result<()> {
    let manager = config.backup.manager()?;

    match command {
        BackupCommand::Create { files } => {
            for file in files {
                let record = manager.create_backup(&file)?;
                println!(
                    "{} -> {}",
                    record.original_path.display(),
                    record.backup_path.display()
                );
            }
        }
        BackupCommand::Restore { backup, to } => {
            let restored = manager.restore_backup(&backup, to.as_deref())?;
            println!("Restored {}", restored.display());
        }
        BackupCommand::Forget { backup } => {
            let record = manager.forget_backup(&backup)?;
            println!("Forgot backup of {}", record.original_path.display());
        }
        BackupCommand::Cleanup { days } => {
            let days = days.unwrap_or(config.backup.max_age_days);
            let removed = manager.cleanup_old_backups(days)?;
            println!("Removed {} backup(s) older than {} day(s).", removed.len(), days);
        }
        BackupCommand::Verify => {
            let issues = manager.verify_backups()?;
            if issues.is_empty() {
                println!("All backups verified.");
            } else {
                println!("{} problem(s) found:", issues.len());
                for issue in issues {
                    println!(
                        "- {}",
                        serde_json::to_string(&issue).context("failed to serialize issue")?
                    );
                }
            }
        }
        BackupCommand::List => {
            for record in manager.list_backups()? {
                println!(
                    "{}  {}  {}  <- {}",
                    record.backup_time.format("%Y-%m-%d %H:%M:%S"),
                    human_bytes(record.file_size),
                    record.backup_path.display(),
                    record.original_path.display()
                );
            }
        }
        BackupCommand::Stats => {
            let stats = manager.statistics()?;
            println!("Backup directory: {}", stats.backup_dir.display());
            println!(
                "{} backup(s), {} total",
                stats.total_backups,
                human_bytes(stats.total_size)
            );
            if let (Some(oldest), Some(newest)) = (stats.oldest, stats.newest) {
                println!("Oldest: {oldest}, newest: {newest}");
            }
        }
    }

    Ok(())
}

fn run_remove_command(config: EngineConfig, args: RemoveArgs) -> Result<()> {
    let manager = config.backup.manager()?;
    let mut failures = 0_usize;
    for file in &args.files {
        match manager.remove_with_backup(file) {
            Ok(record) => println!(
                "Removed {} (backup at {})",
                file.display(),
                record.backup_path.display()
            ),
            Err(err) => {
                failures += 1;
                eprintln!("Kept {}: {}", file.display(), err);
            }
        }
    }
    if failures > 0 {
        anyhow::bail!("{failures} file(s) could not be removed");
    }
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
