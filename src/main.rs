//! Photo Indexer CLI
//!
//! Thin front end over the library: scan roots into the catalog, print
//! statistics and duplicate groups, re-run categorization.

use clap::{Parser, Subcommand};
use env_logger::Env;
use log::{error, info};
use std::error::Error;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use photo_indexer::config::{DEFAULT_CONFIG_FILE, DEFAULT_DB_PATH, DEFAULT_THUMBNAIL_DIR};
use photo_indexer::{Catalog, Categorizer, ScanConfig, ScanResult, Scanner, ThumbnailCache};

const ABOUT: &str = r#"
Photo Indexer - incremental photo catalog with duplicate detection

Examples:
  photo_indexer scan -r ~/Pictures                   index one directory
  photo_indexer scan -r /Volumes/Backup -r ~/Photos  index several roots
  photo_indexer scan                                 use scan_paths from the config file
  photo_indexer stats --json                         catalog statistics as JSON
  photo_indexer duplicates --limit 20                largest duplicate groups
  photo_indexer categorize                           re-run categorization
"#;

/// Incremental photo indexer
#[derive(Parser)]
#[command(name = "photo_indexer")]
#[command(author, version, about = ABOUT, long_about = None)]
struct Cli {
    /// Catalog database file
    #[arg(long, global = true, default_value = DEFAULT_DB_PATH)]
    db: PathBuf,

    /// Thumbnail cache directory
    #[arg(long, global = true, default_value = DEFAULT_THUMBNAIL_DIR)]
    thumbnails: PathBuf,

    /// JSON configuration file (scan_paths, exclude_patterns, additional_excludes)
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index new photos under one or more roots
    Scan {
        /// Root directory to scan, may be repeated
        #[arg(short = 'r', long = "root")]
        roots: Vec<PathBuf>,

        /// Worker threads (0 = auto)
        #[arg(short = 't', long, default_value = "0")]
        threads: usize,

        /// Files committed per transaction
        #[arg(short = 'b', long, default_value_t = photo_indexer::config::DEFAULT_BATCH_SIZE)]
        batch_size: usize,

        /// Maximum traversal depth
        #[arg(long)]
        max_depth: Option<usize>,

        /// Skip files larger than this many bytes
        #[arg(long)]
        max_file_size: Option<u64>,

        /// Extra exclusion pattern, may be repeated
        #[arg(short = 'x', long = "exclude")]
        excludes: Vec<String>,

        /// Also skip unlisted directories starting with '.'
        #[arg(long)]
        skip_hidden: bool,

        /// Emit JSON progress lines on stderr
        #[arg(long)]
        progress: bool,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Catalog statistics
    Stats {
        #[arg(long)]
        json: bool,
    },

    /// Groups of files with identical content
    Duplicates {
        /// Show at most this many groups
        #[arg(long)]
        limit: Option<usize>,

        #[arg(long)]
        json: bool,
    },

    /// Re-run the categorizer over every catalogued photo
    Categorize {
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode, Box<dyn Error>> {
    match cli.command {
        Commands::Scan {
            roots,
            threads,
            batch_size,
            max_depth,
            max_file_size,
            excludes,
            skip_hidden,
            progress,
            json,
        } => {
            let mut config = ScanConfig::builder()
                .roots(roots)
                .num_threads(threads)
                .batch_size(batch_size)
                .max_depth(max_depth)
                .max_file_size(max_file_size)
                .skip_hidden_dirs(skip_hidden)
                .db_path(cli.db.clone())
                .thumbnail_dir(cli.thumbnails.clone())
                .show_progress(progress)
                .build()
                .load_file(&cli.config)?;
            config.exclude_patterns.extend(excludes);

            if config.roots.is_empty() {
                return Err("no roots given and no scan_paths in the config file".into());
            }

            info!("Roots: {:?}", config.roots);
            info!(
                "Threads: {}",
                if threads == 0 {
                    "auto".to_string()
                } else {
                    threads.to_string()
                }
            );
            info!("Batch size: {}", config.effective_batch_size());
            info!("Exclude patterns: {}", config.exclude_patterns.len());

            let mut catalog = open_catalog(&config.db_path)?;
            let cache = ThumbnailCache::from_config(&config)?;
            let mut scanner = Scanner::new(&config, &mut catalog, &cache);
            let outcomes = scanner.scan_all();

            let mut failed = false;
            let mut results: Vec<ScanResult> = Vec::new();
            for (root, outcome) in config.roots.iter().zip(outcomes) {
                match outcome {
                    Ok(result) => results.push(result),
                    Err(e) => {
                        failed = true;
                        error!("{:?}: {}", root, e.message);
                    }
                }
            }

            if json {
                println!("{}", serde_json::to_string_pretty(&results)?);
            } else {
                for result in &results {
                    print_scan_result(result);
                }
            }

            Ok(if failed {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            })
        }

        Commands::Stats { json } => {
            let catalog = open_catalog(&cli.db)?;
            let stats = catalog.stats()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
                return Ok(ExitCode::SUCCESS);
            }

            println!("Photos: {}", stats.total);
            println!("Total size: {:.2} GB", stats.total_gb());
            println!("Duplicate groups: {}", stats.duplicate_groups);
            println!("Formats:");
            for (format, count) in &stats.formats {
                println!("  {:<10} {}", format.as_deref().unwrap_or("unknown"), count);
            }
            println!("Locations:");
            for location in &stats.locations {
                println!(
                    "  {} / {}: {} photos, {} bytes",
                    location.storage_location, location.volume_name, location.count, location.bytes
                );
            }
            println!("Categories:");
            for (category, count) in &stats.categories {
                println!("  {:<12} {}", category, count);
            }
            Ok(ExitCode::SUCCESS)
        }

        Commands::Duplicates { limit, json } => {
            let catalog = open_catalog(&cli.db)?;
            let mut groups = catalog.duplicate_groups()?;
            if let Some(limit) = limit {
                groups.truncate(limit);
            }
            if json {
                println!("{}", serde_json::to_string_pretty(&groups)?);
                return Ok(ExitCode::SUCCESS);
            }

            for group in &groups {
                println!(
                    "{} ({} bytes, {} copies, {} reclaimable)",
                    group.content_hash,
                    group.size,
                    group.count(),
                    group.redundant_bytes()
                );
                for path in group.paths() {
                    println!("  {}", path.display());
                }
            }
            println!("{} duplicate groups", groups.len());
            Ok(ExitCode::SUCCESS)
        }

        Commands::Categorize { json } => {
            let mut catalog = open_catalog(&cli.db)?;
            let counts = catalog.recategorize_all(&Categorizer::default())?;
            if json {
                println!("{}", serde_json::to_string_pretty(&counts)?);
            } else {
                for (category, count) in &counts {
                    println!("{:<12} {}", category, count);
                }
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn open_catalog(path: &Path) -> Result<Catalog, Box<dyn Error>> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    Ok(Catalog::open(path)?)
}

fn print_scan_result(result: &ScanResult) {
    println!("Scan of {} {}:", result.root.display(), result.state);
    println!("  Found: {}", result.found_files);
    println!("  Directories: {}", result.total_dirs);
    println!("  New: {}", result.new_files);
    println!("  Already indexed: {}", result.skipped_files);
    println!("  Failed: {}", result.failed_files);
    println!("  Duplicates: {}", result.duplicates);
    println!("  Without thumbnail: {}", result.missing_thumbnails);
    println!("  Excluded: {}", result.excluded);
    println!("  Errors: {}", result.error_count());
    println!("  Duration: {}ms", result.duration_ms);
}
