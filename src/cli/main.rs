use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};

use heic_organizer::codec::HeifCodec;
use heic_organizer::pipeline::{Batch, BatchOptions, BatchSummary};
use heic_organizer::{config, exif, geocode};

#[derive(Parser, Debug)]
#[command(
    name = "heic-organizer",
    version,
    about = "Convert HEIC photos to JPEG, restore sidecar metadata as EXIF, and sort them by place and date"
)]
struct Cli {
    /// Folder containing .HEIC files and optional .json sidecars
    #[arg(long = "source_dir", value_name = "DIR")]
    source_dir: Option<PathBuf>,

    /// Output root
    #[arg(long = "destination_dir", value_name = "DIR")]
    destination_dir: Option<PathBuf>,

    /// Path to config file (default: config.json next to binary)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Initialize a default config.json and exit
    #[arg(long)]
    init: bool,

    /// Resolve destinations without writing any files
    #[arg(long)]
    dry_run: bool,

    /// Output per-file results as JSON
    #[arg(long)]
    json: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Sort into <year>/<month> only, without a location folder
    #[arg(long = "no-location")]
    no_location: bool,

    /// Skip reverse geocoding; located photos go under UNK
    #[arg(long = "no-geocode")]
    no_geocode: bool,

    /// Also match .heic, .Heic, ...
    #[arg(long = "ignore-case")]
    ignore_case: bool,

    /// JPEG quality (1-100)
    #[arg(long, value_name = "N")]
    quality: Option<u8>,

    /// Display the embedded metadata of converted JPEGs and exit
    #[arg(long = "show-exif", value_name = "FILE", num_args = 1..)]
    show_exif: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    // Handle --init
    if cli.init {
        let config = config::Config::default();
        let path = cli.config.as_deref();
        config.save(path)?;
        let save_path = match path {
            Some(p) => p.to_path_buf(),
            None => config::Config::config_path()?,
        };
        println!("Default config written to {}", save_path.display());
        return Ok(());
    }

    // Handle --show-exif
    if !cli.show_exif.is_empty() {
        for path in &cli.show_exif {
            print_full_exif(path)?;
        }
        return Ok(());
    }

    let (Some(source_dir), Some(destination_dir)) = (&cli.source_dir, &cli.destination_dir) else {
        anyhow::bail!(
            "Both --source_dir and --destination_dir are required. Use --help for usage."
        );
    };

    // Load config, then apply CLI overrides
    let mut config = config::Config::load(cli.config.as_deref())?;
    if cli.dry_run {
        config.output.dry_run = true;
    }
    if cli.no_location {
        config.layout.use_location = false;
    }
    if cli.no_geocode {
        config.geocoder.enabled = false;
    }
    if cli.ignore_case {
        config.layout.ignore_extension_case = true;
    }
    if let Some(quality) = cli.quality {
        config.output.jpeg_quality = quality;
    }
    config.validate()?;

    if config.output.dry_run {
        log::info!("DRY RUN: no files will be written");
    }

    let geocoder = geocode::build_geocoder(&config.geocoder)?;
    if config.layout.use_location {
        log::info!("Location lookup: {}", geocoder.name());
    }
    let codec = HeifCodec::new(config.output.jpeg_quality);

    let batch = Batch {
        source_dir: source_dir.clone(),
        destination_dir: destination_dir.clone(),
        geocoder: geocoder.as_ref(),
        codec: &codec,
        options: BatchOptions::from(&config),
    };
    let report = batch
        .run()
        .await
        .with_context(|| format!("Failed to convert {}", source_dir.display()))?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    print_summary(&report.summary);
    println!("Conversion complete.");

    Ok(())
}

// ANSI color codes
const RED: &str = "\x1b[31m";
const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";

fn print_summary(summary: &BatchSummary) {
    println!();
    println!("  {BOLD}Summary{RESET}");
    println!("  {DIM}{}{RESET}", "─".repeat(70));
    print_row("HEIC files found", &summary.discovered.to_string());
    if summary.planned > 0 {
        print_row("Planned (dry run)", &summary.planned.to_string());
    }
    print_row("Converted", &summary.converted.to_string());
    print_row("Without sidecar", &summary.without_sidecar.to_string());
    print_row("Metadata failed", &summary.metadata_failed.to_string());
    if summary.failed > 0 {
        println!("  {RED}{:<22} : {}{RESET}", "Failed", summary.failed);
        for (stage, count) in &summary.failed_by_stage {
            println!("  {DIM}{:<22} : {count}{RESET}", format!("  {stage}"));
        }
    } else {
        print_row("Failed", "0");
    }
    print_row("Skipped (not HEIC)", &summary.skipped.to_string());
    println!();
}

/// Print the metadata this tool writes, for one JPEG.
fn print_full_exif(path: &Path) -> Result<()> {
    let data = exif::read_exif(path)?;

    println!();
    println!("{BOLD}File:{RESET} {}", path.display());
    println!("{DIM}{}{RESET}", "═".repeat(72));

    if data.is_empty() {
        println!("  {DIM}(no EXIF metadata found){RESET}");
        println!();
        return Ok(());
    }

    // --- Date / People ---
    let core: Vec<(&str, Option<&str>)> = vec![
        ("DateTimeOriginal", data.date_time_original.as_deref()),
        ("XPKeywords", data.keywords.as_deref()),
    ];
    if core.iter().any(|(_, v)| v.is_some()) {
        println!("  {BOLD}Date / People{RESET}");
        println!("  {DIM}{}{RESET}", "─".repeat(70));
        for (tag, val) in &core {
            if let Some(v) = val {
                print_row(tag, v);
            }
        }
        println!();
    }

    // --- GPS ---
    if let (Some(lat), Some(lon)) = (data.gps_latitude, data.gps_longitude) {
        println!("  {BOLD}GPS{RESET}");
        println!("  {DIM}{}{RESET}", "─".repeat(70));
        print_row("GPSLatitude", &format!("{lat:.6}"));
        print_row("GPSLongitude", &format!("{lon:.6}"));
        println!();
    }

    if !data.text_tags.is_empty() {
        println!("  {BOLD}Mapped Tags{RESET}");
        println!("  {DIM}{}{RESET}", "─".repeat(70));
        for (tag, val) in &data.text_tags {
            print_row(tag, val);
        }
        println!();
    }

    // The comment holds the whole sidecar record
    if let Some(comment) = &data.user_comment {
        println!("  {BOLD}UserComment{RESET}");
        println!("  {DIM}{}{RESET}", "─".repeat(70));
        let pretty = serde_json::from_str::<serde_json::Value>(comment)
            .and_then(|v| serde_json::to_string_pretty(&v))
            .unwrap_or_else(|_| comment.clone());
        for line in pretty.lines() {
            println!("  {line}");
        }
        println!();
    }

    Ok(())
}

/// Max width for the value column before wrapping.
const VAL_WIDTH: usize = 46;
/// Indent for continuation lines (tag column width + " : " = 25 chars + 2 leading spaces).
const INDENT: &str = "                           ";

/// Print a single row in the EXIF display table.
fn print_row(tag: &str, val: &str) {
    let tag_col = format!("{:<22}", tag);
    let lines = wrap_text(val, VAL_WIDTH);
    for (i, line) in lines.iter().enumerate() {
        if i == 0 {
            println!("  {tag_col} : {line}");
        } else {
            println!("  {INDENT}{line}");
        }
    }
}

/// Wrap text at word boundaries to fit within max_width.
fn wrap_text(s: &str, max_width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current_line = String::new();

    for word in s.split_whitespace() {
        if current_line.is_empty() {
            current_line = word.to_string();
        } else if current_line.len() + 1 + word.len() <= max_width {
            current_line.push(' ');
            current_line.push_str(word);
        } else {
            lines.push(current_line);
            current_line = word.to_string();
        }
    }

    if !current_line.is_empty() {
        lines.push(current_line);
    }

    if lines.is_empty() {
        lines.push(s.to_string());
    }

    lines
}
