use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::codec::ImageCodec;
use crate::config::Config;
use crate::exif::{self, WriteResult};
use crate::geocode::ReverseGeocoder;
use crate::layout;
use crate::sidecar::{self, Sidecar};

/// Source extension, matched exactly unless case-insensitive matching is on.
pub const HEIC_EXTENSION: &str = "HEIC";

/// Per-file step that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Sidecar,
    Resolve,
    Directory,
    Convert,
    Verify,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Sidecar => "reading sidecar",
            Stage::Resolve => "resolving destination",
            Stage::Directory => "creating directory",
            Stage::Convert => "converting image",
            Stage::Verify => "verifying output",
        };
        f.write_str(name)
    }
}

/// How a single file ended up.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FileStatus {
    /// JPEG written and sidecar metadata embedded.
    Converted { exif: WriteResult },
    /// JPEG written; there was no sidecar to embed.
    NoSidecar,
    /// JPEG written but embedding the metadata failed.
    MetadataFailed { error: String },
    /// Dry run: destination resolved, nothing written.
    Planned,
    Failed { stage: Stage, error: String },
}

/// The result of processing one HEIC file.
///
/// # Example
///
/// ```rust,no_run
/// # use heic_organizer::pipeline::{Batch, BatchOptions, FileStatus};
/// # use heic_organizer::codec::HeifCodec;
/// # use heic_organizer::geocode::DisabledGeocoder;
/// # async fn example() -> anyhow::Result<()> {
/// # let codec = HeifCodec::new(90);
/// let batch = Batch {
///     source_dir: "./takeout".into(),
///     destination_dir: "./sorted".into(),
///     geocoder: &DisabledGeocoder,
///     codec: &codec,
///     options: BatchOptions::default(),
/// };
/// let report = batch.process_file("./takeout/IMG_0001.HEIC".as_ref()).await;
/// if let FileStatus::Failed { stage, error } = &report.status {
///     eprintln!("{stage}: {error}");
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub source: PathBuf,
    /// Where the JPEG was (or, in a dry run, would be) written.
    pub destination: Option<PathBuf>,
    #[serde(flatten)]
    pub status: FileStatus,
}

impl FileReport {
    fn failed(
        source: &Path,
        destination: Option<PathBuf>,
        stage: Stage,
        error: anyhow::Error,
    ) -> Self {
        Self {
            source: source.to_path_buf(),
            destination,
            status: FileStatus::Failed {
                stage,
                error: format!("{error:#}"),
            },
        }
    }
}

/// Outcome counts for a whole run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchSummary {
    /// HEIC files found.
    pub discovered: usize,
    pub converted: usize,
    pub without_sidecar: usize,
    pub metadata_failed: usize,
    pub planned: usize,
    pub failed: usize,
    pub failed_by_stage: BTreeMap<Stage, usize>,
    /// Files under the source root that are not HEIC.
    pub skipped: usize,
}

impl BatchSummary {
    fn record(&mut self, status: &FileStatus) {
        match status {
            FileStatus::Converted { .. } => self.converted += 1,
            FileStatus::NoSidecar => self.without_sidecar += 1,
            FileStatus::MetadataFailed { .. } => self.metadata_failed += 1,
            FileStatus::Planned => self.planned += 1,
            FileStatus::Failed { stage, .. } => {
                self.failed += 1;
                *self.failed_by_stage.entry(*stage).or_default() += 1;
            }
        }
    }
}

/// Everything a run produced.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub files: Vec<FileReport>,
    pub summary: BatchSummary,
}

/// Behavior switches for a run.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct BatchOptions {
    /// Add a `<place>|UNK` level above year/month.
    pub use_location: bool,
    pub ignore_extension_case: bool,
    pub dry_run: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            use_location: true,
            ignore_extension_case: false,
            dry_run: false,
        }
    }
}

impl From<&Config> for BatchOptions {
    fn from(config: &Config) -> Self {
        Self {
            use_location: config.layout.use_location,
            ignore_extension_case: config.layout.ignore_extension_case,
            dry_run: config.output.dry_run,
        }
    }
}

/// HEIC files below a directory, plus the files that were passed over.
#[derive(Debug, Default)]
pub struct Discovery {
    pub images: Vec<PathBuf>,
    pub skipped: Vec<PathBuf>,
}

/// Check if a file has the HEIC extension.
pub fn is_heic(path: &Path, ignore_case: bool) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            if ignore_case {
                ext.eq_ignore_ascii_case(HEIC_EXTENSION)
            } else {
                ext == HEIC_EXTENSION
            }
        })
        .unwrap_or(false)
}

/// Recursively collect HEIC files under `source`, in file-name order.
///
/// Sidecar `.json` files are not reported as skipped.
pub fn collect_heic_files(source: &Path, ignore_case: bool) -> Result<Discovery> {
    if !source.is_dir() {
        anyhow::bail!("Source directory does not exist: {}", source.display());
    }

    let mut discovery = Discovery::default();
    for entry in WalkDir::new(source)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                log::warn!("Skipping unreadable entry: {e}");
                continue;
            }
        };
        let p = entry.path();
        if !entry.file_type().is_file() {
            continue;
        }
        if is_heic(p, ignore_case) {
            discovery.images.push(p.to_path_buf());
        } else if p.extension().and_then(|e| e.to_str()) != Some("json") {
            log::debug!("Skipping non-HEIC file: {}", p.display());
            discovery.skipped.push(p.to_path_buf());
        }
    }

    Ok(discovery)
}

/// A conversion run over one source tree.
pub struct Batch<'a> {
    pub source_dir: PathBuf,
    pub destination_dir: PathBuf,
    pub geocoder: &'a dyn ReverseGeocoder,
    pub codec: &'a dyn ImageCodec,
    pub options: BatchOptions,
}

impl Batch<'_> {
    /// Convert every HEIC file under the source directory.
    ///
    /// Only setup problems (missing source, unwritable destination root) are
    /// returned as errors; per-file failures end up in the report.
    pub async fn run(&self) -> Result<BatchReport> {
        let discovery = collect_heic_files(&self.source_dir, self.options.ignore_extension_case)?;
        if !self.options.dry_run {
            std::fs::create_dir_all(&self.destination_dir).with_context(|| {
                format!(
                    "Failed to create destination directory {}",
                    self.destination_dir.display()
                )
            })?;
        }

        let total = discovery.images.len();
        log::info!("Found {total} HEIC file(s) to convert");

        let mut summary = BatchSummary {
            discovered: total,
            skipped: discovery.skipped.len(),
            ..BatchSummary::default()
        };
        let mut files = Vec::with_capacity(total);

        for (i, heic_path) in discovery.images.iter().enumerate() {
            log::info!(
                "[{}/{}] ({:.0}%) Converting: {}",
                i + 1,
                total,
                (i + 1) as f64 * 100.0 / total as f64,
                heic_path.display()
            );

            let report = self.process_file(heic_path).await;
            match &report.status {
                FileStatus::Failed { stage, error } => log::error!(
                    "Error converting file: {} ({stage}: {error})",
                    heic_path.display()
                ),
                FileStatus::MetadataFailed { error } => log::error!(
                    "Metadata not applied to {}: {error}",
                    heic_path.display()
                ),
                FileStatus::NoSidecar => log::info!("  No sidecar; converted without metadata"),
                FileStatus::Planned => {
                    if let Some(dest) = &report.destination {
                        log::info!("  Would write {}", dest.display());
                    }
                }
                FileStatus::Converted { .. } => {}
            }

            summary.record(&report.status);
            files.push(report);
        }

        Ok(BatchReport { files, summary })
    }

    /// Take one HEIC file through sidecar → destination → convert → EXIF → verify.
    pub async fn process_file(&self, heic_path: &Path) -> FileReport {
        let relative = match heic_path.strip_prefix(&self.source_dir) {
            Ok(rel) => rel,
            Err(_) => {
                return FileReport::failed(
                    heic_path,
                    None,
                    Stage::Resolve,
                    anyhow::anyhow!("Not below source directory {}", self.source_dir.display()),
                );
            }
        };

        // Sidecar and destination
        let sidecar_path = sidecar::sidecar_path(heic_path);
        let sidecar = if sidecar_path.is_file() {
            match Sidecar::load(&sidecar_path) {
                Ok(s) => Some(s),
                Err(e) => return FileReport::failed(heic_path, None, Stage::Sidecar, e),
            }
        } else {
            None
        };

        let target_dir = match &sidecar {
            Some(s) => match layout::resolve_destination_dir(
                &self.destination_dir,
                s,
                self.options.use_location,
                self.geocoder,
            )
            .await
            {
                Ok(dir) => dir,
                Err(e) => return FileReport::failed(heic_path, None, Stage::Resolve, e),
            },
            None => self.destination_dir.clone(),
        };
        let jpg_path = layout::target_jpeg_path(&target_dir, relative);
        let destination = Some(jpg_path.clone());

        if self.options.dry_run {
            return FileReport {
                source: heic_path.to_path_buf(),
                destination,
                status: FileStatus::Planned,
            };
        }

        if let Some(parent) = jpg_path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))
            {
                return FileReport::failed(heic_path, destination, Stage::Directory, e);
            }
        }

        if let Err(e) = self.codec.convert(heic_path, &jpg_path) {
            return FileReport::failed(heic_path, destination, Stage::Convert, e);
        }

        // Metadata problems leave the JPEG in place
        let status = match &sidecar {
            Some(s) => match exif::write_exif(&jpg_path, s) {
                Ok(exif) => FileStatus::Converted { exif },
                Err(e) => FileStatus::MetadataFailed {
                    error: format!("{e:#}"),
                },
            },
            None => FileStatus::NoSidecar,
        };

        if !jpg_path.is_file() {
            return FileReport::failed(
                heic_path,
                destination,
                Stage::Verify,
                anyhow::anyhow!("Output file missing after conversion: {}", jpg_path.display()),
            );
        }

        FileReport {
            source: heic_path.to_path_buf(),
            destination,
            status,
        }
    }
}
