//! # heic-organizer
//!
//! Batch-convert HEIC photos to JPEG, restore the metadata kept in Google
//! Takeout style `<photo>.HEIC.json` sidecars, and sort the results into a
//! `<place>/<year>/<month>` tree.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use heic_organizer::codec::HeifCodec;
//! use heic_organizer::config::Config;
//! use heic_organizer::geocode::build_geocoder;
//! use heic_organizer::pipeline::{Batch, BatchOptions};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load(Some("config.json".as_ref()))?;
//!     let geocoder = build_geocoder(&config.geocoder)?;
//!     let codec = HeifCodec::new(config.output.jpeg_quality);
//!
//!     let batch = Batch {
//!         source_dir: "./takeout".into(),
//!         destination_dir: "./sorted".into(),
//!         geocoder: geocoder.as_ref(),
//!         codec: &codec,
//!         options: BatchOptions::from(&config),
//!     };
//!     let report = batch.run().await?;
//!     println!("{} converted, {} failed", report.summary.converted, report.summary.failed);
//!     Ok(())
//! }
//! ```
//!
//! ## Destination Layout
//!
//! | Sidecar | Location | Output |
//! |---------|----------|--------|
//! | present, GPS resolves | on | `<dest>/<city or county>/<year>/<month>/<rel>.jpg` |
//! | present, no usable GPS | on | `<dest>/UNK/<year>/<month>/<rel>.jpg` |
//! | present | off | `<dest>/<year>/<month>/<rel>.jpg` |
//! | absent | either | `<dest>/<rel>.jpg` |
//!
//! ## Modules
//!
//! - [`codec`]: HEIC decoding and JPEG encoding
//! - [`config`]: configuration types and loading/saving
//! - [`exif`]: EXIF writing from sidecars, and reading it back
//! - [`geocode`]: reverse geocoding of GPS positions
//! - [`layout`]: destination directory resolution
//! - [`pipeline`]: file discovery and the per-file conversion driver
//! - [`sidecar`]: JSON sidecar parsing

pub mod codec;
pub mod config;
pub mod exif;
pub mod geocode;
pub mod layout;
pub mod pipeline;
pub mod sidecar;
