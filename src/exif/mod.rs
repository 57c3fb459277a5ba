//! EXIF reading and writing for converted JPEGs.
//!
//! - [`write_exif`]: merge a sidecar record into a JPEG's EXIF block
//! - [`read_exif`]: read the written tags back (verification, `--show-exif`)
//!
//! Sidecar keys that become individual tags are listed in [`tags::TEXT_TAGS`].

mod reader;
pub mod tags;
mod writer;

pub use reader::{ExifData, read_exif};
pub use writer::{EXIF_DATETIME_FORMAT, WriteResult, build_tags, write_exif};
