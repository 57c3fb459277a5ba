use anyhow::{Context, Result};
use img_parts::Bytes;
use img_parts::ImageEXIF;
use img_parts::jpeg::Jpeg;
use little_exif::endian::Endian;
use little_exif::exif_tag::{ExifTag, ExifTagGroup};
use little_exif::exif_tag_format::ExifTagFormat;
use little_exif::filetype::FileExtension;
use little_exif::metadata::Metadata;
use little_exif::rational::uR64;
use serde::Serialize;
use serde_json::Value;
use std::path::Path;

use super::reader::{
    TAG_GPS_INFO, TAG_GPS_LATITUDE, TAG_GPS_LATITUDE_REF, TAG_GPS_LONGITUDE, TAG_GPS_LONGITUDE_REF,
    TAG_XP_KEYWORDS, USER_COMMENT_UNDEFINED, load_metadata,
};
use super::tags::text_tag;
use crate::sidecar::{GeoPoint, Sidecar};

/// Format of EXIF DateTime* tags.
pub const EXIF_DATETIME_FORMAT: &str = "%Y:%m:%d %H:%M:%S";

/// GPS magnitudes are stored as a single rational over this denominator.
const GPS_DENOMINATOR: u32 = 1_000_000;

// little_exif as_u8_vec(JPEG) returns: [APP1 marker 2B][length 2B][Exif\0\0 6B][TIFF data]
// img-parts set_exif() expects just the TIFF data (after Exif\0\0)
const JPEG_EXIF_OVERHEAD: usize = 10; // 2 + 2 + 6

/// What was written for one image.
#[derive(Debug, Default, Clone, Serialize)]
pub struct WriteResult {
    pub date_written: bool,
    pub keywords_written: bool,
    pub gps_written: bool,
    /// Sidecar keys copied into their own EXIF tag.
    pub mapped_keys: Vec<String>,
    /// Sidecar keys with no EXIF tag (kept only in UserComment).
    pub unmapped_keys: Vec<String>,
}

/// Encode a string as UTF-16LE bytes (used for XP* tags).
fn encode_utf16le(s: &str) -> Vec<u8> {
    let mut bytes: Vec<u8> = s
        .encode_utf16()
        .flat_map(|c| c.to_le_bytes())
        .collect();
    // Null terminator
    bytes.push(0);
    bytes.push(0);
    bytes
}

/// Create an XP* tag (UTF-16LE encoded, IFD0 group).
fn make_xp_tag(tag_id: u16, value: &str) -> Option<ExifTag> {
    let raw_data = encode_utf16le(value);
    ExifTag::from_u16_with_data(
        tag_id,
        &ExifTagFormat::INT8U,
        &raw_data,
        &Endian::Little,
        &ExifTagGroup::IFD0,
    )
    .ok()
}

/// UserComment with the "undefined" character code, so UTF-8 passes through.
fn make_user_comment(text: &str) -> ExifTag {
    let mut bytes = USER_COMMENT_UNDEFINED.to_vec();
    bytes.extend_from_slice(text.as_bytes());
    ExifTag::UserComment(bytes)
}

/// `str()`-like rendering: strings as-is, everything else as JSON.
fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Magnitude of a coordinate as `round(|deg| * 1e6) / 1e6`.
fn gps_rational(degrees: f64) -> uR64 {
    uR64 {
        nominator: (degrees.abs() * GPS_DENOMINATOR as f64).round() as u32,
        denominator: GPS_DENOMINATOR,
    }
}

/// A raw IFD entry; `data` is already in the TIFF's byte order.
struct RawIfdEntry {
    tag_id: u16,
    data_format: u16, // TIFF data format (2=ASCII, 5=RATIONAL)
    count: u32,
    data: Vec<u8>,
}

fn encode_u16(val: u16, big_endian: bool) -> [u8; 2] {
    if big_endian { val.to_be_bytes() } else { val.to_le_bytes() }
}

fn encode_u32(val: u32, big_endian: bool) -> [u8; 4] {
    if big_endian { val.to_be_bytes() } else { val.to_le_bytes() }
}

fn read_u16(data: &[u8], offset: usize, big_endian: bool) -> Option<u16> {
    let b = data.get(offset..offset + 2)?;
    Some(if big_endian {
        u16::from_be_bytes([b[0], b[1]])
    } else {
        u16::from_le_bytes([b[0], b[1]])
    })
}

fn read_u32(data: &[u8], offset: usize, big_endian: bool) -> Option<u32> {
    let b = data.get(offset..offset + 4)?;
    Some(if big_endian {
        u32::from_be_bytes([b[0], b[1], b[2], b[3]])
    } else {
        u32::from_le_bytes([b[0], b[1], b[2], b[3]])
    })
}

/// GPS IFD entries for a position, in tag order.
fn gps_entries(point: &GeoPoint, big_endian: bool) -> Vec<RawIfdEntry> {
    let lat_ref = if point.latitude >= 0.0 { "N" } else { "S" };
    let lon_ref = if point.longitude >= 0.0 { "E" } else { "W" };

    let ascii = |tag_id: u16, value: &str| {
        let mut data = value.as_bytes().to_vec();
        data.push(0);
        RawIfdEntry { tag_id, data_format: 2, count: data.len() as u32, data }
    };
    let rational = |tag_id: u16, degrees: f64| {
        let r = gps_rational(degrees);
        let mut data = Vec::with_capacity(8);
        data.extend_from_slice(&encode_u32(r.nominator, big_endian));
        data.extend_from_slice(&encode_u32(r.denominator, big_endian));
        RawIfdEntry { tag_id, data_format: 5, count: 1, data }
    };

    vec![
        ascii(TAG_GPS_LATITUDE_REF, lat_ref),
        rational(TAG_GPS_LATITUDE, point.latitude),
        ascii(TAG_GPS_LONGITUDE_REF, lon_ref),
        rational(TAG_GPS_LONGITUDE, point.longitude),
    ]
}

/// Append a GPS IFD to serialized TIFF data and point IFD0's GPSInfo entry
/// at it.
///
/// little_exif 0.4 only serializes IFD0 and the Exif IFD. It does write the
/// GPSInfo tag itself, so [`build_tags`] adds one as a placeholder and its
/// value is patched here.
fn append_gps_ifd(tiff: &mut Vec<u8>, point: &GeoPoint) -> Result<()> {
    let big_endian = match tiff.get(0..2) {
        Some(b"MM") => true,
        Some(b"II") => false,
        _ => anyhow::bail!("Invalid TIFF byte order"),
    };

    let ifd0 = read_u32(tiff, 4, big_endian).context("TIFF header truncated")? as usize;
    let count = read_u16(tiff, ifd0, big_endian).context("IFD0 offset out of bounds")? as usize;
    let gps_info_entry = (0..count)
        .map(|i| ifd0 + 2 + i * 12)
        .find(|&entry| read_u16(tiff, entry, big_endian) == Some(TAG_GPS_INFO))
        .context("IFD0 has no GPSInfo entry")?;
    if gps_info_entry + 12 > tiff.len() {
        anyhow::bail!("GPSInfo entry extends beyond TIFF data");
    }

    // IFDs start on a word boundary
    if tiff.len() % 2 == 1 {
        tiff.push(0);
    }
    let gps_start = tiff.len();
    let entries = gps_entries(point, big_endian);

    let mut ifd = Vec::with_capacity(2 + entries.len() * 12 + 4);
    let mut data_area = Vec::new();
    let mut data_off = gps_start + 2 + entries.len() * 12 + 4;

    ifd.extend_from_slice(&encode_u16(entries.len() as u16, big_endian));
    for entry in &entries {
        ifd.extend_from_slice(&encode_u16(entry.tag_id, big_endian));
        ifd.extend_from_slice(&encode_u16(entry.data_format, big_endian));
        ifd.extend_from_slice(&encode_u32(entry.count, big_endian));
        if entry.data.len() <= 4 {
            let mut inline = [0u8; 4];
            inline[..entry.data.len()].copy_from_slice(&entry.data);
            ifd.extend_from_slice(&inline);
        } else {
            let offset = u32::try_from(data_off).context("EXIF data too large")?;
            ifd.extend_from_slice(&encode_u32(offset, big_endian));
            data_area.extend_from_slice(&entry.data);
            data_off += entry.data.len();
        }
    }
    // No next IFD
    ifd.extend_from_slice(&[0u8; 4]);

    tiff.extend_from_slice(&ifd);
    tiff.extend_from_slice(&data_area);

    let gps_offset = u32::try_from(gps_start).context("EXIF data too large")?;
    tiff[gps_info_entry + 8..gps_info_entry + 12]
        .copy_from_slice(&encode_u32(gps_offset, big_endian));
    Ok(())
}

/// Translate a sidecar record into EXIF tags.
///
/// The whole record goes into UserComment as JSON. On top of that,
/// `photoTakenTime` becomes DateTimeOriginal (local time), `people` becomes
/// XPKeywords, and keys named after a known text tag are copied over. A
/// position adds a GPSInfo placeholder; [`write_exif`] writes the GPS IFD.
pub fn build_tags(sidecar: &Sidecar) -> Result<(Vec<ExifTag>, WriteResult)> {
    let mut result = WriteResult::default();
    let mut tags = vec![make_user_comment(&sidecar.to_json()?)];

    for (key, value) in sidecar.record() {
        match key.as_str() {
            "photoTakenTime" => match sidecar.taken_at() {
                Some(taken) => {
                    let formatted = taken.format(EXIF_DATETIME_FORMAT).to_string();
                    log::debug!("  DateTimeOriginal: {formatted}");
                    tags.push(ExifTag::DateTimeOriginal(formatted));
                    result.date_written = true;
                }
                None => log::warn!("  photoTakenTime has no usable timestamp: {value}"),
            },
            "people" => {
                let people = sidecar.people();
                if people.is_empty() {
                    continue;
                }
                let keywords = people.join(", ");
                if let Some(xp_tag) = make_xp_tag(TAG_XP_KEYWORDS, &keywords) {
                    log::debug!("  XPKeywords: {keywords}");
                    tags.push(xp_tag);
                    result.keywords_written = true;
                }
            }
            // Become the GPS IFD, appended in write_exif
            "geoData" | "geoDataExif" => {}
            _ => match text_tag(key) {
                Some(tag) => {
                    let text = value_to_text(value);
                    log::debug!("  {}: {text}", tag.name);
                    tags.push((tag.build)(text));
                    result.mapped_keys.push(key.clone());
                }
                None => result.unmapped_keys.push(key.clone()),
            },
        }
    }

    if let Some(point) = sidecar.geo_point() {
        tags.push(ExifTag::GPSInfo(vec![0]));
        result.gps_written = true;
        log::debug!("  GPS: {}, {}", point.latitude, point.longitude);
    }

    Ok((tags, result))
}

/// Merge sidecar metadata into the EXIF block of a JPEG, in place.
///
/// Existing EXIF is kept when little_exif can parse it; otherwise a fresh
/// block is built. All other JPEG segments are preserved.
pub fn write_exif(path: &Path, sidecar: &Sidecar) -> Result<WriteResult> {
    let (tags, result) = build_tags(sidecar)?;
    let gps = sidecar.geo_point();
    write_tags_to_jpeg(path, &tags, gps.as_ref()).context("Failed to write EXIF metadata to file")?;
    Ok(result)
}

/// Write new EXIF tags into a JPEG file, preserving all existing data.
fn write_tags_to_jpeg(path: &Path, new_tags: &[ExifTag], gps: Option<&GeoPoint>) -> Result<()> {
    let file_bytes = std::fs::read(path).context("Failed to read image file")?;

    // Parse JPEG structure with img-parts (preserves all segments)
    let mut jpeg = Jpeg::from_bytes(Bytes::from(file_bytes))
        .map_err(|e| anyhow::anyhow!("Failed to parse JPEG: {e}"))?;

    // Remember where the EXIF segment was originally positioned
    let orig_exif_pos = find_exif_segment_pos(&jpeg);

    let mut metadata = match load_metadata(path) {
        Some(existing) => existing,
        None => {
            if jpeg.exif().is_some() {
                log::warn!(
                    "Existing EXIF in {} could not be parsed; replacing it",
                    path.display()
                );
            }
            Metadata::new()
        }
    };
    for tag in new_tags {
        metadata.set_tag(tag.clone());
    }

    let exif_bytes = metadata.as_u8_vec(FileExtension::JPEG);
    if exif_bytes.len() <= JPEG_EXIF_OVERHEAD {
        anyhow::bail!("EXIF serialization produced no data");
    }
    let mut tiff = exif_bytes[JPEG_EXIF_OVERHEAD..].to_vec();
    if let Some(point) = gps {
        append_gps_ifd(&mut tiff, point)?;
    }
    jpeg.set_exif(Some(Bytes::from(tiff)));

    // set_exif() inserts at position 3; move the segment back to where it was,
    // or right after APP0 for a fresh block.
    if let Some(new_pos) = find_exif_segment_pos(&jpeg) {
        let target_pos = orig_exif_pos.unwrap_or(1);
        if target_pos < new_pos {
            let segments = jpeg.segments_mut();
            let seg = segments.remove(new_pos);
            segments.insert(target_pos, seg);
        }
    }

    let output = jpeg.encoder().bytes();
    std::fs::write(path, &output).context("Failed to write JPEG file")?;

    Ok(())
}

/// Find the position of the EXIF APP1 segment in a JPEG.
/// EXIF segments have marker 0xE1 (APP1) and contents starting with "Exif\0\0".
fn find_exif_segment_pos(jpeg: &Jpeg) -> Option<usize> {
    const EXIF_PREFIX: &[u8] = b"Exif\0\0";
    jpeg.segments().iter().position(|s| {
        s.marker() == 0xE1 && s.contents().starts_with(EXIF_PREFIX)
    })
}
