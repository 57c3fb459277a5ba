use anyhow::Result;
use little_exif::endian::Endian;
use little_exif::exif_tag::{ExifTag, ExifTagGroup};
use little_exif::metadata::Metadata;
use little_exif::rational::uR64;
use std::path::Path;

use super::tags::text_tag_by_id;

pub(crate) const TAG_XP_KEYWORDS: u16 = 0x9C9E;
pub(crate) const TAG_GPS_INFO: u16 = 0x8825;
pub(crate) const TAG_GPS_LATITUDE_REF: u16 = 0x0001;
pub(crate) const TAG_GPS_LATITUDE: u16 = 0x0002;
pub(crate) const TAG_GPS_LONGITUDE_REF: u16 = 0x0003;
pub(crate) const TAG_GPS_LONGITUDE: u16 = 0x0004;

/// Character-code prefixes of the UserComment tag (EXIF 2.3, table 9).
const USER_COMMENT_ASCII: &[u8; 8] = b"ASCII\0\0\0";
const USER_COMMENT_UNICODE: &[u8; 8] = b"UNICODE\0";
const USER_COMMENT_JIS: &[u8; 8] = b"JIS\0\0\0\0\0";
pub(crate) const USER_COMMENT_UNDEFINED: &[u8; 8] = &[0; 8];

/// Metadata of interest read back from a converted JPEG.
#[derive(Debug, Clone, Default)]
pub struct ExifData {
    pub date_time_original: Option<String>,
    pub user_comment: Option<String>,
    pub keywords: Option<String>,
    /// Mapped text tags as (tag name, value), in file order.
    pub text_tags: Vec<(String, String)>,
    pub gps_latitude_ref: Option<String>,
    pub gps_longitude_ref: Option<String>,
    /// Signed decimal degrees (south is negative).
    pub gps_latitude: Option<f64>,
    /// Signed decimal degrees (west is negative).
    pub gps_longitude: Option<f64>,
}

impl ExifData {
    pub fn has_gps(&self) -> bool {
        self.gps_latitude.is_some() && self.gps_longitude.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.date_time_original.is_none()
            && self.user_comment.is_none()
            && self.keywords.is_none()
            && self.text_tags.is_empty()
            && !self.has_gps()
    }
}

/// Load EXIF metadata from a file path using little_exif.
/// Returns None if there is nothing it can parse.
pub(crate) fn load_metadata(path: &Path) -> Option<Metadata> {
    let path_owned = path.to_path_buf();
    // Suppress panics from little_exif
    let prev_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(|_| {}));
    let result = std::panic::catch_unwind(move || Metadata::new_from_path(&path_owned));
    std::panic::set_hook(prev_hook);

    match result {
        Ok(Ok(m)) => {
            if m.data().is_empty() {
                log::debug!("little_exif loaded empty metadata");
                None
            } else {
                log::debug!("little_exif loaded {} existing EXIF tags", m.data().len());
                Some(m)
            }
        }
        Ok(Err(e)) => {
            log::debug!("little_exif could not parse EXIF: {e}");
            None
        }
        Err(_) => {
            log::debug!("little_exif panicked parsing EXIF");
            None
        }
    }
}

/// Read the tags this tool writes from a JPEG. A file without EXIF yields an
/// empty [`ExifData`].
pub fn read_exif(path: &Path) -> Result<ExifData> {
    if !path.is_file() {
        anyhow::bail!("No such file: {}", path.display());
    }

    let Some(metadata) = load_metadata(path) else {
        log::debug!("No EXIF data found in {}", path.display());
        return Ok(ExifData::default());
    };

    let mut data = ExifData::default();
    let mut lat: Option<Vec<uR64>> = None;
    let mut lon: Option<Vec<uR64>> = None;

    // little_exif only knows GPS tags as unknown entries of the GPS group.
    // 0x0001 collides with InteroperabilityIndex and is decoded as that.
    for tag in metadata.data() {
        match tag {
            ExifTag::DateTimeOriginal(s) => data.date_time_original = Some(clean_string(s)),
            ExifTag::UserComment(bytes) => data.user_comment = Some(decode_user_comment(bytes)),
            ExifTag::InteroperabilityIndex(s) | ExifTag::UnknownSTRING(s, TAG_GPS_LATITUDE_REF, _)
                if matches!(clean_string(s).as_str(), "N" | "S") =>
            {
                data.gps_latitude_ref = Some(clean_string(s));
            }
            ExifTag::UnknownSTRING(s, TAG_GPS_LONGITUDE_REF, ExifTagGroup::GPSIFD) => {
                data.gps_longitude_ref = Some(clean_string(s));
            }
            ExifTag::UnknownRATIONAL64U(rats, TAG_GPS_LATITUDE, ExifTagGroup::GPSIFD) => {
                lat = Some(rats.clone());
            }
            ExifTag::UnknownRATIONAL64U(rats, TAG_GPS_LONGITUDE, ExifTagGroup::GPSIFD) => {
                lon = Some(rats.clone());
            }
            other => {
                let id = other.as_u16();
                if id == TAG_XP_KEYWORDS {
                    data.keywords = Some(decode_utf16le(&other.value_as_u8_vec(&Endian::Little)));
                } else if let Some(text) = text_tag_by_id(id) {
                    let raw = other.value_as_u8_vec(&Endian::Little);
                    let value = restore_utf8(&String::from_utf8_lossy(&raw));
                    data.text_tags.push((text.name.to_string(), clean_string(&value)));
                }
            }
        }
    }

    data.gps_latitude = lat
        .as_deref()
        .and_then(rationals_to_degrees)
        .map(|deg| signed(deg, data.gps_latitude_ref.as_deref(), "S"));
    data.gps_longitude = lon
        .as_deref()
        .and_then(rationals_to_degrees)
        .map(|deg| signed(deg, data.gps_longitude_ref.as_deref(), "W"));

    Ok(data)
}

/// One rational is plain degrees; three are degrees, minutes, seconds.
fn rationals_to_degrees(rats: &[uR64]) -> Option<f64> {
    let value = |r: &uR64| {
        if r.denominator == 0 {
            None
        } else {
            Some(r.nominator as f64 / r.denominator as f64)
        }
    };
    match rats {
        [deg] => value(deg),
        [deg, min, sec, ..] => Some(value(deg)? + value(min)? / 60.0 + value(sec)? / 3600.0),
        _ => None,
    }
}

fn signed(degrees: f64, reference: Option<&str>, negative: &str) -> f64 {
    if reference == Some(negative) { -degrees } else { degrees }
}

fn clean_string(s: &str) -> String {
    s.trim_end_matches('\0').trim().to_string()
}

/// little_exif decodes STRING tags one byte per char; undo that so UTF-8
/// text written by [`write_exif`](super::write_exif) reads back intact.
fn restore_utf8(decoded: &str) -> String {
    if decoded.chars().any(|c| u32::from(c) > 0xFF) {
        return decoded.to_string();
    }
    let bytes: Vec<u8> = decoded.chars().map(|c| u32::from(c) as u8).collect();
    String::from_utf8(bytes).unwrap_or_else(|_| decoded.to_string())
}

/// Strip the 8-byte character code and decode the rest.
pub(crate) fn decode_user_comment(bytes: &[u8]) -> String {
    if bytes.len() < 8 {
        return clean_string(&String::from_utf8_lossy(bytes));
    }
    let (code, body) = bytes.split_at(8);
    if code == USER_COMMENT_UNICODE {
        decode_utf16le(body)
    } else if code == USER_COMMENT_ASCII
        || code == USER_COMMENT_UNDEFINED
        || code == USER_COMMENT_JIS
    {
        clean_string(&String::from_utf8_lossy(body))
    } else {
        clean_string(&String::from_utf8_lossy(bytes))
    }
}

/// Decode XP* style UTF-16LE bytes, dropping the null terminator.
fn decode_utf16le(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .take_while(|&u| u != 0)
        .collect();
    String::from_utf16_lossy(&units)
}
