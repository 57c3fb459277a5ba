//! Sidecar JSON metadata (Google Takeout style) colocated with each photo.
//!
//! A sidecar for `IMG_0001.HEIC` lives at `IMG_0001.HEIC.json`. The record is
//! kept as a raw JSON object so that every field, mapped or not, survives the
//! round trip into the EXIF user comment.

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

/// A latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

/// Metadata record read from a sidecar file.
#[derive(Debug, Clone, PartialEq)]
pub struct Sidecar {
    record: Map<String, Value>,
}

/// Path of the sidecar for `image`: the full file name plus `.json`.
pub fn sidecar_path(image: &Path) -> PathBuf {
    let mut name = image.as_os_str().to_os_string();
    name.push(".json");
    PathBuf::from(name)
}

impl Sidecar {
    /// Read and parse a sidecar file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read sidecar {}", path.display()))?;
        let value: Value = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse sidecar {}", path.display()))?;
        Self::from_value(value)
    }

    /// Wrap an already-parsed JSON value. The top level must be an object.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(record) => Ok(Self { record }),
            other => anyhow::bail!("Sidecar must be a JSON object, found {}", type_name(&other)),
        }
    }

    /// The full record, including fields with no EXIF mapping.
    pub fn record(&self) -> &Map<String, Value> {
        &self.record
    }

    /// `photoTakenTime.timestamp` as Unix seconds.
    ///
    /// Takeout writes the timestamp as a string; plain integers are accepted too.
    pub fn photo_taken_time(&self) -> Option<i64> {
        let ts = self.record.get("photoTakenTime")?.get("timestamp")?;
        match ts {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Capture time converted to the local timezone.
    pub fn taken_at(&self) -> Option<DateTime<Local>> {
        self.photo_taken_time().and_then(local_time)
    }

    /// GPS position from `geoData`, falling back to `geoDataExif`.
    ///
    /// Takeout fills both with `0.0, 0.0` when the position is unknown, so an
    /// exact zero pair counts as absent.
    pub fn geo_point(&self) -> Option<GeoPoint> {
        ["geoData", "geoDataExif"]
            .iter()
            .filter_map(|key| self.record.get(*key))
            .filter_map(parse_geo_point)
            .find(|p| !(p.latitude == 0.0 && p.longitude == 0.0))
    }

    /// Names from `people`, in order. Entries without a name are dropped.
    pub fn people(&self) -> Vec<String> {
        self.record
            .get("people")
            .and_then(Value::as_array)
            .map(|people| {
                people
                    .iter()
                    .filter_map(|p| p.get("name").and_then(Value::as_str))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// The record serialized back to compact JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(&self.record).context("Failed to serialize sidecar record")
    }
}

/// Unix seconds to local wall-clock time. `None` if out of chrono's range.
pub fn local_time(timestamp: i64) -> Option<DateTime<Local>> {
    DateTime::from_timestamp(timestamp, 0).map(|utc| utc.with_timezone(&Local))
}

fn parse_geo_point(value: &Value) -> Option<GeoPoint> {
    let latitude = value.get("latitude")?.as_f64()?;
    let longitude = value.get("longitude")?.as_f64()?;
    Some(GeoPoint { latitude, longitude })
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn sidecar(value: Value) -> Sidecar {
        Sidecar::from_value(value).unwrap()
    }

    #[test]
    fn sidecar_path_appends_json() {
        assert_eq!(
            sidecar_path(Path::new("/photos/2023/IMG_0001.HEIC")),
            PathBuf::from("/photos/2023/IMG_0001.HEIC.json")
        );
    }

    #[test]
    fn timestamp_as_string_or_number() {
        let s = sidecar(json!({ "photoTakenTime": { "timestamp": "1700000000" } }));
        assert_eq!(s.photo_taken_time(), Some(1_700_000_000));

        let n = sidecar(json!({ "photoTakenTime": { "timestamp": 1700000000 } }));
        assert_eq!(n.photo_taken_time(), Some(1_700_000_000));
    }

    #[test]
    fn timestamp_missing_or_garbage() {
        assert_eq!(sidecar(json!({})).photo_taken_time(), None);
        assert_eq!(
            sidecar(json!({ "photoTakenTime": { "timestamp": "soon" } })).photo_taken_time(),
            None
        );
    }

    #[test]
    fn taken_at_is_local_time() {
        use chrono::Datelike;

        let s = sidecar(json!({ "photoTakenTime": { "timestamp": "1700000000" } }));
        let taken = s.taken_at().unwrap();
        assert_eq!(taken.year(), 2023);
        assert_eq!(taken.month(), 11);
        assert_eq!(taken.timestamp(), 1_700_000_000);
    }

    #[test]
    fn geo_point_from_geo_data() {
        let s = sidecar(json!({ "geoData": { "latitude": 37.7749, "longitude": -122.4194 } }));
        assert_eq!(
            s.geo_point(),
            Some(GeoPoint { latitude: 37.7749, longitude: -122.4194 })
        );
    }

    #[test]
    fn zero_geo_data_falls_back_to_exif_copy() {
        let s = sidecar(json!({
            "geoData": { "latitude": 0.0, "longitude": 0.0 },
            "geoDataExif": { "latitude": 48.8584, "longitude": 2.2945 }
        }));
        assert_eq!(s.geo_point().unwrap().latitude, 48.8584);
    }

    #[test]
    fn zero_geo_data_alone_is_absent() {
        let s = sidecar(json!({ "geoData": { "latitude": 0.0, "longitude": 0.0 } }));
        assert_eq!(s.geo_point(), None);
    }

    #[test]
    fn people_skips_nameless_entries() {
        let s = sidecar(json!({ "people": [{ "name": "Ada" }, {}, { "name": "Grace" }] }));
        assert_eq!(s.people(), vec!["Ada".to_string(), "Grace".to_string()]);
        assert!(sidecar(json!({})).people().is_empty());
    }

    #[test]
    fn rejects_non_object() {
        assert!(Sidecar::from_value(json!([1, 2, 3])).is_err());
    }

    #[test]
    fn load_from_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.HEIC.json");
        std::fs::write(&path, r#"{"title": "a.HEIC", "photoTakenTime": {"timestamp": "1"}}"#)
            .unwrap();

        let s = Sidecar::load(&path).unwrap();
        assert_eq!(s.record()["title"], "a.HEIC");
        assert_eq!(s.photo_taken_time(), Some(1));
    }

    #[test]
    fn load_reports_bad_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{ nope").unwrap();

        let err = Sidecar::load(&path).unwrap_err();
        assert!(format!("{err:#}").contains("Failed to parse sidecar"));
    }
}
