//! Destination tree: `<root>/[<place>|UNK]/<year>/<month>/<relative path>.jpg`.

use anyhow::{Context, Result};
use chrono::Datelike;
use std::path::{Path, PathBuf};

use crate::geocode::{ReverseGeocoder, UNKNOWN_LOCATION};
use crate::sidecar::Sidecar;

/// Characters rejected in file names by at least one common filesystem.
const INVALID_FILENAME_CHARS: &[char] = &['\\', '/', ':', '"', '*', '?', '<', '>', '|'];

/// Replace every filesystem-illegal character with `_`, one for one.
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| if INVALID_FILENAME_CHARS.contains(&c) { '_' } else { c })
        .collect()
}

/// The location segment for a photo.
///
/// Returns `UNK` when the photo has no position, the geocoder is disabled,
/// the lookup fails, or the address carries neither city nor county.
pub async fn location_label(sidecar: &Sidecar, geocoder: &dyn ReverseGeocoder) -> String {
    let Some(point) = sidecar.geo_point() else {
        return UNKNOWN_LOCATION.to_string();
    };
    if !geocoder.is_enabled() {
        return UNKNOWN_LOCATION.to_string();
    }

    match geocoder.reverse(point.latitude, point.longitude).await {
        Ok(address) => match address.label() {
            Some(label) => sanitize_filename(label),
            None => {
                log::warn!(
                    "  No city or county for {}, {}; using {UNKNOWN_LOCATION}",
                    point.latitude,
                    point.longitude
                );
                UNKNOWN_LOCATION.to_string()
            }
        },
        Err(e) => {
            log::warn!(
                "  {} lookup failed for {}, {}: {e}; using {UNKNOWN_LOCATION}",
                geocoder.name(),
                point.latitude,
                point.longitude
            );
            UNKNOWN_LOCATION.to_string()
        }
    }
}

/// Compute the destination directory for a photo. Does not create it.
///
/// With `use_location` the result is `root/<place or UNK>/<year>/<month>`,
/// otherwise `root/<year>/<month>`. Year and month come from
/// `photoTakenTime` in local time; the month is not zero-padded.
///
/// Fails if the sidecar has no usable `photoTakenTime`.
pub async fn resolve_destination_dir(
    root: &Path,
    sidecar: &Sidecar,
    use_location: bool,
    geocoder: &dyn ReverseGeocoder,
) -> Result<PathBuf> {
    let taken = sidecar
        .taken_at()
        .context("Sidecar has no valid photoTakenTime.timestamp")?;

    let mut dir = root.to_path_buf();
    if use_location {
        dir.push(location_label(sidecar, geocoder).await);
    }
    dir.push(taken.year().to_string());
    dir.push(taken.month().to_string());
    Ok(dir)
}

/// Output file for `relative` (path of the source below the source root)
/// placed under `target_dir`, with the extension switched to `.jpg`.
pub fn target_jpeg_path(target_dir: &Path, relative: &Path) -> PathBuf {
    target_dir.join(relative).with_extension("jpg")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geocode::{Address, DisabledGeocoder};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Answers every lookup with a fixed result and counts calls.
    struct FakeGeocoder {
        answer: Option<Address>,
        enabled: bool,
        calls: AtomicUsize,
    }

    impl FakeGeocoder {
        fn new(answer: Option<Address>) -> Self {
            Self { answer, enabled: true, calls: AtomicUsize::new(0) }
        }

        /// Would answer, but reports itself as switched off.
        fn switched_off(answer: Option<Address>) -> Self {
            Self { enabled: false, ..Self::new(answer) }
        }
    }

    #[async_trait::async_trait]
    impl ReverseGeocoder for FakeGeocoder {
        fn name(&self) -> &str {
            "fake"
        }

        fn is_enabled(&self) -> bool {
            self.enabled
        }

        async fn reverse(&self, _latitude: f64, _longitude: f64) -> anyhow::Result<Address> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.answer.clone().context("lookup timed out")
        }
    }

    fn located() -> Sidecar {
        Sidecar::from_value(json!({
            "photoTakenTime": { "timestamp": "1700000000" },
            "geoData": { "latitude": 37.7749, "longitude": -122.4194 }
        }))
        .unwrap()
    }

    fn city(name: &str) -> Option<Address> {
        Some(Address { city: Some(name.into()), county: Some("Some County".into()) })
    }

    #[test]
    fn sanitize_replaces_each_illegal_char() {
        let input = r#"a\b/c:d"e*f?g<h>i|j"#;
        let out = sanitize_filename(input);
        assert_eq!(out, "a_b_c_d_e_f_g_h_i_j");
        assert_eq!(out.chars().count(), input.chars().count());
        assert!(!out.contains(INVALID_FILENAME_CHARS));
    }

    #[test]
    fn sanitize_leaves_clean_names_alone() {
        assert_eq!(sanitize_filename("São Paulo"), "São Paulo");
        assert_eq!(sanitize_filename(""), "");
    }

    #[tokio::test]
    async fn without_location_is_year_and_month() {
        let geocoder = FakeGeocoder::new(city("San Francisco"));
        let dir = resolve_destination_dir(Path::new("/out"), &located(), false, &geocoder)
            .await
            .unwrap();
        assert_eq!(dir, PathBuf::from("/out/2023/11"));
        assert_eq!(geocoder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn with_location_uses_city() {
        let geocoder = FakeGeocoder::new(city("San Francisco"));
        let dir = resolve_destination_dir(Path::new("/out"), &located(), true, &geocoder)
            .await
            .unwrap();
        assert_eq!(dir, PathBuf::from("/out/San Francisco/2023/11"));
        assert_eq!(geocoder.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn location_is_sanitized() {
        let geocoder = FakeGeocoder::new(city("Wien/Vienna"));
        let dir = resolve_destination_dir(Path::new("/out"), &located(), true, &geocoder)
            .await
            .unwrap();
        assert_eq!(dir, PathBuf::from("/out/Wien_Vienna/2023/11"));
    }

    #[tokio::test]
    async fn disabled_geocoder_gives_unk() {
        let dir = resolve_destination_dir(Path::new("/out"), &located(), true, &DisabledGeocoder)
            .await
            .unwrap();
        assert_eq!(dir, PathBuf::from("/out/UNK/2023/11"));
    }

    #[tokio::test]
    async fn disabled_geocoder_is_never_called() {
        let geocoder = FakeGeocoder::switched_off(city("San Francisco"));
        let dir = resolve_destination_dir(Path::new("/out"), &located(), true, &geocoder)
            .await
            .unwrap();
        assert_eq!(dir, PathBuf::from("/out/UNK/2023/11"));
        assert_eq!(geocoder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failed_lookup_gives_unk() {
        let geocoder = FakeGeocoder::new(None);
        let dir = resolve_destination_dir(Path::new("/out"), &located(), true, &geocoder)
            .await
            .unwrap();
        assert_eq!(dir, PathBuf::from("/out/UNK/2023/11"));
        assert_eq!(geocoder.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn empty_address_gives_unk() {
        let geocoder = FakeGeocoder::new(Some(Address::default()));
        let label = location_label(&located(), &geocoder).await;
        assert_eq!(label, "UNK");
    }

    #[tokio::test]
    async fn no_position_gives_unk_without_lookup() {
        let geocoder = FakeGeocoder::new(city("Nowhere"));
        let sidecar =
            Sidecar::from_value(json!({ "photoTakenTime": { "timestamp": 1700000000 } })).unwrap();
        let dir = resolve_destination_dir(Path::new("/out"), &sidecar, true, &geocoder)
            .await
            .unwrap();
        assert_eq!(dir, PathBuf::from("/out/UNK/2023/11"));
        assert_eq!(geocoder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn missing_timestamp_fails() {
        let sidecar = Sidecar::from_value(json!({ "title": "x" })).unwrap();
        let result =
            resolve_destination_dir(Path::new("/out"), &sidecar, false, &DisabledGeocoder).await;
        assert!(result.is_err());
    }

    #[test]
    fn target_keeps_relative_path() {
        assert_eq!(
            target_jpeg_path(Path::new("/out/UNK/2023/11"), Path::new("trip/IMG_1.HEIC")),
            PathBuf::from("/out/UNK/2023/11/trip/IMG_1.jpg")
        );
        assert_eq!(
            target_jpeg_path(Path::new("/out"), Path::new("IMG.2.HEIC")),
            PathBuf::from("/out/IMG.2.jpg")
        );
    }
}
