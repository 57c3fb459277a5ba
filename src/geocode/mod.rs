//! Reverse geocoding: coordinates in, place names out.
//!
//! The resolver only depends on the [`ReverseGeocoder`] trait, so the network
//! client can be swapped for [`DisabledGeocoder`] or a test fake.

mod nominatim;

pub use nominatim::NominatimGeocoder;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::config::GeocoderConfig;

/// Label used when no place name can be determined.
pub const UNKNOWN_LOCATION: &str = "UNK";

/// Administrative names returned by a lookup. Either may be missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Address {
    pub city: Option<String>,
    pub county: Option<String>,
}

impl Address {
    /// The city if known, else the county. Blank names count as missing.
    pub fn label(&self) -> Option<&str> {
        [self.city.as_deref(), self.county.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|s| !s.is_empty())
    }
}

/// Trait for reverse geocoding backends.
///
/// # Example
///
/// ```rust,no_run
/// use heic_organizer::config::GeocoderConfig;
/// use heic_organizer::geocode::{NominatimGeocoder, ReverseGeocoder};
///
/// # async fn example() -> anyhow::Result<()> {
/// let geocoder = NominatimGeocoder::new(&GeocoderConfig::default())?;
/// let address = geocoder.reverse(37.7749, -122.4194).await?;
/// println!("City: {:?}", address.city);
/// # Ok(())
/// # }
/// ```
#[async_trait::async_trait]
pub trait ReverseGeocoder: Send + Sync {
    /// The display name of this backend (e.g., "Nominatim").
    fn name(&self) -> &str;
    /// `false` means callers should not bother calling [`reverse`](Self::reverse).
    fn is_enabled(&self) -> bool {
        true
    }
    /// Look up the address nearest to the given position.
    async fn reverse(&self, latitude: f64, longitude: f64) -> Result<Address>;
}

/// A geocoder that never looks anything up.
#[derive(Debug, Default)]
pub struct DisabledGeocoder;

#[async_trait::async_trait]
impl ReverseGeocoder for DisabledGeocoder {
    fn name(&self) -> &str {
        "disabled"
    }

    fn is_enabled(&self) -> bool {
        false
    }

    async fn reverse(&self, _latitude: f64, _longitude: f64) -> Result<Address> {
        anyhow::bail!("Reverse geocoding is disabled")
    }
}

/// Build the geocoder described by the configuration.
pub fn build_geocoder(config: &GeocoderConfig) -> Result<Box<dyn ReverseGeocoder>> {
    if !config.enabled {
        log::info!("Reverse geocoding disabled; located photos go under {UNKNOWN_LOCATION}");
        return Ok(Box::new(DisabledGeocoder));
    }
    Ok(Box::new(NominatimGeocoder::new(config)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_prefers_city() {
        let address = Address {
            city: Some("San Francisco".into()),
            county: Some("San Francisco County".into()),
        };
        assert_eq!(address.label(), Some("San Francisco"));
    }

    #[test]
    fn label_falls_back_to_county() {
        let address = Address { city: None, county: Some("Marin County".into()) };
        assert_eq!(address.label(), Some("Marin County"));

        let blank_city = Address { city: Some("  ".into()), county: Some("Kent".into()) };
        assert_eq!(blank_city.label(), Some("Kent"));
    }

    #[test]
    fn label_none_when_empty() {
        assert_eq!(Address::default().label(), None);
    }

    #[tokio::test]
    async fn disabled_geocoder_refuses() {
        let geocoder = DisabledGeocoder;
        assert!(!geocoder.is_enabled());
        assert!(geocoder.reverse(1.0, 2.0).await.is_err());
    }

    #[test]
    fn build_respects_enabled_flag() {
        let mut config = GeocoderConfig::default();
        config.enabled = false;
        assert_eq!(build_geocoder(&config).unwrap().name(), "disabled");

        config.enabled = true;
        assert_eq!(build_geocoder(&config).unwrap().name(), "Nominatim");
    }
}
