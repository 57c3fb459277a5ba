use anyhow::{Context, Result};
use reqwest::Client;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

use super::{Address, ReverseGeocoder};
use crate::config::GeocoderConfig;

/// Reverse geocoder backed by an OpenStreetMap Nominatim server.
///
/// Requests are spaced at least `min_interval_ms` apart and answers are cached
/// per position (rounded to 4 decimals, roughly 10 m), since a photo library
/// usually holds many shots from the same spot.
pub struct NominatimGeocoder {
    endpoint: String,
    zoom: u8,
    min_interval: Duration,
    client: Client,
    last_request: tokio::sync::Mutex<Option<Instant>>,
    cache: Mutex<HashMap<(i64, i64), Address>>,
}

impl NominatimGeocoder {
    pub fn new(config: &GeocoderConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            zoom: config.zoom,
            min_interval: Duration::from_millis(config.min_interval_ms),
            client,
            last_request: tokio::sync::Mutex::new(None),
            cache: Mutex::new(HashMap::new()),
        })
    }

    fn cached(&self, key: (i64, i64)) -> Option<Address> {
        self.cache.lock().ok()?.get(&key).cloned()
    }

    fn remember(&self, key: (i64, i64), address: &Address) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(key, address.clone());
        }
    }

    /// Wait until the next request is allowed, then claim the slot.
    async fn throttle(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(prev) = *last {
            let ready_at = prev + self.min_interval;
            if ready_at > Instant::now() {
                tokio::time::sleep_until(ready_at).await;
            }
        }
        *last = Some(Instant::now());
    }
}

fn cache_key(latitude: f64, longitude: f64) -> (i64, i64) {
    (
        (latitude * 10_000.0).round() as i64,
        (longitude * 10_000.0).round() as i64,
    )
}

/// Extract city/county from a Nominatim `jsonv2` reverse response.
fn parse_address(json: &Value) -> Result<Address> {
    if let Some(err) = json.get("error").and_then(Value::as_str) {
        anyhow::bail!("Nominatim error: {err}");
    }

    let address = json
        .get("address")
        .context("No address in Nominatim response")?;
    let field = |key: &str| {
        address
            .get(key)
            .and_then(Value::as_str)
            .map(str::to_string)
    };

    Ok(Address {
        city: field("city"),
        county: field("county"),
    })
}

#[async_trait::async_trait]
impl ReverseGeocoder for NominatimGeocoder {
    fn name(&self) -> &str {
        "Nominatim"
    }

    async fn reverse(&self, latitude: f64, longitude: f64) -> Result<Address> {
        let key = cache_key(latitude, longitude);
        if let Some(address) = self.cached(key) {
            log::debug!("  Geocode cache hit for {latitude}, {longitude}");
            return Ok(address);
        }

        self.throttle().await;

        let url = format!("{}/reverse", self.endpoint);
        let resp = self
            .client
            .get(&url)
            .query(&[
                ("format", "jsonv2".to_string()),
                ("lat", latitude.to_string()),
                ("lon", longitude.to_string()),
                ("zoom", self.zoom.to_string()),
                ("addressdetails", "1".to_string()),
            ])
            .send()
            .await
            .context("Nominatim request failed")?;

        let status = resp.status();
        let text = resp.text().await.context("Failed to read Nominatim response")?;

        if !status.is_success() {
            anyhow::bail!("Nominatim API error ({}): {}", status, text);
        }

        let json: Value =
            serde_json::from_str(&text).context("Failed to parse Nominatim response JSON")?;
        let address = parse_address(&json)?;

        log::debug!("  Geocoded {latitude}, {longitude} -> {:?}", address.label());
        self.remember(key, &address);
        Ok(address)
    }
}
