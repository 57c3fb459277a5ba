use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration for heic-organizer.
///
/// Controls the reverse geocoder, the destination directory scheme,
/// and output behavior (JPEG quality, dry run).
///
/// # Loading
///
/// ```rust,no_run
/// use heic_organizer::config::Config;
///
/// // From a JSON file
/// let config = Config::load(Some("config.json".as_ref())).unwrap();
///
/// // Or use defaults and customize
/// let mut config = Config::default();
/// config.geocoder.user_agent = "my-photo-sorter/1.0".into();
/// config.layout.use_location = false;
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Reverse geocoding service settings.
    pub geocoder: GeocoderConfig,
    /// Destination tree layout and file matching.
    pub layout: LayoutConfig,
    /// Output behavior (JPEG quality, dry run).
    pub output: OutputConfig,
}

/// Nominatim-compatible reverse geocoder settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeocoderConfig {
    /// If `false`, no lookups are made and located photos land under `UNK`.
    pub enabled: bool,
    /// Base URL of the service; `/reverse` is appended.
    pub endpoint: String,
    /// Nominatim's usage policy requires an identifying User-Agent.
    pub user_agent: String,
    pub timeout_secs: u64,
    /// Minimum spacing between two requests, in milliseconds.
    pub min_interval_ms: u64,
    /// Nominatim detail level (10 = city).
    pub zoom: u8,
}

/// Controls how source files are matched and where outputs land.
///
/// # Example
///
/// ```rust
/// use heic_organizer::config::LayoutConfig;
///
/// let layout = LayoutConfig {
///     use_location: true,           // <root>/<place>/<year>/<month>
///     ignore_extension_case: false, // only exact ".HEIC"
/// };
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Insert a location segment (`<place>` or `UNK`) above year/month.
    pub use_location: bool,
    /// Match `.heic`, `.Heic`, ... as well as `.HEIC`.
    pub ignore_extension_case: bool,
}

/// Output and behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// JPEG encoder quality, 1-100.
    pub jpeg_quality: u8,
    /// If `true`, resolve destinations without writing any files.
    pub dry_run: bool,
}

impl Default for GeocoderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: "https://nominatim.openstreetmap.org".to_string(),
            user_agent: format!("heic-organizer/{}", env!("CARGO_PKG_VERSION")),
            timeout_secs: 10,
            min_interval_ms: 1000,
            zoom: 10,
        }
    }
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            use_location: true,
            ignore_extension_case: false,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            jpeg_quality: 90,
            dry_run: false,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            geocoder: GeocoderConfig::default(),
            layout: LayoutConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

impl Config {
    /// Default config location: `config.json` next to the executable.
    pub fn config_path() -> Result<PathBuf> {
        let exe_path = std::env::current_exe().context("Failed to get executable path")?;
        let exe_dir = exe_path
            .parent()
            .context("Failed to get executable directory")?;
        Ok(exe_dir.join("config.json"))
    }

    /// Load config from the given path, or from the default location.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };

        if !config_path.exists() {
            log::warn!(
                "Config file not found at {}. Using defaults.",
                config_path.display()
            );
            return Ok(Self::default());
        }

        let contents =
            std::fs::read_to_string(&config_path).context("Failed to read config file")?;
        let config: Config =
            serde_json::from_str(&contents).context("Failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    /// Save config to the given path, or to the default location.
    pub fn save(&self, path: Option<&Path>) -> Result<()> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };

        let contents = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(&config_path, contents).context("Failed to write config file")?;
        log::info!("Config saved to {}", config_path.display());
        Ok(())
    }

    /// Reject values the encoder or geocoder cannot work with.
    pub fn validate(&self) -> Result<()> {
        if !(1..=100).contains(&self.output.jpeg_quality) {
            anyhow::bail!(
                "jpeg_quality must be between 1 and 100, got {}",
                self.output.jpeg_quality
            );
        }
        if self.geocoder.enabled && self.geocoder.user_agent.trim().is_empty() {
            anyhow::bail!("geocoder.user_agent must not be empty when the geocoder is enabled");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert!(config.geocoder.enabled);
        assert!(config.layout.use_location);
        assert!(!config.layout.ignore_extension_case);
        assert_eq!(config.output.jpeg_quality, 90);
    }

    #[test]
    fn load_missing_file_falls_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load(Some(&dir.path().join("nope.json"))).unwrap();
        assert_eq!(config.geocoder.min_interval_ms, 1000);
    }

    #[test]
    fn save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");

        let mut config = Config::default();
        config.layout.ignore_extension_case = true;
        config.output.jpeg_quality = 75;
        config.save(Some(&path)).unwrap();

        let loaded = Config::load(Some(&path)).unwrap();
        assert!(loaded.layout.ignore_extension_case);
        assert_eq!(loaded.output.jpeg_quality, 75);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "geocoder": { "enabled": false } }"#).unwrap();

        let loaded = Config::load(Some(&path)).unwrap();
        assert!(!loaded.geocoder.enabled);
        assert_eq!(loaded.geocoder.timeout_secs, 10);
        assert!(loaded.layout.use_location);
    }

    #[test]
    fn rejects_out_of_range_quality() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "output": { "jpeg_quality": 0 } }"#).unwrap();

        assert!(Config::load(Some(&path)).is_err());
    }
}
