//! Configuration file handling with TOML support.

use crate::api::DEFAULT_POLYGON_URL;
use crate::cache::{ClientCache, DEFAULT_CACHE_KEY};
use crate::intent::{DEFAULT_DAYS, DEFAULT_MODEL, DEFAULT_OPENAI_URL};
use crate::search::{DEFAULT_LIMIT, DEFAULT_THRESHOLD};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application configuration loaded from TOML file.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// General settings
    #[serde(default)]
    pub general: GeneralConfig,

    /// Where the ticker catalog comes from and how it is cached
    #[serde(default)]
    pub catalog: CatalogConfig,

    /// Fuzzy search settings
    #[serde(default)]
    pub search: SearchConfig,

    /// Market data provider
    #[serde(default)]
    pub market_data: MarketDataConfig,

    /// Natural-language intent resolver
    #[serde(default)]
    pub intent: IntentConfig,

    /// Color scheme
    #[serde(default)]
    pub colors: ColorConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// API timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Extra attempts for a transient failure
    #[serde(default = "default_retries")]
    pub retries: u32,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            retries: default_retries(),
        }
    }
}

fn default_timeout() -> u64 {
    10
}
fn default_retries() -> u32 {
    1
}

/// Ticker catalog settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// File path or http(s) URL
    #[serde(default = "default_catalog_source")]
    pub source: String,

    #[serde(default = "default_cache_key")]
    pub cache_key: String,

    /// Defaults to the platform cache directory
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,

    /// How long a cached catalog stays valid, e.g. "7d". Unset means forever.
    #[serde(default)]
    pub cache_ttl: Option<String>,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            source: default_catalog_source(),
            cache_key: default_cache_key(),
            cache_dir: None,
            cache_ttl: None,
        }
    }
}

fn default_catalog_source() -> String {
    "ticker-list.json".to_string()
}
fn default_cache_key() -> String {
    DEFAULT_CACHE_KEY.to_string()
}

impl CatalogConfig {
    pub fn ttl(&self) -> Result<Option<Duration>> {
        self.cache_ttl
            .as_deref()
            .map(|ttl| {
                humantime::parse_duration(ttl)
                    .with_context(|| format!("Invalid catalog.cache_ttl: {}", ttl))
            })
            .transpose()
    }

    pub fn cache_dir(&self) -> Option<PathBuf> {
        self.cache_dir.clone().or_else(ClientCache::default_dir)
    }
}

/// Search settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Maximum suggestions shown
    #[serde(default = "default_limit")]
    pub limit: usize,

    /// Worst accepted match score, 0.0 to 1.0
    #[serde(default = "default_threshold")]
    pub threshold: f64,

    /// Days of history fetched after a selection
    #[serde(default = "default_days")]
    pub days: u32,

    /// Start a fresh query on the first keystroke after a selection
    #[serde(default)]
    pub clear_on_focus: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            threshold: default_threshold(),
            days: default_days(),
            clear_on_focus: false,
        }
    }
}

fn default_limit() -> usize {
    DEFAULT_LIMIT
}
fn default_threshold() -> f64 {
    DEFAULT_THRESHOLD
}
fn default_days() -> u32 {
    DEFAULT_DAYS
}

/// Market data provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketDataConfig {
    #[serde(default = "default_polygon_url")]
    pub base_url: String,

    /// Environment variable holding the API key
    #[serde(default = "default_polygon_key_env")]
    pub api_key_env: String,
}

impl Default for MarketDataConfig {
    fn default() -> Self {
        Self {
            base_url: default_polygon_url(),
            api_key_env: default_polygon_key_env(),
        }
    }
}

fn default_polygon_url() -> String {
    DEFAULT_POLYGON_URL.to_string()
}
fn default_polygon_key_env() -> String {
    "POLYGON_API_KEY".to_string()
}

/// Intent resolver settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentConfig {
    #[serde(default = "default_openai_url")]
    pub base_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    /// Environment variable holding the API key
    #[serde(default = "default_openai_key_env")]
    pub api_key_env: String,

    /// List the catalog's company names in the system prompt
    #[serde(default = "default_true")]
    pub include_catalog: bool,
}

impl Default for IntentConfig {
    fn default() -> Self {
        Self {
            base_url: default_openai_url(),
            model: default_model(),
            api_key_env: default_openai_key_env(),
            include_catalog: true,
        }
    }
}

fn default_openai_url() -> String {
    DEFAULT_OPENAI_URL.to_string()
}
fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}
fn default_openai_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}
fn default_true() -> bool {
    true
}

/// Color configuration using hex codes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColorConfig {
    /// Color for positive changes
    #[serde(default = "default_gain_color")]
    pub gain: String,

    /// Color for negative changes
    #[serde(default = "default_loss_color")]
    pub loss: String,

    /// Color for neutral/unchanged
    #[serde(default = "default_neutral_color")]
    pub neutral: String,

    /// Border color
    #[serde(default = "default_border_color")]
    pub border: String,
}

impl Default for ColorConfig {
    fn default() -> Self {
        Self {
            gain: default_gain_color(),
            loss: default_loss_color(),
            neutral: default_neutral_color(),
            border: default_border_color(),
        }
    }
}

fn default_gain_color() -> String {
    "#0cf0a8".to_string()
}
fn default_loss_color() -> String {
    "#E2366F".to_string()
}
fn default_neutral_color() -> String {
    "#808080".to_string()
}
fn default_border_color() -> String {
    "#444444".to_string()
}

impl Config {
    /// Load configuration from file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Load configuration from default location or create default.
    pub fn load_or_default() -> Self {
        if let Some(path) = Self::default_config_path() {
            if path.exists() {
                match Self::load(&path) {
                    Ok(config) => return config,
                    Err(e) => {
                        let error = format!("{:#}", e);
                        tracing::warn!(%error, "failed to load config, using defaults");
                    }
                }
            }
        }
        Config::default()
    }

    /// An explicitly named config must load; otherwise fall back to the default path.
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::load_or_default()),
        }
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("kynos").join("config.toml"))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.general.timeout)
    }
}

/// Generate a sample configuration file content.
pub fn sample_config() -> &'static str {
    r##"# Kynos Configuration File
# Find an S&P 500 company and chart its price history

[general]
# API timeout in seconds
timeout = 10
# Extra attempts after a timeout, 429 or 5xx
retries = 1

[catalog]
# Ticker list: a JSON file or an http(s) URL
source = "ticker-list.json"
# Cache entry name
cache_key = "stockSymbols"
# Cache location (defaults to the platform cache directory)
# cache_dir = "/tmp/kynos"
# Expire the cached catalog after this long (never, if unset)
# cache_ttl = "7d"

[search]
# Maximum suggestions shown
limit = 10
# Worst accepted match score: 0.0 is exact, 1.0 matches anything
threshold = 0.3
# Days of history fetched after picking a suggestion
days = 365
# Start a fresh query on the first keystroke after a selection
clear_on_focus = false

[market_data]
base_url = "https://api.polygon.io"
# Environment variable holding the Polygon API key
api_key_env = "POLYGON_API_KEY"

[intent]
base_url = "https://api.openai.com/v1"
model = "gpt-4"
# Environment variable holding the OpenAI API key
api_key_env = "OPENAI_API_KEY"
# Send the known company names along with each prompt
include_catalog = true

[colors]
# Colors in hex format
gain = "#0cf0a8"
loss = "#E2366F"
neutral = "#808080"
border = "#444444"
"##
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.general.timeout, 10);
        assert_eq!(config.general.retries, 1);
        assert_eq!(config.catalog.cache_key, "stockSymbols");
        assert_eq!(config.search.limit, 10);
        assert_eq!(config.search.threshold, 0.3);
        assert_eq!(config.search.days, 365);
        assert_eq!(config.intent.model, "gpt-4");
        assert!(config.intent.include_catalog);
        assert_eq!(config.catalog.ttl().unwrap(), None);
    }

    #[test]
    fn test_sample_config_parses() {
        let config: Config = toml::from_str(sample_config()).unwrap();
        assert_eq!(config.search.limit, 10);
        assert_eq!(config.colors.gain, "#0cf0a8");
        assert_eq!(config.market_data.api_key_env, "POLYGON_API_KEY");
    }

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config: Config = toml::from_str("[search]\nlimit = 5\n").unwrap();
        assert_eq!(config.search.limit, 5);
        assert_eq!(config.search.threshold, 0.3);
        assert_eq!(config.general.timeout, 10);
    }

    #[test]
    fn test_cache_ttl() {
        let config: Config = toml::from_str("[catalog]\ncache_ttl = \"7d\"\n").unwrap();
        assert_eq!(
            config.catalog.ttl().unwrap(),
            Some(Duration::from_secs(7 * 24 * 3600))
        );

        let config: Config = toml::from_str("[catalog]\ncache_ttl = \"soon\"\n").unwrap();
        assert!(config.catalog.ttl().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[general]\ntimeout = 3").unwrap();
        let config = Config::resolve(Some(file.path())).unwrap();
        assert_eq!(config.timeout(), Duration::from_secs(3));
    }

    #[test]
    fn test_explicit_missing_file_is_an_error() {
        assert!(Config::resolve(Some(Path::new("/no/such/kynos.toml"))).is_err());
    }
}
