//! TOML configuration for the `pathex` export service.
//!
//! [`PathexConfig::load_from_path`] parses a config file; [`PathexConfig::validate`] reports every
//! semantic problem in one pass; [`init_tracing`] installs the global subscriber described by the
//! `[logging]` table.

mod diagnostics;
mod logging;
mod validation;

use pathex_core::{ParseError, ProfileSet, QualityRange};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub use diagnostics::{ConfigDiagnostics, ConfigValidationError, ConfigWarning, ValidationDiagnostics};
pub use logging::{init_tracing, LoggingConfig};

/// Environment variable consulted when no `--config` path is given.
pub const CONFIG_ENV_VAR: &str = "PATHEX_CONFIG";

const MIB: u64 = 1024 * 1024;

/// A byte size which supports both raw byte counts and human-friendly suffixes (`"512MiB"`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct ByteSize(pub u64);

impl ByteSize {
    pub fn bytes(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ByteSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}B", self.0)
    }
}

impl Serialize for ByteSize {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_u64(self.0)
    }
}

impl<'de> Deserialize<'de> for ByteSize {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Bytes(u64),
            Human(String),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Bytes(value) => Ok(ByteSize(value)),
            Repr::Human(value) => parse_byte_size(&value)
                .map(ByteSize)
                .map_err(serde::de::Error::custom),
        }
    }
}

/// Parses `"64"`, `"64K"`, `"64KiB"`, `"512MB"`, `"1G"`... Suffixes are binary multiples.
pub fn parse_byte_size(input: &str) -> Result<u64, String> {
    let trimmed = input.trim();
    let split = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len());
    let (digits, suffix) = trimmed.split_at(split);
    let value: u64 = digits
        .parse()
        .map_err(|_| format!("invalid byte size {trimmed:?}"))?;

    let multiplier: u64 = match suffix.trim().to_ascii_lowercase().as_str() {
        "" | "b" => 1,
        "k" | "kb" | "kib" => 1024,
        "m" | "mb" | "mib" => MIB,
        "g" | "gb" | "gib" => 1024 * MIB,
        other => return Err(format!("unknown byte size suffix {other:?}")),
    };
    value
        .checked_mul(multiplier)
        .ok_or_else(|| format!("byte size {trimmed:?} overflows"))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "ServerConfig::default_bind")]
    pub bind: SocketAddr,

    /// Upper bound for interactor submissions (request bodies and fetched URLs).
    #[serde(default = "ServerConfig::default_max_upload_bytes")]
    pub max_upload_bytes: ByteSize,

    /// Per-request timeout when fetching interactors by URL.
    #[serde(default = "ServerConfig::default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
}

impl ServerConfig {
    fn default_bind() -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], 8080))
    }

    fn default_max_upload_bytes() -> ByteSize {
        ByteSize(16 * MIB)
    }

    fn default_fetch_timeout_secs() -> u64 {
        30
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: Self::default_bind(),
            max_upload_bytes: Self::default_max_upload_bytes(),
            fetch_timeout_secs: Self::default_fetch_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Root of the artifact cache; each release gets its own subdirectory.
    #[serde(default = "CacheConfig::default_root")]
    pub root: PathBuf,

    /// Remove other releases' directories at start-up.
    #[serde(default = "CacheConfig::default_prune_stale_releases")]
    pub prune_stale_releases: bool,
}

impl CacheConfig {
    fn default_root() -> PathBuf {
        PathBuf::from("var/pathex/artifacts")
    }

    fn default_prune_stale_releases() -> bool {
        true
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            root: Self::default_root(),
            prune_stale_releases: Self::default_prune_stale_releases(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokensConfig {
    #[serde(default = "TokensConfig::default_root")]
    pub root: PathBuf,

    #[serde(default = "TokensConfig::default_ttl_secs")]
    pub ttl_secs: u64,

    #[serde(default = "TokensConfig::default_high_water_bytes")]
    pub high_water_bytes: ByteSize,

    #[serde(default = "TokensConfig::default_low_water_bytes")]
    pub low_water_bytes: ByteSize,

    #[serde(default = "TokensConfig::default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl TokensConfig {
    fn default_root() -> PathBuf {
        PathBuf::from("var/pathex/tokens")
    }

    fn default_ttl_secs() -> u64 {
        7 * 24 * 60 * 60
    }

    fn default_high_water_bytes() -> ByteSize {
        ByteSize(512 * MIB)
    }

    fn default_low_water_bytes() -> ByteSize {
        ByteSize(384 * MIB)
    }

    fn default_sweep_interval_secs() -> u64 {
        300
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl Default for TokensConfig {
    fn default() -> Self {
        Self {
            root: Self::default_root(),
            ttl_secs: Self::default_ttl_secs(),
            high_water_bytes: Self::default_high_water_bytes(),
            low_water_bytes: Self::default_low_water_bytes(),
            sweep_interval_secs: Self::default_sweep_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdmissionConfig {
    /// Total estimated memory the raster pipeline may have in flight.
    #[serde(default = "AdmissionConfig::default_raster_capacity_mib")]
    pub raster_capacity_mib: u64,

    /// Concurrent document renders.
    #[serde(default = "AdmissionConfig::default_document_limit")]
    pub document_limit: usize,

    /// Concurrent layout measurements for raster formats.
    #[serde(default = "AdmissionConfig::default_measure_limit")]
    pub measure_limit: usize,

    /// Bounded wait at either gate. Absent means callers wait as long as it takes.
    #[serde(default)]
    pub acquire_timeout_ms: Option<u64>,
}

impl AdmissionConfig {
    fn default_raster_capacity_mib() -> u64 {
        1024
    }

    fn default_document_limit() -> usize {
        4
    }

    fn default_measure_limit() -> usize {
        8
    }

    pub fn acquire_timeout(&self) -> Option<Duration> {
        self.acquire_timeout_ms.map(Duration::from_millis)
    }
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            raster_capacity_mib: Self::default_raster_capacity_mib(),
            document_limit: Self::default_document_limit(),
            measure_limit: Self::default_measure_limit(),
            acquire_timeout_ms: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostConfig {
    #[serde(default = "CostConfig::default_bytes_per_pixel")]
    pub bytes_per_pixel: u32,

    /// Linear scale applied per quality step; quality 5 renders at 1:1 with the default.
    #[serde(default = "CostConfig::default_scale_per_quality")]
    pub scale_per_quality: f64,

    /// Charged when the engine cannot report a layout size.
    #[serde(default = "CostConfig::default_unknown_size_mib")]
    pub unknown_size_mib: u64,
}

impl CostConfig {
    fn default_bytes_per_pixel() -> u32 {
        4
    }

    fn default_scale_per_quality() -> f64 {
        0.2
    }

    fn default_unknown_size_mib() -> u64 {
        64
    }
}

impl Default for CostConfig {
    fn default() -> Self {
        Self {
            bytes_per_pixel: Self::default_bytes_per_pixel(),
            scale_per_quality: Self::default_scale_per_quality(),
            unknown_size_mib: Self::default_unknown_size_mib(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderConfig {
    #[serde(default = "RenderConfig::default_profiles")]
    pub profiles: Vec<String>,

    #[serde(default = "RenderConfig::default_default_profile")]
    pub default_profile: String,

    #[serde(default = "RenderConfig::default_quality_min")]
    pub quality_min: u8,

    #[serde(default = "RenderConfig::default_quality_max")]
    pub quality_max: u8,

    #[serde(default = "RenderConfig::default_quality_default")]
    pub quality_default: u8,

    /// Program and leading arguments of the external render engine.
    #[serde(default)]
    pub command: Vec<String>,

    #[serde(default = "RenderConfig::default_timeout_secs")]
    pub timeout_secs: u64,
}

impl RenderConfig {
    fn default_profiles() -> Vec<String> {
        vec!["modern".to_owned(), "standard".to_owned()]
    }

    fn default_default_profile() -> String {
        "modern".to_owned()
    }

    fn default_quality_min() -> u8 {
        1
    }

    fn default_quality_max() -> u8 {
        10
    }

    fn default_quality_default() -> u8 {
        5
    }

    fn default_timeout_secs() -> u64 {
        120
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn profile_set(&self) -> Result<ProfileSet, ParseError> {
        ProfileSet::new(self.profiles.iter().map(String::as_str), &self.default_profile)
    }

    pub fn quality_range(&self) -> Result<QualityRange, ParseError> {
        QualityRange::new(self.quality_min, self.quality_max, self.quality_default)
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            profiles: Self::default_profiles(),
            default_profile: Self::default_default_profile(),
            quality_min: Self::default_quality_min(),
            quality_max: Self::default_quality_max(),
            quality_default: Self::default_quality_default(),
            command: Vec::new(),
            timeout_secs: Self::default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphConfig {
    /// JSON snapshot of the knowledge graph.
    #[serde(default)]
    pub snapshot: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathexConfig {
    /// Knowledge-graph release served by this process. Namespaces the artifact cache.
    pub release_version: u32,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub tokens: TokensConfig,

    #[serde(default)]
    pub admission: AdmissionConfig,

    #[serde(default)]
    pub cost: CostConfig,

    #[serde(default)]
    pub render: RenderConfig,

    #[serde(default)]
    pub graph: GraphConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl PathexConfig {
    /// Defaults for every table, serving `release_version`.
    pub fn with_release(release_version: u32) -> Self {
        Self {
            release_version,
            server: ServerConfig::default(),
            cache: CacheConfig::default(),
            tokens: TokensConfig::default(),
            admission: AdmissionConfig::default(),
            cost: CostConfig::default(),
            render: RenderConfig::default(),
            graph: GraphConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse toml config: {0}")]
    Toml(String),
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        // The default `Display` embeds a source snippet; keep only the message.
        ConfigError::Toml(err.message().to_owned())
    }
}

impl PathexConfig {
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = read_config(path.as_ref())?;
        Ok(toml::from_str(&text)?)
    }

    pub fn load_from_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Loads a config file and reports unknown keys together with [`PathexConfig::validate`]
    /// results.
    pub fn load_from_path_with_diagnostics(
        path: impl AsRef<Path>,
    ) -> Result<(Self, ConfigDiagnostics), ConfigError> {
        let text = read_config(path.as_ref())?;
        Self::load_from_str_with_diagnostics(&text)
    }

    pub fn load_from_str_with_diagnostics(
        text: &str,
    ) -> Result<(Self, ConfigDiagnostics), ConfigError> {
        let (config, unknown_keys) =
            diagnostics::deserialize_toml_with_unknown_keys::<PathexConfig>(text)?;
        let mut diagnostics = ConfigDiagnostics {
            unknown_keys,
            ..ConfigDiagnostics::default()
        };
        diagnostics.extend_validation(config.validate());
        Ok((config, diagnostics))
    }
}

fn read_config(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })
}
