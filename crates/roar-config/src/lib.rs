//! Loading, validation and merging of `.roar/config.toml`.
//!
//! [`RoarConfig`] is the typed view of the on-disk file described in the
//! external interfaces section: `[output] [analyzers] [filters] [cleanup]
//! [glaas] [registration] [hash] [reversible] [logging] [env]`. Every
//! section is `#[serde(default)]` so a partial file is legal — `roar init`
//! writes the full default, but hand-edited files only need to mention the
//! keys they override.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Errors that can occur while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The requested configuration file was not found.
    #[error("config file not found: {path}")]
    FileNotFound {
        /// Path that was requested.
        path: String,
    },
    /// The file could not be parsed as valid TOML.
    #[error("failed to parse config: {reason}")]
    Parse {
        /// Human-readable parse error detail.
        reason: String,
    },
    /// Semantic validation failed.
    #[error("config validation failed: {reasons:?}")]
    Validation {
        /// Individual validation failure messages.
        reasons: Vec<String>,
    },
}

/// Advisory issues that do not block operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigWarning {
    /// An unrecognised top-level section was present (likely a typo).
    UnknownSection {
        /// The offending section name.
        name: String,
    },
    /// `registration.batch_max_bytes` sits above the server's hard limit.
    BatchLimitTooHigh {
        /// The configured value.
        configured: u64,
        /// The server's hard limit.
        server_limit: u64,
    },
    /// `glaas.key` is a relative path, which breaks if the cwd changes.
    RelativeKeyPath {
        /// The configured path.
        path: String,
    },
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownSection { name } => write!(f, "unrecognised config section '{name}'"),
            Self::BatchLimitTooHigh {
                configured,
                server_limit,
            } => write!(
                f,
                "registration.batch_max_bytes={configured} exceeds the server limit of {server_limit}"
            ),
            Self::RelativeKeyPath { path } => {
                write!(f, "glaas.key '{path}' is relative; resolve it from $HOME instead")
            }
        }
    }
}

/// The server's hard per-request body limit (see the registration
/// coordinator's batching design).
pub const SERVER_BODY_LIMIT_BYTES: u64 = 100 * 1024;

/// Default per-batch target, a safety margin under [`SERVER_BODY_LIMIT_BYTES`].
pub const DEFAULT_BATCH_TARGET_BYTES: u64 = 90 * 1024;

/// Typed view of `.roar/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct RoarConfig {
    /// `[output]` — rendering preferences.
    #[serde(default)]
    pub output: OutputConfig,
    /// `[analyzers]` — experiment-tracker analyzer toggles.
    #[serde(default)]
    pub analyzers: AnalyzersConfig,
    /// `[filters]` — noise filter toggles (§4.9).
    #[serde(default)]
    pub filters: FiltersConfig,
    /// `[cleanup]` — temp file and strict-cleanup behavior.
    #[serde(default)]
    pub cleanup: CleanupConfig,
    /// `[glaas]` — LaaS server connection settings.
    #[serde(default)]
    pub glaas: GlaasConfig,
    /// `[registration]` — batching and phase behavior.
    #[serde(default)]
    pub registration: RegistrationConfig,
    /// `[hash]` — default hash algorithms.
    #[serde(default)]
    pub hash: HashConfig,
    /// `[reversible]` — output backup-before-overwrite behavior.
    #[serde(default)]
    pub reversible: ReversibleConfig,
    /// `[logging]` — log level and format.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// `[env]` — free-form environment variable passthrough map.
    #[serde(default)]
    pub env: std::collections::BTreeMap<String, String>,
}

impl Default for RoarConfig {
    fn default() -> Self {
        Self {
            output: OutputConfig::default(),
            analyzers: AnalyzersConfig::default(),
            filters: FiltersConfig::default(),
            cleanup: CleanupConfig::default(),
            glaas: GlaasConfig::default(),
            registration: RegistrationConfig::default(),
            hash: HashConfig::default(),
            reversible: ReversibleConfig::default(),
            logging: LoggingConfig::default(),
            env: std::collections::BTreeMap::new(),
        }
    }
}

/// `[output]` section.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(default)]
pub struct OutputConfig {
    /// Emit `--json` by default.
    pub json: bool,
    /// Suppress non-essential output (`-q`).
    pub quiet: bool,
    /// Disable ANSI colors.
    pub no_color: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            json: false,
            quiet: false,
            no_color: false,
        }
    }
}

/// `[analyzers]` section.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(default)]
pub struct AnalyzersConfig {
    /// Detect experiment-tracker URLs (wandb, mlflow, ...) in output.
    pub experiment_trackers: bool,
}

impl Default for AnalyzersConfig {
    fn default() -> Self {
        Self {
            experiment_trackers: true,
        }
    }
}

/// `[filters]` section — toggles for the noise filters in §4.9.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(default)]
pub struct FiltersConfig {
    /// Drop reads under system prefixes (`/sys`, `/etc`, ...).
    pub system_reads: bool,
    /// Drop torch/triton inductor cache churn under `/tmp`.
    pub torch_cache: bool,
    /// Drop reads resolved to installed packages / stdlib.
    pub package_reads: bool,
    /// Drop `/tmp/*` writes unless `cleanup.strict` is set.
    pub temp_files: bool,
}

impl Default for FiltersConfig {
    fn default() -> Self {
        Self {
            system_reads: true,
            torch_cache: true,
            package_reads: true,
            temp_files: true,
        }
    }
}

/// `[cleanup]` section.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(default)]
pub struct CleanupConfig {
    /// Require `/tmp/*` writes to survive noise filtering even when
    /// `filters.temp_files` would otherwise drop them.
    pub strict: bool,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self { strict: false }
    }
}

/// `[glaas]` section.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(default)]
pub struct GlaasConfig {
    /// LaaS server base URL. Overridden by `$GLAAS_URL`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Path to the SSH private key used for request signing. Overridden by
    /// `$ROAR_SSH_KEY`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

impl Default for GlaasConfig {
    fn default() -> Self {
        Self {
            url: None,
            key: None,
        }
    }
}

/// `[registration]` section.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(default)]
pub struct RegistrationConfig {
    /// Target size per artifact batch (bytes); see `DEFAULT_BATCH_TARGET_BYTES`.
    pub batch_max_bytes: u64,
    /// Max I/O links per batch in phase 4.
    pub link_batch_max_count: u32,
    /// Secret-filter configuration applied before any phase.
    #[serde(default)]
    pub omit: OmitConfig,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            batch_max_bytes: DEFAULT_BATCH_TARGET_BYTES,
            link_batch_max_count: 100,
            omit: OmitConfig::default(),
        }
    }
}

/// `[registration.omit]` — secret filter configuration (§4.10).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(default)]
pub struct OmitConfig {
    /// Master enable switch.
    pub enabled: bool,
    /// Literal values to redact everywhere they appear.
    pub explicit_values: Vec<String>,
    /// Environment variable names whose values are blanket-redacted.
    pub env_var_names: Vec<String>,
    /// Patterns the built-in set should not flag (detection ids).
    pub allowlist_patterns: Vec<String>,
}

impl Default for OmitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            explicit_values: Vec::new(),
            env_var_names: Vec::new(),
            allowlist_patterns: Vec::new(),
        }
    }
}

/// `[hash]` section.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(default)]
pub struct HashConfig {
    /// Algorithms computed for every observed file, in order.
    pub algorithms: Vec<String>,
}

impl Default for HashConfig {
    fn default() -> Self {
        Self {
            algorithms: vec!["blake3".into()],
        }
    }
}

/// `[reversible]` section.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(default)]
pub struct ReversibleConfig {
    /// Back up a script's prior outputs under `.roar/backups/<job_uid>/...`
    /// before a re-run overwrites them.
    pub enabled: bool,
}

impl Default for ReversibleConfig {
    fn default() -> Self {
        Self { enabled: false }
    }
}

/// `[logging]` section.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing` env-filter directive, e.g. `"info"`, `"roar=debug"`.
    pub level: String,
    /// Emit JSON-formatted log lines instead of human-readable ones.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
        }
    }
}

const VALID_LOG_LEVELS: &[&str] = &["error", "warn", "info", "debug", "trace"];
const KNOWN_SECTIONS: &[&str] = &[
    "output",
    "analyzers",
    "filters",
    "cleanup",
    "glaas",
    "registration",
    "hash",
    "reversible",
    "logging",
    "env",
];

/// Load a [`RoarConfig`] from an optional TOML file path, falling back to
/// defaults when `path` is `None`, then apply environment overrides.
pub fn load_config(path: Option<&Path>) -> Result<RoarConfig, ConfigError> {
    let mut config = match path {
        Some(p) => {
            let content = std::fs::read_to_string(p).map_err(|_| ConfigError::FileNotFound {
                path: p.display().to_string(),
            })?;
            parse_toml(&content)?
        }
        None => RoarConfig::default(),
    };
    apply_env_overrides(&mut config);
    Ok(config)
}

/// Parse a TOML string into a [`RoarConfig`].
pub fn parse_toml(content: &str) -> Result<RoarConfig, ConfigError> {
    toml::from_str::<RoarConfig>(content).map_err(|e| ConfigError::Parse {
        reason: e.to_string(),
    })
}

/// Apply the two environment overrides named in the external interfaces
/// section: `ROAR_SSH_KEY` and `GLAAS_URL`.
pub fn apply_env_overrides(config: &mut RoarConfig) {
    if let Ok(val) = std::env::var("ROAR_SSH_KEY") {
        config.glaas.key = Some(val);
    }
    if let Ok(val) = std::env::var("GLAAS_URL") {
        config.glaas.url = Some(val);
    }
}

/// Validate a parsed configuration, returning advisory warnings. Hard
/// errors go back as [`ConfigError::Validation`].
pub fn validate_config(
    config: &RoarConfig,
    raw_toml: &str,
) -> Result<Vec<ConfigWarning>, ConfigError> {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    if !VALID_LOG_LEVELS.contains(&config.logging.level.as_str()) {
        errors.push(format!("invalid logging.level '{}'", config.logging.level));
    }

    for algo in &config.hash.algorithms {
        if !matches!(algo.as_str(), "blake3" | "sha256" | "sha512" | "md5") {
            errors.push(format!("unknown hash algorithm '{algo}'"));
        }
    }

    if config.registration.batch_max_bytes > SERVER_BODY_LIMIT_BYTES {
        warnings.push(ConfigWarning::BatchLimitTooHigh {
            configured: config.registration.batch_max_bytes,
            server_limit: SERVER_BODY_LIMIT_BYTES,
        });
    }

    if let Some(ref key) = config.glaas.key {
        if !Path::new(key).is_absolute() {
            warnings.push(ConfigWarning::RelativeKeyPath { path: key.clone() });
        }
    }

    if let Ok(raw) = toml::from_str::<toml::Table>(raw_toml) {
        for key in raw.keys() {
            if !KNOWN_SECTIONS.contains(&key.as_str()) {
                warnings.push(ConfigWarning::UnknownSection { name: key.clone() });
            }
        }
    }

    if errors.is_empty() {
        Ok(warnings)
    } else {
        Err(ConfigError::Validation { reasons: errors })
    }
}

/// Read a single dotted key (e.g. `"glaas.url"`) out of a config for
/// `roar config get`.
pub fn get(config: &RoarConfig, dotted_key: &str) -> Option<String> {
    let value = toml::Value::try_from(config).ok()?;
    let mut cur = &value;
    for part in dotted_key.split('.') {
        cur = cur.get(part)?;
    }
    Some(match cur {
        toml::Value::String(s) => s.clone(),
        other => other.to_string(),
    })
}

/// Set a single dotted key to `value` in raw TOML text, parsing `value`
/// as a TOML scalar (bool/int/float) where possible and falling back to
/// a string, for `roar config set`. Returns the rewritten document.
pub fn set_raw(raw_toml: &str, dotted_key: &str, value: &str) -> Result<String, ConfigError> {
    let mut doc: toml::Value =
        toml::from_str(raw_toml).map_err(|e| ConfigError::Parse { reason: e.to_string() })?;

    let parts: Vec<&str> = dotted_key.split('.').collect();
    let Some((last, path)) = parts.split_last() else {
        return Err(ConfigError::Parse { reason: "empty key".to_string() });
    };

    let mut cur = &mut doc;
    for part in path {
        cur = cur
            .as_table_mut()
            .ok_or_else(|| ConfigError::Parse { reason: format!("'{part}' is not a table") })?
            .entry(part.to_string())
            .or_insert_with(|| toml::Value::Table(Default::default()));
    }

    let table = cur
        .as_table_mut()
        .ok_or_else(|| ConfigError::Parse { reason: format!("'{dotted_key}' has no parent table") })?;
    table.insert((*last).to_string(), parse_scalar(value));

    toml::to_string_pretty(&doc).map_err(|e| ConfigError::Parse { reason: e.to_string() })
}

fn parse_scalar(value: &str) -> toml::Value {
    if let Ok(b) = value.parse::<bool>() {
        return toml::Value::Boolean(b);
    }
    if let Ok(i) = value.parse::<i64>() {
        return toml::Value::Integer(i);
    }
    if let Ok(f) = value.parse::<f64>() {
        return toml::Value::Float(f);
    }
    toml::Value::String(value.to_string())
}
