use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

pub const ENV_STRICT_SUPPORT: &str = "GOVERNOR_INDEXER_STRICT_SUPPORT";
pub const ENV_CANCEL_SETS_STATE: &str = "GOVERNOR_INDEXER_CANCEL_SETS_STATE";
pub const ENV_DEDUP: &str = "GOVERNOR_INDEXER_DEDUP";
pub const ENV_ENFORCE_ORDERING: &str = "GOVERNOR_INDEXER_ENFORCE_ORDERING";
pub const ENV_DATA_DIR: &str = "GOVERNOR_INDEXER_DATA_DIR";

pub const DEFAULT_DATA_DIR: &str = "governor-data";

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigError {
    #[error("Invalid value '{value}' for {name}")]
    InvalidValue { name: String, value: String },

    #[error("Failed to read config file {path}: {details}")]
    Io { path: String, details: String },

    #[error("Failed to parse config file {path}: {details}")]
    Parse { path: String, details: String },
}

/// How support codes outside {0, 1} are tallied
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SupportPolicy {
    /// Anything that is not 0 or 1 counts as abstain
    #[default]
    Permissive,
    /// Only 2 is abstain; larger codes are rejected
    Strict,
}

impl FromStr for SupportPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "permissive" => Ok(SupportPolicy::Permissive),
            "strict" => Ok(SupportPolicy::Strict),
            _ => Err(ConfigError::InvalidValue {
                name: "support_policy".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for SupportPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SupportPolicy::Permissive => f.write_str("permissive"),
            SupportPolicy::Strict => f.write_str("strict"),
        }
    }
}

/// Behaviour switches for the proposal tracker
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IndexerConfig {
    pub support_policy: SupportPolicy,
    /// Set `Canceled` on ProposalCanceled instead of only recording the event
    pub cancel_sets_state: bool,
    /// Skip events whose position was already applied from the same transaction
    pub dedup_redeliveries: bool,
    /// Reject events at or behind the last applied position
    pub enforce_ordering: bool,
    pub data_dir: PathBuf,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            support_policy: SupportPolicy::Permissive,
            cancel_sets_state: false,
            dedup_redeliveries: true,
            enforce_ordering: true,
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
        }
    }
}

/// A partial configuration layer. `None` leaves the lower layer alone.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigOverrides {
    pub support_policy: Option<SupportPolicy>,
    pub cancel_sets_state: Option<bool>,
    pub dedup_redeliveries: Option<bool>,
    pub enforce_ordering: Option<bool>,
    pub data_dir: Option<PathBuf>,
}

impl ConfigOverrides {
    /// Reads the `GOVERNOR_INDEXER_*` variables from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds overrides from any variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let flag = |name: &str| -> Result<Option<bool>, ConfigError> {
            lookup(name).map(|value| parse_bool(name, &value)).transpose()
        };

        let support_policy = match lookup(ENV_STRICT_SUPPORT) {
            Some(value) => Some(if parse_bool(ENV_STRICT_SUPPORT, &value)? {
                SupportPolicy::Strict
            } else {
                SupportPolicy::Permissive
            }),
            None => None,
        };

        Ok(Self {
            support_policy,
            cancel_sets_state: flag(ENV_CANCEL_SETS_STATE)?,
            dedup_redeliveries: flag(ENV_DEDUP)?,
            enforce_ordering: flag(ENV_ENFORCE_ORDERING)?,
            data_dir: lookup(ENV_DATA_DIR).filter(|v| !v.is_empty()).map(PathBuf::from),
        })
    }

    /// Reads a JSON file holding any subset of the config fields
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            details: e.to_string(),
        })?;
        serde_json::from_str(&text).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            details: e.to_string(),
        })
    }

    pub fn apply_to(&self, config: &mut IndexerConfig) {
        if let Some(policy) = self.support_policy {
            config.support_policy = policy;
        }
        if let Some(value) = self.cancel_sets_state {
            config.cancel_sets_state = value;
        }
        if let Some(value) = self.dedup_redeliveries {
            config.dedup_redeliveries = value;
        }
        if let Some(value) = self.enforce_ordering {
            config.enforce_ordering = value;
        }
        if let Some(dir) = &self.data_dir {
            config.data_dir = dir.clone();
        }
    }
}

fn parse_bool(name: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            name: name.to_string(),
            value: value.to_string(),
        }),
    }
}

static ENV_OVERRIDES: Lazy<Result<ConfigOverrides, ConfigError>> =
    Lazy::new(ConfigOverrides::from_env);

impl IndexerConfig {
    /// Defaults with the process environment applied on top.
    /// The environment is read once per process.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = IndexerConfig::default();
        (*ENV_OVERRIDES).clone()?.apply_to(&mut config);
        Ok(config)
    }

    /// Stacks layers in order; later layers win
    pub fn layered<'a, I>(layers: I) -> Self
    where
        I: IntoIterator<Item = &'a ConfigOverrides>,
    {
        let mut config = IndexerConfig::default();
        for layer in layers {
            layer.apply_to(&mut config);
        }
        config
    }
}
