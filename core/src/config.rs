//! Configuration for the locale sync pipeline.

use crate::store::LocaleStore;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const API_KEY_ENV: &str = "TRANSLATION_API_KEY";
pub const API_URL_ENV: &str = "TRANSLATION_API_URL";
pub const MODEL_ENV: &str = "TRANSLATION_MODEL";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config file {}: {message}", .path.display())]
    Parse { path: PathBuf, message: String },
    #[error(
        "TRANSLATION_API_KEY is not set. Export it (export TRANSLATION_API_KEY=...) or add \
         `apiKey` to the config file before running a sync."
    )]
    MissingCredential,
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProviderOptions {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Return short all-caps tokens (acronyms) untouched instead of sending them.
    #[serde(default = "default_true")]
    pub skip_acronyms: bool,
}

impl Default for ProviderOptions {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            model: default_model(),
            request_timeout_secs: default_request_timeout_secs(),
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            skip_acronyms: true,
        }
    }
}

impl ProviderOptions {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SyncConfig {
    #[serde(default = "default_source_locale")]
    pub source_locale: String,
    #[serde(default = "default_target_locales")]
    pub target_locales: Vec<String>,
    #[serde(default = "default_messages_dir")]
    pub messages_dir: PathBuf,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Keys whose value may legitimately equal the source (brand names, URLs).
    #[serde(default)]
    pub preserve_keys: Vec<String>,
    #[serde(default = "default_run_timeout_secs")]
    pub run_timeout_secs: u64,
    #[serde(default)]
    pub provider: ProviderOptions,
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
}

fn default_true() -> bool {
    true
}

fn default_source_locale() -> String {
    "en".into()
}

fn default_target_locales() -> Vec<String> {
    vec!["he".into(), "ar".into(), "fr".into(), "de".into()]
}

fn default_messages_dir() -> PathBuf {
    PathBuf::from("messages")
}

fn default_batch_size() -> usize {
    50
}

fn default_run_timeout_secs() -> u64 {
    600
}

fn default_endpoint() -> String {
    "https://api.openai.com/v1/chat/completions".into()
}

fn default_model() -> String {
    "gpt-4o-mini".into()
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1_000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            source_locale: default_source_locale(),
            target_locales: default_target_locales(),
            messages_dir: default_messages_dir(),
            batch_size: default_batch_size(),
            preserve_keys: Vec::new(),
            run_timeout_secs: default_run_timeout_secs(),
            provider: ProviderOptions::default(),
            api_key: None,
        }
    }
}

impl SyncConfig {
    /// Load configuration from a YAML (`.yaml`/`.yml`) or JSON file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let is_yaml = matches!(
            path.extension().and_then(|ext| ext.to_str()),
            Some("yaml") | Some("yml")
        );
        let parsed: Result<Self, String> = if is_yaml {
            serde_yaml::from_str(&content).map_err(|e| e.to_string())
        } else {
            serde_json::from_str(&content).map_err(|e| e.to_string())
        };

        parsed.map_err(|message| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        })
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::Parse {
            path: PathBuf::from("<inline>"),
            message: e.to_string(),
        })
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        serde_json::to_string_pretty(self).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    /// Overlays values from the process environment (or any lookup in tests).
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        if let Some(key) = non_empty(API_KEY_ENV) {
            self.api_key = Some(key);
        }
        if let Some(url) = non_empty(API_URL_ENV) {
            self.provider.endpoint = url;
        }
        if let Some(model) = non_empty(MODEL_ENV) {
            self.provider.model = model;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.source_locale.trim().is_empty() {
            return Err(ConfigError::Invalid("source locale must not be empty".into()));
        }
        if self.target_locales.is_empty() {
            return Err(ConfigError::Invalid(
                "at least one target locale is required".into(),
            ));
        }
        if self.target_locales.contains(&self.source_locale) {
            return Err(ConfigError::Invalid(format!(
                "source locale `{}` is also listed as a target",
                self.source_locale
            )));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid("batch size must be greater than 0".into()));
        }
        if self.provider.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "provider max attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// The credential, trimmed. Missing or blank keys are fatal.
    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .ok_or(ConfigError::MissingCredential)
    }

    pub fn store(&self) -> LocaleStore {
        LocaleStore::new(&self.messages_dir)
    }

    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.run_timeout_secs)
    }

    pub fn is_preserved(&self, key: &str) -> bool {
        self.preserve_keys.iter().any(|preserved| preserved == key)
    }
}
