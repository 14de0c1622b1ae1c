use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::atomic_io::write_text_atomic;

pub const DEFAULT_BASE_URL: &str = "https://api.deepseek.com/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "deepseek-chat";
pub const SETTINGS_FILE_NAME: &str = "guide_settings.json";

/// Endpoint, model and credential as the visitor typed them. Empty fields
/// fall back to the defaults when a request is built.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatSettings {
    pub base_url: String,
    pub model: String,
    pub api_key: String,
}

impl ChatSettings {
    /// Fields prefilled the way the settings form starts out.
    pub fn prefilled() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key: String::new(),
        }
    }

    pub fn effective_base_url(&self) -> &str {
        non_empty_trimmed(&self.base_url).unwrap_or(DEFAULT_BASE_URL)
    }

    pub fn effective_model(&self) -> &str {
        non_empty_trimmed(&self.model).unwrap_or(DEFAULT_MODEL)
    }

    pub fn trimmed(&self) -> Self {
        Self {
            base_url: self.base_url.trim().to_string(),
            model: self.model.trim().to_string(),
            api_key: self.api_key.trim().to_string(),
        }
    }

    /// Saved values override the prefilled ones only when non-empty.
    pub fn overlay_saved(mut self, saved: &ChatSettings) -> Self {
        if !saved.base_url.is_empty() {
            self.base_url = saved.base_url.clone();
        }
        if !saved.model.is_empty() {
            self.model = saved.model.clone();
        }
        if !saved.api_key.is_empty() {
            self.api_key = saved.api_key.clone();
        }
        self
    }
}

fn non_empty_trimmed(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

/// Credential baked in at compile time, if any.
pub fn build_api_key() -> Option<&'static str> {
    option_env!("DS_API_KEY")
        .filter(|key| !key.is_empty())
        .or(option_env!("DEEPSEEK_API_KEY"))
        .filter(|key| !key.is_empty())
}

/// Build-time key first, then the typed field, then the saved value.
/// Whitespace-only candidates count as absent.
pub fn resolve_api_key(
    build_key: Option<&str>,
    field: &str,
    saved: Option<&str>,
) -> Option<String> {
    if let Some(key) = build_key.filter(|key| !key.is_empty()) {
        return non_empty_trimmed(key).map(str::to_string);
    }
    non_empty_trimmed(field)
        .or_else(|| saved.and_then(non_empty_trimmed))
        .map(str::to_string)
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse settings {path} at {json_path}: {source}")]
    Parse {
        path: PathBuf,
        json_path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode settings: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("failed to write settings {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn in_dir(data_dir: &Path) -> Self {
        Self::new(data_dir.join(SETTINGS_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `Ok(None)` when nothing has been saved yet.
    pub fn load(&self) -> Result<Option<ChatSettings>, SettingsError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(SettingsError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        parse_settings_json(&raw)
            .map(Some)
            .map_err(|(json_path, source)| SettingsError::Parse {
                path: self.path.clone(),
                json_path,
                source,
            })
    }

    /// Unreadable or malformed files are logged and treated as absent.
    pub fn load_or_warn(&self) -> Option<ChatSettings> {
        match self.load() {
            Ok(settings) => settings,
            Err(error) => {
                warn!(error = %error, "chat_settings_load_failed");
                None
            }
        }
    }

    pub fn save(&self, settings: &ChatSettings) -> Result<(), SettingsError> {
        let json = serde_json::to_string_pretty(settings).map_err(SettingsError::Encode)?;
        write_text_atomic(&self.path, &json).map_err(|source| SettingsError::Write {
            path: self.path.clone(),
            source,
        })?;
        info!(path = %self.path.display(), "chat_settings_saved");
        Ok(())
    }
}

fn parse_settings_json(raw: &str) -> Result<ChatSettings, (String, serde_json::Error)> {
    let mut deserializer = serde_json::Deserializer::from_str(raw);
    serde_path_to_error::deserialize::<_, ChatSettings>(&mut deserializer).map_err(|error| {
        let json_path = error.path().to_string();
        (json_path, error.into_inner())
    })
}
