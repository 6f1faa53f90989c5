// Persisted app settings (currently only the default site).
// The document is a flat JSON object; unknown fields are left untouched.

use crate::error::{BwmError, Result};
use clap::ValueEnum;
use serde_json::{Map, Value};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Settings understood by `bwm config`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ConfigKey {
    DefaultSite,
}

impl ConfigKey {
    /// Name used on the command line.
    pub fn as_str(self) -> &'static str {
        match self {
            ConfigKey::DefaultSite => "default-site",
        }
    }

    /// Field name inside the JSON document.
    fn field(self) -> &'static str {
        match self {
            ConfigKey::DefaultSite => "default_site",
        }
    }

    fn validate(self, value: &str) -> Result<()> {
        match self {
            ConfigKey::DefaultSite => crate::input::parse_http_url(value).map(|_| ()),
        }
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        ConfigStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read a setting. A missing file reads as an empty document.
    pub fn get(&self, key: ConfigKey) -> Result<Option<String>> {
        let doc = self.load()?;
        Ok(doc
            .get(key.field())
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string))
    }

    /// Read-modify-write of the whole document.
    pub fn set(&self, key: ConfigKey, value: &str) -> Result<PathBuf> {
        let value = value.trim();
        if value.is_empty() {
            return Err(BwmError::validation(format!("{key} cannot be empty")));
        }
        key.validate(value)?;

        let mut doc = self.load()?;
        doc.insert(key.field().to_string(), Value::String(value.to_string()));
        self.save(&doc)?;
        info!(key = %key, path = %self.path.display(), "updated config");
        Ok(self.path.clone())
    }

    fn load(&self) -> Result<Map<String, Value>> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => {
                return Err(BwmError::config(format!(
                    "Failed to read config file {}: {e}",
                    self.path.display()
                )))
            }
        };
        match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Object(map)) => Ok(map),
            _ => Err(BwmError::config(format!(
                "Config file is not valid JSON: {}",
                self.path.display()
            ))),
        }
    }

    fn save(&self, doc: &Map<String, Value>) -> Result<()> {
        let write = || -> std::io::Result<()> {
            if let Some(parent) = self.path.parent() {
                fs::create_dir_all(parent)?;
            }
            let body = serde_json::to_string_pretty(doc)?;
            fs::write(&self.path, format!("{body}\n"))
        };
        write().map_err(|e| {
            BwmError::config(format!(
                "Failed to write config file {}: {e}",
                self.path.display()
            ))
        })
    }
}
