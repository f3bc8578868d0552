//! Key-value CSV config file parsing.
//!
//! Every file under the config directory is a flat `key,value` CSV. Lines
//! starting with `#` and blank lines are skipped; unknown keys are ignored by
//! the typed layer; empty values for required keys fail hard.

use std::collections::HashMap;
use std::path::Path;

use crate::errors::ConfigError;

/// Flat key -> value map merged from every config file.
#[derive(Debug, Clone, Default)]
pub struct KeyValueMap {
    entries: HashMap<String, String>,
}

impl KeyValueMap {
    /// Parse a single file's contents into an existing map.
    /// Later files win on duplicate keys.
    pub fn merge_str(&mut self, contents: &str) {
        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            // Split at the first comma only; values may themselves contain
            // commas (e.g. URL templates with query strings).
            if let Some((key, value)) = line.split_once(',') {
                self.entries
                    .insert(key.trim().to_string(), value.trim().to_string());
            }
        }
    }

    /// Load and merge every `*.csv` file in a directory.
    pub fn load_dir(dir: &Path) -> Result<Self, ConfigError> {
        let mut map = Self::default();
        let read_dir = std::fs::read_dir(dir).map_err(|e| ConfigError::Io {
            path: dir.display().to_string(),
            source: e,
        })?;

        let mut paths: Vec<_> = read_dir
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "csv"))
            .collect();
        // Deterministic merge order regardless of filesystem enumeration.
        paths.sort();

        for path in paths {
            let contents = std::fs::read_to_string(&path).map_err(|e| ConfigError::Io {
                path: path.display().to_string(),
                source: e,
            })?;
            map.merge_str(&contents);
        }
        Ok(map)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str).filter(|v| !v.is_empty())
    }

    pub fn require(&self, key: &str) -> Result<&str, ConfigError> {
        self.get(key)
            .ok_or_else(|| ConfigError::MissingKey(key.to_string()))
    }

    pub fn require_f64(&self, key: &str) -> Result<f64, ConfigError> {
        let raw = self.require(key)?;
        raw.parse().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            value: raw.to_string(),
            reason: "expected a number".to_string(),
        })
    }

    pub fn require_i64(&self, key: &str) -> Result<i64, ConfigError> {
        let raw = self.require(key)?;
        raw.parse().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            value: raw.to_string(),
            reason: "expected an integer".to_string(),
        })
    }

    pub fn f64_or(&self, key: &str, default: f64) -> Result<f64, ConfigError> {
        match self.get(key) {
            Some(_) => self.require_f64(key),
            None => Ok(default),
        }
    }

    pub fn i64_or(&self, key: &str, default: i64) -> Result<i64, ConfigError> {
        match self.get(key) {
            Some(_) => self.require_i64(key),
            None => Ok(default),
        }
    }

    pub fn u64_or(&self, key: &str, default: u64) -> Result<u64, ConfigError> {
        let v = self.i64_or(key, default as i64)?;
        u64::try_from(v).map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            value: v.to_string(),
            reason: "must be non-negative".to_string(),
        })
    }

    pub fn usize_or(&self, key: &str, default: usize) -> Result<usize, ConfigError> {
        Ok(self.u64_or(key, default as u64)? as usize)
    }

    pub fn bool_or(&self, key: &str, default: bool) -> Result<bool, ConfigError> {
        match self.get(key) {
            None => Ok(default),
            Some(raw) => match raw.to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => Ok(true),
                "false" | "0" | "no" | "off" => Ok(false),
                _ => Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    value: raw.to_string(),
                    reason: "expected true/false".to_string(),
                }),
            },
        }
    }

    pub fn string_or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or(default).to_string()
    }
}
