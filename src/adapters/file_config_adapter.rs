//! INI configuration adapter.
//!
//! Section and key names are case-insensitive and blank values count as
//! absent. Variables named `RANGESCAN__{SECTION}__{KEY}` override file values.

use configparser::ini::Ini;
use std::path::Path;
use tracing::debug;

use crate::domain::error::RangeError;
use crate::ports::config_port::ConfigPort;

pub const ENV_PREFIX: &str = "RANGESCAN__";

pub struct FileConfigAdapter {
    ini: Ini,
    origin: String,
}

impl FileConfigAdapter {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, RangeError> {
        let origin = path.as_ref().display().to_string();
        let mut ini = Ini::new();
        ini.load(path.as_ref())
            .map_err(|reason| RangeError::ConfigParse {
                file: origin.clone(),
                reason,
            })?;
        Ok(Self { ini, origin })
    }

    pub fn from_string(content: &str) -> Result<Self, RangeError> {
        let origin = "<inline>".to_string();
        let mut ini = Ini::new();
        ini.read(content.to_string())
            .map_err(|reason| RangeError::ConfigParse {
                file: origin.clone(),
                reason,
            })?;
        Ok(Self { ini, origin })
    }

    /// Where the settings were read from.
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Apply `RANGESCAN__{SECTION}__{KEY}` pairs on top of the loaded values.
    /// Names without the prefix or without both parts are ignored.
    pub fn with_overrides<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        for (name, value) in vars {
            let Some(rest) = name.as_ref().strip_prefix(ENV_PREFIX) else {
                continue;
            };
            let Some((section, key)) = rest.split_once("__") else {
                continue;
            };
            if section.is_empty() || key.is_empty() {
                continue;
            }
            let (section, key) = (section.to_lowercase(), key.to_lowercase());
            debug!(section = %section, key = %key, "config value overridden from environment");
            self.ini.set(&section, &key, Some(value.into()));
        }
        self
    }

    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(std::env::vars())
    }

    fn parse_bool(value: &str) -> Option<bool> {
        match value.trim().to_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Some(true),
            "false" | "no" | "off" | "0" => Some(false),
            _ => None,
        }
    }
}

impl ConfigPort for FileConfigAdapter {
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        self.ini
            .get(section, key)
            .filter(|v| !v.trim().is_empty())
    }

    fn get_int(&self, section: &str, key: &str, default: i64) -> i64 {
        self.get_string(section, key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    fn get_double(&self, section: &str, key: &str, default: f64) -> f64 {
        self.get_string(section, key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool {
        self.get_string(section, key)
            .and_then(|v| Self::parse_bool(&v))
            .unwrap_or(default)
    }
}
