// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persistent key/value config store.
//!
//! The file is YAML: a mapping from section name to a flat mapping of
//! variable names to scalar values.
//!
//! ```yaml
//! general:
//!   API_URL: https://odahu.example.com
//!   API_TOKEN: eyJhbGciOi...
//!   RETRY_ATTEMPTS: 5
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{OdahuError, Result};

/// Environment variable overriding the config file location.
pub const ENV_ODAHUFLOW_CONFIG: &str = "ODAHUFLOW_CONFIG";

/// Section used for API credentials and client settings.
pub const DEFAULT_SECTION: &str = "general";

type RawFile = BTreeMap<String, BTreeMap<String, serde_yaml::Value>>;

/// Handle to the user-scoped config file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    /// Create a store backed by a specific file. The file need not exist.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Open the store at [`ConfigStore::config_path`].
    #[allow(clippy::result_large_err)]
    pub fn open_default() -> Result<Self> {
        Ok(Self::new(Self::config_path()?))
    }

    /// Get the default config file path (~/.odahuflow/config)
    ///
    /// # Errors
    ///
    /// Returns an error if the home directory cannot be determined
    #[allow(clippy::result_large_err)]
    pub fn default_path() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| OdahuError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(".odahuflow").join("config"))
    }

    /// Get the path to the config file, respecting the ODAHUFLOW_CONFIG environment variable
    #[allow(clippy::result_large_err)]
    pub fn config_path() -> Result<PathBuf> {
        match std::env::var(ENV_ODAHUFLOW_CONFIG) {
            Ok(env_path) if !env_path.is_empty() => Ok(PathBuf::from(env_path)),
            _ => Self::default_path(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every section. A missing file yields an empty map.
    #[allow(clippy::result_large_err)]
    pub fn load(&self) -> Result<BTreeMap<String, BTreeMap<String, String>>> {
        let mut sections = BTreeMap::new();
        for (name, raw) in self.load_raw()? {
            let values = render_section(&name, raw)?;
            sections.insert(name, values);
        }
        Ok(sections)
    }

    /// Read one section. A missing file or section yields an empty map.
    ///
    /// Non-string scalars are rendered to strings; nulls are skipped.
    #[allow(clippy::result_large_err)]
    pub fn section(&self, name: &str) -> Result<BTreeMap<String, String>> {
        let raw = self.load_raw()?.remove(name).unwrap_or_default();
        render_section(name, raw)
    }

    /// Merge values into a section and write the file back.
    ///
    /// `Some` non-empty values set the key; `None` or empty values remove it.
    /// The parent directory is created when missing and the file is replaced
    /// atomically. On Unix the file is readable by the owner only.
    #[allow(clippy::result_large_err)]
    pub fn update<I, K>(&self, section: &str, values: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, Option<String>)>,
        K: Into<String>,
    {
        let mut raw = self.load_raw()?;
        let entries = raw.entry(section.to_string()).or_default();

        for (key, value) in values {
            let key = key.into();
            match value {
                Some(v) if !v.is_empty() => {
                    entries.insert(key, serde_yaml::Value::String(v));
                }
                _ => {
                    entries.remove(&key);
                }
            }
        }

        let content = serde_yaml::to_string(&raw)
            .map_err(|e| OdahuError::Config(format!("Failed to serialize config: {e}")))?;
        self.write_atomically(content.as_bytes())?;

        debug!(target: "odahu_api::config", "Configuration file {} has been updated", self.path.display());
        Ok(())
    }

    #[allow(clippy::result_large_err)]
    fn load_raw(&self) -> Result<RawFile> {
        if !self.path.exists() {
            debug!(target: "odahu_api::config", "Cannot find configuration file {}", self.path.display());
            return Ok(RawFile::new());
        }

        let content = fs::read_to_string(&self.path).map_err(|e| {
            OdahuError::Config(format!(
                "Failed to read config file {}: {}",
                self.path.display(),
                e
            ))
        })?;

        if content.trim().is_empty() {
            return Ok(RawFile::new());
        }

        serde_yaml::from_str(&content).map_err(|e| {
            OdahuError::Config(format!(
                "Failed to parse config file {}: {}",
                self.path.display(),
                e
            ))
        })
    }

    #[allow(clippy::result_large_err)]
    fn write_atomically(&self, content: &[u8]) -> Result<()> {
        let parent = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent)?;

        let mut tmp = tempfile::NamedTempFile::new_in(&parent)?;
        tmp.write_all(content)?;
        tmp.flush()?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(tmp.path(), fs::Permissions::from_mode(0o600))?;
        }

        tmp.persist(&self.path).map_err(|e| OdahuError::Io(e.error))?;
        Ok(())
    }
}

#[allow(clippy::result_large_err)]
fn render_section(
    name: &str,
    raw: BTreeMap<String, serde_yaml::Value>,
) -> Result<BTreeMap<String, String>> {
    let mut values = BTreeMap::new();
    for (key, value) in raw {
        let rendered = match value {
            serde_yaml::Value::Null => continue,
            serde_yaml::Value::String(s) => s,
            serde_yaml::Value::Bool(b) => b.to_string(),
            serde_yaml::Value::Number(n) => n.to_string(),
            other => {
                return Err(OdahuError::Config(format!(
                    "Config variable {key} in section '{name}' must be a scalar, got {other:?}"
                )))
            }
        };
        values.insert(key, rendered);
    }
    Ok(values)
}
