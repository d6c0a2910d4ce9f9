//! Chronicle configuration via `chronicle.toml`
//!
//! Every field is optional in the file; missing fields take their defaults.
//! Values are validated eagerly when the file is read, so a bad batch size is
//! reported at startup rather than on the first commit.

use serde::{Deserialize, Serialize};
use std::path::Path;

use chronicle_core::{Error, Result};

/// Config file name
pub const CONFIG_FILE_NAME: &str = "chronicle.toml";

fn default_audit_batch_size() -> usize {
    500
}

fn default_rollback_batch_size() -> usize {
    200
}

/// Engine configuration loaded from `chronicle.toml`.
///
/// # Example
///
/// ```toml
/// # Audit rows per insert statement
/// audit_batch_size = 500
///
/// # Objects per batched rollback lookup
/// rollback_batch_size = 200
///
/// # Reject Update locks that saw no write
/// strict_update_locks = false
///
/// # default_comment = "nightly import"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChronicleConfig {
    /// Audit rows per insert statement.
    #[serde(default = "default_audit_batch_size")]
    pub audit_batch_size: usize,
    /// Objects per batched rollback lookup.
    #[serde(default = "default_rollback_batch_size")]
    pub rollback_batch_size: usize,
    /// When true, an Update lock with no recorded action fails the commit.
    #[serde(default)]
    pub strict_update_locks: bool,
    /// Comment written to the commit log when a unit of work sets none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_comment: Option<String>,
}

impl Default for ChronicleConfig {
    fn default() -> Self {
        Self {
            audit_batch_size: default_audit_batch_size(),
            rollback_batch_size: default_rollback_batch_size(),
            strict_update_locks: false,
            default_comment: None,
        }
    }
}

impl ChronicleConfig {
    /// Check value ranges.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if a batch size is zero.
    pub fn validate(&self) -> Result<()> {
        if self.audit_batch_size == 0 {
            return Err(Error::Configuration(
                "audit_batch_size must be greater than 0".to_string(),
            ));
        }
        if self.rollback_batch_size == 0 {
            return Err(Error::Configuration(
                "rollback_batch_size must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# Chronicle configuration
#
# Audit rows inserted per statement (default: 500)
audit_batch_size = 500

# Objects looked up per batched rollback query (default: 200)
rollback_batch_size = 200

# Reject Update locks for which no write was observed (default: false)
strict_update_locks = false

# Comment written to the commit log when a unit of work sets none
# default_comment = "nightly import"
"#
    }

    /// Read and parse config from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        let config: ChronicleConfig = toml::from_str(&content).map_err(|e| {
            Error::Configuration(format!(
                "Failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Write the default config file if it does not already exist.
    ///
    /// Returns `Ok(())` whether the file was created or already existed.
    pub fn write_default_if_missing(path: &Path) -> Result<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml())?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Configuration(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
