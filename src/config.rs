//! Store configuration
//!
//! The read-only flag is explicit configuration handed to the store at
//! construction, never ambient process state. Two store instances in one
//! process may therefore differ (one live, one read-only against the same
//! backend).

use crate::error::{Result, StoreError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Which backend implementation to open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Volatile in-memory backend. Reference implementation, used by tests.
    Memory,
    /// Directory-of-images backend with an advisory lock file.
    File,
}

impl Default for BackendKind {
    fn default() -> Self {
        BackendKind::File
    }
}

/// Store configuration, loadable from a TOML file.
///
/// ```toml
/// read_only = false
///
/// [backend]
/// kind = "file"
/// path = "/var/lib/gridstore"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Suppress every mutating operation (logged, not executed).
    #[serde(default)]
    pub read_only: bool,

    #[serde(default)]
    pub backend: BackendConfig,
}

/// Backend selection and parameters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default)]
    pub kind: BackendKind,

    /// Root directory for the file backend. Ignored by the memory backend.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            read_only: false,
            backend: BackendConfig::default(),
        }
    }
}

impl StoreConfig {
    /// Load configuration from a TOML file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        toml::from_str(&text).map_err(|e| StoreError::Config(e.to_string()))
    }

    /// In-memory configuration with read-only off. Handy in tests.
    pub fn memory() -> Self {
        StoreConfig {
            read_only: false,
            backend: BackendConfig {
                kind: BackendKind::Memory,
                path: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = StoreConfig::default();
        assert!(!config.read_only);
        assert_eq!(config.backend.kind, BackendKind::File);
        assert!(config.backend.path.is_none());
    }

    #[test]
    fn test_parse_toml() {
        let text = r#"
            read_only = true

            [backend]
            kind = "memory"
        "#;
        let config: StoreConfig = toml::from_str(text).unwrap();
        assert!(config.read_only);
        assert_eq!(config.backend.kind, BackendKind::Memory);
    }

    #[test]
    fn test_parse_file_backend() {
        let text = r#"
            [backend]
            kind = "file"
            path = "/var/lib/gridstore"
        "#;
        let config: StoreConfig = toml::from_str(text).unwrap();
        assert!(!config.read_only);
        assert_eq!(
            config.backend.path.as_deref(),
            Some(std::path::Path::new("/var/lib/gridstore"))
        );
    }
}
