//! Factory and item configuration

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crypto::KeySize;

/// Plaintext bytes an item keeps in memory before spilling to disk
pub const DEFAULT_SIZE_THRESHOLD: usize = 10240;

/// Errors that can occur while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Read(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Settings shared by every item a factory creates.
///
/// ```toml
/// size_threshold = 65536
/// repository = "/var/spool/uploads"
/// default_charset = "UTF-8"
/// key_size = "aes256"
/// ```
///
/// Every key is optional. Leaving `key_size` out lets the factory probe for
/// the strongest supported cipher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FactoryConfig {
    /// Plaintext threshold in bytes
    pub size_threshold: usize,
    /// Directory for spool files (platform temp dir if unset)
    pub repository: Option<PathBuf>,
    /// Charset for items whose content type names none
    pub default_charset: Option<String>,
    /// Forced key size; probed when unset
    pub key_size: Option<KeySize>,
}

impl Default for FactoryConfig {
    fn default() -> Self {
        Self {
            size_threshold: DEFAULT_SIZE_THRESHOLD,
            repository: None,
            default_charset: None,
            key_size: None,
        }
    }
}

impl FactoryConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Read configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&contents)?;
        tracing::debug!(path = %path.display(), "Loaded factory config");
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Fix every setting, probing the key size if none was given.
    pub fn resolve(&self) -> ItemConfig {
        ItemConfig {
            size_threshold: self.size_threshold,
            repository: self.repository.clone(),
            default_charset: self.default_charset.clone(),
            key_size: self.key_size.unwrap_or_else(KeySize::probe),
        }
    }
}

/// Fully resolved settings for one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemConfig {
    pub size_threshold: usize,
    pub repository: Option<PathBuf>,
    pub default_charset: Option<String>,
    pub key_size: KeySize,
}

impl Default for ItemConfig {
    fn default() -> Self {
        Self {
            size_threshold: DEFAULT_SIZE_THRESHOLD,
            repository: None,
            default_charset: None,
            key_size: KeySize::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = FactoryConfig::default();
        assert_eq!(config.size_threshold, 10240);
        assert!(config.repository.is_none());
        assert!(config.key_size.is_none());
        assert_eq!(ItemConfig::default().size_threshold, 10240);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = FactoryConfig::from_toml_str("default_charset = \"UTF-8\"").unwrap();
        assert_eq!(config.size_threshold, DEFAULT_SIZE_THRESHOLD);
        assert_eq!(config.default_charset.as_deref(), Some("UTF-8"));
    }

    #[test]
    fn test_full_toml() {
        let config = FactoryConfig::from_toml_str(
            r#"
            size_threshold = 16
            repository = "/var/spool/uploads"
            key_size = "aes128"
            "#,
        )
        .unwrap();
        assert_eq!(config.size_threshold, 16);
        assert_eq!(config.repository, Some(PathBuf::from("/var/spool/uploads")));
        assert_eq!(config.key_size, Some(KeySize::Aes128));
        assert_eq!(config.resolve().key_size, KeySize::Aes128);
    }

    #[test]
    fn test_bad_toml() {
        let err = FactoryConfig::from_toml_str("size_threshold = \"big\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_and_save_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("spoolcrypt.toml");
        let config = FactoryConfig {
            size_threshold: 512,
            repository: Some(dir.path().to_path_buf()),
            default_charset: Some("UTF-8".to_string()),
            key_size: Some(KeySize::Aes256),
        };
        std::fs::write(&path, config.to_toml_string().unwrap()).unwrap();

        assert_eq!(FactoryConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = FactoryConfig::load(dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read(_)));
    }

    #[test]
    fn test_resolve_probes_when_unset() {
        let resolved = FactoryConfig::default().resolve();
        assert_eq!(resolved.key_size, KeySize::probe());
    }
}
