//! Item factory.
//!
//! A multipart decoder asks the factory for one [`EncryptedItem`] per part.
//! The factory owns the shared settings and runs the key-size probe once, so
//! every item it hands out uses the same cipher strength.

use std::path::{Path, PathBuf};

use tracing::{debug, instrument};

use crate::config::{FactoryConfig, ItemConfig};
use crate::crypto::KeySize;
use crate::error::ItemError;
use crate::item::EncryptedItem;

pub use crate::config::DEFAULT_SIZE_THRESHOLD;

/// Creates [`EncryptedItem`]s that share threshold, repository, charset and
/// key size.
#[derive(Debug, Clone)]
pub struct EncryptedItemFactory {
    config: ItemConfig,
}

impl Default for EncryptedItemFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl EncryptedItemFactory {
    /// Factory with the default threshold, the platform temp directory and a
    /// probed key size.
    pub fn new() -> Self {
        Self::with_config(FactoryConfig::default())
    }

    #[instrument(level = "debug", skip(config), fields(threshold = config.size_threshold))]
    pub fn with_config(config: FactoryConfig) -> Self {
        let config = config.resolve();
        debug!(key_size = %config.key_size, "Item factory ready");
        Self { config }
    }

    pub fn size_threshold(&self) -> usize {
        self.config.size_threshold
    }

    pub fn set_size_threshold(&mut self, threshold: usize) {
        self.config.size_threshold = threshold;
    }

    pub fn repository(&self) -> Option<&Path> {
        self.config.repository.as_deref()
    }

    pub fn set_repository(&mut self, repository: Option<PathBuf>) {
        self.config.repository = repository;
    }

    pub fn default_charset(&self) -> Option<&str> {
        self.config.default_charset.as_deref()
    }

    pub fn set_default_charset(&mut self, charset: Option<String>) {
        self.config.default_charset = charset;
    }

    pub fn key_size(&self) -> KeySize {
        self.config.key_size
    }

    /// Create an empty item for one part of an upload.
    ///
    /// # Errors
    ///
    /// [`ItemError::KeyUnavailable`] if the item's key cannot be generated.
    pub fn create_item(
        &self,
        field_name: &str,
        content_type: Option<&str>,
        is_form_field: bool,
        file_name: Option<&str>,
    ) -> Result<EncryptedItem, ItemError> {
        EncryptedItem::new(field_name, content_type, is_form_field, file_name, &self.config)
    }
}
