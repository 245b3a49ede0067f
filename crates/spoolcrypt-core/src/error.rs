//! Error types for item operations
//!
//! [`ItemError`] is what callers of an [`EncryptedItem`](crate::EncryptedItem)
//! see. Lower layers ([`SpoolError`], [`StreamError`]) are folded into it so
//! messages stay at the level of "storage unavailable" or "corrupted data" and
//! never mention cipher internals or where the backing file lives.

use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::crypto::{CryptoError, StreamError};
use crate::spool::SpoolError;

/// Context for item operations, providing debugging information.
#[derive(Debug, Clone, Default)]
pub struct ItemContext {
    /// Form field name
    pub field_name: Option<String>,
    /// Client-supplied file name (if any)
    pub file_name: Option<String>,
    /// Operation being performed
    pub operation: Option<&'static str>,
}

impl ItemContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_field_name(mut self, field_name: impl Into<String>) -> Self {
        self.field_name = Some(field_name.into());
        self
    }

    #[must_use]
    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }

    #[must_use]
    pub fn with_operation(mut self, operation: &'static str) -> Self {
        self.operation = Some(operation);
        self
    }
}

impl fmt::Display for ItemContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();

        if let Some(op) = self.operation {
            parts.push(op.to_string());
        }
        if let Some(ref field) = self.field_name {
            parts.push(format!("field '{field}'"));
        }
        if let Some(ref name) = self.file_name {
            parts.push(format!("file '{}'", name.escape_default()));
        }

        if parts.is_empty() {
            write!(f, "(no context)")
        } else {
            write!(f, "{}", parts.join(", "))
        }
    }
}

#[derive(Error, Debug)]
pub enum ItemError {
    /// Reading or writing the backing storage failed.
    #[error("Storage unavailable for {context}: {source}")]
    StorageIo {
        #[source]
        source: io::Error,
        context: ItemContext,
    },

    /// No key could be generated; the item cannot exist.
    #[error("Encryption key unavailable: {reason}")]
    KeyUnavailable { reason: String },

    /// The cipher refused the item's key or a session IV.
    #[error("Cipher initialisation failed: {reason}")]
    CipherInit { reason: String },

    /// The client-supplied file name contains a NUL byte.
    #[error("Invalid file name: {name}")]
    InvalidFileName { name: String },

    /// Fewer bytes came back than the item says it holds.
    ///
    /// **[INTEGRITY VIOLATION]** The backing storage was truncated or corrupted.
    #[error("Corrupted data for {context}: expected {expected} bytes, got {actual}")]
    ShortRead {
        expected: u64,
        actual: u64,
        context: ItemContext,
    },

    /// Copying the plaintext out to `destination` failed.
    #[error("Cannot write item to {}: {source}", .destination.display())]
    WriteOut {
        destination: PathBuf,
        #[source]
        source: Box<ItemError>,
    },
}

impl ItemError {
    /// Create a storage error with context
    #[must_use]
    pub fn storage(source: io::Error, context: ItemContext) -> Self {
        ItemError::StorageIo { source, context }
    }

    pub(crate) fn from_spool(err: SpoolError, context: ItemContext) -> Self {
        ItemError::StorageIo {
            source: err.into(),
            context,
        }
    }

    pub(crate) fn from_stream(err: StreamError, context: ItemContext) -> Self {
        match err {
            StreamError::Crypto(crypto) => crypto.into(),
            StreamError::Io { source, .. } => ItemError::StorageIo { source, context },
            StreamError::TruncatedIv { expected, actual } => ItemError::ShortRead {
                expected: expected as u64,
                actual: actual as u64,
                context,
            },
        }
    }

    /// `true` for errors that point at damaged backing data rather than an
    /// unavailable resource.
    #[must_use]
    pub fn is_corruption(&self) -> bool {
        match self {
            ItemError::ShortRead { .. } => true,
            ItemError::WriteOut { source, .. } => source.is_corruption(),
            _ => false,
        }
    }
}

impl From<CryptoError> for ItemError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::KeyGeneration { reason } => ItemError::KeyUnavailable { reason },
            CryptoError::CipherInit { reason } => ItemError::CipherInit { reason },
        }
    }
}

/// Escape NUL bytes the way they are reported in [`ItemError::InvalidFileName`].
pub(crate) fn escape_nul(name: &str) -> String {
    name.replace('\0', "\\0")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_display_empty() {
        assert_eq!(ItemContext::new().to_string(), "(no context)");
    }

    #[test]
    fn test_context_display_combined() {
        let context = ItemContext::new()
            .with_operation("get")
            .with_field_name("avatar")
            .with_file_name("me.png");
        assert_eq!(context.to_string(), "get, field 'avatar', file 'me.png'");
    }

    #[test]
    fn test_crypto_errors_map_to_item_kinds() {
        let err: ItemError = CryptoError::KeyGeneration {
            reason: "no entropy".into(),
        }
        .into();
        assert!(matches!(err, ItemError::KeyUnavailable { .. }));

        let err: ItemError = CryptoError::CipherInit {
            reason: "bad length".into(),
        }
        .into();
        assert!(matches!(err, ItemError::CipherInit { .. }));
    }

    #[test]
    fn test_truncated_iv_is_corruption() {
        let err = ItemError::from_stream(
            StreamError::TruncatedIv {
                expected: 16,
                actual: 3,
            },
            ItemContext::new(),
        );
        assert!(err.is_corruption());
        assert!(err.to_string().starts_with("Corrupted data"));
    }

    #[test]
    fn test_write_out_names_destination() {
        let err = ItemError::WriteOut {
            destination: PathBuf::from("/srv/out.bin"),
            source: Box::new(ItemError::storage(
                io::Error::from(io::ErrorKind::PermissionDenied),
                ItemContext::new(),
            )),
        };
        assert!(err.to_string().contains("/srv/out.bin"));
        assert!(!err.is_corruption());
    }

    #[test]
    fn test_escape_nul() {
        assert_eq!(escape_nul("a\0b.txt"), "a\\0b.txt");
    }
}
