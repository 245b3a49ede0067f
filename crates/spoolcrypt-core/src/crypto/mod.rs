//! Cryptographic primitives for spooled items
//!
//! Everything an item persists goes through AES in CTR mode (no padding),
//! keyed by a [`SymmetricKey`] that exists only for the lifetime of the item
//! and seeded by a fresh random IV per write session.

pub mod keys;
pub mod stream;

use thiserror::Error;

/// Errors raised while setting up key material or a cipher instance.
///
/// Messages deliberately carry no key or IV bytes.
#[derive(Error, Debug)]
pub enum CryptoError {
    /// The OS random source could not produce key material.
    ///
    /// **[SYSTEM ERROR]** Fatal for item construction.
    #[error("Key generation failed: {reason}")]
    KeyGeneration { reason: String },

    /// The cipher rejected the key or IV.
    ///
    /// **[PROGRAMMING ERROR]** Keys and IVs are generated internally with the
    /// right lengths, so this should never surface in practice.
    #[error("Cipher initialisation failed: {reason}")]
    CipherInit { reason: String },
}

// Re-export commonly used types
pub use keys::{KeySize, SymmetricKey};
pub use stream::{DecryptingReader, EncryptingWriter, IV_SIZE, StreamError};
