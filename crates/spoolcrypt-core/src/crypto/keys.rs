#![forbid(unsafe_code)]

use std::fmt;

use aes::cipher::KeyIvInit;
use rand::TryRngCore;
use rand::rngs::OsRng;
use secrecy::{ExposeSecret, SecretSlice};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use super::CryptoError;
use super::stream::{Aes128Ctr, Aes256Ctr, IV_SIZE};

/// AES key length used for an item's ephemeral key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeySize {
    /// 128-bit key
    #[default]
    Aes128,
    /// 256-bit key
    Aes256,
}

impl KeySize {
    /// Key length in bytes.
    #[must_use]
    pub const fn byte_len(self) -> usize {
        match self {
            KeySize::Aes128 => 16,
            KeySize::Aes256 => 32,
        }
    }

    /// Key length in bits.
    #[must_use]
    pub const fn bits(self) -> usize {
        self.byte_len() * 8
    }

    /// Pick the strongest key size the cipher backend accepts.
    ///
    /// This is a one-off capability check meant to run while configuration is
    /// assembled; the result is handed to item construction rather than kept
    /// in any global.
    pub fn probe() -> Self {
        let key = [0u8; 32];
        let iv = [0u8; IV_SIZE];
        match Aes256Ctr::new_from_slices(&key, &iv) {
            Ok(_) => {
                debug!("AES-256 available, using 256-bit item keys");
                KeySize::Aes256
            }
            Err(e) => {
                warn!(error = %e, "AES-256 unavailable, falling back to 128-bit item keys");
                // Make sure the fallback is itself usable before handing it out
                if let Err(e) = Aes128Ctr::new_from_slices(&key[..16], &iv) {
                    warn!(error = %e, "AES-128 probe failed as well");
                }
                KeySize::Aes128
            }
        }
    }
}

impl fmt::Display for KeySize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AES-{}", self.bits())
    }
}

/// Ephemeral symmetric key owned by exactly one item.
///
/// The bytes live in a [`SecretSlice`], so they are zeroized when the key is
/// dropped and never show up in `Debug` output. Nothing outside this crate can
/// read them.
pub struct SymmetricKey {
    size: KeySize,
    material: SecretSlice<u8>,
}

impl fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SymmetricKey")
            .field("size", &self.size)
            .field("material", &"[REDACTED]")
            .finish()
    }
}

impl SymmetricKey {
    /// Generate a new key from the operating system's CSPRNG.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::KeyGeneration`] if the random source fails.
    pub fn generate(size: KeySize) -> Result<Self, CryptoError> {
        let mut bytes = vec![0u8; size.byte_len()];
        if let Err(e) = OsRng.try_fill_bytes(&mut bytes) {
            warn!(error = %e, "OS random source failed during key generation");
            return Err(CryptoError::KeyGeneration {
                reason: e.to_string(),
            });
        }
        trace!(key_size = %size, "Generated item key");
        Ok(Self {
            size,
            material: SecretSlice::from(bytes),
        })
    }

    #[must_use]
    pub fn size(&self) -> KeySize {
        self.size
    }

    pub(crate) fn expose(&self) -> &[u8] {
        self.material.expose_secret()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_lengths() {
        assert_eq!(KeySize::Aes128.byte_len(), 16);
        assert_eq!(KeySize::Aes256.byte_len(), 32);
        assert_eq!(KeySize::Aes256.bits(), 256);
        assert_eq!(KeySize::Aes128.to_string(), "AES-128");
    }

    #[test]
    fn test_generate_matches_size() {
        for size in [KeySize::Aes128, KeySize::Aes256] {
            let key = SymmetricKey::generate(size).unwrap();
            assert_eq!(key.size(), size);
            assert_eq!(key.expose().len(), size.byte_len());
        }
    }

    #[test]
    fn test_keys_are_distinct() {
        let a = SymmetricKey::generate(KeySize::Aes256).unwrap();
        let b = SymmetricKey::generate(KeySize::Aes256).unwrap();
        assert_ne!(a.expose(), b.expose());
    }

    #[test]
    fn test_debug_redacts_material() {
        let key = SymmetricKey::generate(KeySize::Aes128).unwrap();
        let debug = format!("{key:?}");
        assert!(debug.contains("[REDACTED]"));
        assert!(debug.contains("Aes128"));
    }

    #[test]
    fn test_probe_prefers_aes256() {
        // The RustCrypto backend always supports 256-bit keys
        assert_eq!(KeySize::probe(), KeySize::Aes256);
    }

    #[test]
    fn test_key_size_serde_names() {
        #[derive(Deserialize)]
        struct Wrapper {
            size: KeySize,
        }
        let parsed: Wrapper = toml::from_str("size = \"aes256\"").unwrap();
        assert_eq!(parsed.size, KeySize::Aes256);
    }
}
