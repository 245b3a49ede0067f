//! Streaming AES-CTR wrappers.
//!
//! # Persisted Layout
//!
//! | Offset | Size | Description |
//! |--------|------|-------------|
//! | 0      | 16   | IV (cleartext, one per write session) |
//! | 16     | n    | AES-CTR ciphertext, same length as the plaintext |
//!
//! CTR mode turns the block cipher into a keystream, so both directions are
//! pure pass-through transforms with no padding and no buffering of the
//! payload.

use std::io::{self, Read, Write};

use aes::cipher::{KeyIvInit, StreamCipher};
use rand::RngCore;
use thiserror::Error;
use tracing::{trace, warn};
use zeroize::Zeroizing;

use super::CryptoError;
use super::keys::{KeySize, SymmetricKey};

// ============================================================================
// Constants
// ============================================================================

/// IV size for AES-CTR: one AES block (16 bytes)
pub const IV_SIZE: usize = 16;

/// Largest slice encrypted in one pass before it is forwarded
const SCRATCH_SIZE: usize = 8 * 1024;

// ============================================================================
// Type Aliases
// ============================================================================

/// AES-128-CTR with big-endian 128-bit counter
pub(crate) type Aes128Ctr = ctr::Ctr128BE<aes::Aes128>;

/// AES-256-CTR with big-endian 128-bit counter
pub(crate) type Aes256Ctr = ctr::Ctr128BE<aes::Aes256>;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Error, Debug)]
pub enum StreamError {
    #[error("Cipher setup failed: {0}")]
    Crypto(#[from] CryptoError),

    #[error("IO error while {operation}: {source}")]
    Io {
        #[source]
        source: io::Error,
        operation: &'static str,
    },

    /// The source ended before a full IV could be read.
    #[error("Stream too short: expected a {expected}-byte IV, got {actual} bytes")]
    TruncatedIv { expected: usize, actual: usize },
}

// ============================================================================
// Cipher
// ============================================================================

/// Keystream for whichever key size the item was created with.
enum CtrCipher {
    Aes128(Aes128Ctr),
    Aes256(Aes256Ctr),
}

impl CtrCipher {
    fn new(key: &SymmetricKey, iv: &[u8; IV_SIZE]) -> Result<Self, CryptoError> {
        let rejected = |e: aes::cipher::InvalidLength| CryptoError::CipherInit {
            reason: format!("{} key or IV rejected: {e}", key.size()),
        };
        match key.size() {
            KeySize::Aes128 => Aes128Ctr::new_from_slices(key.expose(), iv)
                .map(CtrCipher::Aes128)
                .map_err(rejected),
            KeySize::Aes256 => Aes256Ctr::new_from_slices(key.expose(), iv)
                .map(CtrCipher::Aes256)
                .map_err(rejected),
        }
    }

    fn apply(&mut self, buf: &mut [u8]) {
        match self {
            CtrCipher::Aes128(cipher) => cipher.apply_keystream(buf),
            CtrCipher::Aes256(cipher) => cipher.apply_keystream(buf),
        }
    }
}

// ============================================================================
// EncryptingWriter
// ============================================================================

/// Write adapter that encrypts everything passing through it.
///
/// Created with [`EncryptingWriter::begin`], which writes the session IV to the
/// destination before anything else.
///
/// If the destination rejects a write, the session is poisoned: every later
/// `write` and `flush` fails, since the keystream has already moved past the
/// bytes that were lost.
pub struct EncryptingWriter<W: Write> {
    inner: W,
    cipher: CtrCipher,
    /// Holds plaintext briefly before the keystream is applied
    scratch: Zeroizing<Vec<u8>>,
    plaintext_written: u64,
    /// Kind of the write failure that ended the session
    poisoned: Option<io::ErrorKind>,
}

impl<W: Write> std::fmt::Debug for EncryptingWriter<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptingWriter")
            .field("plaintext_written", &self.plaintext_written)
            .field("poisoned", &self.poisoned.is_some())
            .finish_non_exhaustive()
    }
}

impl<W: Write> EncryptingWriter<W> {
    /// Start an encryption session on `destination`.
    ///
    /// Generates a fresh random IV, initialises the cipher with `key`, and
    /// writes the IV in cleartext as the first bytes of `destination`.
    pub fn begin(mut destination: W, key: &SymmetricKey) -> Result<Self, StreamError> {
        let mut iv = [0u8; IV_SIZE];
        rand::rng().fill_bytes(&mut iv);

        let cipher = CtrCipher::new(key, &iv)?;

        destination
            .write_all(&iv)
            .map_err(|source| StreamError::Io {
                source,
                operation: "writing IV",
            })?;
        trace!("Encryption session started");

        Ok(Self {
            inner: destination,
            cipher,
            scratch: Zeroizing::new(Vec::with_capacity(SCRATCH_SIZE)),
            plaintext_written: 0,
            poisoned: None,
        })
    }

    /// Plaintext bytes accepted so far in this session.
    pub fn plaintext_written(&self) -> u64 {
        self.plaintext_written
    }

    /// `true` once a failed write has ended the session.
    pub fn is_poisoned(&self) -> bool {
        self.poisoned.is_some()
    }

    pub fn into_inner(self) -> W {
        self.inner
    }

    fn check_poisoned(&self) -> io::Result<()> {
        match self.poisoned {
            Some(kind) => Err(io::Error::new(
                kind,
                "encryption session aborted by an earlier write failure",
            )),
            None => Ok(()),
        }
    }
}

impl<W: Write> Write for EncryptingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.check_poisoned()?;

        let mut accepted = 0;
        for chunk in buf.chunks(SCRATCH_SIZE) {
            self.scratch.clear();
            self.scratch.extend_from_slice(chunk);
            self.cipher.apply(&mut self.scratch);
            if let Err(e) = self.inner.write_all(&self.scratch) {
                // Keystream is past bytes the destination never stored
                warn!(error = %e, "Write failed, encryption session poisoned");
                self.poisoned = Some(e.kind());
                if accepted == 0 {
                    return Err(e);
                }
                return Ok(accepted);
            }
            accepted += chunk.len();
            self.plaintext_written += chunk.len() as u64;
        }
        Ok(accepted)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.check_poisoned()?;
        self.inner.flush()
    }
}

// ============================================================================
// DecryptingReader
// ============================================================================

/// Read adapter that lazily decrypts a `[IV][ciphertext]` stream.
pub struct DecryptingReader<R: Read> {
    inner: R,
    cipher: CtrCipher,
}

impl<R: Read> std::fmt::Debug for DecryptingReader<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecryptingReader").finish_non_exhaustive()
    }
}

impl<R: Read> DecryptingReader<R> {
    /// Read the IV from the front of `source` and prepare to decrypt the rest.
    pub fn begin(mut source: R, key: &SymmetricKey) -> Result<Self, StreamError> {
        let mut iv = [0u8; IV_SIZE];
        let mut filled = 0;
        while filled < IV_SIZE {
            match source.read(&mut iv[filled..]) {
                Ok(0) => {
                    warn!(actual = filled, expected = IV_SIZE, "Stream ended inside the IV");
                    return Err(StreamError::TruncatedIv {
                        expected: IV_SIZE,
                        actual: filled,
                    });
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(source) => {
                    return Err(StreamError::Io {
                        source,
                        operation: "reading IV",
                    });
                }
            }
        }

        let cipher = CtrCipher::new(key, &iv)?;
        trace!("Decryption session started");
        Ok(Self {
            inner: source,
            cipher,
        })
    }

}

impl<R: Read> Read for DecryptingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.cipher.apply(&mut buf[..n]);
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn encrypt_all(plaintext: &[u8], key: &SymmetricKey) -> Vec<u8> {
        let mut writer = EncryptingWriter::begin(Vec::new(), key).unwrap();
        writer.write_all(plaintext).unwrap();
        writer.into_inner()
    }

    fn decrypt_all(ciphertext: &[u8], key: &SymmetricKey) -> Vec<u8> {
        let mut reader = DecryptingReader::begin(Cursor::new(ciphertext), key).unwrap();
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        out
    }

    #[test]
    fn test_roundtrip_both_key_sizes() {
        let plaintext = b"The quick brown fox jumps over the lazy dog";
        for size in [KeySize::Aes128, KeySize::Aes256] {
            let key = SymmetricKey::generate(size).unwrap();
            let persisted = encrypt_all(plaintext, &key);
            assert_eq!(persisted.len(), IV_SIZE + plaintext.len());
            assert_eq!(decrypt_all(&persisted, &key), plaintext);
        }
    }

    #[test]
    fn test_ciphertext_differs_from_plaintext() {
        let key = SymmetricKey::generate(KeySize::Aes256).unwrap();
        let plaintext = [0x41u8; 64];
        let persisted = encrypt_all(&plaintext, &key);
        assert_ne!(&persisted[IV_SIZE..], &plaintext[..]);
    }

    #[test]
    fn test_fresh_iv_per_session() {
        let key = SymmetricKey::generate(KeySize::Aes128).unwrap();
        let first = encrypt_all(b"same input", &key);
        let second = encrypt_all(b"same input", &key);
        assert_ne!(first[..IV_SIZE], second[..IV_SIZE]);
        assert_ne!(first[IV_SIZE..], second[IV_SIZE..]);
    }

    #[test]
    fn test_split_writes_match_single_write() {
        // Keystream position must carry across write calls
        let key = SymmetricKey::generate(KeySize::Aes256).unwrap();
        let plaintext: Vec<u8> = (0..3 * SCRATCH_SIZE + 17).map(|i| (i % 251) as u8).collect();

        let mut writer = EncryptingWriter::begin(Vec::new(), &key).unwrap();
        for piece in plaintext.chunks(999) {
            writer.write_all(piece).unwrap();
        }
        assert_eq!(writer.plaintext_written(), plaintext.len() as u64);
        let persisted = writer.into_inner();

        assert_eq!(decrypt_all(&persisted, &key), plaintext);
    }

    #[test]
    fn test_small_reads_decrypt_correctly() {
        let key = SymmetricKey::generate(KeySize::Aes128).unwrap();
        let plaintext: Vec<u8> = (0u8..=200).collect();
        let persisted = encrypt_all(&plaintext, &key);

        let mut reader = DecryptingReader::begin(Cursor::new(&persisted), &key).unwrap();
        let mut out = Vec::new();
        let mut buf = [0u8; 7];
        loop {
            let n = reader.read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        assert_eq!(out, plaintext);
    }

    #[test]
    fn test_empty_payload_is_just_the_iv() {
        let key = SymmetricKey::generate(KeySize::Aes128).unwrap();
        let persisted = encrypt_all(b"", &key);
        assert_eq!(persisted.len(), IV_SIZE);
        assert!(decrypt_all(&persisted, &key).is_empty());
    }

    #[test]
    fn test_truncated_iv() {
        let key = SymmetricKey::generate(KeySize::Aes128).unwrap();
        let result = DecryptingReader::begin(Cursor::new(vec![0u8; 5]), &key);
        assert!(matches!(
            result,
            Err(StreamError::TruncatedIv {
                expected: IV_SIZE,
                actual: 5
            })
        ));
    }

    /// Sink that starts refusing writes after `limit` bytes until re-enabled.
    struct FlakySink {
        data: Vec<u8>,
        limit: usize,
    }

    impl Write for FlakySink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.data.len() + buf.len() > self.limit {
                return Err(io::Error::new(io::ErrorKind::StorageFull, "sink full"));
            }
            self.data.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_failed_write_poisons_session() {
        let key = SymmetricKey::generate(KeySize::Aes128).unwrap();
        let sink = FlakySink {
            data: Vec::new(),
            limit: IV_SIZE + 2,
        };
        let mut writer = EncryptingWriter::begin(sink, &key).unwrap();
        writer.write_all(b"ab").unwrap();

        let err = writer.write_all(b"cdefgh").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::StorageFull);
        assert!(writer.is_poisoned());

        // Room again, but the keystream no longer lines up with the stored bytes
        writer.inner.limit = usize::MAX;
        assert!(writer.write_all(b"cdefgh").is_err());
        assert!(writer.flush().is_err());
        assert_eq!(writer.plaintext_written(), 2);

        let persisted = writer.into_inner().data;
        assert_eq!(decrypt_all(&persisted, &key), b"ab");
    }

    #[test]
    fn test_failure_after_forwarded_chunk_reports_progress() {
        let key = SymmetricKey::generate(KeySize::Aes256).unwrap();
        let sink = FlakySink {
            data: Vec::new(),
            limit: IV_SIZE + SCRATCH_SIZE,
        };
        let mut writer = EncryptingWriter::begin(sink, &key).unwrap();
        let plaintext = vec![0x42u8; SCRATCH_SIZE + 10];

        assert_eq!(writer.write(&plaintext).unwrap(), SCRATCH_SIZE);
        assert!(writer.write(&plaintext[SCRATCH_SIZE..]).is_err());

        let persisted = writer.into_inner().data;
        assert_eq!(decrypt_all(&persisted, &key), &plaintext[..SCRATCH_SIZE]);
    }

    #[test]
    fn test_wrong_key_yields_garbage() {
        let key = SymmetricKey::generate(KeySize::Aes256).unwrap();
        let other = SymmetricKey::generate(KeySize::Aes256).unwrap();
        let plaintext = b"only the right key reads this";
        let persisted = encrypt_all(plaintext, &key);
        assert_ne!(decrypt_all(&persisted, &other), plaintext);
    }
}
