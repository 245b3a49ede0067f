//! Threshold-spooled byte store.
//!
//! [`SpooledStore`] is an append-only sink that buffers in memory until the
//! configured threshold would be exceeded, then moves everything into a fresh
//! temporary file and keeps writing there. The move happens at most once per
//! session and is invisible to the writer.
//!
//! The store never interprets what it holds; items feed it ciphertext.

use std::fs::File;
use std::io::{self, Cursor, Read, Write};
use std::mem;
use std::path::{Path, PathBuf};

use tempfile::TempPath;
use thiserror::Error;
use tracing::{debug, instrument, trace, warn};

/// Prefix for spool files created in the repository directory
const SPOOL_FILE_PREFIX: &str = "upload_";

/// Suffix for spool files created in the repository directory
const SPOOL_FILE_SUFFIX: &str = ".tmp";

// ============================================================================
// Error Types
// ============================================================================

/// Context for spool operations, used in error messages and logs.
#[derive(Debug, Clone, Default)]
pub struct SpoolContext {
    /// Operation being performed
    pub operation: Option<&'static str>,
    /// Backing file, if the store had spilled
    pub path: Option<PathBuf>,
}

impl SpoolContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_operation(mut self, operation: &'static str) -> Self {
        self.operation = Some(operation);
        self
    }

    #[must_use]
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }
}

impl std::fmt::Display for SpoolContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut parts = Vec::new();

        if let Some(op) = self.operation {
            parts.push(op.to_string());
        }
        if let Some(ref path) = self.path {
            parts.push(format!("at {:?}", path.display()));
        }

        if parts.is_empty() {
            write!(f, "(no context)")
        } else {
            write!(f, "{}", parts.join(", "))
        }
    }
}

#[derive(Error, Debug)]
pub enum SpoolError {
    #[error("IO error during {context}: {source}")]
    Io {
        #[source]
        source: io::Error,
        context: SpoolContext,
    },

    /// The backing file was discarded; its contents are gone.
    #[error("Spooled data has been discarded")]
    Discarded,
}

impl SpoolError {
    #[must_use]
    pub fn io_with_context(source: io::Error, context: SpoolContext) -> Self {
        SpoolError::Io { source, context }
    }
}

/// Flattens into a plain IO error, dropping the path context.
impl From<SpoolError> for io::Error {
    fn from(err: SpoolError) -> Self {
        match err {
            SpoolError::Io { source, .. } => source,
            SpoolError::Discarded => io::Error::new(io::ErrorKind::NotFound, SpoolError::Discarded),
        }
    }
}

// ============================================================================
// State
// ============================================================================

enum SpoolState {
    InMemory(Vec<u8>),
    OnDisk {
        file: File,
        /// Removes the file when dropped
        path: TempPath,
    },
    Discarded,
}

/// Readable view over whatever the store currently holds.
///
/// Obtained from [`SpooledStore::read_back`]; always starts at offset 0.
#[derive(Debug)]
pub enum ByteSource<'a> {
    Memory(Cursor<&'a [u8]>),
    File(File),
}

impl Read for ByteSource<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            ByteSource::Memory(cursor) => cursor.read(buf),
            ByteSource::File(file) => file.read(buf),
        }
    }
}

// ============================================================================
// SpooledStore
// ============================================================================

/// Append-only byte sink that spills from memory to a temp file.
///
/// # Example
///
/// ```
/// use std::io::{Read, Write};
/// use spoolcrypt_core::spool::SpooledStore;
///
/// let mut store = SpooledStore::open(4, None);
/// store.write_all(b"abcd").unwrap();
/// assert!(store.is_in_memory());
///
/// store.write_all(b"e").unwrap();
/// assert!(!store.is_in_memory());
///
/// let mut back = Vec::new();
/// store.read_back().unwrap().read_to_end(&mut back).unwrap();
/// assert_eq!(back, b"abcde");
/// ```
pub struct SpooledStore {
    threshold: u64,
    directory: Option<PathBuf>,
    state: SpoolState,
    written: u64,
}

impl std::fmt::Debug for SpooledStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match self.state {
            SpoolState::InMemory(_) => "in-memory",
            SpoolState::OnDisk { .. } => "on-disk",
            SpoolState::Discarded => "discarded",
        };
        f.debug_struct("SpooledStore")
            .field("threshold", &self.threshold)
            .field("directory", &self.directory)
            .field("state", &state)
            .field("written", &self.written)
            .finish()
    }
}

impl SpooledStore {
    /// Open an empty store.
    ///
    /// Bytes stay in memory while the total written is at most
    /// `threshold_bytes`. The first write that would go past it moves the data
    /// into a new file in `temp_directory`, or the platform temp directory when
    /// `None`.
    pub fn open(threshold_bytes: u64, temp_directory: Option<PathBuf>) -> Self {
        Self {
            threshold: threshold_bytes,
            directory: temp_directory,
            state: SpoolState::InMemory(Vec::new()),
            written: 0,
        }
    }

    /// `true` until the threshold has been crossed.
    ///
    /// A discarded store reports `false`: it never returns to memory.
    pub fn is_in_memory(&self) -> bool {
        matches!(self.state, SpoolState::InMemory(_))
    }

    /// Total bytes currently stored.
    pub fn size_bytes(&self) -> u64 {
        self.written
    }

    /// Path of the backing file, if the store has spilled.
    ///
    /// This is the file [`discard`](Self::discard) removes.
    pub fn file_path(&self) -> Option<&Path> {
        match &self.state {
            SpoolState::OnDisk { path, .. } => Some(&**path),
            SpoolState::InMemory(_) | SpoolState::Discarded => None,
        }
    }

    /// Open a reader over everything written so far.
    ///
    /// Each call starts from the beginning and leaves the store untouched.
    ///
    /// # Errors
    ///
    /// [`SpoolError::Discarded`] once the backing file has been discarded, or
    /// an IO error if the file cannot be reopened.
    pub fn read_back(&self) -> Result<ByteSource<'_>, SpoolError> {
        match &self.state {
            SpoolState::InMemory(bytes) => Ok(ByteSource::Memory(Cursor::new(bytes.as_slice()))),
            SpoolState::OnDisk { path, .. } => File::open(path).map(ByteSource::File).map_err(|e| {
                SpoolError::io_with_context(
                    e,
                    SpoolContext::new()
                        .with_operation("read_back")
                        .with_path(path.to_path_buf()),
                )
            }),
            SpoolState::Discarded => Err(SpoolError::Discarded),
        }
    }

    /// Delete the backing file, if there is one.
    ///
    /// In-memory data is left alone. Calling this again is a no-op.
    #[instrument(level = "debug", skip(self), fields(written = self.written))]
    pub fn discard(&mut self) {
        match mem::replace(&mut self.state, SpoolState::Discarded) {
            SpoolState::InMemory(bytes) => {
                self.state = SpoolState::InMemory(bytes);
            }
            SpoolState::OnDisk { file, path } => {
                drop(file);
                let shown = path.display().to_string();
                if let Err(e) = path.close() {
                    warn!(path = %shown, error = %e, "Failed to remove spool file");
                } else {
                    debug!(path = %shown, "Spool file removed");
                }
                self.written = 0;
            }
            SpoolState::Discarded => {}
        }
    }

    /// Drop all stored bytes and start over in memory.
    pub fn reset(&mut self) {
        self.discard();
        self.state = SpoolState::InMemory(Vec::new());
        self.written = 0;
        trace!("Spooled store reset");
    }

    fn spill(&mut self) -> io::Result<()> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(SPOOL_FILE_PREFIX).suffix(SPOOL_FILE_SUFFIX);

        let created = match &self.directory {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        };
        // Callers only learn that storage failed, never where
        let named = created.map_err(|e| {
            let dir = self
                .directory
                .clone()
                .unwrap_or_else(std::env::temp_dir);
            warn!(directory = %dir.display(), error = %e, "Could not create spool file");
            io::Error::new(e.kind(), "could not create spool file")
        })?;
        let (mut file, path) = named.into_parts();

        if let SpoolState::InMemory(bytes) = &self.state {
            // On failure `path` is dropped here, which removes the half-written file
            file.write_all(bytes)?;
        }

        debug!(
            path = %path.display(),
            buffered = self.written,
            threshold = self.threshold,
            "Threshold exceeded, spilled to disk"
        );
        self.state = SpoolState::OnDisk { file, path };
        Ok(())
    }
}

impl Write for SpooledStore {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        if self.is_in_memory() && self.written + buf.len() as u64 > self.threshold {
            self.spill()?;
        }

        match &mut self.state {
            SpoolState::InMemory(bytes) => bytes.extend_from_slice(buf),
            SpoolState::OnDisk { file, .. } => file.write_all(buf)?,
            SpoolState::Discarded => return Err(SpoolError::Discarded.into()),
        }
        self.written += buf.len() as u64;
        trace!(len = buf.len(), total = self.written, "Spooled write");
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.state {
            SpoolState::OnDisk { file, .. } => file.flush(),
            SpoolState::InMemory(_) | SpoolState::Discarded => Ok(()),
        }
    }
}

impl Drop for SpooledStore {
    fn drop(&mut self) {
        // TempPath removes the file itself
        if let SpoolState::OnDisk { path, .. } = &self.state {
            trace!(path = %path.display(), "SpooledStore dropped, removing spool file");
        }
    }
}
