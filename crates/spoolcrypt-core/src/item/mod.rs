//! Encrypted upload items.
//!
//! An [`EncryptedItem`] holds one uploaded field. Everything written through
//! [`EncryptedItem::output_stream`] is encrypted under a key that exists only
//! for the lifetime of the item, then spooled in memory or to a temp file.
//! Reads go back through the cipher, so callers only ever see plaintext.
//!
//! # Lifecycle
//!
//! ```text
//! new() ──► output_stream() ──► write … ──► input_stream() / get() / write_to()
//!                 ▲                                   │
//!                 └──── output_stream() (overwrite) ◄─┘
//!
//! delete() removes the backing file; dropping the item removes the file and
//! zeroizes the key.
//! ```

mod charset;
mod headers;

pub use charset::{Charset, DEFAULT_CHARSET, content_type_charset, decode_with_label};
pub use headers::ItemHeaders;

use std::fmt;
use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::Path;

use tracing::{debug, instrument, trace};

use crate::config::ItemConfig;
use crate::crypto::{DecryptingReader, EncryptingWriter, IV_SIZE, SymmetricKey};
use crate::error::{ItemContext, ItemError, escape_nul};
use crate::spool::{ByteSource, SpooledStore};

// ============================================================================
// EncryptedItem
// ============================================================================

/// One uploaded field whose contents are only ever stored encrypted.
pub struct EncryptedItem {
    field_name: String,
    content_type: Option<String>,
    is_form_field: bool,
    file_name: Option<String>,
    headers: ItemHeaders,
    /// Resolved at construction: configured, then content type, then Latin-1
    default_charset: String,
    key: SymmetricKey,
    store: SpooledStore,
}

impl EncryptedItem {
    /// Create an empty item.
    ///
    /// Generates the item's key and prepares a spool whose threshold is
    /// `config.size_threshold` plaintext bytes. Nothing touches the disk until
    /// that threshold is crossed.
    ///
    /// # Errors
    ///
    /// [`ItemError::KeyUnavailable`] if no key could be generated. No item
    /// exists in that case.
    #[instrument(
        level = "debug",
        skip(content_type, file_name, config),
        fields(threshold = config.size_threshold, key_size = %config.key_size)
    )]
    pub fn new(
        field_name: &str,
        content_type: Option<&str>,
        is_form_field: bool,
        file_name: Option<&str>,
        config: &ItemConfig,
    ) -> Result<Self, ItemError> {
        let key = SymmetricKey::generate(config.key_size)?;

        let default_charset = config
            .default_charset
            .clone()
            .or_else(|| content_type_charset(content_type))
            .unwrap_or_else(|| DEFAULT_CHARSET.to_string());

        let threshold = (config.size_threshold as u64).saturating_add(IV_SIZE as u64);
        let store = SpooledStore::open(threshold, config.repository.clone());

        debug!(charset = %default_charset, "Item created");
        Ok(Self {
            field_name: field_name.to_string(),
            content_type: content_type.map(str::to_string),
            is_form_field,
            file_name: file_name.map(str::to_string),
            headers: ItemHeaders::new(),
            default_charset,
            key,
            store,
        })
    }

    // ------------------------------------------------------------------------
    // Streams
    // ------------------------------------------------------------------------

    /// Open a write session.
    ///
    /// Every session starts with a fresh IV. Opening a second session replaces
    /// whatever the item held before.
    ///
    /// # Errors
    ///
    /// [`ItemError::CipherInit`] if the cipher rejects the key, or
    /// [`ItemError::StorageIo`] if the IV cannot be stored.
    #[instrument(level = "debug", skip(self), fields(field = %self.field_name))]
    pub fn output_stream(&mut self) -> Result<ItemWriter<'_>, ItemError> {
        let context = self.context("output_stream");
        if self.store.size_bytes() > 0 {
            debug!("Previous contents replaced by new write session");
        }
        self.store.reset();

        let inner = EncryptingWriter::begin(&mut self.store, &self.key)
            .map_err(|e| ItemError::from_stream(e, context.clone()))?;
        Ok(ItemWriter { inner, context })
    }

    /// Open a reader over the plaintext, starting from the beginning.
    ///
    /// An item that was never written yields an empty stream.
    ///
    /// # Errors
    ///
    /// [`ItemError::StorageIo`] if the backing file is gone or unreadable, and
    /// [`ItemError::ShortRead`] if it is too short to hold an IV.
    #[instrument(level = "debug", skip(self), fields(field = %self.field_name))]
    pub fn input_stream(&self) -> Result<ItemReader<'_>, ItemError> {
        if self.is_empty_session() {
            trace!("Item never written, empty stream");
            return Ok(ItemReader { inner: None });
        }

        let context = self.context("input_stream");
        let source = self
            .store
            .read_back()
            .map_err(|e| ItemError::from_spool(e, context.clone()))?;
        let reader = DecryptingReader::begin(source, &self.key)
            .map_err(|e| ItemError::from_stream(e, context))?;
        Ok(ItemReader {
            inner: Some(reader),
        })
    }

    /// Entire plaintext as a byte vector.
    ///
    /// # Errors
    ///
    /// Anything [`input_stream`](Self::input_stream) reports, plus
    /// [`ItemError::ShortRead`] if fewer than [`size`](Self::size) bytes could
    /// be recovered.
    #[instrument(level = "debug", skip(self), fields(field = %self.field_name))]
    pub fn get(&self) -> Result<Vec<u8>, ItemError> {
        let expected = self.size();
        let reader = self.input_stream()?;

        let mut data = Vec::with_capacity(usize::try_from(expected).unwrap_or(0));
        reader
            .take(expected)
            .read_to_end(&mut data)
            .map_err(|e| ItemError::storage(e, self.context("get")))?;

        let actual = data.len() as u64;
        if actual < expected {
            return Err(ItemError::ShortRead {
                expected,
                actual,
                context: self.context("get"),
            });
        }
        Ok(data)
    }

    /// Plaintext decoded with the item's default charset.
    pub fn string(&self) -> Result<String, ItemError> {
        self.string_with_charset(&self.default_charset)
    }

    /// Plaintext decoded with `charset`.
    ///
    /// Unsupported charset labels fall back to lossy UTF-8.
    pub fn string_with_charset(&self, charset: &str) -> Result<String, ItemError> {
        let bytes = self.get()?;
        Ok(decode_with_label(&bytes, charset))
    }

    /// Plaintext size in bytes. Zero for an item that was never written.
    pub fn size(&self) -> u64 {
        self.store.size_bytes().saturating_sub(IV_SIZE as u64)
    }

    /// Write the plaintext to `destination`, replacing any existing file.
    ///
    /// The backing store is left untouched, so this can be called repeatedly.
    /// Returns the number of bytes written.
    ///
    /// # Errors
    ///
    /// [`ItemError::WriteOut`] naming `destination`, wrapping the underlying
    /// cause.
    #[instrument(
        level = "debug",
        skip(self, destination),
        fields(field = %self.field_name, destination = %destination.as_ref().display())
    )]
    pub fn write_to(&self, destination: impl AsRef<Path>) -> Result<u64, ItemError> {
        let destination = destination.as_ref();
        let write_out = |source: ItemError| ItemError::WriteOut {
            destination: destination.to_path_buf(),
            source: Box::new(source),
        };

        let mut reader = self.input_stream().map_err(write_out)?;
        let file = File::create(destination)
            .map_err(|e| write_out(ItemError::storage(e, self.context("write_to"))))?;
        let mut out = BufWriter::new(file);

        let copied = io::copy(&mut reader, &mut out)
            .and_then(|n| out.flush().map(|()| n))
            .map_err(|e| write_out(ItemError::storage(e, self.context("write_to"))))?;

        let expected = self.size();
        if copied < expected {
            return Err(write_out(ItemError::ShortRead {
                expected,
                actual: copied,
                context: self.context("write_to"),
            }));
        }

        debug!(bytes = copied, "Item written out");
        Ok(copied)
    }

    /// Remove the backing file, if the item has one.
    ///
    /// Safe to call any number of times. The key is kept until the item is
    /// dropped.
    #[instrument(level = "debug", skip(self), fields(field = %self.field_name))]
    pub fn delete(&mut self) {
        self.store.discard();
    }

    /// `true` while the contents are held in memory.
    pub fn is_in_memory(&self) -> bool {
        self.store.is_in_memory()
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    pub fn field_name(&self) -> &str {
        &self.field_name
    }

    pub fn set_field_name(&mut self, name: impl Into<String>) {
        self.field_name = name.into();
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn is_form_field(&self) -> bool {
        self.is_form_field
    }

    pub fn set_form_field(&mut self, state: bool) {
        self.is_form_field = state;
    }

    /// Original file name from the client, if one was sent.
    ///
    /// # Errors
    ///
    /// [`ItemError::InvalidFileName`] if the name contains a NUL byte.
    pub fn file_name(&self) -> Result<Option<&str>, ItemError> {
        match self.file_name.as_deref() {
            Some(name) if name.contains('\0') => Err(ItemError::InvalidFileName {
                name: escape_nul(name),
            }),
            other => Ok(other),
        }
    }

    pub fn headers(&self) -> &ItemHeaders {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut ItemHeaders {
        &mut self.headers
    }

    pub fn set_headers(&mut self, headers: ItemHeaders) {
        self.headers = headers;
    }

    /// The `charset` parameter of the content type, if present.
    pub fn charset(&self) -> Option<String> {
        content_type_charset(self.content_type.as_deref())
    }

    /// Charset [`string`](Self::string) decodes with.
    pub fn default_charset(&self) -> &str {
        &self.default_charset
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    fn is_empty_session(&self) -> bool {
        self.store.is_in_memory() && self.store.size_bytes() == 0
    }

    fn context(&self, operation: &'static str) -> ItemContext {
        let mut context = ItemContext::new()
            .with_operation(operation)
            .with_field_name(self.field_name.clone());
        if let Some(ref name) = self.file_name {
            context = context.with_file_name(name.clone());
        }
        context
    }
}

impl fmt::Display for EncryptedItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "name={}, in_memory={}, size={} bytes, form_field={}, field_name={}",
            self.file_name
                .as_deref()
                .map_or_else(|| "(none)".to_string(), escape_nul),
            self.is_in_memory(),
            self.size(),
            self.is_form_field,
            self.field_name,
        )
    }
}

impl fmt::Debug for EncryptedItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptedItem")
            .field("field_name", &self.field_name)
            .field("content_type", &self.content_type)
            .field("is_form_field", &self.is_form_field)
            .field("file_name", &self.file_name)
            .field("default_charset", &self.default_charset)
            .field("key", &self.key)
            .field("in_memory", &self.is_in_memory())
            .field("size", &self.size())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Stream handles
// ============================================================================

/// Write half of an item session. Plaintext in, ciphertext to the spool.
///
/// Holding one borrows the item mutably, so there is never more than one
/// writer. Dropping it without [`close`](Self::close) leaves the item with
/// whatever was written so far.
#[derive(Debug)]
pub struct ItemWriter<'a> {
    inner: EncryptingWriter<&'a mut SpooledStore>,
    context: ItemContext,
}

impl ItemWriter<'_> {
    /// Plaintext bytes written in this session.
    pub fn bytes_written(&self) -> u64 {
        self.inner.plaintext_written()
    }

    /// Flush and end the session, returning the plaintext byte count.
    pub fn close(mut self) -> Result<u64, ItemError> {
        self.inner
            .flush()
            .map_err(|e| ItemError::storage(e, self.context.clone()))?;
        let written = self.inner.plaintext_written();
        trace!(bytes = written, "Write session closed");
        Ok(written)
    }
}

impl Write for ItemWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Read half of an item. Yields plaintext.
#[derive(Debug)]
pub struct ItemReader<'a> {
    /// `None` for an item that was never written
    inner: Option<DecryptingReader<ByteSource<'a>>>,
}

impl Read for ItemReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.inner.as_mut() {
            Some(reader) => reader.read(buf),
            None => Ok(0),
        }
    }
}
