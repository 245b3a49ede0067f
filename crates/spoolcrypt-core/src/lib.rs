//! Spooled upload buffers that only ever persist ciphertext.
//!
//! ```
//! use std::io::Write;
//! use spoolcrypt_core::EncryptedItemFactory;
//!
//! let factory = EncryptedItemFactory::new();
//! let mut item = factory
//!     .create_item("upload", Some("text/plain; charset=UTF-8"), false, Some("notes.txt"))
//!     .unwrap();
//!
//! let mut out = item.output_stream().unwrap();
//! out.write_all(b"hello").unwrap();
//! out.close().unwrap();
//!
//! assert_eq!(item.size(), 5);
//! assert_eq!(item.string().unwrap(), "hello");
//! ```

pub mod config;
pub mod crypto;
pub mod error;
pub mod factory;
pub mod item;
pub mod spool;

// Re-export commonly used types at crate root
pub use config::{ConfigError, FactoryConfig, ItemConfig};
pub use crypto::KeySize;
pub use error::{ItemContext, ItemError};
pub use factory::EncryptedItemFactory;
pub use item::{EncryptedItem, ItemHeaders, ItemReader, ItemWriter};
