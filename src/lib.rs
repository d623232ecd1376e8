//! # archkit
//!
//! A 7z archive engine with two encoder-side companions: a native BZIP2
//! compressor built around a Burrows-Wheeler block sort, and an LZ4 block
//! writer that turns generic LZ77 output into valid LZ4 sequences.
//!
//! ## Reading an Archive
//!
//! ```rust,no_run
//! use std::io::Read;
//! use archkit::{Archive, ReadOptions, Result};
//!
//! fn main() -> Result<()> {
//!     let mut archive = Archive::open_path("archive.7z", ReadOptions::default())?;
//!
//!     for entry in archive.entries() {
//!         println!("{}: {} bytes", entry.name(), entry.size);
//!     }
//!
//!     // Entries can be read in any order.
//!     let mut content = Vec::new();
//!     archive.entry_reader(0)?.read_to_end(&mut content)?;
//!     Ok(())
//! }
//! ```
//!
//! ## Creating an Archive
//!
//! ```rust,no_run
//! use archkit::codec::{Method, MethodConfiguration, MethodOptions};
//! use archkit::{Writer, WriteOptions, Result};
//!
//! fn main() -> Result<()> {
//!     let options = WriteOptions::new()
//!         .methods(vec![
//!             MethodConfiguration::with_options(Method::Delta, MethodOptions::Delta(2)),
//!             MethodConfiguration::new(Method::Lzma2),
//!         ])
//!         .solid(true);
//!
//!     let mut writer = Writer::create_path("new.7z")?.options(options);
//!     writer.add_bytes("samples.raw", &[0u8; 1024])?;
//!     writer.add_directory("empty")?;
//!     writer.finish()?;
//!     Ok(())
//! }
//! ```
//!
//! ## Password-Protected Archives
//!
//! ```rust,no_run
//! # #[cfg(feature = "aes")]
//! # fn main() -> archkit::Result<()> {
//! use archkit::{Archive, Error, ReadOptions};
//!
//! match Archive::open_path("encrypted.7z", ReadOptions::default()) {
//!     Err(Error::PasswordRequired { .. }) => {
//!         let archive =
//!             Archive::open_path("encrypted.7z", ReadOptions::new().password("secret"))?;
//!         println!("{} entries", archive.len());
//!     }
//!     other => {
//!         other?;
//!     }
//! }
//! # Ok(())
//! # }
//! # #[cfg(not(feature = "aes"))]
//! # fn main() {}
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `lzma` | Yes | LZMA compression and BCJ filters |
//! | `lzma2` | Yes | LZMA2 compression (includes `lzma`) |
//! | `deflate` | Yes | Deflate compression |
//! | `deflate64` | Yes | Deflate64 decoding |
//! | `bzip2` | Yes | BZip2 method (decoding via `bzip2`, encoding is native) |
//! | `aes` | Yes | AES-256 encryption for data and headers |
//! | `lz4` | Yes | LZ4 block decoding |
//!
//! A method whose feature is disabled is reported as
//! [`Error::UnsupportedMethod`].
//!
//! ## Error Handling
//!
//! All operations return [`Result<T>`], which is an alias for
//! `std::result::Result<T, Error>`. Damaged data is reported as
//! [`Error::CrcMismatch`], [`Error::CorruptHeader`] or
//! [`Error::Truncated`]; see [`Error::is_corruption`].
//!
//! ## Minimum Supported Rust Version (MSRV)
//!
//! This crate requires **Rust 1.85** or later.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_op_in_unsafe_fn)]

/// Default buffer size for read operations (8 KiB).
pub(crate) const READ_BUFFER_SIZE: usize = 8192;

pub mod bzip2;
pub mod checksum;
pub mod codec;
pub mod crypto;
pub mod error;
pub mod format;
pub mod lz4;
pub mod lz77;
pub mod read;
pub mod timestamp;
pub mod write;

pub use crypto::Password;
pub use error::{Error, Result};
pub use timestamp::Timestamp;

// Re-export reading API at crate root for convenience
pub use read::{Archive, Entry, EntryReader, ReadOptions};

// Re-export writing API at crate root for convenience
pub use write::{EntryMeta, WriteOptions, WriteResult, Writer};

pub use format::matches;
pub use format::streams::ResourceLimits;
