//! Write options and entry metadata for archive creation.

use std::time::SystemTime;

use crate::codec::{Method, MethodConfiguration};
use crate::crypto::Password;
use crate::timestamp::Timestamp;

/// Archive-wide writer configuration.
///
/// # Example
///
/// ```rust
/// use archkit::codec::{Method, MethodConfiguration, MethodOptions};
/// use archkit::write::WriteOptions;
///
/// let options = WriteOptions::new()
///     .methods(vec![
///         MethodConfiguration::with_options(Method::Delta, MethodOptions::Delta(4)),
///         MethodConfiguration::new(Method::Lzma2),
///     ])
///     .solid(true);
/// assert_eq!(options.methods.len(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct WriteOptions {
    /// Content method chain in encoding order.
    pub methods: Vec<MethodConfiguration>,
    /// Password; when set, AES-256 is appended to every content chain.
    pub password: Option<Password>,
    /// Put consecutive entries sharing a method chain into one folder.
    pub solid: bool,
    /// Pack the end header with LZMA2.
    pub compress_header: bool,
    /// Encrypt the packed end header too; needs a password and
    /// `compress_header`.
    pub encrypt_header: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            methods: vec![MethodConfiguration::new(Method::Lzma2)],
            password: None,
            solid: false,
            compress_header: true,
            encrypt_header: false,
        }
    }
}

impl WriteOptions {
    /// Default options: LZMA2, non-solid, compressed header.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the content method chain.
    pub fn methods(mut self, methods: Vec<MethodConfiguration>) -> Self {
        self.methods = methods;
        self
    }

    /// Sets a single content method.
    pub fn method(self, method: impl Into<MethodConfiguration>) -> Self {
        self.methods(vec![method.into()])
    }

    /// Encrypts content with `password`.
    pub fn password(mut self, password: impl Into<Password>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Enables solid folders.
    pub fn solid(mut self, solid: bool) -> Self {
        self.solid = solid;
        self
    }

    /// Enables or disables header compression.
    pub fn compress_header(mut self, compress: bool) -> Self {
        self.compress_header = compress;
        self
    }

    /// Enables or disables header encryption.
    pub fn encrypt_header(mut self, encrypt: bool) -> Self {
        self.encrypt_header = encrypt;
        self
    }
}

/// Metadata of an entry passed to [`Writer::put_entry`](super::Writer::put_entry).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryMeta {
    /// Path inside the archive.
    pub name: String,
    /// Whether this is a directory.
    pub is_directory: bool,
    /// Whether this is an anti-item (marks a path for deletion).
    pub is_anti: bool,
    /// Modification time.
    pub modification_time: Option<Timestamp>,
    /// Creation time.
    pub creation_time: Option<Timestamp>,
    /// Access time.
    pub access_time: Option<Timestamp>,
    /// Windows file attributes.
    pub attributes: Option<u32>,
    /// Method chain overriding [`WriteOptions::methods`] for this entry.
    pub content_methods: Option<Vec<MethodConfiguration>>,
}

impl EntryMeta {
    /// Creates metadata for a file.
    pub fn file(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Creates metadata for a directory.
    pub fn directory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_directory: true,
            ..Default::default()
        }
    }

    /// Creates metadata for an anti-item.
    pub fn anti_item(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_anti: true,
            ..Default::default()
        }
    }

    /// Sets the modification time; times before 1601 are dropped.
    pub fn modified(mut self, time: SystemTime) -> Self {
        self.modification_time = Timestamp::from_system_time(time);
        self
    }

    /// Sets the Windows attributes.
    pub fn attributes(mut self, attributes: u32) -> Self {
        self.attributes = Some(attributes);
        self
    }

    /// Overrides the content method chain.
    pub fn content_methods(mut self, methods: Vec<MethodConfiguration>) -> Self {
        self.content_methods = Some(methods);
        self
    }
}

/// Statistics of a finished archive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteResult {
    /// Number of entries written.
    pub entries_written: usize,
    /// Number of folders written.
    pub folders_written: usize,
    /// Total uncompressed bytes.
    pub total_size: u64,
    /// Total packed bytes, excluding headers.
    pub packed_size: u64,
}

impl WriteResult {
    /// Returns the compression ratio (packed / uncompressed).
    pub fn compression_ratio(&self) -> f64 {
        if self.total_size == 0 {
            1.0
        } else {
            self.packed_size as f64 / self.total_size as f64
        }
    }
}
