//! Error types for archive and codec operations.
//!
//! All fallible operations in this crate return [`Result`], whose error type
//! is the [`Error`] enum below. Errors that have to cross a [`std::io::Read`]
//! or [`std::io::Write`] boundary (for example a CRC failure detected inside a
//! decoder pipeline) are boxed into an [`io::Error`] and recovered on the other
//! side with [`Error::from_io`], so callers always see the precise variant.
//!
//! ```rust
//! use archkit::Error;
//!
//! fn describe(error: &Error) -> &'static str {
//!     match error {
//!         Error::PasswordRequired { .. } => "ask the user for a password",
//!         Error::CrcMismatch { .. } => "archive is damaged",
//!         Error::MemoryLimitExceeded { .. } => "raise the memory limit",
//!         _ => "cannot read archive",
//!     }
//! }
//! ```

use std::io;

/// Helper struct for formatting CrcMismatch error messages.
struct CrcMismatchDisplay<'a> {
    entry_index: Option<usize>,
    entry_name: Option<&'a str>,
    expected: u32,
    actual: u32,
}

impl std::fmt::Display for CrcMismatchDisplay<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.entry_index {
            Some(idx) => write!(f, "CRC mismatch for entry {}", idx)?,
            None => write!(f, "CRC mismatch in archive header")?,
        }
        if let Some(name) = self.entry_name {
            write!(f, " ({})", name)?;
        }
        write!(f, ": expected {:#x}, got {:#x}", self.expected, self.actual)
    }
}

/// Helper struct for formatting PasswordRequired error messages.
struct PasswordRequiredDisplay<'a> {
    archive: Option<&'a str>,
}

impl std::fmt::Display for PasswordRequiredDisplay<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Cannot read encrypted content from {} without a password.",
            self.archive.unwrap_or("the archive")
        )
    }
}

/// The main error type for archive and codec operations.
///
/// | Category | Variants | Typical Cause |
/// |----------|----------|---------------|
/// | I/O | [`Io`][Self::Io], [`Truncated`][Self::Truncated] | Storage failures, short input |
/// | Format | [`InvalidFormat`][Self::InvalidFormat], [`CorruptHeader`][Self::CorruptHeader], [`MalformedFolder`][Self::MalformedFolder] | Invalid archive data |
/// | Integrity | [`CrcMismatch`][Self::CrcMismatch] | Data corruption |
/// | Encryption | [`PasswordRequired`][Self::PasswordRequired], [`WrongPassword`][Self::WrongPassword] | Missing or bad credentials |
/// | Compatibility | [`UnsupportedMethod`][Self::UnsupportedMethod], [`UnsupportedFeature`][Self::UnsupportedFeature] | Missing codecs |
/// | Resources | [`MemoryLimitExceeded`][Self::MemoryLimitExceeded], [`ResourceLimitExceeded`][Self::ResourceLimitExceeded] | Safety limits |
/// | Usage | [`InvalidState`][Self::InvalidState], [`InvalidParameter`][Self::InvalidParameter], [`EntryNotFound`][Self::EntryNotFound] | API misuse |
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// An I/O error occurred while reading or writing the underlying storage.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The data does not carry the expected container signature or layout.
    ///
    /// Signature checks surface this immediately from open calls and are
    /// never retried.
    #[error("Invalid 7z format: {0}")]
    InvalidFormat(String),

    /// Fewer bytes were available than a length-prefixed field declared.
    #[error("Truncated data: needed {needed} more bytes while reading {context}")]
    Truncated {
        /// How many bytes were missing (best effort, may be 0 if unknown).
        needed: u64,
        /// What was being read.
        context: &'static str,
    },

    /// The archive header is structurally invalid.
    #[error("Corrupt header at offset {offset:#x}: {reason}")]
    CorruptHeader {
        /// The byte offset where corruption was detected.
        offset: u64,
        /// A description of the corruption.
        reason: String,
    },

    /// A declared checksum does not match the computed one.
    ///
    /// `entry_index` is `None` when the header or a folder failed.
    #[error("{}", CrcMismatchDisplay { entry_index: *entry_index, entry_name: entry_name.as_deref(), expected: *expected, actual: *actual })]
    CrcMismatch {
        /// The entry index with the CRC mismatch, if the failure is entry data.
        entry_index: Option<usize>,
        /// The entry name (if known).
        entry_name: Option<String>,
        /// The expected CRC value from the archive.
        expected: u32,
        /// The CRC value actually computed.
        actual: u32,
    },

    /// Encrypted content was requested without a password.
    #[error("{}", PasswordRequiredDisplay { archive: archive.as_deref() })]
    PasswordRequired {
        /// Name of the archive, when it was opened from a path.
        archive: Option<String>,
    },

    /// The password is incorrect or encrypted data is corrupted.
    #[error("Wrong password{}", entry_index.map(|i| format!(" for entry {}", i)).unwrap_or_default())]
    WrongPassword {
        /// The entry index where the wrong password was detected (if known).
        entry_index: Option<usize>,
    },

    /// A coder declares more memory than the configured ceiling allows.
    #[error("{required_kib} KiB of memory would be needed but the limit is {limit_kib} KiB")]
    MemoryLimitExceeded {
        /// Memory the coder would need.
        required_kib: u64,
        /// Configured ceiling.
        limit_kib: u64,
    },

    /// The archive uses a compression method not available in this build.
    #[error("Unsupported method: {method_id:#x}")]
    UnsupportedMethod {
        /// The method ID, big-endian packed into a u64.
        method_id: u64,
    },

    /// A feature required by the archive is not supported.
    #[error("Unsupported feature: {feature}")]
    UnsupportedFeature {
        /// The name of the unsupported feature.
        feature: &'static str,
    },

    /// A folder's coder graph is inconsistent (cycle, dangling bind pair).
    #[error("Malformed folder: {0}")]
    MalformedFolder(String),

    /// A parser or decoder safety limit was exceeded.
    #[error("Resource limit exceeded: {0}")]
    ResourceLimitExceeded(String),

    /// The operation is not valid in the object's current state.
    #[error("{0}")]
    InvalidState(&'static str),

    /// A configuration value is out of range.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// No entry exists at the requested index.
    #[error("Entry {index} not found")]
    EntryNotFound {
        /// The requested index.
        index: usize,
    },
}

impl Error {
    /// Creates a CorruptHeader error.
    pub fn corrupt_header(offset: u64, reason: impl Into<String>) -> Self {
        Error::CorruptHeader {
            offset,
            reason: reason.into(),
        }
    }

    /// Creates a CrcMismatch error for entry data.
    pub fn crc_mismatch(
        entry_index: usize,
        entry_name: Option<String>,
        expected: u32,
        actual: u32,
    ) -> Self {
        Error::CrcMismatch {
            entry_index: Some(entry_index),
            entry_name,
            expected,
            actual,
        }
    }

    /// Returns the method ID if this is an unsupported method error.
    pub fn method_id(&self) -> Option<u64> {
        match self {
            Error::UnsupportedMethod { method_id } => Some(*method_id),
            _ => None,
        }
    }

    /// Returns `true` if this error reports damaged archive data.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            Error::CorruptHeader { .. }
                | Error::CrcMismatch { .. }
                | Error::Truncated { .. }
                | Error::MalformedFolder(_)
        )
    }

    /// Returns `true` if this error concerns encryption credentials.
    pub fn is_encryption_error(&self) -> bool {
        matches!(
            self,
            Error::PasswordRequired { .. } | Error::WrongPassword { .. }
        )
    }

    /// Reinterprets a decoding failure of AES-encrypted data.
    ///
    /// Garbage from a wrong key surfaces downstream as corrupt data; when
    /// `encrypted` is set such failures become [`Error::WrongPassword`].
    pub(crate) fn in_encrypted_context(self, encrypted: bool, entry_index: Option<usize>) -> Self {
        if !encrypted {
            return self;
        }
        let garbled = match &self {
            Error::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::InvalidData | io::ErrorKind::UnexpectedEof
            ),
            Error::InvalidFormat(_) => true,
            other => other.is_corruption(),
        };
        if garbled {
            Error::WrongPassword { entry_index }
        } else {
            self
        }
    }

    /// Recovers a crate error that was boxed into an [`io::Error`].
    ///
    /// Unexpected EOF is reported as [`Error::Truncated`]; any other plain
    /// I/O error stays [`Error::Io`].
    pub fn from_io(e: io::Error) -> Self {
        if e.get_ref().is_some_and(|inner| inner.is::<Error>()) {
            if let Some(inner) = e.into_inner() {
                if let Ok(err) = inner.downcast::<Error>() {
                    return *err;
                }
            }
            return Error::InvalidState("lost nested error");
        }
        if e.kind() == io::ErrorKind::UnexpectedEof {
            return Error::Truncated {
                needed: 0,
                context: "stream",
            };
        }
        Error::Io(e)
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Io(e) => e,
            other => io::Error::other(other),
        }
    }
}

/// A specialized Result type for archive operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_from() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.to_string().contains("I/O error"));
    }

    #[test]
    fn test_password_required_message() {
        let err = Error::PasswordRequired {
            archive: Some("bla.encrypted.7z".into()),
        };
        let msg = err.to_string();
        assert!(msg.starts_with("Cannot read encrypted content from "));
        assert!(msg.ends_with(" without a password."));
        assert!(msg.contains("bla.encrypted.7z"));
    }

    #[test]
    fn test_crc_mismatch_display() {
        let err = Error::crc_mismatch(3, Some("a.txt".into()), 0x1234, 0x5678);
        assert_eq!(
            err.to_string(),
            "CRC mismatch for entry 3 (a.txt): expected 0x1234, got 0x5678"
        );
        let header = Error::CrcMismatch {
            entry_index: None,
            entry_name: None,
            expected: 1,
            actual: 2,
        };
        assert!(header.to_string().contains("archive header"));
        assert!(header.is_corruption());
    }

    #[test]
    fn test_encrypted_context() {
        let garbled = Error::Io(io::Error::new(io::ErrorKind::InvalidData, "bad lzma"));
        assert!(matches!(
            garbled.in_encrypted_context(true, Some(2)),
            Error::WrongPassword {
                entry_index: Some(2)
            }
        ));
        let plain = Error::corrupt_header(0, "bad");
        assert!(matches!(
            plain.in_encrypted_context(false, None),
            Error::CorruptHeader { .. }
        ));
        let limit = Error::ResourceLimitExceeded("x".into());
        assert!(matches!(
            limit.in_encrypted_context(true, None),
            Error::ResourceLimitExceeded(_)
        ));
    }

    #[test]
    fn test_round_trip_through_io_error() {
        let err = Error::MemoryLimitExceeded {
            required_kib: 65536,
            limit_kib: 1,
        };
        let io_err: io::Error = err.into();
        match Error::from_io(io_err) {
            Error::MemoryLimitExceeded {
                required_kib,
                limit_kib,
            } => {
                assert_eq!(required_kib, 65536);
                assert_eq!(limit_kib, 1);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_unexpected_eof_becomes_truncated() {
        let io_err = io::Error::new(io::ErrorKind::UnexpectedEof, "eof");
        assert!(matches!(Error::from_io(io_err), Error::Truncated { .. }));
    }

    #[test]
    fn test_plain_io_error_preserved() {
        let io_err: io::Error = Error::Io(io::Error::other("boom")).into();
        assert!(matches!(Error::from_io(io_err), Error::Io(_)));
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Error>();
    }
}
