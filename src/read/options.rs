//! Options for opening archives.

use crate::crypto::Password;
use crate::format::streams::ResourceLimits;

/// Configuration for [`Archive::open_with_options`](super::Archive::open_with_options).
///
/// # Example
///
/// ```rust
/// use archkit::read::ReadOptions;
///
/// let options = ReadOptions::new()
///     .password("secret")
///     .max_memory_kib(64 * 1024)
///     .try_to_recover_broken_archives(true)
///     .use_default_name_for_unnamed_entries(true);
/// assert!(options.recover_broken);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ReadOptions {
    /// Password for encrypted headers and content.
    pub password: Option<Password>,
    /// Per-coder memory ceiling in KiB, checked for every folder on open.
    pub max_memory_kib: Option<u64>,
    /// Search for the end header when the start header was never written.
    pub recover_broken: bool,
    /// Give entries without a name a name derived from the archive.
    pub use_default_name: bool,
    /// Name used for unnamed entries instead of the derived one.
    pub default_name: Option<String>,
    /// Parser hard caps.
    pub limits: ResourceLimits,
}

impl ReadOptions {
    /// Default options: no password, no memory limit, no recovery.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the password.
    pub fn password(mut self, password: impl Into<Password>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Sets the per-coder memory ceiling.
    pub fn max_memory_kib(mut self, kib: u64) -> Self {
        self.max_memory_kib = Some(kib);
        self
    }

    /// Enables the end header search for unfinished archives.
    pub fn try_to_recover_broken_archives(mut self, recover: bool) -> Self {
        self.recover_broken = recover;
        self
    }

    /// Names unnamed entries after the archive file.
    pub fn use_default_name_for_unnamed_entries(mut self, enabled: bool) -> Self {
        self.use_default_name = enabled;
        self
    }

    /// Sets an explicit name for unnamed entries; implies
    /// [`use_default_name_for_unnamed_entries`](Self::use_default_name_for_unnamed_entries).
    pub fn default_name(mut self, name: impl Into<String>) -> Self {
        self.default_name = Some(name.into());
        self.use_default_name = true;
        self
    }

    /// Sets the parser limits.
    pub fn limits(mut self, limits: ResourceLimits) -> Self {
        self.limits = limits;
        self
    }
}

/// Name for unnamed entries derived from the archive's file name: the
/// name without its last extension, or the name followed by `~` when it
/// has none.
pub(crate) fn default_entry_name(archive_file_name: &str) -> String {
    match archive_file_name.rfind('.') {
        Some(dot) if dot > 0 => archive_file_name[..dot].to_string(),
        _ => format!("{archive_file_name}~"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let options = ReadOptions::new()
            .max_memory_kib(1024)
            .default_name("unnamed");
        assert_eq!(options.max_memory_kib, Some(1024));
        assert!(options.use_default_name);
        assert_eq!(options.default_name.as_deref(), Some("unnamed"));
        assert!(!options.recover_broken);
        assert!(options.password.is_none());
    }

    #[test]
    fn test_default_entry_name() {
        assert_eq!(default_entry_name("backup.7z"), "backup");
        assert_eq!(default_entry_name("data.tar.7z"), "data.tar");
        assert_eq!(default_entry_name("archive"), "archive~");
        assert_eq!(default_entry_name(".hidden"), ".hidden~");
    }
}
