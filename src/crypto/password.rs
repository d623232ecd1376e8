//! Passwords kept in zeroizing memory.

use zeroize::Zeroizing;

/// An archive password.
///
/// The text is wiped from memory on drop. 7z derives keys from the UTF-16LE
/// form of the password, see [`Password::as_utf16_le`].
#[derive(Clone)]
pub struct Password {
    inner: Zeroizing<String>,
}

impl Password {
    /// Wraps a password.
    pub fn new<S: Into<String>>(password: S) -> Self {
        Self {
            inner: Zeroizing::new(password.into()),
        }
    }

    /// The password as UTF-16LE bytes, wiped on drop.
    pub fn as_utf16_le(&self) -> Zeroizing<Vec<u8>> {
        Zeroizing::new(
            self.inner
                .encode_utf16()
                .flat_map(|unit| unit.to_le_bytes())
                .collect(),
        )
    }

    /// Whether the password is the empty string.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl std::fmt::Debug for Password {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Password(***)")
    }
}

impl From<&str> for Password {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Password {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}
