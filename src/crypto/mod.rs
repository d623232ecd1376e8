//! Password handling and the 7z AES-256-SHA256 coder.
//!
//! [`Password`] is always available so option types can carry one; the
//! cipher itself needs the `aes` feature.

mod password;

#[cfg(feature = "aes")]
mod aes256;
#[cfg(feature = "aes")]
mod properties;

pub use password::Password;

#[cfg(feature = "aes")]
pub use aes256::{
    Aes256Decoder, Aes256Encoder, DEFAULT_NUM_CYCLES_POWER, KeyCache, MAX_NUM_CYCLES_POWER,
    derive_key, encrypted_size,
};
#[cfg(feature = "aes")]
pub use properties::AesProperties;
