//! Coder properties of the AES-256-SHA256 method.
//!
//! Layout:
//! - byte 0: `salt_flag << 7 | iv_flag << 6 | num_cycles_power`
//! - byte 1: `(salt_size - salt_flag) << 4 | (iv_size - iv_flag)`
//! - salt bytes, then IV bytes

use crate::{Error, Result};

/// Key derivation and IV parameters of one AES coder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AesProperties {
    /// Number of SHA-256 rounds is `2^num_cycles_power`; `0x3F` selects the
    /// raw-key mode.
    pub num_cycles_power: u8,
    /// Salt, 0 to 16 bytes.
    pub salt: Vec<u8>,
    /// IV, zero-padded to 16 bytes.
    pub iv: [u8; 16],
}

impl AesProperties {
    /// Parses coder property bytes.
    pub fn parse(properties: &[u8]) -> Result<Self> {
        let [first, rest @ ..] = properties else {
            return Err(Error::InvalidFormat("missing AES properties".into()));
        };
        let num_cycles_power = first & 0x3F;
        if first & 0xC0 == 0 {
            return Ok(Self {
                num_cycles_power,
                salt: Vec::new(),
                iv: [0; 16],
            });
        }

        let [second, data @ ..] = rest else {
            return Err(Error::InvalidFormat("AES properties too short".into()));
        };
        let salt_size = usize::from((first >> 7) & 1) + usize::from(second >> 4);
        let iv_size = usize::from((first >> 6) & 1) + usize::from(second & 0x0F);
        if data.len() < salt_size + iv_size {
            return Err(Error::InvalidFormat(format!(
                "AES properties too short: need {} bytes of salt and IV, have {}",
                salt_size + iv_size,
                data.len()
            )));
        }

        let mut iv = [0u8; 16];
        iv[..iv_size].copy_from_slice(&data[salt_size..salt_size + iv_size]);
        Ok(Self {
            num_cycles_power,
            salt: data[..salt_size].to_vec(),
            iv,
        })
    }

    /// Serializes to coder property bytes, always storing the full IV.
    pub fn encode(&self) -> Vec<u8> {
        let salt = &self.salt[..self.salt.len().min(16)];
        let mut first = (self.num_cycles_power & 0x3F) | 0x40;
        let mut second = 0x0Fu8;
        if !salt.is_empty() {
            first |= 0x80;
            second |= ((salt.len() - 1) as u8) << 4;
        }

        let mut out = Vec::with_capacity(2 + salt.len() + 16);
        out.push(first);
        out.push(second);
        out.extend_from_slice(salt);
        out.extend_from_slice(&self.iv);
        out
    }
}
