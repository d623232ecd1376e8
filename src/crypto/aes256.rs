//! AES-256-SHA256 key derivation and stream adapters.
//!
//! Keys are derived by hashing `salt || utf16le(password) || counter` for
//! `2^num_cycles_power` rounds with SHA-256. Data is AES-256-CBC without
//! padding bytes of its own: the encoder zero-fills the last block and the
//! reader relies on the folder's unpack sizes to drop the fill.
//!
//! Key derivation dominates the cost of opening encrypted entries, so
//! [`KeyCache`] remembers derived keys per password, salt and round count.

use std::io::{self, Read, Write};
use std::num::NonZeroUsize;
use std::sync::Mutex;

use aes::Aes256;
use cbc::cipher::generic_array::GenericArray;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use lru::LruCache;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::codec::{Decoder, Encoder, method};
use crate::{Error, Result};

use super::{AesProperties, Password};

type Aes256CbcDec = cbc::Decryptor<Aes256>;
type Aes256CbcEnc = cbc::Encryptor<Aes256>;

const BLOCK_SIZE: usize = 16;

/// Largest accepted `num_cycles_power` for iterated derivation.
///
/// 2^30 rounds already take several seconds; anything higher in an archive
/// is treated as hostile.
pub const MAX_NUM_CYCLES_POWER: u8 = 30;

/// `num_cycles_power` value selecting the raw-key mode.
const RAW_KEY_CYCLES: u8 = 0x3F;

/// Round count used for new archives.
pub const DEFAULT_NUM_CYCLES_POWER: u8 = 19;

fn lock_or_recover<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| {
        log::warn!("key cache mutex was poisoned, recovering");
        poisoned.into_inner()
    })
}

/// Derives the AES-256 key for `password`.
///
/// With `num_cycles_power == 0x3F` the key is `salt || password` truncated
/// or zero-filled to 32 bytes.
///
/// # Errors
///
/// [`Error::ResourceLimitExceeded`] when `num_cycles_power` is above
/// [`MAX_NUM_CYCLES_POWER`] (and not the raw-key marker).
pub fn derive_key(
    password: &Password,
    salt: &[u8],
    num_cycles_power: u8,
) -> Result<Zeroizing<[u8; 32]>> {
    let password_bytes = password.as_utf16_le();
    let mut key = Zeroizing::new([0u8; 32]);

    if num_cycles_power == RAW_KEY_CYCLES {
        let raw = salt.iter().chain(password_bytes.iter());
        for (dst, src) in key.iter_mut().zip(raw) {
            *dst = *src;
        }
        return Ok(key);
    }

    if num_cycles_power > MAX_NUM_CYCLES_POWER {
        return Err(Error::ResourceLimitExceeded(format!(
            "AES key derivation with 2^{num_cycles_power} rounds"
        )));
    }

    let mut sha = Sha256::new();
    for round in 0..(1u64 << num_cycles_power) {
        sha.update(salt);
        sha.update(password_bytes.as_slice());
        sha.update(round.to_le_bytes());
    }
    key.copy_from_slice(&sha.finalize());
    Ok(key)
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    password_hash: [u8; 32],
    salt: Vec<u8>,
    num_cycles_power: u8,
}

/// Memoizes [`derive_key`] results.
///
/// Entries are keyed by a SHA-256 of the password, never the password
/// itself.
pub struct KeyCache {
    cache: Mutex<LruCache<CacheKey, Zeroizing<[u8; 32]>>>,
}

impl std::fmt::Debug for KeyCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyCache")
            .field("len", &lock_or_recover(&self.cache).len())
            .finish()
    }
}

impl Default for KeyCache {
    fn default() -> Self {
        Self::new(8)
    }
}

impl KeyCache {
    /// Creates a cache holding up to `capacity` keys.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Returns the cached key or derives and stores it.
    pub fn derive_key(
        &self,
        password: &Password,
        salt: &[u8],
        num_cycles_power: u8,
    ) -> Result<Zeroizing<[u8; 32]>> {
        let cache_key = CacheKey {
            password_hash: Sha256::digest(password.as_utf16_le().as_slice()).into(),
            salt: salt.to_vec(),
            num_cycles_power,
        };
        if let Some(key) = lock_or_recover(&self.cache).get(&cache_key) {
            return Ok(key.clone());
        }

        // Derive without holding the lock.
        let key = derive_key(password, salt, num_cycles_power)?;
        lock_or_recover(&self.cache).put(cache_key, key.clone());
        Ok(key)
    }

    /// Number of cached keys.
    pub fn len(&self) -> usize {
        lock_or_recover(&self.cache).len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Decrypting reader for the AES-256-SHA256 coder.
pub struct Aes256Decoder<R> {
    inner: R,
    cipher: Aes256CbcDec,
    buffer: Vec<u8>,
    pos: usize,
    eof: bool,
}

impl<R> std::fmt::Debug for Aes256Decoder<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Aes256Decoder").finish_non_exhaustive()
    }
}

impl<R: Read + Send> Aes256Decoder<R> {
    /// Creates a decoder from coder properties and a password.
    pub fn new(
        input: R,
        properties: &[u8],
        password: &Password,
        cache: Option<&KeyCache>,
    ) -> Result<Self> {
        let props = AesProperties::parse(properties)?;
        let key = match cache {
            Some(cache) => cache.derive_key(password, &props.salt, props.num_cycles_power)?,
            None => derive_key(password, &props.salt, props.num_cycles_power)?,
        };
        Ok(Self::with_key_iv(input, &key, &props.iv))
    }

    /// Creates a decoder from an already derived key.
    pub fn with_key_iv(input: R, key: &[u8; 32], iv: &[u8; 16]) -> Self {
        Self {
            inner: input,
            cipher: Aes256CbcDec::new(&(*key).into(), &(*iv).into()),
            buffer: Vec::with_capacity(crate::READ_BUFFER_SIZE),
            pos: 0,
            eof: false,
        }
    }

    /// Refills the buffer with whole decrypted blocks.
    ///
    /// Returns the number of plaintext bytes now available.
    fn refill(&mut self) -> io::Result<usize> {
        self.buffer.resize(crate::READ_BUFFER_SIZE, 0);
        let mut filled = 0;
        while filled < self.buffer.len() {
            let n = self.inner.read(&mut self.buffer[filled..])?;
            if n == 0 {
                self.eof = true;
                break;
            }
            filled += n;
            if filled % BLOCK_SIZE == 0 {
                break;
            }
        }

        if filled % BLOCK_SIZE != 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "encrypted stream is not a whole number of AES blocks",
            ));
        }
        self.buffer.truncate(filled);
        for block in self.buffer.chunks_exact_mut(BLOCK_SIZE) {
            self.cipher
                .decrypt_block_mut(GenericArray::from_mut_slice(block));
        }
        self.pos = 0;
        Ok(filled)
    }
}

impl<R: Read + Send> Read for Aes256Decoder<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        while self.pos >= self.buffer.len() {
            if self.eof || self.refill()? == 0 {
                return Ok(0);
            }
        }

        let available = &self.buffer[self.pos..];
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.pos += n;
        Ok(n)
    }
}

impl<R: Read + Send> Decoder for Aes256Decoder<R> {
    fn method_id(&self) -> &'static [u8] {
        method::AES
    }
}

/// Encrypting writer for the AES-256-SHA256 coder.
///
/// Salt and IV are drawn from the operating system RNG.
pub struct Aes256Encoder<W> {
    inner: W,
    cipher: Aes256CbcEnc,
    properties: AesProperties,
    pending: Vec<u8>,
}

impl<W> std::fmt::Debug for Aes256Encoder<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Aes256Encoder").finish_non_exhaustive()
    }
}

impl<W: Write + Send> Aes256Encoder<W> {
    /// Creates an encoder with fresh random salt and IV.
    pub fn new(output: W, password: &Password, num_cycles_power: u8) -> Result<Self> {
        let mut salt = vec![0u8; 16];
        let mut iv = [0u8; 16];
        getrandom::getrandom(&mut salt).map_err(|e| Error::Io(io::Error::other(e.to_string())))?;
        getrandom::getrandom(&mut iv).map_err(|e| Error::Io(io::Error::other(e.to_string())))?;
        Self::with_properties(
            output,
            password,
            AesProperties {
                num_cycles_power,
                salt,
                iv,
            },
        )
    }

    /// Creates an encoder with explicit salt and IV.
    pub fn with_properties(output: W, password: &Password, properties: AesProperties) -> Result<Self> {
        let key = derive_key(password, &properties.salt, properties.num_cycles_power)?;
        Ok(Self {
            inner: output,
            cipher: Aes256CbcEnc::new(&(*key).into(), &properties.iv.into()),
            properties,
            pending: Vec::with_capacity(crate::READ_BUFFER_SIZE),
        })
    }

    /// The coder properties to store in the folder.
    pub fn properties(&self) -> &AesProperties {
        &self.properties
    }

    fn encrypt_whole_blocks(&mut self) -> io::Result<()> {
        let whole = self.pending.len() - self.pending.len() % BLOCK_SIZE;
        if whole == 0 {
            return Ok(());
        }
        for block in self.pending[..whole].chunks_exact_mut(BLOCK_SIZE) {
            self.cipher
                .encrypt_block_mut(GenericArray::from_mut_slice(block));
        }
        self.inner.write_all(&self.pending[..whole])?;
        self.pending.drain(..whole);
        Ok(())
    }

    /// Zero-fills and encrypts the last partial block.
    pub fn try_finish(mut self) -> io::Result<W> {
        let fill = (BLOCK_SIZE - self.pending.len() % BLOCK_SIZE) % BLOCK_SIZE;
        self.pending.resize(self.pending.len() + fill, 0);
        self.encrypt_whole_blocks()?;
        self.inner.flush()?;
        Ok(self.inner)
    }
}

impl<W: Write + Send> Write for Aes256Encoder<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.pending.extend_from_slice(buf);
        if self.pending.len() >= crate::READ_BUFFER_SIZE {
            self.encrypt_whole_blocks()?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.encrypt_whole_blocks()?;
        self.inner.flush()
    }
}

impl<W: Write + Send> Encoder<W> for Aes256Encoder<W> {
    fn method_id(&self) -> &'static [u8] {
        method::AES
    }

    fn finish(self: Box<Self>) -> io::Result<W> {
        (*self).try_finish()
    }
}

/// Ciphertext length produced for `plain_size` bytes of input.
pub fn encrypted_size(plain_size: u64) -> u64 {
    plain_size.div_ceil(BLOCK_SIZE as u64) * BLOCK_SIZE as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn fixed_props() -> AesProperties {
        AesProperties {
            num_cycles_power: 4,
            salt: b"saltsalt".to_vec(),
            iv: [9; 16],
        }
    }

    fn encrypt(data: &[u8], password: &Password) -> (Vec<u8>, Vec<u8>) {
        let mut encoder =
            Aes256Encoder::with_properties(Vec::new(), password, fixed_props()).unwrap();
        encoder.write_all(data).unwrap();
        let props = encoder.properties().encode();
        (encoder.try_finish().unwrap(), props)
    }

    #[test]
    fn test_derive_key_is_deterministic() {
        let password = Password::new("test");
        let a = derive_key(&password, b"salt", 6).unwrap();
        let b = derive_key(&password, b"salt", 6).unwrap();
        let c = derive_key(&Password::new("test2"), b"salt", 6).unwrap();
        assert_eq!(*a, *b);
        assert_ne!(*a, *c);
    }

    #[test]
    fn test_derive_key_raw_mode() {
        let key = derive_key(&Password::new("ab"), &[1, 2], RAW_KEY_CYCLES).unwrap();
        assert_eq!(key[..6], [1, 2, 0x61, 0, 0x62, 0]);
        assert!(key[6..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_derive_key_rejects_huge_cycles() {
        let result = derive_key(&Password::new("x"), &[], 40);
        assert!(matches!(result, Err(Error::ResourceLimitExceeded(_))));
    }

    #[test]
    fn test_key_cache() {
        let cache = KeyCache::new(2);
        let password = Password::new("pw");
        let first = cache.derive_key(&password, b"s", 5).unwrap();
        let second = cache.derive_key(&password, b"s", 5).unwrap();
        assert_eq!(*first, *second);
        assert_eq!(cache.len(), 1);
        assert_eq!(*first, *derive_key(&password, b"s", 5).unwrap());
    }

    #[test]
    fn test_round_trip_with_fill() {
        let password = Password::new("secret");
        let data: Vec<u8> = (0..1000u32).map(|i| (i % 251) as u8).collect();
        let (encrypted, props) = encrypt(&data, &password);
        assert_eq!(encrypted.len() as u64, encrypted_size(data.len() as u64));

        let mut decoder =
            Aes256Decoder::new(Cursor::new(encrypted), &props, &password, None).unwrap();
        let mut plain = Vec::new();
        decoder.read_to_end(&mut plain).unwrap();
        assert_eq!(&plain[..data.len()], &data[..]);
        assert!(plain[data.len()..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_wrong_password_yields_garbage() {
        let data = b"attack at dawn, bring snacks....";
        let (encrypted, props) = encrypt(data, &Password::new("right"));
        let mut decoder =
            Aes256Decoder::new(Cursor::new(encrypted), &props, &Password::new("wrong"), None)
                .unwrap();
        let mut plain = Vec::new();
        decoder.read_to_end(&mut plain).unwrap();
        assert_ne!(&plain[..], &data[..]);
    }

    #[test]
    fn test_unaligned_source_reads() {
        struct Dribble(Cursor<Vec<u8>>);
        impl Read for Dribble {
            fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
                let n = buf.len().min(5);
                self.0.read(&mut buf[..n])
            }
        }

        let password = Password::new("pw");
        let data = vec![0xA5u8; 100];
        let (encrypted, props) = encrypt(&data, &password);
        let mut decoder =
            Aes256Decoder::new(Dribble(Cursor::new(encrypted)), &props, &password, None).unwrap();
        let mut plain = Vec::new();
        decoder.read_to_end(&mut plain).unwrap();
        assert_eq!(&plain[..100], &data[..]);
    }

    #[test]
    fn test_partial_block_is_error() {
        let password = Password::new("pw");
        let (mut encrypted, props) = encrypt(&[1u8; 32], &password);
        encrypted.truncate(20);
        let mut decoder =
            Aes256Decoder::new(Cursor::new(encrypted), &props, &password, None).unwrap();
        let mut plain = Vec::new();
        let err = decoder.read_to_end(&mut plain).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_fresh_salt_and_iv() {
        let password = Password::new("pw");
        let a = Aes256Encoder::new(Vec::new(), &password, 4).unwrap();
        let b = Aes256Encoder::new(Vec::new(), &password, 4).unwrap();
        assert_eq!(a.properties().salt.len(), 16);
        assert_ne!(
            (&a.properties().salt, a.properties().iv),
            (&b.properties().salt, b.properties().iv)
        );
    }

    #[test]
    fn test_empty_input() {
        let (encrypted, _) = encrypt(&[], &Password::new("pw"));
        assert!(encrypted.is_empty());
    }
}
