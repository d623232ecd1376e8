//! Method identities and per-stage configuration.

use std::fmt;

use crate::format::streams::Coder;

use super::method;

/// A coder method known to this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Method {
    /// Stored without transformation.
    Copy,
    /// LZMA.
    Lzma,
    /// LZMA2.
    Lzma2,
    /// Deflate.
    Deflate,
    /// Deflate64 (recognised only).
    Deflate64,
    /// BZIP2.
    Bzip2,
    /// x86 branch converter.
    BcjX86,
    /// ARM branch converter.
    BcjArm,
    /// ARM Thumb branch converter.
    BcjArmThumb,
    /// PowerPC branch converter.
    BcjPpc,
    /// SPARC branch converter.
    BcjSparc,
    /// IA-64 branch converter.
    BcjIa64,
    /// Byte-wise delta filter.
    Delta,
    /// AES-256 with SHA-256 key derivation.
    Aes256Sha256,
}

impl Method {
    /// Every method, in registry order.
    pub const ALL: [Method; 14] = [
        Method::Copy,
        Method::Lzma,
        Method::Lzma2,
        Method::Deflate,
        Method::Deflate64,
        Method::Bzip2,
        Method::BcjX86,
        Method::BcjArm,
        Method::BcjArmThumb,
        Method::BcjPpc,
        Method::BcjSparc,
        Method::BcjIa64,
        Method::Delta,
        Method::Aes256Sha256,
    ];

    /// The method ID bytes stored in coder records.
    pub fn id(self) -> &'static [u8] {
        match self {
            Method::Copy => method::COPY,
            Method::Lzma => method::LZMA,
            Method::Lzma2 => method::LZMA2,
            Method::Deflate => method::DEFLATE,
            Method::Deflate64 => method::DEFLATE64,
            Method::Bzip2 => method::BZIP2,
            Method::BcjX86 => method::BCJ_X86,
            Method::BcjArm => method::BCJ_ARM,
            Method::BcjArmThumb => method::BCJ_ARM_THUMB,
            Method::BcjPpc => method::BCJ_PPC,
            Method::BcjSparc => method::BCJ_SPARC,
            Method::BcjIa64 => method::BCJ_IA64,
            Method::Delta => method::DELTA,
            Method::Aes256Sha256 => method::AES,
        }
    }

    /// Looks a method up by its ID bytes.
    pub fn from_id(id: &[u8]) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.id() == id)
    }

    /// Display name.
    pub fn name(self) -> &'static str {
        match self {
            Method::Copy => "COPY",
            Method::Lzma => "LZMA",
            Method::Lzma2 => "LZMA2",
            Method::Deflate => "DEFLATE",
            Method::Deflate64 => "DEFLATE64",
            Method::Bzip2 => "BZIP2",
            Method::BcjX86 => "BCJ_X86",
            Method::BcjArm => "BCJ_ARM",
            Method::BcjArmThumb => "BCJ_ARM_THUMB",
            Method::BcjPpc => "BCJ_PPC",
            Method::BcjSparc => "BCJ_SPARC",
            Method::BcjIa64 => "BCJ_IA64",
            Method::Delta => "DELTA",
            Method::Aes256Sha256 => "AES256SHA256",
        }
    }

    /// Filters reshape data without compressing it.
    pub fn is_filter(self) -> bool {
        matches!(
            self,
            Method::BcjX86
                | Method::BcjArm
                | Method::BcjArmThumb
                | Method::BcjPpc
                | Method::BcjSparc
                | Method::BcjIa64
                | Method::Delta
        )
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// LZMA encoder tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LzmaSettings {
    /// Preset level 0-9.
    pub level: u32,
    /// Dictionary size override in bytes.
    pub dict_size: Option<u32>,
}

impl Default for LzmaSettings {
    fn default() -> Self {
        Self {
            level: 6,
            dict_size: None,
        }
    }
}

/// Method-specific options of one chain stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MethodOptions {
    /// Method defaults.
    #[default]
    None,
    /// Compression level (Deflate 0-9, BZIP2 block size 1-9, LZMA preset).
    Level(u32),
    /// Dictionary size in bytes (LZMA, LZMA2).
    DictSize(u32),
    /// Delta distance, 1 to 256.
    Delta(u32),
    /// Full LZMA settings.
    Lzma(LzmaSettings),
}

/// One stage of a content method chain.
///
/// Chains are listed in encoding order: `[Delta, Lzma2]` applies the delta
/// filter first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodConfiguration {
    /// The method.
    pub method: Method,
    /// Its options.
    pub options: MethodOptions,
}

impl MethodConfiguration {
    /// A stage with default options.
    pub fn new(method: Method) -> Self {
        Self {
            method,
            options: MethodOptions::None,
        }
    }

    /// A stage with explicit options.
    pub fn with_options(method: Method, options: MethodOptions) -> Self {
        Self { method, options }
    }

    /// Reconstructs the configuration recorded in a coder.
    ///
    /// Returns `None` for method IDs this crate does not know. Options that
    /// the properties do not carry (levels) come back as defaults.
    pub fn from_coder(coder: &Coder) -> Option<Self> {
        let method = Method::from_id(&coder.method_id)?;
        let props = coder.properties();
        let options = match method {
            Method::Lzma => props
                .get(1..5)
                .and_then(|b| b.try_into().ok())
                .map(|b: [u8; 4]| MethodOptions::DictSize(u32::from_le_bytes(b)))
                .unwrap_or_default(),
            Method::Lzma2 => props
                .first()
                .and_then(|&p| super::lzma2_dict_size(p).ok())
                .map(MethodOptions::DictSize)
                .unwrap_or_default(),
            Method::Delta => MethodOptions::Delta(props.first().map_or(1, |&d| u32::from(d) + 1)),
            _ => MethodOptions::None,
        };
        Some(Self { method, options })
    }
}

impl From<Method> for MethodConfiguration {
    fn from(method: Method) -> Self {
        Self::new(method)
    }
}

impl fmt::Display for MethodConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.options {
            MethodOptions::None => write!(f, "{}", self.method),
            MethodOptions::Level(level) => write!(f, "{}:{level}", self.method),
            MethodOptions::DictSize(size) => write!(f, "{}:d={size}", self.method),
            MethodOptions::Delta(distance) => write!(f, "{}:{distance}", self.method),
            MethodOptions::Lzma(settings) => write!(f, "{}:{}", self.method, settings.level),
        }
    }
}
