//! Method ID to coder factory table.

use std::io::Read;
use std::sync::OnceLock;

#[cfg(feature = "aes")]
use crate::crypto::KeyCache;
use crate::crypto::Password;
use crate::format::reader::from_be_bytes;
use crate::format::streams::Coder;
use crate::{Error, Result};

use super::{
    CopyDecoder, CopyEncoder, DeltaEncoder, Decoder, Encoder, Method,
    MethodConfiguration, MethodOptions, StageOutput, delta,
};

/// Builds the decoder of one coder: input stream, coder record, size of the
/// coder's output, context.
pub type DecodeFn =
    fn(Box<dyn Read + Send>, &Coder, u64, &DecodeContext<'_>) -> Result<Box<dyn Decoder>>;

/// Builds the encoder of one chain stage writing into the given output.
pub type EncodeFn = fn(StageOutput, &MethodOptions, &EncodeContext<'_>) -> Result<EncoderStage>;

/// Estimates decoder memory for a coder in KiB.
pub type MemoryFn = fn(&Coder) -> Result<u64>;

/// An instantiated encoding stage and the coder properties it records.
pub struct EncoderStage {
    /// The encoder.
    pub encoder: Box<dyn Encoder<StageOutput>>,
    /// Properties to store in the coder record.
    pub properties: Option<Vec<u8>>,
}

impl std::fmt::Debug for EncoderStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncoderStage")
            .field("method_id", &self.encoder.method_id())
            .field("properties", &self.properties)
            .finish()
    }
}

/// What the registry knows about one method.
#[derive(Debug, Clone, Copy)]
pub struct MethodDescriptor {
    /// The method.
    pub method: Method,
    /// Decoder factory, if decoding is supported.
    pub decode: Option<DecodeFn>,
    /// Encoder factory, if encoding is supported.
    pub encode: Option<EncodeFn>,
    /// Decoder memory estimate.
    pub memory_kib: MemoryFn,
}

/// Inputs a decoder factory may need besides the stream.
#[derive(Debug, Default, Clone, Copy)]
pub struct DecodeContext<'a> {
    /// Password for encrypted coders.
    pub password: Option<&'a Password>,
    /// Per-coder memory limit in KiB.
    pub max_memory_kib: Option<u64>,
    /// Archive name for error messages.
    pub archive_name: Option<&'a str>,
    /// Cache of derived AES keys.
    #[cfg(feature = "aes")]
    pub key_cache: Option<&'a KeyCache>,
}

/// Inputs an encoder factory may need besides the stream.
#[derive(Debug, Default, Clone, Copy)]
pub struct EncodeContext<'a> {
    /// Password for encrypting coders.
    pub password: Option<&'a Password>,
}

fn unsupported(id: &[u8]) -> Error {
    Error::UnsupportedMethod {
        method_id: from_be_bytes(id),
    }
}

/// The coder factory table consulted by the folder graph resolver and the
/// writer.
#[derive(Debug, Clone)]
pub struct CodecRegistry {
    descriptors: Vec<MethodDescriptor>,
}

impl Default for CodecRegistry {
    fn default() -> Self {
        Self::with_builtin_methods()
    }
}

impl CodecRegistry {
    /// A registry with no methods.
    pub fn empty() -> Self {
        Self {
            descriptors: Vec::new(),
        }
    }

    /// The shared registry of built-in methods.
    pub fn builtin() -> &'static CodecRegistry {
        static BUILTIN: OnceLock<CodecRegistry> = OnceLock::new();
        BUILTIN.get_or_init(Self::with_builtin_methods)
    }

    /// A fresh registry holding every method compiled into this build.
    pub fn with_builtin_methods() -> Self {
        let mut registry = Self::empty();
        registry.register(MethodDescriptor {
            method: Method::Copy,
            decode: Some(decode_copy),
            encode: Some(encode_copy),
            memory_kib: no_memory,
        });
        registry.register(MethodDescriptor {
            method: Method::Delta,
            #[cfg(feature = "lzma")]
            decode: Some(decode_delta),
            #[cfg(not(feature = "lzma"))]
            decode: None,
            encode: Some(encode_delta),
            memory_kib: no_memory,
        });
        registry.register(MethodDescriptor {
            method: Method::Deflate64,
            #[cfg(feature = "deflate64")]
            decode: Some(decode_deflate64),
            #[cfg(not(feature = "deflate64"))]
            decode: None,
            encode: None,
            memory_kib: |_| Ok(256),
        });

        #[cfg(feature = "lzma")]
        {
            registry.register(MethodDescriptor {
                method: Method::Lzma,
                decode: Some(decode_lzma),
                encode: Some(encode_lzma),
                memory_kib: |coder| super::lzma::lzma_memory_kib(coder.properties()),
            });
            registry.register(MethodDescriptor {
                method: Method::Lzma2,
                decode: Some(decode_lzma2),
                encode: Some(encode_lzma2),
                memory_kib: |coder| super::lzma::lzma2_memory_kib(coder.properties()),
            });
            for method in [
                Method::BcjX86,
                Method::BcjArm,
                Method::BcjArmThumb,
                Method::BcjPpc,
                Method::BcjSparc,
                Method::BcjIa64,
            ] {
                registry.register(MethodDescriptor {
                    method,
                    decode: Some(decode_bcj),
                    encode: None,
                    memory_kib: no_memory,
                });
            }
        }

        #[cfg(feature = "deflate")]
        registry.register(MethodDescriptor {
            method: Method::Deflate,
            decode: Some(decode_deflate),
            encode: Some(encode_deflate),
            memory_kib: |_| Ok(256),
        });

        #[cfg(feature = "bzip2")]
        registry.register(MethodDescriptor {
            method: Method::Bzip2,
            decode: Some(decode_bzip2),
            encode: Some(encode_bzip2),
            memory_kib: |_| Ok(900),
        });

        #[cfg(feature = "aes")]
        registry.register(MethodDescriptor {
            method: Method::Aes256Sha256,
            decode: Some(decode_aes),
            encode: Some(encode_aes),
            memory_kib: |_| Ok(1),
        });

        registry
    }

    /// Adds a method, replacing any descriptor for the same method.
    pub fn register(&mut self, descriptor: MethodDescriptor) {
        match self
            .descriptors
            .iter_mut()
            .find(|d| d.method == descriptor.method)
        {
            Some(existing) => *existing = descriptor,
            None => self.descriptors.push(descriptor),
        }
    }

    /// Looks up the descriptor for a method ID.
    pub fn lookup(&self, method_id: &[u8]) -> Option<&MethodDescriptor> {
        self.descriptors.iter().find(|d| d.method.id() == method_id)
    }

    /// Instantiates the decoder for `coder`.
    ///
    /// Unknown methods and methods without a decoder are
    /// [`Error::UnsupportedMethod`].
    pub fn decoder(
        &self,
        input: Box<dyn Read + Send>,
        coder: &Coder,
        unpack_size: u64,
        ctx: &DecodeContext<'_>,
    ) -> Result<Box<dyn Decoder>> {
        let decode = self
            .lookup(&coder.method_id)
            .and_then(|d| d.decode)
            .ok_or_else(|| unsupported(&coder.method_id))?;
        decode(input, coder, unpack_size, ctx)
    }

    /// Instantiates the encoder for one chain stage.
    pub fn encoder(
        &self,
        output: StageOutput,
        config: &MethodConfiguration,
        ctx: &EncodeContext<'_>,
    ) -> Result<EncoderStage> {
        let id = config.method.id();
        let encode = self
            .lookup(id)
            .and_then(|d| d.encode)
            .ok_or_else(|| unsupported(id))?;
        encode(output, &config.options, ctx)
    }

    /// Decoder memory estimate in KiB; 0 for methods this registry does not
    /// know, which fail later when decoded.
    pub fn memory_kib(&self, coder: &Coder) -> Result<u64> {
        match self.lookup(&coder.method_id) {
            Some(descriptor) => (descriptor.memory_kib)(coder),
            None => Ok(0),
        }
    }

    /// Whether `method` can be written by this registry.
    pub fn can_encode(&self, method: Method) -> bool {
        self.lookup(method.id()).is_some_and(|d| d.encode.is_some())
    }
}

fn no_memory(_: &Coder) -> Result<u64> {
    Ok(0)
}

fn no_options(options: &MethodOptions, what: &str) -> Result<()> {
    match options {
        MethodOptions::None => Ok(()),
        other => Err(Error::InvalidFormat(format!(
            "options {other:?} do not apply to {what}"
        ))),
    }
}

fn decode_copy(
    input: Box<dyn Read + Send>,
    _coder: &Coder,
    unpack_size: u64,
    _ctx: &DecodeContext<'_>,
) -> Result<Box<dyn Decoder>> {
    Ok(Box::new(CopyDecoder::new(input, unpack_size)))
}

fn encode_copy(
    output: StageOutput,
    options: &MethodOptions,
    _ctx: &EncodeContext<'_>,
) -> Result<EncoderStage> {
    no_options(options, "COPY")?;
    Ok(EncoderStage {
        encoder: Box::new(CopyEncoder::new(output)),
        properties: None,
    })
}

#[cfg(feature = "lzma")]
fn decode_delta(
    input: Box<dyn Read + Send>,
    coder: &Coder,
    _unpack_size: u64,
    _ctx: &DecodeContext<'_>,
) -> Result<Box<dyn Decoder>> {
    Ok(Box::new(super::DeltaDecoder::new(input, coder.properties())?))
}

fn encode_delta(
    output: StageOutput,
    options: &MethodOptions,
    _ctx: &EncodeContext<'_>,
) -> Result<EncoderStage> {
    let distance = match *options {
        MethodOptions::None => 1,
        MethodOptions::Delta(distance) => distance,
        other => {
            return Err(Error::InvalidFormat(format!(
                "options {other:?} do not apply to DELTA"
            )));
        }
    };
    let encoder = DeltaEncoder::new(output, distance)?;
    let properties = vec![delta::distance_property(distance)?];
    Ok(EncoderStage {
        encoder: Box::new(encoder),
        properties: Some(properties),
    })
}

#[cfg(feature = "lzma")]
fn decode_lzma(
    input: Box<dyn Read + Send>,
    coder: &Coder,
    unpack_size: u64,
    _ctx: &DecodeContext<'_>,
) -> Result<Box<dyn Decoder>> {
    let decoder = super::LzmaDecoder::new(input, coder.properties(), unpack_size)?;
    Ok(Box::new(decoder))
}

#[cfg(feature = "lzma")]
fn encode_lzma(
    output: StageOutput,
    options: &MethodOptions,
    _ctx: &EncodeContext<'_>,
) -> Result<EncoderStage> {
    let encoder = super::LzmaEncoder::new(output, options)?;
    let properties = encoder.properties().to_vec();
    Ok(EncoderStage {
        encoder: Box::new(encoder),
        properties: Some(properties),
    })
}

#[cfg(feature = "lzma")]
fn decode_lzma2(
    input: Box<dyn Read + Send>,
    coder: &Coder,
    _unpack_size: u64,
    _ctx: &DecodeContext<'_>,
) -> Result<Box<dyn Decoder>> {
    Ok(Box::new(super::Lzma2Decoder::new(input, coder.properties())?))
}

#[cfg(feature = "lzma")]
fn encode_lzma2(
    output: StageOutput,
    options: &MethodOptions,
    _ctx: &EncodeContext<'_>,
) -> Result<EncoderStage> {
    let encoder = super::Lzma2Encoder::new(output, options)?;
    let properties = encoder.properties();
    Ok(EncoderStage {
        encoder: Box::new(encoder),
        properties: Some(properties),
    })
}

#[cfg(feature = "lzma")]
fn decode_bcj(
    input: Box<dyn Read + Send>,
    coder: &Coder,
    _unpack_size: u64,
    _ctx: &DecodeContext<'_>,
) -> Result<Box<dyn Decoder>> {
    let method = Method::from_id(&coder.method_id).ok_or_else(|| unsupported(&coder.method_id))?;
    Ok(Box::new(super::BcjDecoder::new(input, method)?))
}

#[cfg(feature = "deflate")]
fn decode_deflate(
    input: Box<dyn Read + Send>,
    _coder: &Coder,
    _unpack_size: u64,
    _ctx: &DecodeContext<'_>,
) -> Result<Box<dyn Decoder>> {
    Ok(Box::new(super::DeflateDecoder::new(input)))
}

#[cfg(feature = "deflate64")]
fn decode_deflate64(
    input: Box<dyn Read + Send>,
    _coder: &Coder,
    _unpack_size: u64,
    _ctx: &DecodeContext<'_>,
) -> Result<Box<dyn Decoder>> {
    Ok(Box::new(super::Deflate64Decoder::new(input)))
}

#[cfg(feature = "deflate")]
fn encode_deflate(
    output: StageOutput,
    options: &MethodOptions,
    _ctx: &EncodeContext<'_>,
) -> Result<EncoderStage> {
    Ok(EncoderStage {
        encoder: Box::new(super::DeflateEncoder::new(output, options)?),
        properties: None,
    })
}

#[cfg(feature = "bzip2")]
fn decode_bzip2(
    input: Box<dyn Read + Send>,
    _coder: &Coder,
    _unpack_size: u64,
    _ctx: &DecodeContext<'_>,
) -> Result<Box<dyn Decoder>> {
    Ok(Box::new(super::Bzip2Decoder::new(input)))
}

#[cfg(feature = "bzip2")]
fn encode_bzip2(
    output: StageOutput,
    options: &MethodOptions,
    _ctx: &EncodeContext<'_>,
) -> Result<EncoderStage> {
    let options = super::bzip2::encoder_options(options)?;
    Ok(EncoderStage {
        encoder: Box::new(crate::bzip2::Bzip2Encoder::new(output, options)),
        properties: None,
    })
}

#[cfg(feature = "aes")]
fn decode_aes(
    input: Box<dyn Read + Send>,
    coder: &Coder,
    _unpack_size: u64,
    ctx: &DecodeContext<'_>,
) -> Result<Box<dyn Decoder>> {
    let password = ctx.password.ok_or_else(|| Error::PasswordRequired {
        archive: ctx.archive_name.map(str::to_owned),
    })?;
    let decoder =
        crate::crypto::Aes256Decoder::new(input, coder.properties(), password, ctx.key_cache)?;
    Ok(Box::new(decoder))
}

#[cfg(feature = "aes")]
fn encode_aes(
    output: StageOutput,
    options: &MethodOptions,
    ctx: &EncodeContext<'_>,
) -> Result<EncoderStage> {
    no_options(options, "AES256SHA256")?;
    let password = ctx
        .password
        .ok_or(Error::PasswordRequired { archive: None })?;
    let encoder = crate::crypto::Aes256Encoder::new(
        output,
        password,
        crate::crypto::DEFAULT_NUM_CYCLES_POWER,
    )?;
    let properties = encoder.properties().encode();
    Ok(EncoderStage {
        encoder: Box::new(encoder),
        properties: Some(properties),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::method;
    use std::io::{Cursor, Read, Write};

    #[test]
    fn test_builtin_lookup() {
        let registry = CodecRegistry::builtin();
        assert!(registry.lookup(method::COPY).is_some());
        assert!(registry.lookup(method::DELTA).is_some());
        assert!(registry.lookup(&[0x7F]).is_none());
        assert!(registry.can_encode(Method::Copy));
        assert!(!registry.can_encode(Method::Deflate64));
    }

    #[cfg(feature = "deflate64")]
    #[test]
    fn test_deflate64_decodes_but_does_not_encode() {
        let coder = Coder::simple(method::DEFLATE64, None);
        let stored = vec![0x01, 0x02, 0x00, 0xFD, 0xFF, b'o', b'k'];
        let mut decoder = CodecRegistry::builtin()
            .decoder(Box::new(Cursor::new(stored)), &coder, 2, &DecodeContext::default())
            .unwrap();
        let mut output = Vec::new();
        decoder.read_to_end(&mut output).unwrap();
        assert_eq!(output, b"ok");
        assert!(!CodecRegistry::builtin().can_encode(Method::Deflate64));
    }

    #[cfg(not(feature = "deflate64"))]
    #[test]
    fn test_deflate64_is_unsupported() {
        let coder = Coder::simple(method::DEFLATE64, None);
        let result = CodecRegistry::builtin().decoder(
            Box::new(Cursor::new(Vec::new())),
            &coder,
            0,
            &DecodeContext::default(),
        );
        assert!(matches!(
            result,
            Err(Error::UnsupportedMethod { method_id: 0x040109 })
        ));
    }

    #[test]
    fn test_unknown_method_memory_is_zero() {
        let coder = Coder::simple(&[0x7F, 0x01], None);
        assert_eq!(CodecRegistry::builtin().memory_kib(&coder).unwrap(), 0);
    }

    #[test]
    fn test_delta_stage_properties() {
        let stage = CodecRegistry::builtin()
            .encoder(
                StageOutput::Sink(Vec::new()),
                &MethodConfiguration::with_options(Method::Delta, MethodOptions::Delta(4)),
                &EncodeContext::default(),
            )
            .unwrap();
        assert_eq!(stage.properties, Some(vec![3]));
        let mut encoder = stage.encoder;
        encoder.write_all(&[1, 2, 3, 4, 5]).unwrap();
        let StageOutput::Sink(bytes) = encoder.finish().unwrap() else {
            panic!("sink expected");
        };
        assert_eq!(bytes, [1, 2, 3, 4, 4]);
    }

    #[test]
    fn test_register_replaces() {
        let mut registry = CodecRegistry::empty();
        registry.register(MethodDescriptor {
            method: Method::Copy,
            decode: None,
            encode: None,
            memory_kib: no_memory,
        });
        assert!(!registry.can_encode(Method::Copy));
        registry.register(MethodDescriptor {
            method: Method::Copy,
            decode: Some(decode_copy),
            encode: Some(encode_copy),
            memory_kib: no_memory,
        });
        assert!(registry.can_encode(Method::Copy));
    }

    #[cfg(feature = "aes")]
    #[test]
    fn test_aes_without_password() {
        let coder = Coder::simple(method::AES, Some(vec![0x40 | 19, 0x0F]));
        let ctx = DecodeContext {
            archive_name: Some("secret.7z"),
            ..DecodeContext::default()
        };
        let err = CodecRegistry::builtin()
            .decoder(Box::new(Cursor::new(Vec::new())), &coder, 0, &ctx)
            .err()
            .unwrap();
        assert_eq!(
            err.to_string(),
            "Cannot read encrypted content from secret.7z without a password."
        );
    }
}
