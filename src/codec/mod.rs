//! Coder plumbing for 7z folders.
//!
//! Every method is a pair of stream adapters: a [`Decoder`] wrapping the
//! reader that feeds it and an [`Encoder`] wrapping the writer it feeds.
//! [`CodecRegistry`] maps method IDs to factories for both, and
//! [`graph`] wires them into the coder graph of a folder.

mod config;
mod copy;
mod delta;
pub mod graph;
mod registry;

#[cfg(feature = "bzip2")]
mod bzip2;
#[cfg(feature = "deflate")]
mod deflate;
#[cfg(feature = "deflate64")]
mod deflate64;
#[cfg(feature = "lzma")]
mod filters;
#[cfg(feature = "lzma")]
mod lzma;

use std::io::{self, Read, Write};

use crate::{Error, Result};

pub use config::{LzmaSettings, Method, MethodConfiguration, MethodOptions};
pub use copy::{CopyDecoder, CopyEncoder};
pub use delta::DeltaEncoder;
pub use registry::{
    CodecRegistry, DecodeContext, DecodeFn, EncodeContext, EncodeFn, EncoderStage,
    MemoryFn, MethodDescriptor,
};

#[cfg(feature = "bzip2")]
pub use bzip2::Bzip2Decoder;
#[cfg(feature = "deflate")]
pub use deflate::{DeflateDecoder, DeflateEncoder};
#[cfg(feature = "deflate64")]
pub use deflate64::Deflate64Decoder;
#[cfg(feature = "lzma")]
pub use filters::{BcjDecoder, DeltaDecoder};
#[cfg(feature = "lzma")]
pub use lzma::{Lzma2Decoder, Lzma2Encoder, LzmaDecoder, LzmaEncoder};

/// Reads decoded data; the output side of one coder.
pub trait Decoder: Read + Send {
    /// Method ID of this coder.
    fn method_id(&self) -> &'static [u8];
}

/// Accepts plain data and writes encoded data into `W`.
pub trait Encoder<W>: Write + Send {
    /// Method ID of this coder.
    fn method_id(&self) -> &'static [u8];

    /// Flushes trailing state and hands back the destination.
    fn finish(self: Box<Self>) -> io::Result<W>;
}

/// Where an encoding stage writes: the next stage, or the packed bytes.
pub enum StageOutput {
    /// Feeds another encoder, counting the bytes handed to it.
    Stage {
        /// The next stage.
        encoder: Box<dyn Encoder<StageOutput>>,
        /// Bytes written into `encoder` so far.
        consumed: u64,
    },
    /// Collects the packed stream.
    Sink(Vec<u8>),
}

impl std::fmt::Debug for StageOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StageOutput::Stage { consumed, .. } => f
                .debug_struct("Stage")
                .field("consumed", consumed)
                .finish_non_exhaustive(),
            StageOutput::Sink(buf) => f.debug_tuple("Sink").field(&buf.len()).finish(),
        }
    }
}

impl Write for StageOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            StageOutput::Stage { encoder, consumed } => {
                let n = encoder.write(buf)?;
                *consumed += n as u64;
                Ok(n)
            }
            StageOutput::Sink(out) => {
                out.extend_from_slice(buf);
                Ok(buf.len())
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            StageOutput::Stage { encoder, .. } => encoder.flush(),
            StageOutput::Sink(_) => Ok(()),
        }
    }
}

/// Method ID bytes.
pub mod method {
    /// Copy.
    pub const COPY: &[u8] = &[0x00];
    /// Delta filter.
    pub const DELTA: &[u8] = &[0x03];
    /// LZMA2.
    pub const LZMA2: &[u8] = &[0x21];
    /// LZMA.
    pub const LZMA: &[u8] = &[0x03, 0x01, 0x01];
    /// Deflate.
    pub const DEFLATE: &[u8] = &[0x04, 0x01, 0x08];
    /// Deflate64.
    pub const DEFLATE64: &[u8] = &[0x04, 0x01, 0x09];
    /// BZIP2.
    pub const BZIP2: &[u8] = &[0x04, 0x02, 0x02];
    /// BCJ x86.
    pub const BCJ_X86: &[u8] = &[0x03, 0x03, 0x01, 0x03];
    /// BCJ PowerPC.
    pub const BCJ_PPC: &[u8] = &[0x03, 0x03, 0x02, 0x05];
    /// BCJ IA-64.
    pub const BCJ_IA64: &[u8] = &[0x03, 0x03, 0x04, 0x01];
    /// BCJ ARM.
    pub const BCJ_ARM: &[u8] = &[0x03, 0x03, 0x05, 0x01];
    /// BCJ ARM Thumb.
    pub const BCJ_ARM_THUMB: &[u8] = &[0x03, 0x03, 0x07, 0x01];
    /// BCJ SPARC.
    pub const BCJ_SPARC: &[u8] = &[0x03, 0x03, 0x08, 0x05];
    /// AES-256-SHA256.
    pub const AES: &[u8] = &[0x06, 0xF1, 0x07, 0x01];
}

/// Decodes the LZMA2 dictionary-size property byte.
///
/// Even values are `2^(p/2 + 12)`, odd values `3 * 2^(p/2 + 11)`, and 40
/// is `0xFFFF_FFFF`.
pub fn lzma2_dict_size(prop: u8) -> Result<u32> {
    match prop {
        0..=39 => {
            let base = u32::from(prop) / 2 + 12;
            Ok(if prop % 2 == 0 {
                1 << base
            } else {
                3 << (base - 1)
            })
        }
        40 => Ok(u32::MAX),
        _ => Err(Error::InvalidFormat(format!(
            "invalid LZMA2 dictionary property {prop}"
        ))),
    }
}

/// Smallest LZMA2 dictionary property covering `dict_size` bytes.
pub fn lzma2_dict_prop(dict_size: u32) -> u8 {
    (0..40u8)
        .find(|&p| lzma2_dict_size(p).is_ok_and(|size| size >= dict_size))
        .unwrap_or(40)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lzma2_dict_size() {
        assert_eq!(lzma2_dict_size(0).unwrap(), 4096);
        assert_eq!(lzma2_dict_size(1).unwrap(), 6144);
        assert_eq!(lzma2_dict_size(18).unwrap(), 2 << 20);
        assert_eq!(lzma2_dict_size(40).unwrap(), u32::MAX);
        assert!(lzma2_dict_size(41).is_err());
    }

    #[test]
    fn test_lzma2_dict_prop() {
        assert_eq!(lzma2_dict_prop(0), 0);
        assert_eq!(lzma2_dict_prop(4096), 0);
        assert_eq!(lzma2_dict_prop(4097), 1);
        assert_eq!(lzma2_dict_prop(8 << 20), 22);
        assert_eq!(lzma2_dict_prop(u32::MAX), 40);
        for prop in 0..40 {
            assert_eq!(lzma2_dict_prop(lzma2_dict_size(prop).unwrap()), prop);
        }
    }

    #[test]
    fn test_stage_output_counts() {
        let inner = Box::new(CopyEncoder::new(StageOutput::Sink(Vec::new())));
        let mut out = StageOutput::Stage {
            encoder: inner,
            consumed: 0,
        };
        out.write_all(b"abcdef").unwrap();
        let StageOutput::Stage { encoder, consumed } = out else {
            panic!("stage expected");
        };
        assert_eq!(consumed, 6);
        let StageOutput::Sink(bytes) = encoder.finish().unwrap() else {
            panic!("sink expected");
        };
        assert_eq!(bytes, b"abcdef");
    }
}
