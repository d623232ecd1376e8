//! BZIP2 coder: `bzip2` crate for decoding, the native block-sort
//! compressor for encoding.

use std::io::{self, Read, Write};

use ::bzip2::read::MultiBzDecoder;

use crate::bzip2::{Bzip2Encoder, Bzip2Options};
use crate::{Error, Result};

use super::{Decoder, Encoder, MethodOptions, method};

/// BZIP2 decoder; accepts concatenated streams.
pub struct Bzip2Decoder<R> {
    inner: MultiBzDecoder<R>,
}

impl<R> std::fmt::Debug for Bzip2Decoder<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bzip2Decoder").finish_non_exhaustive()
    }
}

impl<R: Read + Send> Bzip2Decoder<R> {
    /// Wraps a BZIP2 stream.
    pub fn new(input: R) -> Self {
        Self {
            inner: MultiBzDecoder::new(input),
        }
    }
}

impl<R: Read + Send> Read for Bzip2Decoder<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl<R: Read + Send> Decoder for Bzip2Decoder<R> {
    fn method_id(&self) -> &'static [u8] {
        method::BZIP2
    }
}

/// Maps stage options to compressor options; the level is the block size
/// in units of 100 000 bytes.
pub(crate) fn encoder_options(options: &MethodOptions) -> Result<Bzip2Options> {
    match *options {
        MethodOptions::None => Ok(Bzip2Options::default()),
        MethodOptions::Level(level @ 1..=9) => Ok(Bzip2Options::new(level)),
        other => Err(Error::InvalidFormat(format!(
            "options {other:?} do not apply to BZIP2"
        ))),
    }
}

impl<W: Write + Send> Encoder<W> for Bzip2Encoder<W> {
    fn method_id(&self) -> &'static [u8] {
        method::BZIP2
    }

    fn finish(self: Box<Self>) -> io::Result<W> {
        (*self).try_finish()
    }
}
