//! Deflate64 decoder backed by the `deflate64` crate.
//!
//! Deflate64 widens the Deflate window to 64 KiB and gives length code 285
//! sixteen extra bits. Only decoding is offered.

use std::io::{self, BufReader, Read};

use deflate64::Deflate64Decoder as InflateDecoder;

use super::{Decoder, method};

/// Deflate64 decoder.
pub struct Deflate64Decoder<R> {
    inner: InflateDecoder<BufReader<R>>,
}

impl<R> std::fmt::Debug for Deflate64Decoder<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deflate64Decoder").finish_non_exhaustive()
    }
}

impl<R: Read + Send> Deflate64Decoder<R> {
    /// Wraps a raw Deflate64 stream.
    pub fn new(input: R) -> Self {
        Self {
            inner: InflateDecoder::with_buffer(BufReader::new(input)),
        }
    }
}

impl<R: Read + Send> Read for Deflate64Decoder<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl<R: Read + Send> Decoder for Deflate64Decoder<R> {
    fn method_id(&self) -> &'static [u8] {
        method::DEFLATE64
    }
}
