//! Raw Deflate coder backed by `flate2`.

use std::io::{self, BufReader, Read, Write};

use flate2::Compression;
use flate2::bufread::DeflateDecoder as FlateDecoder;
use flate2::write::DeflateEncoder as FlateEncoder;

use crate::{Error, Result};

use super::{Decoder, Encoder, MethodOptions, method};

/// Deflate decoder.
pub struct DeflateDecoder<R> {
    inner: FlateDecoder<BufReader<R>>,
}

impl<R> std::fmt::Debug for DeflateDecoder<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeflateDecoder").finish_non_exhaustive()
    }
}

impl<R: Read + Send> DeflateDecoder<R> {
    /// Wraps a raw Deflate stream.
    pub fn new(input: R) -> Self {
        Self {
            inner: FlateDecoder::new(BufReader::new(input)),
        }
    }
}

impl<R: Read + Send> Read for DeflateDecoder<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl<R: Read + Send> Decoder for DeflateDecoder<R> {
    fn method_id(&self) -> &'static [u8] {
        method::DEFLATE
    }
}

/// Deflate encoder; level 6 unless configured.
pub struct DeflateEncoder<W: Write> {
    inner: FlateEncoder<W>,
}

impl<W: Write> std::fmt::Debug for DeflateEncoder<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeflateEncoder").finish_non_exhaustive()
    }
}

impl<W: Write + Send> DeflateEncoder<W> {
    /// Creates an encoder; accepts [`MethodOptions::Level`] 0-9.
    pub fn new(output: W, options: &MethodOptions) -> Result<Self> {
        let level = match *options {
            MethodOptions::None => 6,
            MethodOptions::Level(level) if level <= 9 => level,
            other => {
                return Err(Error::InvalidFormat(format!(
                    "options {other:?} do not apply to Deflate"
                )));
            }
        };
        Ok(Self {
            inner: FlateEncoder::new(output, Compression::new(level)),
        })
    }
}

impl<W: Write + Send> Write for DeflateEncoder<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl<W: Write + Send> Encoder<W> for DeflateEncoder<W> {
    fn method_id(&self) -> &'static [u8] {
        method::DEFLATE
    }

    fn finish(self: Box<Self>) -> io::Result<W> {
        self.inner.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_deflate_round_trip() {
        let data = b"Deflate round trip, Deflate round trip, Deflate round trip.".repeat(20);
        let mut encoder = Box::new(DeflateEncoder::new(Vec::new(), &MethodOptions::Level(9)).unwrap());
        encoder.write_all(&data).unwrap();
        let compressed = encoder.finish().unwrap();
        assert!(compressed.len() < data.len());

        let mut decoder = DeflateDecoder::new(Cursor::new(compressed));
        let mut output = Vec::new();
        decoder.read_to_end(&mut output).unwrap();
        assert_eq!(output, data);
    }

    #[test]
    fn test_rejects_bad_level() {
        assert!(DeflateEncoder::new(Vec::new(), &MethodOptions::Level(10)).is_err());
        assert!(DeflateEncoder::new(Vec::new(), &MethodOptions::DictSize(1)).is_err());
    }
}
