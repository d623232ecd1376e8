//! The COPY method.

use std::io::{self, Read, Write};

use super::{Decoder, Encoder, method};

/// Passes stored data through, stopping after the declared size.
pub struct CopyDecoder<R> {
    inner: R,
    remaining: u64,
}

impl<R: Read + Send> CopyDecoder<R> {
    /// Reads at most `size` bytes from `inner`.
    pub fn new(inner: R, size: u64) -> Self {
        Self {
            inner,
            remaining: size,
        }
    }
}

impl<R: Read + Send> Read for CopyDecoder<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.remaining == 0 || buf.is_empty() {
            return Ok(0);
        }
        let max = usize::try_from(self.remaining).unwrap_or(usize::MAX).min(buf.len());
        let n = self.inner.read(&mut buf[..max])?;
        self.remaining -= n as u64;
        Ok(n)
    }
}

impl<R: Read + Send> Decoder for CopyDecoder<R> {
    fn method_id(&self) -> &'static [u8] {
        method::COPY
    }
}

/// Writes data through unchanged.
#[derive(Debug)]
pub struct CopyEncoder<W> {
    inner: W,
}

impl<W: Write + Send> CopyEncoder<W> {
    /// Wraps the destination.
    pub fn new(inner: W) -> Self {
        Self { inner }
    }
}

impl<W: Write + Send> Write for CopyEncoder<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl<W: Write + Send> Encoder<W> for CopyEncoder<W> {
    fn method_id(&self) -> &'static [u8] {
        method::COPY
    }

    fn finish(self: Box<Self>) -> io::Result<W> {
        Ok(self.inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_copy_stops_at_size() {
        let mut decoder = CopyDecoder::new(Cursor::new(b"Hello, World!".to_vec()), 5);
        let mut output = Vec::new();
        decoder.read_to_end(&mut output).unwrap();
        assert_eq!(output, b"Hello");
    }

    #[test]
    fn test_copy_empty() {
        let mut decoder = CopyDecoder::new(Cursor::new(Vec::new()), 0);
        let mut output = Vec::new();
        decoder.read_to_end(&mut output).unwrap();
        assert!(output.is_empty());
        assert_eq!(decoder.method_id(), method::COPY);
    }

    #[test]
    fn test_copy_encoder() {
        let mut encoder = Box::new(CopyEncoder::new(Vec::new()));
        encoder.write_all(b"stored").unwrap();
        assert_eq!(encoder.finish().unwrap(), b"stored");
    }
}
