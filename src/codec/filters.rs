//! Filter decoders backed by `lzma-rust2`: the branch converters (BCJ)
//! and DELTA.
//!
//! The converters rewrite relative branch targets of machine code into
//! absolute ones so repeated calls compress better. Only decoding is
//! offered for them; DELTA is encoded natively in [`super::DeltaEncoder`].

use std::io::{self, Read};

use lzma_rust2::filter::bcj::BcjReader;
use lzma_rust2::filter::delta::DeltaReader;

use crate::{Error, Result};

use super::{Decoder, Method, delta, method};

/// A BCJ filter decoder for one architecture.
pub struct BcjDecoder<R> {
    inner: BcjReader<R>,
    method_id: &'static [u8],
}

impl<R> std::fmt::Debug for BcjDecoder<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BcjDecoder")
            .field("method", &method_name(self.method_id))
            .finish_non_exhaustive()
    }
}

fn method_name(id: &[u8]) -> &'static str {
    Method::from_id(id).map_or("unknown", Method::name)
}

impl<R: Read + Send> BcjDecoder<R> {
    /// Creates the decoder for a BCJ method.
    ///
    /// Non-BCJ methods are [`Error::UnsupportedMethod`].
    pub fn new(input: R, which: Method) -> Result<Self> {
        let inner = match which {
            Method::BcjX86 => BcjReader::new_x86(input, 0),
            Method::BcjArm => BcjReader::new_arm(input, 0),
            Method::BcjArmThumb => BcjReader::new_arm_thumb(input, 0),
            Method::BcjPpc => BcjReader::new_ppc(input, 0),
            Method::BcjSparc => BcjReader::new_sparc(input, 0),
            Method::BcjIa64 => BcjReader::new_ia64(input, 0),
            other => {
                return Err(Error::UnsupportedMethod {
                    method_id: crate::format::reader::from_be_bytes(other.id()),
                });
            }
        };
        Ok(Self {
            inner,
            method_id: which.id(),
        })
    }
}

impl<R: Read + Send> Read for BcjDecoder<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl<R: Read + Send> Decoder for BcjDecoder<R> {
    fn method_id(&self) -> &'static [u8] {
        self.method_id
    }
}

/// Undoes the DELTA filter.
pub struct DeltaDecoder<R> {
    inner: DeltaReader<R>,
    distance: usize,
}

impl<R> std::fmt::Debug for DeltaDecoder<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeltaDecoder")
            .field("distance", &self.distance)
            .finish_non_exhaustive()
    }
}

impl<R: Read + Send> DeltaDecoder<R> {
    /// Creates a decoder from the coder properties (`distance - 1`).
    pub fn new(input: R, properties: &[u8]) -> Result<Self> {
        Ok(Self::with_distance(
            input,
            delta::distance_from_properties(properties)?,
        ))
    }

    /// Creates a decoder for `distance` (1 to 256).
    pub fn with_distance(input: R, distance: usize) -> Self {
        Self {
            inner: DeltaReader::new(input, distance),
            distance,
        }
    }
}

impl<R: Read + Send> Read for DeltaDecoder<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl<R: Read + Send> Decoder for DeltaDecoder<R> {
    fn method_id(&self) -> &'static [u8] {
        method::DELTA
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_plain_bytes_pass_through() {
        // No opcode in this input is a branch on any architecture.
        let data = vec![0u8; 64];
        for which in [
            Method::BcjX86,
            Method::BcjArm,
            Method::BcjArmThumb,
            Method::BcjPpc,
            Method::BcjSparc,
            Method::BcjIa64,
        ] {
            let mut decoder = BcjDecoder::new(Cursor::new(data.clone()), which).unwrap();
            assert_eq!(decoder.method_id(), which.id());
            let mut output = Vec::new();
            decoder.read_to_end(&mut output).unwrap();
            assert_eq!(output, data, "{which}");
        }
    }

    fn undelta(encoded: Vec<u8>, properties: &[u8]) -> Vec<u8> {
        let mut decoder = DeltaDecoder::new(Cursor::new(encoded), properties).unwrap();
        assert_eq!(decoder.method_id(), method::DELTA);
        let mut output = Vec::new();
        decoder.read_to_end(&mut output).unwrap();
        output
    }

    #[test]
    fn test_delta_distance_one() {
        assert_eq!(undelta(vec![1, 2, 3, 4], &[0]), [1, 3, 6, 10]);
        assert_eq!(undelta(vec![1, 2, 3, 4], &[]), [1, 3, 6, 10]);
    }

    #[test]
    fn test_delta_distance_two() {
        assert_eq!(undelta(vec![10, 20, 1, 2, 1], &[1]), [10, 20, 11, 22, 12]);
    }

    #[test]
    fn test_delta_matches_native_encoder() {
        use std::io::Write;

        use crate::codec::{DeltaEncoder, Encoder};

        let data: Vec<u8> = (0..2000u32).map(|i| (i * 31 % 253) as u8).collect();
        for distance in [1u32, 2, 4, 255, 256] {
            let mut encoder = Box::new(DeltaEncoder::new(Vec::new(), distance).unwrap());
            for chunk in data.chunks(7) {
                encoder.write_all(chunk).unwrap();
            }
            let props = encoder.properties();
            let encoded = encoder.finish().unwrap();
            assert_eq!(undelta(encoded, &props), data, "distance {distance}");
        }
    }

    #[test]
    fn test_delta_rejects_long_properties() {
        let result = DeltaDecoder::new(Cursor::new(Vec::new()), &[1, 2]);
        assert!(matches!(result, Err(Error::InvalidFormat(_))));
    }

    #[test]
    fn test_rejects_non_bcj() {
        let result = BcjDecoder::new(Cursor::new(Vec::new()), Method::Lzma2);
        assert!(matches!(result, Err(Error::UnsupportedMethod { method_id: 0x21 })));
        assert_eq!(method_name(method::BCJ_X86), "BCJ_X86");
    }
}
