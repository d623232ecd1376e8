//! Low-level binary primitives for the 7z header format.
//!
//! Readers take any [`Read`] and report short input as
//! [`Error::Truncated`]; writers append to a `Vec<u8>` since headers are
//! always assembled in memory.

use std::io::{self, Read};

use crate::{Error, Result};

fn short_read(e: io::Error, context: &'static str) -> Error {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        Error::Truncated { needed: 0, context }
    } else {
        Error::Io(e)
    }
}

/// Reads a 7z variable-length number.
///
/// The count of leading one bits in the first byte is the number of extra
/// little-endian bytes that follow. The bits of the first byte below that
/// marker supply the most significant part of the value.
///
/// - `0xxxxxxx`: 0..=127
/// - `10xxxxxx` + 1 byte: up to 2^14 - 1
/// - `11111111` + 8 bytes: full u64
pub fn read_number<R: Read>(r: &mut R) -> Result<u64> {
    let first = u64::from(read_u8(r)?);
    let mut mask = 0x80u64;
    let mut value = 0u64;

    for i in 0..8 {
        if first & mask == 0 {
            return Ok(value | ((first & (mask - 1)) << (8 * i)));
        }
        let next = u64::from(read_u8(r)?);
        value |= next << (8 * i);
        mask >>= 1;
    }

    Ok(value)
}

/// Reads a number and checks it fits in `usize` and below `limit`.
pub fn read_count<R: Read>(r: &mut R, limit: usize, what: &'static str) -> Result<usize> {
    let value = read_number(r)?;
    match usize::try_from(value) {
        Ok(n) if n <= limit => Ok(n),
        _ => Err(Error::ResourceLimitExceeded(format!(
            "{} count {} exceeds limit {}",
            what, value, limit
        ))),
    }
}

/// Appends a number in the minimal-length 7z variable encoding.
pub fn write_number(out: &mut Vec<u8>, value: u64) {
    let mut first = 0u8;
    let mut mask = 0x80u8;
    let mut extra = 0usize;

    while extra < 8 {
        if value < 1u64 << (7 * (extra + 1)) {
            first |= (value >> (8 * extra)) as u8;
            break;
        }
        first |= mask;
        mask >>= 1;
        extra += 1;
    }

    out.push(first);
    out.extend_from_slice(&value.to_le_bytes()[..extra]);
}

/// Reads a single byte.
pub fn read_u8<R: Read>(r: &mut R) -> Result<u8> {
    let mut buf = [0u8; 1];
    r.read_exact(&mut buf)
        .map_err(|e| short_read(e, "header byte"))?;
    Ok(buf[0])
}

/// Reads an unsigned 32-bit little-endian integer.
pub fn read_u32_le<R: Read>(r: &mut R) -> Result<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf).map_err(|e| short_read(e, "u32"))?;
    Ok(u32::from_le_bytes(buf))
}

/// Reads an unsigned 64-bit little-endian integer.
pub fn read_u64_le<R: Read>(r: &mut R) -> Result<u64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf).map_err(|e| short_read(e, "u64"))?;
    Ok(u64::from_le_bytes(buf))
}

/// Decodes a big-endian integer of up to 8 bytes.
pub fn from_be_bytes(bytes: &[u8]) -> u64 {
    bytes
        .iter()
        .take(8)
        .fold(0u64, |acc, &b| (acc << 8) | u64::from(b))
}

/// Reads exactly `count` bytes.
///
/// The buffer grows with the data actually present, so a corrupt length
/// field cannot force a huge allocation up front.
pub fn read_bytes<R: Read>(r: &mut R, count: u64) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    r.by_ref().take(count).read_to_end(&mut buf)?;
    if (buf.len() as u64) < count {
        return Err(Error::Truncated {
            needed: count - buf.len() as u64,
            context: "header property",
        });
    }
    Ok(buf)
}

/// Reads a bit vector of `count` entries, most significant bit first.
pub fn read_bool_vector<R: Read>(r: &mut R, count: usize) -> Result<Vec<bool>> {
    let bytes = read_bytes(r, count.div_ceil(8) as u64)?;
    Ok((0..count)
        .map(|i| (bytes[i / 8] >> (7 - (i % 8))) & 1 != 0)
        .collect())
}

/// Reads the "all defined" marker byte and, if it is zero, a bit vector.
pub fn read_all_or_bits<R: Read>(r: &mut R, count: usize) -> Result<Vec<bool>> {
    if read_u8(r)? != 0 {
        Ok(vec![true; count])
    } else {
        read_bool_vector(r, count)
    }
}

/// Appends a bit vector, most significant bit first, padded to a byte.
pub fn write_bool_vector(out: &mut Vec<u8>, bits: &[bool]) {
    for chunk in bits.chunks(8) {
        let byte = chunk
            .iter()
            .enumerate()
            .fold(0u8, |acc, (i, &bit)| acc | (u8::from(bit) << (7 - i)));
        out.push(byte);
    }
}

/// Appends an "all defined" marker, followed by the bits unless all are set.
pub fn write_all_or_bits(out: &mut Vec<u8>, bits: &[bool]) {
    if bits.iter().all(|&b| b) {
        out.push(1);
    } else {
        out.push(0);
        write_bool_vector(out, bits);
    }
}

/// Encodes a string as UTF-16LE with a terminating NUL.
pub fn encode_utf16_name(out: &mut Vec<u8>, name: &str) {
    for unit in name.encode_utf16() {
        out.extend_from_slice(&unit.to_le_bytes());
    }
    out.extend_from_slice(&[0, 0]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn number(bytes: &[u8]) -> Result<u64> {
        read_number(&mut Cursor::new(bytes))
    }

    #[test]
    fn test_number_single_byte() {
        assert_eq!(number(&[0x00]).unwrap(), 0);
        assert_eq!(number(&[0x7F]).unwrap(), 127);
    }

    #[test]
    fn test_number_two_bytes() {
        assert_eq!(number(&[0x80, 0x80]).unwrap(), 128);
        assert_eq!(number(&[0xBF, 0xFF]).unwrap(), 16383);
    }

    #[test]
    fn test_number_full_width() {
        assert_eq!(number(&[0xFF; 9]).unwrap(), u64::MAX);
    }

    #[test]
    fn test_number_round_trip_is_minimal() {
        let cases: [(u64, usize); 8] = [
            (0, 1),
            (127, 1),
            (128, 2),
            (16383, 2),
            (16384, 3),
            (2_097_152, 4),
            (u64::from(u32::MAX), 5),
            (u64::MAX, 9),
        ];
        for (value, len) in cases {
            let mut buf = Vec::new();
            write_number(&mut buf, value);
            assert_eq!(buf.len(), len, "length for {}", value);
            assert_eq!(number(&buf).unwrap(), value);
        }
    }

    #[test]
    fn test_number_truncated() {
        assert!(matches!(number(&[0x80]), Err(Error::Truncated { .. })));
        assert!(matches!(number(&[]), Err(Error::Truncated { .. })));
    }

    #[test]
    fn test_read_count_limit() {
        let mut buf = Vec::new();
        write_number(&mut buf, 1_000);
        let err = read_count(&mut Cursor::new(&buf), 10, "files").unwrap_err();
        assert!(matches!(err, Error::ResourceLimitExceeded(_)));
    }

    #[test]
    fn test_little_endian_readers() {
        let data = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08];
        assert_eq!(read_u32_le(&mut Cursor::new(&data)).unwrap(), 0x04030201);
        assert_eq!(
            read_u64_le(&mut Cursor::new(&data)).unwrap(),
            0x0807060504030201
        );
        assert_eq!(from_be_bytes(&[0x03, 0x01, 0x01]), 0x030101);
    }

    #[test]
    fn test_bool_vector() {
        let data = [0b1011_0001u8, 0b1100_0000];
        let bits = read_bool_vector(&mut Cursor::new(&data), 10).unwrap();
        assert_eq!(
            bits,
            vec![true, false, true, true, false, false, false, true, true, true]
        );
        let mut out = Vec::new();
        write_bool_vector(&mut out, &bits);
        assert_eq!(out, data);
    }

    #[test]
    fn test_all_or_bits() {
        assert_eq!(
            read_all_or_bits(&mut Cursor::new(&[0x01u8]), 3).unwrap(),
            vec![true; 3]
        );
        assert_eq!(
            read_all_or_bits(&mut Cursor::new(&[0x00u8, 0b1010_0000]), 3).unwrap(),
            vec![true, false, true]
        );

        let mut out = Vec::new();
        write_all_or_bits(&mut out, &[true, true]);
        assert_eq!(out, [1]);
        out.clear();
        write_all_or_bits(&mut out, &[false, true]);
        assert_eq!(out, [0, 0b0100_0000]);
    }

    #[test]
    fn test_read_bytes_short() {
        let err = read_bytes(&mut Cursor::new(&[1u8, 2]), 5).unwrap_err();
        assert!(matches!(err, Error::Truncated { needed: 3, .. }));
    }

    #[test]
    fn test_utf16_name() {
        let mut out = Vec::new();
        encode_utf16_name(&mut out, "ab");
        assert_eq!(out, [b'a', 0, b'b', 0, 0, 0]);
    }
}
