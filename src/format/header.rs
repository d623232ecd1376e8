//! The 32-byte signature header at the start of every 7z archive.

use std::io::Read;

use crate::checksum::Crc32;
use crate::{Error, Result};

use super::reader::{read_u8, read_u32_le};
use super::{SIGNATURE, SIGNATURE_HEADER_SIZE, VERSION_MAJOR, VERSION_MINOR};

/// The start header: version plus the location and CRC of the end header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartHeader {
    /// Archive format version - major number.
    pub version_major: u8,
    /// Archive format version - minor number.
    pub version_minor: u8,
    /// Offset of the end header, relative to the end of the signature header.
    pub next_header_offset: u64,
    /// Size of the end header blob.
    pub next_header_size: u64,
    /// CRC of the end header blob.
    pub next_header_crc: u32,
    unfinished: bool,
}

impl StartHeader {
    /// Creates a start header pointing at an end header.
    pub fn new(next_header_offset: u64, next_header_size: u64, next_header_crc: u32) -> Self {
        Self {
            version_major: VERSION_MAJOR,
            version_minor: VERSION_MINOR,
            next_header_offset,
            next_header_size,
            next_header_crc,
            unfinished: false,
        }
    }

    /// Parses the signature and start header.
    ///
    /// A signature mismatch is [`Error::InvalidFormat`]; a start header CRC
    /// mismatch is [`Error::CrcMismatch`]. An archive whose writer never
    /// finished has an all-zero start header; that parses successfully and
    /// reports [`StartHeader::is_unfinished`].
    pub fn parse<R: Read>(r: &mut R) -> Result<Self> {
        let mut sig = [0u8; 6];
        r.read_exact(&mut sig).map_err(|_| {
            Error::InvalidFormat("file too short for a 7z signature".into())
        })?;
        if sig != *SIGNATURE {
            return Err(Error::InvalidFormat("invalid 7z signature".into()));
        }

        let version_major = read_u8(r)?;
        let version_minor = read_u8(r)?;
        if version_major != VERSION_MAJOR {
            return Err(Error::UnsupportedFeature {
                feature: "archive major version",
            });
        }

        let start_header_crc = read_u32_le(r)?;
        let mut body = [0u8; 20];
        r.read_exact(&mut body).map_err(|_| Error::Truncated {
            needed: 20,
            context: "start header",
        })?;

        let unfinished = start_header_crc == 0 && body.iter().all(|&b| b == 0);
        if !unfinished {
            let actual = Crc32::compute(&body);
            if actual != start_header_crc {
                return Err(Error::CrcMismatch {
                    entry_index: None,
                    entry_name: None,
                    expected: start_header_crc,
                    actual,
                });
            }
        }

        let [o0, o1, o2, o3, o4, o5, o6, o7, s0, s1, s2, s3, s4, s5, s6, s7, c0, c1, c2, c3] = body;
        Ok(Self {
            version_major,
            version_minor,
            next_header_offset: u64::from_le_bytes([o0, o1, o2, o3, o4, o5, o6, o7]),
            next_header_size: u64::from_le_bytes([s0, s1, s2, s3, s4, s5, s6, s7]),
            next_header_crc: u32::from_le_bytes([c0, c1, c2, c3]),
            unfinished,
        })
    }

    /// Serializes the signature header including both CRCs.
    pub fn to_bytes(&self) -> [u8; SIGNATURE_HEADER_SIZE as usize] {
        let mut body = [0u8; 20];
        body[..8].copy_from_slice(&self.next_header_offset.to_le_bytes());
        body[8..16].copy_from_slice(&self.next_header_size.to_le_bytes());
        body[16..].copy_from_slice(&self.next_header_crc.to_le_bytes());

        let mut out = [0u8; SIGNATURE_HEADER_SIZE as usize];
        out[..6].copy_from_slice(SIGNATURE);
        out[6] = self.version_major;
        out[7] = self.version_minor;
        out[8..12].copy_from_slice(&Crc32::compute(&body).to_le_bytes());
        out[12..].copy_from_slice(&body);
        out
    }

    /// Whether the archive was never finished: every field, including the
    /// start header CRC, is zero.
    ///
    /// An empty archive stores zero fields too, but with a valid CRC.
    pub fn is_unfinished(&self) -> bool {
        self.unfinished
    }

    /// Absolute file position of the end header.
    pub fn next_header_position(&self) -> Option<u64> {
        SIGNATURE_HEADER_SIZE.checked_add(self.next_header_offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_round_trip() {
        let header = StartHeader::new(1234, 56, 0xDEAD_BEEF);
        let bytes = header.to_bytes();
        assert_eq!(&bytes[..6], SIGNATURE);
        let parsed = StartHeader::parse(&mut Cursor::new(bytes)).unwrap();
        assert_eq!(parsed, header);
        assert_eq!(parsed.next_header_position(), Some(32 + 1234));
    }

    #[test]
    fn test_invalid_signature() {
        let mut bytes = StartHeader::new(0, 0, 0).to_bytes();
        bytes[5] = 0x1D;
        assert!(matches!(
            StartHeader::parse(&mut Cursor::new(bytes)),
            Err(Error::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_crc_mismatch() {
        let mut bytes = StartHeader::new(10, 20, 30).to_bytes();
        bytes[20] ^= 0xFF;
        assert!(matches!(
            StartHeader::parse(&mut Cursor::new(bytes)),
            Err(Error::CrcMismatch {
                entry_index: None,
                ..
            })
        ));
    }

    #[test]
    fn test_unfinished_header() {
        let mut bytes = [0u8; 32];
        bytes[..6].copy_from_slice(SIGNATURE);
        bytes[7] = VERSION_MINOR;
        let parsed = StartHeader::parse(&mut Cursor::new(bytes)).unwrap();
        assert!(parsed.is_unfinished());

        let empty = StartHeader::new(0, 0, 0).to_bytes();
        let parsed = StartHeader::parse(&mut Cursor::new(empty)).unwrap();
        assert!(!parsed.is_unfinished());
        assert_eq!(parsed.next_header_size, 0);
    }

    #[test]
    fn test_truncated() {
        let bytes = StartHeader::new(1, 2, 3).to_bytes();
        assert!(matches!(
            StartHeader::parse(&mut Cursor::new(&bytes[..20])),
            Err(Error::Truncated { .. })
        ));
    }
}
