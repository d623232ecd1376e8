//! 7z archive format: constants, binary primitives, the structural model
//! and the header codec.

pub mod files;
pub mod header;
pub mod parser;
pub mod reader;
pub mod streams;

/// The 7z file signature: `'7' 'z' 0xBC 0xAF 0x27 0x1C`.
pub const SIGNATURE: &[u8; 6] = &[0x37, 0x7A, 0xBC, 0xAF, 0x27, 0x1C];

/// Size of the signature header in bytes.
///
/// - 6 bytes: signature
/// - 2 bytes: version (major, minor)
/// - 4 bytes: start header CRC
/// - 8 bytes: next header offset
/// - 8 bytes: next header size
/// - 4 bytes: next header CRC
pub const SIGNATURE_HEADER_SIZE: u64 = 32;

/// Archive version - major.
pub const VERSION_MAJOR: u8 = 0;

/// Archive version - minor.
pub const VERSION_MINOR: u8 = 4;

/// Checks whether `bytes` starts with the 7z signature.
///
/// `length` is the number of valid bytes in `bytes`; fewer than six never
/// match.
///
/// ```rust
/// use archkit::format::{matches, SIGNATURE};
///
/// assert!(matches(SIGNATURE, 6));
/// assert!(!matches(SIGNATURE, 5));
/// assert!(!matches(&[1, 2, 3, 4, 5, 6], 6));
/// ```
pub fn matches(bytes: &[u8], length: usize) -> bool {
    length >= SIGNATURE.len() && bytes.len() >= SIGNATURE.len() && bytes[..6] == SIGNATURE[..]
}

/// Property IDs used in 7z archive headers.
pub mod property_id {
    /// End of a section.
    pub const END: u8 = 0x00;
    /// Plain header.
    pub const HEADER: u8 = 0x01;
    /// Archive properties.
    pub const ARCHIVE_PROPERTIES: u8 = 0x02;
    /// Additional streams info.
    pub const ADDITIONAL_STREAMS_INFO: u8 = 0x03;
    /// Main streams info.
    pub const MAIN_STREAMS_INFO: u8 = 0x04;
    /// Files info.
    pub const FILES_INFO: u8 = 0x05;
    /// Pack info.
    pub const PACK_INFO: u8 = 0x06;
    /// Unpack info.
    pub const UNPACK_INFO: u8 = 0x07;
    /// Substreams info.
    pub const SUBSTREAMS_INFO: u8 = 0x08;
    /// Sizes.
    pub const SIZE: u8 = 0x09;
    /// CRCs.
    pub const CRC: u8 = 0x0A;
    /// Folder definitions.
    pub const FOLDER: u8 = 0x0B;
    /// Coder unpack sizes.
    pub const CODERS_UNPACK_SIZE: u8 = 0x0C;
    /// Number of unpack streams per folder.
    pub const NUM_UNPACK_STREAM: u8 = 0x0D;
    /// Empty stream flags.
    pub const EMPTY_STREAM: u8 = 0x0E;
    /// Empty file flags.
    pub const EMPTY_FILE: u8 = 0x0F;
    /// Anti-item flags.
    pub const ANTI: u8 = 0x10;
    /// File names.
    pub const NAME: u8 = 0x11;
    /// Creation times.
    pub const CTIME: u8 = 0x12;
    /// Access times.
    pub const ATIME: u8 = 0x13;
    /// Modification times.
    pub const MTIME: u8 = 0x14;
    /// Windows attributes.
    pub const WIN_ATTRIBUTES: u8 = 0x15;
    /// Comment.
    pub const COMMENT: u8 = 0x16;
    /// Encoded (compressed) header.
    pub const ENCODED_HEADER: u8 = 0x17;
    /// Start positions.
    pub const START_POS: u8 = 0x18;
    /// Padding.
    pub const DUMMY: u8 = 0x19;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_check() {
        assert!(matches(SIGNATURE, SIGNATURE.len()));
        assert!(matches(SIGNATURE, SIGNATURE.len() + 1));
        assert!(!matches(SIGNATURE, SIGNATURE.len() - 1));
        assert!(!matches(&[1, 2, 3, 4, 5, 6], 6));
        assert!(matches(&[b'7', b'z', 0xBC, 0xAF, 0x27, 0x1C], 6));
        assert!(!matches(&[b'7', b'z', 0xBC, 0xAF, 0x27, 0x1D], 6));
    }

    #[test]
    fn test_signature_check_short_buffer() {
        let mut bytes = [0u8; 8];
        bytes[0] = 78;
        assert!(!matches(&bytes, 78));
        assert!(!matches(&SIGNATURE[..3], 6));
        assert!(!matches(&[], 0));
    }

    #[test]
    fn test_property_ids() {
        assert_eq!(property_id::END, 0x00);
        assert_eq!(property_id::ENCODED_HEADER, 0x17);
        assert_eq!(property_id::DUMMY, 0x19);
    }
}
