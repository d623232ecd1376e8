//! LZ4 block format.
//!
//! [`BlockLz4Encoder`] turns the event stream of an
//! [`Lz77Compressor`](crate::lz77::Lz77Compressor) into LZ4 sequences. The
//! block format requires the last five bytes to be literals and the last
//! match to start at least twelve bytes before the end; pairs near the
//! end are held back and rewritten when the stream is finished.
//!
//! Decoding uses the `lz4_flex` crate.

mod encoder;
mod pair;

pub use encoder::BlockLz4Encoder;

#[cfg(feature = "lz4")]
use crate::{Error, Result};

/// Shortest match the block format can express.
pub const MIN_BACK_REFERENCE_LENGTH: usize = 4;
/// Distance from the end of the block that the last match must keep.
pub const MIN_OFFSET_OF_LAST_BACK_REFERENCE: usize = 12;
/// Largest back-reference distance plus one.
pub const WINDOW_SIZE: usize = 1 << 16;

const SIZE_MASK: usize = 15;

/// Decompresses one LZ4 block whose decoded size is known.
#[cfg(feature = "lz4")]
pub fn decompress_block(src: &[u8], uncompressed_size: usize) -> Result<Vec<u8>> {
    let out = lz4_flex::block::decompress(src, uncompressed_size)
        .map_err(|e| Error::InvalidFormat(format!("LZ4 block: {e}")))?;
    if out.len() != uncompressed_size {
        return Err(Error::InvalidFormat(format!(
            "LZ4 block decoded to {} bytes, expected {}",
            out.len(),
            uncompressed_size
        )));
    }
    Ok(out)
}

/// Compresses `data` into a single LZ4 block.
pub fn compress_block(data: &[u8]) -> std::io::Result<Vec<u8>> {
    use std::io::Write;

    let mut encoder = BlockLz4Encoder::new(Vec::new());
    encoder.write_all(data)?;
    encoder.finish()
}
