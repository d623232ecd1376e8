//! Native BZIP2 compressor.
//!
//! Produces standard `BZh` streams: run-length pre-coding, the
//! Burrows-Wheeler transform computed by [`BlockSort`], move-to-front with
//! zero-run coding, and up to six Huffman tables per block. Decoding is
//! left to the `bzip2` crate.

mod block_sort;
mod encoder;
mod huffman;

pub use block_sort::{BlockSort, Bwt, MAIN_SORT_THRESHOLD};
pub use encoder::Bzip2Encoder;
pub use huffman::{MAX_CODE_LEN, assign_codes, make_code_lengths};

/// Smallest block size, in units of 100 000 bytes.
pub const MIN_BLOCK_SIZE: u32 = 1;
/// Largest block size, in units of 100 000 bytes.
pub const MAX_BLOCK_SIZE: u32 = 9;

/// Compressor settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bzip2Options {
    block_size_100k: u32,
}

impl Bzip2Options {
    /// Creates options for a block size of `level * 100 000` bytes;
    /// `level` is clamped to 1..=9.
    pub fn new(level: u32) -> Self {
        Self {
            block_size_100k: level.clamp(MIN_BLOCK_SIZE, MAX_BLOCK_SIZE),
        }
    }

    /// Block size in units of 100 000 bytes.
    pub fn block_size_100k(&self) -> u32 {
        self.block_size_100k
    }

    /// Number of run-length coded bytes after which a block is closed.
    ///
    /// Slightly below the nominal size so the last run still fits.
    pub fn max_block_len(&self) -> usize {
        100_000 * self.block_size_100k as usize - 19
    }
}

impl Default for Bzip2Options {
    fn default() -> Self {
        Self::new(MAX_BLOCK_SIZE)
    }
}
