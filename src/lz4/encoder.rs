//! LZ4 block writer.

use std::collections::VecDeque;
use std::io::{self, Write};
use std::sync::Arc;

use super::pair::{BackReference, Pair};
use super::{MIN_BACK_REFERENCE_LENGTH, MIN_OFFSET_OF_LAST_BACK_REFERENCE, WINDOW_SIZE};
use crate::Result;
use crate::lz77::{Block, BlockSink, Lz77Compressor, Parameters};

/// Compresses everything written to it into one LZ4 block.
///
/// Output only becomes complete with [`finish`](Self::finish); pairs
/// close to the current end are buffered because a later end of data may
/// force them to be rewritten.
pub struct BlockLz4Encoder<W: Write> {
    compressor: Lz77Compressor,
    sink: PairWriter<W>,
}

impl<W: Write> BlockLz4Encoder<W> {
    /// Creates an encoder with the default LZ4 matcher settings.
    pub fn new(output: W) -> Self {
        Self::with_parameters(output, Parameters::lz4())
    }

    /// Creates an encoder with custom matcher settings.
    ///
    /// Settings that do not fit the block format are not rejected here; use
    /// [`Parameters::lz4`] as a base.
    pub fn with_parameters(output: W, params: Parameters) -> Self {
        Self {
            compressor: Lz77Compressor::new(params),
            sink: PairWriter {
                out: output,
                pairs: VecDeque::new(),
                expanded: VecDeque::new(),
            },
        }
    }

    /// Seeds the window with a dictionary; must precede any write.
    pub fn prefill(&mut self, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        self.compressor.prefill(data)?;
        let len = data.len().min(WINDOW_SIZE);
        self.sink.record(Arc::from(&data[data.len() - len..]));
        Ok(())
    }

    /// Writes the held-back pairs and returns the output.
    pub fn finish(mut self) -> io::Result<W> {
        self.compressor.finish(&mut self.sink)?;
        self.sink.out.flush()?;
        Ok(self.sink.out)
    }
}

impl<W: Write> Write for BlockLz4Encoder<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.compressor.compress(buf, &mut self.sink)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.sink.out.flush()
    }
}

impl<W: Write> std::fmt::Debug for BlockLz4Encoder<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockLz4Encoder")
            .field("compressor", &self.compressor)
            .field("pending_pairs", &self.sink.pairs.len())
            .finish_non_exhaustive()
    }
}

/// Receives matcher events and keeps the data needed to rewrite the tail.
struct PairWriter<W> {
    out: W,
    pairs: VecDeque<Pair>,
    /// Decoded data, newest chunk first, covering at least one window.
    expanded: VecDeque<Arc<[u8]>>,
}

impl<W: Write> BlockSink for PairWriter<W> {
    fn accept(&mut self, block: Block<'_>) -> io::Result<()> {
        match block {
            Block::Literal(bytes) => {
                self.write_writable_pairs(bytes.len())?;
                let chunk: Arc<[u8]> = Arc::from(bytes);
                self.unfinished_pair().add_literal(Arc::clone(&chunk));
                self.record(chunk);
                self.clear_unused();
            }
            Block::BackReference { offset, length } => {
                self.write_writable_pairs(length)?;
                self.unfinished_pair()
                    .set_back_reference(BackReference { offset, length });
                let chunk = self.expand(offset, length);
                self.record(chunk);
                self.clear_unused();
            }
            Block::Eod => self.write_final_pairs()?,
        }
        Ok(())
    }
}

impl<W: Write> PairWriter<W> {
    fn record(&mut self, chunk: Arc<[u8]>) {
        self.expanded.push_front(chunk);
    }

    /// The last pair if it can still take literals, otherwise a new one.
    fn unfinished_pair(&mut self) -> &mut Pair {
        if self.pairs.back().is_none_or(Pair::has_back_reference) {
            self.pairs.push_back(Pair::default());
        }
        // The branch above guarantees a last element.
        let last = self.pairs.len() - 1;
        &mut self.pairs[last]
    }

    fn write_writable_pairs(&mut self, length_of_blocks_after: usize) -> io::Result<()> {
        let mut unwritten_length = length_of_blocks_after
            + self
                .pairs
                .iter()
                .rev()
                .take_while(|p| !p.has_been_written())
                .map(Pair::length)
                .sum::<usize>();
        for pair in self.pairs.iter_mut().filter(|p| !p.has_been_written()) {
            unwritten_length -= pair.length();
            if !pair.can_be_written(unwritten_length) {
                break;
            }
            pair.write_to(&mut self.out)?;
        }
        Ok(())
    }

    fn write_final_pairs(&mut self) -> io::Result<()> {
        self.rewrite_last_pairs();
        for pair in self.pairs.iter_mut().filter(|p| !p.has_been_written()) {
            pair.write_to(&mut self.out)?;
        }
        self.pairs.clear();
        Ok(())
    }

    fn clear_unused(&mut self) {
        let mut total = 0;
        let keep = self
            .expanded
            .iter()
            .position(|chunk| {
                total += chunk.len();
                total >= WINDOW_SIZE
            })
            .map_or(self.expanded.len(), |i| i + 1);
        self.expanded.truncate(keep);

        let mut total = 0;
        let keep = self
            .pairs
            .iter()
            .rev()
            .position(|pair| {
                total += pair.length();
                total >= WINDOW_SIZE
            })
            .map_or(self.pairs.len(), |i| i + 1);
        let mut removable = self.pairs.len() - keep;
        while removable > 0 && self.pairs.front().is_some_and(Pair::has_been_written) {
            self.pairs.pop_front();
            removable -= 1;
        }
    }

    /// Moves bytes from the last unwritten pairs into a final literal run
    /// so the last match ends early enough.
    fn rewrite_last_pairs(&mut self) {
        let mut last_pairs = VecDeque::new();
        let mut covered = 0;
        while let Some(pair) = self.pairs.back() {
            if pair.has_been_written() {
                break;
            }
            covered += pair.length();
            if let Some(pair) = self.pairs.pop_back() {
                last_pairs.push_front(pair);
            }
            if covered >= MIN_OFFSET_OF_LAST_BACK_REFERENCE {
                break;
            }
        }
        let Some(split_candidate) = last_pairs.pop_front() else {
            // Nothing pending: an empty block is a single zero token.
            self.pairs.push_back(Pair::default());
            return;
        };

        // Every pair but the first ends up as literals.
        let to_expand: usize = last_pairs.iter().map(Pair::length).sum();
        let mut replacement = Pair::default();
        if to_expand > 0 {
            replacement.prepend_literal(self.expand(to_expand, to_expand));
        }
        let still_needed = MIN_OFFSET_OF_LAST_BACK_REFERENCE - to_expand;
        let br_length = split_candidate.back_reference_length();
        if split_candidate.has_back_reference()
            && br_length >= MIN_BACK_REFERENCE_LENGTH + still_needed
        {
            replacement.prepend_literal(self.expand(to_expand + still_needed, still_needed));
            self.pairs
                .push_back(split_candidate.split_with_back_reference_length(br_length - still_needed));
        } else {
            if split_candidate.has_back_reference() {
                replacement.prepend_literal(self.expand(to_expand + br_length, br_length));
            }
            split_candidate.prepend_to(&mut replacement);
        }
        self.pairs.push_back(replacement);
    }

    /// Decodes a back-reference against the recorded data.
    fn expand(&self, offset: usize, length: usize) -> Arc<[u8]> {
        let mut expanded = vec![0u8; length];
        if offset == 1 {
            let last = self
                .expanded
                .front()
                .and_then(|chunk| chunk.last().copied())
                .unwrap_or(0);
            expanded.fill(last);
        } else {
            self.expand_from_history(&mut expanded, offset);
        }
        Arc::from(expanded)
    }

    fn expand_from_history(&self, expanded: &mut [u8], offset: usize) {
        let length = expanded.len();
        // Distance back from the write position; negative once the copy
        // overlaps its own output.
        let mut offset_remaining = offset as isize;
        let mut written = 0;
        while written < length {
            let remaining = length - written;
            let copied = if offset_remaining > 0 {
                let mut chunk_offset = 0;
                let Some(chunk) = self.expanded.iter().find(|chunk| {
                    let found = chunk.len() + chunk_offset >= offset_remaining as usize;
                    if !found {
                        chunk_offset += chunk.len();
                    }
                    found
                }) else {
                    log::warn!("LZ4 back-reference at offset {offset} reaches beyond the window");
                    return;
                };
                let start = chunk_offset + chunk.len() - offset_remaining as usize;
                let n = remaining.min(chunk.len() - start);
                expanded[written..written + n].copy_from_slice(&chunk[start..start + n]);
                n
            } else {
                let start = (-offset_remaining) as usize;
                let n = remaining.min((written as isize + offset_remaining) as usize);
                expanded.copy_within(start..start + n, written);
                n
            };
            offset_remaining -= copied as isize;
            written += copied;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compress(data: &[u8]) -> Vec<u8> {
        let mut encoder = BlockLz4Encoder::new(Vec::new());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn ones(len: usize) -> Vec<u8> {
        vec![0xFF; len]
    }

    fn literal_block(data: &[u8]) -> Vec<u8> {
        let mut expected = Vec::new();
        if data.len() >= 15 {
            expected.push(0xF0);
            expected.push((data.len() - 15) as u8);
        } else {
            expected.push((data.len() << 4) as u8);
        }
        expected.extend_from_slice(data);
        expected
    }

    #[test]
    fn test_empty_input_is_single_token() {
        assert_eq!(compress(&[]), [0]);
    }

    #[test]
    fn test_short_runs_stay_literal() {
        for i in 1..13 {
            assert_eq!(compress(&ones(i)), literal_block(&ones(i)), "length {i}");
        }
    }

    #[test]
    fn test_back_reference_too_short_to_split_becomes_literal() {
        for i in 13..17 {
            assert_eq!(compress(&ones(i)), literal_block(&ones(i)), "length {i}");
        }
    }

    #[test]
    fn test_back_reference_is_split_before_the_end() {
        for i in 17..20 {
            let mut expected = vec![0x10 | (i - 17) as u8, 0xFF, 1, 0, 0xC0];
            expected.extend_from_slice(&ones(12));
            assert_eq!(compress(&ones(i)), expected, "length {i}");
        }
    }

    #[test]
    fn test_trailing_literals_are_extended() {
        // 1 literal, back-reference of 9, 4 more literals.
        let mut data = ones(10);
        data.extend_from_slice(&[1, 2, 3, 4]);
        assert_eq!(compress(&data), literal_block(&data));

        // A long enough back-reference gives up only the bytes needed.
        let mut data = ones(14);
        data.extend_from_slice(&[1, 2, 3, 4]);
        let mut expected = vec![0x11, 0xFF, 1, 0, 0xC0];
        expected.extend_from_slice(&ones(8));
        expected.extend_from_slice(&[1, 2, 3, 4]);
        assert_eq!(compress(&data), expected);
    }

    #[test]
    fn test_rewrite_merges_several_pairs() {
        let mut writer = PairWriter {
            out: Vec::new(),
            pairs: VecDeque::new(),
            expanded: VecDeque::new(),
        };
        let events = [
            Block::Literal(&[1, 2, 3, 4, 5, 6, 7, 8]),
            Block::BackReference { offset: 8, length: 16 },
            Block::Literal(&[9]),
            Block::BackReference { offset: 1, length: 5 },
            Block::Literal(&[10]),
            Block::BackReference { offset: 1, length: 4 },
            Block::Literal(&[11]),
            Block::BackReference { offset: 1, length: 4 },
            Block::Literal(&[12]),
        ];
        for event in events {
            writer.accept(event).unwrap();
        }
        // Sixteen bytes follow the first pair, so it is already out.
        assert_eq!(writer.out.len(), 11);
        writer.accept(Block::Eod).unwrap();

        let mut expected = vec![0x8C, 1, 2, 3, 4, 5, 6, 7, 8, 8, 0];
        expected.extend_from_slice(&[0x10, 9, 1, 0]);
        expected.extend_from_slice(&[0xC0, 9, 10, 10, 10, 10, 10, 11, 11, 11, 11, 11, 12]);
        assert_eq!(writer.out, expected);
    }

    #[test]
    fn test_offset_beyond_one() {
        let mut data = Vec::new();
        for _ in 0..6 {
            data.extend_from_slice(&[1, 0xFF, 0xFF, 0xFF]);
        }
        data.push(1);
        let mut expected = vec![(4 << 4) | 5, 1, 0xFF, 0xFF, 0xFF, 4, 0, 0xC0];
        expected.extend_from_slice(&data[13..]);
        assert_eq!(compress(&data), expected);
    }

    #[test]
    fn test_prefill_references_dictionary() {
        let dict = b"0123456789abcdefghijklmnopqrstuvwxyz";
        let mut encoder = BlockLz4Encoder::new(Vec::new());
        encoder.prefill(dict).unwrap();
        let data = b"0123456789abcdefghijklmnopqrstuvwxyz and the rest";
        encoder.write_all(data).unwrap();
        let block = encoder.finish().unwrap();
        assert!(block.len() < data.len());
        assert_eq!(block[0] & 0xF0, 0);
    }

    #[test]
    fn test_prefill_after_write_fails() {
        let mut encoder = BlockLz4Encoder::new(Vec::new());
        encoder.write_all(b"data").unwrap();
        assert!(encoder.prefill(b"dict").is_err());
    }

    #[cfg(feature = "lz4")]
    #[test]
    fn test_decodable_by_lz4_flex() {
        use rand::{Rng, SeedableRng, rngs::StdRng};

        let mut rng = StdRng::seed_from_u64(11);
        let mut data = Vec::new();
        while data.len() < 300_000 {
            let run = rng.gen_range(1..40);
            if rng.gen_bool(0.3) || data.len() < 100 {
                data.extend((0..run).map(|_| rng.r#gen::<u8>() % 8));
            } else {
                let start = rng.gen_range(0..data.len());
                let len = run.min(data.len() - start);
                data.extend_from_within(start..start + len);
            }
        }
        let block = compress(&data);
        assert!(block.len() < data.len());
        let decoded = super::super::decompress_block(&block, data.len()).unwrap();
        assert_eq!(decoded, data);
    }
}
