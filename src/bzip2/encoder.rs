//! BZIP2 stream writer.

use std::io::{self, Write};

use crc::{CRC_32_BZIP2, Crc, Digest};

use super::block_sort::BlockSort;
use super::huffman::{MAX_CODE_LEN, assign_codes, make_code_lengths};
use super::Bzip2Options;

static BLOCK_CRC: Crc<u32> = Crc::<u32>::new(&CRC_32_BZIP2);

const BLOCK_MAGIC: [u32; 2] = [0x31_4159, 0x26_5359];
const END_MAGIC: [u32; 2] = [0x17_7245, 0x38_5090];

const RUN_A: u16 = 0;
const RUN_B: u16 = 1;
const MAX_GROUPS: usize = 6;
const GROUP_SIZE: usize = 50;
const TABLE_ITERATIONS: usize = 4;
const LESSER_COST: u8 = 0;
const GREATER_COST: u8 = 15;

/// Bytes buffered before they are pushed to the underlying writer.
const FLUSH_THRESHOLD: usize = 64 * 1024;

/// MSB-first bit packer over a byte buffer.
struct BitWriter<W> {
    inner: W,
    buffer: Vec<u8>,
    acc: u64,
    bits: u32,
}

impl<W: Write> BitWriter<W> {
    fn new(inner: W) -> Self {
        Self {
            inner,
            buffer: Vec::with_capacity(FLUSH_THRESHOLD),
            acc: 0,
            bits: 0,
        }
    }

    fn write_bits(&mut self, count: u32, value: u32) {
        debug_assert!(count <= 32);
        let mask = (1u64 << count) - 1;
        self.acc = (self.acc << count) | (u64::from(value) & mask);
        self.bits += count;
        while self.bits >= 8 {
            self.bits -= 8;
            self.buffer.push((self.acc >> self.bits) as u8);
        }
    }

    fn write_bit(&mut self, bit: bool) {
        self.write_bits(1, u32::from(bit));
    }

    fn write_u32(&mut self, value: u32) {
        self.write_bits(16, value >> 16);
        self.write_bits(16, value & 0xffff);
    }

    fn drain(&mut self) -> io::Result<()> {
        if self.buffer.len() >= FLUSH_THRESHOLD {
            self.inner.write_all(&self.buffer)?;
            self.buffer.clear();
        }
        Ok(())
    }

    fn finish(mut self) -> io::Result<W> {
        if self.bits > 0 {
            let pad = 8 - self.bits;
            self.buffer.push((self.acc << pad) as u8);
            self.bits = 0;
        }
        self.inner.write_all(&self.buffer)?;
        self.inner.flush()?;
        Ok(self.inner)
    }
}

/// BZIP2 compressor writing a complete `BZh` stream to `W`.
///
/// The stream is only complete once [`Bzip2Encoder::try_finish`] has run.
pub struct Bzip2Encoder<W: Write> {
    out: BitWriter<W>,
    sorter: BlockSort,
    block: Vec<u8>,
    max_block_len: usize,
    run_byte: Option<u8>,
    run_len: u32,
    block_crc: Digest<'static, u32>,
    combined_crc: u32,
}

impl<W: Write> std::fmt::Debug for Bzip2Encoder<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bzip2Encoder")
            .field("max_block_len", &self.max_block_len)
            .field("buffered", &self.block.len())
            .finish_non_exhaustive()
    }
}

impl<W: Write> Bzip2Encoder<W> {
    /// Creates a compressor; the stream header is emitted immediately.
    pub fn new(output: W, options: Bzip2Options) -> Self {
        let mut out = BitWriter::new(output);
        for &b in b"BZh" {
            out.write_bits(8, u32::from(b));
        }
        out.write_bits(8, u32::from(b'0') + options.block_size_100k());
        Self {
            out,
            sorter: BlockSort::new(),
            block: Vec::with_capacity(options.max_block_len() + 20),
            max_block_len: options.max_block_len(),
            run_byte: None,
            run_len: 0,
            block_crc: BLOCK_CRC.digest(),
            combined_crc: 0,
        }
    }

    /// Compresses pending data, writes the stream trailer and returns the
    /// underlying writer.
    pub fn try_finish(mut self) -> io::Result<W> {
        self.end_block()?;
        for magic in END_MAGIC {
            self.out.write_bits(24, magic);
        }
        self.out.write_u32(self.combined_crc);
        self.out.finish()
    }

    fn add_byte(&mut self, b: u8) {
        match self.run_byte {
            Some(current) if current == b && self.run_len < 255 => self.run_len += 1,
            _ => {
                self.flush_run();
                self.run_byte = Some(b);
                self.run_len = 1;
            }
        }
    }

    /// Moves the pending run into the block: runs of four or more become
    /// four literal bytes followed by the remaining count.
    fn flush_run(&mut self) {
        let Some(b) = self.run_byte.take() else {
            return;
        };
        if self.run_len < 4 {
            self.block
                .extend(std::iter::repeat_n(b, self.run_len as usize));
        } else {
            self.block.extend_from_slice(&[b; 4]);
            self.block.push((self.run_len - 4) as u8);
        }
        self.run_len = 0;
    }

    fn end_block(&mut self) -> io::Result<()> {
        self.flush_run();
        if self.block.is_empty() {
            return Ok(());
        }
        let crc = std::mem::replace(&mut self.block_crc, BLOCK_CRC.digest()).finalize();
        self.combined_crc = self.combined_crc.rotate_left(1) ^ crc;
        write_block(&mut self.out, &mut self.sorter, &self.block, crc);
        self.block.clear();
        self.out.drain()
    }
}

impl<W: Write> Write for Bzip2Encoder<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut start = 0;
        for (i, &b) in buf.iter().enumerate() {
            if self.block.len() >= self.max_block_len {
                self.block_crc.update(&buf[start..i]);
                start = i;
                self.end_block()?;
            }
            self.add_byte(b);
        }
        self.block_crc.update(&buf[start..]);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        // Partial blocks cannot be flushed without ending them.
        Ok(())
    }
}

/// Symbols of one block after move-to-front and zero-run coding.
struct MtfBlock {
    in_use: [bool; 256],
    values: Vec<u16>,
    freqs: Vec<u32>,
    alpha_size: usize,
}

fn mtf_encode(block: &[u8], fmap: &[u32]) -> MtfBlock {
    let n = block.len();
    let mut in_use = [false; 256];
    for &b in block {
        in_use[b as usize] = true;
    }
    let mut seq = [0u8; 256];
    let mut num_in_use = 0usize;
    for (i, used) in in_use.iter().enumerate() {
        if *used {
            seq[i] = num_in_use as u8;
            num_in_use += 1;
        }
    }

    let alpha_size = num_in_use + 2;
    let eob = (num_in_use + 1) as u16;
    let mut freqs = vec![0u32; alpha_size];
    let mut values = Vec::with_capacity(n + 1);
    let mut order: Vec<u8> = (0..num_in_use).map(|i| i as u8).collect();
    let mut zero_run = 0u32;

    for &start in fmap {
        let symbol = seq[block[(start as usize + n - 1) % n] as usize];
        if order[0] == symbol {
            zero_run += 1;
            continue;
        }
        push_zero_run(&mut values, &mut freqs, zero_run);
        zero_run = 0;

        let pos = order.iter().position(|&s| s == symbol).unwrap_or(0);
        order.copy_within(0..pos, 1);
        order[0] = symbol;
        values.push((pos + 1) as u16);
        freqs[pos + 1] += 1;
    }
    push_zero_run(&mut values, &mut freqs, zero_run);
    values.push(eob);
    freqs[eob as usize] += 1;

    MtfBlock {
        in_use,
        values,
        freqs,
        alpha_size,
    }
}

/// Writes a run of `run` zeros in bijective base 2 using RUNA/RUNB.
fn push_zero_run(values: &mut Vec<u16>, freqs: &mut [u32], run: u32) {
    if run == 0 {
        return;
    }
    let mut run = run - 1;
    loop {
        let symbol = if run & 1 == 1 { RUN_B } else { RUN_A };
        values.push(symbol);
        freqs[symbol as usize] += 1;
        if run < 2 {
            break;
        }
        run = (run - 2) / 2;
    }
}

fn table_count(num_values: usize) -> usize {
    match num_values {
        0..200 => 2,
        200..600 => 3,
        600..1200 => 4,
        1200..2400 => 5,
        _ => MAX_GROUPS,
    }
}

/// Chooses coding tables and a table per 50-symbol group.
fn select_tables(mtf: &MtfBlock) -> (Vec<Vec<u8>>, Vec<u8>) {
    let alpha_size = mtf.alpha_size;
    let num_tables = table_count(mtf.values.len());
    let mut lengths = vec![vec![GREATER_COST; alpha_size]; num_tables];

    // Initial tables each cover a contiguous slice of the alphabet with
    // roughly equal total frequency.
    let mut parts_left = num_tables;
    let mut remaining = mtf.values.len() as u32;
    let mut group_start = 0usize;
    while parts_left > 0 {
        let target = remaining / parts_left as u32;
        let mut group_end = group_start as isize - 1;
        let mut acc = 0u32;
        while acc < target && group_end < alpha_size as isize - 1 {
            group_end += 1;
            acc += mtf.freqs[group_end as usize];
        }
        if group_end > group_start as isize
            && parts_left != num_tables
            && parts_left != 1
            && (num_tables - parts_left) % 2 == 1
        {
            acc -= mtf.freqs[group_end as usize];
            group_end -= 1;
        }
        for (v, len) in lengths[parts_left - 1].iter_mut().enumerate() {
            let v = v as isize;
            *len = if v >= group_start as isize && v <= group_end {
                LESSER_COST
            } else {
                GREATER_COST
            };
        }
        parts_left -= 1;
        group_start = (group_end + 1) as usize;
        remaining -= acc;
    }

    let mut selectors = Vec::with_capacity(mtf.values.len().div_ceil(GROUP_SIZE));
    for _ in 0..TABLE_ITERATIONS {
        selectors.clear();
        let mut freqs = vec![vec![0u32; alpha_size]; num_tables];
        for group in mtf.values.chunks(GROUP_SIZE) {
            let mut best = 0;
            let mut best_cost = u32::MAX;
            for (t, table) in lengths.iter().enumerate() {
                let cost: u32 = group.iter().map(|&v| u32::from(table[v as usize])).sum();
                if cost < best_cost {
                    best_cost = cost;
                    best = t;
                }
            }
            selectors.push(best as u8);
            for &v in group {
                freqs[best][v as usize] += 1;
            }
        }
        for (table, freqs) in lengths.iter_mut().zip(&freqs) {
            *table = make_code_lengths(freqs, MAX_CODE_LEN);
        }
    }
    (lengths, selectors)
}

fn write_block<W: Write>(out: &mut BitWriter<W>, sorter: &mut BlockSort, block: &[u8], crc: u32) {
    let fmap = sorter.sort(block);
    let orig_ptr = fmap.iter().position(|&s| s == 0).unwrap_or(0);
    let mtf = mtf_encode(block, fmap);
    let (lengths, selectors) = select_tables(&mtf);

    for magic in BLOCK_MAGIC {
        out.write_bits(24, magic);
    }
    out.write_u32(crc);
    out.write_bit(false);
    out.write_bits(24, orig_ptr as u32);

    // Symbol map: a 16-bit summary, then 16 bits per used range.
    let used_ranges: Vec<bool> = mtf
        .in_use
        .chunks(16)
        .map(|range| range.iter().any(|&u| u))
        .collect();
    for &used in &used_ranges {
        out.write_bit(used);
    }
    for (range, &used) in mtf.in_use.chunks(16).zip(&used_ranges) {
        if used {
            for &u in range {
                out.write_bit(u);
            }
        }
    }

    out.write_bits(3, lengths.len() as u32);
    out.write_bits(15, selectors.len() as u32);
    let mut order: Vec<u8> = (0..lengths.len() as u8).collect();
    for &selector in &selectors {
        let pos = order.iter().position(|&s| s == selector).unwrap_or(0);
        order.copy_within(0..pos, 1);
        order[0] = selector;
        for _ in 0..pos {
            out.write_bit(true);
        }
        out.write_bit(false);
    }

    // Code lengths, delta coded from the first.
    for table in &lengths {
        let mut current = u32::from(table[0]);
        out.write_bits(5, current);
        for &len in table {
            let len = u32::from(len);
            while current < len {
                out.write_bits(2, 2);
                current += 1;
            }
            while current > len {
                out.write_bits(2, 3);
                current -= 1;
            }
            out.write_bit(false);
        }
    }

    let codes: Vec<Vec<u32>> = lengths.iter().map(|l| assign_codes(l)).collect();
    for (group, &selector) in mtf.values.chunks(GROUP_SIZE).zip(&selectors) {
        let (table_lengths, table_codes) = (&lengths[selector as usize], &codes[selector as usize]);
        for &v in group {
            let v = v as usize;
            out.write_bits(u32::from(table_lengths[v]), table_codes[v]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Read;

    fn compress(data: &[u8], level: u32) -> Vec<u8> {
        let mut encoder = Bzip2Encoder::new(Vec::new(), Bzip2Options::new(level));
        encoder.write_all(data).unwrap();
        encoder.try_finish().unwrap()
    }

    #[cfg(feature = "bzip2")]
    fn decompress(data: &[u8]) -> Vec<u8> {
        let mut decoder = ::bzip2::read::BzDecoder::new(data);
        let mut out = Vec::new();
        decoder.read_to_end(&mut out).unwrap();
        out
    }

    #[test]
    fn test_stream_header_and_trailer() {
        let stream = compress(b"", 9);
        assert_eq!(&stream[..4], b"BZh9");
        assert_eq!(&stream[4..10], &[0x17, 0x72, 0x45, 0x38, 0x50, 0x90]);
        assert_eq!(&stream[10..14], &[0, 0, 0, 0]);
        assert_eq!(stream.len(), 14);
    }

    #[test]
    fn test_block_crc_matches_input() {
        let data = b"hello, block crc";
        let stream = compress(data, 1);
        assert_eq!(&stream[4..10], &[0x31, 0x41, 0x59, 0x26, 0x53, 0x59]);
        let crc = u32::from_be_bytes([stream[10], stream[11], stream[12], stream[13]]);
        assert_eq!(crc, BLOCK_CRC.checksum(data));
    }

    #[test]
    fn test_zero_run_coding() {
        let mut values = Vec::new();
        let mut freqs = vec![0u32; 4];
        push_zero_run(&mut values, &mut freqs, 1);
        push_zero_run(&mut values, &mut freqs, 2);
        push_zero_run(&mut values, &mut freqs, 3);
        push_zero_run(&mut values, &mut freqs, 4);
        assert_eq!(
            values,
            vec![RUN_A, RUN_B, RUN_A, RUN_A, RUN_B, RUN_A]
        );
        assert_eq!(freqs[..2], [4, 2]);
    }

    #[test]
    fn test_long_runs_are_pre_coded() {
        let mut encoder = Bzip2Encoder::new(Vec::new(), Bzip2Options::new(1));
        encoder.write_all(&[7u8; 300]).unwrap();
        encoder.flush_run();
        // 255 = 4 + 251, then 45 = 4 + 41.
        assert_eq!(encoder.block, [7, 7, 7, 7, 251, 7, 7, 7, 7, 41]);
    }

    #[cfg(feature = "bzip2")]
    #[test]
    fn test_decodable_by_reference_decoder() {
        for data in [
            b"a".to_vec(),
            b"banana".to_vec(),
            b"The quick brown fox jumps over the lazy dog. ".repeat(500),
            (0..=255u8).cycle().take(70_000).collect(),
            vec![0u8; 250_000],
        ] {
            assert_eq!(decompress(&compress(&data, 1)), data, "len {}", data.len());
        }
    }

    #[cfg(feature = "bzip2")]
    #[test]
    fn test_multiple_blocks() {
        let mut data = Vec::new();
        let mut x = 1u32;
        while data.len() < 230_000 {
            x = x.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            data.push(b"abcdefgh"[(x >> 28) as usize & 7]);
        }
        let stream = compress(&data, 1);
        assert_eq!(decompress(&stream), data);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[cfg(feature = "bzip2")]
        #[test]
        fn prop_round_trip(data in proptest::collection::vec(any::<u8>(), 0..4096)) {
            prop_assert_eq!(decompress(&compress(&data, 1)), data);
        }
    }
}
