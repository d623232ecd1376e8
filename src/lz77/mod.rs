//! Generic LZ77 matcher.
//!
//! [`Lz77Compressor`] slides a window over its input and reports what it
//! finds as a stream of [`Block`]s: runs of literal bytes and
//! back-references into already seen data. Format-specific encoders such
//! as the LZ4 block writer turn that stream into their own syntax.
//!
//! Candidate positions come from a rolling three-byte hash over
//! `1 << 15` chain heads; chains link earlier positions with the same
//! hash.

mod parameters;

pub use parameters::{Parameters, ParametersBuilder, TRUE_MIN_BACK_REFERENCE_LENGTH};

use std::io;

use crate::{Error, Result};

const HASH_BYTES: usize = 3;
const HASH_SIZE: usize = 1 << 15;
const HASH_MASK: u32 = HASH_SIZE as u32 - 1;
const HASH_SHIFT: u32 = 5;
const NO_MATCH: i64 = -1;

/// An event produced by the matcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Block<'a> {
    /// Bytes that could not be matched.
    Literal(&'a [u8]),
    /// A copy of `length` bytes starting `offset` bytes back.
    BackReference {
        /// Distance back from the current position.
        offset: usize,
        /// Number of bytes to copy.
        length: usize,
    },
    /// End of data; emitted once by [`Lz77Compressor::finish`].
    Eod,
}

/// Receiver of matcher events.
pub trait BlockSink {
    /// Handles one event; literal slices are only valid for the call.
    fn accept(&mut self, block: Block<'_>) -> io::Result<()>;
}

impl<F> BlockSink for F
where
    F: FnMut(Block<'_>) -> io::Result<()>,
{
    fn accept(&mut self, block: Block<'_>) -> io::Result<()> {
        self(block)
    }
}

/// Sliding-window LZ77 matcher.
///
/// The window buffer holds two window sizes; once full, its upper half is
/// slid down and positions in the hash chains are rebased.
pub struct Lz77Compressor {
    params: Parameters,
    window: Vec<u8>,
    head: Vec<i64>,
    prev: Vec<i64>,
    window_mask: usize,
    initialized: bool,
    current_position: usize,
    lookahead: usize,
    insert_hash: u32,
    block_start: usize,
    match_start: i64,
    missed_inserts: usize,
}

impl std::fmt::Debug for Lz77Compressor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lz77Compressor")
            .field("params", &self.params)
            .field("current_position", &self.current_position)
            .field("lookahead", &self.lookahead)
            .finish_non_exhaustive()
    }
}

impl Lz77Compressor {
    /// Creates a matcher.
    pub fn new(params: Parameters) -> Self {
        let window_size = params.window_size();
        Self {
            params,
            window: vec![0; window_size * 2],
            head: vec![NO_MATCH; HASH_SIZE],
            prev: vec![NO_MATCH; window_size],
            window_mask: window_size - 1,
            initialized: false,
            current_position: 0,
            lookahead: 0,
            insert_hash: 0,
            block_start: 0,
            match_start: NO_MATCH,
            missed_inserts: 0,
        }
    }

    /// The parameters in use.
    pub fn params(&self) -> &Parameters {
        &self.params
    }

    /// Feeds data; events are delivered to `sink` as they are found.
    ///
    /// Trailing bytes shorter than a minimal match are held back until
    /// more data or [`finish`](Self::finish) arrives.
    pub fn compress<S: BlockSink + ?Sized>(&mut self, data: &[u8], sink: &mut S) -> io::Result<()> {
        let window_size = self.params.window_size();
        let mut rest = data;
        while !rest.is_empty() {
            let wanted = rest.len().min(window_size);
            if self.space_left() < wanted && self.current_position >= window_size {
                self.slide(sink)?;
            }
            let (chunk, tail) = rest.split_at(wanted.min(self.space_left()));
            self.compress_chunk(chunk, sink)?;
            rest = tail;
        }
        Ok(())
    }

    fn space_left(&self) -> usize {
        self.window.len() - self.current_position - self.lookahead
    }

    /// Flushes remaining literals and emits [`Block::Eod`].
    pub fn finish<S: BlockSink + ?Sized>(&mut self, sink: &mut S) -> io::Result<()> {
        if self.block_start != self.current_position || self.lookahead > 0 {
            self.current_position += self.lookahead;
            self.lookahead = 0;
            self.flush_literal_block(sink)?;
        }
        sink.accept(Block::Eod)
    }

    /// Seeds the window with a dictionary that back-references may point
    /// into. Only the last window-size bytes are used.
    ///
    /// Fails with [`Error::InvalidState`] once compression has started.
    pub fn prefill(&mut self, data: &[u8]) -> Result<()> {
        if self.current_position != 0 || self.lookahead != 0 {
            return Err(Error::InvalidState(
                "The compressor has already started to accept data, can't prefill anymore",
            ));
        }
        let len = data.len().min(self.params.window_size());
        self.window[..len].copy_from_slice(&data[data.len() - len..]);
        if len >= HASH_BYTES {
            self.initialize();
            for i in 0..=len - HASH_BYTES {
                self.insert_string(i);
            }
            self.missed_inserts = HASH_BYTES - 1;
        } else {
            self.missed_inserts = len;
        }
        self.block_start = len;
        self.current_position = len;
        Ok(())
    }

    fn next_hash(old: u32, byte: u8) -> u32 {
        ((old << HASH_SHIFT) ^ u32::from(byte)) & HASH_MASK
    }

    fn compress_chunk<S: BlockSink + ?Sized>(&mut self, data: &[u8], sink: &mut S) -> io::Result<()> {
        let at = self.current_position + self.lookahead;
        self.window[at..at + data.len()].copy_from_slice(data);
        self.lookahead += data.len();
        if !self.initialized && self.lookahead >= self.params.min_back_reference_length() {
            self.initialize();
        }
        if self.initialized {
            self.find_matches(sink)?;
        }
        Ok(())
    }

    fn slide<S: BlockSink + ?Sized>(&mut self, sink: &mut S) -> io::Result<()> {
        let window_size = self.params.window_size();
        if self.block_start != self.current_position && self.block_start < window_size {
            self.flush_literal_block(sink)?;
            self.block_start = self.current_position;
        }
        self.window.copy_within(window_size.., 0);
        self.current_position -= window_size;
        self.match_start -= window_size as i64;
        self.block_start -= window_size;
        let rebase = |p: &mut i64| {
            *p = if *p >= window_size as i64 {
                *p - window_size as i64
            } else {
                NO_MATCH
            };
        };
        self.head.iter_mut().for_each(rebase);
        self.prev.iter_mut().for_each(rebase);
        Ok(())
    }

    fn initialize(&mut self) {
        for i in 0..HASH_BYTES - 1 {
            self.insert_hash = Self::next_hash(self.insert_hash, self.window[i]);
        }
        self.initialized = true;
    }

    fn find_matches<S: BlockSink + ?Sized>(&mut self, sink: &mut S) -> io::Result<()> {
        let min_match = self.params.min_back_reference_length();
        let lazy = self.params.lazy_matching();
        let lazy_threshold = self.params.lazy_threshold();

        while self.lookahead >= min_match {
            self.catch_up_missed_inserts();
            let mut match_length = 0;
            let hash_head = self.insert_string(self.current_position);
            if hash_head != NO_MATCH
                && self.current_position as i64 - hash_head <= self.params.max_offset() as i64
            {
                match_length = self.longest_match(hash_head);
                if lazy && match_length <= lazy_threshold && self.lookahead > min_match {
                    match_length = self.longest_match_for_next_position(match_length);
                }
            }

            if match_length >= min_match {
                if self.block_start != self.current_position {
                    self.flush_literal_block(sink)?;
                }
                sink.accept(Block::BackReference {
                    offset: (self.current_position as i64 - self.match_start) as usize,
                    length: match_length,
                })?;
                self.insert_strings_in_match(match_length);
                self.lookahead -= match_length;
                self.current_position += match_length;
                self.block_start = self.current_position;
            } else {
                self.lookahead -= 1;
                self.current_position += 1;
                if self.current_position - self.block_start >= self.params.max_literal_length() {
                    self.flush_literal_block(sink)?;
                    self.block_start = self.current_position;
                }
            }
        }
        Ok(())
    }

    /// Adds the string at `pos` to its hash chain and returns the previous
    /// chain head.
    fn insert_string(&mut self, pos: usize) -> i64 {
        self.insert_hash = Self::next_hash(self.insert_hash, self.window[pos + HASH_BYTES - 1]);
        let hash_head = self.head[self.insert_hash as usize];
        self.prev[pos & self.window_mask] = hash_head;
        self.head[self.insert_hash as usize] = pos as i64;
        hash_head
    }

    fn longest_match_for_next_position(&mut self, prev_match_length: usize) -> usize {
        let prev_match_start = self.match_start;
        let prev_insert_hash = self.insert_hash;

        self.lookahead -= 1;
        self.current_position += 1;
        let hash_head = self.insert_string(self.current_position);
        let prev_hash_head = self.prev[self.current_position & self.window_mask];
        let match_length = self.longest_match(hash_head);

        if match_length <= prev_match_length {
            // The earlier match is at least as good; undo the step.
            self.match_start = prev_match_start;
            self.head[self.insert_hash as usize] = prev_hash_head;
            self.insert_hash = prev_insert_hash;
            self.current_position -= 1;
            self.lookahead += 1;
            return prev_match_length;
        }
        match_length
    }

    fn insert_strings_in_match(&mut self, match_length: usize) {
        // Strings near the end of the lookahead lack the bytes to hash;
        // they are inserted later by catch_up_missed_inserts.
        let stop = (match_length - 1).min(self.lookahead.saturating_sub(HASH_BYTES));
        for i in 1..=stop {
            self.insert_string(self.current_position + i);
        }
        self.missed_inserts = match_length - stop - 1;
    }

    fn catch_up_missed_inserts(&mut self) {
        while self.missed_inserts > 0 {
            let pos = self.current_position - self.missed_inserts;
            self.missed_inserts -= 1;
            self.insert_string(pos);
        }
    }

    fn flush_literal_block<S: BlockSink + ?Sized>(&mut self, sink: &mut S) -> io::Result<()> {
        sink.accept(Block::Literal(
            &self.window[self.block_start..self.current_position],
        ))
    }

    /// Walks the hash chain from `match_head`; sets `match_start` when a
    /// match of at least the minimal length is found.
    fn longest_match(&mut self, mut match_head: i64) -> usize {
        let min_length = self.params.min_back_reference_length();
        let mut longest = min_length - 1;
        let max_possible = self.params.max_back_reference_length().min(self.lookahead);
        let min_index = self
            .current_position
            .saturating_sub(self.params.max_offset()) as i64;
        let nice = max_possible.min(self.params.nice_back_reference_length());
        let max_candidates = self.params.max_candidates();

        let mut candidates = 0;
        while candidates < max_candidates && match_head >= min_index {
            let start = match_head as usize;
            let current = &self.window[self.current_position..self.current_position + max_possible];
            let length = self.window[start..start + max_possible]
                .iter()
                .zip(current)
                .take_while(|(a, b)| a == b)
                .count();
            if length > longest {
                longest = length;
                self.match_start = match_head;
                if length >= nice {
                    break;
                }
            }
            match_head = self.prev[start & self.window_mask];
            candidates += 1;
        }
        longest
    }
}
