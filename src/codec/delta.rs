//! The DELTA filter encoder.
//!
//! Each byte is stored as its difference from the byte `distance`
//! positions earlier; bytes before the start count as zero. The coder
//! property is `distance - 1`. Decoding lives with the other
//! `lzma-rust2` filters.

use std::io::{self, Write};

use crate::{Error, Result};

use super::{Encoder, method};

/// Ring of the last 256 plain bytes.
#[derive(Clone)]
struct History {
    bytes: [u8; 256],
    pos: u8,
    distance: u8,
}

impl History {
    fn new(distance: usize) -> Self {
        Self {
            bytes: [0; 256],
            pos: 0,
            // 256 wraps to 0, which indexes the same slot as 256 would.
            distance: distance as u8,
        }
    }

    fn previous(&self) -> u8 {
        self.bytes[usize::from(self.pos.wrapping_sub(self.distance))]
    }

    fn push(&mut self, byte: u8) {
        self.bytes[usize::from(self.pos)] = byte;
        self.pos = self.pos.wrapping_add(1);
    }
}

/// Parses the delta property byte.
#[cfg_attr(not(feature = "lzma"), allow(dead_code))]
pub(crate) fn distance_from_properties(properties: &[u8]) -> Result<usize> {
    match properties {
        [] => Ok(1),
        [d] => Ok(usize::from(*d) + 1),
        _ => Err(Error::InvalidFormat(format!(
            "delta properties must be one byte, got {}",
            properties.len()
        ))),
    }
}

/// Checks a distance and returns its property byte.
pub(crate) fn distance_property(distance: u32) -> Result<u8> {
    match distance {
        1..=256 => Ok((distance - 1) as u8),
        _ => Err(Error::InvalidFormat(format!(
            "delta distance {distance} outside 1..=256"
        ))),
    }
}

/// Applies the delta filter.
pub struct DeltaEncoder<W> {
    inner: W,
    history: History,
    scratch: Vec<u8>,
}

impl<W> std::fmt::Debug for DeltaEncoder<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeltaEncoder")
            .field("distance", &self.history.distance)
            .finish_non_exhaustive()
    }
}

impl<W: Write + Send> DeltaEncoder<W> {
    /// Creates an encoder for `distance` (1 to 256).
    pub fn new(inner: W, distance: u32) -> Result<Self> {
        distance_property(distance)?;
        Ok(Self {
            inner,
            history: History::new(distance as usize),
            scratch: Vec::new(),
        })
    }

    /// The coder property byte.
    pub fn properties(&self) -> Vec<u8> {
        vec![self.history.distance.wrapping_sub(1)]
    }
}

impl<W: Write + Send> Write for DeltaEncoder<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.scratch.clear();
        self.scratch.reserve(buf.len());
        for &byte in buf {
            self.scratch.push(byte.wrapping_sub(self.history.previous()));
            self.history.push(byte);
        }
        self.inner.write_all(&self.scratch)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl<W: Write + Send> Encoder<W> for DeltaEncoder<W> {
    fn method_id(&self) -> &'static [u8] {
        method::DELTA
    }

    fn finish(self: Box<Self>) -> io::Result<W> {
        Ok(self.inner)
    }
}
