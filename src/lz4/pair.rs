//! One LZ4 sequence: literals followed by an optional back-reference.

use std::collections::VecDeque;
use std::io::{self, Write};
use std::sync::Arc;

use super::{MIN_BACK_REFERENCE_LENGTH, MIN_OFFSET_OF_LAST_BACK_REFERENCE, SIZE_MASK};

/// A back-reference as (distance, length).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BackReference {
    pub offset: usize,
    pub length: usize,
}

/// Literal chunks and the back-reference that closes them.
///
/// Literal chunks are shared with the encoder's history of expanded
/// bytes, so they are reference counted.
#[derive(Debug, Clone, Default)]
pub(crate) struct Pair {
    literals: VecDeque<Arc<[u8]>>,
    literal_length: usize,
    back_reference: Option<BackReference>,
    written: bool,
}

impl Pair {
    pub fn add_literal(&mut self, bytes: Arc<[u8]>) {
        self.literal_length += bytes.len();
        self.literals.push_back(bytes);
    }

    pub fn prepend_literal(&mut self, bytes: Arc<[u8]>) {
        self.literal_length += bytes.len();
        self.literals.push_front(bytes);
    }

    /// Moves this pair's literals in front of `other`'s.
    pub fn prepend_to(self, other: &mut Pair) {
        for chunk in self.literals.into_iter().rev() {
            other.prepend_literal(chunk);
        }
    }

    pub fn set_back_reference(&mut self, back_reference: BackReference) {
        debug_assert!(self.back_reference.is_none());
        self.back_reference = Some(back_reference);
    }

    pub fn has_back_reference(&self) -> bool {
        self.back_reference.is_some()
    }

    pub fn back_reference_length(&self) -> usize {
        self.back_reference.map_or(0, |br| br.length)
    }

    pub fn has_been_written(&self) -> bool {
        self.written
    }

    /// Bytes this pair decodes to.
    pub fn length(&self) -> usize {
        self.literal_length + self.back_reference_length()
    }

    /// A pair may be written once it is closed by a back-reference and
    /// enough bytes follow it that the block end cannot reach into it.
    pub fn can_be_written(&self, length_of_blocks_after: usize) -> bool {
        self.has_back_reference()
            && length_of_blocks_after >= MIN_OFFSET_OF_LAST_BACK_REFERENCE + MIN_BACK_REFERENCE_LENGTH
    }

    /// A copy with the same literals and a shortened back-reference.
    pub fn split_with_back_reference_length(&self, length: usize) -> Pair {
        Pair {
            literals: self.literals.clone(),
            literal_length: self.literal_length,
            back_reference: self.back_reference.map(|br| BackReference {
                offset: br.offset,
                length,
            }),
            written: false,
        }
    }

    pub fn write_to<W: Write + ?Sized>(&mut self, out: &mut W) -> io::Result<()> {
        let literal_length = self.literal_length;
        let match_length = self.back_reference_length();
        out.write_all(&[token(literal_length, match_length)])?;
        if literal_length >= SIZE_MASK {
            write_length(out, literal_length - SIZE_MASK)?;
        }
        for chunk in &self.literals {
            out.write_all(chunk)?;
        }
        if let Some(br) = self.back_reference {
            out.write_all(&(br.offset as u16).to_le_bytes())?;
            if br.length - MIN_BACK_REFERENCE_LENGTH >= SIZE_MASK {
                write_length(out, br.length - MIN_BACK_REFERENCE_LENGTH - SIZE_MASK)?;
            }
        }
        self.written = true;
        Ok(())
    }
}

fn token(literal_length: usize, match_length: usize) -> u8 {
    let literals = literal_length.min(SIZE_MASK);
    let matches = match match_length {
        0..4 => 0,
        4..19 => match_length - MIN_BACK_REFERENCE_LENGTH,
        _ => SIZE_MASK,
    };
    ((literals << 4) | matches) as u8
}

/// Writes a length continuation: runs of 255 then the remainder.
fn write_length<W: Write + ?Sized>(out: &mut W, mut length: usize) -> io::Result<()> {
    while length >= 255 {
        out.write_all(&[255])?;
        length -= 255;
    }
    out.write_all(&[length as u8])
}
