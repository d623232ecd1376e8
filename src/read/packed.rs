//! Independent cursors over the packed data region.

use std::io::{self, Read, Seek, SeekFrom};
use std::sync::{Arc, Mutex, MutexGuard};

/// Locks `mutex`, taking the data of a poisoned lock.
///
/// A panic in another reader leaves the source at an arbitrary position;
/// every cursor seeks before reading, so the data stays usable.
pub(crate) fn lock_or_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| {
        log::warn!("archive source lock was poisoned; continuing");
        poisoned.into_inner()
    })
}

/// Reads one packed stream: `length` bytes starting at `offset` of a
/// shared source.
///
/// Every reader keeps its own position and seeks the source before each
/// read, so several pipelines can be open against the same file.
pub(crate) struct PackedStreamReader<R> {
    source: Arc<Mutex<R>>,
    position: u64,
    remaining: u64,
}

impl<R> PackedStreamReader<R> {
    pub(crate) fn new(source: Arc<Mutex<R>>, offset: u64, length: u64) -> Self {
        Self {
            source,
            position: offset,
            remaining: length,
        }
    }
}

impl<R: Read + Seek> Read for PackedStreamReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.remaining == 0 || buf.is_empty() {
            return Ok(0);
        }
        let want = buf.len().min(usize::try_from(self.remaining).unwrap_or(usize::MAX));
        let n = {
            let mut source = lock_or_recover(&self.source);
            source.seek(SeekFrom::Start(self.position))?;
            source.read(&mut buf[..want])?
        };
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "archive ends inside a packed stream",
            ));
        }
        self.position += n as u64;
        self.remaining -= n as u64;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn shared(data: &[u8]) -> Arc<Mutex<Cursor<Vec<u8>>>> {
        Arc::new(Mutex::new(Cursor::new(data.to_vec())))
    }

    #[test]
    fn test_reads_range() {
        let source = shared(b"0123456789");
        let mut reader = PackedStreamReader::new(source, 2, 5);
        let mut out = String::new();
        reader.read_to_string(&mut out).unwrap();
        assert_eq!(out, "23456");
    }

    #[test]
    fn test_interleaved_cursors() {
        let source = shared(b"abcdefgh");
        let mut first = PackedStreamReader::new(Arc::clone(&source), 0, 4);
        let mut second = PackedStreamReader::new(source, 4, 4);
        let mut a = [0u8; 2];
        let mut b = [0u8; 2];
        first.read_exact(&mut a).unwrap();
        second.read_exact(&mut b).unwrap();
        assert_eq!(&a, b"ab");
        assert_eq!(&b, b"ef");
        first.read_exact(&mut a).unwrap();
        assert_eq!(&a, b"cd");
    }

    #[test]
    fn test_short_source() {
        let source = shared(b"abc");
        let mut reader = PackedStreamReader::new(source, 1, 10);
        let mut out = Vec::new();
        let err = reader.read_to_end(&mut out).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
        assert_eq!(out, b"bc");
    }
}
