//! Archive writing API for 7z archives.
//!
//! Entries are written through a streaming interface: [`Writer::put_entry`]
//! opens an entry, [`Write`] supplies its content and
//! [`Writer::close_entry`] closes it. Folders are encoded in memory and
//! appended to the sink when they are complete; [`Writer::finish`] writes
//! the end header and then the start header.
//!
//! # Example
//!
//! ```rust
//! use std::io::Cursor;
//! use archkit::write::{Writer, WriteOptions};
//!
//! let mut writer = Writer::create(Cursor::new(Vec::new()))?;
//! writer.add_bytes("hello.txt", b"Hello, World!")?;
//! writer.add_directory("docs")?;
//! let result = writer.finish()?;
//! assert_eq!(result.entries_written, 2);
//! # Ok::<(), archkit::Error>(())
//! ```

mod entry_compression;
mod header_encode;
mod options;
mod writer_init;

pub use options::{EntryMeta, WriteOptions, WriteResult};

use std::io::{self, Write};

use crate::checksum::Crc32;
use crate::codec::MethodConfiguration;
use crate::codec::graph::StageSink;
use crate::format::files::ArchiveEntry;
use crate::format::streams::Folder;

/// State of the writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriterState {
    /// Accepting new entries.
    AcceptingEntries,
    /// Archive is finished.
    Finished,
}

/// The entry between `put_entry` and `close_entry`.
#[derive(Debug)]
struct OpenEntry {
    meta: EntryMeta,
    chain: Vec<MethodConfiguration>,
    crc: Crc32,
    size: u64,
}

/// A folder being filled.
#[derive(Debug)]
struct FolderBuilder {
    chain: Vec<MethodConfiguration>,
    sink: StageSink,
    sizes: Vec<u64>,
    crcs: Vec<u32>,
}

/// A folder whose packed stream has been written.
#[derive(Debug, Clone)]
struct WrittenFolder {
    folder: Folder,
    pack_size: u64,
    sizes: Vec<u64>,
    crcs: Vec<u32>,
}

/// A 7z archive writer.
pub struct Writer<W> {
    sink: W,
    options: WriteOptions,
    state: WriterState,
    entries: Vec<ArchiveEntry>,
    folders: Vec<WrittenFolder>,
    current: Option<OpenEntry>,
    building: Option<FolderBuilder>,
    /// Packed bytes written after the signature header.
    packed_bytes: u64,
}

impl<W> std::fmt::Debug for Writer<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Writer")
            .field("state", &self.state)
            .field("entries", &self.entries.len())
            .field("folders", &self.folders.len())
            .field("packed_bytes", &self.packed_bytes)
            .finish_non_exhaustive()
    }
}

impl<W: Write + io::Seek> Write for Writer<W> {
    /// Writes content of the open entry.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_content(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use crate::codec::Method;
    use std::io::Cursor;

    fn writer() -> Writer<Cursor<Vec<u8>>> {
        Writer::create(Cursor::new(Vec::new())).unwrap()
    }

    #[test]
    fn test_writer_create() {
        let writer = writer();
        assert_eq!(writer.state, WriterState::AcceptingEntries);
        assert_eq!(writer.sink.get_ref().len(), 32);
    }

    #[test]
    fn test_finish_twice() {
        let mut writer = writer();
        writer.finish().unwrap();
        let err = writer.finish().unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
        assert_eq!(err.to_string(), "This archive has already been finished");
    }

    #[test]
    fn test_put_entry_after_finish() {
        let mut writer = writer();
        writer.finish().unwrap();
        assert!(matches!(
            writer.put_entry(EntryMeta::file("late")),
            Err(Error::InvalidState(_))
        ));
    }

    #[test]
    fn test_write_without_entry() {
        let mut writer = writer();
        assert!(writer.write_all(b"data").is_err());
    }

    #[test]
    fn test_directory_rejects_content() {
        let mut writer = writer();
        writer.put_entry(EntryMeta::directory("d")).unwrap();
        assert!(writer.write_all(b"x").is_err());
        writer.close_entry().unwrap();
    }

    #[test]
    fn test_non_solid_folder_per_entry() {
        let mut writer = writer().options(WriteOptions::new().method(Method::Copy));
        writer.add_bytes("a", b"first").unwrap();
        writer.add_bytes("empty", b"").unwrap();
        writer.add_bytes("b", b"second").unwrap();
        let result = writer.finish().unwrap();
        assert_eq!(result.entries_written, 3);
        assert_eq!(result.folders_written, 2);
        assert_eq!(result.total_size, 11);
    }

    #[cfg(feature = "deflate")]
    #[test]
    fn test_solid_groups_by_chain() {
        let mut writer = writer().options(WriteOptions::new().method(Method::Copy).solid(true));
        writer.add_bytes("a", b"one").unwrap();
        writer.add_bytes("b", b"two").unwrap();
        writer
            .put_entry(EntryMeta::file("c").content_methods(vec![Method::Deflate.into()]))
            .unwrap();
        writer.write_all(b"three").unwrap();
        writer.close_entry().unwrap();
        writer.add_bytes("d", b"four").unwrap();
        let result = writer.finish().unwrap();
        assert_eq!(result.folders_written, 3);
    }

    #[test]
    fn test_empty_chain_rejected() {
        let mut writer = writer().options(WriteOptions::new().methods(Vec::new()));
        assert!(matches!(
            writer.put_entry(EntryMeta::file("x")),
            Err(Error::InvalidParameter(_))
        ));
    }
}
