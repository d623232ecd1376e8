//! Archive reading API for 7z archives.
//!
//! [`Archive`] lists entries and reads their content either sequentially
//! ([`Archive::next_entry`] followed by [`Read`] on the archive) or in any
//! order through [`Archive::entry_reader`].
//!
//! Every folder's decoder pipeline is cached after first use. Reading
//! further into a folder reuses its pipeline and discards the bytes in
//! between; reading an earlier part rebuilds the pipeline from the folder
//! start.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::io::Read;
//! use archkit::read::{Archive, ReadOptions};
//!
//! let mut archive = Archive::open_path("archive.7z", ReadOptions::default())?;
//! while let Some(entry) = archive.next_entry()? {
//!     let mut content = Vec::new();
//!     archive.read_to_end(&mut content)?;
//!     println!("{}: {} bytes", entry.name(), content.len());
//! }
//! # Ok::<(), archkit::Error>(())
//! ```

mod archive_open;
mod cursor;
mod entry;
mod options;
mod packed;

pub use entry::{Entry, EntryReader};
pub use options::ReadOptions;

use std::io::{self, Read, Seek};
use std::sync::{Arc, Mutex};

use lru::LruCache;

#[cfg(feature = "aes")]
use crate::crypto::KeyCache;
use crate::crypto::Password;
use crate::format::parser::ArchiveHeader;
use crate::{Error, Result};

use cursor::FolderCursor;
use entry::EntryProgress;

/// A 7z archive reader.
///
/// One archive instance is driven by one thread at a time; independent
/// instances share nothing.
pub struct Archive<R> {
    source: Arc<Mutex<R>>,
    header: ArchiveHeader,
    entries: Vec<Entry>,
    password: Option<Password>,
    max_memory_kib: Option<u64>,
    archive_name: Option<String>,
    #[cfg(feature = "aes")]
    key_cache: KeyCache,
    pipelines: LruCache<usize, FolderCursor>,
    next_index: usize,
    sequential_folder: Option<usize>,
    current: Option<EntryProgress>,
}

impl<R> std::fmt::Debug for Archive<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Archive")
            .field("archive_name", &self.archive_name)
            .field("entries", &self.entries.len())
            .field("folders", &self.header.folders().len())
            .field("pipelines", &self.pipelines.len())
            .finish_non_exhaustive()
    }
}

impl<R: Read + Seek + Send + 'static> Archive<R> {
    /// All entries in header order.
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// The entry at `index`.
    pub fn entry(&self, index: usize) -> Option<&Entry> {
        self.entries.get(index)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the archive has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The decoded header.
    pub fn header(&self) -> &ArchiveHeader {
        &self.header
    }

    /// Advances to the next entry; its content is then read through the
    /// archive's [`Read`] implementation.
    ///
    /// Returns `None` after the last entry.
    pub fn next_entry(&mut self) -> Result<Option<Entry>> {
        self.current = None;
        let Some(entry) = self.entries.get(self.next_index).cloned() else {
            return Ok(None);
        };
        self.next_index += 1;

        if let Some(folder) = entry.folder_index {
            // Entries without content in between do not end a folder.
            if let Some(previous) = self.sequential_folder.replace(folder) {
                if previous != folder {
                    log::debug!("leaving folder {previous}; dropping its pipeline");
                    self.pipelines.pop(&previous);
                }
            }
        }
        self.current = Some(EntryProgress::new(&entry));
        Ok(Some(entry))
    }

    /// Opens the content of the entry at `index` for reading.
    ///
    /// Entries may be opened in any order and any number of times.
    pub fn entry_reader(&mut self, index: usize) -> Result<EntryReader<'_, R>> {
        let entry = self.entries.get(index).ok_or(Error::EntryNotFound { index })?;
        let progress = EntryProgress::new(entry);
        Ok(EntryReader {
            archive: self,
            progress,
        })
    }

    /// Reads the whole content of the entry at `index`.
    pub fn read_entry_to_vec(&mut self, index: usize) -> Result<Vec<u8>> {
        let mut reader = self.entry_reader(index)?;
        let mut out = Vec::with_capacity(usize::try_from(reader.remaining()).unwrap_or(0));
        reader.read_to_end(&mut out).map_err(Error::from_io)?;
        Ok(out)
    }
}

impl<R: Read + Seek + Send + 'static> Read for Archive<R> {
    /// Reads the content of the entry returned by the last
    /// [`next_entry`](Archive::next_entry).
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let Some(mut progress) = self.current.take() else {
            return Ok(0);
        };
        let result = self.read_entry(&mut progress, buf);
        self.current = Some(progress);
        Ok(result?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::header::StartHeader;
    use crate::format::parser::encode_header;
    use std::io::Cursor;

    fn make_empty_archive() -> Vec<u8> {
        let header = encode_header(&ArchiveHeader::default());
        let start = StartHeader::new(0, header.len() as u64, crate::checksum::Crc32::compute(&header));
        let mut data = start.to_bytes().to_vec();
        data.extend_from_slice(&header);
        data
    }

    #[test]
    fn test_open_empty_archive() {
        let mut archive = Archive::open(Cursor::new(make_empty_archive())).unwrap();
        assert!(archive.is_empty());
        assert_eq!(archive.len(), 0);
        assert!(archive.next_entry().unwrap().is_none());
        let mut buf = [0u8; 4];
        assert_eq!(archive.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_entry_not_found() {
        let mut archive = Archive::open(Cursor::new(make_empty_archive())).unwrap();
        assert!(matches!(
            archive.entry_reader(3),
            Err(Error::EntryNotFound { index: 3 })
        ));
    }

    #[test]
    fn test_leaving_folder_past_empty_entry_drops_pipeline() {
        use crate::codec::Method;
        use crate::write::{WriteOptions, Writer};

        let mut writer = Writer::create(Cursor::new(Vec::new())).unwrap();
        writer = writer.options(WriteOptions::new().method(Method::Copy).solid(false));
        writer.add_bytes("a.txt", b"first folder").unwrap();
        writer.add_bytes("empty.txt", b"").unwrap();
        writer.add_directory("dir").unwrap();
        writer.add_bytes("b.txt", b"second folder").unwrap();
        writer.finish().unwrap();
        let bytes = writer.into_inner().into_inner();

        let mut archive = Archive::open(Cursor::new(bytes)).unwrap();
        let mut seen = Vec::new();
        while let Some(entry) = archive.next_entry().unwrap() {
            let mut content = Vec::new();
            archive.read_to_end(&mut content).unwrap();
            seen.push((entry.name().to_string(), content, archive.pipelines.len()));
        }
        assert_eq!(seen[0], ("a.txt".into(), b"first folder".to_vec(), 1));
        assert_eq!(seen[1].2, 1);
        assert_eq!(seen[2].2, 1);
        assert_eq!(seen[3], ("b.txt".into(), b"second folder".to_vec(), 1));
        assert!(archive.pipelines.contains(&1));
        assert!(!archive.pipelines.contains(&0));
    }

    #[test]
    fn test_header_without_files_info() {
        // A bare Header record, as some writers emit for empty archives.
        let header = [0x01, 0x00];
        let start = StartHeader::new(0, 2, crate::checksum::Crc32::compute(&header));
        let mut data = start.to_bytes().to_vec();
        data.extend_from_slice(&header);
        let mut archive = Archive::open(Cursor::new(data)).unwrap();
        assert!(archive.next_entry().unwrap().is_none());
        assert!(archive.entries().is_empty());
    }
}
