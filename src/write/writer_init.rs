//! Writer initialization and finalization.

use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::Path;

use crate::checksum::Crc32;
use crate::format::SIGNATURE_HEADER_SIZE;
use crate::format::header::StartHeader;
use crate::{Error, Result};

use super::options::{WriteOptions, WriteResult};
use super::{Writer, WriterState};

impl Writer<BufWriter<File>> {
    /// Creates a new archive file at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created.
    pub fn create_path(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::create(path.as_ref()).map_err(Error::Io)?;
        Self::create(BufWriter::new(file))
    }
}

impl<W: Write + Seek> Writer<W> {
    /// Creates a new archive writer.
    ///
    /// The signature header is reserved as zeros until
    /// [`finish`](Self::finish); an archive abandoned before that reads as
    /// unfinished.
    pub fn create(mut sink: W) -> Result<Self> {
        let placeholder = [0u8; SIGNATURE_HEADER_SIZE as usize];
        sink.write_all(&placeholder).map_err(Error::Io)?;

        Ok(Self {
            sink,
            options: WriteOptions::default(),
            state: WriterState::AcceptingEntries,
            entries: Vec::new(),
            folders: Vec::new(),
            current: None,
            building: None,
            packed_bytes: 0,
        })
    }

    /// Sets the write options.
    pub fn options(mut self, options: WriteOptions) -> Self {
        self.options = options;
        self
    }

    /// Finishes the archive: closes an open entry, writes the last folder,
    /// the end header and the start header.
    ///
    /// # Errors
    ///
    /// A second call fails with [`Error::InvalidState`].
    pub fn finish(&mut self) -> Result<WriteResult> {
        self.ensure_accepting()?;
        if self.current.is_some() {
            self.close_entry()?;
        }
        // A failure below leaves a broken archive; no retry is allowed.
        self.state = WriterState::Finished;
        self.flush_folder()?;

        let header = self.build_header()?;
        let record = self.write_header_record(&header)?;
        self.sink.write_all(&record)?;

        let start = StartHeader::new(
            self.packed_bytes,
            record.len() as u64,
            Crc32::compute(&record),
        );
        let end = self.sink.stream_position()?;
        self.sink.seek(SeekFrom::Start(0))?;
        self.sink.write_all(&start.to_bytes())?;
        self.sink.seek(SeekFrom::Start(end))?;
        self.sink.flush()?;

        Ok(WriteResult {
            entries_written: self.entries.len(),
            folders_written: self.folders.len(),
            total_size: self.entries.iter().map(|e| e.size).sum(),
            packed_size: self.folders.iter().map(|f| f.pack_size).sum(),
        })
    }

    /// Returns the sink.
    pub fn into_inner(self) -> W {
        self.sink
    }
}
