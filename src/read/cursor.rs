//! Decoder pipelines and their positions within folder outputs.

use std::io::{self, Read, Seek};
use std::sync::Arc;

use crate::codec::{DecodeContext, graph};
use crate::format::SIGNATURE_HEADER_SIZE;
use crate::{Error, Result};

use super::Archive;
use super::entry::EntryProgress;
use super::packed::PackedStreamReader;

/// A live decoder pipeline for one folder and how far it has been read.
pub(crate) struct FolderCursor {
    stream: Box<dyn Read + Send>,
    position: u64,
}

impl FolderCursor {
    /// Discards decoded bytes up to `position`, which must not be behind
    /// the cursor.
    fn skip_to(&mut self, position: u64) -> io::Result<()> {
        let gap = position - self.position;
        if gap == 0 {
            return Ok(());
        }
        let skipped = io::copy(&mut (&mut self.stream).take(gap), &mut io::sink())?;
        self.position += skipped;
        if skipped < gap {
            return Err(Error::Truncated {
                needed: gap - skipped,
                context: "folder data",
            }
            .into());
        }
        Ok(())
    }
}

impl<R: Read + Seek + Send + 'static> Archive<R> {
    fn decode_context(&self) -> DecodeContext<'_> {
        DecodeContext {
            password: self.password.as_ref(),
            max_memory_kib: self.max_memory_kib,
            archive_name: self.archive_name.as_deref(),
            #[cfg(feature = "aes")]
            key_cache: Some(&self.key_cache),
        }
    }

    /// Builds a fresh pipeline for `folder_index` positioned at its start.
    fn open_folder(&self, folder_index: usize) -> Result<FolderCursor> {
        let missing = || Error::corrupt_header(0, format!("folder {folder_index} is out of range"));
        let folder = self.header.folders().get(folder_index).ok_or_else(missing)?;
        let first = *self
            .header
            .stream_map
            .folder_first_pack_stream
            .get(folder_index)
            .ok_or_else(missing)?;
        let pack_sizes = self
            .header
            .streams
            .as_ref()
            .and_then(|s| s.pack_info.as_ref())
            .map_or(&[][..], |p| p.pack_sizes.as_slice());
        let base = SIGNATURE_HEADER_SIZE + self.header.pack_pos();

        let mut packed: Vec<Box<dyn Read + Send>> = Vec::with_capacity(folder.packed_streams.len());
        for stream in first..first + folder.packed_streams.len() {
            let offset = self.header.stream_map.pack_stream_offsets.get(stream);
            let (Some(&offset), Some(&size)) = (offset, pack_sizes.get(stream)) else {
                return Err(Error::corrupt_header(
                    0,
                    format!("folder {folder_index} reads missing packed stream {stream}"),
                ));
            };
            packed.push(Box::new(PackedStreamReader::new(
                Arc::clone(&self.source),
                base + offset,
                size,
            )));
        }

        let stream = graph::build_decode_stream(folder, packed, &self.decode_context())?;
        Ok(FolderCursor {
            stream,
            position: 0,
        })
    }

    /// The cached pipeline of `folder`, positioned at `position`.
    ///
    /// A pipeline already past `position` is rebuilt and fast-forwarded.
    fn pipeline_at(&mut self, folder: usize, position: u64) -> Result<&mut FolderCursor> {
        let reusable = self
            .pipelines
            .peek(&folder)
            .is_some_and(|c| c.position <= position);
        if !reusable {
            if self.pipelines.contains(&folder) {
                log::debug!("rebuilding pipeline of folder {folder} to seek back to {position}");
            }
            let cursor = self.open_folder(folder)?;
            self.pipelines.put(folder, cursor);
        }
        let cursor = self
            .pipelines
            .get_mut(&folder)
            .ok_or(Error::InvalidState("folder pipeline missing from cache"))?;
        cursor.skip_to(position).map_err(Error::from_io)?;
        Ok(cursor)
    }

    /// Reads the next bytes of the entry tracked by `progress`.
    pub(crate) fn read_entry(&mut self, progress: &mut EntryProgress, buf: &mut [u8]) -> Result<usize> {
        let Some(folder) = progress.folder else {
            return Ok(0);
        };
        if progress.remaining() == 0 {
            progress.advance(&[])?;
            return Ok(0);
        }
        if buf.is_empty() {
            return Ok(0);
        }

        let (encrypted, index) = (progress.encrypted, progress.index);
        let want = buf.len().min(usize::try_from(progress.remaining()).unwrap_or(usize::MAX));
        let position = progress.start + progress.done;
        let n = self
            .read_folder(folder, position, &mut buf[..want])
            .map_err(|e| e.in_encrypted_context(encrypted, Some(index)))?;
        if n == 0 {
            let err = Error::Truncated {
                needed: progress.remaining(),
                context: "entry data",
            };
            return Err(err.in_encrypted_context(encrypted, Some(index)));
        }
        progress.advance(&buf[..n])?;
        Ok(n)
    }

    fn read_folder(&mut self, folder: usize, position: u64, buf: &mut [u8]) -> Result<usize> {
        let cursor = self.pipeline_at(folder, position)?;
        let n = cursor.stream.read(buf).map_err(Error::from_io)?;
        cursor.position += n as u64;
        Ok(n)
    }
}
