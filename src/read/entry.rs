//! Archive entries and readers for their content.

use std::io::{self, Read, Seek};
use std::time::SystemTime;

use crate::checksum::Crc32;
use crate::codec::{Method, MethodConfiguration};
use crate::timestamp::Timestamp;
use crate::{Error, Result};

use super::Archive;

/// An entry in a 7z archive.
///
/// This struct is marked `#[non_exhaustive]` to allow adding new fields
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct Entry {
    /// Position in the archive's entry list.
    pub index: usize,
    /// Name as stored, or the default name if the archive was opened with
    /// [`use_default_name_for_unnamed_entries`](super::ReadOptions::use_default_name_for_unnamed_entries).
    pub name: Option<String>,
    /// Whether this entry is a directory.
    pub is_directory: bool,
    /// Whether this is an anti-item (marks a path for deletion).
    pub is_anti: bool,
    /// Whether the entry has content stored in a folder.
    pub has_stream: bool,
    /// Uncompressed size in bytes.
    pub size: u64,
    /// CRC-32 of the content, if stored.
    pub crc: Option<u32>,
    /// Creation time.
    pub creation_time: Option<Timestamp>,
    /// Last access time.
    pub access_time: Option<Timestamp>,
    /// Last modification time.
    pub modification_time: Option<Timestamp>,
    /// Windows file attributes.
    pub attributes: Option<u32>,
    /// Folder holding the content; `None` for entries without content.
    pub folder_index: Option<usize>,
    /// Byte offset of the content within the folder's decoded output.
    pub offset_in_folder: u64,
    /// The folder's method chain in encoding order.
    pub content_methods: Vec<MethodConfiguration>,
}

impl Entry {
    /// The name, or `""` for unnamed entries.
    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or("")
    }

    /// Returns true if this is a file (not a directory).
    pub fn is_file(&self) -> bool {
        !self.is_directory
    }

    /// Whether the content is AES encrypted.
    pub fn is_encrypted(&self) -> bool {
        self.content_methods
            .iter()
            .any(|m| m.method == Method::Aes256Sha256)
    }

    /// Returns the modification time as a SystemTime (if available).
    pub fn modified(&self) -> Option<SystemTime> {
        self.modification_time.map(|ts| ts.as_system_time())
    }
}

/// Read state of one entry's content.
#[derive(Debug)]
pub(crate) struct EntryProgress {
    pub index: usize,
    pub name: Option<String>,
    pub folder: Option<usize>,
    pub start: u64,
    pub size: u64,
    pub done: u64,
    pub expected_crc: Option<u32>,
    pub encrypted: bool,
    crc: Crc32,
    verified: bool,
}

impl EntryProgress {
    pub fn new(entry: &Entry) -> Self {
        Self {
            index: entry.index,
            name: entry.name.clone(),
            folder: entry.folder_index.filter(|_| entry.has_stream),
            start: entry.offset_in_folder,
            size: entry.size,
            done: 0,
            expected_crc: entry.crc,
            encrypted: entry.is_encrypted(),
            crc: Crc32::new(),
            verified: false,
        }
    }

    pub fn remaining(&self) -> u64 {
        self.size - self.done
    }

    /// Accounts for `data` just delivered; checks the CRC once the entry
    /// is complete.
    pub fn advance(&mut self, data: &[u8]) -> Result<()> {
        self.crc.update(data);
        self.done += data.len() as u64;
        if self.remaining() == 0 {
            self.verify()?;
        }
        Ok(())
    }

    fn verify(&mut self) -> Result<()> {
        if std::mem::replace(&mut self.verified, true) {
            return Ok(());
        }
        match self.expected_crc {
            Some(expected) if self.crc.finalize() != expected => {
                let err = Error::crc_mismatch(
                    self.index,
                    self.name.clone(),
                    expected,
                    self.crc.finalize(),
                );
                Err(err.in_encrypted_context(self.encrypted, Some(self.index)))
            }
            _ => Ok(()),
        }
    }
}

/// Reads the content of one entry, returned by
/// [`Archive::entry_reader`].
///
/// The read call that completes the entry fails with
/// [`Error::CrcMismatch`] if the content does not match its stored CRC.
pub struct EntryReader<'a, R> {
    pub(crate) archive: &'a mut Archive<R>,
    pub(crate) progress: EntryProgress,
}

impl<R> std::fmt::Debug for EntryReader<'_, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntryReader")
            .field("index", &self.progress.index)
            .field("remaining", &self.progress.remaining())
            .finish_non_exhaustive()
    }
}

impl<R> EntryReader<'_, R> {
    /// Bytes of the entry not read yet.
    pub fn remaining(&self) -> u64 {
        self.progress.remaining()
    }
}

impl<R: Read + Seek + Send + 'static> Read for EntryReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.archive.read_entry(&mut self.progress, buf)?)
    }
}
