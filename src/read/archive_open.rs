//! Archive opening methods.

use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::{Arc, Mutex};

use lru::LruCache;

use crate::codec::{CodecRegistry, DecodeContext, MethodConfiguration, graph};
#[cfg(feature = "aes")]
use crate::crypto::KeyCache;
use crate::crypto::Password;
use crate::format::parser::{ArchiveHeader, HeaderParser};
use crate::{Error, Result};

use super::options::default_entry_name;
use super::{Archive, Entry, ReadOptions};

impl Archive<BufReader<File>> {
    /// Opens an archive file.
    ///
    /// The file name is used in error messages and for default entry
    /// names.
    pub fn open_path(path: impl AsRef<Path>, options: ReadOptions) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(Error::Io)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned());
        Self::open_internal(BufReader::new(file), options, name)
    }
}

impl<R: Read + Seek + Send + 'static> Archive<R> {
    /// Opens an archive from a reader.
    ///
    /// # Errors
    ///
    /// Returns an error if the archive is invalid or cannot be read.
    pub fn open(reader: R) -> Result<Self> {
        Self::open_internal(reader, ReadOptions::default(), None)
    }

    /// Opens an archive whose header or content is encrypted.
    pub fn open_with_password(reader: R, password: impl Into<Password>) -> Result<Self> {
        Self::open_internal(reader, ReadOptions::new().password(password), None)
    }

    /// Opens an archive with explicit options.
    ///
    /// With [`ReadOptions::max_memory_kib`] set, every coder of every
    /// folder is checked here, so an archive needing more memory fails to
    /// open rather than failing on first read.
    pub fn open_with_options(reader: R, options: ReadOptions) -> Result<Self> {
        Self::open_internal(reader, options, None)
    }

    fn open_internal(
        mut reader: R,
        options: ReadOptions,
        archive_name: Option<String>,
    ) -> Result<Self> {
        #[cfg(feature = "aes")]
        let key_cache = KeyCache::default();

        let header = {
            let ctx = DecodeContext {
                password: options.password.as_ref(),
                max_memory_kib: options.max_memory_kib,
                archive_name: archive_name.as_deref(),
                #[cfg(feature = "aes")]
                key_cache: Some(&key_cache),
            };
            let parser = HeaderParser::new(options.limits.clone(), ctx)
                .try_to_recover_broken_archives(options.recover_broken);
            let (_, header) = parser.read_archive_header(&mut reader)?;
            header
        };

        if let Some(limit_kib) = options.max_memory_kib {
            for folder in header.folders() {
                graph::check_folder_memory(CodecRegistry::builtin(), folder, limit_kib)?;
            }
        }

        let default_name = if options.use_default_name {
            options
                .default_name
                .clone()
                .or_else(|| archive_name.as_deref().map(default_entry_name))
        } else {
            None
        };
        let entries = build_entries(&header, default_name.as_deref());
        log::debug!(
            "opened archive with {} entries in {} folders",
            entries.len(),
            header.folders().len()
        );

        let capacity = NonZeroUsize::new(header.folders().len()).unwrap_or(NonZeroUsize::MIN);
        Ok(Self {
            source: Arc::new(Mutex::new(reader)),
            header,
            entries,
            password: options.password,
            max_memory_kib: options.max_memory_kib,
            archive_name,
            #[cfg(feature = "aes")]
            key_cache,
            pipelines: LruCache::new(capacity),
            next_index: 0,
            sequential_folder: None,
            current: None,
        })
    }
}

/// Derives the public entries: folder placement, offsets within the folder
/// output and the content methods.
fn build_entries(header: &ArchiveHeader, default_name: Option<&str>) -> Vec<Entry> {
    let folders = header.folders();
    let methods: Vec<Vec<MethodConfiguration>> = folders
        .iter()
        .map(|folder| {
            folder
                .ordered_coders()
                .into_iter()
                .filter_map(|i| MethodConfiguration::from_coder(&folder.coders[i]))
                .collect()
        })
        .collect();
    let mut folder_offsets = vec![0u64; folders.len()];

    header
        .files
        .iter()
        .enumerate()
        .map(|(index, file)| {
            let folder_index = header.stream_map.file_folder.get(index).copied().flatten();
            let mut offset_in_folder = 0;
            if let Some(folder) = folder_index {
                offset_in_folder = folder_offsets[folder];
                folder_offsets[folder] += file.size;
            }
            Entry {
                index,
                name: file
                    .name
                    .clone()
                    .or_else(|| default_name.map(str::to_string)),
                is_directory: file.is_directory,
                is_anti: file.is_anti,
                has_stream: file.has_stream,
                size: file.size,
                crc: file.crc,
                creation_time: file.ctime,
                access_time: file.atime,
                modification_time: file.mtime,
                attributes: file.attributes,
                folder_index,
                offset_in_folder,
                content_methods: folder_index
                    .and_then(|f| methods.get(f).cloned())
                    .unwrap_or_default(),
            }
        })
        .collect()
}
