//! Entry lifecycle and folder assembly.

use std::io::{Seek, Write};

use crate::checksum::Crc32;
use crate::codec::{CodecRegistry, EncodeContext, Method, MethodConfiguration, graph};
use crate::format::files::ArchiveEntry;
use crate::{Error, Result};

use super::{EntryMeta, FolderBuilder, OpenEntry, Writer, WriterState, WrittenFolder};

impl<W: Write + Seek> Writer<W> {
    /// Replaces the content method chain for entries opened from now on.
    pub fn set_content_methods(&mut self, methods: Vec<MethodConfiguration>) {
        self.options.methods = methods;
    }

    /// Opens an entry. Content is supplied through [`Write`] until
    /// [`close_entry`](Self::close_entry).
    ///
    /// # Errors
    ///
    /// [`Error::InvalidState`] after [`finish`](Self::finish) or while
    /// another entry is open; [`Error::InvalidParameter`] for an empty
    /// method chain; [`Error::UnsupportedMethod`] for a chain this crate
    /// cannot write.
    pub fn put_entry(&mut self, meta: EntryMeta) -> Result<()> {
        self.ensure_accepting()?;
        if self.current.is_some() {
            return Err(Error::InvalidState("an entry is already open"));
        }

        let mut chain = meta
            .content_methods
            .clone()
            .unwrap_or_else(|| self.options.methods.clone());
        if chain.is_empty() {
            return Err(Error::InvalidParameter("empty content method chain".into()));
        }
        if self.options.password.is_some()
            && !chain.iter().any(|m| m.method == Method::Aes256Sha256)
        {
            chain.push(MethodConfiguration::new(Method::Aes256Sha256));
        }
        let registry = CodecRegistry::builtin();
        if let Some(unwritable) = chain.iter().find(|m| !registry.can_encode(m.method)) {
            return Err(Error::UnsupportedMethod {
                method_id: crate::format::reader::from_be_bytes(unwritable.method.id()),
            });
        }

        self.current = Some(OpenEntry {
            meta,
            chain,
            crc: Crc32::new(),
            size: 0,
        });
        Ok(())
    }

    /// Closes the open entry.
    pub fn close_entry(&mut self) -> Result<()> {
        self.ensure_accepting()?;
        let open = self
            .current
            .take()
            .ok_or(Error::InvalidState("no entry is open"))?;
        let has_stream = open.size > 0;
        let crc = open.crc.finalize();

        if has_stream {
            let builder = self
                .building
                .as_mut()
                .ok_or(Error::InvalidState("entry content has no folder"))?;
            builder.sizes.push(open.size);
            builder.crcs.push(crc);
            if !self.options.solid {
                self.flush_folder()?;
            }
        }

        let meta = open.meta;
        self.entries.push(ArchiveEntry {
            name: Some(meta.name),
            has_stream,
            is_directory: meta.is_directory,
            is_anti: meta.is_anti,
            size: open.size,
            crc: has_stream.then_some(crc),
            ctime: meta.creation_time,
            atime: meta.access_time,
            mtime: meta.modification_time,
            attributes: meta.attributes,
        });
        Ok(())
    }

    /// Adds a file with the given content.
    pub fn add_bytes(&mut self, name: impl Into<String>, data: &[u8]) -> Result<()> {
        self.put_entry(EntryMeta::file(name))?;
        self.write_content(data)?;
        self.close_entry()
    }

    /// Adds a directory.
    pub fn add_directory(&mut self, name: impl Into<String>) -> Result<()> {
        self.put_entry(EntryMeta::directory(name))?;
        self.close_entry()
    }

    /// Adds an anti-item.
    pub fn add_anti_item(&mut self, name: impl Into<String>) -> Result<()> {
        self.put_entry(EntryMeta::anti_item(name))?;
        self.close_entry()
    }

    pub(super) fn ensure_accepting(&self) -> Result<()> {
        match self.state {
            WriterState::AcceptingEntries => Ok(()),
            WriterState::Finished => Err(Error::InvalidState(
                "This archive has already been finished",
            )),
        }
    }

    /// Feeds content of the open entry into its folder.
    pub(super) fn write_content(&mut self, data: &[u8]) -> Result<()> {
        self.ensure_accepting()?;
        let open = self
            .current
            .as_ref()
            .ok_or(Error::InvalidState("no entry is open"))?;
        if open.meta.is_directory || open.meta.is_anti {
            return Err(Error::InvalidState("directories and anti-items have no content"));
        }
        if data.is_empty() {
            return Ok(());
        }

        let reusable = self
            .building
            .as_ref()
            .is_some_and(|b| b.chain == open.chain);
        if !reusable {
            let chain = open.chain.clone();
            self.flush_folder()?;
            self.start_folder(chain)?;
        }

        let builder = self
            .building
            .as_mut()
            .ok_or(Error::InvalidState("entry content has no folder"))?;
        builder.sink.write_all(data).map_err(Error::from_io)?;
        if let Some(open) = self.current.as_mut() {
            open.crc.update(data);
            open.size += data.len() as u64;
        }
        Ok(())
    }

    fn start_folder(&mut self, chain: Vec<MethodConfiguration>) -> Result<()> {
        let ctx = EncodeContext {
            password: self.options.password.as_ref(),
        };
        let sink = graph::build_encode_stream(CodecRegistry::builtin(), &chain, &ctx)?;
        self.building = Some(FolderBuilder {
            chain,
            sink,
            sizes: Vec::new(),
            crcs: Vec::new(),
        });
        Ok(())
    }

    /// Finishes the folder being filled and appends its packed stream.
    pub(super) fn flush_folder(&mut self) -> Result<()> {
        let Some(builder) = self.building.take() else {
            return Ok(());
        };
        if builder.sizes.is_empty() {
            return Ok(());
        }
        let encoded = builder.sink.finish()?;
        self.sink.write_all(&encoded.packed)?;
        let pack_size = encoded.packed.len() as u64;
        self.packed_bytes += pack_size;
        log::debug!(
            "folder {} packed {} entries into {} bytes",
            self.folders.len(),
            builder.sizes.len(),
            pack_size
        );
        self.folders.push(WrittenFolder {
            folder: encoded.folder,
            pack_size,
            sizes: builder.sizes,
            crcs: builder.crcs,
        });
        Ok(())
    }
}
