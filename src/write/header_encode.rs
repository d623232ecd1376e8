//! Building and packing the end header.

use std::io::{Seek, Write};

use crate::codec::{CodecRegistry, EncodeContext, Method, MethodConfiguration, graph};
use crate::format::parser::{ArchiveHeader, encode_encoded_header, encode_header};
use crate::format::streams::{PackInfo, StreamsInfo, SubStreamsInfo, UnpackInfo};
use crate::{Error, Result};

use super::Writer;

impl<W: Write + Seek> Writer<W> {
    /// The header describing every folder and entry written so far.
    pub(super) fn build_header(&self) -> Result<ArchiveHeader> {
        let streams = (!self.folders.is_empty()).then(|| StreamsInfo {
            pack_info: Some(PackInfo {
                pack_pos: 0,
                pack_sizes: self.folders.iter().map(|f| f.pack_size).collect(),
                pack_crcs: vec![None; self.folders.len()],
            }),
            unpack_info: Some(UnpackInfo {
                folders: self.folders.iter().map(|f| f.folder.clone()).collect(),
            }),
            substreams_info: Some(SubStreamsInfo {
                num_unpack_streams: self.folders.iter().map(|f| f.sizes.len()).collect(),
                unpack_sizes: self.folders.iter().flat_map(|f| f.sizes.clone()).collect(),
                digests: self
                    .folders
                    .iter()
                    .flat_map(|f| f.crcs.iter().copied().map(Some))
                    .collect(),
            }),
        });
        ArchiveHeader::new(streams, self.entries.clone())
    }

    /// Serializes `header`, packing it when header compression is enabled.
    ///
    /// A packed header's stream is appended to the sink here; the returned
    /// bytes are the record the start header points to.
    pub(super) fn write_header_record(&mut self, header: &ArchiveHeader) -> Result<Vec<u8>> {
        let plain = encode_header(header);
        let registry = CodecRegistry::builtin();
        let encrypt = self.options.encrypt_header;
        if encrypt && self.options.password.is_none() {
            return Err(Error::InvalidParameter(
                "header encryption needs a password".into(),
            ));
        }
        if !(self.options.compress_header || encrypt) || header.files.is_empty() {
            return Ok(plain);
        }

        let mut chain = Vec::new();
        if registry.can_encode(Method::Lzma2) {
            chain.push(MethodConfiguration::new(Method::Lzma2));
        } else if !encrypt {
            return Ok(plain);
        } else {
            chain.push(MethodConfiguration::new(Method::Copy));
        }
        if encrypt {
            chain.push(MethodConfiguration::new(Method::Aes256Sha256));
        }
        let ctx = EncodeContext {
            password: self.options.password.as_ref(),
        };
        let mut stage = graph::build_encode_stream(registry, &chain, &ctx)?;
        stage.write_all(&plain).map_err(Error::from_io)?;
        let encoded = stage.finish()?;

        let mut folder = encoded.folder;
        folder.unpack_crc = Some(encoded.crc);
        let streams = StreamsInfo {
            pack_info: Some(PackInfo {
                pack_pos: self.packed_bytes,
                pack_sizes: vec![encoded.packed.len() as u64],
                pack_crcs: vec![None],
            }),
            unpack_info: Some(UnpackInfo {
                folders: vec![folder],
            }),
            substreams_info: None,
        };
        self.sink.write_all(&encoded.packed)?;
        self.packed_bytes += encoded.packed.len() as u64;
        log::debug!(
            "packed {} byte header into {} bytes",
            plain.len(),
            encoded.packed.len()
        );
        Ok(encode_encoded_header(&streams))
    }
}
