//! Header decoding and encoding.
//!
//! The end header is either a plain `Header` record or an encoded header:
//! a StreamsInfo block describing one folder whose output is, again, a
//! header. [`HeaderParser`] unwraps encoded headers through the folder
//! graph resolver, so any method chain the crate can decode may protect a
//! header, including AES.

use std::io::{Cursor, Read, Seek, SeekFrom};

use crate::checksum::Crc32;
use crate::codec::{DecodeContext, graph, method};
use crate::{Error, Result};

use super::files::{ArchiveEntry, parse_files_info, write_files_info};
use super::header::StartHeader;
use super::reader::{read_bytes, read_number, read_u8};
use super::streams::{Folder, ResourceLimits, StreamsInfo};
use super::{SIGNATURE_HEADER_SIZE, property_id};

/// How many encoded headers may wrap each other.
pub const MAX_ENCODED_HEADER_DEPTH: u32 = 4;

/// How far back from the end of an unfinished archive the recovery scan
/// looks for an end header.
pub const RECOVERY_SEARCH_LIMIT: u64 = 1 << 20;

/// Index tables derived from the streams and files of a header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamMap {
    /// First packed stream of every folder.
    pub folder_first_pack_stream: Vec<usize>,
    /// Offset of every packed stream relative to the pack position.
    pub pack_stream_offsets: Vec<u64>,
    /// First entry stored in every folder; `None` for folders without
    /// substreams.
    pub folder_first_file: Vec<Option<usize>>,
    /// Folder holding every entry's data; `None` for entries without data.
    pub file_folder: Vec<Option<usize>>,
}

impl StreamMap {
    /// Assigns entries with data to folder substreams in order.
    ///
    /// Fails if the entries need more substreams than the folders provide
    /// or leave some unused.
    pub fn build(streams: Option<&StreamsInfo>, files: &[ArchiveEntry]) -> Result<Self> {
        let folders = streams.map_or(&[][..], StreamsInfo::folders);
        let substreams = streams.map(StreamsInfo::substreams).unwrap_or_default();

        let mut folder_first_pack_stream = Vec::with_capacity(folders.len());
        let mut next_pack = 0;
        for folder in folders {
            folder_first_pack_stream.push(next_pack);
            next_pack += folder.packed_streams.len();
        }

        let pack_sizes = streams
            .and_then(|s| s.pack_info.as_ref())
            .map_or(&[][..], |p| p.pack_sizes.as_slice());
        let mut pack_stream_offsets = Vec::with_capacity(pack_sizes.len());
        let mut offset = 0u64;
        for &size in pack_sizes {
            pack_stream_offsets.push(offset);
            offset = offset.saturating_add(size);
        }

        let mut folder_first_file = vec![None; folders.len()];
        let mut file_folder = vec![None; files.len()];
        let mut next_folder = 0;
        let mut next_substream = 0;
        for (index, file) in files.iter().enumerate() {
            if !file.has_stream {
                continue;
            }
            if next_substream == 0 {
                while next_folder < folders.len()
                    && substreams.num_unpack_streams.get(next_folder) == Some(&0)
                {
                    next_folder += 1;
                }
                if next_folder >= folders.len() {
                    return Err(Error::corrupt_header(0, "too few folders in archive"));
                }
                folder_first_file[next_folder] = Some(index);
            }
            file_folder[index] = Some(next_folder);
            next_substream += 1;
            if next_substream >= substreams.num_unpack_streams[next_folder] {
                next_folder += 1;
                next_substream = 0;
            }
        }

        let with_data = files.iter().filter(|f| f.has_stream).count();
        let total = substreams.total_streams();
        if with_data != total {
            return Err(Error::corrupt_header(
                0,
                format!("{with_data} entries with data but {total} substreams"),
            ));
        }

        Ok(Self {
            folder_first_pack_stream,
            pack_stream_offsets,
            folder_first_file,
            file_folder,
        })
    }
}

/// A decoded end header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchiveHeader {
    /// Packed streams and folders; `None` for archives without data.
    pub streams: Option<StreamsInfo>,
    /// Entries in header order.
    pub files: Vec<ArchiveEntry>,
    /// Derived lookup tables.
    pub stream_map: StreamMap,
}

impl ArchiveHeader {
    /// Combines streams and entries, checking that they agree.
    pub fn new(streams: Option<StreamsInfo>, files: Vec<ArchiveEntry>) -> Result<Self> {
        let stream_map = StreamMap::build(streams.as_ref(), &files)?;
        Ok(Self {
            streams,
            files,
            stream_map,
        })
    }

    /// The folders, or an empty slice.
    pub fn folders(&self) -> &[Folder] {
        self.streams.as_ref().map_or(&[], StreamsInfo::folders)
    }

    /// Number of packed streams.
    pub fn num_pack_streams(&self) -> usize {
        self.streams.as_ref().map_or(0, StreamsInfo::num_pack_streams)
    }

    /// Position of the first packed stream, relative to the end of the
    /// signature header.
    pub fn pack_pos(&self) -> u64 {
        self.streams
            .as_ref()
            .and_then(|s| s.pack_info.as_ref())
            .map_or(0, |p| p.pack_pos)
    }
}

/// Decodes a plain header blob starting with the `Header` marker.
pub fn decode_header(data: &[u8], limits: &ResourceLimits) -> Result<ArchiveHeader> {
    if data.len() as u64 > limits.max_header_bytes {
        return Err(Error::ResourceLimitExceeded(format!(
            "header of {} bytes",
            data.len()
        )));
    }
    let mut r = Cursor::new(data);
    let marker = read_u8(&mut r)?;
    if marker != property_id::HEADER {
        return Err(Error::corrupt_header(
            0,
            format!("expected header marker, found {marker:#x}"),
        ));
    }

    let mut prop = read_u8(&mut r)?;
    if prop == property_id::ARCHIVE_PROPERTIES {
        skip_archive_properties(&mut r)?;
        prop = read_u8(&mut r)?;
    }
    if prop == property_id::ADDITIONAL_STREAMS_INFO {
        return Err(Error::UnsupportedFeature {
            feature: "additional streams",
        });
    }
    let mut streams = None;
    if prop == property_id::MAIN_STREAMS_INFO {
        streams = Some(StreamsInfo::parse(&mut r, limits)?);
        prop = read_u8(&mut r)?;
    }
    let mut files = Vec::new();
    if prop == property_id::FILES_INFO {
        files = parse_files_info(&mut r, limits)?;
        prop = read_u8(&mut r)?;
    }
    if prop != property_id::END {
        return Err(Error::corrupt_header(
            r.position(),
            format!("unexpected property {prop:#x} in header"),
        ));
    }

    assign_sizes(streams.as_ref(), &mut files)?;
    ArchiveHeader::new(streams, files)
}

fn skip_archive_properties<R: Read>(r: &mut R) -> Result<()> {
    loop {
        let kind = read_u8(r)?;
        if kind == property_id::END {
            return Ok(());
        }
        let size = read_number(r)?;
        read_bytes(r, size)?;
    }
}

fn assign_sizes(streams: Option<&StreamsInfo>, files: &mut [ArchiveEntry]) -> Result<()> {
    let substreams = streams.map(StreamsInfo::substreams).unwrap_or_default();
    let mut sizes = substreams.unpack_sizes.iter().zip(&substreams.digests);
    for file in files.iter_mut().filter(|f| f.has_stream) {
        let (&size, &crc) = sizes
            .next()
            .ok_or_else(|| Error::corrupt_header(0, "more entries with data than substreams"))?;
        file.size = size;
        file.crc = crc;
    }
    Ok(())
}

/// Encodes a plain header.
///
/// A header without entries still carries an empty FilesInfo record.
pub fn encode_header(header: &ArchiveHeader) -> Vec<u8> {
    let mut out = vec![property_id::HEADER];
    if let Some(streams) = &header.streams {
        out.push(property_id::MAIN_STREAMS_INFO);
        streams.write(&mut out);
    }
    write_files_info(&mut out, &header.files);
    out.push(property_id::END);
    out
}

/// Encodes the record pointing at a packed header.
pub fn encode_encoded_header(streams: &StreamsInfo) -> Vec<u8> {
    let mut out = vec![property_id::ENCODED_HEADER];
    streams.write(&mut out);
    out
}

fn uses_encryption(folder: &Folder) -> bool {
    folder.coders.iter().any(|c| c.method_id == method::AES)
}

/// Reads the end header of an archive.
#[derive(Debug, Clone)]
pub struct HeaderParser<'a> {
    limits: ResourceLimits,
    ctx: DecodeContext<'a>,
    recover_broken: bool,
}

impl<'a> HeaderParser<'a> {
    /// Creates a parser; `ctx` supplies the password and memory limit for
    /// encoded headers.
    pub fn new(limits: ResourceLimits, ctx: DecodeContext<'a>) -> Self {
        Self {
            limits,
            ctx,
            recover_broken: false,
        }
    }

    /// Enables the end header search for archives whose writer never
    /// finished.
    pub fn try_to_recover_broken_archives(mut self, recover: bool) -> Self {
        self.recover_broken = recover;
        self
    }

    /// Reads the start header and the end header it points to.
    pub fn read_archive_header<R: Read + Seek>(
        &self,
        r: &mut R,
    ) -> Result<(StartHeader, ArchiveHeader)> {
        let len = r.seek(SeekFrom::End(0))?;
        r.seek(SeekFrom::Start(0))?;
        let start = StartHeader::parse(r)?;

        if start.is_unfinished() {
            if !self.recover_broken {
                return Err(Error::InvalidFormat(
                    "archive seems to be invalid; you may want to retry and enable \
                     the recovery of broken archives"
                        .into(),
                ));
            }
            let header = self.recover(r, len)?;
            return Ok((start, header));
        }
        if start.next_header_size == 0 {
            return Ok((start, ArchiveHeader::default()));
        }

        if start.next_header_size > self.limits.max_header_bytes {
            return Err(Error::ResourceLimitExceeded(format!(
                "end header of {} bytes",
                start.next_header_size
            )));
        }
        let position = start
            .next_header_position()
            .filter(|p| p.checked_add(start.next_header_size).is_some_and(|end| end <= len))
            .ok_or(Error::Truncated {
                needed: start.next_header_size,
                context: "end header",
            })?;
        r.seek(SeekFrom::Start(position))?;
        let blob = read_bytes(r, start.next_header_size)?;
        let actual = Crc32::compute(&blob);
        if actual != start.next_header_crc {
            return Err(Error::CrcMismatch {
                entry_index: None,
                entry_name: None,
                expected: start.next_header_crc,
                actual,
            });
        }

        let header = self.parse_blob(r, blob)?;
        Ok((start, header))
    }

    /// Decodes an end header blob, unwrapping encoded headers.
    ///
    /// `r` is the archive; encoded headers read their packed data from it.
    pub fn parse_blob<R: Read + Seek>(&self, r: &mut R, blob: Vec<u8>) -> Result<ArchiveHeader> {
        let mut blob = blob;
        for _ in 0..=MAX_ENCODED_HEADER_DEPTH {
            match blob.first() {
                Some(&property_id::HEADER) => return decode_header(&blob, &self.limits),
                Some(&property_id::ENCODED_HEADER) => {
                    log::debug!("encoded header of {} bytes", blob.len());
                    blob = self.unpack_encoded(r, &blob[1..])?;
                }
                Some(&other) => {
                    return Err(Error::corrupt_header(
                        0,
                        format!("expected header marker, found {other:#x}"),
                    ));
                }
                None => return Err(Error::corrupt_header(0, "empty end header")),
            }
        }
        Err(Error::ResourceLimitExceeded(format!(
            "encoded headers nested deeper than {MAX_ENCODED_HEADER_DEPTH}"
        )))
    }

    fn unpack_encoded<R: Read + Seek>(&self, r: &mut R, record: &[u8]) -> Result<Vec<u8>> {
        let streams = StreamsInfo::parse(&mut Cursor::new(record), &self.limits)?;
        let pack = streams
            .pack_info
            .as_ref()
            .ok_or_else(|| Error::corrupt_header(0, "encoded header without pack info"))?;
        let folder = streams
            .folders()
            .first()
            .ok_or_else(|| Error::corrupt_header(0, "encoded header without folder"))?;
        let unpack_size = folder.unpack_size();
        if unpack_size > self.limits.max_header_bytes {
            return Err(Error::ResourceLimitExceeded(format!(
                "encoded header unpacks to {unpack_size} bytes"
            )));
        }

        let mut position = SIGNATURE_HEADER_SIZE.saturating_add(pack.pack_pos);
        let mut packed: Vec<Box<dyn Read + Send>> = Vec::with_capacity(folder.packed_streams.len());
        for &size in pack.pack_sizes.iter().take(folder.packed_streams.len()) {
            if size > self.limits.max_header_bytes {
                return Err(Error::ResourceLimitExceeded(format!(
                    "packed header stream of {size} bytes"
                )));
            }
            r.seek(SeekFrom::Start(position))?;
            packed.push(Box::new(Cursor::new(read_bytes(r, size)?)));
            position = position.saturating_add(size);
        }

        let encrypted = uses_encryption(folder);
        let data = self
            .decode_folder(folder, packed)
            .map_err(|e| e.in_encrypted_context(encrypted, None))?;
        if data.len() as u64 != unpack_size {
            let err = Error::Truncated {
                needed: unpack_size.saturating_sub(data.len() as u64),
                context: "encoded header",
            };
            return Err(err.in_encrypted_context(encrypted, None));
        }
        if let Some(expected) = folder.unpack_crc {
            let actual = Crc32::compute(&data);
            if actual != expected {
                let err = Error::CrcMismatch {
                    entry_index: None,
                    entry_name: None,
                    expected,
                    actual,
                };
                return Err(err.in_encrypted_context(encrypted, None));
            }
        }
        Ok(data)
    }

    fn decode_folder(&self, folder: &Folder, packed: Vec<Box<dyn Read + Send>>) -> Result<Vec<u8>> {
        let mut stream = graph::build_decode_stream(folder, packed, &self.ctx)?;
        let mut data = Vec::new();
        stream.read_to_end(&mut data).map_err(Error::from_io)?;
        Ok(data)
    }

    /// Scans backwards for a byte that starts a usable end header.
    fn recover<R: Read + Seek>(&self, r: &mut R, len: u64) -> Result<ArchiveHeader> {
        let min_pos = if SIGNATURE_HEADER_SIZE + RECOVERY_SEARCH_LIMIT > len {
            SIGNATURE_HEADER_SIZE
        } else {
            len - RECOVERY_SEARCH_LIMIT
        };
        r.seek(SeekFrom::Start(min_pos))?;
        let tail = read_bytes(r, len.saturating_sub(min_pos))?;

        let mut pos = len.saturating_sub(1);
        while pos > min_pos {
            pos -= 1;
            let at = (pos - min_pos) as usize;
            if !matches!(
                tail[at],
                property_id::HEADER | property_id::ENCODED_HEADER
            ) {
                continue;
            }
            match self.parse_blob(r, tail[at..].to_vec()) {
                Ok(header) if header.num_pack_streams() > 0 && !header.files.is_empty() => {
                    log::warn!("recovered end header guessed at offset {pos}");
                    return Ok(header);
                }
                Ok(_) => log::debug!("end header candidate at {pos} has no data"),
                Err(e) => log::debug!("end header candidate at {pos} rejected: {e}"),
            }
        }
        Err(Error::corrupt_header(
            0,
            "Start header corrupt and unable to guess end header",
        ))
    }
}
