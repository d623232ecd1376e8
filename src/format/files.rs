//! Files info structures for 7z archives.
//!
//! Every FilesInfo property is stored as `id, size, payload`; payloads are
//! parsed from their own bounded slice so a bad property cannot read into
//! its neighbour, and unknown properties are skipped by size.

use std::io::{Cursor, Read};

use crate::timestamp::Timestamp;
use crate::{Error, Result};

use super::property_id;
use super::reader::{
    encode_utf16_name, read_all_or_bits, read_bool_vector, read_bytes, read_count, read_number,
    read_u8, read_u32_le, read_u64_le, write_all_or_bits, write_bool_vector, write_number,
};
use super::streams::ResourceLimits;

/// A single entry as described by the archive header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Path within the archive; `None` if the archive stores no name.
    pub name: Option<String>,
    /// Whether this entry has an associated data stream.
    pub has_stream: bool,
    /// Whether this is a directory.
    pub is_directory: bool,
    /// Whether this is an anti-item (deletion marker).
    pub is_anti: bool,
    /// Uncompressed size in bytes.
    pub size: u64,
    /// CRC-32 of the content, when recorded.
    pub crc: Option<u32>,
    /// Creation time.
    pub ctime: Option<Timestamp>,
    /// Last access time.
    pub atime: Option<Timestamp>,
    /// Last modification time.
    pub mtime: Option<Timestamp>,
    /// Windows file attributes.
    pub attributes: Option<u32>,
}

/// Parses the FilesInfo section; the reader is positioned after `FILES_INFO`.
pub fn parse_files_info<R: Read>(r: &mut R, limits: &ResourceLimits) -> Result<Vec<ArchiveEntry>> {
    let num_files = read_count(r, limits.max_entries, "file")?;
    let mut entries = vec![ArchiveEntry::default(); num_files];
    let mut empty_streams = vec![false; num_files];
    let mut empty_files: Vec<bool> = Vec::new();
    let mut anti: Vec<bool> = Vec::new();

    loop {
        let prop = read_u8(r)?;
        if prop == property_id::END {
            break;
        }
        let size = read_number(r)?;
        if size > limits.max_header_bytes {
            return Err(Error::ResourceLimitExceeded(format!(
                "file property {:#x} of {} bytes",
                prop, size
            )));
        }
        let payload = read_bytes(r, size)?;
        let mut p = Cursor::new(payload.as_slice());

        match prop {
            property_id::EMPTY_STREAM => {
                empty_streams = read_bool_vector(&mut p, num_files)?;
            }
            property_id::EMPTY_FILE => {
                let count = empty_streams.iter().filter(|&&b| b).count();
                empty_files = read_bool_vector(&mut p, count)?;
            }
            property_id::ANTI => {
                let count = empty_streams.iter().filter(|&&b| b).count();
                anti = read_bool_vector(&mut p, count)?;
            }
            property_id::NAME => {
                if read_u8(&mut p)? != 0 {
                    return Err(Error::UnsupportedFeature {
                        feature: "external file names",
                    });
                }
                let names = decode_names(&payload[1..], num_files)?;
                for (entry, name) in entries.iter_mut().zip(names) {
                    entry.name = Some(name);
                }
            }
            property_id::CTIME | property_id::ATIME | property_id::MTIME => {
                let defined = read_all_or_bits(&mut p, num_files)?;
                if read_u8(&mut p)? != 0 {
                    return Err(Error::UnsupportedFeature {
                        feature: "external timestamps",
                    });
                }
                for (entry, has) in entries.iter_mut().zip(defined) {
                    if !has {
                        continue;
                    }
                    let ts = Some(Timestamp::from_filetime(read_u64_le(&mut p)?));
                    match prop {
                        property_id::CTIME => entry.ctime = ts,
                        property_id::ATIME => entry.atime = ts,
                        _ => entry.mtime = ts,
                    }
                }
            }
            property_id::WIN_ATTRIBUTES => {
                let defined = read_all_or_bits(&mut p, num_files)?;
                if read_u8(&mut p)? != 0 {
                    return Err(Error::UnsupportedFeature {
                        feature: "external attributes",
                    });
                }
                for (entry, has) in entries.iter_mut().zip(defined) {
                    if has {
                        entry.attributes = Some(read_u32_le(&mut p)?);
                    }
                }
            }
            // START_POS, DUMMY and anything newer carry nothing we model.
            _ => {}
        }
    }

    let mut empty_index = 0;
    for (entry, &is_empty) in entries.iter_mut().zip(&empty_streams) {
        entry.has_stream = !is_empty;
        if is_empty {
            let empty_file = empty_files.get(empty_index).copied().unwrap_or(false);
            entry.is_anti = anti.get(empty_index).copied().unwrap_or(false);
            entry.is_directory = !empty_file;
            empty_index += 1;
        }
    }

    Ok(entries)
}

fn decode_names(data: &[u8], num_files: usize) -> Result<Vec<String>> {
    if data.len() % 2 != 0 {
        return Err(Error::corrupt_header(0, "odd-length name table"));
    }
    let units: Vec<u16> = data
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect();
    let names: Vec<String> = units
        .split(|&u| u == 0)
        .take(num_files)
        .map(String::from_utf16_lossy)
        .collect();
    let terminators = units.iter().filter(|&&u| u == 0).count();
    if names.len() != num_files || terminators < num_files {
        return Err(Error::corrupt_header(
            0,
            format!("{} names for {} files", terminators, num_files),
        ));
    }
    Ok(names)
}

/// Appends the FilesInfo section for `entries`.
pub fn write_files_info(out: &mut Vec<u8>, entries: &[ArchiveEntry]) {
    out.push(property_id::FILES_INFO);
    write_number(out, entries.len() as u64);

    let empty_streams: Vec<bool> = entries.iter().map(|e| !e.has_stream).collect();
    if empty_streams.iter().any(|&b| b) {
        let mut payload = Vec::new();
        write_bool_vector(&mut payload, &empty_streams);
        write_property(out, property_id::EMPTY_STREAM, &payload);

        let empties: Vec<&ArchiveEntry> = entries.iter().filter(|e| !e.has_stream).collect();
        let empty_files: Vec<bool> = empties.iter().map(|e| !e.is_directory).collect();
        if empty_files.iter().any(|&b| b) {
            let mut payload = Vec::new();
            write_bool_vector(&mut payload, &empty_files);
            write_property(out, property_id::EMPTY_FILE, &payload);
        }
        let anti: Vec<bool> = empties.iter().map(|e| e.is_anti).collect();
        if anti.iter().any(|&b| b) {
            let mut payload = Vec::new();
            write_bool_vector(&mut payload, &anti);
            write_property(out, property_id::ANTI, &payload);
        }
    }

    if entries.iter().any(|e| e.name.is_some()) {
        let mut payload = vec![0u8];
        for entry in entries {
            encode_utf16_name(&mut payload, entry.name.as_deref().unwrap_or(""));
        }
        write_property(out, property_id::NAME, &payload);
    }

    write_times(out, property_id::CTIME, entries, |e| e.ctime);
    write_times(out, property_id::ATIME, entries, |e| e.atime);
    write_times(out, property_id::MTIME, entries, |e| e.mtime);

    if entries.iter().any(|e| e.attributes.is_some()) {
        let defined: Vec<bool> = entries.iter().map(|e| e.attributes.is_some()).collect();
        let mut payload = Vec::new();
        write_all_or_bits(&mut payload, &defined);
        payload.push(0);
        for attr in entries.iter().filter_map(|e| e.attributes) {
            payload.extend_from_slice(&attr.to_le_bytes());
        }
        write_property(out, property_id::WIN_ATTRIBUTES, &payload);
    }

    out.push(property_id::END);
}

fn write_times(
    out: &mut Vec<u8>,
    id: u8,
    entries: &[ArchiveEntry],
    get: impl Fn(&ArchiveEntry) -> Option<Timestamp>,
) {
    if !entries.iter().any(|e| get(e).is_some()) {
        return;
    }
    let defined: Vec<bool> = entries.iter().map(|e| get(e).is_some()).collect();
    let mut payload = Vec::new();
    write_all_or_bits(&mut payload, &defined);
    payload.push(0);
    for ts in entries.iter().filter_map(&get) {
        payload.extend_from_slice(&ts.as_filetime().to_le_bytes());
    }
    write_property(out, id, &payload);
}

fn write_property(out: &mut Vec<u8>, id: u8, payload: &[u8]) {
    out.push(id);
    write_number(out, payload.len() as u64);
    out.extend_from_slice(payload);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(entries: &[ArchiveEntry]) -> Vec<ArchiveEntry> {
        let mut buf = Vec::new();
        write_files_info(&mut buf, entries);
        assert_eq!(buf[0], property_id::FILES_INFO);
        parse_files_info(&mut Cursor::new(&buf[1..]), &ResourceLimits::default()).unwrap()
    }

    fn file(name: &str) -> ArchiveEntry {
        ArchiveEntry {
            name: Some(name.into()),
            has_stream: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_files_round_trip_mixed_kinds() {
        let entries = vec![
            file("a.txt"),
            ArchiveEntry {
                name: Some("dir".into()),
                is_directory: true,
                ..Default::default()
            },
            ArchiveEntry {
                name: Some("empty.txt".into()),
                ..Default::default()
            },
            ArchiveEntry {
                name: Some("gone.txt".into()),
                is_anti: true,
                ..Default::default()
            },
        ];
        let parsed = round_trip(&entries);
        assert_eq!(parsed.len(), 4);
        assert!(parsed[0].has_stream && !parsed[0].is_directory);
        assert!(parsed[1].is_directory && !parsed[1].has_stream);
        assert!(!parsed[2].is_directory && !parsed[2].has_stream);
        assert!(parsed[3].is_anti && !parsed[3].is_directory);
        assert_eq!(parsed[3].name.as_deref(), Some("gone.txt"));
    }

    #[test]
    fn test_unicode_names_and_times() {
        let mut entry = file("данные/файл.txt");
        entry.mtime = Some(Timestamp::from_filetime(130_131_474_190_000_000));
        entry.attributes = Some(0x20);
        let other = file("plain");
        let parsed = round_trip(&[entry.clone(), other]);
        assert_eq!(parsed[0], entry);
        assert_eq!(parsed[1].mtime, None);
        assert_eq!(parsed[1].attributes, None);
    }

    #[test]
    fn test_no_names_property() {
        let entries = vec![
            ArchiveEntry {
                has_stream: true,
                ..Default::default()
            };
            2
        ];
        let parsed = round_trip(&entries);
        assert!(parsed.iter().all(|e| e.name.is_none()));
    }

    #[test]
    fn test_empty_files_info() {
        assert!(round_trip(&[]).is_empty());
    }

    #[test]
    fn test_unknown_property_skipped() {
        let mut buf = Vec::new();
        write_number(&mut buf, 1);
        write_property(&mut buf, 0x42, &[1, 2, 3]);
        write_property(&mut buf, property_id::DUMMY, &[0, 0]);
        let mut names = vec![0u8];
        encode_utf16_name(&mut names, "x");
        write_property(&mut buf, property_id::NAME, &names);
        buf.push(property_id::END);
        let parsed = parse_files_info(&mut Cursor::new(&buf), &ResourceLimits::default()).unwrap();
        assert_eq!(parsed[0].name.as_deref(), Some("x"));
        assert!(parsed[0].has_stream);
    }

    #[test]
    fn test_name_count_mismatch() {
        let mut buf = Vec::new();
        write_number(&mut buf, 2);
        let mut names = vec![0u8];
        encode_utf16_name(&mut names, "only-one");
        write_property(&mut buf, property_id::NAME, &names);
        buf.push(property_id::END);
        let err = parse_files_info(&mut Cursor::new(&buf), &ResourceLimits::default()).unwrap_err();
        assert!(matches!(err, Error::CorruptHeader { .. }));
    }

    #[test]
    fn test_truncated_property() {
        let mut buf = Vec::new();
        write_number(&mut buf, 1);
        buf.push(property_id::NAME);
        write_number(&mut buf, 40);
        buf.extend_from_slice(&[0, b'a', 0]);
        let err = parse_files_info(&mut Cursor::new(&buf), &ResourceLimits::default()).unwrap_err();
        assert!(matches!(err, Error::Truncated { .. }));
    }
}
