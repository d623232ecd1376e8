//! Damaged, truncated and unfinished archives.

mod common;

use std::io::Cursor;

use archkit::codec::Method;
use archkit::format::SIGNATURE;
use archkit::{Archive, Error, ReadOptions, ResourceLimits, WriteOptions};

fn copy_archive(compress_header: bool) -> (Vec<u8>, Vec<u8>) {
    let data = common::sample_data(3, 4000);
    let bytes = common::create_archive(
        WriteOptions::new()
            .method(Method::Copy)
            .compress_header(compress_header),
        &[("data.bin", &data), ("small.txt", b"small")],
    );
    (bytes, data)
}

fn open(bytes: Vec<u8>, options: ReadOptions) -> archkit::Result<Archive<Cursor<Vec<u8>>>> {
    Archive::open_with_options(Cursor::new(bytes), options)
}

#[test]
fn test_signature_detection() {
    assert!(archkit::matches(SIGNATURE, 6));
    assert!(archkit::matches(&[0x37, 0x7A, 0xBC, 0xAF, 0x27, 0x1C, 0, 4], 8));
    assert!(!archkit::matches(SIGNATURE, 5));
    assert!(!archkit::matches(&[], 0));
    for i in 0..SIGNATURE.len() {
        let mut corrupted = *SIGNATURE;
        corrupted[i] ^= 0x01;
        assert!(!archkit::matches(&corrupted, 6), "byte {i}");
    }
}

#[test]
fn test_not_an_archive() {
    let err = open(b"PK\x03\x04 definitely a zip file....".to_vec(), ReadOptions::default())
        .unwrap_err();
    assert!(matches!(err, Error::InvalidFormat(_)), "{err:?}");
}

#[test]
fn test_start_header_crc_mismatch() {
    let (mut bytes, _) = copy_archive(false);
    bytes[12] ^= 0xFF;
    let err = open(bytes, ReadOptions::default()).unwrap_err();
    assert!(err.is_corruption(), "{err:?}");
}

#[test]
fn test_end_header_crc_mismatch() {
    let (mut bytes, _) = copy_archive(false);
    let last = bytes.len() - 2;
    bytes[last] ^= 0xFF;
    let err = open(bytes, ReadOptions::default()).unwrap_err();
    assert!(err.is_corruption(), "{err:?}");
}

#[test]
fn test_truncated_archive() {
    let (bytes, _) = copy_archive(false);
    let err = open(bytes[..bytes.len() - 10].to_vec(), ReadOptions::default()).unwrap_err();
    assert!(
        err.is_corruption() || matches!(err, Error::Io(_) | Error::InvalidFormat(_)),
        "{err:?}"
    );
}

#[test]
fn test_content_crc_mismatch() {
    let (mut bytes, _) = copy_archive(false);
    // The first packed byte belongs to data.bin.
    bytes[32] ^= 0xFF;
    let mut archive = open(bytes, ReadOptions::default()).unwrap();
    match archive.read_entry_to_vec(0).unwrap_err() {
        Error::CrcMismatch {
            entry_index,
            entry_name,
            ..
        } => {
            assert_eq!(entry_index, Some(0));
            assert_eq!(entry_name.as_deref(), Some("data.bin"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(archive.read_entry_to_vec(1).unwrap(), b"small");
}

#[test]
fn test_unfinished_archive_without_recovery() {
    let (mut bytes, _) = copy_archive(false);
    bytes[8..32].fill(0);
    let err = open(bytes, ReadOptions::default()).unwrap_err();
    assert!(matches!(err, Error::InvalidFormat(_)), "{err:?}");
    assert!(err.to_string().contains("recovery of broken archives"), "{err}");
}

#[test]
fn test_unfinished_archive_is_recovered() {
    for compress_header in [false, true] {
        let (mut bytes, data) = copy_archive(compress_header);
        bytes[8..32].fill(0);
        let mut archive = open(bytes, ReadOptions::new().try_to_recover_broken_archives(true))
            .unwrap_or_else(|e| panic!("compress_header {compress_header}: {e}"));
        assert_eq!(archive.len(), 2);
        assert_eq!(archive.read_entry_to_vec(0).unwrap(), data);
        assert_eq!(archive.read_entry_to_vec(1).unwrap(), b"small");
    }
}

#[test]
fn test_recovery_gives_up_without_end_header() {
    let (mut bytes, _) = copy_archive(false);
    bytes[8..32].fill(0);
    let header_start = 32 + 4000 + 5;
    bytes.truncate(header_start);
    let err = open(bytes, ReadOptions::new().try_to_recover_broken_archives(true)).unwrap_err();
    assert!(
        err.to_string()
            .contains("Start header corrupt and unable to guess end header"),
        "{err}"
    );
}

#[test]
fn test_corrupted_start_header_is_not_recovered() {
    // Recovery only applies to an all-zero start header.
    let (mut bytes, _) = copy_archive(false);
    bytes[20] ^= 0x10;
    let err = open(bytes, ReadOptions::new().try_to_recover_broken_archives(true)).unwrap_err();
    assert!(err.is_corruption(), "{err:?}");
}

#[cfg(feature = "lzma2")]
#[test]
fn test_memory_limit_is_checked_at_open() {
    let bytes = common::create_archive(WriteOptions::new(), &[("a.txt", b"some text")]);

    let err = open(bytes.clone(), ReadOptions::new().max_memory_kib(64)).unwrap_err();
    match err {
        Error::MemoryLimitExceeded {
            required_kib,
            limit_kib,
        } => {
            assert_eq!(limit_kib, 64);
            assert!(required_kib > 64);
        }
        other => panic!("unexpected error: {other:?}"),
    }

    let mut archive = open(bytes, ReadOptions::new().max_memory_kib(1 << 20)).unwrap();
    assert_eq!(archive.read_entry_to_vec(0).unwrap(), b"some text");
}

#[test]
fn test_entry_count_limit() {
    let names: Vec<String> = (0..20).map(|i| format!("f{i}")).collect();
    let entries: Vec<(&str, &[u8])> = names.iter().map(|n| (n.as_str(), b"" as &[u8])).collect();
    let bytes = common::create_archive(WriteOptions::new().method(Method::Copy), &entries);

    let limits = ResourceLimits::new().max_entries(10);
    let err = open(bytes.clone(), ReadOptions::new().limits(limits)).unwrap_err();
    assert!(matches!(err, Error::ResourceLimitExceeded(_)), "{err:?}");

    let archive = open(bytes, ReadOptions::default()).unwrap();
    assert_eq!(archive.len(), 20);
}
