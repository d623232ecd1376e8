//! Shared test utilities for integration tests.
//!
//! Note: `#![allow(dead_code)]` is required because each integration test file
//! compiles as a separate crate and may only use a subset of these helpers.

#![allow(dead_code)]

use std::io::Cursor;

use archkit::codec::{Method, MethodConfiguration};
use archkit::{Archive, ReadOptions, WriteOptions, WriteResult, Writer};
use rand::{Rng, SeedableRng, rngs::StdRng};

/// Creates an in-memory archive and returns its bytes with the write result.
pub fn create_archive_with_result(
    options: Option<WriteOptions>,
    entries: &[(&str, &[u8])],
) -> archkit::Result<(Vec<u8>, WriteResult)> {
    let mut writer = Writer::create(Cursor::new(Vec::new()))?;
    if let Some(options) = options {
        writer = writer.options(options);
    }
    for (name, data) in entries {
        writer.add_bytes(*name, data)?;
    }
    let result = writer.finish()?;
    Ok((writer.into_inner().into_inner(), result))
}

/// Creates an in-memory archive with the given options.
pub fn create_archive(options: WriteOptions, entries: &[(&str, &[u8])]) -> Vec<u8> {
    create_archive_with_result(Some(options), entries)
        .expect("Failed to create test archive")
        .0
}

/// Creates an in-memory archive whose entries use `chain`.
pub fn create_archive_with_chain(
    chain: &[Method],
    solid: bool,
    entries: &[(&str, &[u8])],
) -> Vec<u8> {
    let methods = chain.iter().copied().map(MethodConfiguration::new).collect();
    create_archive(WriteOptions::new().methods(methods).solid(solid), entries)
}

/// Opens an in-memory archive.
pub fn open(bytes: &[u8], options: ReadOptions) -> Archive<Cursor<Vec<u8>>> {
    Archive::open_with_options(Cursor::new(bytes.to_vec()), options)
        .expect("Failed to open test archive")
}

/// Reads every entry in archive order through `next_entry`.
pub fn read_sequentially(archive: &mut Archive<Cursor<Vec<u8>>>) -> Vec<(String, Vec<u8>)> {
    use std::io::Read;

    let mut out = Vec::new();
    while let Some(entry) = archive.next_entry().expect("next_entry failed") {
        let mut data = Vec::new();
        archive.read_to_end(&mut data).expect("sequential read failed");
        out.push((entry.name().to_string(), data));
    }
    out
}

/// Verifies that an archive holds exactly `expected`, in order.
pub fn verify_archive_contents(bytes: &[u8], expected: &[(&str, &[u8])]) {
    let mut archive = open(bytes, ReadOptions::default());
    assert_eq!(archive.len(), expected.len());
    let actual = read_sequentially(&mut archive);
    for ((name, data), (expected_name, expected_data)) in actual.iter().zip(expected) {
        assert_eq!(name, expected_name);
        assert_eq!(data.as_slice(), *expected_data, "content of {name}");
    }
}

/// Deterministic pseudo-random bytes with enough repetition to compress.
pub fn sample_data(seed: u64, len: usize) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut data = Vec::with_capacity(len);
    while data.len() < len {
        let run = rng.gen_range(1..64).min(len - data.len());
        if data.len() < 32 || rng.gen_bool(0.4) {
            data.extend((0..run).map(|_| rng.r#gen::<u8>()));
        } else {
            let start = rng.gen_range(0..data.len());
            let run = run.min(data.len() - start);
            data.extend_from_within(start..start + run);
        }
    }
    data
}
