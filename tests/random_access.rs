//! Random access must return the same bytes as a sequential read, whatever
//! the order entries are visited in.

mod common;

use std::io::Read;

use archkit::ReadOptions;
use archkit::codec::Method;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng, rngs::StdRng};

fn archive_bytes(chain: &[Method]) -> Vec<u8> {
    let names: Vec<String> = (0..12).map(|i| format!("entry_{i:02}")).collect();
    let data: Vec<Vec<u8>> = (0..12)
        .map(|i| match i % 4 {
            0 => Vec::new(),
            _ => common::sample_data(i, 500 + 3000 * i as usize),
        })
        .collect();
    let entries: Vec<(&str, &[u8])> = names
        .iter()
        .zip(&data)
        .map(|(n, d)| (n.as_str(), d.as_slice()))
        .collect();
    common::create_archive_with_chain(chain, true, &entries)
}

fn check_shuffled_reads(bytes: &[u8], seed: u64) {
    let mut archive = common::open(bytes, ReadOptions::default());
    let reference: Vec<Vec<u8>> = common::read_sequentially(&mut archive)
        .into_iter()
        .map(|(_, d)| d)
        .collect();

    let mut rng = StdRng::seed_from_u64(seed);
    let mut order: Vec<usize> = (0..reference.len()).collect();
    for _ in 0..3 {
        order.shuffle(&mut rng);
        for &index in &order {
            assert_eq!(
                archive.read_entry_to_vec(index).unwrap(),
                reference[index],
                "entry {index}"
            );
        }
    }

    // Partial reads leave a pipeline mid-folder; later entries must not see it.
    for _ in 0..20 {
        let index = rng.gen_range(0..reference.len());
        let mut reader = archive.entry_reader(index).unwrap();
        let take = rng.gen_range(0..=reference[index].len());
        let mut prefix = vec![0u8; take];
        reader.read_exact(&mut prefix).unwrap();
        assert_eq!(prefix, reference[index][..take]);
    }
    for (index, expected) in reference.iter().enumerate().rev() {
        assert_eq!(&archive.read_entry_to_vec(index).unwrap(), expected);
    }
}

#[test]
fn test_random_access_copy() {
    check_shuffled_reads(&archive_bytes(&[Method::Copy]), 7);
}

#[cfg(feature = "lzma2")]
#[test]
fn test_random_access_lzma2() {
    check_shuffled_reads(&archive_bytes(&[Method::Lzma2]), 8);
}

#[cfg(feature = "bzip2")]
#[test]
fn test_random_access_bzip2() {
    check_shuffled_reads(&archive_bytes(&[Method::Bzip2]), 9);
}

#[cfg(feature = "lzma2")]
#[test]
fn test_random_access_after_sequential_pass() {
    let bytes = archive_bytes(&[Method::Delta, Method::Lzma2]);
    let mut archive = common::open(&bytes, ReadOptions::default());

    // Advance past entry 5 sequentially, reading only part of some entries.
    let mut expected = Vec::new();
    for i in 0..8 {
        let entry = archive.next_entry().unwrap().unwrap();
        assert_eq!(entry.index, i);
        let mut data = Vec::new();
        if i % 2 == 0 {
            archive.read_to_end(&mut data).unwrap();
        }
        expected.push(data);
    }

    let fresh = common::read_sequentially(&mut common::open(&bytes, ReadOptions::default()));
    assert_eq!(archive.read_entry_to_vec(5).unwrap(), fresh[5].1);
    assert_eq!(archive.read_entry_to_vec(1).unwrap(), fresh[1].1);
    assert_eq!(archive.read_entry_to_vec(11).unwrap(), fresh[11].1);
    for (i, data) in expected.iter().enumerate().filter(|(i, _)| i % 2 == 0) {
        assert_eq!(data, &fresh[i].1);
    }

    // Sequential reading resumes where it stopped.
    let entry = archive.next_entry().unwrap().unwrap();
    assert_eq!(entry.index, 8);
    let mut data = Vec::new();
    archive.read_to_end(&mut data).unwrap();
    assert_eq!(data, fresh[8].1);
}

#[test]
fn test_entry_reader_reports_remaining() {
    let bytes = archive_bytes(&[Method::Copy]);
    let mut archive = common::open(&bytes, ReadOptions::default());
    let size = archive.entries()[3].size;
    let mut reader = archive.entry_reader(3).unwrap();
    assert_eq!(reader.remaining(), size);
    let mut buf = [0u8; 100];
    reader.read_exact(&mut buf).unwrap();
    assert_eq!(reader.remaining(), size - 100);
}

#[test]
fn test_entry_not_found() {
    let bytes = archive_bytes(&[Method::Copy]);
    let mut archive = common::open(&bytes, ReadOptions::default());
    assert!(matches!(
        archive.entry_reader(12),
        Err(archkit::Error::EntryNotFound { index: 12 })
    ));
}
