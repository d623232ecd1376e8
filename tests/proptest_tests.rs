//! Property-based tests using proptest.

mod common;

use proptest::prelude::*;

use archkit::ReadOptions;
use archkit::codec::Method;

fn chain_strategy() -> impl Strategy<Value = Vec<Method>> {
    let mut chains = vec![vec![Method::Copy]];
    if cfg!(feature = "lzma") {
        chains.push(vec![Method::Delta, Method::Copy]);
    }
    if cfg!(feature = "lzma2") {
        chains.push(vec![Method::Lzma2]);
        chains.push(vec![Method::Delta, Method::Lzma2]);
    }
    if cfg!(feature = "bzip2") {
        chains.push(vec![Method::Bzip2]);
    }
    if cfg!(feature = "deflate") {
        chains.push(vec![Method::Deflate, Method::Copy]);
    }
    proptest::sample::select(chains)
}

fn contents_strategy() -> impl Strategy<Value = Vec<Vec<u8>>> {
    proptest::collection::vec(
        prop_oneof![
            proptest::collection::vec(any::<u8>(), 0..2048),
            (any::<u8>(), 0..4096usize).prop_map(|(b, n)| vec![b; n]),
        ],
        1..6,
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// Decoding what was encoded returns the original bytes.
    #[test]
    fn archive_round_trip(
        chain in chain_strategy(),
        contents in contents_strategy(),
        solid in any::<bool>(),
    ) {
        let names: Vec<String> = (0..contents.len()).map(|i| format!("f{i}")).collect();
        let entries: Vec<(&str, &[u8])> = names
            .iter()
            .zip(&contents)
            .map(|(n, c)| (n.as_str(), c.as_slice()))
            .collect();
        let bytes = common::create_archive_with_chain(&chain, solid, &entries);

        let mut archive = common::open(&bytes, ReadOptions::default());
        prop_assert_eq!(archive.len(), contents.len());
        for (i, expected) in contents.iter().enumerate().rev() {
            prop_assert_eq!(&archive.read_entry_to_vec(i).unwrap(), expected);
        }
    }

    /// Entry metadata survives the header encoding.
    #[test]
    fn sizes_and_crcs_survive(contents in contents_strategy()) {
        let names: Vec<String> = (0..contents.len()).map(|i| format!("dir/{i}.bin")).collect();
        let entries: Vec<(&str, &[u8])> = names
            .iter()
            .zip(&contents)
            .map(|(n, c)| (n.as_str(), c.as_slice()))
            .collect();
        let bytes = common::create_archive_with_chain(&[Method::Copy], true, &entries);

        let archive = common::open(&bytes, ReadOptions::default());
        for (entry, content) in archive.entries().iter().zip(&contents) {
            prop_assert_eq!(entry.size, content.len() as u64);
            prop_assert_eq!(entry.has_stream, !content.is_empty());
            if entry.has_stream {
                prop_assert_eq!(entry.crc, Some(crc32fast::hash(content)));
            }
        }
    }

    /// Arbitrary bytes after a valid signature never panic the reader.
    #[test]
    fn garbage_never_panics(tail in proptest::collection::vec(any::<u8>(), 0..256)) {
        let mut bytes = archkit::format::SIGNATURE.to_vec();
        bytes.extend_from_slice(&[0, 4]);
        bytes.extend_from_slice(&tail);
        let _ = archkit::Archive::open_with_options(
            std::io::Cursor::new(bytes),
            ReadOptions::new().try_to_recover_broken_archives(true),
        );
    }
}
