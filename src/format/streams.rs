//! Streams info structures for 7z archives.
//!
//! A [`Folder`] is a small graph of [`Coder`]s whose streams are connected by
//! [`BindPair`]s. Input streams not bound to another coder read packed data;
//! the single output stream not bound to any input is the folder's main
//! output. Coders and bind pairs are kept as flat vectors addressed by index.

use std::io::Read;

use crate::{Error, Result};

use super::property_id;
use super::reader::{
    from_be_bytes, read_all_or_bits, read_bytes, read_count, read_number, read_u8, read_u32_le,
    write_all_or_bits, write_number,
};

/// Hard caps applied while parsing untrusted headers.
#[derive(Debug, Clone)]
pub struct ResourceLimits {
    /// Maximum number of files, pack streams or substreams.
    pub max_entries: usize,
    /// Maximum number of folders.
    pub max_folders: usize,
    /// Maximum number of coders in one folder.
    pub max_coders_per_folder: usize,
    /// Maximum size of a (decoded) header blob.
    pub max_header_bytes: u64,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            max_entries: 1_000_000,
            max_folders: 1_000_000,
            max_coders_per_folder: 32,
            max_header_bytes: 64 << 20,
        }
    }
}

impl ResourceLimits {
    /// Creates limits with the default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum number of entries.
    pub fn max_entries(mut self, max: usize) -> Self {
        self.max_entries = max;
        self
    }

    /// Sets the maximum number of folders.
    pub fn max_folders(mut self, max: usize) -> Self {
        self.max_folders = max;
        self
    }

    /// Sets the maximum header size.
    pub fn max_header_bytes(mut self, max: u64) -> Self {
        self.max_header_bytes = max;
        self
    }
}

/// Information about packed (compressed) streams.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackInfo {
    /// Position of the first pack stream, relative to the end of the signature header.
    pub pack_pos: u64,
    /// Sizes of each packed stream.
    pub pack_sizes: Vec<u64>,
    /// Optional CRC values for each packed stream.
    pub pack_crcs: Vec<Option<u32>>,
}

impl PackInfo {
    /// Parses PackInfo; the reader is positioned after the `PACK_INFO` id.
    pub fn parse<R: Read>(r: &mut R, limits: &ResourceLimits) -> Result<Self> {
        let pack_pos = read_number(r)?;
        let num_streams = read_count(r, limits.max_entries, "pack stream")?;

        let mut pack_sizes = vec![0; num_streams];
        let mut pack_crcs = vec![None; num_streams];

        loop {
            match read_u8(r)? {
                property_id::END => break,
                property_id::SIZE => {
                    for size in pack_sizes.iter_mut() {
                        *size = read_number(r)?;
                    }
                }
                property_id::CRC => {
                    let defined = read_all_or_bits(r, num_streams)?;
                    for (crc, has_crc) in pack_crcs.iter_mut().zip(defined) {
                        if has_crc {
                            *crc = Some(read_u32_le(r)?);
                        }
                    }
                }
                other => {
                    return Err(Error::corrupt_header(
                        0,
                        format!("unexpected property {:#x} in PackInfo", other),
                    ));
                }
            }
        }

        Ok(Self {
            pack_pos,
            pack_sizes,
            pack_crcs,
        })
    }

    /// Appends the `PACK_INFO` section.
    pub fn write(&self, out: &mut Vec<u8>) {
        out.push(property_id::PACK_INFO);
        write_number(out, self.pack_pos);
        write_number(out, self.pack_sizes.len() as u64);
        out.push(property_id::SIZE);
        for &size in &self.pack_sizes {
            write_number(out, size);
        }
        if self.pack_crcs.iter().any(Option::is_some) {
            out.push(property_id::CRC);
            write_digests(out, &self.pack_crcs);
        }
        out.push(property_id::END);
    }

    /// Returns the number of pack streams.
    pub fn num_streams(&self) -> usize {
        self.pack_sizes.len()
    }

    /// Returns the total packed size.
    pub fn total_packed_size(&self) -> u64 {
        self.pack_sizes.iter().sum()
    }
}

/// One compression, filter or encryption stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Coder {
    /// Method ID bytes (1 to 15 bytes).
    pub method_id: Vec<u8>,
    /// Number of input streams.
    pub num_in_streams: usize,
    /// Number of output streams.
    pub num_out_streams: usize,
    /// Method-specific properties (e.g. LZMA dictionary size).
    pub properties: Option<Vec<u8>>,
}

impl Coder {
    /// Creates a simple single-input, single-output coder.
    pub fn simple(method_id: &[u8], properties: Option<Vec<u8>>) -> Self {
        Self {
            method_id: method_id.to_vec(),
            num_in_streams: 1,
            num_out_streams: 1,
            properties,
        }
    }

    /// Returns the method ID packed big-endian, as it is usually written (`0x030101`).
    pub fn method_id_u64(&self) -> u64 {
        from_be_bytes(&self.method_id)
    }

    /// Returns the properties, or an empty slice.
    pub fn properties(&self) -> &[u8] {
        self.properties.as_deref().unwrap_or(&[])
    }
}

/// Connects an output stream of one coder to an input stream of another.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindPair {
    /// Folder-wide input stream index.
    pub in_index: usize,
    /// Folder-wide output stream index.
    pub out_index: usize,
}

/// A folder: a coder graph decoded as one logical stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Folder {
    /// Coders in declaration order.
    pub coders: Vec<Coder>,
    /// Bind pairs connecting coder streams.
    pub bind_pairs: Vec<BindPair>,
    /// Input stream indices fed from packed streams, in pack order.
    pub packed_streams: Vec<usize>,
    /// Unpacked size of every coder output stream, in output order.
    pub unpack_sizes: Vec<u64>,
    /// Optional CRC of the folder's main output.
    pub unpack_crc: Option<u32>,
}

impl Folder {
    fn parse<R: Read>(r: &mut R, limits: &ResourceLimits) -> Result<Self> {
        let num_coders = read_count(r, limits.max_coders_per_folder, "coder")?;
        if num_coders == 0 {
            return Err(Error::MalformedFolder("folder has no coders".into()));
        }

        let mut coders = Vec::with_capacity(num_coders);
        for _ in 0..num_coders {
            let flags = read_u8(r)?;
            if flags & 0x80 != 0 {
                return Err(Error::UnsupportedFeature {
                    feature: "alternative coder methods",
                });
            }
            let method_id = read_bytes(r, u64::from(flags & 0x0F))?;
            let (num_in_streams, num_out_streams) = if flags & 0x10 != 0 {
                (
                    read_count(r, limits.max_coders_per_folder, "coder input")?,
                    read_count(r, limits.max_coders_per_folder, "coder output")?,
                )
            } else {
                (1, 1)
            };
            let properties = if flags & 0x20 != 0 {
                let size = read_number(r)?;
                if size > limits.max_header_bytes {
                    return Err(Error::ResourceLimitExceeded(format!(
                        "coder properties of {} bytes",
                        size
                    )));
                }
                Some(read_bytes(r, size)?)
            } else {
                None
            };
            coders.push(Coder {
                method_id,
                num_in_streams,
                num_out_streams,
                properties,
            });
        }

        let total_in: usize = coders.iter().map(|c| c.num_in_streams).sum();
        let total_out: usize = coders.iter().map(|c| c.num_out_streams).sum();
        if total_out == 0 {
            return Err(Error::MalformedFolder("folder has no outputs".into()));
        }

        let num_bind_pairs = total_out - 1;
        let mut bind_pairs = Vec::with_capacity(num_bind_pairs);
        for _ in 0..num_bind_pairs {
            let in_index = read_count(r, total_in, "bind pair input")?;
            let out_index = read_count(r, total_out, "bind pair output")?;
            bind_pairs.push(BindPair {
                in_index,
                out_index,
            });
        }

        if total_in < num_bind_pairs {
            return Err(Error::MalformedFolder(format!(
                "{} bind pairs but only {} input streams",
                num_bind_pairs, total_in
            )));
        }
        let num_packed = total_in - num_bind_pairs;
        let packed_streams = if num_packed == 1 {
            (0..total_in)
                .find(|&i| !bind_pairs.iter().any(|bp| bp.in_index == i))
                .into_iter()
                .collect()
        } else {
            (0..num_packed)
                .map(|_| read_count(r, total_in, "packed stream"))
                .collect::<Result<Vec<_>>>()?
        };

        Ok(Self {
            coders,
            bind_pairs,
            packed_streams,
            unpack_sizes: Vec::new(),
            unpack_crc: None,
        })
    }

    fn write(&self, out: &mut Vec<u8>) {
        write_number(out, self.coders.len() as u64);
        for coder in &self.coders {
            let complex = coder.num_in_streams != 1 || coder.num_out_streams != 1;
            let mut flags = coder.method_id.len() as u8 & 0x0F;
            if complex {
                flags |= 0x10;
            }
            if coder.properties.is_some() {
                flags |= 0x20;
            }
            out.push(flags);
            out.extend_from_slice(&coder.method_id);
            if complex {
                write_number(out, coder.num_in_streams as u64);
                write_number(out, coder.num_out_streams as u64);
            }
            if let Some(props) = &coder.properties {
                write_number(out, props.len() as u64);
                out.extend_from_slice(props);
            }
        }
        for bp in &self.bind_pairs {
            write_number(out, bp.in_index as u64);
            write_number(out, bp.out_index as u64);
        }
        if self.packed_streams.len() > 1 {
            for &idx in &self.packed_streams {
                write_number(out, idx as u64);
            }
        }
    }

    /// Total number of coder input streams.
    pub fn total_in_streams(&self) -> usize {
        self.coders.iter().map(|c| c.num_in_streams).sum()
    }

    /// Total number of coder output streams.
    pub fn total_out_streams(&self) -> usize {
        self.coders.iter().map(|c| c.num_out_streams).sum()
    }

    /// Index of the bind pair consuming input stream `in_index`.
    pub fn find_bind_pair_for_in_stream(&self, in_index: usize) -> Option<usize> {
        self.bind_pairs.iter().position(|bp| bp.in_index == in_index)
    }

    /// Index of the bind pair consuming output stream `out_index`.
    pub fn find_bind_pair_for_out_stream(&self, out_index: usize) -> Option<usize> {
        self.bind_pairs
            .iter()
            .position(|bp| bp.out_index == out_index)
    }

    /// Position in `packed_streams` of input stream `in_index`.
    pub fn find_packed_stream(&self, in_index: usize) -> Option<usize> {
        self.packed_streams.iter().position(|&i| i == in_index)
    }

    /// First input and output stream index of every coder.
    pub fn stream_offsets(&self) -> Vec<(usize, usize)> {
        let mut offsets = Vec::with_capacity(self.coders.len());
        let (mut ins, mut outs) = (0, 0);
        for coder in &self.coders {
            offsets.push((ins, outs));
            ins += coder.num_in_streams;
            outs += coder.num_out_streams;
        }
        offsets
    }

    /// The coder owning output stream `out_index`.
    pub fn coder_for_out_stream(&self, out_index: usize) -> Option<usize> {
        let mut outs = 0;
        for (i, coder) in self.coders.iter().enumerate() {
            if out_index < outs + coder.num_out_streams {
                return Some(i);
            }
            outs += coder.num_out_streams;
        }
        None
    }

    /// The coder owning input stream `in_index`.
    pub fn coder_for_in_stream(&self, in_index: usize) -> Option<usize> {
        let mut ins = 0;
        for (i, coder) in self.coders.iter().enumerate() {
            if in_index < ins + coder.num_in_streams {
                return Some(i);
            }
            ins += coder.num_in_streams;
        }
        None
    }

    /// The lowest-indexed output stream not consumed by a bind pair.
    pub fn main_output(&self) -> Option<usize> {
        (0..self.total_out_streams()).find(|&i| self.find_bind_pair_for_out_stream(i).is_none())
    }

    /// Size of the folder's main output.
    pub fn unpack_size(&self) -> u64 {
        self.main_output()
            .and_then(|i| self.unpack_sizes.get(i).copied())
            .unwrap_or(0)
    }

    /// Coders ordered from the main output down to the packed input,
    /// following the first input of each coder.
    ///
    /// For the linear chains written by this crate this is encoding order.
    pub fn ordered_coders(&self) -> Vec<usize> {
        let offsets = self.stream_offsets();
        let mut order = Vec::new();
        let mut current = self.main_output().and_then(|o| self.coder_for_out_stream(o));
        while let Some(idx) = current {
            if order.contains(&idx) {
                break;
            }
            order.push(idx);
            current = self
                .find_bind_pair_for_in_stream(offsets[idx].0)
                .and_then(|bp| self.coder_for_out_stream(self.bind_pairs[bp].out_index));
        }
        order
    }

    /// Checks the structural invariants of the coder graph.
    ///
    /// Every bind pair must reference existing streams, no stream may be
    /// bound twice, packed inputs must be unbound, exactly one output must
    /// remain unbound, sizes must cover every output, and following bind
    /// pairs from any coder must never revisit it.
    pub fn validate(&self, num_pack_streams: usize) -> Result<()> {
        let total_in = self.total_in_streams();
        let total_out = self.total_out_streams();
        let malformed = |msg: String| Err(Error::MalformedFolder(msg));

        let mut in_bound = vec![false; total_in];
        let mut out_bound = vec![false; total_out];
        for bp in &self.bind_pairs {
            if bp.in_index >= total_in || bp.out_index >= total_out {
                return malformed(format!(
                    "bind pair {}<-{} out of range ({} in, {} out)",
                    bp.in_index, bp.out_index, total_in, total_out
                ));
            }
            if std::mem::replace(&mut in_bound[bp.in_index], true) {
                return malformed(format!("input stream {} bound twice", bp.in_index));
            }
            if std::mem::replace(&mut out_bound[bp.out_index], true) {
                return malformed(format!("output stream {} bound twice", bp.out_index));
            }
        }
        for &p in &self.packed_streams {
            if p >= total_in || in_bound[p] {
                return malformed(format!("packed input {} is not a free input", p));
            }
        }
        if self.packed_streams.len() > num_pack_streams {
            return malformed(format!(
                "folder needs {} packed streams, {} available",
                self.packed_streams.len(),
                num_pack_streams
            ));
        }
        let unbound_outputs = out_bound.iter().filter(|&&b| !b).count();
        if unbound_outputs != 1 {
            return malformed(format!("{} unbound outputs", unbound_outputs));
        }
        if self.unpack_sizes.len() != total_out {
            return malformed(format!(
                "{} unpack sizes for {} outputs",
                self.unpack_sizes.len(),
                total_out
            ));
        }
        self.check_acyclic()
    }

    fn check_acyclic(&self) -> Result<()> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            New,
            Active,
            Done,
        }

        let offsets = self.stream_offsets();
        let mut marks = vec![Mark::New; self.coders.len()];
        for start in 0..self.coders.len() {
            if marks[start] != Mark::New {
                continue;
            }
            // Explicit DFS: (coder, next input to visit).
            let mut stack = vec![(start, 0usize)];
            marks[start] = Mark::Active;
            while let Some(top) = stack.last_mut() {
                let (coder, next) = *top;
                if next == self.coders[coder].num_in_streams {
                    marks[coder] = Mark::Done;
                    stack.pop();
                    continue;
                }
                top.1 += 1;
                let in_index = offsets[coder].0 + next;
                let Some(bp) = self.find_bind_pair_for_in_stream(in_index) else {
                    continue;
                };
                let Some(source) = self.coder_for_out_stream(self.bind_pairs[bp].out_index)
                else {
                    continue;
                };
                match marks[source] {
                    Mark::Active => {
                        return Err(Error::MalformedFolder(format!(
                            "bind pairs form a cycle through coder {}",
                            source
                        )));
                    }
                    Mark::New => {
                        marks[source] = Mark::Active;
                        stack.push((source, 0));
                    }
                    Mark::Done => {}
                }
            }
        }
        Ok(())
    }
}

/// Folder definitions of a StreamsInfo block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnpackInfo {
    /// The folders.
    pub folders: Vec<Folder>,
}

impl UnpackInfo {
    /// Parses UnpackInfo; the reader is positioned after the `UNPACK_INFO` id.
    pub fn parse<R: Read>(r: &mut R, limits: &ResourceLimits) -> Result<Self> {
        expect_property(r, property_id::FOLDER, "UnpackInfo")?;
        let num_folders = read_count(r, limits.max_folders, "folder")?;
        if read_u8(r)? != 0 {
            return Err(Error::UnsupportedFeature {
                feature: "external folder definitions",
            });
        }
        let mut folders = (0..num_folders)
            .map(|_| Folder::parse(r, limits))
            .collect::<Result<Vec<_>>>()?;

        expect_property(r, property_id::CODERS_UNPACK_SIZE, "UnpackInfo")?;
        for folder in folders.iter_mut() {
            folder.unpack_sizes = (0..folder.total_out_streams())
                .map(|_| read_number(r))
                .collect::<Result<Vec<_>>>()?;
        }

        loop {
            match read_u8(r)? {
                property_id::END => break,
                property_id::CRC => {
                    let defined = read_all_or_bits(r, folders.len())?;
                    for (folder, has_crc) in folders.iter_mut().zip(defined) {
                        if has_crc {
                            folder.unpack_crc = Some(read_u32_le(r)?);
                        }
                    }
                }
                other => {
                    return Err(Error::corrupt_header(
                        0,
                        format!("unexpected property {:#x} in UnpackInfo", other),
                    ));
                }
            }
        }

        Ok(Self { folders })
    }

    /// Appends the `UNPACK_INFO` section.
    pub fn write(&self, out: &mut Vec<u8>) {
        out.push(property_id::UNPACK_INFO);
        out.push(property_id::FOLDER);
        write_number(out, self.folders.len() as u64);
        out.push(0);
        for folder in &self.folders {
            folder.write(out);
        }
        out.push(property_id::CODERS_UNPACK_SIZE);
        for folder in &self.folders {
            for &size in &folder.unpack_sizes {
                write_number(out, size);
            }
        }
        let crcs: Vec<Option<u32>> = self.folders.iter().map(|f| f.unpack_crc).collect();
        if crcs.iter().any(Option::is_some) {
            out.push(property_id::CRC);
            write_digests(out, &crcs);
        }
        out.push(property_id::END);
    }
}

/// Partition of every folder's output into entry-sized substreams.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubStreamsInfo {
    /// Number of substreams in each folder.
    pub num_unpack_streams: Vec<usize>,
    /// Size of every substream, folder by folder.
    pub unpack_sizes: Vec<u64>,
    /// CRC of every substream, folder by folder.
    pub digests: Vec<Option<u32>>,
}

impl SubStreamsInfo {
    /// The implied partition when no SubStreamsInfo section is present:
    /// one substream per folder carrying the folder CRC.
    pub fn implied(folders: &[Folder]) -> Self {
        Self {
            num_unpack_streams: vec![1; folders.len()],
            unpack_sizes: folders.iter().map(Folder::unpack_size).collect(),
            digests: folders.iter().map(|f| f.unpack_crc).collect(),
        }
    }

    /// Parses SubStreamsInfo; the reader is positioned after the `SUBSTREAMS_INFO` id.
    pub fn parse<R: Read>(r: &mut R, folders: &[Folder], limits: &ResourceLimits) -> Result<Self> {
        let mut num_unpack_streams = vec![1usize; folders.len()];
        let mut prop = read_u8(r)?;

        if prop == property_id::NUM_UNPACK_STREAM {
            let mut total = 0usize;
            for n in num_unpack_streams.iter_mut() {
                *n = read_count(r, limits.max_entries, "substream")?;
                total = total.saturating_add(*n);
            }
            if total > limits.max_entries {
                return Err(Error::ResourceLimitExceeded(format!(
                    "{} substreams",
                    total
                )));
            }
            prop = read_u8(r)?;
        }

        let mut unpack_sizes = Vec::with_capacity(num_unpack_streams.iter().sum());
        let has_sizes = prop == property_id::SIZE;
        for (folder, &n) in folders.iter().zip(&num_unpack_streams) {
            if n == 0 {
                continue;
            }
            let mut sum = 0u64;
            if has_sizes {
                for _ in 1..n {
                    let size = read_number(r)?;
                    sum = sum.checked_add(size).ok_or_else(|| {
                        Error::corrupt_header(0, "substream sizes overflow")
                    })?;
                    unpack_sizes.push(size);
                }
            }
            let folder_size = folder.unpack_size();
            if sum > folder_size {
                return Err(Error::corrupt_header(
                    0,
                    format!(
                        "substream sizes {} exceed folder size {}",
                        sum, folder_size
                    ),
                ));
            }
            unpack_sizes.push(folder_size - sum);
        }
        if has_sizes {
            prop = read_u8(r)?;
        }

        // Streams needing an explicit digest: all of them, except single
        // streams whose folder already carries a CRC.
        let needs_digest: Vec<bool> = folders
            .iter()
            .zip(&num_unpack_streams)
            .flat_map(|(folder, &n)| {
                let inherit = n == 1 && folder.unpack_crc.is_some();
                std::iter::repeat_n(!inherit, n)
            })
            .collect();
        let mut digests: Vec<Option<u32>> = folders
            .iter()
            .zip(&num_unpack_streams)
            .flat_map(|(folder, &n)| {
                let inherited = if n == 1 { folder.unpack_crc } else { None };
                std::iter::repeat_n(inherited, n)
            })
            .collect();

        loop {
            match prop {
                property_id::END => break,
                property_id::CRC => {
                    let count = needs_digest.iter().filter(|&&b| b).count();
                    let defined = read_all_or_bits(r, count)?;
                    let mut defined = defined.into_iter();
                    for (digest, &needs) in digests.iter_mut().zip(&needs_digest) {
                        if needs && defined.next().unwrap_or(false) {
                            *digest = Some(read_u32_le(r)?);
                        }
                    }
                }
                other => {
                    return Err(Error::corrupt_header(
                        0,
                        format!("unexpected property {:#x} in SubStreamsInfo", other),
                    ));
                }
            }
            prop = read_u8(r)?;
        }

        Ok(Self {
            num_unpack_streams,
            unpack_sizes,
            digests,
        })
    }

    /// Appends the `SUBSTREAMS_INFO` section.
    pub fn write(&self, out: &mut Vec<u8>, folders: &[Folder]) {
        out.push(property_id::SUBSTREAMS_INFO);
        if self.num_unpack_streams.iter().any(|&n| n != 1) {
            out.push(property_id::NUM_UNPACK_STREAM);
            for &n in &self.num_unpack_streams {
                write_number(out, n as u64);
            }
        }

        let mut sizes = Vec::new();
        let mut pos = 0;
        for &n in &self.num_unpack_streams {
            // The last size of each folder is implied.
            for &size in self.unpack_sizes[pos..pos + n].iter().take(n.saturating_sub(1)) {
                write_number(&mut sizes, size);
            }
            pos += n;
        }
        if !sizes.is_empty() {
            out.push(property_id::SIZE);
            out.extend_from_slice(&sizes);
        }

        let mut explicit = Vec::new();
        let mut pos = 0;
        for (folder, &n) in folders.iter().zip(&self.num_unpack_streams) {
            let inherit = n == 1 && folder.unpack_crc.is_some();
            if !inherit {
                explicit.extend_from_slice(&self.digests[pos..pos + n]);
            }
            pos += n;
        }
        if explicit.iter().any(Option::is_some) {
            out.push(property_id::CRC);
            write_digests(out, &explicit);
        }
        out.push(property_id::END);
    }

    /// Total number of substreams.
    pub fn total_streams(&self) -> usize {
        self.num_unpack_streams.iter().sum()
    }
}

/// Pack, unpack and substream information of one StreamsInfo block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamsInfo {
    /// Packed streams.
    pub pack_info: Option<PackInfo>,
    /// Folder definitions.
    pub unpack_info: Option<UnpackInfo>,
    /// Per-folder substreams.
    pub substreams_info: Option<SubStreamsInfo>,
}

impl StreamsInfo {
    /// Parses a StreamsInfo block up to and including its `END` marker.
    pub fn parse<R: Read>(r: &mut R, limits: &ResourceLimits) -> Result<Self> {
        let mut info = Self::default();
        loop {
            match read_u8(r)? {
                property_id::END => break,
                property_id::PACK_INFO => info.pack_info = Some(PackInfo::parse(r, limits)?),
                property_id::UNPACK_INFO => {
                    info.unpack_info = Some(UnpackInfo::parse(r, limits)?)
                }
                property_id::SUBSTREAMS_INFO => {
                    let folders = info
                        .unpack_info
                        .as_ref()
                        .map(|u| u.folders.as_slice())
                        .unwrap_or(&[]);
                    info.substreams_info = Some(SubStreamsInfo::parse(r, folders, limits)?);
                }
                other => {
                    return Err(Error::corrupt_header(
                        0,
                        format!("unexpected property {:#x} in StreamsInfo", other),
                    ));
                }
            }
        }
        info.validate()?;
        Ok(info)
    }

    /// Appends the StreamsInfo body (without the leading section id).
    pub fn write(&self, out: &mut Vec<u8>) {
        if let Some(pack) = &self.pack_info {
            pack.write(out);
        }
        if let Some(unpack) = &self.unpack_info {
            unpack.write(out);
            if let Some(sub) = &self.substreams_info {
                sub.write(out, &unpack.folders);
            }
        }
        out.push(property_id::END);
    }

    /// The folders, or an empty slice.
    pub fn folders(&self) -> &[Folder] {
        self.unpack_info
            .as_ref()
            .map(|u| u.folders.as_slice())
            .unwrap_or(&[])
    }

    /// Number of packed streams.
    pub fn num_pack_streams(&self) -> usize {
        self.pack_info.as_ref().map_or(0, PackInfo::num_streams)
    }

    /// The substream partition, explicit or implied.
    pub fn substreams(&self) -> SubStreamsInfo {
        self.substreams_info
            .clone()
            .unwrap_or_else(|| SubStreamsInfo::implied(self.folders()))
    }

    /// Validates every folder and checks that folders do not claim more
    /// packed streams than exist.
    pub fn validate(&self) -> Result<()> {
        let num_pack = self.num_pack_streams();
        let mut needed = 0usize;
        for folder in self.folders() {
            folder.validate(num_pack)?;
            needed += folder.packed_streams.len();
        }
        if needed > num_pack {
            return Err(Error::MalformedFolder(format!(
                "folders need {} packed streams, {} declared",
                needed, num_pack
            )));
        }
        if let Some(sub) = &self.substreams_info {
            if sub.num_unpack_streams.len() != self.folders().len() {
                return Err(Error::corrupt_header(
                    0,
                    "substream counts do not match folder count",
                ));
            }
            let mut pos = 0;
            for (folder, &n) in self.folders().iter().zip(&sub.num_unpack_streams) {
                let Some(sizes) = sub.unpack_sizes.get(pos..pos + n) else {
                    return Err(Error::corrupt_header(0, "missing substream sizes"));
                };
                let total: u64 = sizes.iter().sum();
                if n > 0 && total != folder.unpack_size() {
                    return Err(Error::corrupt_header(
                        0,
                        format!(
                            "substreams sum to {} but folder unpacks to {}",
                            total,
                            folder.unpack_size()
                        ),
                    ));
                }
                pos += n;
            }
        }
        Ok(())
    }
}

fn expect_property<R: Read>(r: &mut R, expected: u8, section: &str) -> Result<()> {
    let found = read_u8(r)?;
    if found != expected {
        return Err(Error::corrupt_header(
            0,
            format!(
                "expected property {:#x} in {}, found {:#x}",
                expected, section, found
            ),
        ));
    }
    Ok(())
}

fn write_digests(out: &mut Vec<u8>, digests: &[Option<u32>]) {
    let defined: Vec<bool> = digests.iter().map(Option::is_some).collect();
    write_all_or_bits(out, &defined);
    for crc in digests.iter().flatten() {
        out.extend_from_slice(&crc.to_le_bytes());
    }
}
