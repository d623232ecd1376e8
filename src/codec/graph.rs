//! Wiring coders into a folder's stream graph.
//!
//! Decoding starts at the folder's main output and pulls each coder's
//! input either from the coder bound to it or from a packed stream.
//! Encoding handles linear chains only: folder coder `i` is encoding stage
//! `i`, so coder 0 is applied first when writing and last when reading,
//! and the final coder consumes packed stream 0.

use std::io::{self, Read, Write};

use crate::checksum::Crc32;
use crate::format::streams::{BindPair, Coder, Folder};
use crate::{Error, Result};

use super::{CodecRegistry, DecodeContext, EncodeContext, MethodConfiguration, StageOutput};

/// Builds the decoded main output of `folder` with the built-in registry.
///
/// `packed` holds one reader per entry of `folder.packed_streams`, in the
/// same order.
pub fn build_decode_stream(
    folder: &Folder,
    packed: Vec<Box<dyn Read + Send>>,
    ctx: &DecodeContext<'_>,
) -> Result<Box<dyn Read + Send>> {
    build_decode_stream_with(CodecRegistry::builtin(), folder, packed, ctx)
}

/// Like [`build_decode_stream`] with an explicit registry.
pub fn build_decode_stream_with(
    registry: &CodecRegistry,
    folder: &Folder,
    packed: Vec<Box<dyn Read + Send>>,
    ctx: &DecodeContext<'_>,
) -> Result<Box<dyn Read + Send>> {
    if packed.len() != folder.packed_streams.len() {
        return Err(Error::MalformedFolder(format!(
            "folder reads {} packed streams, {} supplied",
            folder.packed_streams.len(),
            packed.len()
        )));
    }
    let main = folder
        .main_output()
        .ok_or_else(|| Error::MalformedFolder("folder has no unbound output".into()))?;

    let mut resolver = Resolver {
        registry,
        folder,
        ctx,
        offsets: folder.stream_offsets(),
        packed: packed.into_iter().map(Some).collect(),
        visiting: vec![false; folder.coders.len()],
    };
    resolver.output(main)
}

struct Resolver<'a> {
    registry: &'a CodecRegistry,
    folder: &'a Folder,
    ctx: &'a DecodeContext<'a>,
    offsets: Vec<(usize, usize)>,
    packed: Vec<Option<Box<dyn Read + Send>>>,
    visiting: Vec<bool>,
}

impl Resolver<'_> {
    /// The decoded stream carried by output `out_index`.
    fn output(&mut self, out_index: usize) -> Result<Box<dyn Read + Send>> {
        let folder = self.folder;
        let coder_index = folder.coder_for_out_stream(out_index).ok_or_else(|| {
            Error::MalformedFolder(format!("output stream {out_index} has no coder"))
        })?;
        if std::mem::replace(&mut self.visiting[coder_index], true) {
            return Err(Error::MalformedFolder(format!(
                "coder {coder_index} feeds itself"
            )));
        }

        let coder = &folder.coders[coder_index];
        if coder.num_out_streams != 1 {
            return Err(Error::MalformedFolder(format!(
                "coder {coder_index} has {} outputs",
                coder.num_out_streams
            )));
        }
        if coder.num_in_streams != 1 {
            return Err(Error::UnsupportedFeature {
                feature: "coders with several input streams",
            });
        }
        self.check_memory(coder)?;

        let input = self.input(self.offsets[coder_index].0)?;
        let unpack_size = folder.unpack_sizes.get(out_index).copied().ok_or_else(|| {
            Error::MalformedFolder(format!("no unpack size for output {out_index}"))
        })?;
        log::debug!(
            "coder {} ({:02x?}) decodes {} bytes",
            coder_index,
            coder.method_id,
            unpack_size
        );
        let decoder = self
            .registry
            .decoder(input, coder, unpack_size, self.ctx)?;
        Ok(Box::new(decoder.take(unpack_size)))
    }

    /// The stream feeding input `in_index`.
    fn input(&mut self, in_index: usize) -> Result<Box<dyn Read + Send>> {
        let folder = self.folder;
        if let Some(bp) = folder.find_bind_pair_for_in_stream(in_index) {
            return self.output(folder.bind_pairs[bp].out_index);
        }
        let slot = folder.find_packed_stream(in_index).ok_or_else(|| {
            Error::MalformedFolder(format!("input stream {in_index} is not connected"))
        })?;
        self.packed
            .get_mut(slot)
            .and_then(Option::take)
            .ok_or_else(|| Error::MalformedFolder(format!("packed stream {slot} read twice")))
    }

    fn check_memory(&self, coder: &Coder) -> Result<()> {
        let Some(limit_kib) = self.ctx.max_memory_kib else {
            return Ok(());
        };
        let required_kib = self.registry.memory_kib(coder)?;
        if required_kib > limit_kib {
            return Err(Error::MemoryLimitExceeded {
                required_kib,
                limit_kib,
            });
        }
        Ok(())
    }
}

/// Checks every coder of `folder` against a memory limit without building
/// anything.
pub fn check_folder_memory(
    registry: &CodecRegistry,
    folder: &Folder,
    limit_kib: u64,
) -> Result<()> {
    for coder in &folder.coders {
        let required_kib = registry.memory_kib(coder)?;
        if required_kib > limit_kib {
            return Err(Error::MemoryLimitExceeded {
                required_kib,
                limit_kib,
            });
        }
    }
    Ok(())
}

/// Lays out a linear folder for `chain`, given in encoding order.
///
/// Coder properties are left empty and sizes zero; [`StageSink::finish`]
/// fills both in.
pub fn plan_encode_graph(chain: &[MethodConfiguration]) -> Folder {
    let n = chain.len();
    Folder {
        coders: chain
            .iter()
            .map(|c| Coder::simple(c.method.id(), None))
            .collect(),
        bind_pairs: (1..n)
            .map(|i| BindPair {
                in_index: i - 1,
                out_index: i,
            })
            .collect(),
        packed_streams: if n == 0 { Vec::new() } else { vec![n - 1] },
        unpack_sizes: vec![0; n],
        unpack_crc: None,
    }
}

/// Instantiates the encoders of `chain` and returns the writer feeding the
/// first stage.
pub fn build_encode_stream(
    registry: &CodecRegistry,
    chain: &[MethodConfiguration],
    ctx: &EncodeContext<'_>,
) -> Result<StageSink> {
    if chain.is_empty() {
        return Err(Error::InvalidFormat("empty method chain".into()));
    }

    let mut folder = plan_encode_graph(chain);
    let mut output = StageOutput::Sink(Vec::new());
    for (coder, config) in folder.coders.iter_mut().zip(chain).rev() {
        let stage = registry.encoder(output, config, ctx)?;
        coder.properties = stage.properties;
        output = StageOutput::Stage {
            encoder: stage.encoder,
            consumed: 0,
        };
    }

    Ok(StageSink {
        head: output,
        folder,
        crc: Crc32::new(),
    })
}

/// The plain-data end of an encoding chain.
#[derive(Debug)]
pub struct StageSink {
    head: StageOutput,
    folder: Folder,
    crc: Crc32,
}

/// A finished folder and its packed bytes.
#[derive(Debug, Clone)]
pub struct EncodedFolder {
    /// The folder with properties and unpack sizes filled in.
    pub folder: Folder,
    /// Packed stream 0.
    pub packed: Vec<u8>,
    /// CRC of the plain data.
    pub crc: u32,
}

impl StageSink {
    /// Plain bytes accepted so far.
    pub fn bytes_in(&self) -> u64 {
        match &self.head {
            StageOutput::Stage { consumed, .. } => *consumed,
            StageOutput::Sink(buf) => buf.len() as u64,
        }
    }

    /// Finishes every stage in order and records the size entering each.
    pub fn finish(self) -> Result<EncodedFolder> {
        let Self {
            head,
            mut folder,
            crc,
        } = self;
        let mut sizes = Vec::with_capacity(folder.coders.len());
        let mut output = head;
        let packed = loop {
            match output {
                StageOutput::Stage { encoder, consumed } => {
                    sizes.push(consumed);
                    output = encoder.finish().map_err(Error::from_io)?;
                }
                StageOutput::Sink(bytes) => break bytes,
            }
        };
        folder.unpack_sizes = sizes;
        Ok(EncodedFolder {
            folder,
            packed,
            crc: crc.finalize(),
        })
    }
}

impl Write for StageSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.head.write(buf)?;
        self.crc.update(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.head.flush()
    }
}
