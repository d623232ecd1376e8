//! LZMA and LZMA2 coders backed by `lzma-rust2`.

use std::io::{self, Read, Write};

use crate::{Error, Result};

use super::{Decoder, Encoder, LzmaSettings, MethodOptions, lzma2_dict_prop, lzma2_dict_size, method};

fn codec_error(e: impl std::fmt::Display) -> Error {
    Error::Io(io::Error::new(io::ErrorKind::InvalidData, e.to_string()))
}

/// Splits the 5-byte LZMA property blob into the props byte and dictionary size.
pub(crate) fn lzma_properties(properties: &[u8]) -> Result<(u8, u32)> {
    match properties {
        [props, d0, d1, d2, d3, ..] => Ok((*props, u32::from_le_bytes([*d0, *d1, *d2, *d3]))),
        _ => Err(Error::InvalidFormat(format!(
            "LZMA properties need 5 bytes, got {}",
            properties.len()
        ))),
    }
}

/// Decoder memory in KiB: dictionary plus literal coder tables.
pub(crate) fn lzma_memory_kib(properties: &[u8]) -> Result<u64> {
    let (props, dict_size) = lzma_properties(properties)?;
    if props >= 9 * 5 * 5 {
        return Err(Error::InvalidFormat(format!("invalid LZMA props byte {props:#04x}")));
    }
    let lc = u32::from(props % 9);
    let lp = u32::from(props / 9 % 5);
    Ok(10 + u64::from(dict_size) / 1024 + ((0x600u64 << (lc + lp)) / 1024))
}

/// Decoder memory in KiB for an LZMA2 property byte.
pub(crate) fn lzma2_memory_kib(properties: &[u8]) -> Result<u64> {
    let prop = properties
        .first()
        .copied()
        .ok_or_else(|| Error::InvalidFormat("missing LZMA2 properties".into()))?;
    Ok(104 + u64::from(lzma2_dict_size(prop)?) / 1024)
}

fn settings(options: &MethodOptions) -> Result<LzmaSettings> {
    match *options {
        MethodOptions::None => Ok(LzmaSettings::default()),
        MethodOptions::Level(level) if level <= 9 => Ok(LzmaSettings {
            level,
            dict_size: None,
        }),
        MethodOptions::DictSize(dict_size) => Ok(LzmaSettings {
            dict_size: Some(dict_size),
            ..LzmaSettings::default()
        }),
        MethodOptions::Lzma(settings) if settings.level <= 9 => Ok(settings),
        other => Err(Error::InvalidFormat(format!(
            "options {other:?} do not apply to LZMA"
        ))),
    }
}

fn lzma_options(settings: &LzmaSettings) -> lzma_rust2::LzmaOptions {
    let mut opts = lzma_rust2::LzmaOptions::with_preset(settings.level);
    if let Some(dict_size) = settings.dict_size {
        opts.dict_size = dict_size;
    }
    opts
}

/// LZMA decoder with a known unpacked size.
pub struct LzmaDecoder<R> {
    inner: lzma_rust2::LzmaReader<R>,
}

impl<R> std::fmt::Debug for LzmaDecoder<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LzmaDecoder").finish_non_exhaustive()
    }
}

impl<R: Read + Send> LzmaDecoder<R> {
    /// Creates a decoder from the 5-byte coder properties.
    pub fn new(input: R, properties: &[u8], unpack_size: u64) -> Result<Self> {
        let (props, dict_size) = lzma_properties(properties)?;
        let inner =
            lzma_rust2::LzmaReader::new_with_props(input, unpack_size, props, dict_size, None)
                .map_err(codec_error)?;
        Ok(Self { inner })
    }
}

impl<R: Read + Send> Read for LzmaDecoder<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl<R: Read + Send> Decoder for LzmaDecoder<R> {
    fn method_id(&self) -> &'static [u8] {
        method::LZMA
    }
}

/// LZMA2 decoder.
pub struct Lzma2Decoder<R> {
    inner: lzma_rust2::Lzma2Reader<R>,
}

impl<R> std::fmt::Debug for Lzma2Decoder<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lzma2Decoder").finish_non_exhaustive()
    }
}

impl<R: Read + Send> Lzma2Decoder<R> {
    /// Creates a decoder from the 1-byte coder property.
    pub fn new(input: R, properties: &[u8]) -> Result<Self> {
        let prop = properties
            .first()
            .copied()
            .ok_or_else(|| Error::InvalidFormat("missing LZMA2 properties".into()))?;
        let dict_size = lzma2_dict_size(prop)?;
        Ok(Self {
            inner: lzma_rust2::Lzma2Reader::new(input, dict_size, None),
        })
    }
}

impl<R: Read + Send> Read for Lzma2Decoder<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl<R: Read + Send> Decoder for Lzma2Decoder<R> {
    fn method_id(&self) -> &'static [u8] {
        method::LZMA2
    }
}

/// LZMA encoder writing a raw stream with an end marker.
pub struct LzmaEncoder<W: Write> {
    inner: lzma_rust2::LzmaWriter<W>,
    properties: Vec<u8>,
}

impl<W: Write> std::fmt::Debug for LzmaEncoder<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LzmaEncoder").finish_non_exhaustive()
    }
}

impl<W: Write + Send> LzmaEncoder<W> {
    /// Creates an encoder.
    pub fn new(output: W, options: &MethodOptions) -> Result<Self> {
        let opts = lzma_options(&settings(options)?);
        let mut properties = vec![opts.get_props()];
        properties.extend_from_slice(&opts.dict_size.to_le_bytes());
        let inner =
            lzma_rust2::LzmaWriter::new_no_header(output, &opts, true).map_err(codec_error)?;
        Ok(Self { inner, properties })
    }

    /// The 5-byte coder properties.
    pub fn properties(&self) -> &[u8] {
        &self.properties
    }
}

impl<W: Write + Send> Write for LzmaEncoder<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl<W: Write + Send> Encoder<W> for LzmaEncoder<W> {
    fn method_id(&self) -> &'static [u8] {
        method::LZMA
    }

    fn finish(self: Box<Self>) -> io::Result<W> {
        self.inner.finish()
    }
}

/// LZMA2 encoder.
pub struct Lzma2Encoder<W: Write> {
    inner: lzma_rust2::Lzma2Writer<W>,
    dict_prop: u8,
}

impl<W: Write> std::fmt::Debug for Lzma2Encoder<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lzma2Encoder")
            .field("dict_prop", &self.dict_prop)
            .finish_non_exhaustive()
    }
}

impl<W: Write + Send> Lzma2Encoder<W> {
    /// Creates an encoder.
    pub fn new(output: W, options: &MethodOptions) -> Result<Self> {
        let settings = settings(options)?;
        let mut opts = lzma_rust2::Lzma2Options::with_preset(settings.level);
        if let Some(dict_size) = settings.dict_size {
            opts.lzma_options.dict_size = dict_size;
        }
        let dict_prop = lzma2_dict_prop(opts.lzma_options.dict_size);
        Ok(Self {
            inner: lzma_rust2::Lzma2Writer::new(output, opts),
            dict_prop,
        })
    }

    /// The 1-byte coder property.
    pub fn properties(&self) -> Vec<u8> {
        vec![self.dict_prop]
    }
}

impl<W: Write + Send> Write for Lzma2Encoder<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl<W: Write + Send> Encoder<W> for Lzma2Encoder<W> {
    fn method_id(&self) -> &'static [u8] {
        method::LZMA2
    }

    fn finish(self: Box<Self>) -> io::Result<W> {
        self.inner.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample() -> Vec<u8> {
        b"The quick brown fox jumps over the lazy dog. "
            .repeat(200)
    }

    #[test]
    fn test_lzma_round_trip() {
        let data = sample();
        let mut encoder = Box::new(LzmaEncoder::new(Vec::new(), &MethodOptions::Level(1)).unwrap());
        let props = encoder.properties().to_vec();
        encoder.write_all(&data).unwrap();
        let compressed = encoder.finish().unwrap();
        assert!(compressed.len() < data.len());

        let mut decoder =
            LzmaDecoder::new(Cursor::new(compressed), &props, data.len() as u64).unwrap();
        let mut output = Vec::new();
        decoder.read_to_end(&mut output).unwrap();
        assert_eq!(output, data);
    }

    #[test]
    fn test_lzma2_round_trip_with_dict_size() {
        let data = sample();
        let mut encoder =
            Box::new(Lzma2Encoder::new(Vec::new(), &MethodOptions::DictSize(1 << 16)).unwrap());
        let props = encoder.properties();
        assert_eq!(lzma2_dict_size(props[0]).unwrap(), 1 << 16);
        encoder.write_all(&data).unwrap();
        let compressed = encoder.finish().unwrap();

        let mut decoder = Lzma2Decoder::new(Cursor::new(compressed), &props).unwrap();
        let mut output = Vec::new();
        decoder.read_to_end(&mut output).unwrap();
        assert_eq!(output, data);
    }

    #[test]
    fn test_bad_properties() {
        assert!(LzmaDecoder::new(Cursor::new(Vec::new()), &[0x5D, 0], 0).is_err());
        assert!(Lzma2Decoder::new(Cursor::new(Vec::new()), &[]).is_err());
        assert!(Lzma2Decoder::new(Cursor::new(Vec::new()), &[41]).is_err());
        assert!(LzmaEncoder::new(Vec::new(), &MethodOptions::Delta(1)).is_err());
    }

    #[test]
    fn test_memory_estimates() {
        // lc=3, lp=0, pb=2 with a 1 MiB dictionary
        let kib = lzma_memory_kib(&[0x5D, 0, 0, 0x10, 0]).unwrap();
        assert_eq!(kib, 10 + 1024 + 12);
        assert_eq!(lzma2_memory_kib(&[18]).unwrap(), 104 + 2048);
        assert!(lzma_memory_kib(&[0xFF, 0, 0, 0, 0]).is_err());
    }
}
