use std::io::{self, Read, Write};

use byteorder::WriteBytesExt;
use bytes::{Buf, Bytes};
use flate2::read::{DeflateDecoder, ZlibDecoder};
use flate2::write::{DeflateEncoder, ZlibEncoder};
use flate2::Compression;
use log::debug;

use crate::errors::{unsupported_err, Result};
use crate::packet::impl_packet_trait;
use crate::parsing::BufParsing;
use crate::ser::Serialize;
use crate::types::{CompressionAlgorithm, PacketFraming, PacketHeaderVersion, Tag};

/// Compressed Data Packet
///
/// The body is a further packet sequence once decompressed.
///
/// Ref: <https://www.rfc-editor.org/rfc/rfc4880.html#section-5.6>
#[derive(Clone, PartialEq, Eq, derive_more::Debug)]
pub struct CompressedData {
    framing: PacketFraming,
    compression_algorithm: CompressionAlgorithm,
    #[debug("{} bytes", compressed_data.len())]
    compressed_data: Bytes,
}

/// Streaming decompression of a [CompressedData] body.
pub enum Decompressor<R> {
    Uncompressed(R),
    Zip(DeflateDecoder<R>),
    Zlib(ZlibDecoder<R>),
    #[cfg(feature = "bzip2")]
    Bzip2(bzip2::read::BzDecoder<R>),
}

impl<R: Read> Read for Decompressor<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Decompressor::Uncompressed(r) => r.read(buf),
            Decompressor::Zip(r) => r.read(buf),
            Decompressor::Zlib(r) => r.read(buf),
            #[cfg(feature = "bzip2")]
            Decompressor::Bzip2(r) => r.read(buf),
        }
    }
}

impl CompressedData {
    pub fn from_buf<B: Buf>(packet_version: PacketHeaderVersion, i: &mut B) -> Result<Self> {
        let compression_algorithm = CompressionAlgorithm::from(i.read_u8()?);
        Ok(CompressedData {
            framing: packet_version.into(),
            compression_algorithm,
            compressed_data: i.rest(),
        })
    }

    /// Compresses `data` into a new packet.
    pub fn compress(alg: CompressionAlgorithm, data: &[u8]) -> Result<Self> {
        let compressed: Vec<u8> = match alg {
            CompressionAlgorithm::Uncompressed => data.to_vec(),
            CompressionAlgorithm::ZIP => {
                let mut enc = DeflateEncoder::new(Vec::new(), Compression::default());
                enc.write_all(data)?;
                enc.finish()?
            }
            CompressionAlgorithm::ZLIB => {
                let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
                enc.write_all(data)?;
                enc.finish()?
            }
            #[cfg(feature = "bzip2")]
            CompressionAlgorithm::BZip2 => {
                let mut enc =
                    bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::default());
                enc.write_all(data)?;
                enc.finish()?
            }
            _ => unsupported_err!("compression algorithm {:?}", alg),
        };
        debug!("compressed {} into {} with {:?}", data.len(), compressed.len(), alg);

        Ok(CompressedData {
            framing: Default::default(),
            compression_algorithm: alg,
            compressed_data: compressed.into(),
        })
    }

    pub fn compression_algorithm(&self) -> CompressionAlgorithm {
        self.compression_algorithm
    }

    pub fn compressed_data(&self) -> &[u8] {
        &self.compressed_data
    }

    /// A reader over the decompressed body.
    pub fn decompress(&self) -> Result<Decompressor<&[u8]>> {
        let data = &self.compressed_data[..];
        let dec = match self.compression_algorithm {
            CompressionAlgorithm::Uncompressed => Decompressor::Uncompressed(data),
            CompressionAlgorithm::ZIP => Decompressor::Zip(DeflateDecoder::new(data)),
            CompressionAlgorithm::ZLIB => Decompressor::Zlib(ZlibDecoder::new(data)),
            #[cfg(feature = "bzip2")]
            CompressionAlgorithm::BZip2 => Decompressor::Bzip2(bzip2::read::BzDecoder::new(data)),
            alg => unsupported_err!("compression algorithm {:?}", alg),
        };
        Ok(dec)
    }

    /// Decompresses the full body into memory.
    pub fn decompress_to_vec(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.decompress()?.read_to_end(&mut out)?;
        Ok(out)
    }
}

impl Serialize for CompressedData {
    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u8(self.compression_algorithm.into())?;
        writer.write_all(&self.compressed_data)?;
        Ok(())
    }

    fn write_len(&self) -> usize {
        1 + self.compressed_data.len()
    }
}

impl_packet_trait!(CompressedData, Tag::CompressedData);
