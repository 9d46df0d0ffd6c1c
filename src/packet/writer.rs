use std::io;

use log::debug;

use crate::errors::{bail, Result};
use crate::packet::{PacketHeader, PacketTrait};
use crate::ser::Serialize;
use crate::types::{PacketLength, Tag, MAX_PARTIAL_LEN};

/// Writes a complete packet, header first. The length is known before anything is written.
pub fn write_packet<W: io::Write, P: PacketTrait>(writer: &mut W, packet: &P) -> Result<()> {
    debug!("write packet {:?}", packet.tag());
    packet.to_writer_with_header(writer)
}

/// Smallest chunk allowed as the first partial body.
pub const MIN_PARTIAL_LEN: usize = 512;

/// Default partial body chunk size.
pub const DEFAULT_PARTIAL_LEN: usize = 1 << 16;

/// Writes a packet body of unknown length using partial body lengths.
///
/// Data is buffered into chunks of `chunk_size` octets, a power of two. Bodies that
/// never fill a chunk are written as a single packet with a fixed length.
#[derive(Debug)]
pub struct PartialBodyWriter<W: io::Write> {
    inner: W,
    tag: Tag,
    chunk_size: usize,
    buffer: Vec<u8>,
    header_written: bool,
}

impl<W: io::Write> PartialBodyWriter<W> {
    pub fn new(inner: W, tag: Tag, chunk_size: usize) -> Result<Self> {
        if chunk_size < MIN_PARTIAL_LEN
            || !chunk_size.is_power_of_two()
            || chunk_size > MAX_PARTIAL_LEN as usize
        {
            bail!("invalid partial body chunk size {}", chunk_size);
        }

        Ok(PartialBodyWriter {
            inner,
            tag,
            chunk_size,
            buffer: Vec::with_capacity(chunk_size),
            header_written: false,
        })
    }

    fn flush_chunk(&mut self) -> io::Result<()> {
        if !self.header_written {
            io::Write::write_all(&mut self.inner, &[0b1100_0000 | u8::from(self.tag)])?;
            self.header_written = true;
        }
        debug!("partial body chunk of {}", self.buffer.len());
        PacketLength::Partial(self.chunk_size as u32)
            .to_writer_new(&mut self.inner)
            .map_err(io::Error::other)?;
        self.inner.write_all(&self.buffer)?;
        self.buffer.clear();
        Ok(())
    }

    /// Writes the final chunk and returns the inner writer.
    pub fn finish(mut self) -> Result<W> {
        let len = u32::try_from(self.buffer.len())?;
        if self.header_written {
            PacketLength::Fixed(len).to_writer_new(&mut self.inner)?;
        } else {
            PacketHeader::new_fixed(self.tag, len).to_writer(&mut self.inner)?;
        }
        self.inner.write_all(&self.buffer)?;
        self.inner.flush()?;

        Ok(self.inner)
    }
}

impl<W: io::Write> io::Write for PartialBodyWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        // a full chunk is only flushed once more data shows up, so the last chunk
        // always carries a fixed length
        if self.buffer.len() == self.chunk_size {
            self.flush_chunk()?;
        }
        let take = (self.chunk_size - self.buffer.len()).min(buf.len());
        self.buffer.extend_from_slice(&buf[..take]);
        Ok(take)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Body writer for a packet whose length was announced up front.
#[derive(Debug)]
pub struct FixedBodyWriter<W: io::Write> {
    inner: W,
    remaining: u64,
}

impl<W: io::Write> FixedBodyWriter<W> {
    /// Writes the header for a body of exactly `len` octets.
    pub fn new(mut inner: W, tag: Tag, len: u32) -> Result<Self> {
        PacketHeader::new_fixed(tag, len).to_writer(&mut inner)?;
        Ok(FixedBodyWriter {
            inner,
            remaining: u64::from(len),
        })
    }

    /// Checks the announced length was met and returns the inner writer.
    pub fn finish(mut self) -> Result<W> {
        if self.remaining != 0 {
            bail!("packet body is {} octets short", self.remaining);
        }
        self.inner.flush()?;
        Ok(self.inner)
    }
}

impl<W: io::Write> io::Write for FixedBodyWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.len() as u64 > self.remaining {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "write exceeds the announced packet length",
            ));
        }
        let written = self.inner.write(buf)?;
        self.remaining -= written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Either kind of streaming body writer.
#[derive(Debug)]
pub enum BodyWriter<W: io::Write> {
    Fixed(FixedBodyWriter<W>),
    Partial(PartialBodyWriter<W>),
}

impl<W: io::Write> BodyWriter<W> {
    pub fn finish(self) -> Result<W> {
        match self {
            BodyWriter::Fixed(w) => w.finish(),
            BodyWriter::Partial(w) => w.finish(),
        }
    }
}

impl<W: io::Write> io::Write for BodyWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            BodyWriter::Fixed(w) => w.write(buf),
            BodyWriter::Partial(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            BodyWriter::Fixed(w) => w.flush(),
            BodyWriter::Partial(w) => w.flush(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::packet::PacketReader;

    #[test]
    fn test_small_body_is_fixed() {
        let mut w = PartialBodyWriter::new(Vec::new(), Tag::SymEncryptedData, 512).unwrap();
        w.write_all(b"short").unwrap();
        let out = w.finish().unwrap();
        assert_eq!(out, [0xC9, 0x05, b's', b'h', b'o', b'r', b't']);
    }

    #[test]
    fn test_partial_chunks_roundtrip() {
        let data: Vec<u8> = (0..2000u32).map(|i| i as u8).collect();
        let mut w = PartialBodyWriter::new(Vec::new(), Tag::SymEncryptedData, 512).unwrap();
        for chunk in data.chunks(77) {
            w.write_all(chunk).unwrap();
        }
        let out = w.finish().unwrap();
        // 0xC9, then 3 partial chunks, then the fixed tail of 464
        assert_eq!(out[0], 0xC9);
        assert_eq!(out[1], 0xE9);

        let (header, body) = PacketReader::new(&out[..]).read_raw().unwrap().unwrap();
        assert_eq!(header.tag(), Tag::SymEncryptedData);
        assert_eq!(body.as_ref(), &data[..]);
    }

    #[test]
    fn test_exact_chunk_multiple_ends_fixed() {
        let data = vec![1u8; 1024];
        let mut w = PartialBodyWriter::new(Vec::new(), Tag::SymEncryptedData, 512).unwrap();
        w.write_all(&data).unwrap();
        let out = w.finish().unwrap();

        let (_, body) = PacketReader::new(&out[..]).read_raw().unwrap().unwrap();
        assert_eq!(body.len(), 1024);
    }

    #[test]
    fn test_invalid_chunk_size() {
        assert!(PartialBodyWriter::new(Vec::new(), Tag::SymEncryptedData, 500).is_err());
        assert!(PartialBodyWriter::new(Vec::new(), Tag::SymEncryptedData, 256).is_err());
    }

    #[test]
    fn test_fixed_body_writer() {
        let mut w = FixedBodyWriter::new(Vec::new(), Tag::LiteralData, 3).unwrap();
        w.write_all(b"ab").unwrap();
        assert!(w.write_all(b"cd").is_err());

        let mut w = FixedBodyWriter::new(Vec::new(), Tag::LiteralData, 3).unwrap();
        w.write_all(b"ab").unwrap();
        assert!(w.finish().is_err());
    }
}
