use std::io::{self, BufRead, Read};

use bytes::{Bytes, BytesMut};
use log::debug;

use crate::errors::{format_bail, Error, Result};
use crate::packet::{Packet, PacketHeader};
use crate::parsing_reader::BufReadParsing;
use crate::types::{LengthFormat, PacketFraming, PacketLength, Tag};

/// Reads framed packets off a byte stream, one at a time.
///
/// Partial body chunks are reassembled, indeterminate lengths run to the end of the
/// stream.
#[derive(Debug)]
pub struct PacketReader<R> {
    inner: R,
}

fn truncated(err: io::Error) -> Error {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        Error::Format {
            message: "truncated packet stream".to_string(),
        }
    } else {
        err.into()
    }
}

impl<R: BufRead> PacketReader<R> {
    pub fn new(inner: R) -> Self {
        PacketReader { inner }
    }

    /// Returns the tag of the next packet without consuming anything,
    /// `None` at the end of the stream.
    pub fn next_tag(&mut self) -> Result<Option<Tag>> {
        match self.inner.peek_u8()? {
            Some(octet) => Tag::from_header_octet(octet).map(Some),
            None => Ok(None),
        }
    }

    /// Reads the next packet, `None` at the end of the stream.
    ///
    /// The packet keeps the framing it was read with, writing it reproduces the input.
    pub fn read_packet(&mut self) -> Result<Option<Packet>> {
        let Some((header, body, framing)) = self.read_frame()? else {
            return Ok(None);
        };
        let mut packet = Packet::from_bytes(header.version(), header.tag(), body)?;
        packet.set_framing(framing);
        Ok(Some(packet))
    }

    /// Reads the next header and its complete body.
    pub fn read_raw(&mut self) -> Result<Option<(PacketHeader, Bytes)>> {
        Ok(self.read_frame()?.map(|(header, body, _)| (header, body)))
    }

    /// Consumes the next packet, returning its tag.
    pub fn skip_packet(&mut self) -> Result<Option<Tag>> {
        Ok(self.read_raw()?.map(|(header, _)| header.tag()))
    }

    /// Reads only the next header, leaving the body on the stream.
    pub fn read_header(&mut self) -> Result<Option<PacketHeader>> {
        if !self.inner.has_remaining()? {
            return Ok(None);
        }
        let header = PacketHeader::from_reader(&mut self.inner).map_err(|err| match err {
            Error::IO { source, .. } => truncated(source),
            other => other,
        })?;
        Ok(Some(header))
    }

    fn read_frame(&mut self) -> Result<Option<(PacketHeader, Bytes, PacketFraming)>> {
        let Some(header) = self.read_header()? else {
            return Ok(None);
        };
        let (body, framing) = self.read_body(&header)?;
        debug!("read {:?} packet, {} body octets", header.tag(), body.len());

        Ok(Some((header, body, framing)))
    }

    fn read_body(&mut self, header: &PacketHeader) -> Result<(Bytes, PacketFraming)> {
        let mut body = BytesMut::new();
        let mut chunks = Vec::new();
        let mut length = header.packet_length();
        let mut octets = header.length_octets();
        loop {
            match length {
                PacketLength::Fixed(len) => {
                    self.inner
                        .take_bytes_into(len as usize, &mut body)
                        .map_err(truncated)?;
                    break;
                }
                PacketLength::Indeterminate => {
                    self.inner.rest_into(&mut body)?;
                    break;
                }
                PacketLength::Partial(len) => {
                    self.inner
                        .take_bytes_into(len as usize, &mut body)
                        .map_err(truncated)?;
                    chunks.push(len);
                    (length, octets) =
                        PacketLength::read_with_octets(&mut self.inner).map_err(truncated)?;
                }
            }
        }

        let version = header.version();
        let framing = match header.packet_length() {
            PacketLength::Indeterminate => {
                PacketFraming::new(version, LengthFormat::Indeterminate)
            }
            _ if !chunks.is_empty() => PacketFraming::new(
                version,
                LengthFormat::Partial {
                    chunks,
                    last: octets,
                },
            ),
            _ => PacketFraming::fixed(version, octets, body.len()),
        };

        Ok((body.freeze(), framing))
    }

    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: BufRead> Iterator for PacketReader<R> {
    type Item = Result<Packet>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_packet().transpose()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyState {
    /// Inside a chunk that ends the body.
    Last,
    /// Inside a partial chunk, another length follows it.
    Partial,
    Indeterminate,
    Done,
}

fn body_state(length: PacketLength) -> (usize, BodyState) {
    match length {
        PacketLength::Fixed(len) => (len as usize, BodyState::Last),
        PacketLength::Partial(len) => (len as usize, BodyState::Partial),
        PacketLength::Indeterminate => (0, BodyState::Indeterminate),
    }
}

/// Streams a single packet body, reading partial body lengths as they come up.
///
/// Nothing beyond the current read is buffered, so bodies of any size can be
/// processed with constant memory.
#[derive(Debug)]
pub struct PacketBodyReader<R> {
    inner: R,
    /// Octets left in the current chunk.
    remaining: usize,
    state: BodyState,
}

impl<R: BufRead> PacketBodyReader<R> {
    /// Reads the body announced by `length` from `inner`, which is positioned right after
    /// the packet header.
    pub fn new(inner: R, length: PacketLength) -> Self {
        let (remaining, state) = body_state(length);
        PacketBodyReader {
            inner,
            remaining,
            state,
        }
    }

    /// True once the whole body has been read.
    pub fn is_done(&self) -> bool {
        self.state == BodyState::Done
    }

    /// Returns the inner reader, positioned after the body if it was read to the end.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: BufRead> Read for PacketBodyReader<R> {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if out.is_empty() {
            return Ok(0);
        }
        loop {
            match self.state {
                BodyState::Done => return Ok(0),
                BodyState::Indeterminate => {
                    let n = self.inner.read(out)?;
                    if n == 0 {
                        self.state = BodyState::Done;
                    }
                    return Ok(n);
                }
                BodyState::Last | BodyState::Partial if self.remaining > 0 => {
                    let max = out.len().min(self.remaining);
                    let n = self.inner.read(&mut out[..max])?;
                    if n == 0 {
                        return Err(io::Error::new(
                            io::ErrorKind::UnexpectedEof,
                            "truncated packet body",
                        ));
                    }
                    self.remaining -= n;
                    return Ok(n);
                }
                BodyState::Last => {
                    self.state = BodyState::Done;
                    return Ok(0);
                }
                BodyState::Partial => {
                    let length = PacketLength::try_from_reader(&mut self.inner)?;
                    debug!("next body chunk {:?}", length);
                    (self.remaining, self.state) = body_state(length);
                }
            }
        }
    }
}

/// Parses all packets in `data`.
pub fn read_packets(data: &[u8]) -> Result<Vec<Packet>> {
    let packets = PacketReader::new(data).collect::<Result<Vec<_>>>()?;
    if packets.is_empty() && !data.is_empty() {
        format_bail!("no packets found");
    }
    Ok(packets)
}

#[cfg(test)]
mod tests {
    use byteorder::{BigEndian, WriteBytesExt};
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    use super::*;
    use crate::packet::{Marker, PacketTrait, Trust, UserId};
    use crate::ser::Serialize;
    use crate::types::PacketHeaderVersion;

    #[test]
    fn test_read_partial_body() {
        // literal data split into a 512 octet partial chunk and a 3 octet tail
        let mut raw = vec![0xCB, 0xE9];
        raw.extend_from_slice(&[b'b', 0, 0, 0, 0, 0]);
        raw.extend_from_slice(&[b'x'; 506]);
        raw.extend_from_slice(&[0x03, b'y', b'y', b'y']);

        let mut reader = PacketReader::new(&raw[..]);
        let packet = reader.read_packet().unwrap().unwrap();
        let Packet::LiteralData(lit) = packet else {
            panic!("unexpected packet {:?}", packet);
        };
        assert_eq!(lit.data().len(), 509);
        assert!(lit.data().ends_with(b"xyyy"));
        assert!(reader.read_packet().unwrap().is_none());
    }

    #[test]
    fn test_partial_body_is_written_back_unchanged() {
        let mut raw = vec![0xCB, 0xE9];
        raw.extend_from_slice(&[b'b', 0, 0, 0, 0, 0]);
        raw.extend_from_slice(&[b'x'; 506]);
        raw.extend_from_slice(&[0x03, b'y', b'y', b'y']);

        let packets = read_packets(&raw).unwrap();
        assert_eq!(
            packets[0].framing().length,
            LengthFormat::Partial {
                chunks: vec![512],
                last: 1
            }
        );
        assert_eq!(packets[0].write_len(), raw.len());
        assert_eq!(packets[0].to_bytes().unwrap(), raw);
    }

    #[test]
    fn test_read_indeterminate() {
        let mut raw = vec![0xAF];
        raw.extend_from_slice(&[b'b', 0, 0, 0, 0, 0]);
        raw.extend_from_slice(b"hello");

        let packets = read_packets(&raw).unwrap();
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].tag(), Tag::LiteralData);
        assert_eq!(packets[0].framing().length, LengthFormat::Indeterminate);
        assert_eq!(packets[0].to_bytes().unwrap(), raw);
    }

    #[test]
    fn test_non_minimal_length_is_written_back_unchanged() {
        let mut raw = vec![0xB5, 0x00, 0x05];
        raw.extend_from_slice(b"alice");

        let packets = read_packets(&raw).unwrap();
        let Packet::UserId(ref uid) = packets[0] else {
            panic!("unexpected packet {:?}", packets[0]);
        };
        assert_eq!(uid.id(), b"alice");
        assert_eq!(uid.packet_version(), PacketHeaderVersion::Old);
        assert_eq!(uid.framing().length, LengthFormat::Fixed(2));
        assert_eq!(packets[0].to_bytes().unwrap(), raw);

        // a fresh packet with the same id is framed minimally
        let fresh = UserId::from_str(PacketHeaderVersion::Old, "alice");
        assert_ne!(&fresh, uid);
        assert_eq!(Packet::from(fresh).to_bytes().unwrap()[..2], [0xB4, 0x05]);
    }

    #[test]
    fn test_minimal_framing_compares_equal_to_fresh_packets() {
        let uid = UserId::from_str(Default::default(), "bob");
        let raw = Packet::from(uid.clone()).to_bytes().unwrap();
        assert_eq!(read_packets(&raw).unwrap(), vec![Packet::UserId(uid)]);
    }

    #[derive(Debug, Clone)]
    enum Form {
        OldFixed(u8),
        OldIndeterminate,
        NewFixed(u8),
        NewPartial { chunks: Vec<u32>, last: u8 },
    }

    fn new_length(out: &mut Vec<u8>, octets: u8, len: u32) {
        match octets {
            1 => out.push(len as u8),
            2 => {
                out.push((((len - 192) >> 8) + 192) as u8);
                out.push(((len - 192) & 0xFF) as u8);
            }
            _ => {
                out.push(0xFF);
                out.write_u32::<BigEndian>(len).unwrap();
            }
        }
    }

    /// Frames `body` as a user id packet.
    fn frame(form: &Form, body: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        let len = body.len() as u32;
        match form {
            Form::OldFixed(octets) => {
                let length_type = match octets {
                    1 => 0,
                    2 => 1,
                    _ => 2,
                };
                out.push(0x80 | (13 << 2) | length_type);
                match octets {
                    1 => out.push(len as u8),
                    2 => out.write_u16::<BigEndian>(len as u16).unwrap(),
                    _ => out.write_u32::<BigEndian>(len).unwrap(),
                }
                out.extend_from_slice(body);
            }
            Form::OldIndeterminate => {
                out.push(0x80 | (13 << 2) | 3);
                out.extend_from_slice(body);
            }
            Form::NewFixed(octets) => {
                out.push(0xC0 | 13);
                new_length(&mut out, *octets, len);
                out.extend_from_slice(body);
            }
            Form::NewPartial { chunks, last } => {
                out.push(0xC0 | 13);
                let mut offset = 0;
                for chunk in chunks {
                    out.push(224 + chunk.trailing_zeros() as u8);
                    out.extend_from_slice(&body[offset..offset + *chunk as usize]);
                    offset += *chunk as usize;
                }
                new_length(&mut out, *last, (body.len() - offset) as u32);
                out.extend_from_slice(&body[offset..]);
            }
        }
        out
    }

    fn fixed_octets(new: bool, len: usize) -> Vec<u8> {
        let mut octets = Vec::new();
        if new {
            if len < 192 {
                octets.push(1);
            } else if len < 8384 {
                octets.push(2);
            }
            octets.push(5);
        } else {
            if len < 256 {
                octets.push(1);
            }
            if len < 65536 {
                octets.push(2);
            }
            octets.push(4);
        }
        octets
    }

    fn framed_packet() -> impl Strategy<Value = (Form, Vec<u8>)> {
        let fixed = (0usize..9000, any::<bool>(), any::<prop::sample::Index>(), any::<u8>())
            .prop_map(|(len, new, pick, fill)| {
                let octets = fixed_octets(new, len);
                let octets = octets[pick.index(octets.len())];
                let form = if new {
                    Form::NewFixed(octets)
                } else {
                    Form::OldFixed(octets)
                };
                (form, vec![fill; len])
            });
        let indeterminate =
            prop::collection::vec(any::<u8>(), 0..600).prop_map(|body| (Form::OldIndeterminate, body));
        let partial = (
            prop::collection::vec(9u32..=11, 1..4),
            0usize..300,
            any::<prop::sample::Index>(),
            any::<u8>(),
        )
            .prop_map(|(exps, rest, pick, fill)| {
                let chunks: Vec<u32> = exps.into_iter().map(|e| 1 << e).collect();
                let octets = fixed_octets(true, rest);
                let last = octets[pick.index(octets.len())];
                let len = chunks.iter().sum::<u32>() as usize + rest;
                (Form::NewPartial { chunks, last }, vec![fill; len])
            });
        prop_oneof![fixed, indeterminate, partial]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn packets_are_written_back_unchanged((form, body) in framed_packet()) {
            let raw = frame(&form, &body);
            let packets = read_packets(&raw).unwrap();
            prop_assert_eq!(packets.len(), 1);
            let Packet::UserId(ref uid) = packets[0] else {
                panic!("unexpected packet {:?}", packets[0]);
            };
            prop_assert_eq!(uid.id(), &body[..]);
            prop_assert_eq!(packets[0].write_len(), raw.len());
            prop_assert_eq!(packets[0].to_bytes().unwrap(), raw);
        }
    }

    #[test]
    fn test_next_tag_and_skip() {
        let mut raw = Vec::new();
        Packet::from(Marker::default()).to_writer(&mut raw).unwrap();
        Packet::from(UserId::from_str(Default::default(), "alice"))
            .to_writer(&mut raw)
            .unwrap();
        Packet::from(Trust::from_slice(Default::default(), &[0x05]))
            .to_writer(&mut raw)
            .unwrap();

        let mut reader = PacketReader::new(&raw[..]);
        assert_eq!(reader.next_tag().unwrap(), Some(Tag::Marker));
        assert_eq!(reader.skip_packet().unwrap(), Some(Tag::Marker));
        assert_eq!(reader.next_tag().unwrap(), Some(Tag::UserId));
        assert_eq!(reader.skip_packet().unwrap(), Some(Tag::UserId));
        assert_eq!(reader.next_tag().unwrap(), Some(Tag::Trust));
        assert!(reader.read_packet().unwrap().is_some());
        assert_eq!(reader.next_tag().unwrap(), None);
    }

    #[test]
    fn test_truncated_body() {
        let raw = [0xCD, 0x05, b'a', b'b'];
        let err = PacketReader::new(&raw[..]).read_packet().unwrap_err();
        assert!(err.is_format(), "{:?}", err);
    }

    #[test]
    fn test_body_reader_streams_partial_chunks() {
        let mut raw = vec![0xC9, 0xE9];
        raw.extend((0..512u32).map(|i| i as u8));
        raw.push(0xEA);
        raw.extend((0..1024u32).map(|i| (i * 3) as u8));
        raw.extend_from_slice(&[0x02, 0xAA, 0xBB]);
        // trailing packet
        raw.extend_from_slice(&[0xCA, 0x03, b'P', b'G', b'P']);

        let mut reader = PacketReader::new(&raw[..]);
        let header = reader.read_header().unwrap().unwrap();
        assert_eq!(header.tag(), Tag::SymEncryptedData);
        let mut body = PacketBodyReader::new(reader.into_inner(), header.packet_length());

        let mut out = Vec::new();
        let mut buf = [0u8; 100];
        loop {
            let n = body.read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        assert!(body.is_done());
        assert_eq!(out.len(), 512 + 1024 + 2);
        assert_eq!(&out[510..514], &[254, 255, 0, 3]);
        assert_eq!(&out[out.len() - 2..], &[0xAA, 0xBB]);

        let rest = PacketReader::new(body.into_inner())
            .read_packet()
            .unwrap()
            .unwrap();
        assert_eq!(rest.tag(), Tag::Marker);
    }

    #[test]
    fn test_body_reader_truncated() {
        let raw = [0xC9, 0xE9, 1, 2, 3];
        let mut reader = PacketReader::new(&raw[..]);
        let header = reader.read_header().unwrap().unwrap();
        let mut body = PacketBodyReader::new(reader.into_inner(), header.packet_length());
        let err = body.read_to_end(&mut Vec::new()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_invalid_header() {
        let raw = [0x12, 0x00];
        let mut reader = PacketReader::new(&raw[..]);
        assert!(reader.next_tag().unwrap_err().is_format());
        assert!(reader.read_packet().unwrap_err().is_format());
    }
}
