use std::io::{self, BufRead};

use byteorder::{BigEndian, WriteBytesExt};
use log::debug;
use num_enum::{FromPrimitive, IntoPrimitive};

use crate::errors::{bail, Result};
use crate::parsing_reader::BufReadParsing;
use crate::ser::Serialize;

/// Represents the packet length.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum PacketLength {
    Fixed(u32),
    Indeterminate,
    Partial(u32),
}

/// Largest chunk a partial body length can announce.
pub const MAX_PARTIAL_LEN: u32 = 1 << 30;

impl PacketLength {
    /// Reads a new format length, as used by new style packet headers.
    pub fn try_from_reader<R: BufRead>(r: &mut R) -> io::Result<Self> {
        Self::read_with_octets(r).map(|(len, _)| len)
    }

    /// Reads a new format length, also returning how many octets encoded it.
    pub fn read_with_octets<R: BufRead>(r: &mut R) -> io::Result<(Self, u8)> {
        let olen = r.read_u8()?;
        let len = match olen {
            // One-Octet Lengths
            0..=191 => (PacketLength::Fixed(olen.into()), 1),
            // Two-Octet Lengths
            192..=223 => {
                let a = r.read_u8()?;
                let l = ((u32::from(olen) - 192) << 8) + 192 + u32::from(a);
                (PacketLength::Fixed(l), 2)
            }
            // Partial Body Lengths
            224..=254 => (PacketLength::Partial(1 << (olen & 0x1F)), 1),
            // Five-Octet Lengths
            255 => (PacketLength::Fixed(r.read_be_u32()?), 5),
        };
        Ok(len)
    }

    /// Returns how many bytes encoding the given length as fixed encoding would need.
    pub fn fixed_encoding_len(len: usize) -> usize {
        if len < 192 {
            1
        } else if len < 8384 {
            2
        } else {
            1 + 4
        }
    }

    pub fn to_writer_new<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        match self {
            PacketLength::Fixed(len) => {
                if *len < 192 {
                    writer.write_u8(*len as u8)?;
                } else if *len < 8384 {
                    writer.write_u8((((len - 192) >> 8) + 192) as u8)?;
                    writer.write_u8(((len - 192) & 0xFF) as u8)?;
                } else {
                    writer.write_u8(255)?;
                    writer.write_u32::<BigEndian>(*len)?;
                }
            }
            PacketLength::Indeterminate => {
                bail!("indeterminate lengths are only valid in old style packet headers");
            }
            PacketLength::Partial(len) => {
                if len.count_ones() != 1 || *len > MAX_PARTIAL_LEN {
                    bail!("invalid partial body length {}", len);
                }
                writer.write_u8((224 + len.trailing_zeros()) as u8)?;
            }
        }
        Ok(())
    }
}

/// Packet tags, see <https://www.rfc-editor.org/rfc/rfc4880.html#section-4.3>
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, FromPrimitive, IntoPrimitive)]
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
#[repr(u8)]
pub enum Tag {
    /// Public-Key Encrypted Session Key Packet
    PublicKeyEncryptedSessionKey = 1,
    /// Signature Packet
    Signature = 2,
    /// Symmetric-Key Encrypted Session Key Packet
    SymKeyEncryptedSessionKey = 3,
    /// One-Pass Signature Packet
    OnePassSignature = 4,
    /// Secret-Key Packet
    SecretKey = 5,
    /// Public-Key Packet
    PublicKey = 6,
    /// Secret-Subkey Packet
    SecretSubkey = 7,
    /// Compressed Data Packet
    CompressedData = 8,
    /// Symmetrically Encrypted Data Packet
    SymEncryptedData = 9,
    /// Marker Packet
    Marker = 10,
    /// Literal Data Packet
    LiteralData = 11,
    /// Trust Packet
    Trust = 12,
    /// User ID Packet
    UserId = 13,
    /// Public-Subkey Packet
    PublicSubkey = 14,
    /// User Attribute Packet
    UserAttribute = 17,
    /// Sym. Encrypted and Integrity Protected Data Packet
    SymEncryptedProtectedData = 18,
    /// Modification Detection Code Packet
    ModDetectionCode = 19,

    #[num_enum(catch_all)]
    #[cfg_attr(test, proptest(skip))]
    Other(u8),
}

impl Tag {
    /// Tags 60 to 63 are reserved for private or experimental use.
    pub fn is_experimental(self) -> bool {
        matches!(self, Tag::Other(60..=63))
    }

    /// Extracts the tag from the first octet of a packet header.
    pub fn from_header_octet(octet: u8) -> Result<Self> {
        match octet & 0b1100_0000 {
            0b1100_0000 => Ok(Tag::from(octet & 0b0011_1111)),
            0b1000_0000 => Ok(Tag::from((octet >> 2) & 0b0000_1111)),
            _ => Err(crate::errors::Error::Format {
                message: format!("invalid packet header octet 0x{:02x}", octet),
            }),
        }
    }
}

/// The version of the packet format.
///
/// There are two packet formats
/// (see <https://www.rfc-editor.org/rfc/rfc4880.html#section-4.2>):
///
/// 1) the old format, with the length type in the low two bits of the tag octet
/// 2) the new format, with the length encoded in the following octets
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
pub enum PacketHeaderVersion {
    /// Old Packet Format
    Old,
    /// New Packet Format
    #[default]
    New,
}

impl PacketHeaderVersion {
    /// Writes a header announcing a body of `len` octets, with the shortest length encoding.
    pub fn write_header(self, writer: &mut impl io::Write, tag: Tag, len: usize) -> Result<()> {
        PacketFraming::from(self).write_header(writer, tag, len)
    }

    /// Length of the header, in bytes.
    pub fn header_len(self, len: usize) -> usize {
        PacketFraming::from(self).header_len(len)
    }

    /// Number of length octets the shortest fixed encoding of `len` takes.
    pub fn minimal_length_octets(self, len: usize) -> u8 {
        match self {
            PacketHeaderVersion::Old => {
                if len < 256 {
                    1
                } else if len < 65536 {
                    2
                } else {
                    4
                }
            }
            PacketHeaderVersion::New => PacketLength::fixed_encoding_len(len) as u8,
        }
    }

    /// Whether a fixed length of `octets` octets can carry `len`.
    pub fn length_fits(self, octets: u8, len: usize) -> bool {
        let len = len as u64;
        match (self, octets) {
            (PacketHeaderVersion::Old, 1) => len < 256,
            (PacketHeaderVersion::Old, 2) => len < 65536,
            (PacketHeaderVersion::Old, 4) | (PacketHeaderVersion::New, 5) => {
                len <= u64::from(u32::MAX)
            }
            (PacketHeaderVersion::New, 1) => len < 192,
            (PacketHeaderVersion::New, 2) => (192..8384).contains(&len),
            _ => false,
        }
    }
}

/// How the body length of a packet is encoded.
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub enum LengthFormat {
    /// The shortest fixed encoding for the body.
    #[default]
    Minimal,
    /// A fixed length using the given number of length octets.
    ///
    /// Old format headers use 1, 2 or 4 octets, new format ones 1, 2 or 5.
    Fixed(u8),
    /// Old format only, the body runs to the end of the stream.
    Indeterminate,
    /// New format only, partial body chunks followed by a fixed length of `last` octets.
    Partial { chunks: Vec<u32>, last: u8 },
}

/// Header format and length encoding of a packet.
///
/// Packets read from a stream remember how they were framed, so writing them again
/// reproduces the input. Encodings that no longer fit the body fall back to the
/// shortest fixed length.
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct PacketFraming {
    pub version: PacketHeaderVersion,
    pub length: LengthFormat,
}

impl From<PacketHeaderVersion> for PacketFraming {
    fn from(version: PacketHeaderVersion) -> Self {
        PacketFraming {
            version,
            length: LengthFormat::Minimal,
        }
    }
}

impl PacketFraming {
    pub fn new(version: PacketHeaderVersion, length: LengthFormat) -> Self {
        PacketFraming { version, length }
    }

    /// Builds the framing for a fixed length read with `octets` length octets,
    /// `Minimal` if that is the shortest encoding anyway.
    pub fn fixed(version: PacketHeaderVersion, octets: u8, len: usize) -> Self {
        let length = if version.minimal_length_octets(len) == octets {
            LengthFormat::Minimal
        } else {
            LengthFormat::Fixed(octets)
        };
        PacketFraming { version, length }
    }

    /// The encoding actually used for a body of `len` octets.
    fn resolve(&self, len: usize) -> LengthFormat {
        let minimal = LengthFormat::Fixed(self.version.minimal_length_octets(len));
        match (&self.length, self.version) {
            (LengthFormat::Fixed(octets), version) if version.length_fits(*octets, len) => {
                LengthFormat::Fixed(*octets)
            }
            (LengthFormat::Indeterminate, PacketHeaderVersion::Old) => LengthFormat::Indeterminate,
            (LengthFormat::Partial { chunks, last }, PacketHeaderVersion::New) => {
                let valid = chunks
                    .iter()
                    .all(|c| c.count_ones() == 1 && *c <= MAX_PARTIAL_LEN);
                let chunked: u64 = chunks.iter().map(|c| u64::from(*c)).sum();
                match (len as u64).checked_sub(chunked) {
                    Some(rest) if valid && self.version.length_fits(*last, rest as usize) => {
                        self.length.clone()
                    }
                    _ => minimal,
                }
            }
            _ => minimal,
        }
    }

    /// Length of the header, in bytes. Partial chunk lengths count towards it.
    pub fn header_len(&self, len: usize) -> usize {
        match self.resolve(len) {
            LengthFormat::Fixed(octets) => 1 + usize::from(octets),
            LengthFormat::Partial { chunks, last } => 1 + chunks.len() + usize::from(last),
            _ => 1,
        }
    }

    /// Writes the header for a body of `len` octets that follows in one piece.
    ///
    /// Fails for partial framings, those interleave lengths with the body, see
    /// [PacketFraming::write_packet].
    pub fn write_header(&self, writer: &mut impl io::Write, tag: Tag, len: usize) -> Result<()> {
        debug!("write_header {:?} {:?} {}", self, tag, len);
        let tag: u8 = tag.into();
        if self.version == PacketHeaderVersion::Old && tag > 0b1111 {
            bail!("tag {} can not be written in an old style header", tag);
        }
        match self.resolve(len) {
            LengthFormat::Indeterminate => {
                writer.write_u8(0b1000_0011 | (tag << 2))?;
            }
            LengthFormat::Fixed(octets) => {
                let len = u32::try_from(len)?;
                match self.version {
                    PacketHeaderVersion::Old => {
                        let length_type = match octets {
                            1 => 0,
                            2 => 1,
                            _ => 2,
                        };
                        writer.write_u8(0b1000_0000 | (tag << 2) | length_type)?;
                        write_old_length(writer, octets, len)?;
                    }
                    PacketHeaderVersion::New => {
                        writer.write_u8(0b1100_0000 | tag)?;
                        write_new_length(writer, octets, len)?;
                    }
                }
            }
            other => bail!("{:?} needs the body to write the header", other),
        }
        Ok(())
    }

    /// Writes the header and the serialized `body`.
    pub fn write_packet<W: io::Write, S: Serialize + ?Sized>(
        &self,
        writer: &mut W,
        tag: Tag,
        body: &S,
    ) -> Result<()> {
        let len = body.write_len();
        let LengthFormat::Partial { chunks, last } = self.resolve(len) else {
            self.write_header(writer, tag, len)?;
            return body.to_writer(writer);
        };

        let data = body.to_bytes()?;
        writer.write_u8(0b1100_0000 | u8::from(tag))?;
        let mut offset = 0;
        for chunk in chunks {
            let chunk = chunk as usize;
            PacketLength::Partial(chunk as u32).to_writer_new(writer)?;
            writer.write_all(&data[offset..offset + chunk])?;
            offset += chunk;
        }
        let rest = &data[offset..];
        write_new_length(writer, last, u32::try_from(rest.len())?)?;
        writer.write_all(rest)?;

        Ok(())
    }
}

fn write_old_length(writer: &mut impl io::Write, octets: u8, len: u32) -> Result<()> {
    match octets {
        1 => writer.write_u8(len as u8)?,
        2 => writer.write_u16::<BigEndian>(len as u16)?,
        _ => writer.write_u32::<BigEndian>(len)?,
    }
    Ok(())
}

fn write_new_length(writer: &mut impl io::Write, octets: u8, len: u32) -> Result<()> {
    match octets {
        1 => writer.write_u8(len as u8)?,
        2 => {
            writer.write_u8((((len - 192) >> 8) + 192) as u8)?;
            writer.write_u8(((len - 192) & 0xFF) as u8)?;
        }
        _ => {
            writer.write_u8(255)?;
            writer.write_u32::<BigEndian>(len)?;
        }
    }
    Ok(())
}

/// Key packet versions.
#[derive(Debug, PartialEq, Eq, Clone, Copy, PartialOrd, Hash, FromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum KeyVersion {
    V2 = 2,
    V3 = 3,
    V4 = 4,

    #[num_enum(catch_all)]
    Other(u8),
}

impl KeyVersion {
    /// Size of OpenPGP fingerprint in bytes
    /// (returns `None` for unknown versions)
    pub const fn fingerprint_len(&self) -> Option<usize> {
        match self {
            KeyVersion::V2 | KeyVersion::V3 => Some(16), // MD5
            KeyVersion::V4 => Some(20),                  // SHA1
            KeyVersion::Other(_) => None,
        }
    }
}

impl Default for KeyVersion {
    fn default() -> Self {
        Self::V4
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_write_header() {
        let mut buf = Vec::new();
        PacketHeaderVersion::New
            .write_header(&mut buf, Tag::UserAttribute, 12875)
            .unwrap();

        assert_eq!(hex::encode(buf), "d1ff0000324b");

        let mut buf = Vec::new();
        PacketHeaderVersion::New
            .write_header(&mut buf, Tag::Signature, 302)
            .unwrap();

        assert_eq!(hex::encode(buf), "c2c06e");

        let mut buf = Vec::new();
        PacketHeaderVersion::Old
            .write_header(&mut buf, Tag::PublicKey, 269)
            .unwrap();

        assert_eq!(hex::encode(buf), "99010d");
    }

    #[test]
    fn test_old_header_rejects_large_tags() {
        let mut buf = Vec::new();
        assert!(PacketHeaderVersion::Old
            .write_header(&mut buf, Tag::UserAttribute, 10)
            .is_err());
    }

    #[test]
    fn test_framing_falls_back_to_minimal() {
        let old_two = PacketFraming::new(PacketHeaderVersion::Old, LengthFormat::Fixed(2));
        assert_eq!(old_two.header_len(5), 3);
        assert_eq!(old_two.header_len(70_000), 5);

        // a two octet new length can not express short bodies
        let new_two = PacketFraming::new(PacketHeaderVersion::New, LengthFormat::Fixed(2));
        assert_eq!(new_two.header_len(100), 2);

        let partial = PacketFraming::new(
            PacketHeaderVersion::New,
            LengthFormat::Partial {
                chunks: vec![512, 512],
                last: 1,
            },
        );
        assert_eq!(partial.header_len(1024 + 10), 4);
        // shrunk below the chunked size
        assert_eq!(partial.header_len(600), 3);

        // indeterminate is old format only
        let bad = PacketFraming::new(PacketHeaderVersion::New, LengthFormat::Indeterminate);
        assert_eq!(bad.header_len(10), 2);
    }

    #[test]
    fn test_write_partial_packet() {
        let framing = PacketFraming::new(
            PacketHeaderVersion::New,
            LengthFormat::Partial {
                chunks: vec![512],
                last: 2,
            },
        );
        let body = crate::packet::UserId::from_bytes(Default::default(), &[7u8; 512 + 200]);
        let mut out = Vec::new();
        framing.write_packet(&mut out, Tag::UserId, &body).unwrap();

        assert_eq!(out.len(), framing.header_len(body.write_len()) + body.write_len());
        assert_eq!(&out[..2], &[0xCD, 0xE9]);
        assert_eq!(&out[2 + 512..2 + 512 + 2], &[0xC0, 0x08]);
        assert!(framing.write_header(&mut Vec::new(), Tag::UserId, body.write_len()).is_err());
    }

    #[test]
    fn test_tag_from_header_octet() {
        assert_eq!(Tag::from_header_octet(0x99).unwrap(), Tag::PublicKey);
        assert_eq!(Tag::from_header_octet(0xC2).unwrap(), Tag::Signature);
        assert_eq!(Tag::from_header_octet(0xFD).unwrap(), Tag::Other(61));
        assert!(Tag::from_header_octet(0xFD).unwrap().is_experimental());
        assert!(Tag::from_header_octet(0x42).is_err());
    }

    proptest! {
        #[test]
        fn header_len(version: PacketHeaderVersion, len in 0usize..100_000) {
            let mut buf = Vec::new();
            version.write_header(&mut buf, Tag::Signature, len).unwrap();
            prop_assert_eq!(buf.len(), version.header_len(len));
        }

        #[test]
        fn framing_header_len(version: PacketHeaderVersion, octets in prop::sample::select(vec![1u8, 2, 4, 5]), len in 0usize..100_000) {
            let framing = PacketFraming::new(version, LengthFormat::Fixed(octets));
            let mut buf = Vec::new();
            framing.write_header(&mut buf, Tag::Signature, len).unwrap();
            prop_assert_eq!(buf.len(), framing.header_len(len));
        }

        #[test]
        fn new_length_roundtrip(len in 0u32..u32::MAX) {
            let mut buf = Vec::new();
            PacketLength::Fixed(len).to_writer_new(&mut buf).unwrap();
            let back = PacketLength::try_from_reader(&mut &buf[..]).unwrap();
            prop_assert_eq!(back, PacketLength::Fixed(len));
        }
    }
}
