use std::io::{self, BufRead};

use byteorder::WriteBytesExt;
use log::debug;

use crate::errors::{bail, Result};
use crate::parsing_reader::BufReadParsing;
use crate::ser::Serialize;
use crate::types::{LengthFormat, PacketFraming, PacketHeaderVersion, PacketLength, Tag};

/// Represents a packet header.
///
/// Ref: <https://www.rfc-editor.org/rfc/rfc4880.html#section-4.2>
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PacketHeader {
    version: PacketHeaderVersion,
    tag: Tag,
    length: PacketLength,
    /// Octets used by a fixed length, the encoding is kept when writing the header again.
    length_octets: u8,
}

impl PacketHeader {
    /// Parse a single packet header from the given reader.
    pub fn from_reader<R: BufRead>(r: &mut R) -> Result<Self> {
        let octet = r.read_u8()?;
        let tag = Tag::from_header_octet(octet)?;

        let header = if octet & 0b0100_0000 != 0 {
            let (length, length_octets) = PacketLength::read_with_octets(r)?;
            PacketHeader {
                version: PacketHeaderVersion::New,
                tag,
                length,
                length_octets,
            }
        } else {
            let (length, length_octets) = match octet & 0b0000_0011 {
                // One-Octet Lengths
                0 => (PacketLength::Fixed(r.read_u8()?.into()), 1),
                // Two-Octet Lengths
                1 => (PacketLength::Fixed(r.read_be_u16()?.into()), 2),
                // Four-Octet Lengths
                2 => (PacketLength::Fixed(r.read_be_u32()?), 4),
                _ => (PacketLength::Indeterminate, 0),
            };
            PacketHeader {
                version: PacketHeaderVersion::Old,
                tag,
                length,
                length_octets,
            }
        };
        debug!("packet header {:?}", header);

        Ok(header)
    }

    pub fn from_parts(version: PacketHeaderVersion, tag: Tag, length: PacketLength) -> Result<Self> {
        match (version, length) {
            (PacketHeaderVersion::Old, PacketLength::Partial(_)) => {
                bail!("partial lengths are only supported in new style headers")
            }
            (PacketHeaderVersion::New, PacketLength::Indeterminate) => {
                bail!("indeterminate packet length is only supported in old style headers")
            }
            (PacketHeaderVersion::Old, _) if u8::from(tag) > 0b1111 => {
                bail!("tag is not compatible with old packet headers: {:?}", tag)
            }
            _ => Ok(PacketHeader {
                version,
                tag,
                length,
                length_octets: minimal_octets(version, length),
            }),
        }
    }

    /// Creates a `New` style packet header.
    pub fn new_fixed(tag: Tag, length: u32) -> Self {
        let length = PacketLength::Fixed(length);
        PacketHeader {
            version: PacketHeaderVersion::New,
            tag,
            length,
            length_octets: minimal_octets(PacketHeaderVersion::New, length),
        }
    }

    /// Returns the packet header version.
    pub const fn version(&self) -> PacketHeaderVersion {
        self.version
    }

    /// Returns the packet length.
    pub fn packet_length(&self) -> PacketLength {
        self.length
    }

    /// Number of octets the length was encoded with, zero for indeterminate lengths.
    pub fn length_octets(&self) -> u8 {
        self.length_octets
    }

    /// Returns the packet tag.
    pub fn tag(&self) -> Tag {
        self.tag
    }
}

fn minimal_octets(version: PacketHeaderVersion, length: PacketLength) -> u8 {
    match length {
        PacketLength::Fixed(len) => version.minimal_length_octets(len as usize),
        PacketLength::Partial(_) => 1,
        PacketLength::Indeterminate => 0,
    }
}

impl Serialize for PacketHeader {
    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        match self.length {
            PacketLength::Fixed(len) => {
                PacketFraming::fixed(self.version, self.length_octets, len as usize).write_header(
                    writer,
                    self.tag,
                    len as usize,
                )?;
            }
            PacketLength::Indeterminate => {
                PacketFraming::new(self.version, LengthFormat::Indeterminate).write_header(
                    writer,
                    self.tag,
                    0,
                )?;
            }
            PacketLength::Partial(_) => {
                if self.version == PacketHeaderVersion::Old {
                    bail!("invalid state: partial lengths for old style packet header");
                }
                writer.write_u8(0b1100_0000 | u8::from(self.tag))?;
                self.length.to_writer_new(writer)?;
            }
        }

        Ok(())
    }

    fn write_len(&self) -> usize {
        match self.length {
            PacketLength::Fixed(len) => {
                PacketFraming::fixed(self.version, self.length_octets, len as usize)
                    .header_len(len as usize)
            }
            PacketLength::Partial(_) => 2,
            PacketLength::Indeterminate => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_packet_length() {
        // # off=5053201 ctb=d1 tag=17 hlen=6 plen=4973 new-ctb
        // :attribute packet: [jpeg image of size 4951]
        let packet_header_raw = hex::decode(b"d1ff0000136d").unwrap();
        let header = PacketHeader::from_reader(&mut &packet_header_raw[..]).unwrap();

        assert_eq!(header.version(), PacketHeaderVersion::New);
        assert_eq!(header.tag(), Tag::UserAttribute);
        assert_eq!(header.packet_length(), PacketLength::Fixed(4973));
    }

    #[test]
    fn test_old_indeterminate() {
        let header = PacketHeader::from_reader(&mut &[0xAF][..]).unwrap();
        assert_eq!(header.version(), PacketHeaderVersion::Old);
        assert_eq!(header.tag(), Tag::LiteralData);
        assert_eq!(header.packet_length(), PacketLength::Indeterminate);
        assert_eq!(header.to_bytes().unwrap(), vec![0xAF]);
    }

    #[test]
    fn test_non_minimal_length_is_kept() {
        // old format user id with a two octet length of 5
        let raw = [0xB5, 0x00, 0x05];
        let header = PacketHeader::from_reader(&mut &raw[..]).unwrap();
        assert_eq!(header.packet_length(), PacketLength::Fixed(5));
        assert_eq!(header.length_octets(), 2);
        assert_eq!(header.to_bytes().unwrap(), raw);
        assert_eq!(header.write_len(), 3);

        // new format five octet length of 10
        let raw = [0xCD, 0xFF, 0, 0, 0, 10];
        let header = PacketHeader::from_reader(&mut &raw[..]).unwrap();
        assert_eq!(header.length_octets(), 5);
        assert_eq!(header.to_bytes().unwrap(), raw);
    }

    #[test]
    fn test_partial() {
        let header = PacketHeader::from_reader(&mut &[0xCB, 0xE9][..]).unwrap();
        assert_eq!(header.packet_length(), PacketLength::Partial(512));
    }

    #[test]
    fn test_from_parts_validation() {
        assert!(PacketHeader::from_parts(
            PacketHeaderVersion::Old,
            Tag::LiteralData,
            PacketLength::Partial(512)
        )
        .is_err());
        assert!(PacketHeader::from_parts(
            PacketHeaderVersion::New,
            Tag::LiteralData,
            PacketLength::Indeterminate
        )
        .is_err());
        assert!(PacketHeader::from_parts(
            PacketHeaderVersion::Old,
            Tag::SymEncryptedProtectedData,
            PacketLength::Fixed(10)
        )
        .is_err());
    }

    fn header_strategy() -> impl Strategy<Value = PacketHeader> {
        prop_oneof![
            (any::<Tag>(), 0u32..=u32::MAX).prop_map(|(tag, len)| PacketHeader::new_fixed(tag, len)),
            (1u8..=15, 0u32..=u32::MAX).prop_map(|(tag, len)| {
                PacketHeader::from_parts(
                    PacketHeaderVersion::Old,
                    Tag::from(tag),
                    PacketLength::Fixed(len),
                )
                .unwrap()
            }),
            (any::<Tag>(), 0u32..=30).prop_map(|(tag, exp)| {
                PacketHeader::from_parts(
                    PacketHeaderVersion::New,
                    tag,
                    PacketLength::Partial(1 << exp),
                )
                .unwrap()
            }),
        ]
    }

    proptest! {
        #[test]
        fn header_roundtrip(header in header_strategy()) {
            let buf = header.to_bytes().unwrap();
            prop_assert_eq!(buf.len(), header.write_len());
            let back = PacketHeader::from_reader(&mut &buf[..]).unwrap();
            prop_assert_eq!(back, header);
        }
    }
}
