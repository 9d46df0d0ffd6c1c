use std::io;

use byteorder::WriteBytesExt;
use bytes::{Buf, Bytes};

use crate::errors::{format_bail, Result};
use crate::packet::impl_packet_trait;
use crate::parsing::BufParsing;
use crate::ser::Serialize;
use crate::types::{PacketFraming, PacketHeaderVersion, PacketLength, Tag};

/// Subpacket type of an embedded image.
const IMAGE: u8 = 1;

/// A single user attribute subpacket.
#[derive(Clone, PartialEq, Eq, derive_more::Debug)]
pub enum UserAttributeSubpacket {
    /// Image attribute, `header` is the little endian length prefixed image header.
    Image {
        #[debug("{}", hex::encode(header))]
        header: Bytes,
        #[debug("{} bytes", data.len())]
        data: Bytes,
    },
    Unknown {
        typ: u8,
        #[debug("{}", hex::encode(data))]
        data: Bytes,
    },
}

impl UserAttributeSubpacket {
    fn from_buf<B: Buf>(i: &mut B) -> Result<Self> {
        let len = match read_subpacket_len(i)? {
            0 => format_bail!("empty user attribute subpacket"),
            len => len,
        };
        let typ = i.read_u8()?;
        let mut body = i.read_take(len - 1)?;

        let subpacket = match typ {
            IMAGE => {
                // the header length includes its own two octets
                let header_len = {
                    let mut peek = body.clone();
                    usize::from(peek.read_u8()?) | (usize::from(peek.read_u8()?) << 8)
                };
                if header_len < 2 {
                    format_bail!("invalid image header length {}", header_len);
                }
                let header = body.read_take(header_len)?;
                UserAttributeSubpacket::Image {
                    header,
                    data: body.rest(),
                }
            }
            _ => UserAttributeSubpacket::Unknown {
                typ,
                data: body.rest(),
            },
        };

        Ok(subpacket)
    }

    /// Creates a JPEG image attribute.
    pub fn new_jpeg(data: &[u8]) -> Self {
        let mut header = vec![0u8; 16];
        header[0] = 16;
        header[2] = 1; // header version
        header[3] = 1; // JPEG
        UserAttributeSubpacket::Image {
            header: header.into(),
            data: Bytes::copy_from_slice(data),
        }
    }

    fn body_len(&self) -> usize {
        match self {
            UserAttributeSubpacket::Image { header, data } => 1 + header.len() + data.len(),
            UserAttributeSubpacket::Unknown { data, .. } => 1 + data.len(),
        }
    }
}

fn read_subpacket_len<B: Buf>(i: &mut B) -> Result<usize> {
    let olen = i.read_u8()?;
    let len = match olen {
        0..=191 => usize::from(olen),
        192..=254 => ((usize::from(olen) - 192) << 8) + 192 + usize::from(i.read_u8()?),
        255 => i.read_be_u32()? as usize,
    };
    Ok(len)
}

impl Serialize for UserAttributeSubpacket {
    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        PacketLength::Fixed(u32::try_from(self.body_len())?).to_writer_new(writer)?;
        match self {
            UserAttributeSubpacket::Image { header, data } => {
                writer.write_u8(IMAGE)?;
                writer.write_all(header)?;
                writer.write_all(data)?;
            }
            UserAttributeSubpacket::Unknown { typ, data } => {
                writer.write_u8(*typ)?;
                writer.write_all(data)?;
            }
        }
        Ok(())
    }

    fn write_len(&self) -> usize {
        let len = self.body_len();
        PacketLength::fixed_encoding_len(len) + len
    }
}

/// User Attribute Packet
///
/// Ref: <https://www.rfc-editor.org/rfc/rfc4880.html#section-5.12>
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserAttribute {
    framing: PacketFraming,
    subpackets: Vec<UserAttributeSubpacket>,
}

impl UserAttribute {
    pub fn from_buf<B: Buf>(packet_version: PacketHeaderVersion, i: &mut B) -> Result<Self> {
        let mut subpackets = Vec::new();
        while i.has_remaining() {
            subpackets.push(UserAttributeSubpacket::from_buf(i)?);
        }

        Ok(UserAttribute {
            framing: packet_version.into(),
            subpackets,
        })
    }

    pub fn new(packet_version: PacketHeaderVersion, subpackets: Vec<UserAttributeSubpacket>) -> Self {
        UserAttribute {
            framing: packet_version.into(),
            subpackets,
        }
    }

    pub fn subpackets(&self) -> &[UserAttributeSubpacket] {
        &self.subpackets
    }
}

impl Serialize for UserAttribute {
    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        self.subpackets.to_writer(writer)
    }

    fn write_len(&self) -> usize {
        self.subpackets.write_len()
    }
}

impl_packet_trait!(UserAttribute, Tag::UserAttribute);
