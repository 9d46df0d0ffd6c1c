use std::io;

use byteorder::{BigEndian, WriteBytesExt};
use bytes::{Buf, Bytes};
use chrono::{DateTime, Utc};
use num_enum::{FromPrimitive, IntoPrimitive};

use crate::errors::Result;
use crate::packet::impl_packet_trait;
use crate::parsing::BufParsing;
use crate::ser::{time_to_u32, u32_to_time, Serialize};
use crate::types::{PacketFraming, PacketHeaderVersion, Tag};

/// Format of the literal content.
#[derive(Debug, Copy, Clone, PartialEq, Eq, FromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum DataMode {
    Binary = b'b',
    Text = b't',
    Utf8 = b'u',
    Mime = b'm',

    #[num_enum(catch_all)]
    Other(u8),
}

/// Literal Data Packet
///
/// Ref: <https://www.rfc-editor.org/rfc/rfc4880.html#section-5.9>
#[derive(Clone, PartialEq, Eq, derive_more::Debug)]
pub struct LiteralData {
    framing: PacketFraming,
    mode: DataMode,
    #[debug("{}", String::from_utf8_lossy(file_name))]
    file_name: Bytes,
    created: u32,
    #[debug("{} bytes", data.len())]
    data: Bytes,
}

impl LiteralData {
    pub fn from_buf<B: Buf>(packet_version: PacketHeaderVersion, i: &mut B) -> Result<Self> {
        let mode = DataMode::from(i.read_u8()?);
        let name_len = i.read_u8()?;
        let file_name = i.read_take(usize::from(name_len))?;
        let created = i.read_be_u32()?;
        let data = i.rest();

        Ok(LiteralData {
            framing: packet_version.into(),
            mode,
            file_name,
            created,
            data,
        })
    }

    /// Creates a binary literal.
    pub fn from_bytes(file_name: &[u8], created: DateTime<Utc>, data: &[u8]) -> Self {
        LiteralData {
            framing: Default::default(),
            mode: DataMode::Binary,
            file_name: Bytes::copy_from_slice(&file_name[..file_name.len().min(255)]),
            created: time_to_u32(&created),
            data: Bytes::copy_from_slice(data),
        }
    }

    /// Creates a UTF-8 text literal.
    pub fn from_str(file_name: &[u8], created: DateTime<Utc>, data: &str) -> Self {
        LiteralData {
            mode: DataMode::Utf8,
            ..Self::from_bytes(file_name, created, data.as_bytes())
        }
    }

    pub fn mode(&self) -> DataMode {
        self.mode
    }

    pub fn file_name(&self) -> &[u8] {
        &self.file_name
    }

    pub fn created(&self) -> DateTime<Utc> {
        u32_to_time(self.created)
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Bytes {
        self.data
    }
}

impl Serialize for LiteralData {
    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u8(self.mode.into())?;
        writer.write_u8(self.file_name.len().try_into()?)?;
        writer.write_all(&self.file_name)?;
        writer.write_u32::<BigEndian>(self.created)?;
        writer.write_all(&self.data)?;
        Ok(())
    }

    fn write_len(&self) -> usize {
        1 + 1 + self.file_name.len() + 4 + self.data.len()
    }
}

impl_packet_trait!(LiteralData, Tag::LiteralData);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_roundtrip() {
        let created = u32_to_time(1_500_000_000);
        let lit = LiteralData::from_str(b"hello.txt", created, "hello world\n");
        let raw = lit.to_bytes().unwrap();
        assert_eq!(&raw[..2], &[b'u', 9]);

        let back = LiteralData::from_buf(PacketHeaderVersion::New, &mut &raw[..]).unwrap();
        assert_eq!(back, lit);
        assert_eq!(back.created(), created);
        assert_eq!(back.data(), b"hello world\n");
        assert_eq!(back.file_name(), b"hello.txt");
    }
}
