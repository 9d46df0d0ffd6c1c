use std::io;

use bytes::{Buf, Bytes};

use crate::errors::Result;
use crate::packet::impl_packet_trait;
use crate::parsing::BufParsing;
use crate::ser::Serialize;
use crate::types::{PacketFraming, PacketHeaderVersion, Tag};

/// Trust Packet
///
/// Only meaningful in local keyring files. The content is implementation defined,
/// it is kept verbatim so rings re-encode unchanged.
///
/// Ref: <https://www.rfc-editor.org/rfc/rfc4880.html#section-5.10>
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trust {
    framing: PacketFraming,
    data: Bytes,
}

impl Trust {
    pub fn from_buf<B: Buf>(packet_version: PacketHeaderVersion, i: &mut B) -> Result<Self> {
        Ok(Trust {
            framing: packet_version.into(),
            data: i.rest(),
        })
    }

    pub fn from_slice(packet_version: PacketHeaderVersion, data: &[u8]) -> Self {
        Trust {
            framing: packet_version.into(),
            data: Bytes::copy_from_slice(data),
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

impl Serialize for Trust {
    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&self.data)?;
        Ok(())
    }

    fn write_len(&self) -> usize {
        self.data.len()
    }
}

impl_packet_trait!(Trust, Tag::Trust);
