use std::io;

use bytes::Buf;

use crate::errors::Result;
use crate::packet::impl_packet_trait;
use crate::parsing::BufParsing;
use crate::ser::Serialize;
use crate::types::{PacketFraming, PacketHeaderVersion, Tag};

/// Modification Detection Code Packet
///
/// Only ever found as the last 22 octets inside decrypted integrity protected data.
///
/// Ref: <https://www.rfc-editor.org/rfc/rfc4880.html#section-5.14>
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModDetectionCode {
    framing: PacketFraming,
    hash: [u8; 20],
}

impl ModDetectionCode {
    pub fn from_buf<B: Buf>(packet_version: PacketHeaderVersion, i: &mut B) -> Result<Self> {
        let hash = i.read_array::<20>()?;
        Ok(ModDetectionCode {
            framing: packet_version.into(),
            hash,
        })
    }

    pub fn hash(&self) -> &[u8; 20] {
        &self.hash
    }
}

impl Serialize for ModDetectionCode {
    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&self.hash)?;
        Ok(())
    }

    fn write_len(&self) -> usize {
        self.hash.len()
    }
}

impl_packet_trait!(ModDetectionCode, Tag::ModDetectionCode);
