use std::io;

use bytes::Buf;

use crate::errors::Result;
use crate::packet::impl_packet_trait;
use crate::parsing::BufParsing;
use crate::ser::Serialize;
use crate::types::{PacketFraming, PacketHeaderVersion, Tag};

const PGP: &[u8; 3] = b"PGP";

/// Marker Packet, always `PGP` and otherwise ignored.
///
/// Ref: <https://www.rfc-editor.org/rfc/rfc4880.html#section-5.8>
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Marker {
    framing: PacketFraming,
}

impl Marker {
    pub fn from_buf<B: Buf>(packet_version: PacketHeaderVersion, i: &mut B) -> Result<Self> {
        i.read_tag(PGP)?;

        Ok(Marker {
            framing: packet_version.into(),
        })
    }
}

impl Serialize for Marker {
    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(PGP)?;
        Ok(())
    }

    fn write_len(&self) -> usize {
        PGP.len()
    }
}

impl_packet_trait!(Marker, Tag::Marker);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::PacketTrait;

    #[test]
    fn test_marker() {
        let raw = [0xA8, 0x03, b'P', b'G', b'P'];
        let marker = Marker::from_buf(PacketHeaderVersion::Old, &mut &raw[2..]).unwrap();
        let mut out = Vec::new();
        marker.to_writer_with_header(&mut out).unwrap();
        assert_eq!(out, raw);

        assert!(Marker::from_buf(PacketHeaderVersion::New, &mut &b"PGQ"[..]).is_err());
    }
}
