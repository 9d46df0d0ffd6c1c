use std::{io, str};

use bytes::{Buf, Bytes};

use crate::errors::Result;
use crate::packet::impl_packet_trait;
use crate::parsing::BufParsing;
use crate::ser::Serialize;
use crate::types::{PacketFraming, PacketHeaderVersion, Tag};

/// User ID Packet
///
/// The id is kept as raw octets. It is conventionally UTF-8, but not every key in
/// the wild follows that and the octets are what certifications are made over.
///
/// Ref: <https://www.rfc-editor.org/rfc/rfc4880.html#section-5.11>
#[derive(Clone, PartialEq, Eq, derive_more::Debug)]
pub struct UserId {
    framing: PacketFraming,
    #[debug("{}", String::from_utf8_lossy(id))]
    id: Bytes,
}

impl UserId {
    pub fn from_buf<B: Buf>(packet_version: PacketHeaderVersion, i: &mut B) -> Result<Self> {
        Ok(UserId {
            framing: packet_version.into(),
            id: i.rest(),
        })
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(packet_version: PacketHeaderVersion, input: &str) -> Self {
        UserId {
            framing: packet_version.into(),
            id: Bytes::copy_from_slice(input.as_bytes()),
        }
    }

    pub fn from_bytes(packet_version: PacketHeaderVersion, input: &[u8]) -> Self {
        UserId {
            framing: packet_version.into(),
            id: Bytes::copy_from_slice(input),
        }
    }

    /// Raw id octets.
    pub fn id(&self) -> &[u8] {
        &self.id
    }

    /// The id as text, failing if it is not valid UTF-8.
    pub fn as_str(&self) -> Result<&str> {
        Ok(str::from_utf8(&self.id)?)
    }
}

impl Serialize for UserId {
    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&self.id)?;
        Ok(())
    }

    fn write_len(&self) -> usize {
        self.id.len()
    }
}

impl_packet_trait!(UserId, Tag::UserId);
