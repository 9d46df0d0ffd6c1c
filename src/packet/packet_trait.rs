use std::io;

use crate::errors::Result;
use crate::ser::Serialize;
use crate::types::{PacketFraming, PacketHeaderVersion, Tag};

pub trait PacketTrait: Serialize {
    /// Header format and length encoding this packet was read with, or will be written with.
    fn framing(&self) -> &PacketFraming;

    /// Replaces the framing used when writing this packet.
    fn set_framing(&mut self, framing: PacketFraming);

    /// Returns the tag for this packet type.
    fn tag(&self) -> Tag;

    fn packet_version(&self) -> PacketHeaderVersion {
        self.framing().version
    }

    /// Writes header and body.
    fn to_writer_with_header<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        self.framing().write_packet(writer, self.tag(), self)
    }

    /// Length of header and body together.
    fn write_len_with_header(&self) -> usize {
        let len = self.write_len();
        self.framing().header_len(len) + len
    }
}

/// Implements [PacketTrait] for packets with a fixed tag and a `framing` field.
macro_rules! impl_packet_trait {
    ($name:ty, $tag:expr) => {
        impl $crate::packet::PacketTrait for $name {
            fn framing(&self) -> &$crate::types::PacketFraming {
                &self.framing
            }

            fn set_framing(&mut self, framing: $crate::types::PacketFraming) {
                self.framing = framing;
            }

            fn tag(&self) -> $crate::types::Tag {
                $tag
            }
        }
    };
}

pub(crate) use impl_packet_trait;
