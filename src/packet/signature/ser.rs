use std::io;

use byteorder::{BigEndian, WriteBytesExt};

use crate::errors::Result;
use crate::packet::impl_packet_trait;
use crate::packet::signature::types::*;
use crate::ser::Serialize;
use crate::types::Tag;

impl_packet_trait!(SignaturePacket, Tag::Signature);

impl Serialize for SignatureBytes {
    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        match self {
            SignatureBytes::Mpis(mpis) => mpis.to_writer(writer),
            SignatureBytes::Native(raw) => {
                writer.write_all(raw)?;
                Ok(())
            }
        }
    }

    fn write_len(&self) -> usize {
        match self {
            SignatureBytes::Mpis(mpis) => mpis.write_len(),
            SignatureBytes::Native(raw) => raw.len(),
        }
    }
}

impl SignaturePacket {
    fn to_writer_v3<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u8(self.config.version.into())?;
        // hashed material length, always 5
        writer.write_u8(0x05)?;
        writer.write_u8(self.config.typ.into())?;
        writer.write_u32::<BigEndian>(self.config.created.unwrap_or_default())?;
        writer.write_all(self.config.issuer.unwrap_or_default().as_ref())?;
        writer.write_u8(self.config.pub_alg.into())?;
        writer.write_u8(self.config.hash_alg.into())?;
        Ok(())
    }

    fn to_writer_v4<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u8(self.config.version.into())?;
        writer.write_u8(self.config.typ.into())?;
        writer.write_u8(self.config.pub_alg.into())?;
        writer.write_u8(self.config.hash_alg.into())?;

        writer.write_u16::<BigEndian>(u16::try_from(self.config.hashed_subpackets.write_len())?)?;
        self.config.hashed_subpackets.to_writer(writer)?;
        writer.write_u16::<BigEndian>(u16::try_from(
            self.config.unhashed_subpackets.write_len(),
        )?)?;
        self.config.unhashed_subpackets.to_writer(writer)?;
        Ok(())
    }
}

impl Serialize for SignaturePacket {
    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        if self.config.is_v4() {
            self.to_writer_v4(writer)?;
        } else {
            self.to_writer_v3(writer)?;
        }
        writer.write_all(&self.digest_prefix)?;
        self.signature.to_writer(writer)
    }

    fn write_len(&self) -> usize {
        let header = if self.config.is_v4() {
            1 + 3
                + 2
                + self.config.hashed_subpackets.write_len()
                + 2
                + self.config.unhashed_subpackets.write_len()
        } else {
            1 + 1 + 1 + 4 + 8 + 1 + 1
        };
        header + 2 + self.signature.write_len()
    }
}
