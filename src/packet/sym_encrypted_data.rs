use std::io;

use byteorder::WriteBytesExt;
use bytes::{Buf, Bytes};

use crate::errors::{unsupported_err, Result};
use crate::packet::impl_packet_trait;
use crate::parsing::BufParsing;
use crate::ser::Serialize;
use crate::types::{PacketFraming, PacketHeaderVersion, Tag};

/// Symmetrically Encrypted Data Packet
///
/// Ref: <https://www.rfc-editor.org/rfc/rfc4880.html#section-5.7>
#[derive(Clone, PartialEq, Eq, derive_more::Debug)]
pub struct SymEncryptedData {
    framing: PacketFraming,
    #[debug("{} bytes", data.len())]
    data: Bytes,
}

impl SymEncryptedData {
    pub fn from_buf<B: Buf>(packet_version: PacketHeaderVersion, i: &mut B) -> Result<Self> {
        Ok(SymEncryptedData {
            framing: packet_version.into(),
            data: i.rest(),
        })
    }

    pub fn new(data: Bytes) -> Self {
        SymEncryptedData {
            framing: Default::default(),
            data,
        }
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }
}

impl Serialize for SymEncryptedData {
    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&self.data)?;
        Ok(())
    }

    fn write_len(&self) -> usize {
        self.data.len()
    }
}

impl_packet_trait!(SymEncryptedData, Tag::SymEncryptedData);

/// Sym. Encrypted Integrity Protected Data Packet, version 1.
///
/// Ref: <https://www.rfc-editor.org/rfc/rfc4880.html#section-5.13>
#[derive(Clone, PartialEq, Eq, derive_more::Debug)]
pub struct SymEncryptedProtectedData {
    framing: PacketFraming,
    #[debug("{} bytes", data.len())]
    data: Bytes,
}

/// The only integrity protected data version in RFC 4880.
pub const SEIPD_VERSION: u8 = 1;

impl SymEncryptedProtectedData {
    pub fn from_buf<B: Buf>(packet_version: PacketHeaderVersion, i: &mut B) -> Result<Self> {
        let version = i.read_u8()?;
        if version != SEIPD_VERSION {
            unsupported_err!("integrity protected data version {}", version);
        }
        Ok(SymEncryptedProtectedData {
            framing: packet_version.into(),
            data: i.rest(),
        })
    }

    pub fn new(data: Bytes) -> Self {
        SymEncryptedProtectedData {
            framing: Default::default(),
            data,
        }
    }

    /// The ciphertext, without the version octet.
    pub fn data(&self) -> &Bytes {
        &self.data
    }
}

impl Serialize for SymEncryptedProtectedData {
    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u8(SEIPD_VERSION)?;
        writer.write_all(&self.data)?;
        Ok(())
    }

    fn write_len(&self) -> usize {
        1 + self.data.len()
    }
}

impl_packet_trait!(SymEncryptedProtectedData, Tag::SymEncryptedProtectedData);
