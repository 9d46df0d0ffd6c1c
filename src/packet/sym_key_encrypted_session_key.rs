use std::io;

use byteorder::WriteBytesExt;
use bytes::{Buf, Bytes};

use crate::crypto::sym::SymmetricKeyAlgorithm;
use crate::errors::{unsupported_err, Result};
use crate::packet::impl_packet_trait;
use crate::parsing::BufParsing;
use crate::ser::Serialize;
use crate::types::{PacketFraming, PacketHeaderVersion, StringToKey, Tag};

/// Symmetric-Key Encrypted Session Key Packet, version 4.
///
/// Without `encrypted_key` the S2K derived key is used as the session key directly.
///
/// Ref: <https://www.rfc-editor.org/rfc/rfc4880.html#section-5.3>
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymKeyEncryptedSessionKey {
    framing: PacketFraming,
    sym_algorithm: SymmetricKeyAlgorithm,
    s2k: StringToKey,
    encrypted_key: Option<Bytes>,
}

const SKESK_VERSION: u8 = 4;

impl SymKeyEncryptedSessionKey {
    pub fn from_buf<B: Buf>(packet_version: PacketHeaderVersion, i: &mut B) -> Result<Self> {
        let version = i.read_u8()?;
        if version != SKESK_VERSION {
            unsupported_err!("symmetric key encrypted session key version {}", version);
        }
        let sym_algorithm = SymmetricKeyAlgorithm::from(i.read_u8()?);
        let s2k = StringToKey::from_buf(i)?;
        let encrypted_key = i.has_remaining().then(|| i.rest());

        Ok(SymKeyEncryptedSessionKey {
            framing: packet_version.into(),
            sym_algorithm,
            s2k,
            encrypted_key,
        })
    }

    pub fn new(
        sym_algorithm: SymmetricKeyAlgorithm,
        s2k: StringToKey,
        encrypted_key: Option<Bytes>,
    ) -> Self {
        SymKeyEncryptedSessionKey {
            framing: Default::default(),
            sym_algorithm,
            s2k,
            encrypted_key,
        }
    }

    /// Algorithm the passphrase derived key is used with.
    pub fn sym_algorithm(&self) -> SymmetricKeyAlgorithm {
        self.sym_algorithm
    }

    pub fn s2k(&self) -> &StringToKey {
        &self.s2k
    }

    pub fn encrypted_key(&self) -> Option<&Bytes> {
        self.encrypted_key.as_ref()
    }
}

impl Serialize for SymKeyEncryptedSessionKey {
    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u8(SKESK_VERSION)?;
        writer.write_u8(self.sym_algorithm.into())?;
        self.s2k.to_writer(writer)?;
        if let Some(key) = &self.encrypted_key {
            writer.write_all(key)?;
        }
        Ok(())
    }

    fn write_len(&self) -> usize {
        2 + self.s2k.write_len() + self.encrypted_key.as_ref().map_or(0, |k| k.len())
    }
}

impl_packet_trait!(SymKeyEncryptedSessionKey, Tag::SymKeyEncryptedSessionKey);
