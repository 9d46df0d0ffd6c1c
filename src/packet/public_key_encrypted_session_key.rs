use std::io;

use byteorder::WriteBytesExt;
use bytes::{Buf, Bytes};

use crate::crypto::public_key::PublicKeyAlgorithm;
use crate::errors::{unsupported_err, Result};
use crate::packet::impl_packet_trait;
use crate::parsing::BufParsing;
use crate::ser::Serialize;
use crate::types::{KeyId, Mpi, PacketFraming, PacketHeaderVersion, Tag};

/// Algorithm specific encrypted session key material.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncryptedSessionKey {
    Rsa { mpi: Mpi },
    Elgamal { first: Mpi, second: Mpi },
    /// Kept verbatim, no decryption support.
    Other { data: Bytes },
}

impl EncryptedSessionKey {
    /// The values as MPIs, empty for [EncryptedSessionKey::Other].
    pub fn mpis(&self) -> Vec<Mpi> {
        match self {
            EncryptedSessionKey::Rsa { mpi } => vec![mpi.clone()],
            EncryptedSessionKey::Elgamal { first, second } => vec![first.clone(), second.clone()],
            EncryptedSessionKey::Other { .. } => Vec::new(),
        }
    }
}

/// Public-Key Encrypted Session Key Packet, version 3.
///
/// Ref: <https://www.rfc-editor.org/rfc/rfc4880.html#section-5.1>
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKeyEncryptedSessionKey {
    framing: PacketFraming,
    id: KeyId,
    algorithm: PublicKeyAlgorithm,
    values: EncryptedSessionKey,
}

const PKESK_VERSION: u8 = 3;

impl PublicKeyEncryptedSessionKey {
    pub fn from_buf<B: Buf>(packet_version: PacketHeaderVersion, i: &mut B) -> Result<Self> {
        let version = i.read_u8()?;
        if version != PKESK_VERSION {
            unsupported_err!("public key encrypted session key version {}", version);
        }
        let id = KeyId::from(i.read_array::<8>()?);
        let algorithm = PublicKeyAlgorithm::from(i.read_u8()?);
        let values = match algorithm {
            PublicKeyAlgorithm::RSA | PublicKeyAlgorithm::RSAEncrypt | PublicKeyAlgorithm::RSASign => {
                EncryptedSessionKey::Rsa {
                    mpi: Mpi::from_buf(i)?,
                }
            }
            PublicKeyAlgorithm::Elgamal | PublicKeyAlgorithm::ElgamalEncrypt => {
                let first = Mpi::from_buf(i)?;
                let second = Mpi::from_buf(i)?;
                EncryptedSessionKey::Elgamal { first, second }
            }
            _ => EncryptedSessionKey::Other { data: i.rest() },
        };

        Ok(PublicKeyEncryptedSessionKey {
            framing: packet_version.into(),
            id,
            algorithm,
            values,
        })
    }

    pub fn new(id: KeyId, algorithm: PublicKeyAlgorithm, values: EncryptedSessionKey) -> Self {
        PublicKeyEncryptedSessionKey {
            framing: Default::default(),
            id,
            algorithm,
            values,
        }
    }

    /// Recipient key id, [KeyId::WILDCARD] for anonymous recipients.
    pub fn id(&self) -> &KeyId {
        &self.id
    }

    pub fn algorithm(&self) -> PublicKeyAlgorithm {
        self.algorithm
    }

    pub fn values(&self) -> &EncryptedSessionKey {
        &self.values
    }
}

impl Serialize for PublicKeyEncryptedSessionKey {
    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u8(PKESK_VERSION)?;
        writer.write_all(self.id.as_ref())?;
        writer.write_u8(self.algorithm.into())?;
        match &self.values {
            EncryptedSessionKey::Rsa { mpi } => mpi.to_writer(writer)?,
            EncryptedSessionKey::Elgamal { first, second } => {
                first.to_writer(writer)?;
                second.to_writer(writer)?;
            }
            EncryptedSessionKey::Other { data } => writer.write_all(data)?,
        }
        Ok(())
    }

    fn write_len(&self) -> usize {
        let values = match &self.values {
            EncryptedSessionKey::Rsa { mpi } => mpi.write_len(),
            EncryptedSessionKey::Elgamal { first, second } => first.write_len() + second.write_len(),
            EncryptedSessionKey::Other { data } => data.len(),
        };
        1 + 8 + 1 + values
    }
}

impl_packet_trait!(PublicKeyEncryptedSessionKey, Tag::PublicKeyEncryptedSessionKey);
