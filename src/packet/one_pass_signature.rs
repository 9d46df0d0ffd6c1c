use std::io;

use byteorder::WriteBytesExt;
use bytes::Buf;

use crate::crypto::hash::HashAlgorithm;
use crate::crypto::public_key::PublicKeyAlgorithm;
use crate::errors::{unsupported_err, Result};
use crate::packet::impl_packet_trait;
use crate::packet::signature::SignatureType;
use crate::parsing::BufParsing;
use crate::ser::Serialize;
use crate::types::{KeyId, PacketFraming, PacketHeaderVersion, Tag};

/// One-Pass Signature Packet
///
/// Announces a signature that follows the signed data, so the data can be hashed
/// while it streams by.
///
/// Ref: <https://www.rfc-editor.org/rfc/rfc4880.html#section-5.4>
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct OnePassSignature {
    framing: PacketFraming,
    typ: SignatureType,
    hash_algorithm: HashAlgorithm,
    pub_algorithm: PublicKeyAlgorithm,
    key_id: KeyId,
    /// Zero if another one-pass signature applies to the same data.
    last: u8,
}

const VERSION: u8 = 3;

impl OnePassSignature {
    pub fn new(
        typ: SignatureType,
        hash_algorithm: HashAlgorithm,
        pub_algorithm: PublicKeyAlgorithm,
        key_id: KeyId,
        nested: bool,
    ) -> Self {
        OnePassSignature {
            framing: Default::default(),
            typ,
            hash_algorithm,
            pub_algorithm,
            key_id,
            last: u8::from(!nested),
        }
    }

    /// Parses a `OnePassSignature` packet from the given buffer.
    pub fn from_buf<B: Buf>(packet_version: PacketHeaderVersion, i: &mut B) -> Result<Self> {
        let version = i.read_u8()?;
        if version != VERSION {
            unsupported_err!("one pass signature version {}", version);
        }
        let typ = SignatureType::from(i.read_u8()?);
        let hash_algorithm = HashAlgorithm::from(i.read_u8()?);
        let pub_algorithm = PublicKeyAlgorithm::from(i.read_u8()?);
        let key_id = KeyId::from(i.read_array::<8>()?);
        let last = i.read_u8()?;

        Ok(OnePassSignature {
            framing: packet_version.into(),
            typ,
            hash_algorithm,
            pub_algorithm,
            key_id,
            last,
        })
    }

    pub fn typ(&self) -> SignatureType {
        self.typ
    }

    pub fn hash_algorithm(&self) -> HashAlgorithm {
        self.hash_algorithm
    }

    pub fn pub_algorithm(&self) -> PublicKeyAlgorithm {
        self.pub_algorithm
    }

    pub fn key_id(&self) -> KeyId {
        self.key_id
    }

    /// True if the next packet is another one-pass signature over the same data.
    pub fn is_nested(&self) -> bool {
        self.last == 0
    }
}

impl Serialize for OnePassSignature {
    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u8(VERSION)?;
        writer.write_u8(self.typ.into())?;
        writer.write_u8(self.hash_algorithm.into())?;
        writer.write_u8(self.pub_algorithm.into())?;
        writer.write_all(self.key_id.as_ref())?;
        writer.write_u8(self.last)?;
        Ok(())
    }

    fn write_len(&self) -> usize {
        1 + 1 + 1 + 1 + 8 + 1
    }
}

impl_packet_trait!(OnePassSignature, Tag::OnePassSignature);
