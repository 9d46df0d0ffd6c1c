use std::io;

use byteorder::{BigEndian, WriteBytesExt};
use bytes::Buf;
use chrono::{DateTime, Utc};

use crate::crypto::public_key::PublicKeyAlgorithm;
use crate::errors::{unsupported_err, Result};
use crate::parsing::BufParsing;
use crate::ser::{time_to_u32, u32_to_time, Serialize};
use crate::types::{
    Fingerprint, KeyId, KeyVersion, PacketFraming, PacketHeaderVersion, PublicParams, Tag,
};

/// Public-Key and Public-Subkey Packet
///
/// Both share a body format, `subkey` selects the tag.
///
/// Ref: <https://www.rfc-editor.org/rfc/rfc4880.html#section-5.5.2>
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct PublicKeyPacket {
    framing: PacketFraming,
    subkey: bool,
    version: KeyVersion,
    algorithm: PublicKeyAlgorithm,
    created_at: u32,
    /// Validity in days, v2 and v3 keys only.
    expiration: Option<u16>,
    public_params: PublicParams,
}

impl PublicKeyPacket {
    /// Creates a v4 key packet.
    pub fn new(
        algorithm: PublicKeyAlgorithm,
        created_at: DateTime<Utc>,
        public_params: PublicParams,
    ) -> Self {
        PublicKeyPacket {
            framing: Default::default(),
            subkey: false,
            version: KeyVersion::V4,
            algorithm,
            created_at: time_to_u32(&created_at),
            expiration: None,
            public_params,
        }
    }

    /// Parses the packet body.
    pub fn from_buf<B: Buf>(
        packet_version: PacketHeaderVersion,
        subkey: bool,
        i: &mut B,
    ) -> Result<Self> {
        let version = KeyVersion::from(i.read_u8()?);
        let created_at = i.read_be_u32()?;
        let expiration = match version {
            KeyVersion::V2 | KeyVersion::V3 => Some(i.read_be_u16()?),
            KeyVersion::V4 => None,
            KeyVersion::Other(v) => unsupported_err!("key packet version {}", v),
        };
        let algorithm = PublicKeyAlgorithm::from(i.read_u8()?);
        let public_params = PublicParams::from_buf(algorithm, i)?;

        Ok(PublicKeyPacket {
            framing: packet_version.into(),
            subkey,
            version,
            algorithm,
            created_at,
            expiration,
            public_params,
        })
    }

    /// The same key, framed as a primary key or as a subkey.
    pub fn with_subkey(mut self, subkey: bool) -> Self {
        self.subkey = subkey;
        self
    }

    pub fn is_subkey(&self) -> bool {
        self.subkey
    }

    pub fn version(&self) -> KeyVersion {
        self.version
    }

    pub fn algorithm(&self) -> PublicKeyAlgorithm {
        self.algorithm
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        u32_to_time(self.created_at)
    }

    /// Validity period in days for v2 and v3 keys, `None` (or zero) means no expiry.
    pub fn expiration(&self) -> Option<u16> {
        self.expiration
    }

    pub fn public_params(&self) -> &PublicParams {
        &self.public_params
    }

    /// True if the algorithm can be used to encrypt session keys.
    pub fn is_encryption_key(&self) -> bool {
        self.algorithm.can_encrypt()
    }

    /// Key strength in bits, `None` if unknown.
    pub fn bit_strength(&self) -> Option<usize> {
        self.public_params.bit_strength()
    }

    /// Derives the key id matching a fingerprint of this key.
    ///
    /// For v2 and v3 keys this is the low 64 bits of the RSA modulus, which is not part
    /// of the fingerprint.
    pub fn key_id_for(&self, fingerprint: &Fingerprint) -> KeyId {
        match (&self.version, &self.public_params) {
            (KeyVersion::V2 | KeyVersion::V3, PublicParams::Rsa { n, .. }) => {
                KeyId::from_low_bytes(n.as_bytes())
            }
            _ => fingerprint.low_key_id(),
        }
    }
}

impl Serialize for PublicKeyPacket {
    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u8(self.version.into())?;
        writer.write_u32::<BigEndian>(self.created_at)?;
        if let Some(expiration) = self.expiration {
            writer.write_u16::<BigEndian>(expiration)?;
        }
        writer.write_u8(self.algorithm.into())?;
        self.public_params.to_writer(writer)
    }

    fn write_len(&self) -> usize {
        1 + 4 + self.expiration.map_or(0, |_| 2) + 1 + self.public_params.write_len()
    }
}

impl crate::packet::PacketTrait for PublicKeyPacket {
    fn framing(&self) -> &PacketFraming {
        &self.framing
    }

    fn set_framing(&mut self, framing: PacketFraming) {
        self.framing = framing;
    }

    fn tag(&self) -> Tag {
        if self.subkey {
            Tag::PublicSubkey
        } else {
            Tag::PublicKey
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::packet::PacketTrait;
    use crate::types::Mpi;

    fn rsa_params() -> PublicParams {
        PublicParams::Rsa {
            n: Mpi::from_slice(&[0xC5, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10]),
            e: Mpi::from_slice(&[1, 0, 1]),
        }
    }

    #[test]
    fn test_v4_roundtrip() {
        let key = PublicKeyPacket::new(PublicKeyAlgorithm::RSA, u32_to_time(1_000_000), rsa_params());
        let raw = key.to_bytes().unwrap();
        assert_eq!(raw.len(), key.write_len());
        assert_eq!(&raw[..6], &[4, 0, 0x0F, 0x42, 0x40, 1]);

        let back = PublicKeyPacket::from_buf(PacketHeaderVersion::New, false, &mut &raw[..]).unwrap();
        assert_eq!(back, key);
        assert_eq!(back.tag(), Tag::PublicKey);
        assert_eq!(back.with_subkey(true).tag(), Tag::PublicSubkey);
    }

    #[test]
    fn test_v3_roundtrip() {
        let mut raw = vec![3, 0, 0, 0, 1, 0, 30, 1];
        raw.extend_from_slice(&rsa_params().to_bytes().unwrap());
        let key = PublicKeyPacket::from_buf(PacketHeaderVersion::Old, false, &mut &raw[..]).unwrap();
        assert_eq!(key.version(), KeyVersion::V3);
        assert_eq!(key.expiration(), Some(30));
        assert_eq!(key.to_bytes().unwrap(), raw);

        let fp = Fingerprint::V3([0u8; 16]);
        assert_eq!(key.key_id_for(&fp), KeyId::from_low_bytes(&[3, 4, 5, 6, 7, 8, 9, 10]));
    }

    #[test]
    fn test_unknown_version() {
        let raw = [5u8, 0, 0, 0, 0, 1];
        let err = PublicKeyPacket::from_buf(PacketHeaderVersion::New, false, &mut &raw[..]).unwrap_err();
        assert!(matches!(err, crate::errors::Error::Unsupported { .. }));
    }
}
