use bitfield::bitfield;
use byteorder::{BigEndian, WriteBytesExt};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use num_enum::{FromPrimitive, IntoPrimitive};

use crate::crypto::hash::HashAlgorithm;
use crate::crypto::public_key::PublicKeyAlgorithm;
use crate::errors::Result;
use crate::packet::signature::SubpacketVector;
use crate::ser::{u32_to_time, Serialize};
use crate::types::{KeyId, Mpi, PacketFraming};

/// Signature packet versions.
#[derive(Debug, PartialEq, Eq, Clone, Copy, FromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum SignatureVersion {
    /// Same wire format as V3.
    V2 = 2,
    V3 = 3,
    V4 = 4,

    #[num_enum(catch_all)]
    Other(u8),
}

impl Default for SignatureVersion {
    fn default() -> Self {
        Self::V4
    }
}

/// Signature classes.
///
/// Ref: <https://www.rfc-editor.org/rfc/rfc4880.html#section-5.2.1>
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, FromPrimitive, IntoPrimitive)]
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
#[repr(u8)]
pub enum SignatureType {
    /// Signature of a binary document.
    Binary = 0x00,
    /// Signature of a canonical text document, line endings are converted to `<CR><LF>`.
    Text = 0x01,
    /// Signature of only its own subpacket contents.
    Standalone = 0x02,
    /// Generic certification of a User ID and Public-Key packet.
    CertGeneric = 0x10,
    /// Persona certification of a User ID and Public-Key packet.
    CertPersona = 0x11,
    /// Casual certification of a User ID and Public-Key packet.
    CertCasual = 0x12,
    /// Positive certification of a User ID and Public-Key packet.
    CertPositive = 0x13,
    /// Subkey Binding Signature, made by the primary key over the subkey.
    SubkeyBinding = 0x18,
    /// Primary Key Binding Signature, made by a signing subkey over the primary key.
    KeyBinding = 0x19,
    /// Signature directly on a key.
    Key = 0x1F,
    /// Key revocation signature.
    KeyRevocation = 0x20,
    /// Subkey revocation signature.
    SubkeyRevocation = 0x28,
    /// Certification revocation signature.
    CertRevocation = 0x30,
    /// Timestamp signature.
    Timestamp = 0x40,
    /// Third-Party Confirmation signature.
    ThirdParty = 0x50,

    #[num_enum(catch_all)]
    #[cfg_attr(test, proptest(skip))]
    Other(u8),
}

impl SignatureType {
    /// The user id certification classes, 0x10 to 0x13.
    pub fn is_certification(self) -> bool {
        matches!(
            self,
            SignatureType::CertGeneric
                | SignatureType::CertPersona
                | SignatureType::CertCasual
                | SignatureType::CertPositive
        )
    }
}

bitfield! {
    /// Key flags subpacket contents.
    ///
    /// Ref: <https://www.rfc-editor.org/rfc/rfc4880.html#section-5.2.3.21>
    #[derive(Default, PartialEq, Eq, Copy, Clone)]
    pub struct KeyFlags(u8);
    impl Debug;

    pub certify, set_certify: 0;
    pub sign, set_sign: 1;
    pub encrypt_comms, set_encrypt_comms: 2;
    pub encrypt_storage, set_encrypt_storage: 3;
    pub shared, set_shared: 4;
    pub authentication, set_authentication: 5;
    pub group, set_group: 7;
}

impl KeyFlags {
    pub fn bits(&self) -> u8 {
        self.0
    }
}

impl From<&[u8]> for KeyFlags {
    fn from(other: &[u8]) -> Self {
        KeyFlags(other.first().copied().unwrap_or_default())
    }
}

/// Reason for revocation codes.
#[derive(Debug, PartialEq, Eq, Copy, Clone, FromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum RevocationCode {
    NoReason = 0,
    KeySuperseded = 1,
    KeyCompromised = 2,
    KeyRetired = 3,
    CertUserIdInvalid = 32,

    #[num_enum(catch_all)]
    Other(u8),
}

/// Notation data subpacket contents.
#[derive(derive_more::Debug, PartialEq, Eq, Clone)]
pub struct Notation {
    /// Flag octets, the high bit of the first marks human readable values.
    pub flags: [u8; 4],
    #[debug("{}", String::from_utf8_lossy(name))]
    pub name: Bytes,
    #[debug("{}", hex::encode(value))]
    pub value: Bytes,
}

impl Notation {
    pub fn new(readable: bool, name: &[u8], value: &[u8]) -> Self {
        Notation {
            flags: [if readable { 0x80 } else { 0 }, 0, 0, 0],
            name: Bytes::copy_from_slice(name),
            value: Bytes::copy_from_slice(value),
        }
    }

    pub fn is_human_readable(&self) -> bool {
        self.flags[0] & 0x80 != 0
    }
}

/// Designated revoker.
#[derive(derive_more::Debug, PartialEq, Eq, Clone)]
pub struct RevocationKey {
    /// Class octet, 0x80 must be set, 0x40 marks sensitive.
    pub class: u8,
    pub algorithm: PublicKeyAlgorithm,
    #[debug("{}", hex::encode(fingerprint))]
    pub fingerprint: [u8; 20],
}

/// The algorithm specific signature values.
#[derive(derive_more::Debug, PartialEq, Eq, Clone)]
pub enum SignatureBytes {
    /// RSA (one value), DSA, ECDSA and EdDSA (two values, r and s).
    Mpis(Vec<Mpi>),
    /// Values of algorithms without a known layout, kept verbatim.
    Native(#[debug("{}", hex::encode(_0))] Bytes),
}

impl SignatureBytes {
    pub fn mpis(&self) -> &[Mpi] {
        match self {
            SignatureBytes::Mpis(mpis) => mpis,
            SignatureBytes::Native(_) => &[],
        }
    }
}

/// Everything about a signature except the signature values.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct SignatureConfig {
    pub version: SignatureVersion,
    pub typ: SignatureType,
    pub pub_alg: PublicKeyAlgorithm,
    pub hash_alg: HashAlgorithm,

    /// Hashed subpackets, v4 only.
    pub hashed_subpackets: SubpacketVector,
    /// Unhashed subpackets, v4 only.
    pub unhashed_subpackets: SubpacketVector,

    /// Creation time field of v2 and v3 signatures.
    pub created: Option<u32>,
    /// Issuer field of v2 and v3 signatures.
    pub issuer: Option<KeyId>,
}

impl SignatureConfig {
    pub fn v4(
        typ: SignatureType,
        pub_alg: PublicKeyAlgorithm,
        hash_alg: HashAlgorithm,
        hashed_subpackets: SubpacketVector,
        unhashed_subpackets: SubpacketVector,
    ) -> Self {
        SignatureConfig {
            version: SignatureVersion::V4,
            typ,
            pub_alg,
            hash_alg,
            hashed_subpackets,
            unhashed_subpackets,
            created: None,
            issuer: None,
        }
    }

    pub fn v3(
        typ: SignatureType,
        pub_alg: PublicKeyAlgorithm,
        hash_alg: HashAlgorithm,
        created: u32,
        issuer: KeyId,
    ) -> Self {
        SignatureConfig {
            version: SignatureVersion::V3,
            typ,
            pub_alg,
            hash_alg,
            hashed_subpackets: Default::default(),
            unhashed_subpackets: Default::default(),
            created: Some(created),
            issuer: Some(issuer),
        }
    }

    pub fn is_v4(&self) -> bool {
        self.version == SignatureVersion::V4
    }

    /// The octets hashed after the signed content.
    ///
    /// For v4 signatures this is the signature header with the hashed subpackets,
    /// followed by `0x04 0xFF` and the four octet length of that header. For v2 and v3
    /// signatures it is the type and creation time.
    ///
    /// Ref: <https://www.rfc-editor.org/rfc/rfc4880.html#section-5.2.4>
    pub fn trailer(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        if self.is_v4() {
            out.write_u8(self.version.into())?;
            out.write_u8(self.typ.into())?;
            out.write_u8(self.pub_alg.into())?;
            out.write_u8(self.hash_alg.into())?;
            let hashed_len = self.hashed_subpackets.write_len();
            out.write_u16::<BigEndian>(u16::try_from(hashed_len)?)?;
            self.hashed_subpackets.to_writer(&mut out)?;

            let len = out.len();
            out.write_u8(0x04)?;
            out.write_u8(0xFF)?;
            out.write_u32::<BigEndian>(u32::try_from(len)?)?;
        } else {
            out.write_u8(self.typ.into())?;
            out.write_u32::<BigEndian>(self.created.unwrap_or_default())?;
        }

        Ok(out)
    }

    /// Issuer key id, from the v3 field or the issuer subpackets (hashed first).
    pub fn issuer(&self) -> Option<KeyId> {
        self.issuer.or_else(|| {
            self.hashed_subpackets
                .issuer_key_id()
                .or_else(|| self.unhashed_subpackets.issuer_key_id())
        })
    }

    pub fn created(&self) -> Option<DateTime<Utc>> {
        match self.created {
            Some(created) => Some(u32_to_time(created)),
            None => self.hashed_subpackets.signature_creation_time(),
        }
    }
}

/// Signature Packet
///
/// Ref: <https://www.rfc-editor.org/rfc/rfc4880.html#section-5.2>
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct SignaturePacket {
    pub(crate) framing: PacketFraming,
    pub(crate) config: SignatureConfig,
    pub(crate) digest_prefix: [u8; 2],
    pub(crate) signature: SignatureBytes,
}

impl SignaturePacket {
    pub fn new(config: SignatureConfig, digest_prefix: [u8; 2], signature: SignatureBytes) -> Self {
        SignaturePacket {
            framing: Default::default(),
            config,
            digest_prefix,
            signature,
        }
    }

    pub fn config(&self) -> &SignatureConfig {
        &self.config
    }

    pub fn version(&self) -> SignatureVersion {
        self.config.version
    }

    pub fn typ(&self) -> SignatureType {
        self.config.typ
    }

    pub fn pub_alg(&self) -> PublicKeyAlgorithm {
        self.config.pub_alg
    }

    pub fn hash_alg(&self) -> HashAlgorithm {
        self.config.hash_alg
    }

    pub fn hashed_subpackets(&self) -> &SubpacketVector {
        &self.config.hashed_subpackets
    }

    pub fn unhashed_subpackets(&self) -> &SubpacketVector {
        &self.config.unhashed_subpackets
    }

    /// The first two octets of the signed digest.
    pub fn digest_prefix(&self) -> [u8; 2] {
        self.digest_prefix
    }

    pub fn signature(&self) -> &SignatureBytes {
        &self.signature
    }

    pub fn issuer(&self) -> Option<KeyId> {
        self.config.issuer()
    }

    pub fn created(&self) -> Option<DateTime<Utc>> {
        self.config.created()
    }

    pub fn is_certification(&self) -> bool {
        self.config.typ.is_certification()
    }

    pub fn has_subpackets(&self) -> bool {
        !self.config.hashed_subpackets.is_empty() || !self.config.unhashed_subpackets.is_empty()
    }

    /// Returns a copy with the unhashed subpackets replaced.
    pub fn with_unhashed_subpackets(&self, unhashed: SubpacketVector) -> Self {
        let mut sig = self.clone();
        sig.config.unhashed_subpackets = unhashed;
        sig
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyflags() {
        let mut flags = KeyFlags::default();
        assert_eq!(flags.bits(), 0);
        flags.set_certify(true);
        flags.set_sign(true);
        assert_eq!(flags.bits(), 0x03);
        assert!(!flags.encrypt_comms());

        let flags = KeyFlags::from(&[0x0C][..]);
        assert!(flags.encrypt_comms());
        assert!(flags.encrypt_storage());
        assert!(!flags.sign());
    }

    #[test]
    fn test_v3_trailer() {
        let config = SignatureConfig::v3(
            SignatureType::Text,
            PublicKeyAlgorithm::RSA,
            HashAlgorithm::Sha1,
            0x0102_0304,
            KeyId::from(7u64),
        );
        assert_eq!(config.trailer().unwrap(), vec![0x01, 1, 2, 3, 4]);
        assert_eq!(config.issuer(), Some(KeyId::from(7u64)));
    }

    #[test]
    fn test_v4_trailer_without_subpackets() {
        let config = SignatureConfig::v4(
            SignatureType::Binary,
            PublicKeyAlgorithm::EdDSALegacy,
            HashAlgorithm::Sha256,
            Default::default(),
            Default::default(),
        );
        assert_eq!(
            config.trailer().unwrap(),
            vec![4, 0, 22, 8, 0, 0, 0x04, 0xFF, 0, 0, 0, 6]
        );
    }
}
