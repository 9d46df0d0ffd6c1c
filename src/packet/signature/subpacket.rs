use std::io;

use byteorder::{BigEndian, WriteBytesExt};
use bytes::{Buf, Bytes};
use chrono::{DateTime, Utc};
use log::{debug, warn};
use smallvec::SmallVec;

use crate::crypto::hash::HashAlgorithm;
use crate::crypto::public_key::PublicKeyAlgorithm;
use crate::crypto::sym::SymmetricKeyAlgorithm;
use crate::errors::{format_bail, Result};
use crate::packet::signature::{KeyFlags, Notation, RevocationCode, RevocationKey, SignaturePacket};
use crate::parsing::BufParsing;
use crate::ser::{time_to_u32, u32_to_time, Serialize};
use crate::types::{CompressionAlgorithm, Fingerprint, KeyId, KeyVersion, PacketHeaderVersion};

/// Available signature subpacket types
#[derive(Debug, PartialEq, Eq, Copy, Clone, Hash)]
pub enum SubpacketType {
    SignatureCreationTime,
    SignatureExpirationTime,
    ExportableCertification,
    TrustSignature,
    RegularExpression,
    Revocable,
    KeyExpirationTime,
    PreferredSymmetricAlgorithms,
    RevocationKey,
    Issuer,
    Notation,
    PreferredHashAlgorithms,
    PreferredCompressionAlgorithms,
    KeyServerPreferences,
    PreferredKeyServer,
    PrimaryUserId,
    PolicyURI,
    KeyFlags,
    SignersUserID,
    RevocationReason,
    Features,
    SignatureTarget,
    EmbeddedSignature,
    IssuerFingerprint,
    IntendedRecipientFingerprint,
    Experimental(u8),
    Other(u8),
}

impl SubpacketType {
    pub fn as_u8(&self, is_critical: bool) -> u8 {
        let raw: u8 = match self {
            SubpacketType::SignatureCreationTime => 2,
            SubpacketType::SignatureExpirationTime => 3,
            SubpacketType::ExportableCertification => 4,
            SubpacketType::TrustSignature => 5,
            SubpacketType::RegularExpression => 6,
            SubpacketType::Revocable => 7,
            SubpacketType::KeyExpirationTime => 9,
            SubpacketType::PreferredSymmetricAlgorithms => 11,
            SubpacketType::RevocationKey => 12,
            SubpacketType::Issuer => 16,
            SubpacketType::Notation => 20,
            SubpacketType::PreferredHashAlgorithms => 21,
            SubpacketType::PreferredCompressionAlgorithms => 22,
            SubpacketType::KeyServerPreferences => 23,
            SubpacketType::PreferredKeyServer => 24,
            SubpacketType::PrimaryUserId => 25,
            SubpacketType::PolicyURI => 26,
            SubpacketType::KeyFlags => 27,
            SubpacketType::SignersUserID => 28,
            SubpacketType::RevocationReason => 29,
            SubpacketType::Features => 30,
            SubpacketType::SignatureTarget => 31,
            SubpacketType::EmbeddedSignature => 32,
            SubpacketType::IssuerFingerprint => 33,
            SubpacketType::IntendedRecipientFingerprint => 35,
            SubpacketType::Experimental(n) => *n,
            SubpacketType::Other(n) => *n,
        };

        if is_critical {
            // set critical bit
            raw | 0b1000_0000
        } else {
            raw
        }
    }

    #[inline]
    pub fn from_u8(n: u8) -> (Self, bool) {
        let is_critical = (n >> 7) == 1;
        // remove critical bit
        let n = n & 0b0111_1111;

        let m = match n {
            2 => SubpacketType::SignatureCreationTime,
            3 => SubpacketType::SignatureExpirationTime,
            4 => SubpacketType::ExportableCertification,
            5 => SubpacketType::TrustSignature,
            6 => SubpacketType::RegularExpression,
            7 => SubpacketType::Revocable,
            9 => SubpacketType::KeyExpirationTime,
            11 => SubpacketType::PreferredSymmetricAlgorithms,
            12 => SubpacketType::RevocationKey,
            16 => SubpacketType::Issuer,
            20 => SubpacketType::Notation,
            21 => SubpacketType::PreferredHashAlgorithms,
            22 => SubpacketType::PreferredCompressionAlgorithms,
            23 => SubpacketType::KeyServerPreferences,
            24 => SubpacketType::PreferredKeyServer,
            25 => SubpacketType::PrimaryUserId,
            26 => SubpacketType::PolicyURI,
            27 => SubpacketType::KeyFlags,
            28 => SubpacketType::SignersUserID,
            29 => SubpacketType::RevocationReason,
            30 => SubpacketType::Features,
            31 => SubpacketType::SignatureTarget,
            32 => SubpacketType::EmbeddedSignature,
            33 => SubpacketType::IssuerFingerprint,
            35 => SubpacketType::IntendedRecipientFingerprint,
            100..=110 => SubpacketType::Experimental(n),
            _ => SubpacketType::Other(n),
        };

        (m, is_critical)
    }
}

/// Represents a subpacket length, the encoding is kept so it can be reproduced.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
pub enum SubpacketLength {
    /// 1 byte encoding, must be less than `192`.
    One(#[cfg_attr(test, proptest(strategy = "0u8..=191"))] u8),
    /// 2 byte encoding
    Two(#[cfg_attr(test, proptest(strategy = "192u16..=8383"))] u16),
    /// 5 byte encoding
    Five(u32),
}

impl SubpacketLength {
    /// Parses a subpacket length from the given buffer.
    pub(crate) fn from_buf<B: Buf>(i: &mut B) -> Result<Self> {
        let olen = i.read_u8()?;
        let len = match olen {
            // One-Octet Lengths
            0..=191 => Self::One(olen),
            // Two-Octet Lengths
            192..=254 => {
                let a = i.read_u8()?;
                let l = ((u16::from(olen) - 192) << 8) + 192 + u16::from(a);
                Self::Two(l)
            }
            // Five-Octet Lengths
            255 => Self::Five(i.read_be_u32()?),
        };
        Ok(len)
    }

    /// Encodes the given length minimally.
    pub(crate) fn encode(len: u32) -> Self {
        match len {
            0..=191 => Self::One(len as u8),
            192..=8383 => Self::Two(len as u16),
            _ => Self::Five(len),
        }
    }

    pub(crate) fn len(&self) -> usize {
        match self {
            Self::One(l) => *l as _,
            Self::Two(l) => *l as _,
            Self::Five(l) => *l as _,
        }
    }

    pub(crate) fn is_long(&self) -> bool {
        matches!(self, Self::Five(_))
    }
}

impl Serialize for SubpacketLength {
    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        match self {
            Self::One(l) => {
                writer.write_u8(*l)?;
            }
            Self::Two(l) => {
                writer.write_u8((((l - 192) >> 8) + 192) as u8)?;
                writer.write_u8(((l - 192) & 0xFF) as u8)?;
            }
            Self::Five(l) => {
                writer.write_u8(0xFF)?;
                writer.write_u32::<BigEndian>(*l)?
            }
        }
        Ok(())
    }

    fn write_len(&self) -> usize {
        match self {
            Self::One(_) => 1,
            Self::Two(_) => 2,
            Self::Five(_) => 5,
        }
    }
}

#[derive(derive_more::Debug, PartialEq, Eq, Clone)]
pub enum SubpacketData {
    /// The time the signature was made.
    SignatureCreationTime(DateTime<Utc>),
    /// Seconds after creation the signature expires, zero means never.
    SignatureExpirationTime(u32),
    /// Seconds after key creation the key expires, zero means never.
    KeyExpirationTime(u32),
    /// The OpenPGP Key ID of the key issuing the signature.
    Issuer(KeyId),
    PreferredSymmetricAlgorithms(SmallVec<[SymmetricKeyAlgorithm; 8]>),
    PreferredHashAlgorithms(SmallVec<[HashAlgorithm; 8]>),
    PreferredCompressionAlgorithms(SmallVec<[CompressionAlgorithm; 8]>),
    KeyServerPreferences(#[debug("{}", hex::encode(_0))] SmallVec<[u8; 4]>),
    KeyFlags(#[debug("{}", hex::encode(_0))] SmallVec<[u8; 1]>),
    Features(#[debug("{}", hex::encode(_0))] SmallVec<[u8; 1]>),
    RevocationReason(RevocationCode, Bytes),
    IsPrimary(bool),
    Revocable(bool),
    EmbeddedSignature(Box<SignaturePacket>),
    PreferredKeyServer(Bytes),
    Notation(Notation),
    RevocationKey(RevocationKey),
    SignersUserID(Bytes),
    /// The URI of the policy under which the signature was issued
    PolicyURI(Bytes),
    /// Trust depth and amount.
    TrustSignature(u8, u8),
    RegularExpression(Bytes),
    ExportableCertification(bool),
    IssuerFingerprint(Fingerprint),
    IntendedRecipientFingerprint(Fingerprint),
    SignatureTarget(
        PublicKeyAlgorithm,
        HashAlgorithm,
        #[debug("{}", hex::encode(_2))] Bytes,
    ),
    Experimental(u8, #[debug("{}", hex::encode(_1))] Bytes),
    Other(u8, #[debug("{}", hex::encode(_1))] Bytes),
}

impl SubpacketData {
    pub fn typ(&self) -> SubpacketType {
        match self {
            SubpacketData::SignatureCreationTime(_) => SubpacketType::SignatureCreationTime,
            SubpacketData::SignatureExpirationTime(_) => SubpacketType::SignatureExpirationTime,
            SubpacketData::KeyExpirationTime(_) => SubpacketType::KeyExpirationTime,
            SubpacketData::Issuer(_) => SubpacketType::Issuer,
            SubpacketData::PreferredSymmetricAlgorithms(_) => {
                SubpacketType::PreferredSymmetricAlgorithms
            }
            SubpacketData::PreferredHashAlgorithms(_) => SubpacketType::PreferredHashAlgorithms,
            SubpacketData::PreferredCompressionAlgorithms(_) => {
                SubpacketType::PreferredCompressionAlgorithms
            }
            SubpacketData::KeyServerPreferences(_) => SubpacketType::KeyServerPreferences,
            SubpacketData::KeyFlags(_) => SubpacketType::KeyFlags,
            SubpacketData::Features(_) => SubpacketType::Features,
            SubpacketData::RevocationReason(_, _) => SubpacketType::RevocationReason,
            SubpacketData::IsPrimary(_) => SubpacketType::PrimaryUserId,
            SubpacketData::Revocable(_) => SubpacketType::Revocable,
            SubpacketData::EmbeddedSignature(_) => SubpacketType::EmbeddedSignature,
            SubpacketData::PreferredKeyServer(_) => SubpacketType::PreferredKeyServer,
            SubpacketData::Notation(_) => SubpacketType::Notation,
            SubpacketData::RevocationKey(_) => SubpacketType::RevocationKey,
            SubpacketData::SignersUserID(_) => SubpacketType::SignersUserID,
            SubpacketData::PolicyURI(_) => SubpacketType::PolicyURI,
            SubpacketData::TrustSignature(_, _) => SubpacketType::TrustSignature,
            SubpacketData::RegularExpression(_) => SubpacketType::RegularExpression,
            SubpacketData::ExportableCertification(_) => SubpacketType::ExportableCertification,
            SubpacketData::IssuerFingerprint(_) => SubpacketType::IssuerFingerprint,
            SubpacketData::IntendedRecipientFingerprint(_) => {
                SubpacketType::IntendedRecipientFingerprint
            }
            SubpacketData::SignatureTarget(_, _, _) => SubpacketType::SignatureTarget,
            SubpacketData::Experimental(n, _) => SubpacketType::Experimental(*n),
            SubpacketData::Other(n, _) => SubpacketType::Other(*n),
        }
    }

    /// Parses the body of a subpacket of the given type.
    fn from_buf(typ: SubpacketType, raw_typ: u8, mut body: Bytes) -> Result<Self> {
        let i = &mut body;
        let data = match typ {
            SubpacketType::SignatureCreationTime => {
                SubpacketData::SignatureCreationTime(u32_to_time(i.read_be_u32()?))
            }
            SubpacketType::SignatureExpirationTime => {
                SubpacketData::SignatureExpirationTime(i.read_be_u32()?)
            }
            SubpacketType::KeyExpirationTime => SubpacketData::KeyExpirationTime(i.read_be_u32()?),
            SubpacketType::ExportableCertification => {
                SubpacketData::ExportableCertification(i.read_u8()? == 1)
            }
            SubpacketType::TrustSignature => {
                let depth = i.read_u8()?;
                let amount = i.read_u8()?;
                SubpacketData::TrustSignature(depth, amount)
            }
            SubpacketType::RegularExpression => SubpacketData::RegularExpression(i.rest()),
            SubpacketType::Revocable => SubpacketData::Revocable(i.read_u8()? == 1),
            SubpacketType::PreferredSymmetricAlgorithms => {
                SubpacketData::PreferredSymmetricAlgorithms(
                    i.rest().iter().map(|b| SymmetricKeyAlgorithm::from(*b)).collect(),
                )
            }
            SubpacketType::RevocationKey => {
                let class = i.read_u8()?;
                let algorithm = PublicKeyAlgorithm::from(i.read_u8()?);
                let fingerprint = i.read_array::<20>()?;
                SubpacketData::RevocationKey(RevocationKey {
                    class,
                    algorithm,
                    fingerprint,
                })
            }
            SubpacketType::Issuer => SubpacketData::Issuer(KeyId::from(i.read_array::<8>()?)),
            SubpacketType::Notation => {
                let flags = i.read_array::<4>()?;
                let name_len = i.read_be_u16()?;
                let value_len = i.read_be_u16()?;
                let name = i.read_take(name_len.into())?;
                let value = i.read_take(value_len.into())?;
                SubpacketData::Notation(Notation { flags, name, value })
            }
            SubpacketType::PreferredHashAlgorithms => SubpacketData::PreferredHashAlgorithms(
                i.rest().iter().map(|b| HashAlgorithm::from(*b)).collect(),
            ),
            SubpacketType::PreferredCompressionAlgorithms => {
                SubpacketData::PreferredCompressionAlgorithms(
                    i.rest().iter().map(|b| CompressionAlgorithm::from(*b)).collect(),
                )
            }
            SubpacketType::KeyServerPreferences => {
                SubpacketData::KeyServerPreferences(SmallVec::from_slice(&i.rest()))
            }
            SubpacketType::PreferredKeyServer => SubpacketData::PreferredKeyServer(i.rest()),
            SubpacketType::PrimaryUserId => SubpacketData::IsPrimary(i.read_u8()? == 1),
            SubpacketType::PolicyURI => SubpacketData::PolicyURI(i.rest()),
            SubpacketType::KeyFlags => SubpacketData::KeyFlags(SmallVec::from_slice(&i.rest())),
            SubpacketType::SignersUserID => SubpacketData::SignersUserID(i.rest()),
            SubpacketType::RevocationReason => {
                let code = RevocationCode::from(i.read_u8()?);
                SubpacketData::RevocationReason(code, i.rest())
            }
            SubpacketType::Features => SubpacketData::Features(SmallVec::from_slice(&i.rest())),
            SubpacketType::SignatureTarget => {
                let pub_alg = PublicKeyAlgorithm::from(i.read_u8()?);
                let hash_alg = HashAlgorithm::from(i.read_u8()?);
                SubpacketData::SignatureTarget(pub_alg, hash_alg, i.rest())
            }
            SubpacketType::EmbeddedSignature => {
                let sig = SignaturePacket::from_buf(PacketHeaderVersion::New, i)?;
                SubpacketData::EmbeddedSignature(Box::new(sig))
            }
            SubpacketType::IssuerFingerprint | SubpacketType::IntendedRecipientFingerprint => {
                let version = KeyVersion::from(i.read_u8()?);
                let fp = Fingerprint::new(version, &i.rest())?;
                if typ == SubpacketType::IssuerFingerprint {
                    SubpacketData::IssuerFingerprint(fp)
                } else {
                    SubpacketData::IntendedRecipientFingerprint(fp)
                }
            }
            SubpacketType::Experimental(n) => SubpacketData::Experimental(n, i.rest()),
            SubpacketType::Other(n) => SubpacketData::Other(n, i.rest()),
        };
        if i.has_remaining() {
            format_bail!(
                "{} trailing octets in subpacket {}",
                i.remaining(),
                raw_typ
            );
        }

        Ok(data)
    }
}

impl Serialize for SubpacketData {
    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        match self {
            SubpacketData::SignatureCreationTime(t) => {
                writer.write_u32::<BigEndian>(time_to_u32(t))?;
            }
            SubpacketData::SignatureExpirationTime(secs) | SubpacketData::KeyExpirationTime(secs) => {
                writer.write_u32::<BigEndian>(*secs)?;
            }
            SubpacketData::Issuer(id) => writer.write_all(id.as_ref())?,
            SubpacketData::PreferredSymmetricAlgorithms(algs) => {
                for alg in algs {
                    writer.write_u8((*alg).into())?;
                }
            }
            SubpacketData::PreferredHashAlgorithms(algs) => {
                for alg in algs {
                    writer.write_u8((*alg).into())?;
                }
            }
            SubpacketData::PreferredCompressionAlgorithms(algs) => {
                for alg in algs {
                    writer.write_u8((*alg).into())?;
                }
            }
            SubpacketData::KeyServerPreferences(prefs) => writer.write_all(prefs)?,
            SubpacketData::KeyFlags(flags) => writer.write_all(flags)?,
            SubpacketData::Features(features) => writer.write_all(features)?,
            SubpacketData::RevocationReason(code, reason) => {
                writer.write_u8((*code).into())?;
                writer.write_all(reason)?;
            }
            SubpacketData::IsPrimary(b)
            | SubpacketData::Revocable(b)
            | SubpacketData::ExportableCertification(b) => writer.write_u8(u8::from(*b))?,
            SubpacketData::EmbeddedSignature(sig) => sig.to_writer(writer)?,
            SubpacketData::PreferredKeyServer(data)
            | SubpacketData::SignersUserID(data)
            | SubpacketData::PolicyURI(data)
            | SubpacketData::RegularExpression(data)
            | SubpacketData::Experimental(_, data)
            | SubpacketData::Other(_, data) => writer.write_all(data)?,
            SubpacketData::Notation(notation) => {
                writer.write_all(&notation.flags)?;
                writer.write_u16::<BigEndian>(u16::try_from(notation.name.len())?)?;
                writer.write_u16::<BigEndian>(u16::try_from(notation.value.len())?)?;
                writer.write_all(&notation.name)?;
                writer.write_all(&notation.value)?;
            }
            SubpacketData::RevocationKey(key) => {
                writer.write_u8(key.class)?;
                writer.write_u8(key.algorithm.into())?;
                writer.write_all(&key.fingerprint)?;
            }
            SubpacketData::TrustSignature(depth, amount) => {
                writer.write_u8(*depth)?;
                writer.write_u8(*amount)?;
            }
            SubpacketData::IssuerFingerprint(fp) | SubpacketData::IntendedRecipientFingerprint(fp) => {
                writer.write_u8(fp.version().into())?;
                writer.write_all(fp.as_bytes())?;
            }
            SubpacketData::SignatureTarget(pub_alg, hash_alg, hash) => {
                writer.write_u8((*pub_alg).into())?;
                writer.write_u8((*hash_alg).into())?;
                writer.write_all(hash)?;
            }
        }
        Ok(())
    }

    fn write_len(&self) -> usize {
        match self {
            SubpacketData::SignatureCreationTime(_)
            | SubpacketData::SignatureExpirationTime(_)
            | SubpacketData::KeyExpirationTime(_) => 4,
            SubpacketData::Issuer(_) => 8,
            SubpacketData::PreferredSymmetricAlgorithms(algs) => algs.len(),
            SubpacketData::PreferredHashAlgorithms(algs) => algs.len(),
            SubpacketData::PreferredCompressionAlgorithms(algs) => algs.len(),
            SubpacketData::KeyServerPreferences(prefs) => prefs.len(),
            SubpacketData::KeyFlags(flags) => flags.len(),
            SubpacketData::Features(features) => features.len(),
            SubpacketData::RevocationReason(_, reason) => 1 + reason.len(),
            SubpacketData::IsPrimary(_)
            | SubpacketData::Revocable(_)
            | SubpacketData::ExportableCertification(_) => 1,
            SubpacketData::EmbeddedSignature(sig) => sig.write_len(),
            SubpacketData::PreferredKeyServer(data)
            | SubpacketData::SignersUserID(data)
            | SubpacketData::PolicyURI(data)
            | SubpacketData::RegularExpression(data)
            | SubpacketData::Experimental(_, data)
            | SubpacketData::Other(_, data) => data.len(),
            SubpacketData::Notation(notation) => 4 + 2 + 2 + notation.name.len() + notation.value.len(),
            SubpacketData::RevocationKey(_) => 1 + 1 + 20,
            SubpacketData::TrustSignature(_, _) => 2,
            SubpacketData::IssuerFingerprint(fp) | SubpacketData::IntendedRecipientFingerprint(fp) => {
                1 + fp.len()
            }
            SubpacketData::SignatureTarget(_, _, hash) => 2 + hash.len(),
        }
    }
}

/// A single signature subpacket.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Subpacket {
    pub is_critical: bool,
    pub data: SubpacketData,
    /// Length as found on the wire, covering the type octet and the body.
    pub len: SubpacketLength,
}

impl Subpacket {
    /// Construct a new regular subpacket.
    pub fn regular(data: SubpacketData) -> Result<Self> {
        Self::new(false, data)
    }

    /// Construct a new critical subpacket.
    pub fn critical(data: SubpacketData) -> Result<Self> {
        Self::new(true, data)
    }

    pub fn new(is_critical: bool, data: SubpacketData) -> Result<Self> {
        let raw_len = (data.write_len() + 1).try_into()?;
        Ok(Subpacket {
            is_critical,
            data,
            len: SubpacketLength::encode(raw_len),
        })
    }

    pub fn typ(&self) -> SubpacketType {
        self.data.typ()
    }

    /// True if the length was encoded with five octets.
    pub fn is_long_length(&self) -> bool {
        self.len.is_long()
    }

    pub(crate) fn from_buf<B: Buf>(i: &mut B) -> Result<Self> {
        let len = SubpacketLength::from_buf(i)?;
        if len.len() == 0 {
            format_bail!("empty signature subpacket");
        }
        let raw_typ = i.read_u8()?;
        let (typ, is_critical) = SubpacketType::from_u8(raw_typ);
        let body = i.read_take(len.len() - 1)?;

        let data = match SubpacketData::from_buf(typ, raw_typ, body.clone()) {
            Ok(data) => data,
            Err(err) => {
                // keep malformed known subpackets verbatim
                warn!("invalid subpacket {:?}: {}", typ, err);
                SubpacketData::Other(raw_typ & 0b0111_1111, body)
            }
        };

        Ok(Subpacket {
            is_critical,
            data,
            len,
        })
    }
}

impl Serialize for Subpacket {
    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        let body_len = self.data.write_len() + 1;
        let len = match self.len {
            SubpacketLength::Five(_) => SubpacketLength::Five(u32::try_from(body_len)?),
            _ => SubpacketLength::encode(u32::try_from(body_len)?),
        };
        len.to_writer(writer)?;
        writer.write_u8(self.typ().as_u8(self.is_critical))?;
        self.data.to_writer(writer)
    }

    fn write_len(&self) -> usize {
        let body_len = self.data.write_len() + 1;
        let len_len = match self.len {
            SubpacketLength::Five(_) => 5,
            _ => SubpacketLength::encode(body_len as u32).write_len(),
        };
        len_len + body_len
    }
}

/// An ordered list of subpackets, either the hashed or the unhashed area of a signature.
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct SubpacketVector(Vec<Subpacket>);

impl SubpacketVector {
    pub fn new(subpackets: Vec<Subpacket>) -> Self {
        SubpacketVector(subpackets)
    }

    /// Parses a complete subpacket area.
    pub fn from_buf(mut area: Bytes) -> Result<Self> {
        let mut subpackets = Vec::new();
        while area.has_remaining() {
            subpackets.push(Subpacket::from_buf(&mut area)?);
        }
        debug!("parsed {} subpackets", subpackets.len());
        Ok(SubpacketVector(subpackets))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Subpacket> {
        self.0.iter()
    }

    pub fn to_vec(&self) -> Vec<Subpacket> {
        self.0.clone()
    }

    /// First subpacket of the given type.
    pub fn get(&self, typ: SubpacketType) -> Option<&Subpacket> {
        self.0.iter().find(|p| p.typ() == typ)
    }

    pub fn has(&self, typ: SubpacketType) -> bool {
        self.get(typ).is_some()
    }

    /// All subpackets of the given type, in order.
    pub fn subpackets_of(&self, typ: SubpacketType) -> Vec<&Subpacket> {
        self.0.iter().filter(|p| p.typ() == typ).collect()
    }

    /// Types of all subpackets marked critical.
    pub fn critical_tags(&self) -> Vec<SubpacketType> {
        self.0
            .iter()
            .filter(|p| p.is_critical)
            .map(|p| p.typ())
            .collect()
    }

    fn find_map<'a, T>(&'a self, f: impl Fn(&'a SubpacketData) -> Option<T>) -> Option<T> {
        self.0.iter().find_map(|p| f(&p.data))
    }

    pub fn signature_creation_time(&self) -> Option<DateTime<Utc>> {
        self.find_map(|d| match d {
            SubpacketData::SignatureCreationTime(t) => Some(*t),
            _ => None,
        })
    }

    /// Seconds the signature is valid for, zero means forever.
    pub fn signature_expiration_time(&self) -> Option<u32> {
        self.find_map(|d| match d {
            SubpacketData::SignatureExpirationTime(secs) => Some(*secs),
            _ => None,
        })
    }

    /// Seconds after creation the key expires, zero means never.
    pub fn key_expiration_time(&self) -> Option<u32> {
        self.find_map(|d| match d {
            SubpacketData::KeyExpirationTime(secs) => Some(*secs),
            _ => None,
        })
    }

    pub fn issuer_key_id(&self) -> Option<KeyId> {
        self.find_map(|d| match d {
            SubpacketData::Issuer(id) => Some(*id),
            _ => None,
        })
    }

    pub fn issuer_fingerprint(&self) -> Option<&Fingerprint> {
        self.find_map(|d| match d {
            SubpacketData::IssuerFingerprint(fp) => Some(fp),
            _ => None,
        })
    }

    pub fn intended_recipient_fingerprints(&self) -> Vec<&Fingerprint> {
        self.0
            .iter()
            .filter_map(|p| match &p.data {
                SubpacketData::IntendedRecipientFingerprint(fp) => Some(fp),
                _ => None,
            })
            .collect()
    }

    pub fn key_flags(&self) -> Option<KeyFlags> {
        self.find_map(|d| match d {
            SubpacketData::KeyFlags(flags) => Some(KeyFlags::from(&flags[..])),
            _ => None,
        })
    }

    pub fn preferred_symmetric_algorithms(&self) -> Option<&[SymmetricKeyAlgorithm]> {
        self.find_map(|d| match d {
            SubpacketData::PreferredSymmetricAlgorithms(algs) => Some(&algs[..]),
            _ => None,
        })
    }

    pub fn preferred_hash_algorithms(&self) -> Option<&[HashAlgorithm]> {
        self.find_map(|d| match d {
            SubpacketData::PreferredHashAlgorithms(algs) => Some(&algs[..]),
            _ => None,
        })
    }

    pub fn preferred_compression_algorithms(&self) -> Option<&[CompressionAlgorithm]> {
        self.find_map(|d| match d {
            SubpacketData::PreferredCompressionAlgorithms(algs) => Some(&algs[..]),
            _ => None,
        })
    }

    pub fn key_server_preferences(&self) -> Option<&[u8]> {
        self.find_map(|d| match d {
            SubpacketData::KeyServerPreferences(prefs) => Some(&prefs[..]),
            _ => None,
        })
    }

    pub fn preferred_key_server(&self) -> Option<&[u8]> {
        self.find_map(|d| match d {
            SubpacketData::PreferredKeyServer(server) => Some(&server[..]),
            _ => None,
        })
    }

    pub fn features(&self) -> Option<&[u8]> {
        self.find_map(|d| match d {
            SubpacketData::Features(features) => Some(&features[..]),
            _ => None,
        })
    }

    pub fn is_primary_user_id(&self) -> bool {
        self.find_map(|d| match d {
            SubpacketData::IsPrimary(b) => Some(*b),
            _ => None,
        })
        .unwrap_or(false)
    }

    /// Certifications are exportable unless marked otherwise.
    pub fn is_exportable(&self) -> bool {
        self.find_map(|d| match d {
            SubpacketData::ExportableCertification(b) => Some(*b),
            _ => None,
        })
        .unwrap_or(true)
    }

    /// Signatures are revocable unless marked otherwise.
    pub fn is_revocable(&self) -> bool {
        self.find_map(|d| match d {
            SubpacketData::Revocable(b) => Some(*b),
            _ => None,
        })
        .unwrap_or(true)
    }

    /// Trust depth and amount.
    pub fn trust_signature(&self) -> Option<(u8, u8)> {
        self.find_map(|d| match d {
            SubpacketData::TrustSignature(depth, amount) => Some((*depth, *amount)),
            _ => None,
        })
    }

    pub fn regular_expression(&self) -> Option<&[u8]> {
        self.find_map(|d| match d {
            SubpacketData::RegularExpression(re) => Some(&re[..]),
            _ => None,
        })
    }

    pub fn revocation_key(&self) -> Option<&RevocationKey> {
        self.find_map(|d| match d {
            SubpacketData::RevocationKey(key) => Some(key),
            _ => None,
        })
    }

    pub fn revocation_reason(&self) -> Option<(RevocationCode, &[u8])> {
        self.find_map(|d| match d {
            SubpacketData::RevocationReason(code, reason) => Some((*code, &reason[..])),
            _ => None,
        })
    }

    pub fn signer_user_id(&self) -> Option<&[u8]> {
        self.find_map(|d| match d {
            SubpacketData::SignersUserID(id) => Some(&id[..]),
            _ => None,
        })
    }

    pub fn policy_uri(&self) -> Option<&[u8]> {
        self.find_map(|d| match d {
            SubpacketData::PolicyURI(uri) => Some(&uri[..]),
            _ => None,
        })
    }

    pub fn signature_target(&self) -> Option<(PublicKeyAlgorithm, HashAlgorithm, &[u8])> {
        self.find_map(|d| match d {
            SubpacketData::SignatureTarget(pub_alg, hash_alg, hash) => {
                Some((*pub_alg, *hash_alg, &hash[..]))
            }
            _ => None,
        })
    }

    pub fn notations(&self) -> Vec<&Notation> {
        self.0
            .iter()
            .filter_map(|p| match &p.data {
                SubpacketData::Notation(n) => Some(n),
                _ => None,
            })
            .collect()
    }

    pub fn embedded_signatures(&self) -> Vec<&SignaturePacket> {
        self.0
            .iter()
            .filter_map(|p| match &p.data {
                SubpacketData::EmbeddedSignature(sig) => Some(sig.as_ref()),
                _ => None,
            })
            .collect()
    }
}

impl Serialize for SubpacketVector {
    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        self.0.to_writer(writer)
    }

    fn write_len(&self) -> usize {
        self.0.write_len()
    }
}

impl From<Vec<Subpacket>> for SubpacketVector {
    fn from(subpackets: Vec<Subpacket>) -> Self {
        SubpacketVector(subpackets)
    }
}

impl<'a> IntoIterator for &'a SubpacketVector {
    type Item = &'a Subpacket;
    type IntoIter = std::slice::Iter<'a, Subpacket>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Builds a [SubpacketVector].
///
/// Setters for single valued subpackets replace an earlier value of the same type,
/// notations accumulate.
#[derive(Debug, Clone, Default)]
pub struct SubpacketVectorGenerator {
    subpackets: Vec<Subpacket>,
}

impl SubpacketVectorGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    fn set(&mut self, critical: bool, data: SubpacketData) -> Result<&mut Self> {
        let typ = data.typ();
        let subpacket = Subpacket::new(critical, data)?;
        match self.subpackets.iter_mut().find(|p| p.typ() == typ) {
            Some(existing) => *existing = subpacket,
            None => self.subpackets.push(subpacket),
        }
        Ok(self)
    }

    /// Appends a subpacket, keeping any existing ones of the same type.
    pub fn add_subpacket(&mut self, subpacket: Subpacket) -> &mut Self {
        self.subpackets.push(subpacket);
        self
    }

    pub fn set_signature_creation_time(
        &mut self,
        critical: bool,
        time: DateTime<Utc>,
    ) -> Result<&mut Self> {
        self.set(critical, SubpacketData::SignatureCreationTime(time))
    }

    pub fn set_signature_expiration_time(&mut self, critical: bool, secs: u32) -> Result<&mut Self> {
        self.set(critical, SubpacketData::SignatureExpirationTime(secs))
    }

    pub fn set_key_expiration_time(&mut self, critical: bool, secs: u32) -> Result<&mut Self> {
        self.set(critical, SubpacketData::KeyExpirationTime(secs))
    }

    pub fn set_exportable(&mut self, critical: bool, exportable: bool) -> Result<&mut Self> {
        self.set(critical, SubpacketData::ExportableCertification(exportable))
    }

    pub fn set_trust(&mut self, critical: bool, depth: u8, amount: u8) -> Result<&mut Self> {
        self.set(critical, SubpacketData::TrustSignature(depth, amount))
    }

    pub fn set_revocable(&mut self, critical: bool, revocable: bool) -> Result<&mut Self> {
        self.set(critical, SubpacketData::Revocable(revocable))
    }

    pub fn set_preferred_symmetric_algorithms(
        &mut self,
        critical: bool,
        algs: &[SymmetricKeyAlgorithm],
    ) -> Result<&mut Self> {
        self.set(
            critical,
            SubpacketData::PreferredSymmetricAlgorithms(SmallVec::from_slice(algs)),
        )
    }

    pub fn set_preferred_hash_algorithms(
        &mut self,
        critical: bool,
        algs: &[HashAlgorithm],
    ) -> Result<&mut Self> {
        self.set(
            critical,
            SubpacketData::PreferredHashAlgorithms(SmallVec::from_slice(algs)),
        )
    }

    pub fn set_preferred_compression_algorithms(
        &mut self,
        critical: bool,
        algs: &[CompressionAlgorithm],
    ) -> Result<&mut Self> {
        self.set(
            critical,
            SubpacketData::PreferredCompressionAlgorithms(SmallVec::from_slice(algs)),
        )
    }

    pub fn set_revocation_key(
        &mut self,
        critical: bool,
        class: u8,
        algorithm: PublicKeyAlgorithm,
        fingerprint: [u8; 20],
    ) -> Result<&mut Self> {
        self.set(
            critical,
            SubpacketData::RevocationKey(RevocationKey {
                class: class | 0x80,
                algorithm,
                fingerprint,
            }),
        )
    }

    pub fn set_issuer_key_id(&mut self, critical: bool, key_id: KeyId) -> Result<&mut Self> {
        self.set(critical, SubpacketData::Issuer(key_id))
    }

    pub fn set_issuer_fingerprint(
        &mut self,
        critical: bool,
        fingerprint: Fingerprint,
    ) -> Result<&mut Self> {
        self.set(critical, SubpacketData::IssuerFingerprint(fingerprint))
    }

    pub fn add_intended_recipient_fingerprint(
        &mut self,
        critical: bool,
        fingerprint: Fingerprint,
    ) -> Result<&mut Self> {
        let subpacket =
            Subpacket::new(critical, SubpacketData::IntendedRecipientFingerprint(fingerprint))?;
        Ok(self.add_subpacket(subpacket))
    }

    pub fn add_notation_data(
        &mut self,
        critical: bool,
        human_readable: bool,
        name: &[u8],
        value: &[u8],
    ) -> Result<&mut Self> {
        let notation = Notation::new(human_readable, name, value);
        let subpacket = Subpacket::new(critical, SubpacketData::Notation(notation))?;
        Ok(self.add_subpacket(subpacket))
    }

    pub fn set_key_server_preferences(&mut self, critical: bool, prefs: &[u8]) -> Result<&mut Self> {
        self.set(
            critical,
            SubpacketData::KeyServerPreferences(SmallVec::from_slice(prefs)),
        )
    }

    pub fn set_preferred_key_server(&mut self, critical: bool, uri: &[u8]) -> Result<&mut Self> {
        self.set(
            critical,
            SubpacketData::PreferredKeyServer(Bytes::copy_from_slice(uri)),
        )
    }

    pub fn set_primary_user_id(&mut self, critical: bool, primary: bool) -> Result<&mut Self> {
        self.set(critical, SubpacketData::IsPrimary(primary))
    }

    pub fn set_policy_uri(&mut self, critical: bool, uri: &[u8]) -> Result<&mut Self> {
        self.set(critical, SubpacketData::PolicyURI(Bytes::copy_from_slice(uri)))
    }

    pub fn set_key_flags(&mut self, critical: bool, flags: KeyFlags) -> Result<&mut Self> {
        self.set(
            critical,
            SubpacketData::KeyFlags(SmallVec::from_slice(&[flags.bits()])),
        )
    }

    pub fn set_signer_user_id(&mut self, critical: bool, user_id: &[u8]) -> Result<&mut Self> {
        self.set(
            critical,
            SubpacketData::SignersUserID(Bytes::copy_from_slice(user_id)),
        )
    }

    pub fn set_revocation_reason(
        &mut self,
        critical: bool,
        code: RevocationCode,
        description: &[u8],
    ) -> Result<&mut Self> {
        self.set(
            critical,
            SubpacketData::RevocationReason(code, Bytes::copy_from_slice(description)),
        )
    }

    pub fn set_features(&mut self, critical: bool, features: u8) -> Result<&mut Self> {
        self.set(
            critical,
            SubpacketData::Features(SmallVec::from_slice(&[features])),
        )
    }

    pub fn set_signature_target(
        &mut self,
        critical: bool,
        pub_alg: PublicKeyAlgorithm,
        hash_alg: HashAlgorithm,
        hash: &[u8],
    ) -> Result<&mut Self> {
        self.set(
            critical,
            SubpacketData::SignatureTarget(pub_alg, hash_alg, Bytes::copy_from_slice(hash)),
        )
    }

    pub fn set_embedded_signature(
        &mut self,
        critical: bool,
        sig: SignaturePacket,
    ) -> Result<&mut Self> {
        self.set(critical, SubpacketData::EmbeddedSignature(Box::new(sig)))
    }

    pub fn generate(&self) -> SubpacketVector {
        SubpacketVector(self.subpackets.clone())
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    proptest! {
        #[test]
        fn subpacket_length_roundtrip(len: SubpacketLength) {
            let mut buf = Vec::new();
            len.to_writer(&mut buf).unwrap();
            prop_assert_eq!(buf.len(), len.write_len());
            let new_len = SubpacketLength::from_buf(&mut &buf[..]).unwrap();
            prop_assert_eq!(len, new_len);
        }
    }

    #[test]
    fn test_generator_and_accessors() {
        let created = u32_to_time(1_600_000_000);
        let mut flags = KeyFlags::default();
        flags.set_sign(true);

        let mut gen = SubpacketVectorGenerator::new();
        gen.set_signature_creation_time(false, created)
            .unwrap()
            .set_key_expiration_time(true, 3600)
            .unwrap()
            .set_key_flags(false, flags)
            .unwrap()
            .set_primary_user_id(false, true)
            .unwrap()
            .add_notation_data(false, true, b"test@example.org", b"value")
            .unwrap()
            .add_notation_data(false, false, b"bin@example.org", &[0, 1])
            .unwrap()
            .set_preferred_symmetric_algorithms(
                false,
                &[SymmetricKeyAlgorithm::AES256, SymmetricKeyAlgorithm::AES128],
            )
            .unwrap()
            // replaces the earlier expiration
            .set_key_expiration_time(true, 7200)
            .unwrap();
        let vector = gen.generate();

        assert_eq!(vector.len(), 7);
        assert_eq!(vector.signature_creation_time(), Some(created));
        assert_eq!(vector.key_expiration_time(), Some(7200));
        assert!(vector.key_flags().unwrap().sign());
        assert!(vector.is_primary_user_id());
        assert_eq!(vector.notations().len(), 2);
        assert!(vector.notations()[0].is_human_readable());
        assert!(!vector.notations()[1].is_human_readable());
        assert_eq!(vector.critical_tags(), vec![SubpacketType::KeyExpirationTime]);
        assert!(vector.is_exportable());

        let raw = vector.to_bytes().unwrap();
        assert_eq!(raw.len(), vector.write_len());
        let back = SubpacketVector::from_buf(raw.into()).unwrap();
        assert_eq!(back, vector);
    }

    #[test]
    fn test_long_length_preserved() {
        // issuer subpacket with a five octet length
        let raw = hex::decode("ff000000091001020304050607 08".replace(' ', "")).unwrap();
        let vector = SubpacketVector::from_buf(raw.clone().into()).unwrap();
        assert!(vector.iter().next().unwrap().is_long_length());
        assert_eq!(
            vector.issuer_key_id(),
            Some(KeyId::from(0x0102_0304_0506_0708u64))
        );
        assert_eq!(vector.to_bytes().unwrap(), raw);
    }

    #[test]
    fn test_critical_bit_and_unknown() {
        let raw = [3u8, 0x80 | 105, 0xAA, 0xBB, 2, 0x7E, 0x01];
        let vector = SubpacketVector::from_buf(Bytes::copy_from_slice(&raw)).unwrap();
        let subpackets: Vec<_> = vector.iter().collect();
        assert!(subpackets[0].is_critical);
        assert_eq!(subpackets[0].typ(), SubpacketType::Experimental(105));
        assert_eq!(subpackets[1].typ(), SubpacketType::Other(0x7E));
        assert_eq!(vector.to_bytes().unwrap(), raw);
    }

    #[test]
    fn test_malformed_known_subpacket_is_kept() {
        // creation time with only two octets
        let raw = [3u8, 2, 0x12, 0x34];
        let vector = SubpacketVector::from_buf(Bytes::copy_from_slice(&raw)).unwrap();
        assert_eq!(vector.signature_creation_time(), None);
        assert_eq!(vector.to_bytes().unwrap(), raw);
    }

    #[test]
    fn test_truncated_area() {
        let raw = [9u8, 16, 1, 2];
        assert!(SubpacketVector::from_buf(Bytes::copy_from_slice(&raw)).is_err());
    }
}
