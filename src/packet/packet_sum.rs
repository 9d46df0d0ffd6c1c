use std::io;

use bytes::Bytes;
use log::warn;

use crate::errors::{format_err, Error, Result};
use crate::packet::{
    CompressedData, LiteralData, Marker, ModDetectionCode, OnePassSignature, PacketTrait,
    PublicKeyEncryptedSessionKey, PublicKeyPacket, SecretKeyPacket, SignaturePacket,
    SymEncryptedData, SymEncryptedProtectedData, SymKeyEncryptedSessionKey, Trust, UserAttribute,
    UserId,
};
use crate::ser::Serialize;
use crate::types::{PacketFraming, PacketHeaderVersion, Tag};
use crate::util::impl_try_from_into;

/// Represents a Packet. A packet is the record structure used to encode a chunk of data in OpenPGP.
///
/// Ref: <https://www.rfc-editor.org/rfc/rfc4880.html#section-4>
#[derive(Debug, PartialEq, Eq, Clone)]
#[allow(clippy::large_enum_variant)]
pub enum Packet {
    CompressedData(CompressedData),
    PublicKey(PublicKeyPacket),
    PublicSubkey(PublicKeyPacket),
    SecretKey(SecretKeyPacket),
    SecretSubkey(SecretKeyPacket),
    LiteralData(LiteralData),
    Marker(Marker),
    ModDetectionCode(ModDetectionCode),
    OnePassSignature(OnePassSignature),
    PublicKeyEncryptedSessionKey(PublicKeyEncryptedSessionKey),
    Signature(SignaturePacket),
    SymEncryptedData(SymEncryptedData),
    SymEncryptedProtectedData(SymEncryptedProtectedData),
    SymKeyEncryptedSessionKey(SymKeyEncryptedSessionKey),
    Trust(Trust),
    UserAttribute(UserAttribute),
    UserId(UserId),
    /// Experimental, unknown, or unsupported packets, kept verbatim.
    Raw(RawPacket),
}

impl_try_from_into!(
    Packet,
    CompressedData => CompressedData,
    LiteralData => LiteralData,
    Marker => Marker,
    ModDetectionCode => ModDetectionCode,
    OnePassSignature => OnePassSignature,
    PublicKeyEncryptedSessionKey => PublicKeyEncryptedSessionKey,
    Signature => SignaturePacket,
    SymEncryptedData => SymEncryptedData,
    SymEncryptedProtectedData => SymEncryptedProtectedData,
    SymKeyEncryptedSessionKey => SymKeyEncryptedSessionKey,
    Trust => Trust,
    UserAttribute => UserAttribute,
    UserId => UserId,
    Raw => RawPacket
);

impl From<PublicKeyPacket> for Packet {
    fn from(key: PublicKeyPacket) -> Self {
        if key.is_subkey() {
            Packet::PublicSubkey(key)
        } else {
            Packet::PublicKey(key)
        }
    }
}

impl From<SecretKeyPacket> for Packet {
    fn from(key: SecretKeyPacket) -> Self {
        if key.is_subkey() {
            Packet::SecretSubkey(key)
        } else {
            Packet::SecretKey(key)
        }
    }
}

impl TryFrom<Packet> for PublicKeyPacket {
    type Error = Error;

    fn try_from(other: Packet) -> Result<Self> {
        match other {
            Packet::PublicKey(key) | Packet::PublicSubkey(key) => Ok(key),
            _ => Err(format_err!("invalid packet type: {:?}", other.tag())),
        }
    }
}

impl TryFrom<Packet> for SecretKeyPacket {
    type Error = Error;

    fn try_from(other: Packet) -> Result<Self> {
        match other {
            Packet::SecretKey(key) | Packet::SecretSubkey(key) => Ok(key),
            _ => Err(format_err!("invalid packet type: {:?}", other.tag())),
        }
    }
}

/// Dispatches to the matching packet of the union.
macro_rules! match_packet {
    ($self:expr, $p:ident => $body:expr) => {
        match $self {
            Packet::CompressedData($p) => $body,
            Packet::PublicKey($p) => $body,
            Packet::PublicSubkey($p) => $body,
            Packet::SecretKey($p) => $body,
            Packet::SecretSubkey($p) => $body,
            Packet::LiteralData($p) => $body,
            Packet::Marker($p) => $body,
            Packet::ModDetectionCode($p) => $body,
            Packet::OnePassSignature($p) => $body,
            Packet::PublicKeyEncryptedSessionKey($p) => $body,
            Packet::Signature($p) => $body,
            Packet::SymEncryptedData($p) => $body,
            Packet::SymEncryptedProtectedData($p) => $body,
            Packet::SymKeyEncryptedSessionKey($p) => $body,
            Packet::Trust($p) => $body,
            Packet::UserAttribute($p) => $body,
            Packet::UserId($p) => $body,
            Packet::Raw($p) => $body,
        }
    };
}

impl Packet {
    /// Parses the body of a packet with the given tag.
    ///
    /// Unknown tags and packet versions this crate does not handle come back as
    /// [Packet::Raw], malformed bodies of known packets are an error.
    pub fn from_bytes(version: PacketHeaderVersion, tag: Tag, body: Bytes) -> Result<Self> {
        let mut i = body.clone();
        let res: Result<Packet> = match tag {
            Tag::PublicKeyEncryptedSessionKey => {
                PublicKeyEncryptedSessionKey::from_buf(version, &mut i).map(Into::into)
            }
            Tag::Signature => SignaturePacket::from_buf(version, &mut i).map(Into::into),
            Tag::SymKeyEncryptedSessionKey => {
                SymKeyEncryptedSessionKey::from_buf(version, &mut i).map(Into::into)
            }
            Tag::OnePassSignature => OnePassSignature::from_buf(version, &mut i).map(Into::into),
            Tag::SecretKey => SecretKeyPacket::from_buf(version, false, &mut i).map(Into::into),
            Tag::SecretSubkey => SecretKeyPacket::from_buf(version, true, &mut i).map(Into::into),
            Tag::PublicKey => PublicKeyPacket::from_buf(version, false, &mut i).map(Into::into),
            Tag::PublicSubkey => PublicKeyPacket::from_buf(version, true, &mut i).map(Into::into),
            Tag::CompressedData => CompressedData::from_buf(version, &mut i).map(Into::into),
            Tag::SymEncryptedData => SymEncryptedData::from_buf(version, &mut i).map(Into::into),
            Tag::Marker => Marker::from_buf(version, &mut i).map(Into::into),
            Tag::LiteralData => LiteralData::from_buf(version, &mut i).map(Into::into),
            Tag::Trust => Trust::from_buf(version, &mut i).map(Into::into),
            Tag::UserId => UserId::from_buf(version, &mut i).map(Into::into),
            Tag::UserAttribute => UserAttribute::from_buf(version, &mut i).map(Into::into),
            Tag::SymEncryptedProtectedData => {
                SymEncryptedProtectedData::from_buf(version, &mut i).map(Into::into)
            }
            Tag::ModDetectionCode => ModDetectionCode::from_buf(version, &mut i).map(Into::into),
            Tag::Other(_) => Ok(Packet::Raw(RawPacket::new(version, tag, body.clone()))),
        };

        match res {
            Ok(packet) => Ok(packet),
            Err(Error::Unsupported { message }) => {
                warn!("keeping unsupported {:?} packet verbatim: {}", tag, message);
                Ok(Packet::Raw(RawPacket::new(version, tag, body)))
            }
            Err(err) => Err(err),
        }
    }

    pub fn tag(&self) -> Tag {
        match_packet!(self, p => p.tag())
    }

    pub fn packet_version(&self) -> PacketHeaderVersion {
        match_packet!(self, p => p.packet_version())
    }

    pub fn framing(&self) -> &PacketFraming {
        match_packet!(self, p => p.framing())
    }

    pub fn set_framing(&mut self, framing: PacketFraming) {
        match_packet!(self, p => p.set_framing(framing))
    }
}

impl Serialize for Packet {
    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        match_packet!(self, p => p.to_writer_with_header(writer))
    }

    fn write_len(&self) -> usize {
        match_packet!(self, p => p.write_len_with_header())
    }
}

/// A packet whose body is not interpreted.
#[derive(derive_more::Debug, PartialEq, Eq, Clone)]
pub struct RawPacket {
    framing: PacketFraming,
    tag: Tag,
    #[debug("{}", hex::encode(data))]
    data: Bytes,
}

impl RawPacket {
    pub fn new(packet_version: PacketHeaderVersion, tag: Tag, data: Bytes) -> Self {
        RawPacket {
            framing: packet_version.into(),
            tag,
            data,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn is_experimental(&self) -> bool {
        self.tag.is_experimental()
    }
}

impl Serialize for RawPacket {
    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&self.data)?;
        Ok(())
    }

    fn write_len(&self) -> usize {
        self.data.len()
    }
}

impl PacketTrait for RawPacket {
    fn framing(&self) -> &PacketFraming {
        &self.framing
    }

    fn set_framing(&mut self, framing: PacketFraming) {
        self.framing = framing;
    }

    fn tag(&self) -> Tag {
        self.tag
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::read_packets;

    #[test]
    fn test_experimental_tag_is_raw() {
        // new format, tag 61
        let raw = [0xFD, 0x03, 1, 2, 3];
        let packets = read_packets(&raw).unwrap();
        let Packet::Raw(ref p) = packets[0] else {
            panic!("expected raw packet");
        };
        assert!(p.is_experimental());
        assert_eq!(p.data(), &[1, 2, 3]);
        assert_eq!(packets[0].to_bytes().unwrap(), raw);
    }

    #[test]
    fn test_unsupported_version_is_raw() {
        // v5 signature body
        let raw = [0xC2, 0x04, 5, 0, 1, 2];
        let packets = read_packets(&raw).unwrap();
        assert_eq!(packets[0].tag(), Tag::Signature);
        assert!(matches!(packets[0], Packet::Raw(_)));
        assert_eq!(packets[0].to_bytes().unwrap(), raw);
    }

    #[test]
    fn test_malformed_known_packet_fails() {
        let raw = [0xCA, 0x03, b'P', b'G', b'X'];
        assert!(read_packets(&raw).unwrap_err().is_format());
    }

    #[test]
    fn test_try_from() {
        let packet = Packet::from(Marker::default());
        assert!(Marker::try_from(packet.clone()).is_ok());
        assert!(UserId::try_from(packet).is_err());
    }
}
