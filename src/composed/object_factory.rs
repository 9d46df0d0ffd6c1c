use std::io::{self, BufRead};

use log::{debug, warn};

use crate::composed::ring::read_subkey;
use crate::composed::{
    EncryptedDataList, EncryptedMessage, OnePassSignatureList, PublicKey, PublicKeyRing,
    SecretKey, SecretKeyRing, SignatureList,
};
use crate::errors::{format_bail, Result};
use crate::operator::{DigestFingerprintCalculator, KeyFingerprintCalculator};
use crate::packet::{
    write_packet, CompressedData, LiteralData, Marker, Packet, PacketReader, PacketTrait,
    RawPacket,
};
use crate::ser::Serialize;
use crate::types::Tag;

/// One logical unit of a packet stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Object {
    SignatureList(SignatureList),
    OnePassSignatureList(OnePassSignatureList),
    PublicKeyRing(PublicKeyRing),
    SecretKeyRing(SecretKeyRing),
    /// A subkey found outside of a ring, with its binding signatures.
    PublicSubkey(PublicKey),
    SecretSubkey(SecretKey),
    CompressedData(CompressedData),
    LiteralData(LiteralData),
    EncryptedDataList(EncryptedDataList),
    Marker(Marker),
    /// Experimental or unknown packets, kept verbatim.
    Raw(RawPacket),
}

impl Object {
    /// Tag of the first packet of this object.
    pub fn tag(&self) -> Tag {
        match self {
            Object::SignatureList(_) => Tag::Signature,
            Object::OnePassSignatureList(_) => Tag::OnePassSignature,
            Object::PublicKeyRing(_) => Tag::PublicKey,
            Object::SecretKeyRing(_) => Tag::SecretKey,
            Object::PublicSubkey(_) => Tag::PublicSubkey,
            Object::SecretSubkey(_) => Tag::SecretSubkey,
            Object::CompressedData(_) => Tag::CompressedData,
            Object::LiteralData(_) => Tag::LiteralData,
            Object::EncryptedDataList(list) => match list.get(0) {
                Some(crate::composed::EncryptedDataMethod::Pbe(_)) => Tag::SymKeyEncryptedSessionKey,
                Some(crate::composed::EncryptedDataMethod::PublicKey(_)) => {
                    Tag::PublicKeyEncryptedSessionKey
                }
                None if list.is_integrity_protected() => Tag::SymEncryptedProtectedData,
                None => Tag::SymEncryptedData,
            },
            Object::Marker(_) => Tag::Marker,
            Object::Raw(raw) => raw.tag(),
        }
    }
}

impl Serialize for Object {
    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        match self {
            Object::SignatureList(o) => o.to_writer(writer),
            Object::OnePassSignatureList(o) => o.to_writer(writer),
            Object::PublicKeyRing(o) => o.to_writer(writer),
            Object::SecretKeyRing(o) => o.to_writer(writer),
            Object::PublicSubkey(o) => o.to_writer(writer),
            Object::SecretSubkey(o) => o.to_writer(writer),
            Object::CompressedData(o) => write_packet(writer, o),
            Object::LiteralData(o) => write_packet(writer, o),
            Object::EncryptedDataList(o) => o.to_writer(writer),
            Object::Marker(o) => write_packet(writer, o),
            Object::Raw(o) => write_packet(writer, o),
        }
    }

    fn write_len(&self) -> usize {
        match self {
            Object::SignatureList(o) => o.write_len(),
            Object::OnePassSignatureList(o) => o.write_len(),
            Object::PublicKeyRing(o) => o.write_len(),
            Object::SecretKeyRing(o) => o.write_len(),
            Object::PublicSubkey(o) => o.write_len(),
            Object::SecretSubkey(o) => o.write_len(),
            Object::CompressedData(o) => o.write_len_with_header(),
            Object::LiteralData(o) => o.write_len_with_header(),
            Object::EncryptedDataList(o) => o.write_len(),
            Object::Marker(o) => o.write_len_with_header(),
            Object::Raw(o) => o.write_len_with_header(),
        }
    }
}

/// Turns a packet stream into [Object]s.
///
/// Each call to [ObjectFactory::next_object] consumes exactly one object. Signature and
/// one-pass signature runs are collected into lists, key packets pull in everything
/// that belongs to their ring by looking at the following tags.
pub struct ObjectFactory<R> {
    reader: PacketReader<R>,
    calculator: Box<dyn KeyFingerprintCalculator>,
    failed: bool,
}

impl<R> std::fmt::Debug for ObjectFactory<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectFactory")
            .field("failed", &self.failed)
            .finish_non_exhaustive()
    }
}

impl<R: BufRead> ObjectFactory<R> {
    pub fn new(inner: R) -> Self {
        Self::with_fingerprint_calculator(inner, DigestFingerprintCalculator::default())
    }

    pub fn with_fingerprint_calculator(
        inner: R,
        calculator: impl KeyFingerprintCalculator + 'static,
    ) -> Self {
        ObjectFactory {
            reader: PacketReader::new(inner),
            calculator: Box::new(calculator),
            failed: false,
        }
    }

    /// Reads the next object, `None` at the end of the stream.
    pub fn next_object(&mut self) -> Result<Option<Object>> {
        let Some(tag) = self.reader.next_tag()? else {
            return Ok(None);
        };
        debug!("next object starts with {:?}", tag);

        let object = match tag {
            Tag::Signature => Object::SignatureList(SignatureList::from_packet_reader(
                &mut self.reader,
            )?),
            Tag::OnePassSignature => Object::OnePassSignatureList(
                OnePassSignatureList::from_packet_reader(&mut self.reader)?,
            ),
            Tag::PublicKey => Object::PublicKeyRing(PublicKeyRing::from_reader(
                &mut self.reader,
                self.calculator.as_ref(),
            )?),
            Tag::SecretKey => Object::SecretKeyRing(SecretKeyRing::from_reader(
                &mut self.reader,
                self.calculator.as_ref(),
            )?),
            Tag::PublicKeyEncryptedSessionKey
            | Tag::SymKeyEncryptedSessionKey
            | Tag::SymEncryptedData
            | Tag::SymEncryptedProtectedData => Object::EncryptedDataList(
                EncryptedDataList::from_packet_reader(&mut self.reader)?,
            ),
            Tag::Trust | Tag::UserId | Tag::UserAttribute | Tag::ModDetectionCode => {
                format_bail!("{:?} packet outside of its enclosing object", tag)
            }
            _ => match self.reader.read_packet()? {
                Some(packet) => self.single_packet(packet)?,
                None => return Ok(None),
            },
        };

        Ok(Some(object))
    }

    fn single_packet(&mut self, packet: Packet) -> Result<Object> {
        let object = match packet {
            Packet::PublicSubkey(packet) => {
                let key = PublicKey::new(packet, self.calculator.as_ref())?;
                Object::PublicSubkey(read_subkey(&mut self.reader, key)?)
            }
            Packet::SecretSubkey(packet) => {
                let key = PublicKey::new(packet.public_key().clone(), self.calculator.as_ref())?;
                let public = read_subkey(&mut self.reader, key)?;
                Object::SecretSubkey(SecretKey::from_parts(packet, public))
            }
            Packet::CompressedData(packet) => Object::CompressedData(packet),
            Packet::LiteralData(packet) => Object::LiteralData(packet),
            Packet::Marker(packet) => Object::Marker(packet),
            Packet::Raw(raw) => {
                if !raw.is_experimental() {
                    warn!("passing through unsupported {:?} packet", raw.tag());
                }
                Object::Raw(raw)
            }
            other => format_bail!("unexpected {:?} packet", other.tag()),
        };
        Ok(object)
    }

    pub fn get_ref(&self) -> &R {
        self.reader.get_ref()
    }

    pub fn into_inner(self) -> R {
        self.reader.into_inner()
    }

    /// Hands the rest of the stream to an [EncryptedMessage] when the next object is
    /// encrypted data, so it can be decrypted without reading it into memory.
    pub fn into_encrypted_message(mut self) -> Result<EncryptedMessage<R>> {
        match self.reader.next_tag()? {
            Some(
                Tag::PublicKeyEncryptedSessionKey
                | Tag::SymKeyEncryptedSessionKey
                | Tag::SymEncryptedData
                | Tag::SymEncryptedProtectedData,
            ) => EncryptedMessage::from_packet_reader(self.reader),
            other => format_bail!("expected encrypted data, found {:?}", other),
        }
    }
}

/// Yields objects until the end of the stream or the first error.
impl<R: BufRead> Iterator for ObjectFactory<R> {
    type Item = Result<Object>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.next_object() {
            Ok(object) => object.map(Ok),
            Err(err) => {
                self.failed = true;
                Some(Err(err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use chrono::{SubsecRound, Utc};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;
    use crate::composed::{KeyPair, SignatureGenerator};
    use crate::crypto::hash::HashAlgorithm;
    use crate::crypto::public_key::PublicKeyAlgorithm;
    use crate::errors::Error;
    use crate::operator::DefaultContentSignerBuilder;
    use crate::packet::SignatureType;
    use crate::types::{CompressionAlgorithm, PacketHeaderVersion};

    fn signed_stream(rng: &mut ChaCha8Rng) -> (Vec<u8>, KeyPair) {
        let pair = KeyPair::generate_ed25519(rng, Utc::now().trunc_subsecs(0)).unwrap();
        let builder =
            DefaultContentSignerBuilder::new(PublicKeyAlgorithm::EdDSALegacy, HashAlgorithm::Sha256);
        let mut generator = SignatureGenerator::new(&builder);
        generator.init(SignatureType::Binary, pair.private()).unwrap();

        let literal = LiteralData::from_bytes(b"msg.txt", Utc::now().trunc_subsecs(0), b"hello");
        generator.update(literal.data()).unwrap();

        let mut out = Vec::new();
        generator
            .generate_one_pass_version(false)
            .unwrap()
            .to_writer_with_header(&mut out)
            .unwrap();
        write_packet(&mut out, &literal).unwrap();
        generator.generate().unwrap().to_writer(&mut out).unwrap();
        (out, pair)
    }

    #[test]
    fn test_signed_message_objects() {
        let _ = pretty_env_logger::try_init();
        let mut rng = ChaCha8Rng::seed_from_u64(21);
        let (stream, pair) = signed_stream(&mut rng);

        let objects = ObjectFactory::new(&stream[..])
            .collect::<Result<Vec<_>>>()
            .unwrap();
        assert_eq!(objects.len(), 3);

        let Object::OnePassSignatureList(ops) = &objects[0] else {
            panic!("expected one-pass signatures, got {:?}", objects[0]);
        };
        assert_eq!(ops.len(), 1);
        assert_eq!(ops.get(0).unwrap().key_id(), pair.key_id());

        let Object::LiteralData(lit) = &objects[1] else {
            panic!("expected literal data");
        };
        assert_eq!(lit.data(), b"hello");

        let Object::SignatureList(sigs) = &objects[2] else {
            panic!("expected signatures");
        };
        assert_eq!(sigs.len(), 1);

        let mut encoded = Vec::new();
        for object in &objects {
            object.to_writer(&mut encoded).unwrap();
        }
        assert_eq!(encoded, stream);
    }

    #[test]
    fn test_compressed_and_marker_pass_through() {
        let compressed = CompressedData::compress(CompressionAlgorithm::ZLIB, b"inner").unwrap();
        let mut stream = Vec::new();
        Object::Marker(Marker::default()).to_writer(&mut stream).unwrap();
        write_packet(&mut stream, &compressed).unwrap();

        let mut factory = ObjectFactory::new(&stream[..]);
        assert!(matches!(factory.next_object().unwrap(), Some(Object::Marker(_))));
        let Some(Object::CompressedData(c)) = factory.next_object().unwrap() else {
            panic!("expected compressed data");
        };
        assert_eq!(c.decompress_to_vec().unwrap(), b"inner");
        assert!(factory.next_object().unwrap().is_none());
    }

    #[test]
    fn test_experimental_packet_is_raw() {
        let raw = RawPacket::new(
            PacketHeaderVersion::New,
            Tag::Other(61),
            Bytes::from_static(b"\x01\x02\x03"),
        );
        let mut stream = Vec::new();
        write_packet(&mut stream, &raw).unwrap();

        let objects = ObjectFactory::new(&stream[..])
            .collect::<Result<Vec<_>>>()
            .unwrap();
        assert_eq!(objects, vec![Object::Raw(raw)]);
        assert_eq!(objects[0].tag(), Tag::Other(61));
    }

    #[test]
    fn test_stray_user_id_stops_iteration() {
        let uid = crate::packet::UserId::from_str(Default::default(), "stray");
        let mut stream = Vec::new();
        write_packet(&mut stream, &uid).unwrap();
        write_packet(&mut stream, &uid).unwrap();

        let mut factory = ObjectFactory::new(&stream[..]);
        let err = factory.next().unwrap().unwrap_err();
        assert!(matches!(err, Error::Format { .. }), "{err:?}");
        assert!(factory.next().is_none());
    }

    #[test]
    fn test_standalone_subkey() {
        let mut rng = ChaCha8Rng::seed_from_u64(22);
        let pair = KeyPair::generate_rsa(&mut rng, 1024, Utc::now().trunc_subsecs(0)).unwrap();
        let subkey = pair.public().clone().with_subkey_framing(true);

        let objects = ObjectFactory::new(&subkey.to_bytes().unwrap()[..])
            .collect::<Result<Vec<_>>>()
            .unwrap();
        assert_eq!(objects, vec![Object::PublicSubkey(subkey)]);
    }
}
