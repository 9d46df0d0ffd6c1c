use bytes::Buf;
use log::debug;

use crate::crypto::hash::HashAlgorithm;
use crate::crypto::public_key::PublicKeyAlgorithm;
use crate::errors::{format_bail, unsupported_err, Result};
use crate::packet::signature::types::*;
use crate::packet::signature::SubpacketVector;
use crate::parsing::BufParsing;
use crate::types::{KeyId, Mpi, PacketHeaderVersion};

impl SignaturePacket {
    /// Parses a `Signature` packet from the given buffer.
    ///
    /// Ref: <https://www.rfc-editor.org/rfc/rfc4880.html#section-5.2>
    pub fn from_buf<B: Buf>(packet_version: PacketHeaderVersion, i: &mut B) -> Result<Self> {
        let version = SignatureVersion::from(i.read_u8()?);
        let packet = match version {
            SignatureVersion::V2 | SignatureVersion::V3 => v3_parser(packet_version, version, i)?,
            SignatureVersion::V4 => v4_parser(packet_version, i)?,
            SignatureVersion::Other(v) => unsupported_err!("signature version {}", v),
        };

        Ok(packet)
    }
}

/// Parse a v2 or v3 signature packet
/// Ref: <https://www.rfc-editor.org/rfc/rfc4880.html#section-5.2.2>
fn v3_parser<B: Buf>(
    packet_version: PacketHeaderVersion,
    version: SignatureVersion,
    i: &mut B,
) -> Result<SignaturePacket> {
    // One-octet length of following hashed material. MUST be 5.
    let hashed_len = i.read_u8()?;
    if hashed_len != 5 {
        format_bail!("invalid v3 signature hashed length {}", hashed_len);
    }
    // One-octet signature type.
    let typ = SignatureType::from(i.read_u8()?);
    // Four-octet creation time.
    let created = i.read_be_u32()?;
    // Eight-octet Key ID of signer.
    let issuer = KeyId::from(i.read_array::<8>()?);
    // One-octet public-key algorithm.
    let pub_alg = PublicKeyAlgorithm::from(i.read_u8()?);
    // One-octet hash algorithm.
    let hash_alg = HashAlgorithm::from(i.read_u8()?);
    // Two-octet field holding left 16 bits of signed hash value.
    let digest_prefix = i.read_array::<2>()?;
    let signature = signature_values(pub_alg, i)?;

    let mut config = SignatureConfig::v3(typ, pub_alg, hash_alg, created, issuer);
    config.version = version;

    Ok(SignaturePacket {
        framing: packet_version.into(),
        config,
        digest_prefix,
        signature,
    })
}

/// Parse a v4 signature packet
/// Ref: <https://www.rfc-editor.org/rfc/rfc4880.html#section-5.2.3>
fn v4_parser<B: Buf>(packet_version: PacketHeaderVersion, i: &mut B) -> Result<SignaturePacket> {
    // One-octet signature type.
    let typ = SignatureType::from(i.read_u8()?);
    // One-octet public-key algorithm.
    let pub_alg = PublicKeyAlgorithm::from(i.read_u8()?);
    // One-octet hash algorithm.
    let hash_alg = HashAlgorithm::from(i.read_u8()?);

    // Two-octet scalar octet count for following hashed subpacket data.
    let hashed_len = i.read_be_u16()?;
    let hashed_subpackets = SubpacketVector::from_buf(i.read_take(hashed_len.into())?)?;

    // Two-octet scalar octet count for the following unhashed subpacket data.
    let unhashed_len = i.read_be_u16()?;
    let unhashed_subpackets = SubpacketVector::from_buf(i.read_take(unhashed_len.into())?)?;

    // Two-octet field holding the left 16 bits of the signed hash value.
    let digest_prefix = i.read_array::<2>()?;
    let signature = signature_values(pub_alg, i)?;

    debug!(
        "v4 signature {:?} {:?} {:?}, {} hashed / {} unhashed subpackets",
        typ,
        pub_alg,
        hash_alg,
        hashed_subpackets.len(),
        unhashed_subpackets.len()
    );

    Ok(SignaturePacket {
        framing: packet_version.into(),
        config: SignatureConfig::v4(
            typ,
            pub_alg,
            hash_alg,
            hashed_subpackets,
            unhashed_subpackets,
        ),
        digest_prefix,
        signature,
    })
}

/// Reads the algorithm specific signature values, up to the end of the packet.
fn signature_values<B: Buf>(alg: PublicKeyAlgorithm, i: &mut B) -> Result<SignatureBytes> {
    let count = match alg {
        PublicKeyAlgorithm::RSA | PublicKeyAlgorithm::RSASign | PublicKeyAlgorithm::RSAEncrypt => 1,
        PublicKeyAlgorithm::DSA
        | PublicKeyAlgorithm::ECDSA
        | PublicKeyAlgorithm::EdDSALegacy
        | PublicKeyAlgorithm::Elgamal => 2,
        _ => return Ok(SignatureBytes::Native(i.rest())),
    };

    let mut mpis = Vec::with_capacity(count);
    for _ in 0..count {
        mpis.push(Mpi::from_buf(i)?);
    }
    if i.has_remaining() {
        format_bail!("{} trailing octets after signature values", i.remaining());
    }

    Ok(SignatureBytes::Mpis(mpis))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::Error;
    use crate::ser::Serialize;

    #[test]
    fn test_v3_signature() {
        let raw = hex::decode("0305005f5e1000000102030405060701020abc0009016f").unwrap();
        let sig = SignaturePacket::from_buf(PacketHeaderVersion::Old, &mut &raw[..]).unwrap();
        assert_eq!(sig.version(), SignatureVersion::V3);
        assert_eq!(sig.typ(), SignatureType::Binary);
        assert_eq!(sig.created().unwrap().timestamp(), 0x5f5e_1000);
        assert_eq!(sig.issuer(), Some(KeyId::from(0x0001_0203_0405_0607u64)));
        assert_eq!(sig.pub_alg(), PublicKeyAlgorithm::RSA);
        assert_eq!(sig.hash_alg(), HashAlgorithm::Sha1);
        assert_eq!(sig.digest_prefix(), [0x0a, 0xbc]);
        assert_eq!(sig.signature().mpis().len(), 1);
        assert_eq!(sig.to_bytes().unwrap(), raw);
    }

    #[test]
    fn test_invalid_v3_hashed_len() {
        let raw = hex::decode("0306005f5e1000000102030405060701020abc0009016f").unwrap();
        let err = SignaturePacket::from_buf(PacketHeaderVersion::Old, &mut &raw[..]).unwrap_err();
        assert!(err.is_format(), "{:?}", err);
    }

    #[test]
    fn test_unsupported_version() {
        let raw = [6u8, 0, 1, 2];
        let err = SignaturePacket::from_buf(PacketHeaderVersion::New, &mut &raw[..]).unwrap_err();
        assert!(matches!(err, Error::Unsupported { .. }));
    }

    #[test]
    fn test_unknown_algorithm_values_are_native() {
        // v4, binary, algorithm 99, sha256, no subpackets
        let raw = hex::decode("04006308000000001234deadbeef").unwrap();
        let sig = SignaturePacket::from_buf(PacketHeaderVersion::New, &mut &raw[..]).unwrap();
        assert_eq!(
            sig.signature(),
            &SignatureBytes::Native(bytes::Bytes::from_static(&[0xde, 0xad, 0xbe, 0xef]))
        );
        assert_eq!(sig.to_bytes().unwrap(), raw);
    }
}
