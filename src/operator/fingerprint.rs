use log::trace;

use crate::crypto::hash::HashAlgorithm;
use crate::errors::{bail, unsupported_err, Result};
use crate::operator::{DefaultDigestCalculatorProvider, DigestCalculatorProvider};
use crate::packet::signature::preamble;
use crate::packet::PublicKeyPacket;
use crate::types::{Fingerprint, KeyVersion, PublicParams};

/// Computes the fingerprint of a key packet.
pub trait KeyFingerprintCalculator {
    fn fingerprint(&self, key: &PublicKeyPacket) -> Result<Fingerprint>;
}

/// Fingerprints as defined in RFC 4880, section 12.2.
///
/// v2 and v3 keys hash the RSA modulus and exponent, without their length prefixes,
/// with MD5. v4 keys hash `0x99`, the two octet length and the packet body with SHA-1.
pub struct DigestFingerprintCalculator {
    provider: Box<dyn DigestCalculatorProvider + Send + Sync>,
}

impl std::fmt::Debug for DigestFingerprintCalculator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DigestFingerprintCalculator").finish()
    }
}

impl Default for DigestFingerprintCalculator {
    fn default() -> Self {
        Self::new(DefaultDigestCalculatorProvider)
    }
}

impl DigestFingerprintCalculator {
    pub fn new(provider: impl DigestCalculatorProvider + Send + Sync + 'static) -> Self {
        DigestFingerprintCalculator {
            provider: Box::new(provider),
        }
    }
}

impl KeyFingerprintCalculator for DigestFingerprintCalculator {
    fn fingerprint(&self, key: &PublicKeyPacket) -> Result<Fingerprint> {
        let (algorithm, input) = match key.version() {
            KeyVersion::V2 | KeyVersion::V3 => match key.public_params() {
                PublicParams::Rsa { n, e } => {
                    let mut input = n.as_bytes().to_vec();
                    input.extend_from_slice(e.as_bytes());
                    (HashAlgorithm::Md5, input)
                }
                _ => bail!("v3 keys must be RSA keys"),
            },
            KeyVersion::V4 => (HashAlgorithm::Sha1, preamble::key(key)?),
            KeyVersion::Other(v) => unsupported_err!("fingerprint of key version {}", v),
        };

        let mut calc = self.provider.get(algorithm)?;
        calc.update(&input);
        let digest = calc.finish();
        trace!("fingerprint {} over {} octets", hex::encode(&digest), input.len());

        Fingerprint::new(key.version(), &digest)
    }
}

#[cfg(test)]
mod tests {
    use bytes::Buf;

    use super::*;
    use crate::crypto::public_key::PublicKeyAlgorithm;
    use crate::ser::{u32_to_time, Serialize};
    use crate::types::{KeyId, Mpi, PacketHeaderVersion};

    fn rsa_key(n: &[u8]) -> PublicKeyPacket {
        PublicKeyPacket::new(
            PublicKeyAlgorithm::RSA,
            u32_to_time(1_500_000_000),
            PublicParams::Rsa {
                n: Mpi::from_slice(n),
                e: Mpi::from_slice(&[1, 0, 1]),
            },
        )
    }

    #[test]
    fn test_v4_fingerprint() {
        let key = rsa_key(&[0xC3; 64]);
        let calc = DigestFingerprintCalculator::default();
        let fp = calc.fingerprint(&key).unwrap();

        let expected = HashAlgorithm::Sha1.digest(&preamble::key(&key).unwrap()).unwrap();
        assert_eq!(fp.as_bytes(), &expected[..]);
        assert_eq!(key.key_id_for(&fp), KeyId::from_slice(&expected[12..]).unwrap());
    }

    #[test]
    fn test_fingerprint_is_deterministic() {
        let calc = DigestFingerprintCalculator::default();
        let key = rsa_key(&[0xC3; 64]);
        assert_eq!(calc.fingerprint(&key).unwrap(), calc.fingerprint(&key).unwrap());

        let mut n = [0xC3; 64];
        n[63] = 0xC4;
        assert_ne!(
            calc.fingerprint(&key).unwrap(),
            calc.fingerprint(&rsa_key(&n)).unwrap()
        );
    }

    #[test]
    fn test_v3_fingerprint() {
        let params = rsa_key(&[0xC3; 64]).public_params().to_bytes().unwrap();
        let mut raw = vec![3, 0, 0, 0, 1, 0, 0, 1];
        raw.extend_from_slice(&params);
        let mut body = bytes::Bytes::from(raw);
        let key = PublicKeyPacket::from_buf(PacketHeaderVersion::Old, false, &mut body).unwrap();
        assert!(!body.has_remaining());

        let fp = DigestFingerprintCalculator::default().fingerprint(&key).unwrap();
        let mut input = vec![0xC3; 64];
        input.extend_from_slice(&[1, 0, 1]);
        assert_eq!(fp.as_bytes(), &HashAlgorithm::Md5.digest(&input).unwrap()[..]);
        assert_eq!(fp.version(), KeyVersion::V3);
    }
}
