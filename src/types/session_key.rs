use byteorder::{BigEndian, ByteOrder, WriteBytesExt};
use zeroize::Zeroizing;

use crate::crypto::checksum;
use crate::crypto::sym::SymmetricKeyAlgorithm;
use crate::errors::{Error, Result};

/// A symmetric session key together with the algorithm it is used with.
#[derive(Clone, PartialEq, Eq, derive_more::Debug)]
pub struct SessionKey {
    algorithm: SymmetricKeyAlgorithm,
    #[debug("..")]
    key: Zeroizing<Vec<u8>>,
}

impl SessionKey {
    pub fn new(algorithm: SymmetricKeyAlgorithm, key: Zeroizing<Vec<u8>>) -> Self {
        SessionKey { algorithm, key }
    }

    pub fn algorithm(&self) -> SymmetricKeyAlgorithm {
        self.algorithm
    }

    pub fn key(&self) -> &[u8] {
        &self.key
    }

    /// `[algorithm][key]`, the form wrapped for passphrase recipients.
    pub fn to_unchecked_bytes(&self) -> Zeroizing<Vec<u8>> {
        let mut out = Zeroizing::new(Vec::with_capacity(1 + self.key.len()));
        out.push(self.algorithm.into());
        out.extend_from_slice(&self.key);
        out
    }

    /// `[algorithm][key][checksum]`, the form wrapped for public key recipients.
    pub fn to_checked_bytes(&self) -> Result<Zeroizing<Vec<u8>>> {
        let mut out = self.to_unchecked_bytes();
        out.write_u16::<BigEndian>(checksum::calculate_simple(&self.key))?;
        Ok(out)
    }

    /// Parses `[algorithm][key]`.
    ///
    /// An unknown algorithm or a key of the wrong size is reported as a checksum failure,
    /// it is what a wrong passphrase looks like.
    pub fn from_unchecked_bytes(data: &[u8]) -> Result<Self> {
        let (alg, key) = data.split_first().ok_or(Error::SessionKeyChecksum)?;
        let algorithm = SymmetricKeyAlgorithm::from(*alg);
        if !algorithm.is_supported() || algorithm.key_size() != key.len() {
            return Err(Error::SessionKeyChecksum);
        }

        Ok(SessionKey {
            algorithm,
            key: Zeroizing::new(key.to_vec()),
        })
    }

    /// Parses `[algorithm][key][checksum]` and validates the checksum.
    pub fn from_checked_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < 3 {
            return Err(Error::SessionKeyChecksum);
        }
        let (body, sum) = data.split_at(data.len() - 2);
        if BigEndian::read_u16(sum) != checksum::calculate_simple(&body[1..]) {
            return Err(Error::SessionKeyChecksum);
        }

        Self::from_unchecked_bytes(body)
    }
}
