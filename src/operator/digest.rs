use digest::DynDigest;

use crate::crypto::hash::HashAlgorithm;
use crate::errors::Result;

/// A running digest computation.
pub trait DigestCalculator {
    fn algorithm(&self) -> HashAlgorithm;

    fn update(&mut self, data: &[u8]);

    /// Consumes the calculator and returns the digest.
    fn finish(self: Box<Self>) -> Vec<u8>;
}

/// Creates [DigestCalculator]s for a given algorithm.
pub trait DigestCalculatorProvider {
    fn get(&self, algorithm: HashAlgorithm) -> Result<Box<dyn DigestCalculator>>;
}

/// [DigestCalculator] on top of the RustCrypto hashers.
pub struct HashDigestCalculator {
    algorithm: HashAlgorithm,
    hasher: Box<dyn DynDigest>,
}

impl std::fmt::Debug for HashDigestCalculator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HashDigestCalculator")
            .field("algorithm", &self.algorithm)
            .finish()
    }
}

impl HashDigestCalculator {
    pub fn new(algorithm: HashAlgorithm) -> Result<Self> {
        Ok(HashDigestCalculator {
            algorithm,
            hasher: algorithm.new_hasher()?,
        })
    }
}

impl DigestCalculator for HashDigestCalculator {
    fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    fn finish(self: Box<Self>) -> Vec<u8> {
        self.hasher.finalize().to_vec()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultDigestCalculatorProvider;

impl DigestCalculatorProvider for DefaultDigestCalculatorProvider {
    fn get(&self, algorithm: HashAlgorithm) -> Result<Box<dyn DigestCalculator>> {
        Ok(Box::new(HashDigestCalculator::new(algorithm)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_incremental_matches_oneshot() {
        let mut calc = DefaultDigestCalculatorProvider
            .get(HashAlgorithm::Sha256)
            .unwrap();
        assert_eq!(calc.algorithm(), HashAlgorithm::Sha256);
        calc.update(b"hello ");
        calc.update(b"world");
        assert_eq!(
            calc.finish(),
            HashAlgorithm::Sha256.digest(b"hello world").unwrap()
        );
    }

    #[test]
    fn test_unknown_hash() {
        assert!(HashDigestCalculator::new(HashAlgorithm::Other(200)).is_err());
    }
}
