use log::debug;

use crate::crypto::hash::HashAlgorithm;
use crate::crypto::public_key::PublicKeyAlgorithm;
use crate::crypto::{eddsa, rsa};
use crate::errors::{unsupported_err, Error, Result};
use crate::operator::{DigestCalculator, HashDigestCalculator};
use crate::packet::{PublicKeyPacket, SignatureBytes};

/// Checks signature values against everything written to it.
pub trait ContentVerifier {
    fn key_algorithm(&self) -> PublicKeyAlgorithm;
    fn hash_algorithm(&self) -> HashAlgorithm;

    fn update(&mut self, data: &[u8]);

    /// `Ok(false)` if the signature does not match, errors are reserved for values
    /// that can not be checked at all.
    fn verify(self: Box<Self>, digest_prefix: [u8; 2], signature: &SignatureBytes) -> Result<bool>;
}

/// Creates [ContentVerifier]s bound to a public key.
pub trait ContentVerifierBuilder {
    fn build(&self, key: &PublicKeyPacket) -> Result<Box<dyn ContentVerifier>>;
}

/// Hands out [ContentVerifierBuilder]s by algorithm pair.
pub trait ContentVerifierBuilderProvider {
    fn get(
        &self,
        key_algorithm: PublicKeyAlgorithm,
        hash_algorithm: HashAlgorithm,
    ) -> Result<Box<dyn ContentVerifierBuilder>>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultContentVerifierBuilderProvider;

impl ContentVerifierBuilderProvider for DefaultContentVerifierBuilderProvider {
    fn get(
        &self,
        key_algorithm: PublicKeyAlgorithm,
        hash_algorithm: HashAlgorithm,
    ) -> Result<Box<dyn ContentVerifierBuilder>> {
        Ok(Box::new(DefaultContentVerifierBuilder {
            key_algorithm,
            hash_algorithm,
        }))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DefaultContentVerifierBuilder {
    key_algorithm: PublicKeyAlgorithm,
    hash_algorithm: HashAlgorithm,
}

impl ContentVerifierBuilder for DefaultContentVerifierBuilder {
    fn build(&self, key: &PublicKeyPacket) -> Result<Box<dyn ContentVerifier>> {
        if !self.key_algorithm.same_family(key.algorithm()) {
            return Err(Error::KeyAlgorithmMismatch {
                expected: self.key_algorithm,
                actual: key.algorithm(),
            });
        }

        Ok(Box::new(DefaultContentVerifier {
            key_algorithm: self.key_algorithm,
            key: key.clone(),
            digest: Box::new(HashDigestCalculator::new(self.hash_algorithm)?),
        }))
    }
}

struct DefaultContentVerifier {
    key_algorithm: PublicKeyAlgorithm,
    key: PublicKeyPacket,
    digest: Box<dyn DigestCalculator>,
}

impl ContentVerifier for DefaultContentVerifier {
    fn key_algorithm(&self) -> PublicKeyAlgorithm {
        self.key_algorithm
    }

    fn hash_algorithm(&self) -> HashAlgorithm {
        self.digest.algorithm()
    }

    fn update(&mut self, data: &[u8]) {
        self.digest.update(data);
    }

    fn verify(self: Box<Self>, digest_prefix: [u8; 2], signature: &SignatureBytes) -> Result<bool> {
        let hash = self.digest.algorithm();
        let digest = self.digest.finish();
        if digest.len() < 2 || digest[..2] != digest_prefix {
            debug!(
                "digest prefix mismatch: {} != {}",
                hex::encode(&digest[..digest.len().min(2)]),
                hex::encode(digest_prefix)
            );
            return Ok(false);
        }

        let params = self.key.public_params();
        let res = match self.key_algorithm {
            PublicKeyAlgorithm::RSA | PublicKeyAlgorithm::RSASign => {
                rsa::verify(params, hash, &digest, signature.mpis())
            }
            PublicKeyAlgorithm::EdDSALegacy => eddsa::verify(params, &digest, signature.mpis()),
            alg => unsupported_err!("verifying {:?} signatures", alg),
        };

        match res {
            Ok(()) => Ok(true),
            Err(Error::Rsa { source }) => {
                debug!("rsa signature rejected: {}", source);
                Ok(false)
            }
            Err(Error::Ed25519 { source }) => {
                debug!("eddsa signature rejected: {}", source);
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }
}
