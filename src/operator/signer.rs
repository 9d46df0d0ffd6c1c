use log::debug;

use crate::composed::PrivateKey;
use crate::crypto::hash::HashAlgorithm;
use crate::crypto::public_key::PublicKeyAlgorithm;
use crate::crypto::{eddsa, rsa};
use crate::errors::{unsupported_err, Error, Result};
use crate::operator::{DigestCalculator, HashDigestCalculator};
use crate::packet::{SignatureBytes, SignatureType};
use crate::types::KeyId;

/// Produces the signature values over everything written to it.
///
/// A signer is bound to a single key and is used for exactly one signature.
pub trait ContentSigner {
    fn key_algorithm(&self) -> PublicKeyAlgorithm;
    fn hash_algorithm(&self) -> HashAlgorithm;
    fn signature_type(&self) -> SignatureType;
    fn key_id(&self) -> KeyId;

    fn update(&mut self, data: &[u8]);

    /// Finishes the digest and signs it, returning the digest and the signature values.
    fn sign(self: Box<Self>) -> Result<(Vec<u8>, SignatureBytes)>;
}

/// Creates [ContentSigner]s for a fixed key and hash algorithm.
pub trait ContentSignerBuilder {
    fn key_algorithm(&self) -> PublicKeyAlgorithm;
    fn hash_algorithm(&self) -> HashAlgorithm;

    /// Fails with [Error::KeyAlgorithmMismatch] if `key` is not a key of
    /// [ContentSignerBuilder::key_algorithm].
    fn build(&self, typ: SignatureType, key: &PrivateKey) -> Result<Box<dyn ContentSigner>>;
}

/// RSA (PKCS#1 v1.5) and EdDSA signers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DefaultContentSignerBuilder {
    key_algorithm: PublicKeyAlgorithm,
    hash_algorithm: HashAlgorithm,
}

impl DefaultContentSignerBuilder {
    pub fn new(key_algorithm: PublicKeyAlgorithm, hash_algorithm: HashAlgorithm) -> Self {
        DefaultContentSignerBuilder {
            key_algorithm,
            hash_algorithm,
        }
    }
}

impl ContentSignerBuilder for DefaultContentSignerBuilder {
    fn key_algorithm(&self) -> PublicKeyAlgorithm {
        self.key_algorithm
    }

    fn hash_algorithm(&self) -> HashAlgorithm {
        self.hash_algorithm
    }

    fn build(&self, typ: SignatureType, key: &PrivateKey) -> Result<Box<dyn ContentSigner>> {
        if !self.key_algorithm.same_family(key.algorithm()) {
            return Err(Error::KeyAlgorithmMismatch {
                expected: self.key_algorithm,
                actual: key.algorithm(),
            });
        }
        if !matches!(
            self.key_algorithm,
            PublicKeyAlgorithm::RSA | PublicKeyAlgorithm::RSASign | PublicKeyAlgorithm::EdDSALegacy
        ) {
            unsupported_err!("signing with {:?}", self.key_algorithm);
        }
        debug!(
            "signer {:?}/{:?} for {:?} with key {}",
            self.key_algorithm,
            self.hash_algorithm,
            typ,
            key.key_id()
        );

        Ok(Box::new(DefaultContentSigner {
            key_algorithm: self.key_algorithm,
            typ,
            key: key.clone(),
            digest: Box::new(HashDigestCalculator::new(self.hash_algorithm)?),
        }))
    }
}

struct DefaultContentSigner {
    key_algorithm: PublicKeyAlgorithm,
    typ: SignatureType,
    key: PrivateKey,
    digest: Box<dyn DigestCalculator>,
}

impl ContentSigner for DefaultContentSigner {
    fn key_algorithm(&self) -> PublicKeyAlgorithm {
        self.key_algorithm
    }

    fn hash_algorithm(&self) -> HashAlgorithm {
        self.digest.algorithm()
    }

    fn signature_type(&self) -> SignatureType {
        self.typ
    }

    fn key_id(&self) -> KeyId {
        self.key.key_id()
    }

    fn update(&mut self, data: &[u8]) {
        self.digest.update(data);
    }

    fn sign(self: Box<Self>) -> Result<(Vec<u8>, SignatureBytes)> {
        let hash = self.digest.algorithm();
        let digest = self.digest.finish();
        let public = self.key.public_key_packet().public_params();

        let mpis = match self.key_algorithm {
            PublicKeyAlgorithm::RSA | PublicKeyAlgorithm::RSASign => {
                let key = rsa::private_key(public, self.key.secret_params())?;
                rsa::sign(&key, hash, &digest)?
            }
            PublicKeyAlgorithm::EdDSALegacy => eddsa::sign(public, self.key.secret_params(), &digest)?,
            alg => unsupported_err!("signing with {:?}", alg),
        };

        Ok((digest, SignatureBytes::Mpis(mpis)))
    }
}
