use log::debug;
use rand::{CryptoRng, Rng};
use zeroize::Zeroizing;

use crate::crypto::hash::HashAlgorithm;
use crate::crypto::sym::SymmetricKeyAlgorithm;
use crate::errors::{ensure, Result};
use crate::operator::{CfbDataDecryptorFactory, DataDecryptor, DataDecryptorFactory};
use crate::types::{SessionKey, StringToKey};

/// Turns a passphrase into keys for passphrase encrypted data.
pub trait PbeDataDecryptorFactory: DataDecryptorFactory {
    fn make_key_from_passphrase(
        &self,
        algorithm: SymmetricKeyAlgorithm,
        s2k: &StringToKey,
    ) -> Result<Zeroizing<Vec<u8>>>;

    /// Unwraps the `[algorithm][key]` blob of a symmetric-key encrypted session key
    /// packet, `key` being the passphrase derived key for `algorithm`.
    fn recover_session_data(
        &self,
        algorithm: SymmetricKeyAlgorithm,
        key: &[u8],
        encrypted: &[u8],
    ) -> Result<SessionKey>;
}

/// [PbeDataDecryptorFactory] holding the passphrase.
#[derive(Clone, derive_more::Debug)]
pub struct DefaultPbeDataDecryptorFactory {
    #[debug("..")]
    passphrase: Zeroizing<Vec<u8>>,
    data: CfbDataDecryptorFactory,
}

impl DefaultPbeDataDecryptorFactory {
    pub fn new(passphrase: &[u8]) -> Self {
        DefaultPbeDataDecryptorFactory {
            passphrase: Zeroizing::new(passphrase.to_vec()),
            data: CfbDataDecryptorFactory,
        }
    }
}

impl DataDecryptorFactory for DefaultPbeDataDecryptorFactory {
    fn create_data_decryptor(
        &self,
        with_integrity: bool,
        key: &SessionKey,
    ) -> Result<Box<dyn DataDecryptor>> {
        self.data.create_data_decryptor(with_integrity, key)
    }
}

impl PbeDataDecryptorFactory for DefaultPbeDataDecryptorFactory {
    fn make_key_from_passphrase(
        &self,
        algorithm: SymmetricKeyAlgorithm,
        s2k: &StringToKey,
    ) -> Result<Zeroizing<Vec<u8>>> {
        s2k.derive_key(&self.passphrase, algorithm.key_size())
    }

    fn recover_session_data(
        &self,
        algorithm: SymmetricKeyAlgorithm,
        key: &[u8],
        encrypted: &[u8],
    ) -> Result<SessionKey> {
        let mut data = Zeroizing::new(encrypted.to_vec());
        let iv = vec![0u8; algorithm.block_size()];
        algorithm.decrypt_with_iv_regular(key, &iv, &mut data)?;
        debug!("unwrapped {} octets of session data", data.len());

        SessionKey::from_unchecked_bytes(&data)
    }
}

/// Supplies the protection for secret key material.
pub trait PbeSecretKeyEncryptor {
    fn algorithm(&self) -> SymmetricKeyAlgorithm;
    fn s2k(&self) -> &StringToKey;

    /// SHA-1 integrity check (usage 254) instead of the two octet checksum (usage 255).
    fn use_sha1(&self) -> bool;

    fn key(&self) -> Result<Zeroizing<Vec<u8>>>;
}

/// Derives the key protecting secret key material.
pub trait PbeSecretKeyDecryptor {
    fn make_key(
        &self,
        algorithm: SymmetricKeyAlgorithm,
        s2k: &StringToKey,
    ) -> Result<Zeroizing<Vec<u8>>>;
}

/// Iterated and salted S2K protection, the salt is chosen on construction.
#[derive(Clone, derive_more::Debug)]
pub struct DefaultPbeSecretKeyEncryptor {
    algorithm: SymmetricKeyAlgorithm,
    s2k: StringToKey,
    use_sha1: bool,
    #[debug("..")]
    passphrase: Zeroizing<Vec<u8>>,
}

impl DefaultPbeSecretKeyEncryptor {
    pub fn new<R: CryptoRng + Rng>(
        rng: R,
        passphrase: &[u8],
        algorithm: SymmetricKeyAlgorithm,
        hash: HashAlgorithm,
        count: u8,
    ) -> Result<Self> {
        ensure!(
            algorithm.is_supported(),
            "can not protect keys with {:?}",
            algorithm
        );
        Ok(DefaultPbeSecretKeyEncryptor {
            algorithm,
            s2k: StringToKey::new_iterated(rng, hash, count),
            use_sha1: true,
            passphrase: Zeroizing::new(passphrase.to_vec()),
        })
    }

    pub fn with_sha1_check(mut self, use_sha1: bool) -> Self {
        self.use_sha1 = use_sha1;
        self
    }
}

impl PbeSecretKeyEncryptor for DefaultPbeSecretKeyEncryptor {
    fn algorithm(&self) -> SymmetricKeyAlgorithm {
        self.algorithm
    }

    fn s2k(&self) -> &StringToKey {
        &self.s2k
    }

    fn use_sha1(&self) -> bool {
        self.use_sha1
    }

    fn key(&self) -> Result<Zeroizing<Vec<u8>>> {
        self.s2k.derive_key(&self.passphrase, self.algorithm.key_size())
    }
}

#[derive(Clone, derive_more::Debug)]
pub struct DefaultPbeSecretKeyDecryptor {
    #[debug("..")]
    passphrase: Zeroizing<Vec<u8>>,
}

impl DefaultPbeSecretKeyDecryptor {
    pub fn new(passphrase: &[u8]) -> Self {
        DefaultPbeSecretKeyDecryptor {
            passphrase: Zeroizing::new(passphrase.to_vec()),
        }
    }
}

impl PbeSecretKeyDecryptor for DefaultPbeSecretKeyDecryptor {
    fn make_key(
        &self,
        algorithm: SymmetricKeyAlgorithm,
        s2k: &StringToKey,
    ) -> Result<Zeroizing<Vec<u8>>> {
        s2k.derive_key(&self.passphrase, algorithm.key_size())
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;
    use crate::types::DEFAULT_ITER_COUNT;

    #[test]
    fn test_recover_session_data() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let alg = SymmetricKeyAlgorithm::AES256;
        let s2k = StringToKey::new_iterated(&mut rng, HashAlgorithm::Sha256, DEFAULT_ITER_COUNT);
        let factory = DefaultPbeDataDecryptorFactory::new(b"hunter2");
        let key = factory.make_key_from_passphrase(alg, &s2k).unwrap();
        assert_eq!(key.len(), 32);

        let session = SessionKey::new(
            SymmetricKeyAlgorithm::AES128,
            SymmetricKeyAlgorithm::AES128.new_session_key(&mut rng),
        );
        let mut wrapped = session.to_unchecked_bytes().to_vec();
        alg.encrypt_with_iv_regular(&key, &[0u8; 16], &mut wrapped)
            .unwrap();

        let back = factory.recover_session_data(alg, &key, &wrapped).unwrap();
        assert_eq!(back, session);

        let wrong = DefaultPbeDataDecryptorFactory::new(b"hunter3");
        let wrong_key = wrong.make_key_from_passphrase(alg, &s2k).unwrap();
        match wrong.recover_session_data(alg, &wrong_key, &wrapped) {
            Ok(garbage) => assert_ne!(garbage, session),
            Err(err) => assert!(err.is_data_validation(), "{:?}", err),
        }
    }

    #[test]
    fn test_secret_key_encryptor_matches_decryptor() {
        let rng = ChaCha8Rng::seed_from_u64(12);
        let enc = DefaultPbeSecretKeyEncryptor::new(
            rng,
            b"pw",
            SymmetricKeyAlgorithm::CAST5,
            HashAlgorithm::Sha1,
            DEFAULT_ITER_COUNT,
        )
        .unwrap();
        assert!(enc.use_sha1());
        assert!(!enc.clone().with_sha1_check(false).use_sha1());

        let dec = DefaultPbeSecretKeyDecryptor::new(b"pw");
        assert_eq!(
            enc.key().unwrap(),
            dec.make_key(enc.algorithm(), enc.s2k()).unwrap()
        );
        assert!(!format!("{:?}", enc).contains("pw"));
    }
}
