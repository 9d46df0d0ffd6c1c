use log::debug;
use zeroize::Zeroizing;

use crate::composed::PrivateKey;
use crate::crypto::public_key::PublicKeyAlgorithm;
use crate::crypto::rsa;
use crate::errors::{unsupported_err, Error, Result};
use crate::operator::{CfbDataDecryptorFactory, DataDecryptor, DataDecryptorFactory};
use crate::packet::EncryptedSessionKey;
use crate::types::SessionKey;

/// Unwraps session keys encrypted to a public key.
pub trait PublicKeyDataDecryptorFactory: DataDecryptorFactory {
    /// Returns the decrypted `[algorithm][key][checksum]` session data.
    fn recover_session_data(
        &self,
        algorithm: PublicKeyAlgorithm,
        values: &EncryptedSessionKey,
    ) -> Result<Zeroizing<Vec<u8>>>;
}

/// RSA [PublicKeyDataDecryptorFactory].
#[derive(Debug, Clone)]
pub struct DefaultPublicKeyDataDecryptorFactory {
    key: PrivateKey,
    data: CfbDataDecryptorFactory,
}

impl DefaultPublicKeyDataDecryptorFactory {
    pub fn new(key: PrivateKey) -> Self {
        DefaultPublicKeyDataDecryptorFactory {
            key,
            data: CfbDataDecryptorFactory,
        }
    }
}

impl DataDecryptorFactory for DefaultPublicKeyDataDecryptorFactory {
    fn create_data_decryptor(
        &self,
        with_integrity: bool,
        key: &SessionKey,
    ) -> Result<Box<dyn DataDecryptor>> {
        self.data.create_data_decryptor(with_integrity, key)
    }
}

impl PublicKeyDataDecryptorFactory for DefaultPublicKeyDataDecryptorFactory {
    fn recover_session_data(
        &self,
        algorithm: PublicKeyAlgorithm,
        values: &EncryptedSessionKey,
    ) -> Result<Zeroizing<Vec<u8>>> {
        if !algorithm.same_family(self.key.algorithm()) {
            return Err(Error::KeyAlgorithmMismatch {
                expected: self.key.algorithm(),
                actual: algorithm,
            });
        }
        match (algorithm, values) {
            (
                PublicKeyAlgorithm::RSA | PublicKeyAlgorithm::RSAEncrypt,
                EncryptedSessionKey::Rsa { mpi },
            ) => {
                let key = rsa::private_key(
                    self.key.public_key_packet().public_params(),
                    self.key.secret_params(),
                )?;
                debug!("rsa session key for {}", self.key.key_id());
                rsa::decrypt(&key, std::slice::from_ref(mpi))
            }
            (alg, _) => unsupported_err!("session keys encrypted with {:?}", alg),
        }
    }
}
