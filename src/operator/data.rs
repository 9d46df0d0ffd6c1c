use log::debug;

use crate::crypto::hash::HashAlgorithm;
use crate::crypto::sym::{CfbDirection, CfbStream, SymmetricKeyAlgorithm};
use crate::errors::{ensure, Result};
use crate::operator::{DigestCalculator, HashDigestCalculator};
use crate::types::SessionKey;

/// Encrypts the body of an encrypted data packet, prefix included.
pub trait DataEncryptor {
    fn algorithm(&self) -> SymmetricKeyAlgorithm;
    fn block_size(&self) -> usize;

    /// Encrypts `data` in place, continuing where the previous call left off.
    fn encrypt(&mut self, data: &mut [u8]) -> Result<()>;

    /// The calculator for the modification detection code, `None` for unprotected data.
    /// Handed out once.
    fn integrity_calculator(&mut self) -> Option<Box<dyn DigestCalculator>>;
}

/// Creates [DataEncryptor]s for a session key.
pub trait DataEncryptorBuilder {
    fn algorithm(&self) -> SymmetricKeyAlgorithm;
    fn is_integrity_protected(&self) -> bool;
    fn build(&self, key: &[u8]) -> Result<Box<dyn DataEncryptor>>;
}

/// Decrypts the body of an encrypted data packet, prefix included.
pub trait DataDecryptor {
    fn algorithm(&self) -> SymmetricKeyAlgorithm;
    fn block_size(&self) -> usize;
    fn decrypt(&mut self, data: &mut [u8]) -> Result<()>;
    fn integrity_calculator(&mut self) -> Option<Box<dyn DigestCalculator>>;
}

/// Creates [DataDecryptor]s once a session key has been recovered.
pub trait DataDecryptorFactory {
    fn create_data_decryptor(
        &self,
        with_integrity: bool,
        key: &SessionKey,
    ) -> Result<Box<dyn DataDecryptor>>;
}

/// OpenPGP CFB, with resynchronisation for legacy data and plain CFB plus a SHA-1
/// modification detection code for integrity protected data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CfbDataEncryptorBuilder {
    algorithm: SymmetricKeyAlgorithm,
    integrity: bool,
}

impl CfbDataEncryptorBuilder {
    pub fn new(algorithm: SymmetricKeyAlgorithm) -> Self {
        CfbDataEncryptorBuilder {
            algorithm,
            integrity: false,
        }
    }

    pub fn with_integrity_packet(mut self, integrity: bool) -> Self {
        self.integrity = integrity;
        self
    }
}

impl DataEncryptorBuilder for CfbDataEncryptorBuilder {
    fn algorithm(&self) -> SymmetricKeyAlgorithm {
        self.algorithm
    }

    fn is_integrity_protected(&self) -> bool {
        self.integrity
    }

    fn build(&self, key: &[u8]) -> Result<Box<dyn DataEncryptor>> {
        Ok(Box::new(CfbDataCipher::new(
            self.algorithm,
            key,
            CfbDirection::Encrypt,
            self.integrity,
        )?))
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct CfbDataDecryptorFactory;

impl DataDecryptorFactory for CfbDataDecryptorFactory {
    fn create_data_decryptor(
        &self,
        with_integrity: bool,
        key: &SessionKey,
    ) -> Result<Box<dyn DataDecryptor>> {
        Ok(Box::new(CfbDataCipher::new(
            key.algorithm(),
            key.key(),
            CfbDirection::Decrypt,
            with_integrity,
        )?))
    }
}

struct CfbDataCipher {
    stream: CfbStream,
    integrity: Option<Box<dyn DigestCalculator>>,
}

impl CfbDataCipher {
    fn new(
        algorithm: SymmetricKeyAlgorithm,
        key: &[u8],
        direction: CfbDirection,
        integrity: bool,
    ) -> Result<Self> {
        ensure!(
            algorithm.is_supported(),
            "can not encrypt data with {:?}",
            algorithm
        );
        debug!("data cipher {:?} {:?} integrity={}", algorithm, direction, integrity);
        let integrity: Option<Box<dyn DigestCalculator>> = if integrity {
            Some(Box::new(HashDigestCalculator::new(HashAlgorithm::Sha1)?))
        } else {
            None
        };

        Ok(CfbDataCipher {
            // legacy data resyncs after the prefix, protected data is plain CFB
            stream: CfbStream::new(algorithm, key, direction, integrity.is_none())?,
            integrity,
        })
    }
}

impl DataEncryptor for CfbDataCipher {
    fn algorithm(&self) -> SymmetricKeyAlgorithm {
        self.stream.algorithm()
    }

    fn block_size(&self) -> usize {
        self.stream.block_size()
    }

    fn encrypt(&mut self, data: &mut [u8]) -> Result<()> {
        self.stream.apply(data)
    }

    fn integrity_calculator(&mut self) -> Option<Box<dyn DigestCalculator>> {
        self.integrity.take()
    }
}

impl DataDecryptor for CfbDataCipher {
    fn algorithm(&self) -> SymmetricKeyAlgorithm {
        self.stream.algorithm()
    }

    fn block_size(&self) -> usize {
        self.stream.block_size()
    }

    fn decrypt(&mut self, data: &mut [u8]) -> Result<()> {
        self.stream.apply(data)
    }

    fn integrity_calculator(&mut self) -> Option<Box<dyn DigestCalculator>> {
        self.integrity.take()
    }
}
