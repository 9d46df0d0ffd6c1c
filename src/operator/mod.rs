//! # Operators
//!
//! The capabilities the protocol code consumes: digests, signers and verifiers, data
//! encryptors and decryptors, and the factories turning passphrases or private keys
//! into session keys. Each trait comes with a default implementation on top of
//! [crate::crypto].

mod data;
mod digest;
mod fingerprint;
mod pbe;
mod public_key;
mod signer;
mod verifier;

pub use self::{
    data::{
        CfbDataDecryptorFactory, CfbDataEncryptorBuilder, DataDecryptor, DataDecryptorFactory,
        DataEncryptor, DataEncryptorBuilder,
    },
    digest::{
        DefaultDigestCalculatorProvider, DigestCalculator, DigestCalculatorProvider,
        HashDigestCalculator,
    },
    fingerprint::{DigestFingerprintCalculator, KeyFingerprintCalculator},
    pbe::{
        DefaultPbeDataDecryptorFactory, DefaultPbeSecretKeyDecryptor,
        DefaultPbeSecretKeyEncryptor, PbeDataDecryptorFactory, PbeSecretKeyDecryptor,
        PbeSecretKeyEncryptor,
    },
    public_key::{DefaultPublicKeyDataDecryptorFactory, PublicKeyDataDecryptorFactory},
    signer::{ContentSigner, ContentSignerBuilder, DefaultContentSignerBuilder},
    verifier::{
        ContentVerifier, ContentVerifierBuilder, ContentVerifierBuilderProvider,
        DefaultContentVerifierBuilder, DefaultContentVerifierBuilderProvider,
    },
};
