use std::io;

use chrono::{DateTime, Utc};
use log::debug;
use rand::{CryptoRng, Rng};

use crate::composed::PublicKey;
use crate::crypto::public_key::PublicKeyAlgorithm;
use crate::crypto::sym::SymmetricKeyAlgorithm;
use crate::crypto::{eddsa, rsa};
use crate::errors::{bail, ensure_eq, Result};
use crate::operator::{DigestFingerprintCalculator, PbeSecretKeyDecryptor, PbeSecretKeyEncryptor};
use crate::packet::{write_packet, PacketTrait, PublicKeyPacket, S2kUsage, SecretKeyPacket};
use crate::ser::Serialize;
use crate::types::{KeyId, PlainSecretParams, PublicParams, StringToKey};

/// Unprotected secret parameters, ready for signing or decryption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrivateKey {
    key_id: KeyId,
    public_packet: PublicKeyPacket,
    params: PlainSecretParams,
}

impl PrivateKey {
    pub fn new(key_id: KeyId, public_packet: PublicKeyPacket, params: PlainSecretParams) -> Self {
        PrivateKey {
            key_id,
            public_packet,
            params,
        }
    }

    pub fn key_id(&self) -> KeyId {
        self.key_id
    }

    pub fn public_key_packet(&self) -> &PublicKeyPacket {
        &self.public_packet
    }

    pub fn algorithm(&self) -> PublicKeyAlgorithm {
        self.public_packet.algorithm()
    }

    pub fn secret_params(&self) -> &PlainSecretParams {
        &self.params
    }
}

/// A public key and the matching private key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPair {
    public: PublicKey,
    private: PrivateKey,
}

impl KeyPair {
    pub fn new(public: PublicKey, private: PrivateKey) -> Result<Self> {
        ensure_eq!(
            public.key_id(),
            private.key_id(),
            "public and private key do not belong together"
        );
        Ok(KeyPair { public, private })
    }

    /// Builds a v4 key pair from raw parameters.
    pub fn from_params(
        algorithm: PublicKeyAlgorithm,
        created_at: DateTime<Utc>,
        public_params: PublicParams,
        secret_params: PlainSecretParams,
    ) -> Result<Self> {
        let packet = PublicKeyPacket::new(algorithm, created_at, public_params);
        let public = PublicKey::new(packet.clone(), &DigestFingerprintCalculator::default())?;
        let private = PrivateKey::new(public.key_id(), packet, secret_params);

        Ok(KeyPair { public, private })
    }

    pub fn generate_rsa<R: Rng + CryptoRng>(
        rng: &mut R,
        bits: usize,
        created_at: DateTime<Utc>,
    ) -> Result<Self> {
        let (public, secret) = rsa::generate_key(rng, bits)?;
        let pair = Self::from_params(PublicKeyAlgorithm::RSA, created_at, public, secret)?;
        debug!("generated {} bit rsa key {}", bits, pair.key_id());
        Ok(pair)
    }

    pub fn generate_ed25519<R: Rng + CryptoRng>(
        rng: &mut R,
        created_at: DateTime<Utc>,
    ) -> Result<Self> {
        let (public, secret) = eddsa::generate_key(rng);
        let pair = Self::from_params(PublicKeyAlgorithm::EdDSALegacy, created_at, public, secret)?;
        debug!("generated ed25519 key {}", pair.key_id());
        Ok(pair)
    }

    pub fn public(&self) -> &PublicKey {
        &self.public
    }

    pub fn private(&self) -> &PrivateKey {
        &self.private
    }

    pub fn key_id(&self) -> KeyId {
        self.public.key_id()
    }
}

/// A secret key packet together with the public view of the key, certifications included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretKey {
    packet: SecretKeyPacket,
    public: PublicKey,
}

impl SecretKey {
    /// Protects the private half of `pair` with `encryptor`, or stores it in the clear if
    /// there is none.
    pub fn new<R: Rng + CryptoRng>(
        rng: R,
        pair: &KeyPair,
        is_master: bool,
        encryptor: Option<&dyn PbeSecretKeyEncryptor>,
    ) -> Result<Self> {
        let public = pair.public().clone().with_subkey_framing(!is_master);
        let packet = seal(rng, public.packet().clone(), pair.private(), encryptor)?;
        Ok(SecretKey { packet, public })
    }

    pub(crate) fn from_parts(packet: SecretKeyPacket, public: PublicKey) -> Self {
        SecretKey { packet, public }
    }

    pub fn packet(&self) -> &SecretKeyPacket {
        &self.packet
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    pub fn key_id(&self) -> KeyId {
        self.public.key_id()
    }

    pub fn is_master_key(&self) -> bool {
        self.public.is_master_key()
    }

    /// True for GnuPG stubs without secret material.
    pub fn is_private_key_empty(&self) -> bool {
        self.packet.is_private_key_empty()
    }

    pub fn key_encryption_algorithm(&self) -> SymmetricKeyAlgorithm {
        self.packet.sym_algorithm()
    }

    pub fn s2k(&self) -> Option<&StringToKey> {
        self.packet.s2k()
    }

    pub fn s2k_usage(&self) -> S2kUsage {
        self.packet.usage()
    }

    /// Decrypts the secret parameters. `decryptor` may be `None` for unprotected keys.
    ///
    /// A wrong passphrase fails the checksum and returns [crate::errors::Error::SecretKeyChecksum].
    pub fn extract_private_key(
        &self,
        decryptor: Option<&dyn PbeSecretKeyDecryptor>,
    ) -> Result<PrivateKey> {
        let key = match (self.packet.key_s2k(), decryptor) {
            (None, _) => None,
            (Some(s2k), Some(decryptor)) => {
                Some(decryptor.make_key(self.packet.sym_algorithm(), &s2k)?)
            }
            (Some(_), None) => bail!("secret key {} is protected", self.key_id()),
        };
        let params = self.packet.decrypt(key.as_ref().map(|k| k.as_slice()))?;
        debug!("extracted private key {}", self.key_id());

        Ok(PrivateKey::new(
            self.key_id(),
            self.public.packet().clone(),
            params,
        ))
    }

    /// Returns a copy protected by `new`, after unlocking with `old`.
    pub fn copy_with_new_password<R: Rng + CryptoRng>(
        &self,
        rng: R,
        old: Option<&dyn PbeSecretKeyDecryptor>,
        new: Option<&dyn PbeSecretKeyEncryptor>,
    ) -> Result<SecretKey> {
        if self.is_private_key_empty() {
            debug!("key {} has no secret material to re-protect", self.key_id());
            return Ok(self.clone());
        }
        let private = self.extract_private_key(old)?;
        let packet = seal(rng, self.public.packet().clone(), &private, new)?;

        Ok(SecretKey {
            packet,
            public: self.public.clone(),
        })
    }

    /// Returns a copy using `public` for the public view, which must be the same key in
    /// the same role, master or subkey.
    pub fn replace_public_key(&self, public: PublicKey) -> Result<SecretKey> {
        ensure_eq!(
            self.key_id(),
            public.key_id(),
            "replacement public key has a different key id"
        );
        ensure_eq!(
            self.packet.is_subkey(),
            public.packet().is_subkey(),
            "replacement public key packet is in the other master/subkey role"
        );
        ensure_eq!(
            self.is_master_key(),
            public.is_master_key(),
            "replacement public key is in the other master/subkey role"
        );
        Ok(SecretKey {
            packet: self.packet.clone(),
            public,
        })
    }
}

fn seal<R: Rng + CryptoRng>(
    rng: R,
    details: PublicKeyPacket,
    private: &PrivateKey,
    encryptor: Option<&dyn PbeSecretKeyEncryptor>,
) -> Result<SecretKeyPacket> {
    match encryptor {
        Some(enc) if enc.algorithm() != SymmetricKeyAlgorithm::Plaintext => {
            let key = enc.key()?;
            SecretKeyPacket::new_protected(
                rng,
                details,
                private.secret_params(),
                enc.algorithm(),
                enc.s2k().clone(),
                &key,
                enc.use_sha1(),
            )
        }
        _ => SecretKeyPacket::new_unprotected(details, private.secret_params()),
    }
}

impl Serialize for SecretKey {
    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        write_packet(writer, &self.packet)?;
        self.public.certifications_to_writer(writer)
    }

    fn write_len(&self) -> usize {
        self.packet.write_len_with_header() + self.public.certifications_write_len()
    }
}

super::impl_encode!(SecretKey);
