use std::time::Duration;

use chrono::SubsecRound;
use derive_builder::Builder;
use log::debug;
use rand::{CryptoRng, Rng};
use smallvec::SmallVec;

use crate::composed::{
    KeyPair, PublicKey, PublicKeyRing, SecretKey, SecretKeyRing, SignatureGenerator,
};
use crate::crypto::hash::HashAlgorithm;
use crate::crypto::public_key::PublicKeyAlgorithm;
use crate::crypto::sym::SymmetricKeyAlgorithm;
use crate::errors::{ensure, Result};
use crate::operator::{
    ContentSignerBuilder, DefaultContentSignerBuilder, DefaultPbeSecretKeyEncryptor,
    PbeSecretKeyEncryptor,
};
use crate::packet::{KeyFlags, SignatureType, SubpacketVector, SubpacketVectorGenerator, UserId};
use crate::types::{CompressionAlgorithm, DEFAULT_ITER_COUNT};

/// Features subpacket flag announcing support for modification detection.
const FEATURE_MDC: u8 = 0x01;

/// Assembles a secret key ring from key pairs.
///
/// The master key certifies the primary user id on construction, every subkey added
/// afterwards is bound to it with a subkey binding signature.
pub struct KeyRingGenerator<'a> {
    signer_builder: &'a dyn ContentSignerBuilder,
    encryptor: Option<&'a dyn PbeSecretKeyEncryptor>,
    master: KeyPair,
    /// The certified master key, followed by the bound subkeys.
    keys: Vec<(KeyPair, bool)>,
}

impl std::fmt::Debug for KeyRingGenerator<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyRingGenerator")
            .field("master", &self.master.key_id())
            .field("keys", &self.keys.len())
            .field("protected", &self.encryptor.is_some())
            .finish()
    }
}

impl<'a> KeyRingGenerator<'a> {
    /// Certifies `id` on `master` with a `certification_type` signature carrying the
    /// given subpackets.
    pub fn new(
        certification_type: SignatureType,
        master: KeyPair,
        id: &str,
        hashed: SubpacketVector,
        unhashed: SubpacketVector,
        signer_builder: &'a dyn ContentSignerBuilder,
        encryptor: Option<&'a dyn PbeSecretKeyEncryptor>,
    ) -> Result<Self> {
        ensure!(
            certification_type.is_certification(),
            "{:?} is not a certification type",
            certification_type
        );
        let mut generator = KeyRingGenerator {
            signer_builder,
            encryptor,
            master: master.clone(),
            keys: vec![(master, true)],
        };
        generator.add_user_id(certification_type, id, hashed, unhashed)?;
        Ok(generator)
    }

    /// Certifies a further user id on the master key.
    pub fn add_user_id(
        &mut self,
        certification_type: SignatureType,
        id: &str,
        hashed: SubpacketVector,
        unhashed: SubpacketVector,
    ) -> Result<()> {
        let uid = UserId::from_str(Default::default(), id);
        let mut sig_gen = SignatureGenerator::new(self.signer_builder);
        sig_gen
            .set_hashed_subpackets(hashed)
            .set_unhashed_subpackets(unhashed);
        sig_gen.init(certification_type, self.master.private())?;
        let cert = sig_gen.generate_certification_user_id(&uid, self.master.public())?;

        let master = &mut self.keys[0].0;
        let public = master.public().add_certification_user_id(&uid, cert);
        *master = KeyPair::new(public, master.private().clone())?;
        debug!("certified user id {:?} on {}", id, self.master.key_id());
        Ok(())
    }

    /// Binds `pair` as a subkey of the master key.
    pub fn add_subkey(
        &mut self,
        pair: &KeyPair,
        hashed: SubpacketVector,
        unhashed: SubpacketVector,
    ) -> Result<()> {
        self.bind_subkey(pair, hashed, unhashed)
    }

    /// Binds a signing subkey, embedding the primary key binding signature the subkey
    /// makes over the master key. `backsig_builder` signs with the subkey.
    pub fn add_subkey_with_backsig(
        &mut self,
        pair: &KeyPair,
        backsig_builder: &dyn ContentSignerBuilder,
        hashed: SubpacketVector,
        unhashed: SubpacketVector,
    ) -> Result<()> {
        let mut sig_gen = SignatureGenerator::new(backsig_builder);
        sig_gen.init(SignatureType::KeyBinding, pair.private())?;
        let backsig = sig_gen.generate_certification_subkey(self.master.public(), pair.public())?;

        let mut packets = hashed.to_vec();
        let mut embedded = SubpacketVectorGenerator::new();
        embedded.set_embedded_signature(false, backsig.packet().clone())?;
        packets.extend(embedded.generate().to_vec());

        self.bind_subkey(pair, SubpacketVector::new(packets), unhashed)
    }

    fn bind_subkey(
        &mut self,
        pair: &KeyPair,
        hashed: SubpacketVector,
        unhashed: SubpacketVector,
    ) -> Result<()> {
        let mut sig_gen = SignatureGenerator::new(self.signer_builder);
        sig_gen
            .set_hashed_subpackets(hashed)
            .set_unhashed_subpackets(unhashed);
        sig_gen.init(SignatureType::SubkeyBinding, self.master.private())?;
        let binding = sig_gen.generate_certification_subkey(self.master.public(), pair.public())?;

        let public = pair
            .public()
            .clone()
            .with_subkey_framing(true)
            .add_certification(binding);
        self.keys
            .push((KeyPair::new(public, pair.private().clone())?, false));
        debug!("bound subkey {} to {}", pair.key_id(), self.master.key_id());
        Ok(())
    }

    pub fn generate_secret_key_ring<R: Rng + CryptoRng>(&self, rng: &mut R) -> Result<SecretKeyRing> {
        let keys = self
            .keys
            .iter()
            .map(|(pair, is_master)| SecretKey::new(&mut *rng, pair, *is_master, self.encryptor))
            .collect::<Result<Vec<_>>>()?;
        SecretKeyRing::new(keys, Vec::new())
    }

    pub fn generate_public_key_ring(&self) -> Result<PublicKeyRing> {
        let keys = self
            .keys
            .iter()
            .map(|(pair, is_master)| pair.public().clone().with_subkey_framing(!is_master))
            .collect::<Vec<PublicKey>>();
        PublicKeyRing::new(keys)
    }
}

/// Algorithm and size of a generated key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyType {
    /// RSA with the given modulus size in bits.
    Rsa(usize),
    /// Ed25519 in the legacy EdDSA framing, signing only.
    Ed25519,
}

impl KeyType {
    pub fn algorithm(self) -> PublicKeyAlgorithm {
        match self {
            KeyType::Rsa(_) => PublicKeyAlgorithm::RSA,
            KeyType::Ed25519 => PublicKeyAlgorithm::EdDSALegacy,
        }
    }

    pub fn generate<R: Rng + CryptoRng>(
        self,
        rng: &mut R,
        created_at: chrono::DateTime<chrono::Utc>,
    ) -> Result<KeyPair> {
        match self {
            KeyType::Rsa(bits) => KeyPair::generate_rsa(rng, bits, created_at),
            KeyType::Ed25519 => KeyPair::generate_ed25519(rng, created_at),
        }
    }

    fn validate(self, can_encrypt: bool) -> std::result::Result<(), String> {
        match self {
            KeyType::Rsa(bits) if bits < 1024 => {
                Err(format!("{bits} bit RSA keys are too small"))
            }
            KeyType::Ed25519 if can_encrypt => Err("Ed25519 keys can only sign".into()),
            _ => Ok(()),
        }
    }
}

/// Everything needed to generate a complete secret key ring.
#[derive(Debug, Clone, PartialEq, Eq, Builder)]
#[builder(build_fn(validate = "Self::validate"))]
pub struct KeyRingParams {
    key_type: KeyType,

    // -- Keyflags
    #[builder(default = "true")]
    can_certify: bool,
    #[builder(default)]
    can_sign: bool,
    #[builder(default)]
    can_encrypt: bool,

    // -- Preferences
    #[builder(default)]
    preferred_symmetric_algorithms: SmallVec<[SymmetricKeyAlgorithm; 8]>,
    #[builder(default)]
    preferred_hash_algorithms: SmallVec<[HashAlgorithm; 8]>,
    #[builder(default)]
    preferred_compression_algorithms: SmallVec<[CompressionAlgorithm; 8]>,

    primary_user_id: String,
    #[builder(default)]
    user_ids: Vec<String>,
    #[builder(default = "SignatureType::CertPositive")]
    certification_type: SignatureType,

    #[builder(default)]
    passphrase: Option<String>,
    /// Cipher protecting the secret keys.
    #[builder(default = "SymmetricKeyAlgorithm::AES128")]
    sym_algorithm: SymmetricKeyAlgorithm,
    #[builder(default = "HashAlgorithm::Sha256")]
    s2k_hash: HashAlgorithm,
    #[builder(default = "DEFAULT_ITER_COUNT")]
    s2k_count: u8,
    #[builder(default = "HashAlgorithm::Sha256")]
    signature_hash: HashAlgorithm,

    #[builder(default = "chrono::Utc::now().trunc_subsecs(0)")]
    created_at: chrono::DateTime<chrono::Utc>,
    #[builder(default)]
    expiration: Option<Duration>,

    #[builder(default)]
    subkeys: Vec<SubkeyParams>,
}

impl KeyRingParamsBuilder {
    fn validate(&self) -> std::result::Result<(), String> {
        if let Some(key_type) = self.key_type {
            key_type.validate(self.can_encrypt.unwrap_or_default())?;
        }
        if self.primary_user_id.as_ref().is_some_and(|id| id.is_empty()) {
            return Err("primary user id must not be empty".into());
        }
        if let Some(typ) = self.certification_type {
            if !typ.is_certification() {
                return Err(format!("{typ:?} is not a certification type"));
            }
        }
        Ok(())
    }
}

/// Settings for one subkey.
#[derive(Debug, Clone, PartialEq, Eq, Builder)]
#[builder(build_fn(validate = "Self::validate"))]
pub struct SubkeyParams {
    key_type: KeyType,

    #[builder(default)]
    can_sign: bool,
    #[builder(default)]
    can_encrypt: bool,
    #[builder(default)]
    can_authenticate: bool,

    #[builder(default = "chrono::Utc::now().trunc_subsecs(0)")]
    created_at: chrono::DateTime<chrono::Utc>,
    #[builder(default)]
    expiration: Option<Duration>,
}

impl SubkeyParamsBuilder {
    fn validate(&self) -> std::result::Result<(), String> {
        match self.key_type {
            Some(key_type) => key_type.validate(self.can_encrypt.unwrap_or_default()),
            None => Ok(()),
        }
    }
}

fn expiration_secs(expiration: Option<Duration>) -> Result<Option<u32>> {
    Ok(match expiration {
        Some(d) => Some(u32::try_from(d.as_secs())?),
        None => None,
    })
}

impl KeyRingParams {
    /// Generates all keys, certifies the user ids and binds the subkeys.
    pub fn generate<R: Rng + CryptoRng>(&self, rng: &mut R) -> Result<SecretKeyRing> {
        let master = self.key_type.generate(rng, self.created_at)?;
        let signer = DefaultContentSignerBuilder::new(self.key_type.algorithm(), self.signature_hash);
        let encryptor = match &self.passphrase {
            Some(passphrase) => Some(DefaultPbeSecretKeyEncryptor::new(
                &mut *rng,
                passphrase.as_bytes(),
                self.sym_algorithm,
                self.s2k_hash,
                self.s2k_count,
            )?),
            None => None,
        };

        let mut generator = KeyRingGenerator::new(
            self.certification_type,
            master,
            &self.primary_user_id,
            self.certification_subpackets(true)?,
            SubpacketVector::default(),
            &signer,
            encryptor.as_ref().map(|e| e as &dyn PbeSecretKeyEncryptor),
        )?;
        for id in &self.user_ids {
            generator.add_user_id(
                self.certification_type,
                id,
                self.certification_subpackets(false)?,
                SubpacketVector::default(),
            )?;
        }

        for params in &self.subkeys {
            let pair = params.key_type.generate(rng, params.created_at)?;
            let hashed = params.binding_subpackets()?;
            if params.can_sign {
                let backsig = DefaultContentSignerBuilder::new(
                    params.key_type.algorithm(),
                    self.signature_hash,
                );
                generator.add_subkey_with_backsig(
                    &pair,
                    &backsig,
                    hashed,
                    SubpacketVector::default(),
                )?;
            } else {
                generator.add_subkey(&pair, hashed, SubpacketVector::default())?;
            }
        }

        generator.generate_secret_key_ring(rng)
    }

    fn certification_subpackets(&self, primary: bool) -> Result<SubpacketVector> {
        let mut flags = KeyFlags::default();
        flags.set_certify(self.can_certify);
        flags.set_sign(self.can_sign);
        flags.set_encrypt_comms(self.can_encrypt);
        flags.set_encrypt_storage(self.can_encrypt);

        let mut hashed = SubpacketVectorGenerator::new();
        hashed
            .set_key_flags(false, flags)?
            .set_features(false, FEATURE_MDC)?;
        if primary {
            hashed.set_primary_user_id(false, true)?;
        }
        if !self.preferred_symmetric_algorithms.is_empty() {
            hashed.set_preferred_symmetric_algorithms(false, &self.preferred_symmetric_algorithms)?;
        }
        if !self.preferred_hash_algorithms.is_empty() {
            hashed.set_preferred_hash_algorithms(false, &self.preferred_hash_algorithms)?;
        }
        if !self.preferred_compression_algorithms.is_empty() {
            hashed.set_preferred_compression_algorithms(
                false,
                &self.preferred_compression_algorithms,
            )?;
        }
        if let Some(secs) = expiration_secs(self.expiration)? {
            hashed.set_key_expiration_time(false, secs)?;
        }
        Ok(hashed.generate())
    }
}

impl SubkeyParams {
    fn binding_subpackets(&self) -> Result<SubpacketVector> {
        let mut flags = KeyFlags::default();
        flags.set_sign(self.can_sign);
        flags.set_encrypt_comms(self.can_encrypt);
        flags.set_encrypt_storage(self.can_encrypt);
        flags.set_authentication(self.can_authenticate);

        let mut hashed = SubpacketVectorGenerator::new();
        hashed.set_key_flags(false, flags)?;
        if let Some(secs) = expiration_secs(self.expiration)? {
            hashed.set_key_expiration_time(false, secs)?;
        }
        Ok(hashed.generate())
    }
}
