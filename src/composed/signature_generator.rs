use std::io;

use chrono::Utc;
use log::debug;

use crate::composed::{PrivateKey, PublicKey, Signature};
use crate::errors::{ensure, state_err, Result};
use crate::normalize_lines::CanonicalText;
use crate::operator::{ContentSigner, ContentSignerBuilder};
use crate::packet::signature::preamble;
use crate::packet::{
    OnePassSignature, SignatureConfig, SignaturePacket, SignatureType, Subpacket, SubpacketData,
    SubpacketType, SubpacketVector, UserAttribute, UserId,
};
use crate::ser::{time_to_u32, u32_to_time};

enum State {
    Uninitialized,
    Initialized {
        signer: Box<dyn ContentSigner>,
        text: Option<CanonicalText>,
    },
    Finalized,
}

/// Creates version 4 signatures.
///
/// The generator has to be initialised with a signature type and key before data can
/// be fed to it. Generating a signature finalises it; [SignatureGenerator::init] starts
/// over with the same subpackets.
pub struct SignatureGenerator<'a> {
    builder: &'a dyn ContentSignerBuilder,
    hashed: SubpacketVector,
    unhashed: SubpacketVector,
    state: State,
}

impl std::fmt::Debug for SignatureGenerator<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match self.state {
            State::Uninitialized => "uninitialized",
            State::Initialized { .. } => "initialized",
            State::Finalized => "finalized",
        };
        f.debug_struct("SignatureGenerator")
            .field("key_algorithm", &self.builder.key_algorithm())
            .field("hash_algorithm", &self.builder.hash_algorithm())
            .field("hashed", &self.hashed)
            .field("unhashed", &self.unhashed)
            .field("state", &state)
            .finish()
    }
}

impl<'a> SignatureGenerator<'a> {
    pub fn new(builder: &'a dyn ContentSignerBuilder) -> Self {
        SignatureGenerator {
            builder,
            hashed: SubpacketVector::default(),
            unhashed: SubpacketVector::default(),
            state: State::Uninitialized,
        }
    }

    pub fn set_hashed_subpackets(&mut self, subpackets: SubpacketVector) -> &mut Self {
        self.hashed = subpackets;
        self
    }

    pub fn set_unhashed_subpackets(&mut self, subpackets: SubpacketVector) -> &mut Self {
        self.unhashed = subpackets;
        self
    }

    /// Prepares a signature of type `typ` made with `key`.
    pub fn init(&mut self, typ: SignatureType, key: &PrivateKey) -> Result<()> {
        let signer = self.builder.build(typ, key)?;
        self.state = State::Initialized {
            signer,
            text: (typ == SignatureType::Text).then(CanonicalText::new),
        };
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        matches!(self.state, State::Initialized { .. })
    }

    /// Feeds signed data. Canonical text signatures normalize line endings on the way.
    pub fn update(&mut self, data: &[u8]) -> Result<()> {
        match &mut self.state {
            State::Initialized { signer, text } => {
                match text {
                    Some(text) => text.update(data, |chunk| signer.update(chunk)),
                    None => signer.update(data),
                }
                Ok(())
            }
            _ => Err(state_err!("signature generator not initialised")),
        }
    }

    /// The one pass signature packet announcing the signature being generated.
    pub fn generate_one_pass_version(&self, nested: bool) -> Result<OnePassSignature> {
        match &self.state {
            State::Initialized { signer, .. } => Ok(OnePassSignature::new(
                signer.signature_type(),
                signer.hash_algorithm(),
                signer.key_algorithm(),
                signer.key_id(),
                nested,
            )),
            _ => Err(state_err!("signature generator not initialised")),
        }
    }

    /// Signs the data passed to [SignatureGenerator::update].
    pub fn generate(&mut self) -> Result<Signature> {
        let signer = match std::mem::replace(&mut self.state, State::Finalized) {
            State::Initialized { signer, .. } => signer,
            State::Uninitialized => {
                self.state = State::Uninitialized;
                return Err(state_err!("signature generator not initialised"));
            }
            State::Finalized => return Err(state_err!("signature already generated")),
        };
        self.finish(signer)
    }

    /// Certifies the binding of `id` to `key`.
    pub fn generate_certification_user_id(
        &mut self,
        id: &UserId,
        key: &PublicKey,
    ) -> Result<Signature> {
        self.generate_over(&preamble::user_id(key.packet(), id, true)?)
    }

    /// Certifies the binding of `attribute` to `key`.
    pub fn generate_certification_user_attribute(
        &mut self,
        attribute: &UserAttribute,
        key: &PublicKey,
    ) -> Result<Signature> {
        self.generate_over(&preamble::user_attribute(key.packet(), attribute, true)?)
    }

    /// Binds `subkey` to `master`, or signs the primary key binding when initialised
    /// with the subkey.
    pub fn generate_certification_subkey(
        &mut self,
        master: &PublicKey,
        subkey: &PublicKey,
    ) -> Result<Signature> {
        self.generate_over(&preamble::subkey_binding(master.packet(), subkey.packet())?)
    }

    /// Direct key signature or key revocation over `key` alone.
    pub fn generate_certification_key(&mut self, key: &PublicKey) -> Result<Signature> {
        self.generate_over(&preamble::key(key.packet())?)
    }

    fn generate_over(&mut self, preamble: &[u8]) -> Result<Signature> {
        match &mut self.state {
            State::Initialized { signer, .. } => signer.update(preamble),
            _ => return Err(state_err!("signature generator not initialised")),
        }
        self.generate()
    }

    fn finish(&self, mut signer: Box<dyn ContentSigner>) -> Result<Signature> {
        let mut hashed = self.hashed.to_vec();
        if !self.hashed.has(SubpacketType::SignatureCreationTime) {
            let now = u32_to_time(time_to_u32(&Utc::now()));
            hashed.insert(
                0,
                Subpacket::regular(SubpacketData::SignatureCreationTime(now))?,
            );
        }
        let mut unhashed = self.unhashed.to_vec();
        if !self.hashed.has(SubpacketType::Issuer) && !self.unhashed.has(SubpacketType::Issuer) {
            unhashed.insert(0, Subpacket::regular(SubpacketData::Issuer(signer.key_id()))?);
        }

        let config = SignatureConfig::v4(
            signer.signature_type(),
            signer.key_algorithm(),
            signer.hash_algorithm(),
            SubpacketVector::new(hashed),
            SubpacketVector::new(unhashed),
        );
        signer.update(&config.trailer()?);
        let key_id = signer.key_id();
        let (digest, signature) = signer.sign()?;
        ensure!(digest.len() >= 2, "digest too short for a signature");

        debug!("generated {:?} signature with key {}", config.typ, key_id);
        Ok(Signature::new(SignaturePacket::new(
            config,
            [digest[0], digest[1]],
            signature,
        )))
    }
}

impl io::Write for SignatureGenerator<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.update(buf).map_err(io::Error::other)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::SubsecRound;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;
    use crate::composed::KeyPair;
    use crate::crypto::hash::HashAlgorithm;
    use crate::crypto::public_key::PublicKeyAlgorithm;
    use crate::errors::Error;
    use crate::operator::{DefaultContentSignerBuilder, DefaultContentVerifierBuilderProvider};
    use crate::packet::SubpacketVectorGenerator;

    fn key_pair(seed: u64) -> KeyPair {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        KeyPair::generate_ed25519(&mut rng, Utc::now().trunc_subsecs(0)).unwrap()
    }

    fn builder() -> DefaultContentSignerBuilder {
        DefaultContentSignerBuilder::new(PublicKeyAlgorithm::EdDSALegacy, HashAlgorithm::Sha256)
    }

    #[test]
    fn test_update_before_init() {
        let builder = builder();
        let mut generator = SignatureGenerator::new(&builder);
        assert!(matches!(
            generator.update(b"data").unwrap_err(),
            Error::InvalidState { .. }
        ));
        assert!(generator.generate().is_err());
        assert!(generator.generate_one_pass_version(false).is_err());
    }

    #[test]
    fn test_signer_key_mismatch() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let rsa = KeyPair::generate_rsa(&mut rng, 1024, Utc::now()).unwrap();
        let builder = builder();
        let mut generator = SignatureGenerator::new(&builder);
        assert!(matches!(
            generator.init(SignatureType::Binary, rsa.private()),
            Err(Error::KeyAlgorithmMismatch { .. })
        ));
    }

    #[test]
    fn test_auto_subpackets() {
        let _ = pretty_env_logger::try_init();
        let key = key_pair(1);
        let builder = builder();
        let mut generator = SignatureGenerator::new(&builder);
        generator.init(SignatureType::Binary, key.private()).unwrap();
        generator.update(b"hello world").unwrap();
        let sig = generator.generate().unwrap();

        assert!(sig.creation_time().is_some());
        assert_eq!(sig.key_id(), Some(key.key_id()));
        assert!(sig.unhashed_subpackets().has(SubpacketType::Issuer));
        assert!(!sig.hashed_subpackets().has(SubpacketType::Issuer));

        // finalised until re-initialised
        assert!(generator.update(b"more").is_err());
        generator.init(SignatureType::Binary, key.private()).unwrap();
        assert!(generator.update(b"more").is_ok());
    }

    #[test]
    fn test_explicit_issuer_is_kept() {
        let key = key_pair(2);
        let other = key_pair(3);
        let builder = builder();
        let mut hashed = SubpacketVectorGenerator::new();
        hashed.set_issuer_key_id(false, other.key_id()).unwrap();

        let mut generator = SignatureGenerator::new(&builder);
        generator.set_hashed_subpackets(hashed.generate());
        generator.init(SignatureType::Binary, key.private()).unwrap();
        let sig = generator.generate().unwrap();
        assert_eq!(sig.key_id(), Some(other.key_id()));
        assert!(sig.unhashed_subpackets().is_empty());
    }

    #[test]
    fn test_certifications_verify() {
        let master = key_pair(4);
        let sub = key_pair(5);
        let provider = DefaultContentVerifierBuilderProvider;
        let builder = builder();
        let mut generator = SignatureGenerator::new(&builder);
        let id = UserId::from_str(Default::default(), "Alice <alice@example.org>");

        generator.init(SignatureType::CertPositive, master.private()).unwrap();
        let cert = generator
            .generate_certification_user_id(&id, master.public())
            .unwrap();
        assert!(cert
            .verify_certification_user_id(&provider, master.public(), master.public(), &id)
            .unwrap());
        let other = UserId::from_str(Default::default(), "Mallory");
        assert!(!cert
            .verify_certification_user_id(&provider, master.public(), master.public(), &other)
            .unwrap());

        generator.init(SignatureType::SubkeyBinding, master.private()).unwrap();
        let binding = generator
            .generate_certification_subkey(master.public(), sub.public())
            .unwrap();
        assert!(binding
            .verify_certification_subkey(&provider, master.public(), master.public(), sub.public())
            .unwrap());

        generator.init(SignatureType::KeyRevocation, master.private()).unwrap();
        let revocation = generator.generate_certification_key(master.public()).unwrap();
        assert!(revocation
            .verify_certification_key(&provider, master.public(), master.public())
            .unwrap());
    }

    #[test]
    fn test_one_pass_version() {
        let key = key_pair(6);
        let builder = builder();
        let mut generator = SignatureGenerator::new(&builder);
        generator.init(SignatureType::Text, key.private()).unwrap();
        let ops = generator.generate_one_pass_version(true).unwrap();
        assert_eq!(ops.typ(), SignatureType::Text);
        assert_eq!(ops.key_id(), key.key_id());
        assert_eq!(ops.hash_algorithm(), HashAlgorithm::Sha256);
        assert!(ops.is_nested());
    }
}
