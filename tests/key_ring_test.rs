use chrono::{SubsecRound, TimeZone, Utc};
use pgp_core::composed::{
    KeyPair, KeyRingGenerator, KeyRingParamsBuilder, KeyType, Object, ObjectFactory, PrivateKey,
    PublicKey, PublicKeyRing, SecretKeyRing, Signature, SignatureGenerator, SubkeyParamsBuilder,
};
use pgp_core::crypto::hash::HashAlgorithm;
use pgp_core::crypto::public_key::PublicKeyAlgorithm;
use pgp_core::crypto::sym::SymmetricKeyAlgorithm;
use pgp_core::errors::Error;
use pgp_core::operator::{
    DefaultContentSignerBuilder, DefaultContentVerifierBuilderProvider,
    DefaultPbeSecretKeyDecryptor, DefaultPbeSecretKeyEncryptor, DigestFingerprintCalculator,
};
use pgp_core::packet::{Packet, SignatureType, SubpacketVector, UserId};
use pgp_core::ser::Serialize;
use pretty_assertions::assert_eq;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

fn alice_ring(rng: &mut ChaCha8Rng, passphrase: Option<&str>) -> SecretKeyRing {
    KeyRingParamsBuilder::default()
        .key_type(KeyType::Ed25519)
        .can_sign(true)
        .primary_user_id("Alice <alice@example.org>".into())
        .passphrase(passphrase.map(Into::into))
        .created_at(Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap())
        .subkeys(vec![SubkeyParamsBuilder::default()
            .key_type(KeyType::Rsa(1024))
            .can_encrypt(true)
            .created_at(Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap())
            .build()
            .unwrap()])
        .build()
        .unwrap()
        .generate(rng)
        .unwrap()
}

#[test]
fn master_and_subkey_ring_round_trip() {
    let _ = pretty_env_logger::try_init();
    let mut rng = ChaCha8Rng::seed_from_u64(100);
    let ring = alice_ring(&mut rng, None);

    let public = ring.to_public_ring();
    assert_eq!(public.public_keys().len(), 2);
    assert!(public.get_public_key().is_master_key());
    assert!(!public.public_keys()[1].is_master_key());
    assert_eq!(public.encryption_keys().count(), 1);

    let encoded = public.get_encoded().unwrap();
    let decoded = PublicKeyRing::from_bytes(&encoded).unwrap();
    assert_eq!(decoded, public);
    assert_eq!(decoded.to_bytes().unwrap(), encoded);

    let secret_encoded = ring.get_encoded().unwrap();
    let secret_decoded = SecretKeyRing::from_bytes(&secret_encoded).unwrap();
    assert_eq!(secret_decoded, ring);

    let provider = DefaultContentVerifierBuilderProvider;
    let master = decoded.get_public_key();
    let subkey = &decoded.public_keys()[1];
    let binding = &subkey.key_signatures()[0];
    assert_eq!(binding.signature_type(), SignatureType::SubkeyBinding);
    assert!(binding
        .verify_certification_subkey(&provider, master, master, subkey)
        .unwrap());
}

#[test]
fn fingerprint_is_deterministic() {
    let mut rng = ChaCha8Rng::seed_from_u64(101);
    let ring = alice_ring(&mut rng, None).to_public_ring();
    let encoded = ring.get_encoded().unwrap();

    let first = PublicKeyRing::from_bytes(&encoded).unwrap();
    let second = PublicKeyRing::from_bytes(&encoded).unwrap();
    for (a, b) in first.public_keys().iter().zip(second.public_keys()) {
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.key_id(), b.key_id());
        assert_eq!(a.fingerprint().len(), 20);
        assert_eq!(a.key_id().as_ref(), &a.fingerprint().as_bytes()[12..]);
    }

    let recomputed = PublicKey::new(
        first.get_public_key().packet().clone(),
        &DigestFingerprintCalculator::default(),
    )
    .unwrap();
    assert_eq!(recomputed.key_id(), first.get_public_key().key_id());
}

fn casual_certification(private: &PrivateKey, uid: &UserId, key: &PublicKey) -> Signature {
    let builder =
        DefaultContentSignerBuilder::new(PublicKeyAlgorithm::EdDSALegacy, HashAlgorithm::Sha256);
    let mut generator = SignatureGenerator::new(&builder);
    generator
        .init(SignatureType::CertCasual, private)
        .unwrap();
    generator.generate_certification_user_id(uid, key).unwrap()
}

#[test]
fn certification_add_remove_is_inverse() {
    let mut rng = ChaCha8Rng::seed_from_u64(102);
    let ring = alice_ring(&mut rng, None);
    let private = ring.get_secret_key().extract_private_key(None).unwrap();
    let key = ring.get_public_key().clone();

    // a second certification on the id the key already carries
    let uid = key.user_ids().next().unwrap().clone();
    let before = key.signatures_for_user_id(&uid).unwrap().to_vec();
    let cert = casual_certification(&private, &uid, &key);

    let certified = key.add_certification_user_id(&uid, cert.clone());
    assert_eq!(certified.signatures_for_user_id(&uid).unwrap().len(), before.len() + 1);
    assert_eq!(certified.user_ids().count(), 1);

    let restored = certified
        .remove_certification_user_id(&uid, &cert)
        .unwrap();
    assert_eq!(restored.signatures_for_user_id(&uid).unwrap(), &before[..]);
    assert_eq!(restored, key);
    assert_eq!(restored.to_bytes().unwrap(), key.to_bytes().unwrap());

    // removing what is not there reports absence instead of failing
    assert!(key.remove_certification_user_id(&uid, &cert).is_none());
    assert!(key.remove_certification(&cert).is_none());
}

#[test]
fn uncertified_user_id_is_kept_through_add_remove() {
    let mut rng = ChaCha8Rng::seed_from_u64(107);
    let ring = alice_ring(&mut rng, None);
    let private = ring.get_secret_key().extract_private_key(None).unwrap();

    let bare = UserId::from_str(Default::default(), "bare@example.org");
    let mut bytes = ring.get_public_key().get_encoded().unwrap();
    bytes.extend(Packet::from(bare.clone()).to_bytes().unwrap());
    let key = PublicKeyRing::from_bytes(&bytes)
        .unwrap()
        .get_public_key()
        .clone();
    assert_eq!(key.signatures_for_user_id(&bare), Some(&[][..]));
    assert_eq!(key.to_bytes().unwrap(), bytes);

    let cert = casual_certification(&private, &bare, &key);
    let restored = key
        .add_certification_user_id(&bare, cert.clone())
        .remove_certification_user_id(&bare, &cert)
        .unwrap();
    assert_eq!(restored.signatures_for_user_id(&bare), Some(&[][..]));
    assert_eq!(restored, key);
    assert_eq!(restored.to_bytes().unwrap(), bytes);

    let restored = key
        .add_certification_user_id(&bare, cert.clone())
        .remove_certification(&cert)
        .unwrap();
    assert_eq!(restored, key);
}

#[test]
fn revocation_marks_key_revoked() {
    let mut rng = ChaCha8Rng::seed_from_u64(103);
    let ring = alice_ring(&mut rng, None);
    let private = ring.get_secret_key().extract_private_key(None).unwrap();
    let key = ring.get_public_key().clone();
    assert!(!key.is_revoked());

    let builder =
        DefaultContentSignerBuilder::new(PublicKeyAlgorithm::EdDSALegacy, HashAlgorithm::Sha256);
    let mut generator = SignatureGenerator::new(&builder);
    generator
        .init(SignatureType::KeyRevocation, &private)
        .unwrap();
    let revocation = generator.generate_certification_key(&key).unwrap();
    let revoked = key.add_certification(revocation.clone());
    assert!(revoked.is_revoked());
    assert!(revocation
        .verify_certification_key(&DefaultContentVerifierBuilderProvider, &key, &key)
        .unwrap());
    assert_eq!(revoked.remove_certification(&revocation).unwrap(), key);
}

#[test]
fn secret_key_checksum_detects_wrong_passphrase() {
    let mut rng = ChaCha8Rng::seed_from_u64(104);
    let ring = alice_ring(&mut rng, Some("hunter2"));

    let right = DefaultPbeSecretKeyDecryptor::new(b"hunter2");
    let wrong = DefaultPbeSecretKeyDecryptor::new(b"hunter3");
    for key in ring.secret_keys() {
        assert!(!key.is_private_key_empty());
        assert_eq!(key.key_encryption_algorithm(), SymmetricKeyAlgorithm::AES128);
        key.extract_private_key(Some(&right)).unwrap();
        let err = key.extract_private_key(Some(&wrong)).unwrap_err();
        assert!(matches!(err, Error::SecretKeyChecksum), "{err:?}");
    }

    let encryptor = DefaultPbeSecretKeyEncryptor::new(
        &mut rng,
        b"new secret",
        SymmetricKeyAlgorithm::AES256,
        HashAlgorithm::Sha256,
        0x60,
    )
    .unwrap();
    let reencrypted = ring
        .copy_with_new_password(&mut rng, Some(&right), Some(&encryptor))
        .unwrap();
    let fresh = DefaultPbeSecretKeyDecryptor::new(b"new secret");
    for key in reencrypted.secret_keys() {
        assert_eq!(key.key_encryption_algorithm(), SymmetricKeyAlgorithm::AES256);
        key.extract_private_key(Some(&fresh)).unwrap();
    }
}

#[test]
fn object_factory_reads_mixed_rings() {
    let mut rng = ChaCha8Rng::seed_from_u64(105);
    let secret = alice_ring(&mut rng, None);

    let master = KeyPair::generate_ed25519(&mut rng, Utc::now().trunc_subsecs(0)).unwrap();
    let builder =
        DefaultContentSignerBuilder::new(PublicKeyAlgorithm::EdDSALegacy, HashAlgorithm::Sha256);
    let generator = KeyRingGenerator::new(
        SignatureType::CertPositive,
        master,
        "bob",
        SubpacketVector::default(),
        SubpacketVector::default(),
        &builder,
        None,
    )
    .unwrap();
    let bob = generator.generate_public_key_ring().unwrap();

    let mut stream = secret.get_encoded().unwrap();
    bob.to_writer(&mut stream).unwrap();

    let objects = ObjectFactory::new(&stream[..])
        .collect::<pgp_core::errors::Result<Vec<_>>>()
        .unwrap();
    assert_eq!(
        objects,
        vec![Object::SecretKeyRing(secret), Object::PublicKeyRing(bob)]
    );
}
