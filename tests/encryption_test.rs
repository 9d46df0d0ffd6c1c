use std::io::{Read, Write};

use chrono::{SubsecRound, Utc};
use pgp_core::composed::{
    EncryptedDataGenerator, EncryptedDataList, KeyRingParamsBuilder, KeyType, Object,
    ObjectFactory, PbeKeyEncryptionMethod, PublicKeyKeyEncryptionMethod, SecretKeyRing,
    SubkeyParamsBuilder,
};
use pgp_core::crypto::hash::HashAlgorithm;
use pgp_core::crypto::sym::SymmetricKeyAlgorithm;
use pgp_core::errors::Error;
use pgp_core::operator::{
    CfbDataEncryptorBuilder, DefaultPbeDataDecryptorFactory, DefaultPublicKeyDataDecryptorFactory,
};
use pgp_core::packet::{write_packet, LiteralData};
use pgp_core::ser::Serialize;
use pretty_assertions::assert_eq;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

fn encrypt(
    rng: &mut ChaCha8Rng,
    generator: &EncryptedDataGenerator<'_>,
    plaintext: &[u8],
) -> Vec<u8> {
    let mut writer = generator.open(rng, Vec::new()).unwrap();
    for chunk in plaintext.chunks(1000) {
        writer.write_all(chunk).unwrap();
    }
    writer.finish().unwrap()
}

fn read_list(message: &[u8]) -> EncryptedDataList {
    match ObjectFactory::new(message).next_object().unwrap() {
        Some(Object::EncryptedDataList(list)) => list,
        other => panic!("expected encrypted data, got {other:?}"),
    }
}

#[test]
fn passphrase_round_trip_with_integrity() {
    let _ = pretty_env_logger::try_init();
    let mut rng = ChaCha8Rng::seed_from_u64(300);
    let mut plaintext = vec![0u8; 70_000];
    rng.fill_bytes(&mut plaintext);

    let builder = CfbDataEncryptorBuilder::new(SymmetricKeyAlgorithm::AES256)
        .with_integrity_packet(true);
    let generator = EncryptedDataGenerator::new(&builder)
        .add_method(PbeKeyEncryptionMethod::new(b"sesame", HashAlgorithm::Sha256, 0x60));
    let message = encrypt(&mut rng, &generator, &plaintext);

    let list = read_list(&message);
    assert_eq!(list.len(), 1);
    assert!(list.is_integrity_protected());

    let pbe = list.pbe_methods().next().unwrap();
    let factory = DefaultPbeDataDecryptorFactory::new(b"sesame");
    assert_eq!(
        pbe.symmetric_algorithm(&factory).unwrap(),
        SymmetricKeyAlgorithm::AES256
    );

    let mut stream = pbe.data_stream(&factory).unwrap();
    let mut decrypted = Vec::new();
    stream.read_to_end(&mut decrypted).unwrap();
    assert_eq!(decrypted, plaintext);
    assert!(stream.verify().unwrap());
}

#[test]
fn partial_body_message_is_written_back_unchanged() {
    let mut rng = ChaCha8Rng::seed_from_u64(307);
    let mut plaintext = vec![0u8; 100_000];
    rng.fill_bytes(&mut plaintext);

    let builder =
        CfbDataEncryptorBuilder::new(SymmetricKeyAlgorithm::AES128).with_integrity_packet(true);
    let generator = EncryptedDataGenerator::new(&builder)
        .add_method(PbeKeyEncryptionMethod::with_defaults(b"pw"));
    let message = encrypt(&mut rng, &generator, &plaintext);

    let list = read_list(&message);
    assert_eq!(list.write_len(), message.len());
    assert_eq!(list.to_bytes().unwrap(), message);

    let again = read_list(&list.to_bytes().unwrap());
    assert_eq!(again, list);
}

#[test]
fn streamed_decryption_of_large_message() {
    let mut rng = ChaCha8Rng::seed_from_u64(308);
    let ring = recipient_ring(&mut rng);
    let public = ring.to_public_ring();
    let encryption_key = public.encryption_keys().next().unwrap();
    let mut plaintext = vec![0u8; 200_000];
    rng.fill_bytes(&mut plaintext);

    let builder =
        CfbDataEncryptorBuilder::new(SymmetricKeyAlgorithm::AES256).with_integrity_packet(true);
    let generator = EncryptedDataGenerator::new(&builder)
        .add_method(PublicKeyKeyEncryptionMethod::new(encryption_key));
    let message = encrypt(&mut rng, &generator, &plaintext);

    let private = ring
        .get_secret_key_by_id(encryption_key.key_id())
        .unwrap()
        .extract_private_key(None)
        .unwrap();
    let factory = DefaultPublicKeyDataDecryptorFactory::new(private);

    let encrypted = ObjectFactory::new(&message[..])
        .into_encrypted_message()
        .unwrap();
    assert!(encrypted.is_integrity_protected());
    assert_eq!(encrypted.public_key_packets().count(), 1);
    let mut stream = encrypted
        .public_key_data_stream(&encryption_key.key_id(), &factory)
        .unwrap();
    let mut decrypted = Vec::new();
    let mut buf = vec![0u8; 4096];
    loop {
        let n = stream.read(&mut buf).unwrap();
        if n == 0 {
            break;
        }
        decrypted.extend_from_slice(&buf[..n]);
    }
    assert_eq!(decrypted.len(), plaintext.len());
    assert!(decrypted == plaintext);
    assert!(stream.verify().unwrap());

    // tampering is still caught on the streamed path
    let mut tampered = message.clone();
    let at = tampered.len() - 5000;
    tampered[at] ^= 0x01;
    let encrypted = ObjectFactory::new(&tampered[..])
        .into_encrypted_message()
        .unwrap();
    let mut stream = encrypted
        .public_key_data_stream(&encryption_key.key_id(), &factory)
        .unwrap();
    let mut sink = Vec::new();
    stream.read_to_end(&mut sink).unwrap();
    assert!(!stream.verify().unwrap());
}

#[test]
fn encrypted_message_needs_encrypted_data() {
    let literal = LiteralData::from_bytes(b"", Utc::now().trunc_subsecs(0), b"plain");
    let mut message = Vec::new();
    write_packet(&mut message, &literal).unwrap();
    assert!(ObjectFactory::new(&message[..])
        .into_encrypted_message()
        .unwrap_err()
        .is_format());
}

#[test]
fn wrong_passphrase_fails_quick_check() {
    let mut rng = ChaCha8Rng::seed_from_u64(301);
    let builder =
        CfbDataEncryptorBuilder::new(SymmetricKeyAlgorithm::AES128).with_integrity_packet(true);
    let generator = EncryptedDataGenerator::new(&builder)
        .add_method(PbeKeyEncryptionMethod::with_defaults(b"right"));
    let message = encrypt(&mut rng, &generator, b"attack at dawn");

    let list = read_list(&message);
    let pbe = list.pbe_methods().next().unwrap();
    let err = pbe
        .data_stream(&DefaultPbeDataDecryptorFactory::new(b"wrong"))
        .unwrap_err();
    assert!(matches!(err, Error::QuickCheck), "{err:?}");
    assert!(err.is_data_validation());
}

#[test]
fn flipped_ciphertext_fails_integrity_check() {
    let mut rng = ChaCha8Rng::seed_from_u64(302);
    let builder =
        CfbDataEncryptorBuilder::new(SymmetricKeyAlgorithm::AES128).with_integrity_packet(true);
    let generator = EncryptedDataGenerator::new(&builder)
        .add_method(PbeKeyEncryptionMethod::with_defaults(b"pw"));
    let plaintext = vec![b'x'; 300];

    let mut message = Vec::new();
    let mut writer = generator
        .open_with_length(&mut rng, &mut message, plaintext.len())
        .unwrap();
    writer.write_all(&plaintext).unwrap();
    writer.finish().unwrap();

    // a byte well past the prefix, inside the plaintext area
    let at = message.len() - 22 - 100;
    message[at] ^= 0x40;

    let list = read_list(&message);
    let pbe = list.pbe_methods().next().unwrap();
    let mut stream = pbe
        .data_stream(&DefaultPbeDataDecryptorFactory::new(b"pw"))
        .unwrap();
    let mut decrypted = Vec::new();
    stream.read_to_end(&mut decrypted).unwrap();
    assert_ne!(decrypted, plaintext);
    assert!(!stream.verify().unwrap());
}

#[test]
fn verify_requires_drained_protected_stream() {
    let mut rng = ChaCha8Rng::seed_from_u64(303);
    let protected =
        CfbDataEncryptorBuilder::new(SymmetricKeyAlgorithm::AES128).with_integrity_packet(true);
    let generator = EncryptedDataGenerator::new(&protected)
        .add_method(PbeKeyEncryptionMethod::with_defaults(b"pw"));
    let message = encrypt(&mut rng, &generator, &[7u8; 5000]);

    let list = read_list(&message);
    let factory = DefaultPbeDataDecryptorFactory::new(b"pw");
    let mut stream = list.pbe_methods().next().unwrap().data_stream(&factory).unwrap();
    let err = stream.verify().unwrap_err();
    assert!(matches!(err, Error::InvalidState { .. }), "{err:?}");

    let legacy = CfbDataEncryptorBuilder::new(SymmetricKeyAlgorithm::CAST5);
    let generator = EncryptedDataGenerator::new(&legacy)
        .add_method(PbeKeyEncryptionMethod::with_defaults(b"pw"));
    let message = encrypt(&mut rng, &generator, b"old school");

    let list = read_list(&message);
    assert!(!list.is_integrity_protected());
    let mut stream = list.pbe_methods().next().unwrap().data_stream(&factory).unwrap();
    let mut decrypted = Vec::new();
    stream.read_to_end(&mut decrypted).unwrap();
    assert_eq!(decrypted, b"old school");
    assert!(!stream.is_integrity_protected());
    assert!(matches!(stream.verify(), Err(Error::InvalidState { .. })));
}

fn recipient_ring(rng: &mut ChaCha8Rng) -> SecretKeyRing {
    KeyRingParamsBuilder::default()
        .key_type(KeyType::Ed25519)
        .can_sign(true)
        .primary_user_id("Carol <carol@example.org>".into())
        .created_at(Utc::now().trunc_subsecs(0))
        .subkeys(vec![SubkeyParamsBuilder::default()
            .key_type(KeyType::Rsa(1024))
            .can_encrypt(true)
            .build()
            .unwrap()])
        .build()
        .unwrap()
        .generate(rng)
        .unwrap()
}

#[test]
fn public_key_and_passphrase_recipients() {
    let mut rng = ChaCha8Rng::seed_from_u64(304);
    let ring = recipient_ring(&mut rng);
    let public = ring.to_public_ring();
    let encryption_key = public.encryption_keys().next().unwrap();

    let builder =
        CfbDataEncryptorBuilder::new(SymmetricKeyAlgorithm::AES192).with_integrity_packet(true);
    let generator = EncryptedDataGenerator::new(&builder)
        .add_method(PublicKeyKeyEncryptionMethod::new(encryption_key))
        .add_method(PbeKeyEncryptionMethod::with_defaults(b"backup"));

    let literal = LiteralData::from_bytes(b"note.txt", Utc::now().trunc_subsecs(0), b"for carol");
    let mut writer = generator.open(&mut rng, Vec::new()).unwrap();
    write_packet(&mut writer, &literal).unwrap();
    let message = writer.finish().unwrap();

    let list = read_list(&message);
    assert_eq!(list.len(), 2);
    assert_eq!(list.get_encoded().unwrap(), message);

    // the public key path
    let method = list.public_key_method(&encryption_key.key_id()).unwrap();
    let private = ring
        .get_secret_key_by_id(encryption_key.key_id())
        .unwrap()
        .extract_private_key(None)
        .unwrap();
    let factory = DefaultPublicKeyDataDecryptorFactory::new(private);
    let mut stream = method.data_stream(&factory).unwrap();
    let mut inner = Vec::new();
    stream.read_to_end(&mut inner).unwrap();
    assert!(stream.verify().unwrap());

    let Some(Object::LiteralData(decrypted)) =
        ObjectFactory::new(&inner[..]).next_object().unwrap()
    else {
        panic!("expected literal data inside the encrypted packet");
    };
    assert_eq!(decrypted.data(), b"for carol");
    assert_eq!(decrypted.file_name(), b"note.txt");

    // the passphrase path opens the same session key
    let pbe = list.pbe_methods().next().unwrap();
    let pbe_factory = DefaultPbeDataDecryptorFactory::new(b"backup");
    let mut stream = pbe.data_stream(&pbe_factory).unwrap();
    let mut again = Vec::new();
    stream.read_to_end(&mut again).unwrap();
    assert_eq!(again, inner);
    assert!(stream.verify().unwrap());
}

#[test]
fn wrong_public_key_does_not_leak_through_quick_check() {
    let mut rng = ChaCha8Rng::seed_from_u64(305);
    let carol = recipient_ring(&mut rng);
    let dave = recipient_ring(&mut rng);
    let carol_key = carol.to_public_ring().encryption_keys().next().unwrap().clone();

    let builder =
        CfbDataEncryptorBuilder::new(SymmetricKeyAlgorithm::AES128).with_integrity_packet(true);
    let generator = EncryptedDataGenerator::new(&builder)
        .add_method(PublicKeyKeyEncryptionMethod::new(&carol_key));
    let message = encrypt(&mut rng, &generator, b"private");
    let list = read_list(&message);
    let method = list.public_key_methods().next().unwrap();
    assert_eq!(method.key_id(), &carol_key.key_id());

    let dave_private = dave.secret_keys()[1].extract_private_key(None).unwrap();
    let factory = DefaultPublicKeyDataDecryptorFactory::new(dave_private);
    // unwrapping with the wrong RSA key fails before the data is touched
    assert!(method.data_stream(&factory).is_err());
}

#[test]
fn generator_without_methods_is_rejected() {
    let mut rng = ChaCha8Rng::seed_from_u64(306);
    let builder = CfbDataEncryptorBuilder::new(SymmetricKeyAlgorithm::AES128);
    let generator = EncryptedDataGenerator::new(&builder);
    assert!(generator.open(&mut rng, Vec::new()).is_err());
    assert!(generator.methods().is_empty());
}
