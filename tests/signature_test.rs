use chrono::{SubsecRound, Utc};
use pgp_core::composed::{
    KeyPair, Object, ObjectFactory, OnePassSignatureVerifier, PublicKey, Signature,
    SignatureGenerator, SignatureList,
};
use pgp_core::crypto::hash::HashAlgorithm;
use pgp_core::crypto::public_key::PublicKeyAlgorithm;
use pgp_core::errors::Error;
use pgp_core::operator::{DefaultContentSignerBuilder, DefaultContentVerifierBuilderProvider};
use pgp_core::packet::{
    write_packet, LiteralData, PacketTrait, SignatureType, SubpacketType, SubpacketVectorGenerator,
};
use pgp_core::ser::Serialize;
use pretty_assertions::assert_eq;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

const DOCUMENT: &[u8] = b"The quick brown fox\njumps over the lazy dog\n";

fn sign(pair: &KeyPair, typ: SignatureType, data: &[u8]) -> Signature {
    let builder = DefaultContentSignerBuilder::new(pair.public().algorithm(), HashAlgorithm::Sha256);
    let mut generator = SignatureGenerator::new(&builder);
    generator.init(typ, pair.private()).unwrap();
    generator.update(data).unwrap();
    generator.generate().unwrap()
}

fn verify(signature: &Signature, key: &PublicKey, data: &[u8]) -> bool {
    let provider = DefaultContentVerifierBuilderProvider;
    let mut verifier = signature.verifier(&provider, key).unwrap();
    verifier.update(data);
    verifier.verify().unwrap()
}

#[test]
fn detached_signature_rsa_and_eddsa() {
    let _ = pretty_env_logger::try_init();
    let mut rng = ChaCha8Rng::seed_from_u64(200);
    let now = Utc::now().trunc_subsecs(0);
    let pairs = [
        KeyPair::generate_rsa(&mut rng, 1024, now).unwrap(),
        KeyPair::generate_ed25519(&mut rng, now).unwrap(),
    ];
    let other = KeyPair::generate_ed25519(&mut rng, now).unwrap();

    for pair in &pairs {
        let signature = sign(pair, SignatureType::Binary, DOCUMENT);
        assert_eq!(signature.key_id(), Some(pair.key_id()));
        assert!(signature.creation_time().is_some());

        assert!(verify(&signature, pair.public(), DOCUMENT));

        let mut altered = DOCUMENT.to_vec();
        altered[4] ^= 0x01;
        assert!(!verify(&signature, pair.public(), &altered));

        // decoding and re-encoding keeps the signature intact
        let bytes = signature.to_bytes().unwrap();
        let list = SignatureList::from_packet_reader(&mut pgp_core::packet::PacketReader::new(
            &bytes[..],
        ))
        .unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list.get(0).unwrap(), &signature);
        assert!(verify(list.get(0).unwrap(), pair.public(), DOCUMENT));
    }

    // an EdDSA signature checked against another EdDSA key
    let signature = sign(&pairs[1], SignatureType::Binary, DOCUMENT);
    assert!(!verify(&signature, other.public(), DOCUMENT));
}

#[test]
fn verifier_for_wrong_key_algorithm_fails() {
    let mut rng = ChaCha8Rng::seed_from_u64(201);
    let now = Utc::now().trunc_subsecs(0);
    let rsa = KeyPair::generate_rsa(&mut rng, 1024, now).unwrap();
    let ed = KeyPair::generate_ed25519(&mut rng, now).unwrap();

    let signature = sign(&ed, SignatureType::Binary, DOCUMENT);
    let provider = DefaultContentVerifierBuilderProvider;
    let err = signature.verifier(&provider, rsa.public()).unwrap_err();
    assert!(matches!(err, Error::KeyAlgorithmMismatch { .. }), "{err:?}");
}

#[test]
fn canonical_text_ignores_line_endings() {
    let mut rng = ChaCha8Rng::seed_from_u64(202);
    let pair = KeyPair::generate_ed25519(&mut rng, Utc::now().trunc_subsecs(0)).unwrap();

    let unix = b"line one\nline two\n";
    let dos = b"line one\r\nline two\r\n";
    let signature = sign(&pair, SignatureType::Text, unix);
    assert!(verify(&signature, pair.public(), dos));
    assert!(verify(&signature, pair.public(), unix));

    // a binary signature over the same data depends on the exact octets
    let binary = sign(&pair, SignatureType::Binary, unix);
    assert!(!verify(&binary, pair.public(), dos));
}

#[test]
fn canonical_text_split_across_updates() {
    let mut rng = ChaCha8Rng::seed_from_u64(203);
    let pair = KeyPair::generate_ed25519(&mut rng, Utc::now().trunc_subsecs(0)).unwrap();
    let builder =
        DefaultContentSignerBuilder::new(PublicKeyAlgorithm::EdDSALegacy, HashAlgorithm::Sha256);

    let mut generator = SignatureGenerator::new(&builder);
    generator.init(SignatureType::Text, pair.private()).unwrap();
    generator.update(b"first\r").unwrap();
    generator.update(b"\nsecond\n").unwrap();
    let signature = generator.generate().unwrap();

    assert!(verify(&signature, pair.public(), b"first\r\nsecond\r\n"));
    assert!(verify(&signature, pair.public(), b"first\nsecond\n"));
}

#[test]
fn explicit_subpackets_are_kept() {
    let mut rng = ChaCha8Rng::seed_from_u64(204);
    let pair = KeyPair::generate_ed25519(&mut rng, Utc::now().trunc_subsecs(0)).unwrap();
    let builder =
        DefaultContentSignerBuilder::new(PublicKeyAlgorithm::EdDSALegacy, HashAlgorithm::Sha256);

    let mut hashed = SubpacketVectorGenerator::new();
    hashed
        .add_notation_data(false, true, b"purpose@example.org", b"testing")
        .unwrap()
        .set_signature_expiration_time(false, 3600)
        .unwrap();

    let mut generator = SignatureGenerator::new(&builder);
    generator.set_hashed_subpackets(hashed.generate());
    generator.init(SignatureType::Binary, pair.private()).unwrap();
    generator.update(DOCUMENT).unwrap();
    let signature = generator.generate().unwrap();

    let subpackets = signature.hashed_subpackets();
    assert!(subpackets.has(SubpacketType::Notation));
    assert!(subpackets.has(SubpacketType::SignatureExpirationTime));
    assert!(subpackets.has(SubpacketType::SignatureCreationTime));
    assert!(signature.unhashed_subpackets().has(SubpacketType::Issuer));
    assert!(verify(&signature, pair.public(), DOCUMENT));
}

#[test]
fn one_pass_signed_message() {
    let mut rng = ChaCha8Rng::seed_from_u64(205);
    let pair = KeyPair::generate_rsa(&mut rng, 1024, Utc::now().trunc_subsecs(0)).unwrap();
    let builder = DefaultContentSignerBuilder::new(PublicKeyAlgorithm::RSA, HashAlgorithm::Sha256);
    let literal = LiteralData::from_bytes(b"", Utc::now().trunc_subsecs(0), DOCUMENT);

    let mut generator = SignatureGenerator::new(&builder);
    generator.init(SignatureType::Binary, pair.private()).unwrap();
    let ops = generator.generate_one_pass_version(false).unwrap();
    generator.update(literal.data()).unwrap();
    let signature = generator.generate().unwrap();

    let mut message = Vec::new();
    ops.to_writer_with_header(&mut message).unwrap();
    write_packet(&mut message, &literal).unwrap();
    signature.to_writer(&mut message).unwrap();

    let mut factory = ObjectFactory::new(&message[..]);
    let Some(Object::OnePassSignatureList(ops_list)) = factory.next_object().unwrap() else {
        panic!("expected one-pass signatures");
    };
    let Some(Object::LiteralData(body)) = factory.next_object().unwrap() else {
        panic!("expected literal data");
    };
    let Some(Object::SignatureList(sigs)) = factory.next_object().unwrap() else {
        panic!("expected signatures");
    };
    assert!(factory.next_object().unwrap().is_none());

    let provider = DefaultContentVerifierBuilderProvider;
    let announced = ops_list.get(0).unwrap();
    assert!(!announced.is_nested());

    let mut verifier = OnePassSignatureVerifier::new(announced, &provider, pair.public()).unwrap();
    verifier.update(body.data());
    assert!(verifier.verify(sigs.get(0).unwrap()).unwrap());

    let mut verifier = OnePassSignatureVerifier::new(announced, &provider, pair.public()).unwrap();
    verifier.update(b"something else");
    assert!(!verifier.verify(sigs.get(0).unwrap()).unwrap());
}
