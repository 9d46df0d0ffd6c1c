use std::io;

use log::debug;
use rand::{CryptoRng, Rng};
use zeroize::Zeroizing;

use crate::composed::encrypted::{MDC_HEADER, MDC_LEN};
use crate::composed::PublicKey;
use crate::crypto::hash::HashAlgorithm;
use crate::crypto::public_key::PublicKeyAlgorithm;
use crate::crypto::rsa;
use crate::crypto::sym::SymmetricKeyAlgorithm;
use crate::errors::{ensure, format_err, unsupported_err, Result};
use crate::operator::{DataEncryptor, DataEncryptorBuilder, DigestCalculator};
use crate::packet::{
    write_packet, BodyWriter, EncryptedSessionKey, FixedBodyWriter, PartialBodyWriter,
    PublicKeyEncryptedSessionKey, SymKeyEncryptedSessionKey, DEFAULT_PARTIAL_LEN,
    SEIPD_VERSION,
};
use crate::types::{SessionKey, StringToKey, Tag, DEFAULT_ITER_COUNT};

/// Encrypts the session key to a passphrase.
#[derive(Clone, derive_more::Debug)]
pub struct PbeKeyEncryptionMethod {
    #[debug("..")]
    passphrase: Zeroizing<Vec<u8>>,
    hash: HashAlgorithm,
    count: u8,
}

impl PbeKeyEncryptionMethod {
    /// Iterated and salted S2K with `hash` and the coded iteration `count`.
    pub fn new(passphrase: &[u8], hash: HashAlgorithm, count: u8) -> Self {
        PbeKeyEncryptionMethod {
            passphrase: Zeroizing::new(passphrase.to_vec()),
            hash,
            count,
        }
    }

    /// SHA-256 and the default iteration count.
    pub fn with_defaults(passphrase: &[u8]) -> Self {
        Self::new(passphrase, HashAlgorithm::Sha256, DEFAULT_ITER_COUNT)
    }

    /// Uses the passphrase derived key as the session key, no key is wrapped.
    fn generate_direct<R: CryptoRng + Rng>(
        &self,
        rng: &mut R,
        algorithm: SymmetricKeyAlgorithm,
    ) -> Result<(SymKeyEncryptedSessionKey, SessionKey)> {
        let s2k = StringToKey::new_iterated(&mut *rng, self.hash, self.count);
        let key = s2k.derive_key(&self.passphrase, algorithm.key_size())?;

        Ok((
            SymKeyEncryptedSessionKey::new(algorithm, s2k, None),
            SessionKey::new(algorithm, key),
        ))
    }

    /// Wraps `session_key` as `[algorithm][key]` under the passphrase derived key.
    fn generate<R: CryptoRng + Rng>(
        &self,
        rng: &mut R,
        session_key: &SessionKey,
    ) -> Result<SymKeyEncryptedSessionKey> {
        let algorithm = session_key.algorithm();
        let s2k = StringToKey::new_iterated(&mut *rng, self.hash, self.count);
        let key = s2k.derive_key(&self.passphrase, algorithm.key_size())?;

        let mut data = session_key.to_unchecked_bytes();
        let iv = vec![0u8; algorithm.block_size()];
        algorithm.encrypt_with_iv_regular(&key, &iv, &mut data)?;

        Ok(SymKeyEncryptedSessionKey::new(
            algorithm,
            s2k,
            Some(data.to_vec().into()),
        ))
    }
}

/// Encrypts the session key to a recipient's public key.
#[derive(Debug, Clone)]
pub struct PublicKeyKeyEncryptionMethod {
    key: PublicKey,
}

impl PublicKeyKeyEncryptionMethod {
    pub fn new(key: &PublicKey) -> Self {
        PublicKeyKeyEncryptionMethod { key: key.clone() }
    }

    pub fn key(&self) -> &PublicKey {
        &self.key
    }

    fn generate<R: CryptoRng + Rng>(
        &self,
        rng: &mut R,
        session_key: &SessionKey,
    ) -> Result<PublicKeyEncryptedSessionKey> {
        let algorithm = self.key.algorithm();
        ensure!(
            self.key.is_encryption_key(),
            "key {} can not encrypt",
            self.key.key_id()
        );

        let values = match algorithm {
            PublicKeyAlgorithm::RSA | PublicKeyAlgorithm::RSAEncrypt => {
                let data = session_key.to_checked_bytes()?;
                let mpi = rsa::encrypt(rng, self.key.packet().public_params(), &data)?
                    .into_iter()
                    .next()
                    .ok_or_else(|| format_err!("rsa encryption produced no value"))?;
                EncryptedSessionKey::Rsa { mpi }
            }
            alg => unsupported_err!("encrypting session keys with {:?}", alg),
        };
        debug!("session key encrypted to {}", self.key.key_id());

        Ok(PublicKeyEncryptedSessionKey::new(
            self.key.key_id(),
            algorithm,
            values,
        ))
    }
}

/// A recipient of encrypted data.
#[derive(Debug, Clone)]
pub enum KeyEncryptionMethod {
    Pbe(PbeKeyEncryptionMethod),
    PublicKey(PublicKeyKeyEncryptionMethod),
}

impl From<PbeKeyEncryptionMethod> for KeyEncryptionMethod {
    fn from(method: PbeKeyEncryptionMethod) -> Self {
        KeyEncryptionMethod::Pbe(method)
    }
}

impl From<PublicKeyKeyEncryptionMethod> for KeyEncryptionMethod {
    fn from(method: PublicKeyKeyEncryptionMethod) -> Self {
        KeyEncryptionMethod::PublicKey(method)
    }
}

/// Writes encrypted session key packets followed by a streamed encrypted data packet.
///
/// ```rust
/// use std::io::Write;
///
/// use pgp_core::composed::{EncryptedDataGenerator, PbeKeyEncryptionMethod};
/// use pgp_core::crypto::sym::SymmetricKeyAlgorithm;
/// use pgp_core::operator::CfbDataEncryptorBuilder;
/// use rand::SeedableRng;
/// use rand_chacha::ChaCha8Rng;
///
/// let mut rng = ChaCha8Rng::seed_from_u64(0);
/// let builder =
///     CfbDataEncryptorBuilder::new(SymmetricKeyAlgorithm::AES128).with_integrity_packet(true);
/// let generator = EncryptedDataGenerator::new(&builder)
///     .add_method(PbeKeyEncryptionMethod::with_defaults(b"hunter2"));
///
/// let mut writer = generator.open(&mut rng, Vec::new()).unwrap();
/// writer.write_all(b"hello").unwrap();
/// let message = writer.finish().unwrap();
/// assert!(!message.is_empty());
/// ```
pub struct EncryptedDataGenerator<'a> {
    encryptor_builder: &'a dyn DataEncryptorBuilder,
    methods: Vec<KeyEncryptionMethod>,
    chunk_size: usize,
}

impl std::fmt::Debug for EncryptedDataGenerator<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptedDataGenerator")
            .field("algorithm", &self.encryptor_builder.algorithm())
            .field("integrity", &self.encryptor_builder.is_integrity_protected())
            .field("methods", &self.methods)
            .field("chunk_size", &self.chunk_size)
            .finish()
    }
}

impl<'a> EncryptedDataGenerator<'a> {
    pub fn new(encryptor_builder: &'a dyn DataEncryptorBuilder) -> Self {
        EncryptedDataGenerator {
            encryptor_builder,
            methods: Vec::new(),
            chunk_size: DEFAULT_PARTIAL_LEN,
        }
    }

    pub fn add_method(mut self, method: impl Into<KeyEncryptionMethod>) -> Self {
        self.methods.push(method.into());
        self
    }

    /// Partial body chunk size used by [Self::open], a power of two of at least 512.
    pub fn with_partial_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn methods(&self) -> &[KeyEncryptionMethod] {
        &self.methods
    }

    /// Starts a message of unknown length, written with partial body lengths.
    pub fn open<R: CryptoRng + Rng, W: io::Write>(
        &self,
        rng: &mut R,
        mut writer: W,
    ) -> Result<EncryptedDataWriter<W>> {
        let session_key = self.write_session_keys(rng, &mut writer)?;
        let body = PartialBodyWriter::new(writer, self.data_tag(), self.chunk_size)?;
        self.start(rng, BodyWriter::Partial(body), &session_key)
    }

    /// Starts a message whose plaintext is exactly `len` octets.
    pub fn open_with_length<R: CryptoRng + Rng, W: io::Write>(
        &self,
        rng: &mut R,
        mut writer: W,
        len: usize,
    ) -> Result<EncryptedDataWriter<W>> {
        let session_key = self.write_session_keys(rng, &mut writer)?;
        let protected = self.encryptor_builder.is_integrity_protected();
        let overhead = if protected { 1 + MDC_LEN } else { 0 };
        let total = self.encryptor_builder.algorithm().block_size() + 2 + len + overhead;
        let body = FixedBodyWriter::new(writer, self.data_tag(), u32::try_from(total)?)?;
        self.start(rng, BodyWriter::Fixed(body), &session_key)
    }

    fn data_tag(&self) -> Tag {
        if self.encryptor_builder.is_integrity_protected() {
            Tag::SymEncryptedProtectedData
        } else {
            Tag::SymEncryptedData
        }
    }

    /// Picks the session key and writes one session key packet per method.
    fn write_session_keys<R: CryptoRng + Rng, W: io::Write>(
        &self,
        rng: &mut R,
        writer: &mut W,
    ) -> Result<SessionKey> {
        ensure!(!self.methods.is_empty(), "no encryption methods added");
        let algorithm = self.encryptor_builder.algorithm();

        if let [KeyEncryptionMethod::Pbe(method)] = self.methods.as_slice() {
            debug!("single passphrase recipient, using the derived key");
            let (packet, session_key) = method.generate_direct(rng, algorithm)?;
            write_packet(writer, &packet)?;
            return Ok(session_key);
        }

        let session_key = SessionKey::new(algorithm, algorithm.new_session_key(&mut *rng));
        for method in &self.methods {
            match method {
                KeyEncryptionMethod::Pbe(m) => {
                    write_packet(writer, &m.generate(rng, &session_key)?)?
                }
                KeyEncryptionMethod::PublicKey(m) => {
                    write_packet(writer, &m.generate(rng, &session_key)?)?
                }
            }
        }
        debug!("wrote {} session key packets", self.methods.len());

        Ok(session_key)
    }

    fn start<R: CryptoRng + Rng, W: io::Write>(
        &self,
        rng: &mut R,
        mut body: BodyWriter<W>,
        session_key: &SessionKey,
    ) -> Result<EncryptedDataWriter<W>> {
        let mut encryptor = self.encryptor_builder.build(session_key.key())?;
        let mut integrity = encryptor.integrity_calculator();

        if integrity.is_some() {
            io::Write::write_all(&mut body, &[SEIPD_VERSION])?;
        }

        let mut prefix = session_key.algorithm().new_prefix(&mut *rng);
        if let Some(calc) = integrity.as_mut() {
            calc.update(&prefix);
        }
        encryptor.encrypt(&mut prefix)?;
        io::Write::write_all(&mut body, &prefix)?;

        Ok(EncryptedDataWriter {
            body,
            encryptor,
            integrity,
            buffer: Vec::new(),
        })
    }
}

/// Encrypts everything written to it into the open data packet.
pub struct EncryptedDataWriter<W: io::Write> {
    body: BodyWriter<W>,
    encryptor: Box<dyn DataEncryptor>,
    integrity: Option<Box<dyn DigestCalculator>>,
    buffer: Vec<u8>,
}

impl<W: io::Write> std::fmt::Debug for EncryptedDataWriter<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptedDataWriter")
            .field("algorithm", &self.encryptor.algorithm())
            .field("integrity", &self.integrity.is_some())
            .finish()
    }
}

impl<W: io::Write> EncryptedDataWriter<W> {
    /// Appends the modification detection code, if any, and closes the packet.
    pub fn finish(mut self) -> Result<W> {
        if let Some(mut calc) = self.integrity.take() {
            calc.update(&MDC_HEADER);
            let mut trailer = MDC_HEADER.to_vec();
            trailer.extend_from_slice(&calc.finish());
            self.encryptor.encrypt(&mut trailer)?;
            io::Write::write_all(&mut self.body, &trailer)?;
        }
        self.body.finish()
    }
}

impl<W: io::Write> io::Write for EncryptedDataWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if let Some(calc) = self.integrity.as_mut() {
            calc.update(buf);
        }
        self.buffer.clear();
        self.buffer.extend_from_slice(buf);
        self.encryptor
            .encrypt(&mut self.buffer)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err.to_string()))?;
        self.body.write_all(&self.buffer)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.body.flush()
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};

    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;
    use crate::composed::{EncryptedDataList, EncryptedMessage, KeyPair};
    use crate::errors::Error;
    use crate::operator::{
        CfbDataEncryptorBuilder, DefaultPbeDataDecryptorFactory,
        DefaultPublicKeyDataDecryptorFactory,
    };
    use crate::packet::PacketReader;
    use crate::ser::Serialize;

    fn read_list(message: &[u8]) -> EncryptedDataList {
        let mut reader = PacketReader::new(message);
        EncryptedDataList::from_packet_reader(&mut reader).unwrap()
    }

    fn encrypt(generator: &EncryptedDataGenerator<'_>, fixed: bool, data: &[u8]) -> Vec<u8> {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut writer = if fixed {
            generator
                .open_with_length(&mut rng, Vec::new(), data.len())
                .unwrap()
        } else {
            generator.open(&mut rng, Vec::new()).unwrap()
        };
        writer.write_all(data).unwrap();
        writer.finish().unwrap()
    }

    #[test]
    fn test_single_passphrase_uses_derived_key() {
        let _ = pretty_env_logger::try_init();
        let builder =
            CfbDataEncryptorBuilder::new(SymmetricKeyAlgorithm::AES128).with_integrity_packet(true);
        let generator = EncryptedDataGenerator::new(&builder)
            .add_method(PbeKeyEncryptionMethod::with_defaults(b"secret"));

        for fixed in [true, false] {
            let message = encrypt(&generator, fixed, b"payload");
            let list = read_list(&message);
            assert_eq!(list.to_bytes().unwrap(), message);
            assert_eq!(list.len(), 1);
            assert!(list.is_integrity_protected());

            let method = list.pbe_methods().next().unwrap();
            assert!(method.packet().encrypted_key().is_none());

            let factory = DefaultPbeDataDecryptorFactory::new(b"secret");
            let mut stream = method.data_stream(&factory).unwrap();
            let mut out = Vec::new();
            stream.read_to_end(&mut out).unwrap();
            assert_eq!(out, b"payload");
            assert!(stream.verify().unwrap());
        }
    }

    #[test]
    fn test_large_partial_body() {
        let builder =
            CfbDataEncryptorBuilder::new(SymmetricKeyAlgorithm::AES256).with_integrity_packet(true);
        let generator = EncryptedDataGenerator::new(&builder)
            .add_method(PbeKeyEncryptionMethod::with_defaults(b"a"))
            .add_method(PbeKeyEncryptionMethod::with_defaults(b"b"))
            .with_partial_chunk_size(512);

        let data = vec![0x42u8; 5000];
        let message = encrypt(&generator, false, &data);
        let list = read_list(&message);
        assert_eq!(list.len(), 2);
        assert_eq!(list.write_len(), message.len());
        assert_eq!(list.to_bytes().unwrap(), message);

        let factory = DefaultPbeDataDecryptorFactory::new(b"b");
        let method = list.pbe_methods().nth(1).unwrap();
        assert!(method.packet().encrypted_key().is_some());
        assert_eq!(
            method.symmetric_algorithm(&factory).unwrap(),
            SymmetricKeyAlgorithm::AES256
        );
        let mut stream = method.data_stream(&factory).unwrap();
        let mut out = Vec::new();
        stream.read_to_end(&mut out).unwrap();
        assert_eq!(out, data);
        assert!(stream.verify().unwrap());
    }

    #[test]
    fn test_streamed_partial_body() {
        let builder =
            CfbDataEncryptorBuilder::new(SymmetricKeyAlgorithm::AES128).with_integrity_packet(true);
        let generator = EncryptedDataGenerator::new(&builder)
            .add_method(PbeKeyEncryptionMethod::with_defaults(b"a"))
            .add_method(PbeKeyEncryptionMethod::with_defaults(b"b"))
            .with_partial_chunk_size(512);

        let data: Vec<u8> = (0..3000u32).map(|i| (i % 251) as u8).collect();
        let message = encrypt(&generator, false, &data);

        let encrypted =
            EncryptedMessage::from_packet_reader(PacketReader::new(&message[..])).unwrap();
        assert!(encrypted.is_integrity_protected());
        assert_eq!(encrypted.pbe_packets().count(), 2);

        let factory = DefaultPbeDataDecryptorFactory::new(b"b");
        let mut stream = encrypted.pbe_data_stream(1, &factory).unwrap();
        assert!(stream.verify().is_err());
        let mut out = Vec::new();
        let mut buf = [0u8; 333];
        loop {
            let n = stream.read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        assert_eq!(out, data);
        assert!(stream.verify().unwrap());

        let encrypted =
            EncryptedMessage::from_packet_reader(PacketReader::new(&message[..])).unwrap();
        assert!(encrypted.pbe_data_stream(0, &factory).is_err());
        let encrypted =
            EncryptedMessage::from_packet_reader(PacketReader::new(&message[..])).unwrap();
        assert!(encrypted.pbe_data_stream(2, &factory).is_err());
    }

    #[test]
    fn test_legacy_data() {
        let builder = CfbDataEncryptorBuilder::new(SymmetricKeyAlgorithm::CAST5);
        let generator = EncryptedDataGenerator::new(&builder)
            .add_method(PbeKeyEncryptionMethod::with_defaults(b"pw"));
        let message = encrypt(&generator, true, b"no mdc here");
        let list = read_list(&message);
        assert!(!list.is_integrity_protected());

        let factory = DefaultPbeDataDecryptorFactory::new(b"pw");
        let mut stream = list.pbe_methods().next().unwrap().data_stream(&factory).unwrap();
        let mut out = Vec::new();
        stream.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"no mdc here");
    }

    #[test]
    fn test_public_key_recipient() {
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let pair = KeyPair::generate_rsa(&mut rng, 1024, chrono::Utc::now()).unwrap();
        let builder =
            CfbDataEncryptorBuilder::new(SymmetricKeyAlgorithm::AES128).with_integrity_packet(true);
        let generator = EncryptedDataGenerator::new(&builder)
            .add_method(PublicKeyKeyEncryptionMethod::new(pair.public()))
            .add_method(PbeKeyEncryptionMethod::with_defaults(b"backup"));

        let message = encrypt(&generator, true, b"to rsa");
        let list = read_list(&message);
        assert_eq!(list.len(), 2);
        assert_eq!(list.to_bytes().unwrap(), message);

        let method = list.public_key_method(&pair.key_id()).unwrap();
        let factory = DefaultPublicKeyDataDecryptorFactory::new(pair.private().clone());
        let mut stream = method.data_stream(&factory).unwrap();
        let mut out = Vec::new();
        stream.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"to rsa");
        assert!(stream.verify().unwrap());
    }

    #[test]
    fn test_no_methods() {
        let builder = CfbDataEncryptorBuilder::new(SymmetricKeyAlgorithm::AES128);
        let generator = EncryptedDataGenerator::new(&builder);
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        assert!(matches!(
            generator.open(&mut rng, Vec::new()).unwrap_err(),
            Error::Message { .. }
        ));
    }
}
